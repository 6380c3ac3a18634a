//! Network side of cartlink: the reader device client, the HTTP catalog, and
//! the workflows that move cartridges between the reader and an emulator.
//!
//! Everything here is blocking. Timeouts come from the HTTP client
//! configuration; nothing is retried automatically.

mod client;
mod http_catalog;
mod identify;
mod workflow;

pub use client::{CartReader, ReaderClient, ReaderError, normalize_base_url};
pub use http_catalog::HttpCatalog;
pub use identify::{Identification, identify};
pub use workflow::{CartridgeSession, LoadOptions, SaveSync, WorkflowError, load_cartridge};
