//! Cartridge identification and ROM patching core.
//!
//! This crate contains the transport-agnostic logic: fingerprinting a dumped
//! cartridge, resolving catalog metadata, and the patch codecs and engines.
//! Network access (reader device, catalog server) lives in `cartlink-reader`
//! and reaches this crate through the [`catalog::CatalogSource`] and
//! [`emulator::EmulatorCore`] traits.

/// Catalog entries and the resolution state machine.
pub mod catalog;

/// Basic descriptor reported by the reader device.
pub mod descriptor;

/// Capability interface of the emulator that consumes dumped images.
pub mod emulator;

/// Checksum-variant selection and ROM CRC.
pub mod fingerprint;

/// Library file names and catalog document authoring.
pub mod naming;

/// Patch formats, application and construction.
pub mod patch;

/// Save chip labels and their reader protocol codes.
pub mod save_type;

mod json;

pub const MIB: u64 = 1024 * 1024;
