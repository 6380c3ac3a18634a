//! Catalog metadata and the lookup state machine that matches a dumped
//! cartridge to it.
//!
//! Resolution never fails past [`resolve`] except for a missing cartridge:
//! catalog misses degrade to [`CatalogEntry::fallback`] and checksum
//! mismatches degrade to the unverified primary entry, so callers always have
//! something to show the operator.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::MIB;
use crate::descriptor::GameDescriptor;
use crate::fingerprint::checksum_variant;
use crate::json;
use crate::save_type::SaveType;

/// Save type assumed when the catalog has no entry for a cartridge.
pub const DEFAULT_SAVE_TYPE: SaveType = SaveType::ReproFlash1m;
/// Cart size assumed when the catalog has no entry for a cartridge.
pub const DEFAULT_CART_SIZE: u64 = 16 * MIB;

/// Catalog document describing a known cartridge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(deserialize_with = "json::string_or_number")]
    pub full_name: String,
    #[serde(deserialize_with = "json::string_or_number")]
    pub cover_image: String,
    #[serde(deserialize_with = "json::string_or_number")]
    pub publisher: String,
    #[serde(deserialize_with = "json::string_or_number")]
    pub release_date: String,
    #[serde(deserialize_with = "json::string_or_number")]
    pub crc: String,
    #[serde(deserialize_with = "json::size_or_string")]
    pub cart_size: u64,
    #[serde(deserialize_with = "json::string_or_number")]
    pub save_type: String,
    #[serde(deserialize_with = "json::string_or_number")]
    pub checksum1000: String,
    /// Header checksum used to verify GB/GBC entries.
    #[serde(
        alias = "checksum",
        deserialize_with = "json::string_or_number",
        skip_serializing_if = "String::is_empty"
    )]
    pub global_checksum: String,
    #[serde(
        deserialize_with = "json::optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub patch_file: Option<String>,
    #[serde(deserialize_with = "json::string_or_number")]
    pub console: String,
}

impl CatalogEntry {
    /// Last-resort entry used when the catalog has nothing for a cartridge.
    pub fn fallback() -> Self {
        Self {
            save_type: DEFAULT_SAVE_TYPE.label().to_string(),
            cart_size: DEFAULT_CART_SIZE,
            ..Default::default()
        }
    }

    /// Parses a catalog document. `null` and `{}` are treated as "no entry".
    pub fn from_json(text: &str) -> Result<Option<Self>, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        match &value {
            Value::Null => return Ok(None),
            Value::Object(map) if map.is_empty() => return Ok(None),
            _ => {}
        }
        serde_json::from_value(value).map(Some)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn patch_reference(&self) -> Option<&str> {
        self.patch_file.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// Key of a catalog document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CatalogKey {
    /// GBA entry by four-character cartridge id.
    Cartridge(String),
    /// GBA entry for a specific dump checksum of a cartridge id.
    Variant { checksum: String, cart_id: String },
    /// GB/GBC entry by header title.
    RomName(String),
}

impl CatalogKey {
    /// Path of the document relative to the catalog root.
    pub fn document_path(&self) -> String {
        match self {
            Self::Cartridge(id) => format!("information_rom/{id}.json"),
            Self::Variant { checksum, cart_id } => {
                format!("information_rom/{checksum}-{cart_id}.json")
            }
            Self::RomName(name) => format!("information_rom_gb/{name}.json"),
        }
    }
}

impl fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cartridge(id) => f.write_str(id),
            Self::Variant { checksum, cart_id } => write!(f, "{checksum}-{cart_id}"),
            Self::RomName(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("catalog returned status {0}")]
    Status(u16),

    #[error("catalog unreachable: {0}")]
    Transport(String),

    #[error("catalog document is malformed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("catalog I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Source of catalog documents.
///
/// `Ok(None)` means the document exists but is empty.
pub trait CatalogSource {
    fn lookup(&self, key: &CatalogKey) -> Result<Option<CatalogEntry>, LookupError>;

    /// Fetches a file named by an entry's `patchFile`.
    fn fetch_patch(&self, reference: &str) -> Result<Vec<u8>, LookupError>;
}

impl<T: CatalogSource + ?Sized> CatalogSource for &T {
    fn lookup(&self, key: &CatalogKey) -> Result<Option<CatalogEntry>, LookupError> {
        (**self).lookup(key)
    }

    fn fetch_patch(&self, reference: &str) -> Result<Vec<u8>, LookupError> {
        (**self).fetch_patch(reference)
    }
}

/// Strips the `./` or `/` prefix patch references carry, leaving a path
/// relative to the catalog root.
pub fn relative_reference(reference: &str) -> &str {
    let trimmed = reference.trim();
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    trimmed.trim_start_matches('/')
}

/// Catalog served from a local directory laid out like the catalog server.
#[derive(Debug, Clone)]
pub struct DirCatalog {
    root: PathBuf,
}

impl DirCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl CatalogSource for DirCatalog {
    fn lookup(&self, key: &CatalogKey) -> Result<Option<CatalogEntry>, LookupError> {
        let path = self.root.join(key.document_path());
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(LookupError::Status(404)),
            Err(e) => return Err(e.into()),
        };
        Ok(CatalogEntry::from_json(&text)?)
    }

    fn fetch_patch(&self, reference: &str) -> Result<Vec<u8>, LookupError> {
        let path = self.root.join(relative_reference(reference));
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(LookupError::Status(404)),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifyError {
    #[error("no cartridge detected (reader reported an empty ROM name)")]
    NoCartridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveState {
    Start,
    PrimaryLookup,
    MismatchRetry,
    Resolved,
    FallbackFailed,
}

/// Where the resolved entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    Primary,
    Secondary,
    Default,
}

/// Outcome of catalog resolution for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Terminal state, either `Resolved` or `FallbackFailed`.
    pub state: ResolveState,
    pub source: EntrySource,
    pub entry: CatalogEntry,
    /// Dump checksum used in library names; empty when unresolved.
    pub checksum_variant: String,
    pub checksum_matched: bool,
}

impl Resolution {
    /// Placeholder used when the cartridge could not be identified at all.
    pub fn unresolved() -> Self {
        Self {
            state: ResolveState::FallbackFailed,
            source: EntrySource::Default,
            entry: CatalogEntry::fallback(),
            checksum_variant: String::new(),
            checksum_matched: false,
        }
    }

    /// Whether the entry is a guess rather than a verified match.
    pub fn is_degraded(&self) -> bool {
        self.source == EntrySource::Default || !self.checksum_matched
    }
}

fn primary_key(descriptor: &GameDescriptor) -> CatalogKey {
    if descriptor.is_gba {
        CatalogKey::Cartridge(descriptor.cart_id.clone())
    } else {
        CatalogKey::RomName(descriptor.rom_name.clone())
    }
}

fn lookup_logged<C: CatalogSource + ?Sized>(catalog: &C, key: &CatalogKey) -> Option<CatalogEntry> {
    match catalog.lookup(key) {
        Ok(Some(entry)) => Some(entry),
        Ok(None) => {
            debug!("Catalog document {} is empty", key.document_path());
            None
        }
        Err(e) => {
            warn!("Catalog lookup {} failed: {e}", key.document_path());
            None
        }
    }
}

/// Resolves catalog metadata for a descriptor read from the reader device.
///
/// Only an empty ROM name is an error; it is reported before any lookup.
pub fn resolve<C: CatalogSource + ?Sized>(
    descriptor: &GameDescriptor,
    catalog: &C,
) -> Result<Resolution, IdentifyError> {
    let mut state = ResolveState::Start;
    let mut entry = CatalogEntry::fallback();
    let mut source = EntrySource::Default;
    let mut variant = String::new();
    let mut matched = false;

    loop {
        trace!("catalog resolution state {state:?}");
        state = match state {
            ResolveState::Start => {
                if !descriptor.has_cartridge() {
                    return Err(IdentifyError::NoCartridge);
                }
                ResolveState::PrimaryLookup
            }
            ResolveState::PrimaryLookup => match lookup_logged(catalog, &primary_key(descriptor)) {
                None => {
                    warn!(
                        "No catalog entry for '{}'; assuming {} / {} bytes",
                        descriptor.rom_name, DEFAULT_SAVE_TYPE, DEFAULT_CART_SIZE
                    );
                    if descriptor.is_gba {
                        variant = checksum_variant(descriptor, entry.cart_size);
                    } else {
                        variant = descriptor.checksum_str.to_uppercase();
                    }
                    ResolveState::Resolved
                }
                Some(found) if descriptor.is_gba => {
                    entry = found;
                    source = EntrySource::Primary;
                    variant = checksum_variant(descriptor, entry.cart_size);
                    if !variant.is_empty() && variant == entry.checksum1000 {
                        matched = true;
                        ResolveState::Resolved
                    } else {
                        info!(
                            "Checksum {variant:?} does not match catalog {:?}; trying variant entry",
                            entry.checksum1000
                        );
                        ResolveState::MismatchRetry
                    }
                }
                Some(found) => {
                    entry = found;
                    source = EntrySource::Primary;
                    variant = descriptor.checksum_str.to_uppercase();
                    matched = descriptor
                        .checksum_str
                        .eq_ignore_ascii_case(&entry.global_checksum);
                    if !matched {
                        // GB/GBC entries have no variant documents to retry with.
                        warn!(
                            "Checksum {} does not match catalog {} for '{}'",
                            descriptor.checksum_str, entry.global_checksum, descriptor.rom_name
                        );
                    }
                    ResolveState::Resolved
                }
            },
            ResolveState::MismatchRetry => {
                if variant.is_empty() {
                    warn!(
                        "Cart size {} has no checksum slot; keeping unverified entry",
                        entry.cart_size
                    );
                    ResolveState::FallbackFailed
                } else {
                    let key = CatalogKey::Variant {
                        checksum: variant.clone(),
                        cart_id: descriptor.cart_id.clone(),
                    };
                    match lookup_logged(catalog, &key) {
                        Some(found) => {
                            entry = found;
                            source = EntrySource::Secondary;
                            matched = true;
                            ResolveState::Resolved
                        }
                        None => ResolveState::FallbackFailed,
                    }
                }
            }
            ResolveState::Resolved | ResolveState::FallbackFailed => break,
        };
    }

    debug!(
        "Resolved '{}' from {source:?} entry ({state:?})",
        descriptor.rom_name
    );
    Ok(Resolution {
        state,
        source,
        entry,
        checksum_variant: variant,
        checksum_matched: matched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_documents_are_not_entries() {
        assert_eq!(CatalogEntry::from_json("{}").unwrap(), None);
        assert_eq!(CatalogEntry::from_json("null").unwrap(), None);
        assert!(CatalogEntry::from_json("[1,2]").is_err());
    }

    #[test]
    fn cart_size_accepts_strings() {
        let entry = CatalogEntry::from_json(r#"{"fullName": "Game", "cartSize": "8388608"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(entry.cart_size, 8 * MIB);
        assert_eq!(entry.patch_reference(), None);
    }

    #[test]
    fn blank_patch_reference_is_ignored() {
        let entry = CatalogEntry::from_json(r#"{"patchFile": " "}"#).unwrap().unwrap();
        assert_eq!(entry.patch_reference(), None);
    }

    #[test]
    fn fallback_uses_named_defaults() {
        let entry = CatalogEntry::fallback();
        assert_eq!(entry.save_type, "REPRO_FLASH1M");
        assert_eq!(entry.cart_size, 16 * 1024 * 1024);
    }

    #[test]
    fn patch_references_are_made_relative() {
        assert_eq!(relative_reference("./patches/a.bps"), "patches/a.bps");
        assert_eq!(relative_reference("/patches/a.bps"), "patches/a.bps");
        assert_eq!(relative_reference(" patches/a.bps "), "patches/a.bps");
    }

    #[test]
    fn document_paths() {
        assert_eq!(
            CatalogKey::Cartridge("AXVE".into()).document_path(),
            "information_rom/AXVE.json"
        );
        assert_eq!(
            CatalogKey::Variant {
                checksum: "1A2B".into(),
                cart_id: "AXVE".into()
            }
            .document_path(),
            "information_rom/1A2B-AXVE.json"
        );
        assert_eq!(
            CatalogKey::RomName("TETRIS".into()).document_path(),
            "information_rom_gb/TETRIS.json"
        );
    }
}
