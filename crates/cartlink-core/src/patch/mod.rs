//! ROM patch formats.
//!
//! Two families are supported:
//! - change-group patches ([`ParsedPatch`]): byte-range substitutions guarded
//!   by a cumulative checksum, stored either as line-oriented text
//!   ([`text`]) or in a compact binary container ([`binary`]);
//! - BPS patches ([`bps`]), the instruction-based format catalog entries
//!   usually reference.
//!
//! [`load_patch`] sniffs the format of a fetched patch file.

use std::fmt;

pub mod binary;
pub mod bps;
pub mod build;
pub mod engine;
mod error;
pub mod text;
mod varint;

pub use error::PatchError;

/// One side of a change-group modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteSpec {
    Literal(u8),
    /// Not checked, passed through.
    Wildcard,
}

impl ByteSpec {
    pub fn literal(self) -> Option<u8> {
        match self {
            Self::Literal(b) => Some(b),
            Self::Wildcard => None,
        }
    }

    pub fn is_wildcard(self) -> bool {
        matches!(self, Self::Wildcard)
    }
}

impl fmt::Display for ByteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(b) => write!(f, "0x{b:02X}"),
            Self::Wildcard => f.write_str("*"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modification {
    pub original: ByteSpec,
    pub modified: ByteSpec,
}

impl Modification {
    /// Filler that leaves the byte alone and stays out of the guard.
    pub const UNCHANGED: Modification = Modification {
        original: ByteSpec::Wildcard,
        modified: ByteSpec::Wildcard,
    };

    pub fn new(original: ByteSpec, modified: ByteSpec) -> Self {
        Self { original, modified }
    }
}

/// Contiguous run of modifications starting at `start`.
///
/// Modification `i` applies to offset `start + i`. A well-formed group has
/// exactly `end - start` modifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeGroup {
    pub start: usize,
    pub end: usize,
    pub modifications: Vec<Modification>,
}

impl ChangeGroup {
    pub fn new(start: usize) -> Self {
        Self {
            start,
            end: start,
            modifications: Vec::new(),
        }
    }

    /// Appends a modification and extends `end` to cover it.
    pub fn push(&mut self, modification: Modification) {
        self.modifications.push(modification);
        self.end = self.start + self.modifications.len();
    }

    pub fn is_well_formed(&self) -> bool {
        self.start <= self.end && self.modifications.len() == self.end - self.start
    }
}

/// A change-group patch ready to be applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPatch {
    pub groups: Vec<ChangeGroup>,
    pub checksum_guard: u32,
    /// Output length when it differs from the source; `None` keeps the
    /// source length.
    pub target_len: Option<usize>,
}

impl ParsedPatch {
    pub fn modification_count(&self) -> usize {
        self.groups.iter().map(|g| g.modifications.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFormat {
    Bps,
    Binary,
    Text,
}

impl PatchFormat {
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(bps::MAGIC) {
            Self::Bps
        } else if bytes.starts_with(binary::MAGIC) {
            Self::Binary
        } else {
            Self::Text
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Bps => "bps",
            Self::Binary => "cgp",
            Self::Text => "txt",
        }
    }
}

impl fmt::Display for PatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bps => "BPS",
            Self::Binary => "change-group binary",
            Self::Text => "change-group text",
        })
    }
}

/// A decoded patch of any supported format.
pub trait Patch {
    /// Produces the patched image. `source` is never modified.
    fn apply_to(&self, source: &[u8]) -> Result<Vec<u8>, PatchError>;
}

impl Patch for ParsedPatch {
    fn apply_to(&self, source: &[u8]) -> Result<Vec<u8>, PatchError> {
        engine::apply(source, self)
    }
}

impl Patch for bps::BpsPatch {
    fn apply_to(&self, source: &[u8]) -> Result<Vec<u8>, PatchError> {
        bps::apply(self, source)
    }
}

/// Decodes a change-group patch stored as text or in the binary container.
pub fn parse_change_groups(bytes: &[u8]) -> Result<ParsedPatch, PatchError> {
    match PatchFormat::detect(bytes) {
        PatchFormat::Binary => binary::decode(bytes),
        PatchFormat::Text => {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| PatchError::Malformed("text patch is not valid UTF-8".into()))?;
            text::parse(text)
        }
        PatchFormat::Bps => Err(PatchError::BadMagic("change-group")),
    }
}

/// Decodes a patch file of any supported format.
pub fn load_patch(bytes: &[u8]) -> Result<Box<dyn Patch>, PatchError> {
    let format = PatchFormat::detect(bytes);
    log::debug!("Decoding {} byte {format} patch", bytes.len());
    match format {
        PatchFormat::Bps => Ok(Box::new(bps::parse(bytes)?)),
        PatchFormat::Binary | PatchFormat::Text => Ok(Box::new(parse_change_groups(bytes)?)),
    }
}
