use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The guard checksum does not match the image; nothing was written.
    #[error(
        "patch is incompatible with this image (guard {expected:#010X}, image sums to {actual:#010X})"
    )]
    Incompatible { expected: u32, actual: u32 },

    #[error("patch offset {offset:#X} is outside the {len}-byte image")]
    OutOfRange { offset: usize, len: usize },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("patch has no checksum guard")]
    MissingChecksum,

    #[error("not a {0} patch")]
    BadMagic(&'static str),

    #[error("unsupported {format} patch version {version}")]
    UnsupportedVersion { format: &'static str, version: u8 },

    #[error("patch data ends unexpectedly")]
    Truncated,

    #[error("malformed patch: {0}")]
    Malformed(String),

    #[error("patch file is corrupt (CRC {expected:08X}, computed {actual:08X})")]
    PatchCrc { expected: u32, actual: u32 },

    #[error("source image does not match the patch: {0}")]
    SourceMismatch(String),

    #[error("patched image failed verification (CRC {expected:08X}, computed {actual:08X})")]
    TargetCrc { expected: u32, actual: u32 },
}

impl PatchError {
    /// Whether the patch was built for a different image, as opposed to the
    /// patch itself being broken.
    pub fn is_incompatible(&self) -> bool {
        matches!(self, Self::Incompatible { .. } | Self::SourceMismatch(_))
    }
}
