//! Offline patch commands: apply, create, convert, and CRC reports.

use std::fmt;
use std::path::{Path, PathBuf};

use cartlink_core::catalog::CatalogEntry;
use cartlink_core::fingerprint::rom_crc32;
use cartlink_core::naming::{PatchRelease, parse_library_name, split_rom_extension};
use cartlink_core::patch::{binary, bps, build, load_patch, parse_change_groups, text};
use clap::ValueEnum;
use log::info;

use crate::{CliError, read_input, write_output};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// BPS patch, the format catalog entries reference
    Bps,
    /// Change-group binary container
    Binary,
    /// Change-group text listing
    Text,
}

fn file_name(path: &Path) -> Result<String, CliError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CliError::Usage(format!("{} is not a file path", path.display())))
}

/// Applies a patch of any supported format. Returns the output size.
pub fn apply_patch_file(patch: &Path, rom: &Path, output: &Path) -> Result<usize, CliError> {
    let patch = load_patch(&read_input(patch)?)?;
    let patched = patch.apply_to(&read_input(rom)?)?;
    write_output(output, &patched)?;
    Ok(patched.len())
}

pub fn create_patch(base: &[u8], modified: &[u8], format: OutputFormat) -> Vec<u8> {
    match format {
        OutputFormat::Bps => {
            let (bytes, crc) = bps::serialize(&bps::build(base, modified));
            info!("BPS patch CRC {crc:08X}");
            bytes
        }
        OutputFormat::Binary => binary::encode(&build::build(base, modified)),
        OutputFormat::Text => text::format(&build::build(base, modified)).into_bytes(),
    }
}

pub fn create_patch_file(
    base: &Path,
    modified: &Path,
    format: OutputFormat,
    output: &Path,
) -> Result<(), CliError> {
    let patch = create_patch(&read_input(base)?, &read_input(modified)?, format);
    write_output(output, &patch)
}

/// Re-encodes a change-group patch as text or binary.
pub fn convert_patch_file(patch: &Path, format: OutputFormat, output: &Path) -> Result<(), CliError> {
    let data = match format {
        OutputFormat::Bps => {
            return Err(CliError::Usage(
                "change-group patches cannot be converted to BPS; use `patch create`".into(),
            ));
        }
        OutputFormat::Binary => binary::encode(&parse_change_groups(&read_input(patch)?)?),
        OutputFormat::Text => text::format(&parse_change_groups(&read_input(patch)?)?).into_bytes(),
    };
    write_output(output, &data)
}

/// Describes a patch built against a library ROM for publication as a
/// catalog variant.
///
/// The base ROM must carry its cart id and checksum in its library name; the
/// release is named after the modified ROM.
pub fn release_for(
    base_path: &Path,
    base_rom: &[u8],
    modified_path: &Path,
    patch_path: &Path,
) -> Result<PatchRelease, CliError> {
    let base_name = file_name(base_path)?;
    let (cart_id, checksum1000) = parse_library_name(&base_name).ok_or_else(|| {
        CliError::Usage(format!(
            "{base_name}: expected a library name such as Title_AXVE_1A2B.gba"
        ))
    })?;
    let modified_name = file_name(modified_path)?;
    let (full_name, _) = split_rom_extension(&modified_name);

    Ok(PatchRelease {
        full_name: full_name.to_string(),
        cart_id,
        checksum1000,
        crc: rom_crc32(base_rom),
        cart_size: base_rom.len() as u64,
        console: split_rom_extension(&base_name).1,
        patch_file: file_name(patch_path)?,
    })
}

/// Writes the variant document for `release` into `dir` and returns its path.
pub fn write_catalog_document(
    dir: &Path,
    release: &PatchRelease,
    base_entry: Option<&CatalogEntry>,
) -> Result<PathBuf, CliError> {
    let path = dir.join(release.document_name());
    let json = release.to_entry(base_entry).to_json_pretty()?;
    write_output(&path, json.as_bytes())?;
    Ok(path)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrcReport {
    pub crc: String,
    /// Cart id and checksum taken from a library file name.
    pub library_ids: Option<(String, String)>,
}

impl fmt::Display for CrcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CRC32:    {}", self.crc)?;
        if let Some((cart_id, checksum)) = &self.library_ids {
            write!(f, "\nCart ID:  {cart_id}\nChecksum: {checksum}")?;
        }
        Ok(())
    }
}

pub fn crc_report(rom: &Path) -> Result<CrcReport, CliError> {
    let data = read_input(rom)?;
    Ok(CrcReport {
        crc: rom_crc32(&data),
        library_ids: parse_library_name(&file_name(rom)?),
    })
}
