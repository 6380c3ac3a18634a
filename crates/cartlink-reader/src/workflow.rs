//! Loading a cartridge into an emulator and keeping its save in sync.

use cartlink_core::catalog::{CatalogEntry, CatalogSource, IdentifyError, LookupError};
use cartlink_core::emulator::{EmulatorCore, EmulatorError, RomImage};
use cartlink_core::patch::{PatchError, load_patch};
use cartlink_core::save_type::{InvalidSaveType, SaveTypeCode};
use log::{debug, info, warn};
use thiserror::Error;

use crate::client::{CartReader, ReaderError};
use crate::identify::{Identification, identify};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Identify(#[from] IdentifyError),

    #[error("no response from the cartridge reader")]
    ReaderUnreachable,

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error("could not fetch patch: {0}")]
    Catalog(#[from] LookupError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    SaveType(#[from] InvalidSaveType),

    #[error(transparent)]
    Emulator(#[from] EmulatorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Dump the cartridge save and load it before the ROM.
    pub with_save: bool,
    /// Apply the catalog entry's patch to freshly dumped ROMs.
    pub apply_patch: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            with_save: false,
            apply_patch: true,
        }
    }
}

/// The cartridge currently loaded, handed to whoever handles save updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeSession {
    pub rom_name: String,
    pub save_name: String,
    pub entry: CatalogEntry,
    /// `None` when the catalog save type is not one the reader understands.
    pub save_code: Option<SaveTypeCode>,
    /// The ROM came from the emulator library instead of a fresh dump.
    pub from_library: bool,
    pub patched: bool,
}

impl CartridgeSession {
    pub fn new(identification: &Identification) -> Self {
        Self {
            rom_name: identification.rom_file_name(),
            save_name: identification.save_file_name(),
            entry: identification.resolution.entry.clone(),
            save_code: identification.save_code().ok(),
            from_library: false,
            patched: false,
        }
    }
}

fn dump_patched_rom<R, C>(
    reader: &R,
    catalog: &C,
    identification: &Identification,
    session: &mut CartridgeSession,
    options: LoadOptions,
) -> Result<Vec<u8>, WorkflowError>
where
    R: CartReader + ?Sized,
    C: CatalogSource + ?Sized,
{
    let entry = &identification.resolution.entry;
    let save_code = session.save_code.unwrap_or(SaveTypeCode::FLASH);
    let rom = reader.dump_rom(identification.descriptor.is_gba, entry.cart_size, save_code)?;

    let Some(reference) = entry.patch_reference().filter(|_| options.apply_patch) else {
        return Ok(rom);
    };
    info!("Applying patch {reference}");
    let patch = load_patch(&catalog.fetch_patch(reference)?)?;
    let patched = patch.apply_to(&rom)?;
    session.patched = true;
    Ok(patched)
}

/// Identifies the inserted cartridge and loads it into `emulator`.
///
/// A ROM already in the emulator library under the cartridge's library name
/// is reused; otherwise the ROM is dumped, patched when the catalog names a
/// patch, and stored in the library. Nothing is loaded if any step fails.
pub fn load_cartridge<R, C, E>(
    reader: &R,
    catalog: &C,
    emulator: &mut E,
    options: LoadOptions,
) -> Result<CartridgeSession, WorkflowError>
where
    R: CartReader + ?Sized,
    C: CatalogSource + ?Sized,
    E: EmulatorCore + ?Sized,
{
    let identification = identify(reader, catalog)?;
    if !identification.reader_reachable {
        return Err(WorkflowError::ReaderUnreachable);
    }
    if identification.resolution.is_degraded() {
        warn!(
            "Catalog data for '{}' is unverified; save type {} may be wrong",
            identification.descriptor.rom_name, identification.resolution.entry.save_type
        );
    }

    let mut session = CartridgeSession::new(&identification);

    let save = if options.with_save {
        let code = identification.save_code()?;
        Some(reader.dump_save(code)?)
    } else {
        None
    };

    let rom = if emulator.list_files()?.contains(&session.rom_name) {
        info!("Using {} from the library", session.rom_name);
        session.from_library = true;
        emulator.read_file(&session.rom_name)?
    } else {
        let rom = dump_patched_rom(reader, catalog, &identification, &mut session, options)?;
        emulator.write_file(&session.rom_name, &rom)?;
        rom
    };

    if let Some(save) = save {
        debug!("Loading {} byte save as {}", save.len(), session.save_name);
        emulator.load_save(&save, &session.save_name)?;
    }
    emulator.load_rom(&RomImage::new(session.rom_name.clone(), rom))?;
    Ok(session)
}

/// Handles save updates coming from the emulator.
#[derive(Debug, Clone)]
pub struct SaveSync<R> {
    reader: R,
    upload_to_cartridge: bool,
}

impl<R: CartReader> SaveSync<R> {
    pub fn new(reader: R, upload_to_cartridge: bool) -> Self {
        Self {
            reader,
            upload_to_cartridge,
        }
    }

    /// Stores `save` under the session's save name and, when enabled, writes
    /// it to the cartridge. Returns whether the cartridge was updated.
    pub fn on_save_updated<E: EmulatorCore + ?Sized>(
        &self,
        session: &CartridgeSession,
        emulator: &mut E,
        save: &[u8],
    ) -> Result<bool, WorkflowError> {
        emulator.write_file(&session.save_name, save)?;
        debug!("Stored {} byte save as {}", save.len(), session.save_name);

        if !self.upload_to_cartridge {
            return Ok(false);
        }
        let Some(code) = session.save_code else {
            warn!(
                "Not uploading save: '{}' is not a save type the reader understands",
                session.entry.save_type
            );
            return Ok(false);
        };
        self.reader.upload_save(save, code)?;
        info!("Uploaded save to cartridge");
        Ok(true)
    }
}
