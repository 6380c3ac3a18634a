use cartlink_core::catalog::{CatalogSource, Resolution, resolve};
use cartlink_core::descriptor::GameDescriptor;
use cartlink_core::naming::library_stem;
use cartlink_core::save_type::{InvalidSaveType, SaveTypeCode};
use log::{info, warn};

use crate::client::CartReader;
use crate::workflow::WorkflowError;

/// What the reader and the catalog know about the inserted cartridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub descriptor: GameDescriptor,
    pub resolution: Resolution,
    /// False when the descriptor could not be fetched; the resolution is then
    /// the default entry.
    pub reader_reachable: bool,
}

impl Identification {
    /// `{fullName}_{cartId}_{checksum}`, the stem of library ROM and save files.
    pub fn library_stem(&self) -> String {
        library_stem(
            &self.resolution.entry,
            &self.descriptor.rom_name,
            &self.descriptor.cart_id,
            &self.resolution.checksum_variant,
        )
    }

    pub fn rom_file_name(&self) -> String {
        format!("{}.{}", self.library_stem(), self.descriptor.rom_extension())
    }

    pub fn save_file_name(&self) -> String {
        format!("{}.sav", self.library_stem())
    }

    pub fn save_code(&self) -> Result<SaveTypeCode, InvalidSaveType> {
        SaveTypeCode::from_label(&self.resolution.entry.save_type)
    }
}

/// Asks the reader which cartridge is inserted and resolves it against the
/// catalog.
///
/// An unreachable reader is not an error here; see
/// [`Identification::reader_reachable`]. A reader that answers with an error
/// status or a malformed descriptor is.
pub fn identify<R, C>(reader: &R, catalog: &C) -> Result<Identification, WorkflowError>
where
    R: CartReader + ?Sized,
    C: CatalogSource + ?Sized,
{
    let descriptor = match reader.game_info() {
        Ok(descriptor) => descriptor,
        Err(e) if e.is_transport() => {
            warn!("No response from the cartridge reader: {e}");
            return Ok(Identification {
                descriptor: GameDescriptor::default(),
                resolution: Resolution::unresolved(),
                reader_reachable: false,
            });
        }
        Err(e) => return Err(e.into()),
    };

    let resolution = resolve(&descriptor, catalog)?;
    info!(
        "Identified '{}' ({}) as '{}'",
        descriptor.rom_name, descriptor.cart_id, resolution.entry.full_name
    );
    Ok(Identification {
        descriptor,
        resolution,
        reader_reachable: true,
    })
}
