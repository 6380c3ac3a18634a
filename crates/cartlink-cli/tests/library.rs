use cartlink_cli::library::LibraryDir;
use cartlink_core::catalog::{CatalogEntry, CatalogKey, DirCatalog};
use cartlink_core::descriptor::GameDescriptor;
use cartlink_core::emulator::{EmulatorCore, EmulatorError, RomImage};
use cartlink_core::save_type::SaveTypeCode;
use cartlink_reader::{CartReader, LoadOptions, ReaderError, load_cartridge};

#[test]
fn files_round_trip_through_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut library = LibraryDir::open(dir.path().join("games")).unwrap();

    library.write_file("b.sav", &[1, 2, 3]).unwrap();
    library.write_file("a.gba", &[4; 10]).unwrap();
    std::fs::create_dir(library.root().join("covers")).unwrap();

    assert_eq!(library.list_files().unwrap(), ["a.gba", "b.sav"]);
    assert_eq!(library.read_file("b.sav").unwrap(), [1, 2, 3]);
    assert_eq!(library.stat("a.gba").unwrap().size, 10);
    assert!(matches!(
        library.read_file("missing.gba"),
        Err(EmulatorError::NotFound(_))
    ));
}

#[test]
fn names_must_stay_inside_the_library() {
    let dir = tempfile::tempdir().unwrap();
    let mut library = LibraryDir::open(dir.path()).unwrap();
    for name in ["../escape.gba", "sub/dir.gba", "", ".."] {
        assert!(
            matches!(
                library.write_file(name, &[0]),
                Err(EmulatorError::Rejected { .. })
            ),
            "{name:?}"
        );
    }
}

#[test]
fn loading_records_rom_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let mut library = LibraryDir::open(dir.path()).unwrap();

    library.load_save(&[9; 4], "Game.sav").unwrap();
    library
        .load_rom(&RomImage::new("Game.gba", vec![0xEA; 16]))
        .unwrap();

    assert_eq!(library.loaded_rom.as_deref(), Some("Game.gba"));
    assert_eq!(library.loaded_save.as_deref(), Some("Game.sav"));
    assert_eq!(std::fs::read(dir.path().join("Game.gba")).unwrap(), [0xEA; 16]);
    assert!(library.load_rom(&RomImage::new("Empty.gba", Vec::new())).is_err());
}

struct StaticReader(Vec<u8>);

impl CartReader for StaticReader {
    fn game_info(&self) -> Result<GameDescriptor, ReaderError> {
        Ok(GameDescriptor {
            cart_id: "BPEE".into(),
            rom_name: "POKEMON EMER".into(),
            checksum_16mb: "c0de".into(),
            ..Default::default()
        })
    }

    fn dump_rom(&self, _: bool, _: u64, _: SaveTypeCode) -> Result<Vec<u8>, ReaderError> {
        Ok(self.0.clone())
    }

    fn dump_save(&self, _: SaveTypeCode) -> Result<Vec<u8>, ReaderError> {
        Ok(vec![0xFF; 8])
    }

    fn upload_save(&self, _: &[u8], _: SaveTypeCode) -> Result<(), ReaderError> {
        Ok(())
    }

    fn verify_save(&self, _: &[u8], _: SaveTypeCode) -> Result<(), ReaderError> {
        Ok(())
    }

    fn upload_rom(&self, _: &[u8]) -> Result<(), ReaderError> {
        Ok(())
    }

    fn verify_rom(&self, _: &[u8]) -> Result<(), ReaderError> {
        Ok(())
    }
}

#[test]
fn load_workflow_fills_the_library() {
    let catalog_dir = tempfile::tempdir().unwrap();
    let key = CatalogKey::Cartridge("BPEE".into());
    let entry = CatalogEntry {
        full_name: "Pokemon Emerald".into(),
        cart_size: 16 * 1024 * 1024,
        checksum1000: "C0DE".into(),
        save_type: "FLASH1M_V103".into(),
        ..Default::default()
    };
    let document = catalog_dir.path().join(key.document_path());
    std::fs::create_dir_all(document.parent().unwrap()).unwrap();
    std::fs::write(&document, entry.to_json_pretty().unwrap()).unwrap();

    let library_dir = tempfile::tempdir().unwrap();
    let mut library = LibraryDir::open(library_dir.path()).unwrap();
    let reader = StaticReader(vec![0x24; 64]);
    let options = LoadOptions {
        with_save: true,
        ..Default::default()
    };

    let session = load_cartridge(
        &reader,
        &DirCatalog::new(catalog_dir.path()),
        &mut library,
        options,
    )
    .unwrap();

    assert_eq!(session.rom_name, "Pokemon Emerald_BPEE_C0DE.gba");
    assert_eq!(
        library.list_files().unwrap(),
        ["Pokemon Emerald_BPEE_C0DE.gba", "Pokemon Emerald_BPEE_C0DE.sav"]
    );

    // A second load finds the ROM already in the library.
    let again = load_cartridge(
        &reader,
        &DirCatalog::new(catalog_dir.path()),
        &mut library,
        LoadOptions::default(),
    )
    .unwrap();
    assert!(again.from_library);
}
