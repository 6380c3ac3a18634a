use crate::catalog::CatalogEntry;

/// Directory catalog documents reference patch files from.
pub const PATCH_DIR: &str = "./patches/";

/// Library stem `{fullName}_{cartId}_{checksum}` shared by ROM and save files.
///
/// Entries without a full name (catalog misses) fall back to the header title.
pub fn library_stem(entry: &CatalogEntry, rom_name: &str, cart_id: &str, checksum: &str) -> String {
    let name = if entry.full_name.is_empty() {
        rom_name.trim()
    } else {
        entry.full_name.as_str()
    };
    format!("{name}_{cart_id}_{checksum}")
}

fn is_id_char(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit()
}

fn id_run(bytes: &[u8], from: usize) -> usize {
    bytes[from..].iter().take_while(|&&b| is_id_char(b)).count()
}

/// Extracts `(cart_id, checksum)` from a library file name such as
/// `Game_AXVE_1A2B3C4D.gba`.
///
/// The first `_<1-4 id chars>_<1-8 id chars>.` sequence wins.
pub fn parse_library_name(file_name: &str) -> Option<(String, String)> {
    let bytes = file_name.as_bytes();
    for (i, _) in bytes.iter().enumerate().filter(|(_, b)| **b == b'_') {
        let id_start = i + 1;
        let id_len = id_run(bytes, id_start);
        if !(1..=4).contains(&id_len) || bytes.get(id_start + id_len) != Some(&b'_') {
            continue;
        }
        let sum_start = id_start + id_len + 1;
        let sum_len = id_run(bytes, sum_start);
        if !(1..=8).contains(&sum_len) || bytes.get(sum_start + sum_len) != Some(&b'.') {
            continue;
        }
        return Some((
            file_name[id_start..id_start + id_len].to_string(),
            file_name[sum_start..sum_start + sum_len].to_string(),
        ));
    }
    None
}

/// Splits a `.gb`/`.gbc`/`.gba` extension (any case) off a file name.
///
/// Names without one are assumed to be GBA images.
pub fn split_rom_extension(file_name: &str) -> (&str, String) {
    for ext in [".gba", ".gbc", ".gb"] {
        let Some(split) = file_name.len().checked_sub(ext.len()) else {
            continue;
        };
        if file_name.is_char_boundary(split) && file_name[split..].eq_ignore_ascii_case(ext) {
            return (&file_name[..split], file_name[split..].to_string());
        }
    }
    (file_name, ".gba".to_string())
}

/// Metadata for publishing a patched ROM as a catalog variant entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchRelease {
    pub full_name: String,
    pub cart_id: String,
    pub checksum1000: String,
    pub crc: String,
    pub cart_size: u64,
    pub console: String,
    /// File name of the patch, without directory.
    pub patch_file: String,
}

impl PatchRelease {
    /// Name of the variant document, `{checksum1000}-{cartId}.json`.
    pub fn document_name(&self) -> String {
        format!("{}-{}.json", self.checksum1000, self.cart_id)
    }

    /// Builds the catalog entry, copying cover, publisher, release date and
    /// save type from the cartridge's base entry when there is one.
    pub fn to_entry(&self, base: Option<&CatalogEntry>) -> CatalogEntry {
        let mut entry = base.cloned().unwrap_or_default();
        entry.full_name = self.full_name.clone();
        entry.crc = self.crc.clone();
        entry.cart_size = self.cart_size;
        entry.checksum1000 = self.checksum1000.clone();
        entry.patch_file = Some(format!("{PATCH_DIR}{}", self.patch_file));
        entry.console = self.console.clone();
        entry.global_checksum.clear();
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_uses_catalog_name() {
        let entry = CatalogEntry {
            full_name: "Metroid Fusion".into(),
            ..Default::default()
        };
        assert_eq!(
            library_stem(&entry, "METROID4USA", "AMTE", "5DE8"),
            "Metroid Fusion_AMTE_5DE8"
        );
        assert_eq!(
            library_stem(&CatalogEntry::default(), "METROID4USA ", "AMTE", "5DE8"),
            "METROID4USA_AMTE_5DE8"
        );
    }

    #[test]
    fn parses_cart_id_and_checksum() {
        assert_eq!(
            parse_library_name("Metroid Fusion_AMTE_5DE8A1B2.gba"),
            Some(("AMTE".into(), "5DE8A1B2".into()))
        );
        assert_eq!(
            parse_library_name("My_Game_AMTE_5DE8.gba"),
            Some(("AMTE".into(), "5DE8".into()))
        );
    }

    #[test]
    fn rejects_names_without_ids() {
        assert_eq!(parse_library_name("game.gba"), None);
        assert_eq!(parse_library_name("game_AMTEX_5DE8.gba"), None);
        assert_eq!(parse_library_name("game_AMTE_123456789.gba"), None);
        assert_eq!(parse_library_name("game_amte_5de8.gba"), None);
        assert_eq!(parse_library_name("game_AMTE_5DE8"), None);
    }

    #[test]
    fn splits_rom_extensions() {
        assert_eq!(split_rom_extension("Zelda.GBC"), ("Zelda", ".GBC".to_string()));
        assert_eq!(split_rom_extension("Tetris.gb"), ("Tetris", ".gb".to_string()));
        assert_eq!(split_rom_extension("Fusion"), ("Fusion", ".gba".to_string()));
    }

    #[test]
    fn release_entry_inherits_base_metadata() {
        let base = CatalogEntry {
            full_name: "Base".into(),
            cover_image: "cover.png".into(),
            publisher: "Nintendo".into(),
            save_type: "SRAM_V112".into(),
            ..Default::default()
        };
        let release = PatchRelease {
            full_name: "Base (Hack)".into(),
            cart_id: "AMTE".into(),
            checksum1000: "5DE8".into(),
            crc: "DEADBEEF".into(),
            cart_size: 8 * 1024 * 1024,
            console: ".gba".into(),
            patch_file: "Base (Hack).bps".into(),
        };
        let entry = release.to_entry(Some(&base));
        assert_eq!(release.document_name(), "5DE8-AMTE.json");
        assert_eq!(entry.publisher, "Nintendo");
        assert_eq!(entry.save_type, "SRAM_V112");
        assert_eq!(entry.patch_file.as_deref(), Some("./patches/Base (Hack).bps"));
        assert_eq!(entry.full_name, "Base (Hack)");
    }
}
