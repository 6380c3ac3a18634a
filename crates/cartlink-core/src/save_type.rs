//! Save chip labels as they appear in catalog documents, and the numeric
//! codes the reader firmware expects in its query strings.

use std::fmt;
use std::str::FromStr;

use log::warn;
use thiserror::Error;

/// Save chip labels used by catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveType {
    Flash1mV102,
    Flash1mV103,
    FlashV124,
    FlashV126,
    FlashEcla,
    EepromV122,
    EepromV124,
    SramV112,
    SramV113,
    ReproFlash1m,
    None,
}

impl SaveType {
    pub const ALL: [SaveType; 11] = [
        Self::Flash1mV102,
        Self::Flash1mV103,
        Self::FlashV124,
        Self::FlashV126,
        Self::FlashEcla,
        Self::EepromV122,
        Self::EepromV124,
        Self::SramV112,
        Self::SramV113,
        Self::ReproFlash1m,
        Self::None,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Flash1mV102 => "FLASH1M_V102",
            Self::Flash1mV103 => "FLASH1M_V103",
            Self::FlashV124 => "FLASH_V124",
            Self::FlashV126 => "FLASH_V126",
            Self::FlashEcla => "FLASH_ECLA",
            Self::EepromV122 => "EEPROM_V122",
            Self::EepromV124 => "EEPROM_V124",
            Self::SramV112 => "SRAM_V112",
            Self::SramV113 => "SRAM_V113",
            Self::ReproFlash1m => "REPRO_FLASH1M",
            Self::None => "NONE",
        }
    }

    pub fn code(self) -> SaveTypeCode {
        // Every known label decodes to a valid code.
        SaveTypeCode(save_type_code(self.label()) as u8)
    }
}

impl fmt::Display for SaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid save type '{0}'")]
pub struct InvalidSaveType(pub String);

impl FromStr for SaveType {
    type Err = InvalidSaveType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.label() == s)
            .ok_or_else(|| InvalidSaveType(s.to_string()))
    }
}

/// Maps a save-type label to the reader protocol integer.
///
/// Decoding looks at fixed character positions of the upstream labels
/// (`FLASH1M_...` has `'1'` at index 5, `REPRO_FLASH1M` at index 11), not at
/// prefixes. Unknown labels yield `-1`.
pub fn save_type_code(label: &str) -> i32 {
    let bytes = label.as_bytes();
    let at = |i: usize| bytes.get(i).copied();

    match at(0) {
        Some(b'N') => 0,
        Some(b'E') => 1,
        Some(b'S') => 3,
        Some(b'F') if at(5) == Some(b'1') => 5,
        Some(b'F') => 4,
        Some(b'R') if at(11) == Some(b'1') => 55,
        _ => -1,
    }
}

/// A save-type code known to be valid for the reader protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SaveTypeCode(u8);

impl SaveTypeCode {
    /// Code used when dumping a ROM without a known save chip.
    pub const FLASH: SaveTypeCode = SaveTypeCode(4);

    pub fn from_label(label: &str) -> Result<Self, InvalidSaveType> {
        match save_type_code(label) {
            -1 => {
                warn!("Invalid save type '{label}'");
                Err(InvalidSaveType(label.to_string()))
            }
            code => Ok(Self(code as u8)),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for SaveTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reference_labels() {
        assert_eq!(save_type_code("NONE"), 0);
        assert_eq!(save_type_code("EEPROM_V122"), 1);
        assert_eq!(save_type_code("SRAM_V112"), 3);
        assert_eq!(save_type_code("FLASH1M_V102"), 5);
        assert_eq!(save_type_code("FLASH_V124"), 4);
        assert_eq!(save_type_code("REPRO_FLASH1M"), 55);
        assert_eq!(save_type_code("XYZ"), -1);
    }

    #[test]
    fn decoding_is_positional() {
        // '1' at index 5 regardless of what precedes it.
        assert_eq!(save_type_code("FxxxX1"), 5);
        // FLASH_ECLA has no '1' at index 5.
        assert_eq!(save_type_code("FLASH_ECLA"), 4);
        // A repro label shorter than 12 characters is not recognised.
        assert_eq!(save_type_code("REPRO_FLASH"), -1);
        assert_eq!(save_type_code("R0000000000"), -1);
        assert_eq!(save_type_code(""), -1);
        assert_eq!(save_type_code("none"), -1);
    }

    #[test]
    fn every_known_label_has_a_code() {
        for save_type in SaveType::ALL {
            assert_ne!(save_type_code(save_type.label()), -1, "{save_type}");
            assert_eq!(save_type.label().parse::<SaveType>(), Ok(save_type));
        }
        assert_eq!(SaveType::Flash1mV103.code().value(), 5);
        assert_eq!(SaveType::SramV113.code().value(), 3);
    }

    #[test]
    fn invalid_label_is_an_error() {
        assert_eq!(
            SaveTypeCode::from_label("XYZ"),
            Err(InvalidSaveType("XYZ".into()))
        );
        assert_eq!(SaveTypeCode::from_label("REPRO_FLASH1M").unwrap().value(), 55);
    }
}
