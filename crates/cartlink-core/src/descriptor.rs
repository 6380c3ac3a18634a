use serde::{Deserialize, Serialize};

use crate::fingerprint::ChecksumSlot;
use crate::json;

/// Basic descriptor returned by the reader device's `get_game_info` endpoint.
///
/// Field names follow the firmware's JSON keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameDescriptor {
    #[serde(rename = "cartID", deserialize_with = "json::string_or_number")]
    pub cart_id: String,
    #[serde(rename = "romName", deserialize_with = "json::string_or_number")]
    pub rom_name: String,
    #[serde(rename = "romVersion", deserialize_with = "json::string_or_number")]
    pub rom_version: String,
    /// Global checksum as reported by the cartridge header (GB/GBC).
    #[serde(rename = "checksumStr", deserialize_with = "json::string_or_number")]
    pub checksum_str: String,
    #[serde(rename = "checksum_1MB", deserialize_with = "json::string_or_number")]
    pub checksum_1mb: String,
    #[serde(rename = "checksum_2MB", deserialize_with = "json::string_or_number")]
    pub checksum_2mb: String,
    #[serde(rename = "checksum_4MB", deserialize_with = "json::string_or_number")]
    pub checksum_4mb: String,
    #[serde(rename = "checksum_8MB", deserialize_with = "json::string_or_number")]
    pub checksum_8mb: String,
    #[serde(rename = "checksum_16MB", deserialize_with = "json::string_or_number")]
    pub checksum_16mb: String,
    #[serde(deserialize_with = "json::bool_or_number")]
    pub is_gba: bool,
}

impl Default for GameDescriptor {
    fn default() -> Self {
        Self {
            cart_id: String::new(),
            rom_name: String::new(),
            rom_version: String::new(),
            checksum_str: String::new(),
            checksum_1mb: String::new(),
            checksum_2mb: String::new(),
            checksum_4mb: String::new(),
            checksum_8mb: String::new(),
            checksum_16mb: String::new(),
            // Older firmware omits the flag and only reads GBA carts.
            is_gba: true,
        }
    }
}

impl GameDescriptor {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Raw checksum string stored for `slot`, as reported by the reader.
    pub fn checksum(&self, slot: ChecksumSlot) -> &str {
        match slot {
            ChecksumSlot::Mb1 => &self.checksum_1mb,
            ChecksumSlot::Mb2 => &self.checksum_2mb,
            ChecksumSlot::Mb4 => &self.checksum_4mb,
            ChecksumSlot::Mb8 => &self.checksum_8mb,
            ChecksumSlot::Mb16 => &self.checksum_16mb,
        }
    }

    /// Whether the reader saw a cartridge at all.
    pub fn has_cartridge(&self) -> bool {
        !self.rom_name.is_empty()
    }

    /// File extension the reader serves the ROM under.
    pub fn rom_extension(&self) -> &'static str {
        if self.is_gba { "gba" } else { "gb" }
    }
}
