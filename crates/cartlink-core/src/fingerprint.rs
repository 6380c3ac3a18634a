//! Checksum slots of the reader descriptor and the CRC-32 used for ROMs and
//! patch containers.

use crc::{CRC_32_ISO_HDLC, Crc};

use crate::MIB;
use crate::descriptor::GameDescriptor;

pub(crate) const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// One of the five checksum fields the reader precomputes per dump size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumSlot {
    Mb1,
    Mb2,
    Mb4,
    Mb8,
    Mb16,
}

impl ChecksumSlot {
    pub const ALL: [ChecksumSlot; 5] = [Self::Mb1, Self::Mb2, Self::Mb4, Self::Mb8, Self::Mb16];

    /// Slot for a declared cartridge size. Only exact 1/2/4/8/16 MiB sizes
    /// have one.
    pub fn for_cart_size(cart_size_bytes: u64) -> Option<Self> {
        if cart_size_bytes % MIB != 0 {
            return None;
        }
        match cart_size_bytes / MIB {
            1 => Some(Self::Mb1),
            2 => Some(Self::Mb2),
            4 => Some(Self::Mb4),
            8 => Some(Self::Mb8),
            16 => Some(Self::Mb16),
            _ => None,
        }
    }

    pub fn size_bytes(self) -> u64 {
        MIB * match self {
            Self::Mb1 => 1,
            Self::Mb2 => 2,
            Self::Mb4 => 4,
            Self::Mb8 => 8,
            Self::Mb16 => 16,
        }
    }
}

/// Selects the descriptor checksum matching `cart_size_bytes`, upper-cased.
///
/// Returns an empty string when the size has no checksum slot; callers treat
/// that as "unresolved".
pub fn checksum_variant(descriptor: &GameDescriptor, cart_size_bytes: u64) -> String {
    ChecksumSlot::for_cart_size(cart_size_bytes)
        .map(|slot| descriptor.checksum(slot).to_uppercase())
        .unwrap_or_default()
}

/// CRC-32 of a ROM image as uppercase hex without leading zeros.
pub fn rom_crc32(image: &[u8]) -> String {
    format!("{:X}", CRC32.checksum(image))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> GameDescriptor {
        GameDescriptor {
            rom_name: "GAME".into(),
            checksum_1mb: "aa".into(),
            checksum_2mb: "bb".into(),
            checksum_4mb: "cc".into(),
            checksum_8mb: "dd".into(),
            checksum_16mb: "ee".into(),
            ..Default::default()
        }
    }

    #[test]
    fn selects_slot_by_cart_size() {
        let desc = descriptor();
        assert_eq!(checksum_variant(&desc, 4 * MIB), "CC");
        assert_eq!(checksum_variant(&desc, MIB), "AA");
        assert_eq!(checksum_variant(&desc, 16 * MIB), "EE");
    }

    #[test]
    fn unsupported_sizes_are_unresolved() {
        let desc = descriptor();
        assert_eq!(checksum_variant(&desc, 32 * MIB), "");
        assert_eq!(checksum_variant(&desc, 3 * MIB), "");
        assert_eq!(checksum_variant(&desc, MIB + 1), "");
        assert_eq!(checksum_variant(&desc, 0), "");
    }

    #[test]
    fn slot_sizes_round_trip() {
        for slot in ChecksumSlot::ALL {
            assert_eq!(ChecksumSlot::for_cart_size(slot.size_bytes()), Some(slot));
        }
    }

    #[test]
    fn crc_matches_reference_value() {
        assert_eq!(rom_crc32(b"123456789"), "CBF43926");
        assert_eq!(rom_crc32(&[]), "0");
    }
}
