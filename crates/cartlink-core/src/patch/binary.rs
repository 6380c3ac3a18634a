//! Compact binary container for change-group patches.
//!
//! ```text
//! "CGRP" | version u8 | flags u8 | [varint target_len] | varint group_count
//! group: varint start | varint entry_count | entry*
//! entry: tag u8 | [original u8] | [modified u8]
//! u32le checksum_guard | u32le crc32
//! ```
//!
//! Tag bit 0 marks a literal original byte, bit 1 a literal modified byte.
//! The trailing CRC-32 covers everything before it.

use log::trace;

use super::varint::{self, Reader};
use super::{ByteSpec, ChangeGroup, Modification, ParsedPatch, PatchError};
use crate::fingerprint::CRC32;

pub const MAGIC: &[u8; 4] = b"CGRP";
pub const VERSION: u8 = 1;

const FLAG_TARGET_LEN: u8 = 0x01;
const TAG_ORIGINAL: u8 = 0x01;
const TAG_MODIFIED: u8 = 0x02;
const FOOTER_LEN: usize = 8;

pub fn encode(patch: &ParsedPatch) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + patch.modification_count() * 3);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    match patch.target_len {
        Some(len) => {
            out.push(FLAG_TARGET_LEN);
            varint::write(&mut out, len as u64);
        }
        None => out.push(0),
    }

    varint::write(&mut out, patch.groups.len() as u64);
    for group in &patch.groups {
        varint::write(&mut out, group.start as u64);
        varint::write(&mut out, group.modifications.len() as u64);
        for m in &group.modifications {
            let mut tag = 0;
            if m.original.literal().is_some() {
                tag |= TAG_ORIGINAL;
            }
            if m.modified.literal().is_some() {
                tag |= TAG_MODIFIED;
            }
            out.push(tag);
            out.extend(m.original.literal());
            out.extend(m.modified.literal());
        }
    }

    out.extend_from_slice(&patch.checksum_guard.to_le_bytes());
    let crc = CRC32.checksum(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

fn read_spec(reader: &mut Reader<'_>, literal: bool) -> Result<ByteSpec, PatchError> {
    Ok(if literal {
        ByteSpec::Literal(reader.u8()?)
    } else {
        ByteSpec::Wildcard
    })
}

pub fn decode(bytes: &[u8]) -> Result<ParsedPatch, PatchError> {
    if !bytes.starts_with(MAGIC) {
        return Err(PatchError::BadMagic("change-group binary"));
    }
    let body_len = bytes
        .len()
        .checked_sub(4)
        .filter(|len| *len >= MAGIC.len() + 2 + 1 + 4)
        .ok_or(PatchError::Truncated)?;
    let expected = u32::from_le_bytes([
        bytes[body_len],
        bytes[body_len + 1],
        bytes[body_len + 2],
        bytes[body_len + 3],
    ]);
    let actual = CRC32.checksum(&bytes[..body_len]);
    if expected != actual {
        return Err(PatchError::PatchCrc { expected, actual });
    }

    let mut reader = Reader::new(&bytes[MAGIC.len()..bytes.len() - FOOTER_LEN]);
    let version = reader.u8()?;
    if version != VERSION {
        return Err(PatchError::UnsupportedVersion {
            format: "change-group binary",
            version,
        });
    }
    let flags = reader.u8()?;
    if flags & !FLAG_TARGET_LEN != 0 {
        return Err(PatchError::Malformed(format!("unknown flags {flags:#04X}")));
    }
    let target_len = if flags & FLAG_TARGET_LEN != 0 {
        Some(reader.varint_usize()?)
    } else {
        None
    };

    let group_count = reader.varint_usize()?;
    if group_count > reader.remaining() {
        return Err(PatchError::Truncated);
    }
    let mut groups = Vec::with_capacity(group_count);
    for _ in 0..group_count {
        let start = reader.varint_usize()?;
        let count = reader.varint_usize()?;
        if count > reader.remaining() {
            return Err(PatchError::Truncated);
        }
        if start.checked_add(count).is_none() {
            return Err(PatchError::Malformed(format!(
                "group at {start:#X} runs past the address space"
            )));
        }
        let mut group = ChangeGroup::new(start);
        group.modifications.reserve(count);
        for _ in 0..count {
            let tag = reader.u8()?;
            if tag & !(TAG_ORIGINAL | TAG_MODIFIED) != 0 {
                return Err(PatchError::Malformed(format!("unknown entry tag {tag:#04X}")));
            }
            let original = read_spec(&mut reader, tag & TAG_ORIGINAL != 0)?;
            let modified = read_spec(&mut reader, tag & TAG_MODIFIED != 0)?;
            group.push(Modification::new(original, modified));
        }
        groups.push(group);
    }
    if !reader.is_empty() {
        return Err(PatchError::Malformed(format!(
            "{} unexpected bytes after the last group",
            reader.remaining()
        )));
    }

    let guard_at = bytes.len() - FOOTER_LEN;
    let checksum_guard = u32::from_le_bytes([
        bytes[guard_at],
        bytes[guard_at + 1],
        bytes[guard_at + 2],
        bytes[guard_at + 3],
    ]);
    trace!("Decoded {} change groups, guard {checksum_guard:#010X}", groups.len());

    Ok(ParsedPatch {
        groups,
        checksum_guard,
        target_len,
    })
}
