//! BPS patches: a header of varint sizes, a list of copy actions and a
//! CRC-32 footer covering the source, the target and the patch itself.

use log::{debug, warn};

use super::PatchError;
use super::varint::{self, Reader};
use crate::fingerprint::CRC32;

pub const MAGIC: &[u8; 4] = b"BPS1";

const FOOTER_LEN: usize = 12;
const SOURCE_READ: u64 = 0;
const TARGET_READ: u64 = 1;
const SOURCE_COPY: u64 = 2;
const TARGET_COPY: u64 = 3;

/// Shortest run worth encoding as a copy instead of literal bytes.
const MIN_RUN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Copies source bytes at the current output position.
    SourceRead { length: usize },
    /// Emits literal bytes.
    TargetRead { bytes: Vec<u8> },
    /// Copies from the source; `offset` moves the source cursor first.
    SourceCopy { length: usize, offset: i64 },
    /// Copies already written output; `offset` moves the target cursor first.
    /// The ranges may overlap, which is how runs are encoded.
    TargetCopy { length: usize, offset: i64 },
}

impl Action {
    fn length(&self) -> usize {
        match self {
            Self::SourceRead { length }
            | Self::SourceCopy { length, .. }
            | Self::TargetCopy { length, .. } => *length,
            Self::TargetRead { bytes } => bytes.len(),
        }
    }

    fn kind(&self) -> u64 {
        match self {
            Self::SourceRead { .. } => SOURCE_READ,
            Self::TargetRead { .. } => TARGET_READ,
            Self::SourceCopy { .. } => SOURCE_COPY,
            Self::TargetCopy { .. } => TARGET_COPY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BpsPatch {
    pub source_size: usize,
    pub target_size: usize,
    pub metadata: Vec<u8>,
    pub actions: Vec<Action>,
    pub source_crc: u32,
    pub target_crc: u32,
}

fn footer_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

pub fn parse(bytes: &[u8]) -> Result<BpsPatch, PatchError> {
    if !bytes.starts_with(MAGIC) {
        return Err(PatchError::BadMagic("BPS"));
    }
    if bytes.len() < MAGIC.len() + 3 + FOOTER_LEN {
        return Err(PatchError::Truncated);
    }
    let crc_at = bytes.len() - 4;
    let expected = footer_u32(bytes, crc_at);
    let actual = CRC32.checksum(&bytes[..crc_at]);
    if expected != actual {
        return Err(PatchError::PatchCrc { expected, actual });
    }

    let footer = bytes.len() - FOOTER_LEN;
    let mut reader = Reader::new(&bytes[MAGIC.len()..footer]);
    let source_size = reader.varint_usize()?;
    let target_size = reader.varint_usize()?;
    let metadata_len = reader.varint_usize()?;
    let metadata = reader.bytes(metadata_len)?.to_vec();

    let mut actions = Vec::new();
    while !reader.is_empty() {
        let data = reader.varint()?;
        let length = usize::try_from((data >> 2) + 1)
            .map_err(|_| PatchError::Malformed("action length too large".into()))?;
        let action = match data & 3 {
            SOURCE_READ => Action::SourceRead { length },
            TARGET_READ => Action::TargetRead {
                bytes: reader.bytes(length)?.to_vec(),
            },
            SOURCE_COPY => Action::SourceCopy {
                length,
                offset: reader.signed()?,
            },
            _ => Action::TargetCopy {
                length,
                offset: reader.signed()?,
            },
        };
        actions.push(action);
    }

    Ok(BpsPatch {
        source_size,
        target_size,
        metadata,
        actions,
        source_crc: footer_u32(bytes, footer),
        target_crc: footer_u32(bytes, footer + 4),
    })
}

/// Encodes `patch`, returning the bytes and the patch CRC stored in them.
pub fn serialize(patch: &BpsPatch) -> (Vec<u8>, u32) {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    varint::write(&mut out, patch.source_size as u64);
    varint::write(&mut out, patch.target_size as u64);
    varint::write(&mut out, patch.metadata.len() as u64);
    out.extend_from_slice(&patch.metadata);

    for action in &patch.actions {
        let length = action.length().max(1) as u64;
        varint::write(&mut out, ((length - 1) << 2) | action.kind());
        match action {
            Action::SourceRead { .. } => {}
            Action::TargetRead { bytes } => out.extend_from_slice(bytes),
            Action::SourceCopy { offset, .. } | Action::TargetCopy { offset, .. } => {
                varint::write_signed(&mut out, *offset)
            }
        }
    }

    out.extend_from_slice(&patch.source_crc.to_le_bytes());
    out.extend_from_slice(&patch.target_crc.to_le_bytes());
    let crc = CRC32.checksum(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    (out, crc)
}

fn copy_range(cursor: i64, length: usize, len: usize) -> Result<std::ops::Range<usize>, PatchError> {
    usize::try_from(cursor)
        .ok()
        .and_then(|start| Some(start..start.checked_add(length)?))
        .filter(|range| range.end <= len)
        .ok_or_else(|| {
            PatchError::Malformed(format!("copy of {length} bytes at {cursor} is out of bounds"))
        })
}

/// Applies a BPS patch. The source must be the exact image it was built
/// from, and the result must match the recorded target CRC.
pub fn apply(patch: &BpsPatch, source: &[u8]) -> Result<Vec<u8>, PatchError> {
    if source.len() != patch.source_size {
        return Err(PatchError::SourceMismatch(format!(
            "expected {} bytes, got {}",
            patch.source_size,
            source.len()
        )));
    }
    let source_crc = CRC32.checksum(source);
    if source_crc != patch.source_crc {
        warn!(
            "BPS source CRC {source_crc:08X} does not match {:08X}",
            patch.source_crc
        );
        return Err(PatchError::SourceMismatch(format!(
            "CRC {source_crc:08X}, patch expects {:08X}",
            patch.source_crc
        )));
    }

    let mut output: Vec<u8> = Vec::with_capacity(patch.target_size);
    let mut source_rel: i64 = 0;
    let mut target_rel: i64 = 0;

    for action in &patch.actions {
        if output.len() + action.length() > patch.target_size {
            return Err(PatchError::Malformed(format!(
                "actions write past the {}-byte target",
                patch.target_size
            )));
        }
        match action {
            Action::SourceRead { length } => {
                let range = copy_range(output.len() as i64, *length, source.len())?;
                output.extend_from_slice(&source[range]);
            }
            Action::TargetRead { bytes } => output.extend_from_slice(bytes),
            Action::SourceCopy { length, offset } => {
                source_rel = source_rel.saturating_add(*offset);
                let range = copy_range(source_rel, *length, source.len())?;
                output.extend_from_slice(&source[range]);
                source_rel += *length as i64;
            }
            Action::TargetCopy { length, offset } => {
                target_rel = target_rel.saturating_add(*offset);
                let start = copy_range(target_rel, 1, output.len())?.start;
                for i in start..start + length {
                    let byte = output[i];
                    output.push(byte);
                }
                target_rel += *length as i64;
            }
        }
    }

    if output.len() != patch.target_size {
        return Err(PatchError::Malformed(format!(
            "actions produce {} bytes, target is {}",
            output.len(),
            patch.target_size
        )));
    }
    let target_crc = CRC32.checksum(&output);
    if target_crc != patch.target_crc {
        return Err(PatchError::TargetCrc {
            expected: patch.target_crc,
            actual: target_crc,
        });
    }
    debug!(
        "Applied BPS patch: {} actions, {} -> {} bytes",
        patch.actions.len(),
        source.len(),
        output.len()
    );
    Ok(output)
}

fn run_len(target: &[u8], from: usize, mut same: impl FnMut(usize) -> bool) -> usize {
    (from..target.len()).take_while(|&i| same(i)).count()
}

/// Builds a patch turning `source` into `target`.
///
/// The encoder is linear: bytes that still sit at the same offset in the
/// source become `SourceRead`, repeats of the previous output byte become an
/// overlapping `TargetCopy`, and everything else is emitted literally.
pub fn build(source: &[u8], target: &[u8]) -> BpsPatch {
    let mut actions = Vec::new();
    let mut pending = Vec::new();
    let mut target_rel: i64 = 0;
    let mut i = 0;

    let flush = |pending: &mut Vec<u8>, actions: &mut Vec<Action>| {
        if !pending.is_empty() {
            actions.push(Action::TargetRead {
                bytes: std::mem::take(pending),
            });
        }
    };

    while i < target.len() {
        let source_run = run_len(target, i, |j| source.get(j) == Some(&target[j]));
        let repeat_run = match i.checked_sub(1) {
            Some(prev) => run_len(target, i, |j| target[j] == target[prev]),
            None => 0,
        };

        if source_run >= MIN_RUN && source_run >= repeat_run {
            flush(&mut pending, &mut actions);
            actions.push(Action::SourceRead { length: source_run });
            i += source_run;
        } else if repeat_run >= MIN_RUN {
            flush(&mut pending, &mut actions);
            let prev = (i - 1) as i64;
            actions.push(Action::TargetCopy {
                length: repeat_run,
                offset: prev - target_rel,
            });
            target_rel = prev + repeat_run as i64;
            i += repeat_run;
        } else {
            pending.push(target[i]);
            i += 1;
        }
    }
    flush(&mut pending, &mut actions);

    debug!(
        "Built BPS patch: {} actions for {} -> {} bytes",
        actions.len(),
        source.len(),
        target.len()
    );
    BpsPatch {
        source_size: source.len(),
        target_size: target.len(),
        metadata: Vec::new(),
        actions,
        source_crc: CRC32.checksum(source),
        target_crc: CRC32.checksum(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reads_and_runs() {
        let source = [1, 2, 3, 4, 5, 6];
        let target = [1, 2, 3, 4, 9, 9, 9, 9, 9, 9];
        let patch = build(&source, &target);
        assert_eq!(
            patch.actions,
            vec![
                Action::SourceRead { length: 4 },
                Action::TargetRead { bytes: vec![9] },
                Action::TargetCopy {
                    length: 5,
                    offset: 4
                },
            ]
        );

        let (bytes, crc) = serialize(&patch);
        assert_eq!(
            &bytes[..MAGIC.len() + 8],
            b"BPS1\x86\x8A\x80\x8C\x81\x09\x93\x88"
        );
        assert_eq!(bytes[bytes.len() - 4..], crc.to_le_bytes());
        assert_eq!(apply(&parse(&bytes).unwrap(), &source).unwrap(), target);
    }

    #[test]
    fn reproduces_assorted_targets() {
        let source: Vec<u8> = (0..200u8).collect();
        let mut edited = source.clone();
        edited[50..60].fill(0xAA);
        edited[120] ^= 0xFF;

        let mut longer = source.clone();
        longer.extend([7u8; 64]);
        let empty: &[u8] = &[];

        let cases: Vec<(&[u8], Vec<u8>)> = vec![
            (source.as_slice(), source.clone()),
            (source.as_slice(), edited),
            (source.as_slice(), source[..37].to_vec()),
            (source.as_slice(), longer),
            (empty, vec![1, 1, 1, 1, 1, 2]),
            (source.as_slice(), Vec::new()),
        ];
        for (from, to) in cases {
            let patch = build(from, &to);
            assert_eq!(apply(&patch, from).unwrap(), to);
        }
    }

    #[test]
    fn wrong_source_is_rejected() {
        let patch = build(&[1, 2, 3, 4], &[1, 2, 3, 5]);
        assert!(matches!(
            apply(&patch, &[1, 2, 3]),
            Err(PatchError::SourceMismatch(_))
        ));
        let err = apply(&patch, &[9, 9, 9, 9]).unwrap_err();
        assert!(err.is_incompatible());
    }

    #[test]
    fn corrupted_patch_fails_crc() {
        let (mut bytes, _) = serialize(&build(&[0; 8], &[1; 8]));
        bytes[5] ^= 0x01;
        assert!(matches!(parse(&bytes), Err(PatchError::PatchCrc { .. })));
        assert_eq!(parse(b"UPS1").unwrap_err(), PatchError::BadMagic("BPS"));
    }

    #[test]
    fn out_of_bounds_copy_is_an_error() {
        let mut patch = build(&[1, 2, 3, 4], &[1, 2, 3, 4]);
        patch.actions = vec![Action::SourceCopy {
            length: 4,
            offset: 2,
        }];
        assert!(matches!(
            apply(&patch, &[1, 2, 3, 4]),
            Err(PatchError::Malformed(_))
        ));
    }
}
