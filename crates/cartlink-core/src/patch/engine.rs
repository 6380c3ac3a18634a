//! Guarded application of change-group patches.
//!
//! The guard is the 32-bit wrapping sum of every source byte whose
//! modification carries a literal modified value. Application is refused
//! unless the source reproduces it exactly.
//!
//! After the guard passes, modifications are replayed in file order with an
//! 8-bit accumulator of the same source bytes. A literal original value `d`
//! turns the reference byte `r` into `r - d`, where `r` is the source byte
//! for literal-modified entries and the running accumulator for wildcard
//! ones. A wildcard original leaves the byte as it was.

use log::{debug, warn};

use super::{ByteSpec, ChangeGroup, ParsedPatch, PatchError};

fn working_copy(source: &[u8], patch: &ParsedPatch) -> Vec<u8> {
    let mut working = source.to_vec();
    if let Some(len) = patch.target_len {
        working.resize(len, 0);
    }
    working
}

fn offset_of(group: &ChangeGroup, index: usize, len: usize) -> Result<usize, PatchError> {
    match group.start.checked_add(index) {
        Some(offset) if offset < len => Ok(offset),
        Some(offset) => Err(PatchError::OutOfRange { offset, len }),
        None => Err(PatchError::OutOfRange {
            offset: usize::MAX,
            len,
        }),
    }
}

fn guard_sum(working: &[u8], patch: &ParsedPatch) -> Result<u32, PatchError> {
    let mut sum: u32 = 0;
    for group in &patch.groups {
        for (i, modification) in group.modifications.iter().enumerate() {
            let offset = offset_of(group, i, working.len())?;
            if !modification.modified.is_wildcard() {
                sum = sum.wrapping_add(u32::from(working[offset]));
            }
        }
    }
    Ok(sum)
}

fn verify_guard(working: &[u8], patch: &ParsedPatch) -> Result<(), PatchError> {
    let actual = guard_sum(working, patch)?;
    if actual != patch.checksum_guard {
        warn!(
            "Patch guard mismatch: expected {:#010X}, image sums to {actual:#010X}",
            patch.checksum_guard
        );
        return Err(PatchError::Incompatible {
            expected: patch.checksum_guard,
            actual,
        });
    }
    Ok(())
}

/// Checks that `patch` was built for `source` without producing output.
pub fn check_compatibility(source: &[u8], patch: &ParsedPatch) -> Result<(), PatchError> {
    verify_guard(&working_copy(source, patch), patch)
}

/// Applies `patch` to a copy of `source`.
///
/// Fails with [`PatchError::Incompatible`] before anything is written when
/// the guard does not match, and with [`PatchError::OutOfRange`] when a
/// modification falls outside the image.
pub fn apply(source: &[u8], patch: &ParsedPatch) -> Result<Vec<u8>, PatchError> {
    let working = working_copy(source, patch);
    verify_guard(&working, patch)?;

    let mut output = working.clone();
    let mut accumulator: u8 = 0;
    let mut written = 0usize;

    for group in &patch.groups {
        for (i, modification) in group.modifications.iter().enumerate() {
            let offset = offset_of(group, i, working.len())?;
            let reference = match modification.modified {
                ByteSpec::Literal(_) => {
                    accumulator = accumulator.wrapping_add(working[offset]);
                    working[offset]
                }
                ByteSpec::Wildcard => accumulator,
            };
            if let ByteSpec::Literal(difference) = modification.original {
                output[offset] = reference.wrapping_sub(difference);
                written += 1;
            }
        }
    }

    debug!(
        "Applied {} change groups ({written} bytes written, {} byte image)",
        patch.groups.len(),
        output.len()
    );
    Ok(output)
}
