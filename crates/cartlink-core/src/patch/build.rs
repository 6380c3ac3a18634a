use log::debug;

use super::{ByteSpec, ChangeGroup, Modification, ParsedPatch};

/// Equal bytes between two changed runs that are absorbed into one group
/// rather than starting a new one.
pub const MAX_BRIDGED_GAP: usize = 3;

/// Computes a change-group patch turning `original` into `modified`.
///
/// The buffers may differ in length; the patch records the target length.
pub fn build(original: &[u8], modified: &[u8]) -> ParsedPatch {
    let mut working = original.to_vec();
    working.resize(modified.len(), 0);

    let mut groups = Vec::new();
    let mut current: Option<ChangeGroup> = None;
    let mut guard: u32 = 0;

    for (offset, (&from, &to)) in working.iter().zip(modified).enumerate() {
        if from == to {
            continue;
        }

        let mut group = match current.take() {
            Some(mut group) if offset - group.end <= MAX_BRIDGED_GAP => {
                while group.end < offset {
                    group.push(Modification::UNCHANGED);
                }
                group
            }
            Some(group) => {
                groups.push(group);
                ChangeGroup::new(offset)
            }
            None => ChangeGroup::new(offset),
        };

        group.push(Modification::new(
            ByteSpec::Literal(from.wrapping_sub(to)),
            ByteSpec::Literal(to),
        ));
        guard = guard.wrapping_add(u32::from(from));
        current = Some(group);
    }
    groups.extend(current);

    let patch = ParsedPatch {
        groups,
        checksum_guard: guard,
        target_len: Some(modified.len()),
    };
    debug!(
        "Built patch: {} groups, {} modifications, guard {:#010X}",
        patch.groups.len(),
        patch.modification_count(),
        patch.checksum_guard
    );
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::engine;

    #[test]
    fn identical_buffers_produce_no_groups() {
        let data = [1, 2, 3];
        let patch = build(&data, &data);
        assert!(patch.groups.is_empty());
        assert_eq!(patch.checksum_guard, 0);
        assert_eq!(engine::apply(&data, &patch).unwrap(), data);
    }

    #[test]
    fn short_gaps_are_bridged() {
        let original = [0u8; 16];
        let mut modified = original;
        modified[2] = 1;
        modified[5] = 1; // gap of 2
        modified[12] = 1; // gap of 6
        let patch = build(&original, &modified);
        assert_eq!(patch.groups.len(), 2);
        assert_eq!((patch.groups[0].start, patch.groups[0].end), (2, 6));
        assert_eq!(patch.groups[0].modifications[1], Modification::UNCHANGED);
        assert_eq!((patch.groups[1].start, patch.groups[1].end), (12, 13));
        assert!(patch.groups.iter().all(ChangeGroup::is_well_formed));
        assert_eq!(engine::apply(&original, &patch).unwrap(), modified);
    }

    #[test]
    fn guard_sums_changed_source_bytes() {
        let original = [0x10, 0x20, 0x30];
        let modified = [0x11, 0x20, 0x31];
        let patch = build(&original, &modified);
        assert_eq!(patch.checksum_guard, 0x10 + 0x30);
    }

    #[test]
    fn length_changes_round_trip() {
        let original = [1u8, 2, 3, 4, 5, 6];
        let longer = [1u8, 2, 9, 4, 5, 6, 0, 7];
        let shorter = [1u8, 2, 3];
        assert_eq!(
            engine::apply(&original, &build(&original, &longer)).unwrap(),
            longer
        );
        assert_eq!(
            engine::apply(&original, &build(&original, &shorter)).unwrap(),
            shorter
        );
    }
}
