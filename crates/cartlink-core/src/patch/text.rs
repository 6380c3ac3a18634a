//! Line-oriented change-group patch descriptions.
//!
//! ```text
//! Change Group 1: Start = 0x1F0, End = 0x1F2
//! Original: 0x05 -> Modified: 0x1B
//! Original: * -> Modified: *
//! Checksum Changes: 0x0000004F
//! ```
//!
//! An optional `Target Size: 0x<hex>` line records an output length that
//! differs from the source.

use std::fmt::Write as _;

use log::warn;

use super::{ByteSpec, ChangeGroup, Modification, ParsedPatch, PatchError};

const GROUP_PREFIX: &str = "Change Group";
const MOD_PREFIX: &str = "Original:";
const MODIFIED_PREFIX: &str = "Modified:";
const CHECKSUM_PREFIX: &str = "Checksum Changes:";
const TARGET_PREFIX: &str = "Target Size:";

fn syntax(line: usize, message: impl Into<String>) -> PatchError {
    PatchError::Syntax {
        line,
        message: message.into(),
    }
}

fn parse_hex(text: &str) -> Option<u64> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

fn parse_offset(text: &str, line: usize) -> Result<usize, PatchError> {
    parse_hex(text)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| syntax(line, format!("invalid offset '{}'", text.trim())))
}

fn parse_byte_spec(text: &str, line: usize) -> Result<ByteSpec, PatchError> {
    let text = text.trim();
    if text == "*" {
        return Ok(ByteSpec::Wildcard);
    }
    parse_hex(text)
        .and_then(|v| u8::try_from(v).ok())
        .map(ByteSpec::Literal)
        .ok_or_else(|| syntax(line, format!("invalid byte '{text}'")))
}

fn parse_header(rest: &str, line: usize) -> Result<ChangeGroup, PatchError> {
    let (_, range) = rest
        .split_once(':')
        .ok_or_else(|| syntax(line, "change group header is missing ':'"))?;

    let mut start = None;
    let mut end = None;
    for field in range.split(',') {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| syntax(line, format!("expected 'key = value', got '{}'", field.trim())))?;
        match key.trim() {
            "Start" => start = Some(parse_offset(value, line)?),
            "End" => end = Some(parse_offset(value, line)?),
            other => return Err(syntax(line, format!("unknown field '{other}'"))),
        }
    }

    let start = start.ok_or_else(|| syntax(line, "missing Start"))?;
    let end = end.ok_or_else(|| syntax(line, "missing End"))?;
    if start > end {
        return Err(syntax(line, format!("Start {start:#X} is past End {end:#X}")));
    }
    Ok(ChangeGroup {
        start,
        end,
        modifications: Vec::new(),
    })
}

fn parse_modification(rest: &str, line: usize) -> Result<Modification, PatchError> {
    let (original, modified) = rest
        .split_once("->")
        .ok_or_else(|| syntax(line, "expected 'Original: X -> Modified: Y'"))?;
    let modified = modified
        .trim()
        .strip_prefix(MODIFIED_PREFIX)
        .ok_or_else(|| syntax(line, "expected 'Modified:' after '->'"))?;
    Ok(Modification::new(
        parse_byte_spec(original, line)?,
        parse_byte_spec(modified, line)?,
    ))
}

fn flush(open: &mut Option<(ChangeGroup, usize)>, groups: &mut Vec<ChangeGroup>) {
    if let Some((group, header_line)) = open.take() {
        if !group.is_well_formed() {
            warn!(
                "Change group at line {header_line} spans {} bytes but has {} modifications",
                group.end - group.start,
                group.modifications.len()
            );
        }
        groups.push(group);
    }
}

/// Parses a text patch description.
pub fn parse(text: &str) -> Result<ParsedPatch, PatchError> {
    let mut groups = Vec::new();
    let mut open: Option<(ChangeGroup, usize)> = None;
    let mut guard = None;
    let mut target_len = None;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix(GROUP_PREFIX) {
            flush(&mut open, &mut groups);
            open = Some((parse_header(rest, line_no)?, line_no));
        } else if let Some(rest) = line.strip_prefix(MOD_PREFIX) {
            let modification = parse_modification(rest, line_no)?;
            let (group, _) = open
                .as_mut()
                .ok_or_else(|| syntax(line_no, "modification outside of a change group"))?;
            group.modifications.push(modification);
        } else if let Some(rest) = line.strip_prefix(CHECKSUM_PREFIX) {
            let value = parse_hex(rest)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| syntax(line_no, format!("invalid checksum '{}'", rest.trim())))?;
            if guard.is_some() {
                warn!("Line {line_no}: checksum given more than once; using the last one");
            }
            guard = Some(value);
        } else if let Some(rest) = line.strip_prefix(TARGET_PREFIX) {
            target_len = Some(parse_offset(rest, line_no)?);
        } else {
            warn!("Line {line_no}: ignoring unrecognised patch line '{line}'");
        }
    }
    flush(&mut open, &mut groups);

    Ok(ParsedPatch {
        groups,
        checksum_guard: guard.ok_or(PatchError::MissingChecksum)?,
        target_len,
    })
}

/// Renders a patch in the text grammar accepted by [`parse`].
pub fn format(patch: &ParsedPatch) -> String {
    let mut out = String::new();
    for (n, group) in patch.groups.iter().enumerate() {
        let _ = writeln!(
            out,
            "{GROUP_PREFIX} {}: Start = 0x{:X}, End = 0x{:X}",
            n + 1,
            group.start,
            group.end
        );
        for m in &group.modifications {
            let _ = writeln!(out, "{MOD_PREFIX} {} -> {MODIFIED_PREFIX} {}", m.original, m.modified);
        }
    }
    if let Some(len) = patch.target_len {
        let _ = writeln!(out, "{TARGET_PREFIX} 0x{len:X}");
    }
    let _ = writeln!(out, "{CHECKSUM_PREFIX} 0x{:08X}", patch.checksum_guard);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Change Group 1: Start = 0x10, End = 0x12
Original: 0x05 -> Modified: 0x1B
Original: * -> Modified: *

Change Group 2: Start = 0x20, End = 0x21
Original: 3f -> Modified: *
Checksum Changes: 0x4F
";

    #[test]
    fn parses_groups_in_order() {
        let patch = parse(SAMPLE).unwrap();
        assert_eq!(patch.groups.len(), 2);
        assert_eq!((patch.groups[0].start, patch.groups[0].end), (0x10, 0x12));
        assert_eq!(
            patch.groups[0].modifications,
            vec![
                Modification::new(ByteSpec::Literal(0x05), ByteSpec::Literal(0x1B)),
                Modification::UNCHANGED,
            ]
        );
        assert_eq!(
            patch.groups[1].modifications,
            vec![Modification::new(ByteSpec::Literal(0x3F), ByteSpec::Wildcard)]
        );
        assert_eq!(patch.checksum_guard, 0x4F);
        assert_eq!(patch.target_len, None);
    }

    #[test]
    fn last_checksum_wins() {
        let patch = parse("Checksum Changes: 0x1\nChecksum Changes: 0x2\n").unwrap();
        assert_eq!(patch.checksum_guard, 2);
        assert!(patch.groups.is_empty());
    }

    #[test]
    fn malformed_hex_reports_line() {
        let text = "Change Group 1: Start = 0x0, End = 0x1\nOriginal: 0xZZ -> Modified: 0x00\n";
        assert!(matches!(parse(text), Err(PatchError::Syntax { line: 2, .. })));

        let too_big = "Change Group 1: Start = 0x0, End = 0x1\nOriginal: 0x100 -> Modified: 0x00\n";
        assert!(matches!(parse(too_big), Err(PatchError::Syntax { line: 2, .. })));
    }

    #[test]
    fn rejects_structural_errors() {
        assert!(matches!(
            parse("Original: 0x01 -> Modified: 0x02\nChecksum Changes: 0x0"),
            Err(PatchError::Syntax { line: 1, .. })
        ));
        assert!(matches!(
            parse("Change Group 1: Start = 0x5, End = 0x1\nChecksum Changes: 0x0"),
            Err(PatchError::Syntax { line: 1, .. })
        ));
        assert_eq!(
            parse("Change Group 1: Start = 0x0, End = 0x0\n"),
            Err(PatchError::MissingChecksum)
        );
    }

    #[test]
    fn unknown_lines_are_skipped() {
        let patch = parse("# generated\nChecksum Changes: 0x0\n").unwrap();
        assert!(patch.groups.is_empty());
    }

    #[test]
    fn formatted_patch_parses_back() {
        let mut patch = parse(SAMPLE).unwrap();
        patch.target_len = Some(0x40);
        let text = format(&patch);
        assert!(text.starts_with("Change Group 1: Start = 0x10, End = 0x12\n"));
        assert!(text.ends_with("Checksum Changes: 0x0000004F\n"));
        assert_eq!(parse(&text).unwrap(), patch);
    }
}
