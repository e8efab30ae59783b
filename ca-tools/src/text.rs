//! Line-oriented editing over file contents addressed by 1-based line numbers.

use serde::{Deserialize, Deserializer};
use std::cmp::Reverse;

/// Splits on `\r\n`, `\n` or `\r`, keeping empty lines. Empty input has no lines.
pub fn split_lines(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    content
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(str::to_string)
        .collect()
}

/// First terminator style found in the content, `\n` when there is none.
pub fn detect_eol(content: &str) -> &'static str {
    if content.contains("\r\n") {
        "\r\n"
    } else if content.contains('\r') {
        "\r"
    } else {
        "\n"
    }
}

/// Model-supplied line numbers sometimes arrive as JSON floats.
fn line_number<'de, D>(d: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = f64::deserialize(d)?;
    Ok(v as i64)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineInsert {
    #[serde(deserialize_with = "line_number")]
    pub insert_after: i64,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinePatch {
    #[serde(deserialize_with = "line_number")]
    pub start_line: i64,
    #[serde(deserialize_with = "line_number")]
    pub end_line: i64,
    #[serde(default)]
    pub content: String,
}

/// Inserts each block after its anchor line, anchors clamped into `[0, len]`.
/// Every anchor refers to the original numbering; inserts sharing an anchor
/// keep their request order.
pub fn apply_inserts(mut lines: Vec<String>, inserts: &[LineInsert]) -> Vec<String> {
    let len = lines.len();
    let mut ordered: Vec<(usize, usize, &LineInsert)> = inserts
        .iter()
        .enumerate()
        .map(|(i, ins)| (ins.insert_after.clamp(0, len as i64) as usize, i, ins))
        .collect();
    ordered.sort_by_key(|(anchor, i, _)| (Reverse(*anchor), Reverse(*i)));

    for (anchor, _, ins) in ordered {
        let block = split_lines(&ins.content);
        lines.splice(anchor..anchor, block);
    }
    lines
}

/// Checks every patch against `1 <= start <= end <= line_count` and rejects
/// overlapping ranges. Returns one message per violation.
pub fn validate_patches(patches: &[LinePatch], line_count: usize) -> Vec<String> {
    let last = line_count as i64;
    let mut errors = Vec::new();

    for (i, p) in patches.iter().enumerate() {
        let (s, e) = (p.start_line, p.end_line);
        let detail = if s < 1 || s > last {
            Some(format!("line {s} is out of range"))
        } else if e < 1 || e > last {
            Some(format!("line {e} is out of range"))
        } else if s > e {
            Some("startLine is after endLine".to_string())
        } else {
            None
        };
        if let Some(detail) = detail {
            errors.push(format!(
                "Patch {} has invalid line range: startLine={s}, endLine={e}. File has {line_count} lines ({detail}).",
                i + 1
            ));
        }
    }
    if !errors.is_empty() {
        return errors;
    }

    let mut spans: Vec<(i64, i64, usize)> = patches
        .iter()
        .enumerate()
        .map(|(i, p)| (p.start_line, p.end_line, i + 1))
        .collect();
    spans.sort();
    for pair in spans.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b.0 <= a.1 {
            errors.push(format!(
                "Patch {} (lines {}-{}) overlaps patch {} (lines {}-{}).",
                b.2, b.0, b.1, a.2, a.0, a.1
            ));
        }
    }
    errors
}

/// Replaces each range with its content, highest start first. Callers must
/// validate with [`validate_patches`] beforehand.
pub fn apply_patches(mut lines: Vec<String>, patches: &[LinePatch]) -> Vec<String> {
    let mut ordered: Vec<&LinePatch> = patches.iter().collect();
    ordered.sort_by_key(|p| Reverse(p.start_line));
    for p in ordered {
        let start = (p.start_line - 1) as usize;
        let end = (p.end_line as usize).min(lines.len());
        lines.splice(start..end, split_lines(&p.content));
    }
    lines
}

/// `File: <name>` header followed by right-aligned 1-based line numbers.
/// `range` is 1-based inclusive and already clamped by the caller.
pub fn numbered_view(name: &str, lines: &[String], range: Option<(usize, usize)>) -> String {
    let width = lines.len().max(1).to_string().len();
    let (start, end) = range.unwrap_or((1, lines.len()));
    let mut out = format!("File: {name}");
    for (i, line) in lines.iter().enumerate() {
        let n = i + 1;
        if n < start || n > end {
            continue;
        }
        out.push('\n');
        out.push_str(&format!("{n:>width$} | {line}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn insert(after: i64, content: &str) -> LineInsert {
        LineInsert {
            insert_after: after,
            content: content.to_string(),
        }
    }

    fn patch(start: i64, end: i64, content: &str) -> LinePatch {
        LinePatch {
            start_line: start,
            end_line: end,
            content: content.to_string(),
        }
    }

    #[test]
    fn split_handles_every_terminator() {
        assert_eq!(split_lines("a\r\nb\rc\nd"), lines(&["a", "b", "c", "d"]));
        assert_eq!(split_lines("a\n"), lines(&["a", ""]));
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn detect_eol_prefers_crlf() {
        assert_eq!(detect_eol("a\r\nb\nc"), "\r\n");
        assert_eq!(detect_eol("a\rb"), "\r");
        assert_eq!(detect_eol("single"), "\n");
    }

    #[test]
    fn insert_after_first_line() {
        let out = apply_inserts(split_lines("first\nsecond"), &[insert(1, "X")]);
        assert_eq!(out, lines(&["first", "X", "second"]));
    }

    #[test]
    fn insert_anchors_are_clamped() {
        let out = apply_inserts(lines(&["a", "b"]), &[insert(-4, "top"), insert(99, "end")]);
        assert_eq!(out, lines(&["top", "a", "b", "end"]));
    }

    #[test]
    fn insert_batch_is_independent_of_listing_order() {
        let base = lines(&["1", "2", "3", "4"]);
        let batch = vec![insert(0, "a"), insert(2, "b\nc"), insert(4, "d"), insert(3, "")];
        let mut reversed = batch.clone();
        reversed.reverse();
        let mut rotated = batch.clone();
        rotated.rotate_left(2);

        let expected = lines(&["a", "1", "2", "b", "c", "3", "4", "d"]);
        assert_eq!(apply_inserts(base.clone(), &batch), expected);
        assert_eq!(apply_inserts(base.clone(), &reversed), expected);
        assert_eq!(apply_inserts(base, &rotated), expected);
    }

    #[test]
    fn same_anchor_inserts_keep_request_order() {
        let out = apply_inserts(lines(&["x"]), &[insert(1, "a"), insert(1, "b")]);
        assert_eq!(out, lines(&["x", "a", "b"]));
    }

    #[test]
    fn patch_replaces_middle_line() {
        let base = lines(&["l1", "l2", "l3"]);
        assert!(validate_patches(&[patch(2, 2, "Y")], 3).is_empty());
        assert_eq!(apply_patches(base, &[patch(2, 2, "Y")]), lines(&["l1", "Y", "l3"]));
    }

    #[test]
    fn patch_out_of_range_names_the_line() {
        let errors = validate_patches(&[patch(5, 5, "Z")], 3);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("line 5 is out of range"), "{}", errors[0]);
        assert!(errors[0].starts_with("Patch 1 has invalid line range: startLine=5, endLine=5. File has 3 lines"));
    }

    #[test]
    fn patch_validation_reports_every_violation() {
        let errors = validate_patches(&[patch(0, 1, ""), patch(2, 2, "ok"), patch(3, 2, "")], 3);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Patch 1"));
        assert!(errors[1].starts_with("Patch 3"));
        assert!(errors[1].contains("startLine is after endLine"));
    }

    #[test]
    fn overlapping_patches_are_rejected() {
        let errors = validate_patches(&[patch(1, 3, "a"), patch(3, 4, "b")], 5);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("overlaps patch 1"));
    }

    #[test]
    fn patches_apply_highest_first_and_empty_content_deletes() {
        let base = lines(&["1", "2", "3", "4", "5"]);
        let out = apply_patches(base, &[patch(1, 1, "one\nuno"), patch(3, 4, "")]);
        assert_eq!(out, lines(&["one", "uno", "2", "5"]));
    }

    #[test]
    fn numbered_view_pads_numbers() {
        let content: Vec<String> = (1..=10).map(|i| format!("l{i}")).collect();
        let view = numbered_view("a.txt", &content, Some((9, 10)));
        assert_eq!(view, "File: a.txt\n 9 | l9\n10 | l10");
        assert_eq!(numbered_view("e.txt", &[], None), "File: e.txt");
    }

    #[test]
    fn line_numbers_accept_floats() {
        let p: LinePatch =
            serde_json::from_value(serde_json::json!({"startLine": 2.0, "endLine": 3, "content": "x"}))
                .unwrap();
        assert_eq!((p.start_line, p.end_line), (2, 3));
    }
}
