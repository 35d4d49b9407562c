use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::error::PatchError;
use super::types::{Hunk, LineDiff, LineOp};

lazy_static! {
    static ref HUNK_HEADER_RE: Regex = Regex::new(
        r"@@\s+-(?P<originalStart>\d+)(?:,(?P<originalLength>\d+))?\s+\+(?P<updatedStart>\d+)(?:,(?P<updatedLength>\d+))?\s+@@",
    )
    .expect("hunk header regex is valid");
}

/// Parse unified diff text into a list of hunks.
///
/// A hunk starts at each `@@ -<start>[,<len>] +<start>[,<len>] @@` header;
/// every following line up to the next header (or end of input) belongs to
/// it and is classified by its first character. Lines before the first
/// header (`diff --git`, `index`, `---`/`+++` preamble) are skipped. Length
/// fields absent from the header default to 1, the single-line hunk
/// convention.
///
/// Within each hunk, contiguous delete/insert runs with matching counts are
/// collapsed into modified entries pairing the i-th delete with the i-th
/// insert, so a rule can reason about "this line changed from A to B"
/// directly. Pairing is purely positional.
pub fn parse_unified_diff(diff_text: &str) -> Result<Vec<Hunk>, PatchError> {
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut cur: Option<Hunk> = None;

    for line in diff_text.split('\n') {
        if let Some(caps) = HUNK_HEADER_RE.captures(line) {
            if let Some(mut hunk) = cur.take() {
                let ops = std::mem::take(&mut hunk.diff_operations);
                hunk.diff_operations = reduce_operations(ops);
                hunks.push(hunk);
            }
            cur = Some(Hunk {
                original_start: header_field(&caps, "originalStart", line)?,
                original_length: header_length_field(&caps, "originalLength", line)?,
                updated_start: header_field(&caps, "updatedStart", line)?,
                updated_length: header_length_field(&caps, "updatedLength", line)?,
                diff_operations: Vec::new(),
            });
        } else if let Some(hunk) = cur.as_mut() {
            let (op, text) = classify_line(line);
            hunk.diff_operations.push(LineDiff::new(op, text));
        }
    }

    if let Some(mut hunk) = cur.take() {
        let ops = std::mem::take(&mut hunk.diff_operations);
        hunk.diff_operations = reduce_operations(ops);
        hunks.push(hunk);
    }
    Ok(hunks)
}

fn header_field(caps: &Captures<'_>, name: &str, line: &str) -> Result<u32, PatchError> {
    caps.name(name)
        .expect("mandatory capture group")
        .as_str()
        .parse::<u32>()
        .map_err(|_| PatchError::MalformedHunkHeader(line.to_string()))
}

fn header_length_field(caps: &Captures<'_>, name: &str, line: &str) -> Result<u32, PatchError> {
    match caps.name(name) {
        Some(m) => m
            .as_str()
            .parse::<u32>()
            .map_err(|_| PatchError::MalformedHunkHeader(line.to_string())),
        // Single-line hunks omit the length field.
        None => Ok(1),
    }
}

fn classify_line(line: &str) -> (LineOp, &str) {
    let Some(first) = line.chars().next() else {
        return (LineOp::Unknown, "");
    };
    let op = match first {
        '+' => LineOp::Insert,
        '-' => LineOp::Delete,
        ' ' => LineOp::Untouched,
        _ => LineOp::Unknown,
    };
    (op, &line[first.len_utf8()..])
}

/// Collapse paired delete/insert runs into modified entries.
///
/// Scans left to right; on a delete, the maximal contiguous run of
/// delete/insert operations is examined. Runs with equal delete and insert
/// counts are reduced; unbalanced runs pass through untouched, preserving
/// the original order.
fn reduce_operations(ops: Vec<LineDiff>) -> Vec<LineDiff> {
    let mut out: Vec<LineDiff> = Vec::with_capacity(ops.len());
    let mut i = 0;
    while i < ops.len() {
        if ops[i].op != LineOp::Delete {
            out.push(ops[i].clone());
            i += 1;
            continue;
        }

        let (reducible, consume) = scan_run(&ops[i..]);
        if reducible {
            out.extend(pair_deletes_with_inserts(&ops[i..i + consume]));
        } else {
            out.extend_from_slice(&ops[i..i + consume]);
        }
        i += consume;
    }
    out
}

/// Measure the contiguous delete/insert run starting at `ops[0]` (a delete).
/// Returns whether the run balances and how many operations it spans.
fn scan_run(ops: &[LineDiff]) -> (bool, usize) {
    let mut inserts = 0usize;
    let mut deletes = 0usize;
    for (i, lop) in ops.iter().enumerate() {
        match lop.op {
            LineOp::Insert => inserts += 1,
            LineOp::Delete => deletes += 1,
            _ => return (inserts == deletes, i),
        }
    }
    (inserts == deletes, ops.len())
}

fn pair_deletes_with_inserts(run: &[LineDiff]) -> Vec<LineDiff> {
    let inserts: Vec<&LineDiff> = run.iter().filter(|l| l.op == LineOp::Insert).collect();
    let mut out = Vec::with_capacity(run.len() / 2);
    for (pos, lop) in run.iter().filter(|l| l.op == LineOp::Delete).enumerate() {
        out.push(LineDiff::modified(
            lop.text.clone(),
            inserts[pos].text.clone(),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn single_modified_line_with_context() {
        let hunks = parse_unified_diff("@@ -1,2 +1,2 @@\n-foo\n+bar\n bar2").unwrap();
        assert_eq!(hunks.len(), 1);
        assert_eq!(
            hunks[0].diff_operations,
            vec![
                LineDiff::modified("foo", "bar"),
                LineDiff::new(LineOp::Untouched, "bar2"),
            ]
        );
    }

    #[test]
    fn header_fields_parsed() {
        let hunks = parse_unified_diff("@@ -10,4 +12,6 @@\n foo").unwrap();
        assert_eq!(hunks[0].original_start, 10);
        assert_eq!(hunks[0].original_length, 4);
        assert_eq!(hunks[0].updated_start, 12);
        assert_eq!(hunks[0].updated_length, 6);
    }

    #[test]
    fn omitted_length_defaults_to_one() {
        let hunks = parse_unified_diff("@@ -3 +4 @@\n+only").unwrap();
        assert_eq!(hunks[0].original_start, 3);
        assert_eq!(hunks[0].original_length, 1);
        assert_eq!(hunks[0].updated_start, 4);
        assert_eq!(hunks[0].updated_length, 1);
    }

    #[test]
    fn balanced_run_pairs_in_order() {
        let hunks = parse_unified_diff("@@ -1,3 +1,3 @@\n-a\n-b\n-c\n+x\n+y\n+z").unwrap();
        assert_eq!(
            hunks[0].diff_operations,
            vec![
                LineDiff::modified("a", "x"),
                LineDiff::modified("b", "y"),
                LineDiff::modified("c", "z"),
            ]
        );
    }

    #[test]
    fn interleaved_balanced_run_pairs_by_appearance_order() {
        let hunks = parse_unified_diff("@@ -1,2 +1,2 @@\n-a\n+x\n-b\n+y").unwrap();
        assert_eq!(
            hunks[0].diff_operations,
            vec![LineDiff::modified("a", "x"), LineDiff::modified("b", "y")]
        );
    }

    #[test]
    fn unbalanced_run_left_unreduced() {
        let hunks = parse_unified_diff("@@ -1,2 +1,3 @@\n-a\n+x\n+y").unwrap();
        assert_eq!(
            hunks[0].diff_operations,
            vec![
                LineDiff::new(LineOp::Delete, "a"),
                LineDiff::new(LineOp::Insert, "x"),
                LineDiff::new(LineOp::Insert, "y"),
            ]
        );
    }

    #[test]
    fn context_bounds_the_run() {
        let hunks =
            parse_unified_diff("@@ -1,4 +1,4 @@\n-a\n+x\n keep\n-b\n+y").unwrap();
        assert_eq!(
            hunks[0].diff_operations,
            vec![
                LineDiff::modified("a", "x"),
                LineDiff::new(LineOp::Untouched, "keep"),
                LineDiff::modified("b", "y"),
            ]
        );
    }

    #[test]
    fn preamble_lines_skipped() {
        let text = "diff --git a/f b/f\nindex 123..456 100644\n--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n+b";
        let hunks = parse_unified_diff(text).unwrap();
        assert_eq!(hunks.len(), 1);
        assert_eq!(
            hunks[0].diff_operations,
            vec![LineDiff::modified("a", "b")]
        );
    }

    #[test]
    fn multiple_hunks() {
        let text = "@@ -1,1 +1,1 @@\n-a\n+b\n@@ -10,1 +10,2 @@\n a\n+c";
        let hunks = parse_unified_diff(text).unwrap();
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[1].original_start, 10);
        assert_eq!(
            hunks[1].diff_operations,
            vec![
                LineDiff::new(LineOp::Untouched, "a"),
                LineDiff::new(LineOp::Insert, "c"),
            ]
        );
    }

    #[test]
    fn unknown_marker_lines_pass_through() {
        let hunks = parse_unified_diff("@@ -1,1 +1,1 @@\n\\ No newline at end of file").unwrap();
        assert_eq!(hunks[0].diff_operations.len(), 1);
        assert_eq!(hunks[0].diff_operations[0].op, LineOp::Unknown);
        assert_eq!(hunks[0].diff_operations[0].text, " No newline at end of file");
    }

    #[test]
    fn overflowing_header_field_is_an_error() {
        let err = parse_unified_diff("@@ -99999999999999999999,1 +1,1 @@\n-a").unwrap_err();
        assert!(matches!(err, PatchError::MalformedHunkHeader(_)));
    }

    #[test]
    fn empty_input_yields_no_hunks() {
        assert!(parse_unified_diff("").unwrap().is_empty());
    }
}
