use serde::{Deserialize, Serialize};

/// The operation on a single line in a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineOp {
    Unknown,
    Insert,
    Delete,
    Modified,
    Untouched,
}

/// One line-level change within a hunk.
///
/// For inserts `text` is the line being added; for deletes the line being
/// removed; for untouched lines the surrounding context. `new_text` is only
/// populated when `op` is [`LineOp::Modified`], in which case `text` holds
/// the original line and `new_text` the replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDiff {
    pub op: LineOp,
    pub text: String,
    #[serde(rename = "newText", default)]
    pub new_text: String,
}

impl LineDiff {
    pub fn new(op: LineOp, text: impl Into<String>) -> Self {
        Self {
            op,
            text: text.into(),
            new_text: String::new(),
        }
    }

    pub fn modified(text: impl Into<String>, new_text: impl Into<String>) -> Self {
        Self {
            op: LineOp::Modified,
            text: text.into(),
            new_text: new_text.into(),
        }
    }
}

/// A contiguous region of change within one file of a patch.
///
/// `original_*` locates the region in the file before the change and
/// `updated_*` after it. `diff_operations` preserves source line order and
/// is immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    pub original_start: u32,
    pub original_length: u32,
    pub updated_start: u32,
    pub updated_length: u32,
    pub diff_operations: Vec<LineDiff>,
}

/// The operation on a file in a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Unknown,
    Insert,
    Delete,
    Modified,
}

/// The structured representation of one file's change within a reviewed
/// change set.
///
/// `contents_id` is an opaque key (`<platform>:<key>`) the fetch layer can
/// use to retrieve the full file contents; this crate never dereferences it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(rename = "contentsID")]
    pub contents_id: String,
    pub path: String,
    pub op: PatchOp,
    pub additions: u32,
    pub deletions: u32,
    pub diff: Vec<Hunk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_op_serializes_lowercase() {
        let v = serde_json::to_value(LineOp::Untouched).unwrap();
        assert_eq!(v, serde_json::json!("untouched"));
    }

    #[test]
    fn patch_serializes_wire_names() {
        let patch = Patch {
            contents_id: "gh:abc123".to_string(),
            path: "README.md".to_string(),
            op: PatchOp::Modified,
            additions: 1,
            deletions: 1,
            diff: vec![Hunk {
                original_start: 1,
                original_length: 1,
                updated_start: 1,
                updated_length: 1,
                diff_operations: vec![LineDiff::modified("foo", "bar")],
            }],
        };
        let v = serde_json::to_value(&patch).unwrap();
        assert_eq!(v["contentsID"], "gh:abc123");
        assert_eq!(v["op"], "modified");
        assert_eq!(v["diff"][0]["originalStart"], 1);
        assert_eq!(v["diff"][0]["diffOperations"][0]["newText"], "bar");
    }
}
