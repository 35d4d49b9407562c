use serde::{Deserialize, Serialize};

use super::error::PatchError;
use super::parser::parse_unified_diff;
use super::types::{Patch, PatchOp};

/// The kind of change a source-control host reports for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Added,
    Copied,
    Removed,
    Modified,
    Changed,
    Renamed,
}

impl FileChangeKind {
    /// Map a host status string to a change kind. Hosts disagree on naming
    /// ("changed" vs "modified"); both are accepted.
    pub fn from_status(path: &str, status: &str) -> Result<Self, PatchError> {
        match status {
            "added" => Ok(Self::Added),
            "copied" => Ok(Self::Copied),
            "removed" => Ok(Self::Removed),
            "modified" => Ok(Self::Modified),
            "changed" => Ok(Self::Changed),
            "renamed" => Ok(Self::Renamed),
            other => Err(PatchError::UnknownChangeKind {
                path: path.to_string(),
                kind: other.to_string(),
            }),
        }
    }
}

/// Host-agnostic per-file change metadata as handed over by a
/// source-control fetch layer.
#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: String,
    /// Set for renames: the path before the change.
    pub previous_path: Option<String>,
    pub kind: FileChangeKind,
    pub additions: u32,
    pub deletions: u32,
    /// Opaque content-fetch key, stored verbatim on the resulting patches.
    pub contents_key: String,
    /// Raw unified diff for this file, when the host provides one.
    pub patch_text: Option<String>,
}

/// Build the patch entries for one file change.
///
/// A rename expands into a delete of the previous path followed by an
/// insert of the new one, both with an empty diff; every other kind maps to
/// a single patch whose diff is parsed from `patch_text`.
pub fn patches_from_change(change: &FileChange) -> Result<Vec<Patch>, PatchError> {
    if change.kind == FileChangeKind::Renamed {
        let prev = change
            .previous_path
            .as_ref()
            .ok_or_else(|| PatchError::MissingPreviousPath(change.path.clone()))?;
        return Ok(vec![
            Patch {
                contents_id: change.contents_key.clone(),
                path: prev.clone(),
                op: PatchOp::Delete,
                additions: 0,
                deletions: change.deletions,
                diff: Vec::new(),
            },
            Patch {
                contents_id: change.contents_key.clone(),
                path: change.path.clone(),
                op: PatchOp::Insert,
                additions: change.additions,
                deletions: 0,
                diff: Vec::new(),
            },
        ]);
    }

    let op = match change.kind {
        // A copy is the same as a file insert.
        FileChangeKind::Added | FileChangeKind::Copied => PatchOp::Insert,
        FileChangeKind::Removed => PatchOp::Delete,
        FileChangeKind::Modified | FileChangeKind::Changed => PatchOp::Modified,
        FileChangeKind::Renamed => unreachable!("handled above"),
    };
    let diff = match change.patch_text.as_deref() {
        Some(text) => parse_unified_diff(text)?,
        None => Vec::new(),
    };
    Ok(vec![Patch {
        contents_id: change.contents_key.clone(),
        path: change.path.clone(),
        op,
        additions: change.additions,
        deletions: change.deletions,
        diff,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(kind: FileChangeKind) -> FileChange {
        FileChange {
            path: "src/main.rs".to_string(),
            previous_path: None,
            kind,
            additions: 2,
            deletions: 1,
            contents_key: "gh:deadbeef".to_string(),
            patch_text: Some("@@ -1,2 +1,3 @@\n-a\n+x\n+y".to_string()),
        }
    }

    #[test]
    fn modified_change_parses_diff() {
        let patches = patches_from_change(&change(FileChangeKind::Modified)).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].op, PatchOp::Modified);
        assert_eq!(patches[0].diff.len(), 1);
        assert_eq!(patches[0].contents_id, "gh:deadbeef");
    }

    #[test]
    fn rename_splits_into_delete_and_insert() {
        let mut c = change(FileChangeKind::Renamed);
        c.previous_path = Some("src/old.rs".to_string());
        let patches = patches_from_change(&c).unwrap();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].op, PatchOp::Delete);
        assert_eq!(patches[0].path, "src/old.rs");
        assert_eq!(patches[1].op, PatchOp::Insert);
        assert_eq!(patches[1].path, "src/main.rs");
        assert!(patches[0].diff.is_empty() && patches[1].diff.is_empty());
    }

    #[test]
    fn rename_without_previous_path_is_an_error() {
        let c = change(FileChangeKind::Renamed);
        assert!(matches!(
            patches_from_change(&c),
            Err(PatchError::MissingPreviousPath(_))
        ));
    }

    #[test]
    fn unknown_status_is_an_error() {
        let err = FileChangeKind::from_status("f.txt", "exploded").unwrap_err();
        assert!(matches!(err, PatchError::UnknownChangeKind { .. }));
    }

    #[test]
    fn copied_maps_to_insert() {
        let patches = patches_from_change(&change(FileChangeKind::Copied)).unwrap();
        assert_eq!(patches[0].op, PatchOp::Insert);
    }
}
