//! Type definitions for diff reports

use serde::{Deserialize, Serialize};

/// One contiguous block of change within one file.
///
/// `start_line`/`line_count` locate the added lines in the new file,
/// `previous_start_line`/`previous_line_count` the removed lines in the old
/// file. A `None` path means the file does not exist on that side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub file_path: Option<String>,
    pub previous_file_path: Option<String>,
    pub start_line: Option<usize>,
    pub line_count: Option<usize>,
    pub previous_start_line: Option<usize>,
    pub previous_line_count: Option<usize>,
}

impl DiffEntry {
    pub(crate) fn for_paths(file_path: Option<String>, previous_file_path: Option<String>) -> Self {
        Self {
            file_path,
            previous_file_path,
            ..Self::default()
        }
    }

    /// True when neither side carries a line range.
    pub fn is_empty(&self) -> bool {
        self.line_count.is_none() && self.previous_line_count.is_none()
    }

    /// Path-only entry produced for a rename without content changes.
    pub fn is_rename_marker(&self) -> bool {
        self.is_empty() && self.file_path.is_some() && self.previous_file_path.is_some()
    }

    /// Added plus removed lines covered by this entry.
    pub fn changed_lines(&self) -> usize {
        self.line_count.unwrap_or(0) + self.previous_line_count.unwrap_or(0)
    }
}
