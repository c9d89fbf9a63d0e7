//! Unified diff parsing into change entries

use super::types::DiffEntry;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header pattern is valid")
});

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";
const NULL_DEVICE: &str = "/dev/null";
const RENAME_FROM: &str = "rename from ";
const RENAME_TO: &str = "rename to ";

/// Line numbering and filtering policy for [`extract_diff_entries`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Report the removed and the added side of a change block as separate
    /// entries, each carrying only its own side's coordinates.
    pub use_absolute_line_count: bool,
    /// Drop change blocks whose added lines equal the removed lines after trimming.
    pub ignore_whitespace: bool,
}

/// Parse raw `git diff` output into change entries, in diff order.
///
/// Never fails: text that does not look like diff content is skipped until the
/// next hunk header.
pub fn extract_diff_entries(
    diff: &str,
    use_absolute_line_count: bool,
    ignore_whitespace: bool,
) -> Vec<DiffEntry> {
    let options = ParseOptions {
        use_absolute_line_count,
        ignore_whitespace,
    };
    diff.lines()
        .fold(ParserState::new(options), ParserState::feed)
        .finish()
}

/// Sum of added and removed lines over all entries.
pub fn total_changed_lines(entries: &[DiffEntry]) -> usize {
    entries.iter().map(DiffEntry::changed_lines).sum()
}

/// Lines changed between two context lines (or hunk boundaries).
#[derive(Debug, Default)]
struct ChangeBlock {
    start_line: Option<usize>,
    line_count: usize,
    previous_start_line: Option<usize>,
    previous_line_count: usize,
    added: Vec<String>,
    removed: Vec<String>,
}

impl ChangeBlock {
    fn is_empty(&self) -> bool {
        self.start_line.is_none() && self.previous_start_line.is_none()
    }

    fn is_whitespace_only(&self) -> bool {
        self.added.len() == self.removed.len()
            && self
                .added
                .iter()
                .zip(&self.removed)
                .all(|(added, removed)| added.trim() == removed.trim())
    }

    fn into_entries(
        self,
        file_path: &Option<String>,
        previous_file_path: &Option<String>,
        split_sides: bool,
    ) -> Vec<DiffEntry> {
        let added = self.start_line.map(|start| (start, self.line_count));
        let removed = self
            .previous_start_line
            .map(|start| (start, self.previous_line_count));

        let entry = |added: Option<(usize, usize)>, removed: Option<(usize, usize)>| DiffEntry {
            start_line: added.map(|(start, _)| start),
            line_count: added.map(|(_, count)| count),
            previous_start_line: removed.map(|(start, _)| start),
            previous_line_count: removed.map(|(_, count)| count),
            ..DiffEntry::for_paths(file_path.clone(), previous_file_path.clone())
        };

        if split_sides {
            let mut entries = Vec::with_capacity(2);
            if removed.is_some() {
                entries.push(entry(None, removed));
            }
            if added.is_some() {
                entries.push(entry(added, None));
            }
            entries
        } else {
            vec![entry(added, removed)]
        }
    }
}

struct ParserState<'a> {
    options: ParseOptions,
    entries: Vec<DiffEntry>,
    renames: Vec<(String, String)>,
    file_path: Option<String>,
    previous_file_path: Option<String>,
    block: ChangeBlock,
    new_line: usize,
    previous_line: usize,
    /// Lines the current hunk header announced and that are not read yet
    remaining_new: usize,
    remaining_previous: usize,
    reading_code: bool,
    last_line_removal: bool,
    /// The two raw lines preceding the current one, oldest first. Hunk
    /// content is stored as `None` so it never passes for a file header.
    recent: [Option<&'a str>; 2],
}

impl<'a> ParserState<'a> {
    fn new(options: ParseOptions) -> Self {
        Self {
            options,
            entries: Vec::new(),
            renames: Vec::new(),
            file_path: None,
            previous_file_path: None,
            block: ChangeBlock::default(),
            new_line: 0,
            previous_line: 0,
            remaining_new: 0,
            remaining_previous: 0,
            reading_code: false,
            last_line_removal: false,
            recent: [None, None],
        }
    }

    fn feed(mut self, line: &'a str) -> Self {
        if line == NO_NEWLINE_MARKER {
            return self;
        }

        let is_content = self.reading_code && self.read_content(line);
        if !is_content && !self.take_rename(line) {
            if let Some(captures) = HUNK_HEADER.captures(line) {
                self.start_hunk(&captures);
            }
        }
        self.recent = [self.recent[1], (!is_content).then_some(line)];
        self
    }

    /// Consume one line of the current hunk. Returns false when the line is
    /// not hunk content.
    fn read_content(&mut self, line: &str) -> bool {
        match line.as_bytes().first() {
            None => return false,
            Some(b'+') => self.handle_addition(&line[1..]),
            Some(b'-') => self.handle_removal(&line[1..]),
            Some(b' ') => self.handle_unchanged(),
            // Binary patches and other non-diff content
            Some(_) => {
                self.reading_code = false;
                return false;
            }
        }
        // Whatever follows a complete hunk belongs to the next file header
        if self.remaining_new == 0 && self.remaining_previous == 0 {
            self.reading_code = false;
        }
        true
    }

    fn take_rename(&mut self, line: &str) -> bool {
        let Some(new_path) = line.strip_prefix(RENAME_TO) else {
            return false;
        };
        let Some(old_path) = self.recent[1].and_then(|prev| prev.strip_prefix(RENAME_FROM)) else {
            return false;
        };
        self.renames.push((old_path.to_string(), new_path.to_string()));
        true
    }

    fn start_hunk(&mut self, captures: &Captures<'_>) {
        self.flush_block();

        let (file_path, previous_file_path) = self.recover_paths();
        // Without a readable file header the last known paths stay in effect
        if file_path.is_some() || previous_file_path.is_some() {
            self.file_path = file_path;
            self.previous_file_path = previous_file_path;
        }

        let number = |index: usize, default: usize| {
            captures
                .get(index)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(default)
        };
        self.previous_line = number(1, 0);
        self.remaining_previous = number(2, 1);
        self.new_line = number(3, 0);
        self.remaining_new = number(4, 1);
        self.reading_code = true;
        self.last_line_removal = false;
    }

    /// Paths from the `--- `/`+++ ` pair directly above a hunk header.
    fn recover_paths(&self) -> (Option<String>, Option<String>) {
        match self.recent {
            [Some(old), Some(new)] if old.starts_with("--- ") && new.starts_with("+++ ") => {
                (header_path(&new[4..]), header_path(&old[4..]))
            }
            _ => (None, None),
        }
    }

    fn handle_addition(&mut self, content: &str) {
        self.block.added.push(content.to_string());
        self.block.start_line.get_or_insert(self.new_line);
        self.block.line_count += 1;
        self.new_line += 1;
        self.remaining_new = self.remaining_new.saturating_sub(1);
        self.last_line_removal = false;
    }

    fn handle_removal(&mut self, content: &str) {
        // A removal after added lines starts a new block
        if !self.last_line_removal && !self.block.is_empty() {
            self.flush_block();
        }
        self.block.removed.push(content.to_string());
        self.block.previous_start_line.get_or_insert(self.previous_line);
        self.block.previous_line_count += 1;
        self.previous_line += 1;
        self.remaining_previous = self.remaining_previous.saturating_sub(1);
        self.last_line_removal = true;
    }

    fn handle_unchanged(&mut self) {
        self.flush_block();
        self.new_line += 1;
        self.previous_line += 1;
        self.remaining_new = self.remaining_new.saturating_sub(1);
        self.remaining_previous = self.remaining_previous.saturating_sub(1);
        self.last_line_removal = false;
    }

    fn flush_block(&mut self) {
        let block = std::mem::take(&mut self.block);
        if block.is_empty() || (self.options.ignore_whitespace && block.is_whitespace_only()) {
            return;
        }
        self.entries.extend(block.into_entries(
            &self.file_path,
            &self.previous_file_path,
            self.options.use_absolute_line_count,
        ));
    }

    fn finish(mut self) -> Vec<DiffEntry> {
        self.flush_block();

        for (old_path, new_path) in std::mem::take(&mut self.renames) {
            let has_entry = self.entries.iter().any(|entry| {
                entry.previous_file_path.as_deref() == Some(old_path.as_str())
                    && entry.file_path.as_deref() == Some(new_path.as_str())
            });
            if !has_entry {
                self.entries
                    .push(DiffEntry::for_paths(Some(new_path), Some(old_path)));
            }
        }

        self.entries
    }
}

/// Strip the `a/`/`b/` prefix git puts on header paths; `/dev/null` means the
/// file is absent on that side.
fn header_path(raw: &str) -> Option<String> {
    let path = raw.trim_end_matches('\t');
    if path == NULL_DEVICE {
        return None;
    }
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    Some(path.to_string())
}
