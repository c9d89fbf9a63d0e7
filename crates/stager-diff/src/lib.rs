//! Git diff report parsing
//!
//! Turns raw unified diff text (as written by `git diff`) into an ordered list
//! of [`DiffEntry`] values, one per contiguous block of changed lines. Renames
//! without content changes are reported as path-only entries.

mod parser;
mod types;

pub use parser::{extract_diff_entries, total_changed_lines, ParseOptions};
pub use types::DiffEntry;
