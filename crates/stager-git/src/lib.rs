//! Git side of exercise repository handling
//!
//! Opens student repositories, rewrites their history (late-submission
//! filtering, squashing, anonymization), verifies the anonymized result and
//! exports zip archives.

pub mod archive;
pub mod error;
pub mod handle;
pub mod identity;
pub mod pipeline;
pub mod report;
pub mod verify;

#[cfg(test)]
mod test_support;

pub use archive::{archive_file_name, export_snapshot, export_with_full_history};
pub use error::{StagerError, StagerResult};
pub use handle::{CommitRef, OpenOptions, Person, RepositoryHandle};
pub use identity::{Identity, ANONYMIZED_EMAIL, ANONYMIZED_NAME};
pub use pipeline::{anonymize_student_commits, combine_all_student_commits, filter_late_submissions};
pub use report::{count_changed_lines, diff_commits, diff_entries};
pub use verify::{verify, AnonymizationResult, VerificationFailure};
