//! Commit identities and raw commit object writing
//!
//! libgit2 refuses to build a signature with an empty email, which is exactly
//! what anonymized commits carry. Commits are therefore serialized by hand and
//! stored through the object database.

use git2::{ObjectType, Oid, Repository, Signature, Time};
use serde::{Deserialize, Serialize};

/// Name written on every rewritten student commit.
pub const ANONYMIZED_NAME: &str = "student";

/// Email written on every rewritten student commit.
pub const ANONYMIZED_EMAIL: &str = "";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub fn anonymized() -> Self {
        Self::new(ANONYMIZED_NAME, ANONYMIZED_EMAIL)
    }

    /// True when the signature carries exactly this name and email.
    pub fn matches(&self, signature: &Signature<'_>) -> bool {
        signature.name_bytes() == self.name.as_bytes()
            && signature.email_bytes() == self.email.as_bytes()
    }

    /// `name <email> seconds +hhmm`, the header form git stores.
    fn header(&self, when: Time) -> String {
        let offset = when.offset_minutes();
        let sign = if offset < 0 { '-' } else { '+' };
        let offset = offset.abs();
        format!(
            "{} <{}> {} {}{:02}{:02}",
            sanitize(&self.name),
            sanitize(&self.email),
            when.seconds(),
            sign,
            offset / 60,
            offset % 60
        )
    }
}

// Angle brackets and newlines would corrupt the header line
fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '\n'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Author or committer of a commit about to be written.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stamp<'a> {
    pub identity: &'a Identity,
    pub when: Time,
}

pub(crate) fn write_commit(
    repo: &Repository,
    tree: Oid,
    parents: &[Oid],
    author: Stamp<'_>,
    committer: Stamp<'_>,
    message: &[u8],
) -> Result<Oid, git2::Error> {
    let mut buffer = format!("tree {}\n", tree).into_bytes();
    for parent in parents {
        buffer.extend_from_slice(format!("parent {}\n", parent).as_bytes());
    }
    buffer.extend_from_slice(format!("author {}\n", author.identity.header(author.when)).as_bytes());
    buffer.extend_from_slice(
        format!("committer {}\n", committer.identity.header(committer.when)).as_bytes(),
    );
    buffer.push(b'\n');
    buffer.extend_from_slice(message);

    repo.odb()?.write(ObjectType::Commit, &buffer)
}

/// Point the checked-out branch (or a detached HEAD) at `oid`.
pub(crate) fn advance_head(repo: &Repository, oid: Oid, log_message: &str) -> Result<(), git2::Error> {
    if repo.head_detached()? {
        return repo.set_head_detached(oid);
    }
    let head = repo.head()?;
    let name = head
        .name()
        .ok_or_else(|| git2::Error::from_str("HEAD points at a non UTF-8 reference"))?
        .to_string();
    repo.reference(&name, oid, true, log_message)?;
    Ok(())
}
