use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use stager_core::DiffConfig;
use stager_diff::ParseOptions;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "stager", version, about = "Prepare student exercise repositories")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Specify configuration file path
    #[arg(long, global = true, env = "STAGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level, overrides the configured one
    #[arg(long, global = true, env = "STAGER_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Where the repository lives and how to open it
#[derive(Debug, Clone, Args)]
pub struct RepoArgs {
    /// Repository path
    #[arg(short, long, default_value = ".")]
    pub repo: PathBuf,

    /// Open as a bare object store
    #[arg(long)]
    pub bare: bool,

    /// Remote URI the repository was cloned from
    #[arg(long)]
    pub remote_uri: Option<String>,

    /// Override the configured default branch
    #[arg(long)]
    pub branch: Option<String>,
}

/// Diff parsing switches. Each pair overrides the `[diff]` config either way
#[derive(Debug, Clone, Default, Args)]
pub struct ParseFlags {
    /// Report removed and added sides as separate entries
    #[arg(long, overrides_with = "no_absolute")]
    pub absolute: bool,

    /// Report one entry per change block
    #[arg(long, overrides_with = "absolute")]
    pub no_absolute: bool,

    /// Drop changes that only touch whitespace
    #[arg(long, overrides_with = "no_ignore_whitespace")]
    pub ignore_whitespace: bool,

    /// Keep changes that only touch whitespace
    #[arg(long, overrides_with = "ignore_whitespace")]
    pub no_ignore_whitespace: bool,
}

impl ParseFlags {
    pub fn options(&self, config: &DiffConfig) -> ParseOptions {
        ParseOptions {
            use_absolute_line_count: pick(
                self.absolute,
                self.no_absolute,
                config.use_absolute_line_count,
            ),
            ignore_whitespace: pick(
                self.ignore_whitespace,
                self.no_ignore_whitespace,
                config.ignore_whitespace,
            ),
        }
    }
}

fn pick(on: bool, off: bool, configured: bool) -> bool {
    match (on, off) {
        (true, _) => true,
        (_, true) => false,
        _ => configured,
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse a unified diff from stdin (or a file) into JSON change entries
    Diff {
        /// Read the diff from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[command(flatten)]
        flags: ParseFlags,
    },

    /// Diff two commits of a repository
    DiffCommits {
        #[command(flatten)]
        repo: RepoArgs,

        /// Older commit
        old: String,

        /// Newer commit
        new: String,

        /// Print parsed entries as JSON instead of the patch
        #[arg(long, conflicts_with = "count")]
        entries: bool,

        /// Print the number of changed lines
        #[arg(long)]
        count: bool,

        #[command(flatten)]
        flags: ParseFlags,
    },

    /// Reset to the last submission before a due date
    Filter {
        #[command(flatten)]
        repo: RepoArgs,

        /// Commit to reset to, takes precedence over the cutoff search
        #[arg(long)]
        commit: Option<String>,

        /// Due date (RFC 3339); without it nothing is filtered
        #[arg(long, value_parser = parse_cutoff)]
        cutoff: Option<DateTime<Utc>>,
    },

    /// Collapse all student commits after the template root into one
    Squash {
        #[command(flatten)]
        repo: RepoArgs,

        /// Last commit shared with the exercise template
        #[arg(long)]
        template_root: Option<String>,

        /// Squash on the `diff` branch and leave the default branch alone
        #[arg(long)]
        keep_default_branch: bool,

        /// Author name of the combined commit
        #[arg(long, requires = "student_email")]
        student_name: Option<String>,

        /// Author email of the combined commit
        #[arg(long, requires = "student_name")]
        student_email: Option<String>,
    },

    /// Rewrite student commits with an anonymous identity and strip remotes
    Anonymize {
        #[command(flatten)]
        repo: RepoArgs,

        /// Last commit shared with the exercise template
        #[arg(long)]
        template_root: Option<String>,
    },

    /// Check that a repository was anonymized
    Verify {
        #[command(flatten)]
        repo: RepoArgs,

        /// Last commit shared with the exercise template
        #[arg(long)]
        template_root: String,

        /// Require a single combined student commit
        #[arg(long)]
        combined: bool,
    },

    /// Write a zip archive of the repository
    Export {
        #[command(flatten)]
        repo: RepoArgs,

        /// Include the object store so history can be restored
        #[arg(long)]
        full_history: bool,

        /// Directory the archive is written to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Archive name, defaults to the repository directory name
        #[arg(long)]
        name: Option<String>,
    },

    /// List commits reachable from HEAD as JSON
    Log {
        #[command(flatten)]
        repo: RepoArgs,
    },
}

pub fn parse_cutoff(value: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid cutoff '{}', expected RFC 3339", value))?;
    Ok(parsed.with_timezone(&Utc))
}
