use crate::cli::{Cli, Command, RepoArgs};
use anyhow::{Context, Result};
use stager_core::{Config, GitConfig};
use stager_diff::extract_diff_entries;
use stager_git::{
    anonymize_student_commits, archive_file_name, combine_all_student_commits,
    count_changed_lines, diff_commits, diff_entries, export_snapshot, export_with_full_history,
    filter_late_submissions, verify, Identity, OpenOptions, RepositoryHandle,
};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use tracing::info;

pub fn execute(cli: Cli, config: &Config) -> Result<()> {
    let git = config.git();

    match cli.command {
        Command::Diff { input, flags } => {
            let options = flags.options(&config.diff());
            let text = match input {
                Some(path) => fs::read_to_string(&path)
                    .with_context(|| format!("failed to read diff from {}", path.display()))?,
                None => {
                    let mut text = String::new();
                    io::stdin().read_to_string(&mut text)?;
                    text
                }
            };
            let entries = extract_diff_entries(
                &text,
                options.use_absolute_line_count,
                options.ignore_whitespace,
            );
            print_json(&entries)
        }

        Command::DiffCommits {
            repo,
            old,
            new,
            entries,
            count,
            flags,
        } => {
            let handle = open(&repo, &git, false)?;
            if count {
                println!("{}", count_changed_lines(&handle, &old, &new)?);
            } else if entries {
                let options = flags.options(&config.diff());
                print_json(&diff_entries(&handle, &old, &new, options)?)?;
            } else {
                print!("{}", diff_commits(&handle, &old, &new)?);
            }
            Ok(())
        }

        Command::Filter {
            repo,
            commit,
            cutoff,
        } => {
            let handle = open(&repo, &git, true)?;
            filter_late_submissions(handle, commit.as_deref(), cutoff)?;
            Ok(())
        }

        Command::Squash {
            repo,
            template_root,
            keep_default_branch,
            student_name,
            student_email,
        } => {
            let handle = open(&repo, &git, true)?;
            let students: Vec<Identity> = student_name
                .zip(student_email)
                .map(|(name, email)| Identity::new(name, email))
                .into_iter()
                .collect();
            let fallback = Identity::new(git.system_name.clone(), git.system_email.clone());
            combine_all_student_commits(
                handle,
                !keep_default_branch,
                template_root.as_deref(),
                &students,
                &fallback,
            )?;
            Ok(())
        }

        Command::Anonymize {
            repo,
            template_root,
        } => {
            let handle = open(&repo, &git, true)?;
            anonymize_student_commits(handle, template_root.as_deref())?;
            Ok(())
        }

        Command::Verify {
            repo,
            template_root,
            combined,
        } => {
            let handle = open(&repo, &git, false)?;
            verify(&handle, combined, &template_root)
                .with_context(|| format!("{} is not anonymized", repo.repo.display()))?;
            println!("{} is anonymized", repo.repo.display());
            Ok(())
        }

        Command::Export {
            repo,
            full_history,
            output,
            name,
        } => {
            let handle = open(&repo, &git, false)?;
            let bytes = if full_history {
                export_with_full_history(&handle)?
            } else {
                export_snapshot(&handle)?
            };
            handle.close();

            let name = name.unwrap_or_else(|| default_archive_name(&repo.repo));
            fs::create_dir_all(&output)?;
            let target = output.join(archive_file_name(&name));
            fs::write(&target, bytes)
                .with_context(|| format!("failed to write {}", target.display()))?;
            info!(archive = %target.display(), "Exported repository");
            println!("{}", target.display());
            Ok(())
        }

        Command::Log { repo } => {
            let handle = open(&repo, &git, false)?;
            print_json(&handle.commit_log()?)
        }
    }
}

fn open(args: &RepoArgs, git: &GitConfig, write_access: bool) -> Result<RepositoryHandle> {
    let mut options = OpenOptions::new(&args.repo)
        .default_branch(args.branch.clone().unwrap_or_else(|| git.default_branch.clone()))
        .remote_name(git.remote_name.clone())
        .bare(args.bare)
        .write_access(write_access);
    if let Some(uri) = &args.remote_uri {
        options = options.remote_uri(uri.clone());
    }

    RepositoryHandle::open(&options)
        .with_context(|| format!("failed to open repository at {}", args.repo.display()))
}

fn default_archive_name(repo: &Path) -> String {
    repo.canonicalize()
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "repository".to_string())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_archive_name_uses_directory() {
        let dir = std::env::temp_dir().join("exercise-ada");
        fs::create_dir_all(&dir).unwrap();
        assert_eq!(default_archive_name(&dir), "exercise-ada");
        assert_eq!(default_archive_name(Path::new("/definitely/missing")), "repository");
    }
}
