use std::io::Read as _;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Upper bound on any single git invocation.
const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a `Command` for git with process-environment isolation.
///
/// Strips `GIT_DIR` and `GIT_WORK_TREE` so inherited environment variables
/// cannot override the explicit working directory.
fn git_cmd(cwd: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(cwd)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE");
    cmd
}

/// Run a single read-only git query and return its trimmed stdout.
///
/// Returns `None` on spawn failure, non-zero exit, timeout, or empty
/// output. Failures are absorbed here; callers treat `None` as missing
/// data, never as an error.
pub fn run_git(args: &[&str], cwd: &Path) -> Option<String> {
    let mut child = git_cmd(cwd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let deadline = Instant::now() + GIT_TIMEOUT;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    tracing::debug!("git {args:?} timed out, killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(_) => return None,
        }
    };

    if !status.success() {
        return None;
    }

    let mut out = String::new();
    child.stdout.take()?.read_to_string(&mut out).ok()?;
    let trimmed = out.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// True iff `cwd` is inside a git repository.
pub fn is_git_repo(cwd: &Path) -> bool {
    run_git(&["rev-parse", "--git-dir"], cwd).is_some()
}

/// Git facts captured once per hook invocation. Fields whose underlying
/// query failed are `None` and are omitted from the enrichment map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitMetadata {
    pub commit_id: Option<String>,
    pub branch: Option<String>,
    pub remote_url: Option<String>,
    pub repo_name: Option<String>,
}

impl GitMetadata {
    pub fn is_empty(&self) -> bool {
        self.commit_id.is_none()
            && self.branch.is_none()
            && self.remote_url.is_none()
            && self.repo_name.is_none()
    }
}

/// Capture git metadata from `cwd`. Empty when not inside a repository.
pub fn collect_metadata(cwd: &Path) -> GitMetadata {
    if !is_git_repo(cwd) {
        return GitMetadata::default();
    }
    metadata_from(|args| run_git(args, cwd))
}

fn metadata_from<F>(git: F) -> GitMetadata
where
    F: Fn(&[&str]) -> Option<String>,
{
    let commit_id = git(&["rev-parse", "HEAD"]);
    let branch = git(&["rev-parse", "--abbrev-ref", "HEAD"]);
    let remote_url = git(&["remote", "get-url", "origin"]);
    let repo_root = git(&["rev-parse", "--show-toplevel"]);

    let repo_name = match &remote_url {
        Some(remote) => repo_name_from_remote(remote),
        None => repo_root.as_deref().and_then(|root| {
            Path::new(root)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        }),
    };

    GitMetadata {
        commit_id,
        branch,
        remote_url,
        repo_name,
    }
}

/// Derive `org/repo` from a remote URL.
///
/// SSH remotes (`user@host:org/repo`) take everything after the last `:`;
/// URL remotes take the last two path segments. A trailing `.git` suffix
/// and trailing slashes are ignored.
fn repo_name_from_remote(remote: &str) -> Option<String> {
    let remote = remote.strip_suffix(".git").unwrap_or(remote);
    if remote.contains(':') && remote.contains('@') {
        remote.rsplit(':').next().map(str::to_string)
    } else if remote.contains('/') {
        let trimmed = remote.trim_end_matches('/');
        let mut segments = trimmed.rsplit('/');
        let repo = segments.next()?;
        let org = segments.next()?;
        if repo.is_empty() || org.is_empty() {
            return None;
        }
        Some(format!("{org}/{repo}"))
    } else {
        None
    }
}

/// One parsed `git log` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    pub hash: String,
    pub short_hash: String,
    pub author: String,
    pub date: String,
    pub subject: String,
}

/// Fetch the last `n` commits. Empty when not a repository or the log
/// query fails.
pub fn recent_commits(n: usize, cwd: &Path) -> Vec<CommitRecord> {
    if !is_git_repo(cwd) {
        return Vec::new();
    }
    let count = format!("-{n}");
    let Some(output) = run_git(&["log", &count, "--format=%H|%h|%an|%aI|%s"], cwd) else {
        return Vec::new();
    };
    parse_log_output(&output)
}

fn parse_log_output(output: &str) -> Vec<CommitRecord> {
    output.lines().filter_map(parse_commit_line).collect()
}

// Max 4 splits so a subject containing `|` stays intact in the 5th field.
// Lines not yielding exactly 5 fields are skipped.
fn parse_commit_line(line: &str) -> Option<CommitRecord> {
    if line.is_empty() {
        return None;
    }
    let mut fields = line.splitn(5, '|');
    let hash = fields.next()?;
    let short_hash = fields.next()?;
    let author = fields.next()?;
    let date = fields.next()?;
    let subject = fields.next()?;
    Some(CommitRecord {
        hash: hash.to_string(),
        short_hash: short_hash.to_string(),
        author: author.to_string(),
        date: date.to_string(),
        subject: subject.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn fake_git(answers: &[(&[&str], Option<&str>)]) -> impl Fn(&[&str]) -> Option<String> {
        let table: HashMap<Vec<String>, Option<String>> = answers
            .iter()
            .map(|(args, out)| {
                (
                    args.iter().map(|a| a.to_string()).collect(),
                    out.map(str::to_string),
                )
            })
            .collect();
        move |args: &[&str]| {
            let key: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            table.get(&key).cloned().flatten()
        }
    }

    #[test]
    fn test_run_git_absorbs_failure() {
        // Not a repository (or no git at all): either way, None.
        let tmp = TempDir::new().unwrap();
        assert_eq!(run_git(&["rev-parse", "--git-dir"], tmp.path()), None);
    }

    #[test]
    fn test_metadata_https_remote() {
        let git = fake_git(&[
            (&["rev-parse", "HEAD"], Some("abc123def456")),
            (&["rev-parse", "--abbrev-ref", "HEAD"], Some("main")),
            (
                &["remote", "get-url", "origin"],
                Some("https://github.com/myorg/myrepo.git"),
            ),
            (&["rev-parse", "--show-toplevel"], Some("/path/to/repo")),
        ]);
        let meta = metadata_from(git);
        assert_eq!(meta.commit_id.as_deref(), Some("abc123def456"));
        assert_eq!(meta.branch.as_deref(), Some("main"));
        assert_eq!(
            meta.remote_url.as_deref(),
            Some("https://github.com/myorg/myrepo.git")
        );
        assert_eq!(meta.repo_name.as_deref(), Some("myorg/myrepo"));
    }

    #[test]
    fn test_metadata_ssh_remote() {
        let git = fake_git(&[
            (&["rev-parse", "HEAD"], Some("abc123")),
            (&["rev-parse", "--abbrev-ref", "HEAD"], Some("feature")),
            (
                &["remote", "get-url", "origin"],
                Some("git@github.com:myorg/myrepo.git"),
            ),
            (&["rev-parse", "--show-toplevel"], Some("/path/to/repo")),
        ]);
        assert_eq!(metadata_from(git).repo_name.as_deref(), Some("myorg/myrepo"));
    }

    #[test]
    fn test_metadata_no_remote_uses_directory_name() {
        let git = fake_git(&[
            (&["rev-parse", "HEAD"], Some("abc123")),
            (&["rev-parse", "--abbrev-ref", "HEAD"], Some("main")),
            (&["remote", "get-url", "origin"], None),
            (
                &["rev-parse", "--show-toplevel"],
                Some("/home/user/my-project"),
            ),
        ]);
        let meta = metadata_from(git);
        assert_eq!(meta.repo_name.as_deref(), Some("my-project"));
        assert_eq!(meta.remote_url, None);
    }

    #[test]
    fn test_metadata_omits_failed_queries() {
        let git = fake_git(&[
            (&["rev-parse", "HEAD"], Some("abc123")),
            (&["rev-parse", "--abbrev-ref", "HEAD"], None),
            (&["remote", "get-url", "origin"], None),
            (&["rev-parse", "--show-toplevel"], None),
        ]);
        let meta = metadata_from(git);
        assert_eq!(meta.commit_id.as_deref(), Some("abc123"));
        assert_eq!(meta.branch, None);
        assert_eq!(meta.remote_url, None);
        assert_eq!(meta.repo_name, None);
    }

    #[test]
    fn test_repo_name_without_git_suffix() {
        assert_eq!(
            repo_name_from_remote("https://github.com/myorg/myrepo").as_deref(),
            Some("myorg/myrepo")
        );
    }

    #[test]
    fn test_repo_name_trailing_slash() {
        assert_eq!(
            repo_name_from_remote("https://github.com/myorg/myrepo/").as_deref(),
            Some("myorg/myrepo")
        );
    }

    #[test]
    fn test_repo_name_bare_remote() {
        assert_eq!(repo_name_from_remote("myrepo"), None);
    }

    #[test]
    fn test_parse_commits() {
        let output = "abc123|abc1|Alice|2024-01-15T10:30:00+00:00|Initial commit\n\
                      def456|def4|Bob|2024-01-16T11:00:00+00:00|Add feature";
        let commits = parse_log_output(output);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "abc123");
        assert_eq!(commits[0].short_hash, "abc1");
        assert_eq!(commits[0].author, "Alice");
        assert_eq!(commits[0].date, "2024-01-15T10:30:00+00:00");
        assert_eq!(commits[0].subject, "Initial commit");
    }

    #[test]
    fn test_commit_subject_keeps_pipes() {
        let output = "abc123|abc1|Alice|2024-01-15T10:30:00+00:00|Fix bug | handle edge case";
        let commits = parse_log_output(output);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].subject, "Fix bug | handle edge case");
    }

    #[test]
    fn test_skips_malformed_and_empty_lines() {
        let output = "abc123|abc1|Alice|2024-01-15T10:30:00+00:00|Good commit\n\
                      malformed line\n\
                      \n\
                      def456|def4|Bob|2024-01-16T11:00:00+00:00|Another good commit\n";
        let commits = parse_log_output(output);
        assert_eq!(commits.len(), 2);
    }
}
