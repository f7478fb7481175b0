use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::CoreError;
use crate::git;
use crate::transcript;

/// An independently toggled category of trace enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Facet {
    Git,
    Files,
    Tokens,
}

impl Facet {
    pub fn name(&self) -> &'static str {
        match self {
            Facet::Git => "git",
            Facet::Files => "files",
            Facet::Tokens => "tokens",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Facet {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "git" => Ok(Facet::Git),
            "files" => Ok(Facet::Files),
            "tokens" => Ok(Facet::Tokens),
            other => Err(CoreError::UnknownFacet(other.to_string())),
        }
    }
}

/// Parse a comma-separated facet list leniently: empty segments and unknown
/// names are dropped (unknown names are logged). Used on the
/// enrichment-selection value at hook time, where stale config must not
/// break the hook.
pub fn parse_facet_list(raw: &str) -> Vec<Facet> {
    let mut facets = Vec::new();
    for segment in raw.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        match segment.parse::<Facet>() {
            Ok(facet) if !facets.contains(&facet) => facets.push(facet),
            Ok(_) => {}
            Err(_) => tracing::debug!("ignoring unknown enrichment facet {segment:?}"),
        }
    }
    facets
}

/// Build the enrichment map for the requested facets.
///
/// Facets are independent: a facet that finds nothing (or fails internally)
/// contributes nothing, and never blocks the others. No key ever maps to an
/// empty value.
pub fn collect_enrichments(
    facets: &[Facet],
    transcript_path: Option<&Path>,
    cwd: &Path,
) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    for facet in facets {
        match facet {
            Facet::Git => tags.extend(git_facet(cwd)),
            Facet::Files => {
                if let Some(path) = transcript_path {
                    tags.extend(files_facet(path));
                }
            }
            Facet::Tokens => {
                if let Some(path) = transcript_path {
                    tags.extend(tokens_facet(path));
                }
            }
        }
    }
    tags
}

fn git_facet(cwd: &Path) -> BTreeMap<String, String> {
    let meta = git::collect_metadata(cwd);
    let mut tags = BTreeMap::new();
    let fields = [
        ("git.commit_id", meta.commit_id),
        ("git.branch", meta.branch),
        ("git.remote_url", meta.remote_url),
        ("git.repo_name", meta.repo_name),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            tags.insert(key.to_string(), value);
        }
    }
    tags
}

fn files_facet(transcript_path: &Path) -> BTreeMap<String, String> {
    let modified = transcript::extract_modified_files(transcript_path);
    let mut tags = BTreeMap::new();
    if modified.is_empty() {
        return tags;
    }
    // BTreeSet iteration is already lexicographic.
    let sorted: Vec<&String> = modified.iter().collect();
    match serde_json::to_string(&sorted) {
        Ok(encoded) => {
            tags.insert("files.modified".to_string(), encoded);
        }
        Err(e) => tracing::warn!("files enrichment failed: {e}"),
    }
    tags
}

fn tokens_facet(transcript_path: &Path) -> BTreeMap<String, String> {
    let totals = transcript::extract_token_usage(transcript_path);
    let counters = [
        ("tokens.input", totals.input),
        ("tokens.output", totals.output),
        ("tokens.cache_read", totals.cache_read),
        ("tokens.cache_creation", totals.cache_creation),
        ("tokens.total", totals.total),
    ];
    counters
        .into_iter()
        .filter(|(_, value)| *value > 0)
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn transcript(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn test_parse_facet_list() {
        assert_eq!(
            parse_facet_list("git, files,tokens"),
            vec![Facet::Git, Facet::Files, Facet::Tokens]
        );
        assert_eq!(parse_facet_list(""), vec![]);
        assert_eq!(parse_facet_list(" , ,"), vec![]);
        assert_eq!(parse_facet_list("git,bogus,git"), vec![Facet::Git]);
    }

    #[test]
    fn test_facet_round_trip() {
        for facet in [Facet::Git, Facet::Files, Facet::Tokens] {
            assert_eq!(facet.name().parse::<Facet>().unwrap(), facet);
        }
        assert!("metrics".parse::<Facet>().is_err());
    }

    #[test]
    fn test_files_and_tokens_facets() {
        let file = transcript(&[
            r#"{"message":{"content":[{"type":"tool_use","name":"Write","input":{"file_path":"b.py"}}]}}"#,
            r#"{"message":{"content":[{"type":"tool_use","name":"Write","input":{"file_path":"a.py"}}]}}"#,
            r#"{"usage":{"input_tokens":10,"output_tokens":5}}"#,
        ]);
        let tmp = tempfile::TempDir::new().unwrap();
        let tags = collect_enrichments(
            &[Facet::Files, Facet::Tokens],
            Some(file.path()),
            tmp.path(),
        );
        assert_eq!(
            tags.get("files.modified").map(String::as_str),
            Some(r#"["a.py","b.py"]"#)
        );
        assert_eq!(tags.get("tokens.input").map(String::as_str), Some("10"));
        assert_eq!(tags.get("tokens.output").map(String::as_str), Some("5"));
        assert_eq!(tags.get("tokens.total").map(String::as_str), Some("15"));
        // Zero cache counters are omitted, not rendered as "0".
        assert!(!tags.contains_key("tokens.cache_read"));
        assert!(!tags.contains_key("tokens.cache_creation"));
    }

    #[test]
    fn test_empty_transcript_contributes_nothing() {
        let file = transcript(&[]);
        let tmp = tempfile::TempDir::new().unwrap();
        let tags = collect_enrichments(
            &[Facet::Files, Facet::Tokens],
            Some(file.path()),
            tmp.path(),
        );
        assert!(tags.is_empty());
    }

    #[test]
    fn test_git_facet_outside_repository_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let tags = collect_enrichments(&[Facet::Git], None, tmp.path());
        assert!(tags.is_empty());
    }
}
