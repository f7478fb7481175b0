use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;

/// Tool names whose invocations mutate files.
const FILE_MUTATING_TOOLS: &[&str] = &["Write", "Edit"];

/// One parsed line of a session transcript (JSONL). Ephemeral: records are
/// discarded as soon as a facet has read them.
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptRecord {
    #[serde(default)]
    pub message: Option<TranscriptMessage>,
    #[serde(default)]
    pub usage: Option<TokenCounters>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TranscriptMessage {
    /// A string for plain messages, an array of content blocks otherwise.
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub usage: Option<TokenCounters>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct TokenCounters {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

/// Accumulated token counters for a whole session.
/// `total` is always `input + output`; cache counters are tracked but
/// excluded from the total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_creation: u64,
    pub total: u64,
}

/// Stream records out of a transcript file, line by line.
///
/// Blank lines and unparseable lines are skipped; an open or read error
/// stops the scan, leaving whatever the visitor has already seen in place
/// (best-effort, not transactional).
fn scan_records(path: &Path, mut visit: impl FnMut(TranscriptRecord)) {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!("cannot open transcript {}: {e}", path.display());
            return;
        }
    };
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!("transcript read stopped: {e}");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TranscriptRecord>(&line) {
            Ok(record) => visit(record),
            Err(e) => {
                tracing::debug!("skipping unparseable transcript line: {e}");
            }
        }
    }
}

/// Collect the set of file paths touched by `Write`/`Edit` tool calls.
pub fn extract_modified_files(path: &Path) -> BTreeSet<String> {
    let mut modified = BTreeSet::new();
    scan_records(path, |record| {
        let Some(message) = record.message else {
            return;
        };
        let serde_json::Value::Array(blocks) = &message.content else {
            return;
        };
        for block in blocks {
            if let Some(file_path) = mutated_file_path(block) {
                modified.insert(file_path.to_string());
            }
        }
    });
    modified
}

fn mutated_file_path(block: &serde_json::Value) -> Option<&str> {
    if block.get("type").and_then(|t| t.as_str()) != Some("tool_use") {
        return None;
    }
    let name = block.get("name").and_then(|n| n.as_str())?;
    if !FILE_MUTATING_TOOLS.contains(&name) {
        return None;
    }
    block
        .get("input")
        .and_then(|input| input.get("file_path"))
        .and_then(|p| p.as_str())
        .filter(|p| !p.is_empty())
}

/// Sum token counters across the transcript. Usage is read from the record
/// top level, falling back to `message.usage` when absent.
pub fn extract_token_usage(path: &Path) -> TokenTotals {
    let mut totals = TokenTotals::default();
    scan_records(path, |record| {
        let usage = record
            .usage
            .or(record.message.and_then(|message| message.usage));
        let Some(usage) = usage else {
            return;
        };
        totals.input += usage.input_tokens;
        totals.output += usage.output_tokens;
        totals.cache_read += usage.cache_read_input_tokens;
        totals.cache_creation += usage.cache_creation_input_tokens;
    });
    totals.total = totals.input + totals.output;
    totals
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
    fn test_modified_files_write_and_edit_only() {
        let file = transcript(&[
            r#"{"message":{"content":[{"type":"tool_use","name":"Write","input":{"file_path":"a.py"}}]}}"#,
            r#"{"message":{"content":[{"type":"tool_use","name":"Edit","input":{"file_path":"b.py"}}]}}"#,
            r#"{"message":{"content":[{"type":"tool_use","name":"Read","input":{"file_path":"c.py"}}]}}"#,
            r#"{"message":{"content":[{"type":"tool_use","name":"Bash","input":{"command":"ls"}}]}}"#,
        ]);
        let files = extract_modified_files(file.path());
        assert_eq!(
            files.into_iter().collect::<Vec<_>>(),
            vec!["a.py".to_string(), "b.py".to_string()]
        );
    }

    #[test]
    fn test_modified_files_deduplicates() {
        let file = transcript(&[
            r#"{"message":{"content":[{"type":"tool_use","name":"Write","input":{"file_path":"a.py"}}]}}"#,
            r#"{"message":{"content":[{"type":"tool_use","name":"Edit","input":{"file_path":"a.py"}}]}}"#,
        ]);
        assert_eq!(extract_modified_files(file.path()).len(), 1);
    }

    #[test]
    fn test_modified_files_skips_bad_lines_and_string_content() {
        let file = transcript(&[
            "",
            "not json at all",
            r#"{"message":{"content":"plain text message"}}"#,
            r#"{"message":{"content":[{"type":"text","text":"hi"}]}}"#,
            r#"{"message":{"content":[{"type":"tool_use","name":"Write","input":{"file_path":"kept.rs"}}]}}"#,
        ]);
        let files = extract_modified_files(file.path());
        assert_eq!(files.into_iter().collect::<Vec<_>>(), vec!["kept.rs"]);
    }

    #[test]
    fn test_modified_files_missing_file_is_empty() {
        let files = extract_modified_files(Path::new("/nonexistent/transcript.jsonl"));
        assert!(files.is_empty());
    }

    #[test]
    fn test_token_usage_top_level_and_nested() {
        let file = transcript(&[
            r#"{"usage":{"input_tokens":10,"output_tokens":5}}"#,
            r#"{"message":{"usage":{"input_tokens":7,"output_tokens":3,"cache_read_input_tokens":100}}}"#,
        ]);
        let totals = extract_token_usage(file.path());
        assert_eq!(totals.input, 17);
        assert_eq!(totals.output, 8);
        assert_eq!(totals.cache_read, 100);
        assert_eq!(totals.cache_creation, 0);
        assert_eq!(totals.total, 25);
    }

    #[test]
    fn test_token_total_ignores_cache_counters() {
        let file = transcript(&[
            r#"{"usage":{"input_tokens":1,"output_tokens":2,"cache_read_input_tokens":50,"cache_creation_input_tokens":60}}"#,
        ]);
        let totals = extract_token_usage(file.path());
        assert_eq!(totals.total, 3);
        assert_eq!(totals.cache_read, 50);
        assert_eq!(totals.cache_creation, 60);
    }

    #[test]
    fn test_token_usage_missing_fields_default_to_zero() {
        let file = transcript(&[r#"{"usage":{"output_tokens":4}}"#, r#"{"other":true}"#]);
        let totals = extract_token_usage(file.path());
        assert_eq!(totals.input, 0);
        assert_eq!(totals.output, 4);
        assert_eq!(totals.total, 4);
    }

    #[test]
    fn test_empty_transcript() {
        let file = transcript(&[]);
        assert!(extract_modified_files(file.path()).is_empty());
        assert_eq!(extract_token_usage(file.path()), TokenTotals::default());
    }
}
