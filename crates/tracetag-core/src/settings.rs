use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{BackendConfig, ENRICHMENTS_VAR};
use crate::enrich::Facet;
use crate::error::CoreError;

pub const SETTINGS_DIR: &str = ".claude";
pub const SETTINGS_FILE: &str = "settings.json";

/// Lifecycle event whose hook list carries the tracing hook.
pub const STOP_EVENT: &str = "Stop";

/// The one canonical tracing hook installed for the Stop event.
pub const TRACING_HOOK_COMMAND: &str = "tracetag hook-handler stop";

// A hook command mentioning either the backend or this tool is a stale
// tracing hook and gets stripped before the canonical one is appended.
const STALE_HOOK_MARKERS: &[&str] = &["mlflow", "tracetag"];

/// Entries appended to the project ignore file on setup.
pub const IGNORE_ENTRIES: &[&str] = &[
    ".claude/settings.local.json",
    ".claude/tracetag/",
    "mlruns/",
];

/// The persisted `.claude/settings.json` document. Only `environment` and
/// `hooks` are owned by this tool; everything else round-trips verbatim
/// through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hooks: BTreeMap<String, Vec<HookBlock>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry in an event's hook list: either a group of hook descriptors
/// (optionally with a matcher, preserved in `extra`) or a direct command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookBlock {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<HookCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookCommand {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HookCommand {
    fn tracing_hook() -> Self {
        Self {
            kind: "command".to_string(),
            command: Some(TRACING_HOOK_COMMAND.to_string()),
            extra: Map::new(),
        }
    }
}

impl SettingsDocument {
    pub fn path_in(project_root: &Path) -> PathBuf {
        project_root.join(SETTINGS_DIR).join(SETTINGS_FILE)
    }

    /// Load the settings file. A missing or malformed file is treated as
    /// absent and triggers fresh-document creation downstream.
    pub fn load(project_root: &Path) -> Option<Self> {
        let raw = fs::read_to_string(Self::path_in(project_root)).ok()?;
        match serde_json::from_str(&raw) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!("malformed settings file, treating as absent: {e}");
                None
            }
        }
    }

    pub fn save(&self, project_root: &Path) -> Result<PathBuf, CoreError> {
        let dir = project_root.join(SETTINGS_DIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

/// Merge the tracing backend wiring into a settings document.
///
/// Deterministic and idempotent: backend environment entries overwrite
/// same-named keys and leave unrelated ones untouched; the enrichment
/// selection is cleared (re-added explicitly by `add_enrichments`); stale
/// tracing hooks for the Stop event are stripped and exactly one canonical
/// descriptor is appended.
pub fn merge_tracing_config(
    existing: Option<SettingsDocument>,
    backend: &BackendConfig,
) -> SettingsDocument {
    let mut doc = existing.unwrap_or_default();

    for (key, value) in backend.environment() {
        doc.environment.insert(key, value);
    }
    doc.environment.remove(ENRICHMENTS_VAR);

    let blocks = doc.hooks.entry(STOP_EVENT.to_string()).or_default();
    for block in blocks.iter_mut() {
        block.hooks.retain(|hook| !is_stale_tracing_hook(hook));
    }
    blocks.retain(|block| !block.hooks.is_empty() || block.command.is_some());

    match blocks.first_mut() {
        Some(block) => block.hooks.push(HookCommand::tracing_hook()),
        None => blocks.push(HookBlock {
            hooks: vec![HookCommand::tracing_hook()],
            command: None,
            extra: Map::new(),
        }),
    }

    doc
}

fn is_stale_tracing_hook(hook: &HookCommand) -> bool {
    let command = hook.command.as_deref().unwrap_or("");
    STALE_HOOK_MARKERS
        .iter()
        .any(|marker| command.contains(marker))
}

/// Union `facets` into the enrichment-selection value, deduplicated and
/// written back sorted.
pub fn add_enrichments(facets: &[Facet], doc: &mut SettingsDocument) {
    let mut active: BTreeSet<&str> = doc
        .environment
        .get(ENRICHMENTS_VAR)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    for facet in facets {
        active.insert(facet.name());
    }
    let joined = active.into_iter().collect::<Vec<_>>().join(",");
    doc.environment.insert(ENRICHMENTS_VAR.to_string(), joined);
}

/// The enrichment-selection value stored in the settings file, if any.
/// Used as a fallback at hook time, since environment variables are not
/// always propagated to hook processes.
pub fn enrichments_from_settings(project_root: &Path) -> Option<String> {
    SettingsDocument::load(project_root)?
        .environment
        .get(ENRICHMENTS_VAR)
        .cloned()
}

/// Append the tracing entries to `.gitignore` when absent. Returns whether
/// the file was changed.
pub fn update_gitignore(project_root: &Path) -> Result<bool, CoreError> {
    let path = project_root.join(".gitignore");
    let existing = fs::read_to_string(&path).unwrap_or_default();
    let missing: Vec<&str> = IGNORE_ENTRIES
        .iter()
        .copied()
        .filter(|entry| !existing.contains(entry))
        .collect();
    if missing.is_empty() {
        return Ok(false);
    }
    let mut out = existing;
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("\n# Claude Code tracing\n");
    for entry in missing {
        out.push_str(entry);
        out.push('\n');
    }
    fs::write(&path, out)?;
    Ok(true)
}
