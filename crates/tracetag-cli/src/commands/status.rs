use anyhow::{Context, Result};

use tracetag_core::config::{
    ENRICHMENTS_VAR, EXPERIMENT_VAR, PROFILE_VAR, TRACING_ENABLED_VAR, TRACKING_URI_VAR,
};
use tracetag_core::enrich::parse_facet_list;
use tracetag_core::git;
use tracetag_core::settings::{SettingsDocument, STOP_EVENT, TRACING_HOOK_COMMAND};

pub fn run() -> Result<()> {
    let project_root = std::env::current_dir().context("Cannot determine working directory")?;

    let Some(doc) = SettingsDocument::load(&project_root) else {
        println!("Tracing is not configured in this project.");
        println!("Run `tracetag init` to set it up.");
        return Ok(());
    };

    let enabled = doc
        .environment
        .get(TRACING_ENABLED_VAR)
        .map(|v| tracetag_core::config::is_truthy(v))
        .unwrap_or(false);
    println!("Tracing:    {}", if enabled { "enabled" } else { "disabled" });

    match doc.environment.get(TRACKING_URI_VAR) {
        Some(uri) => println!("Backend:    {uri}"),
        None => println!("Backend:    local (mlruns/)"),
    }
    if let Some(experiment) = doc.environment.get(EXPERIMENT_VAR) {
        println!("Experiment: {experiment}");
    }
    if let Some(profile) = doc.environment.get(PROFILE_VAR) {
        println!("Profile:    {profile}");
    }

    let facets = doc
        .environment
        .get(ENRICHMENTS_VAR)
        .map(|v| parse_facet_list(v))
        .unwrap_or_default();
    if facets.is_empty() {
        println!("Facets:     none (enable with `tracetag enrich git,files,tokens`)");
    } else {
        let names: Vec<&str> = facets.iter().map(|f| f.name()).collect();
        println!("Facets:     {}", names.join(", "));
    }

    let hook_installed = doc
        .hooks
        .get(STOP_EVENT)
        .is_some_and(|blocks| {
            blocks
                .iter()
                .flat_map(|b| &b.hooks)
                .any(|h| h.command.as_deref() == Some(TRACING_HOOK_COMMAND))
        });
    println!(
        "Stop hook:  {}",
        if hook_installed { "installed" } else { "missing" }
    );

    let meta = git::collect_metadata(&project_root);
    if !meta.is_empty() {
        println!();
        if let Some(repo) = &meta.repo_name {
            println!("Repository: {repo}");
        }
        if let Some(branch) = &meta.branch {
            println!("Branch:     {branch}");
        }
        if let Some(commit) = &meta.commit_id {
            println!("Commit:     {commit}");
        }
    }

    Ok(())
}
