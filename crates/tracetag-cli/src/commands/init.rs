use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use inquire::{Select, Text};

use tracetag_core::client::{detect_facets, verify_connection, MlflowClient};
use tracetag_core::databricks;
use tracetag_core::settings::{self, SettingsDocument};
use tracetag_core::{BackendConfig, Facet};

const STORAGE_DATABRICKS: &str = "Databricks (requires workspace access)";
const STORAGE_LOCAL: &str = "Local (mlruns/ folder - no setup required)";

pub fn run() -> Result<()> {
    println!();
    println!("=== Claude Code trace setup ===");
    println!();

    let storage = Select::new(
        "Where should traces be stored?",
        vec![STORAGE_DATABRICKS, STORAGE_LOCAL],
    )
    .prompt()
    .context("Setup cancelled")?;

    if storage == STORAGE_DATABRICKS {
        setup_databricks()
    } else {
        setup_local()
    }
}

fn setup_local() -> Result<()> {
    let project_root = std::env::current_dir()?;
    let project_name = dir_name(&project_root);

    let experiment = Text::new("Experiment name")
        .with_default(&project_name)
        .prompt()
        .context("Setup cancelled")?;

    // Local file stores have no endpoint to query, so detection is skipped.
    println!("Checking existing traces for enrichment configuration...");
    let Some(adopt) = reconcile_enrichments(None)? else {
        bail!("Setup cancelled.");
    };

    let backend = BackendConfig::local(&experiment);
    finalize(&project_root, &backend, &adopt)?;

    println!();
    println!("Setup complete! Restart Claude Code to enable tracing.");
    println!("Traces will be stored locally in: mlruns/");
    Ok(())
}

fn setup_databricks() -> Result<()> {
    if !databricks_cli_available() {
        println!("Error: Databricks CLI not found. Install with: brew install databricks");
        bail!("Databricks CLI required for workspace storage");
    }

    let profiles = databricks::read_profiles();
    let profile = choose_profile(&profiles)?;
    let user = databricks_current_user(&profile);
    if let Some(user) = &user {
        println!("Authenticated as: {user}");
    }

    println!();
    println!("Experiments are stored in Databricks Workspace folders.");
    let personal_label = format!(
        "Personal folder - only visible to you ({})",
        user.as_deref().unwrap_or("your account")
    );
    let shared_label = "Shared folder - visible to all workspace users (recommended)";
    let location = Select::new(
        "Experiment location:",
        vec![shared_label, personal_label.as_str()],
    )
    .prompt()
    .context("Setup cancelled")?;

    let project_name = dir_name(&std::env::current_dir()?);
    let experiment = Text::new("Experiment name")
        .with_default(&project_name)
        .prompt()
        .context("Setup cancelled")?;

    let experiment_path = if location == shared_label {
        format!("/Workspace/Shared/{experiment}")
    } else {
        let user = match user {
            Some(user) => user,
            None => Text::new("Databricks email (for personal folder path)")
                .prompt()
                .context("Setup cancelled")?,
        };
        format!("/Workspace/Users/{user}/{experiment}")
    };

    // Verify connectivity before writing any config.
    println!();
    println!("Verifying connection to Databricks...");
    let client = match MlflowClient::for_profile(&profile) {
        Ok(client) => client,
        Err(e) => {
            print_connection_help(&profile);
            bail!("Could not connect to Databricks: {e}");
        }
    };
    if !verify_connection(&client, &experiment_path) {
        print_connection_help(&profile);
        bail!("Could not connect to Databricks");
    }
    println!("Connection verified!");

    println!("Checking existing traces for enrichment configuration...");
    let detected = detect_facets(&client, &experiment_path);
    let Some(adopt) = reconcile_enrichments(detected)? else {
        bail!("Setup cancelled.");
    };

    let project_root = std::env::current_dir()?;
    let backend = BackendConfig::databricks(&profile, &experiment_path);
    finalize(&project_root, &backend, &adopt)?;

    println!();
    println!("Setup complete! Restart Claude Code to enable tracing.");
    println!("Traces will be sent to: {experiment_path}");
    Ok(())
}

/// Merge the backend wiring into the settings file, re-add any adopted
/// facets, and update the ignore file.
fn finalize(project_root: &Path, backend: &BackendConfig, adopt: &[Facet]) -> Result<()> {
    let existing = SettingsDocument::load(project_root);
    if existing.is_some() {
        println!("Found existing settings.json, merging tracing config...");
    }
    let doc = settings::merge_tracing_config(existing, backend);
    let path = doc.save(project_root)?;
    println!(
        "Created {}",
        path.strip_prefix(project_root).unwrap_or(&path).display()
    );

    if !adopt.is_empty() {
        let mut doc = SettingsDocument::load(project_root).unwrap_or_default();
        settings::add_enrichments(adopt, &mut doc);
        doc.save(project_root)?;
        let names: Vec<&str> = adopt.iter().map(Facet::name).collect();
        println!("Enabled enrichments: {}", names.join(", "));
    }

    if settings::update_gitignore(project_root)? {
        println!("Updated .gitignore");
    }
    Ok(())
}

/// Reconcile the facets found in existing traces with this (fresh) setup.
/// Returns `None` on user abort, otherwise the facets to adopt.
fn reconcile_enrichments(detected: Option<BTreeSet<Facet>>) -> Result<Option<Vec<Facet>>> {
    let detected = match detected {
        None => {
            println!("Could not detect existing enrichments - continuing with setup.");
            return Ok(Some(Vec::new()));
        }
        Some(detected) if detected.is_empty() => {
            println!("No enrichments detected in existing traces.");
            return Ok(Some(Vec::new()));
        }
        Some(detected) => detected,
    };

    let names: Vec<&str> = detected.iter().map(Facet::name).collect();
    println!();
    println!("Enrichment mismatch detected");
    println!("Existing traces use: {}", names.join(", "));

    const MATCH: &str = "Match existing enrichments (recommended)";
    const WITHOUT: &str = "Continue without enrichments";
    const CANCEL: &str = "Cancel setup";
    let choice = Select::new("How should this setup proceed?", vec![MATCH, WITHOUT, CANCEL])
        .prompt()
        .context("Setup cancelled")?;

    match choice {
        CANCEL => Ok(None),
        WITHOUT => Ok(Some(Vec::new())),
        _ => Ok(Some(detected.into_iter().collect())),
    }
}

fn choose_profile(profiles: &[databricks::Profile]) -> Result<String> {
    const ADD_NEW: &str = "Add new workspace";

    if profiles.is_empty() {
        return login_new_workspace();
    }

    let labels: Vec<String> = profiles
        .iter()
        .map(|p| format!("{} ({})", p.name, p.host.as_deref().unwrap_or("no host")))
        .chain(std::iter::once(ADD_NEW.to_string()))
        .collect();
    let chosen = Select::new("Select Databricks profile:", labels.clone())
        .prompt()
        .context("Setup cancelled")?;

    if chosen == ADD_NEW {
        return login_new_workspace();
    }
    let index = labels.iter().position(|l| *l == chosen).unwrap_or(0);
    Ok(profiles[index].name.clone())
}

/// Run `databricks auth login` for a new workspace and derive the profile
/// name from the host.
fn login_new_workspace() -> Result<String> {
    let workspace = Text::new("Databricks workspace URL (e.g., https://dbc-xxx.cloud.databricks.com)")
        .prompt()
        .context("Setup cancelled")?;
    let workspace = if workspace.starts_with("https://") {
        workspace
    } else {
        format!("https://{workspace}")
    };

    let status = Command::new("databricks")
        .args(["auth", "login", "--host", &workspace])
        .status()
        .context("Failed to run `databricks auth login`")?;
    if !status.success() {
        bail!("`databricks auth login` failed");
    }

    let host = workspace.trim_start_matches("https://");
    Ok(host.split('.').next().unwrap_or(host).to_string())
}

fn databricks_cli_available() -> bool {
    Command::new("databricks")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Current user's email, via the Databricks CLI. Absorbed to `None` on any
/// failure; setup falls back to prompting.
fn databricks_current_user(profile: &str) -> Option<String> {
    let output = Command::new("databricks")
        .args(["current-user", "me", "--profile", profile, "-o", "json"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
    parsed
        .get("userName")
        .or_else(|| parsed.get("user_name"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn print_connection_help(profile: &str) {
    println!();
    println!("ERROR: Could not connect to Databricks!");
    println!();
    println!("Profile '{profile}' failed to authenticate.");
    println!("This usually means:");
    println!("  - Your token/OAuth session has expired");
    println!("  - The profile doesn't have valid credentials");
    println!();
    println!("To fix, re-authenticate with:");
    println!("  databricks auth login --profile {profile}");
    println!();
    println!("Then run `tracetag init` again.");
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_name() {
        assert_eq!(dir_name(Path::new("/home/user/my-project")), "my-project");
        assert_eq!(dir_name(Path::new("/")), "project");
    }
}
