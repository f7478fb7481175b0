use anyhow::{bail, Context, Result};
use clap::Args;

use tracetag_core::config::ENRICHMENTS_VAR;
use tracetag_core::enrich::parse_facet_list;
use tracetag_core::settings::{self, SettingsDocument};
use tracetag_core::Facet;

#[derive(Args)]
pub struct EnrichArgs {
    /// Facets to enable: git, files, tokens (comma-separated or repeated)
    #[arg(value_delimiter = ',', required_unless_present = "list")]
    pub facets: Vec<String>,

    /// Show the currently active facets instead
    #[arg(long)]
    pub list: bool,
}

pub fn run(args: &EnrichArgs) -> Result<()> {
    let project_root = std::env::current_dir().context("Cannot determine working directory")?;

    if args.list {
        let active = settings::enrichments_from_settings(&project_root).unwrap_or_default();
        let facets = parse_facet_list(&active);
        if facets.is_empty() {
            println!("No enrichment facets active.");
        } else {
            for facet in facets {
                println!("{facet}");
            }
        }
        return Ok(());
    }

    let mut facets = Vec::new();
    for name in &args.facets {
        let facet: Facet = name.parse()?;
        if !facets.contains(&facet) {
            facets.push(facet);
        }
    }

    let Some(mut doc) = SettingsDocument::load(&project_root) else {
        bail!("No .claude/settings.json found. Run `tracetag init` first.");
    };
    settings::add_enrichments(&facets, &mut doc);
    doc.save(&project_root)?;

    let value = doc
        .environment
        .get(ENRICHMENTS_VAR)
        .cloned()
        .unwrap_or_default();
    println!("Enabled enrichments: {value}");
    println!("Restart Claude Code for the change to take effect.");
    Ok(())
}
