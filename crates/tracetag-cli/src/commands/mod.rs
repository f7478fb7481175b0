pub mod enrich;
pub mod hook_handler;
pub mod init;
pub mod status;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Set up trace collection for this project (interactive)
    Init,
    /// Enable enrichment facets for future sessions
    Enrich(enrich::EnrichArgs),
    /// Show the current tracing configuration
    Status,
    /// Internal: handle Claude Code hook callbacks
    #[command(hide = true)]
    HookHandler(hook_handler::HookHandlerArgs),
}
