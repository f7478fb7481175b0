use std::io::Read as _;

use anyhow::{Context, Result};
use clap::Args;

use tracetag_core::config::HookEnv;
use tracetag_core::hook::{self, HookInput, HookResponse};
use tracetag_core::MlflowClient;

#[derive(Args)]
pub struct HookHandlerArgs {
    /// The lifecycle event name (currently only "stop")
    pub event: String,
}

/// Reads the hook payload from stdin and always emits exactly one JSON
/// response object on stdout. Exits non-zero only when the backend calls
/// themselves failed.
pub fn run(args: &HookHandlerArgs) -> Result<()> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("Failed to read hook input from stdin")?;
    let input = HookInput::parse(&raw);

    if !args.event.eq_ignore_ascii_case("stop") {
        tracing::debug!("unknown hook event: {}, ignoring", args.event);
        emit(&HookResponse::ok())?;
        return Ok(());
    }

    let env = HookEnv::from_process_env();
    let project_root = std::env::current_dir().context("Cannot determine working directory")?;

    let client = match env.tracking_uri.as_deref() {
        Some(uri) => match MlflowClient::from_tracking_uri(uri) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("cannot reach tracking backend: {e}");
                None
            }
        },
        None => None,
    };

    match hook::handle_stop(&input, &env, client.as_ref(), &project_root) {
        Ok(response) => {
            emit(&response)?;
            Ok(())
        }
        Err(e) => {
            tracing::error!("stop hook failed: {e}");
            emit(&HookResponse::with_error(e.to_string()))?;
            Err(e.into())
        }
    }
}

fn emit(response: &HookResponse) -> Result<()> {
    println!("{}", serde_json::to_string(response)?);
    Ok(())
}
