/*!
 * Sandbox Daemon - Main Entry Point
 *
 * Provisions one pod sandbox from a JSON request:
 * - Loads the runtime configuration ($SANDBOXD_CONFIG)
 * - Wires the host storage, network, runtime and namespace collaborators
 * - Prints the new pod id on success
 */

use anyhow::{bail, Context, Result};
use pod_sandbox::{init_tracing, RuntimeConfig, SandboxRequest, Server};
use std::path::PathBuf;
use tracing::{error, info};

fn main() -> Result<()> {
    init_tracing();

    let Some(request_path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        bail!("usage: sandboxd <request.json>");
    };

    let config = RuntimeConfig::from_env().context("loading runtime configuration")?;
    info!(
        root = %config.root.display(),
        run_root = %config.run_root.display(),
        cgroup_manager = config.cgroup_manager.as_str(),
        "sandboxd starting"
    );

    let raw = std::fs::read(&request_path)
        .with_context(|| format!("reading request {}", request_path.display()))?;
    let request: SandboxRequest = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing request {}", request_path.display()))?;

    let server = Server::builder(config)
        .build()
        .context("initializing sandbox server")?;

    match server.run_pod_sandbox(&request) {
        Ok(id) => {
            println!("{}", id);
            Ok(())
        }
        Err(err) => {
            let kind = err.kind();
            error!(?kind, "{:?}", miette::Report::new(err));
            bail!("failed to run pod sandbox");
        }
    }
}
