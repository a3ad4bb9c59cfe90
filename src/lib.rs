//! pairline: the agent-side session host.
//!
//! Wires configuration, the selected agent runtime and the on-disk session
//! directory into a [`SessionHost`] and serves it on stdio. The same host can
//! also be driven in-process through a [`BridgeClient`].

pub mod config;
pub mod logging;
pub mod runtimes;

use std::sync::Arc;

use agent_runtime::RuntimeInitError;
use session_bridge::{BridgeClient, PhaseNotification, SessionHost};
use session_store::SessionDirectory;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use crate::config::Config;

const IN_PROCESS_BUFFER_BYTES: usize = 256 * 1024;

pub fn build_host(config: &Config) -> Result<Arc<SessionHost>, RuntimeInitError> {
    let runtime = runtimes::runtime_for_config(config)?;
    Ok(SessionHost::new(
        SessionDirectory::new(config.data_dir.clone()),
        config.workspace_id.clone(),
        runtime,
    ))
}

/// Serves the bridge protocol on stdin/stdout until stdin closes.
pub async fn serve_stdio(config: &Config) -> anyhow::Result<()> {
    let host = build_host(config)?;
    tracing::info!(data_dir = %config.data_dir.display(), "serving bridge on stdio");
    host.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await;
    Ok(())
}

/// Starts a host on the current tokio runtime and returns a client connected
/// to it through an in-memory stream.
pub fn connect_in_process(
    config: &Config,
) -> Result<(BridgeClient, mpsc::UnboundedReceiver<PhaseNotification>), RuntimeInitError> {
    let host = build_host(config)?;
    let (ui, agent) = tokio::io::duplex(IN_PROCESS_BUFFER_BYTES);
    let (agent_read, agent_write) = tokio::io::split(agent);
    let (ui_read, ui_write) = tokio::io::split(ui);

    tokio::spawn(host.serve(BufReader::new(agent_read), agent_write));
    Ok(BridgeClient::connect(
        BufReader::new(ui_read),
        ui_write,
        config.request_timeout,
    ))
}
