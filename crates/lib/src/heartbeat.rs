//! Heartbeat: a timer that injects a synthetic inbound message on the
//! `heartbeat` system channel, giving the agent a periodic chance to act
//! without user input. The prompt comes from `<workspace>/HEARTBEAT.md`;
//! when the file is missing or empty, the tick is skipped.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::hub::InboundMessage;

pub const HEARTBEAT_CHANNEL: &str = "heartbeat";

pub fn start(
    workspace: PathBuf,
    interval: Duration,
    inbound: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("heartbeat: started (every {:?})", interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("heartbeat: shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
            let prompt = tokio::fs::read_to_string(workspace.join("HEARTBEAT.md"))
                .await
                .unwrap_or_default();
            if prompt.trim().is_empty() {
                log::debug!("heartbeat: HEARTBEAT.md missing or empty, skipping tick");
                continue;
            }
            let msg = InboundMessage::new(
                HEARTBEAT_CHANNEL,
                HEARTBEAT_CHANNEL,
                HEARTBEAT_CHANNEL,
                prompt.trim().to_string(),
            );
            if inbound.send(msg).await.is_err() {
                log::warn!("heartbeat: inbound queue closed, stopping");
                return;
            }
        }
    })
}
