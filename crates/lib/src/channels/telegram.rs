//! Telegram channel: long-poll getUpdates for inbound, sendMessage for
//! outbound replies drained from the hub subscription.

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::hub::{Hub, InboundMessage, OutboundMessage};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
pub const CHANNEL_NAME: &str = "telegram";

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    #[serde(default)]
    from: Option<TelegramUser>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

/// Telegram adapter: one long-poll task (inbound) and one drain task
/// (outbound, from the hub subscription).
pub struct TelegramChannel {
    token: String,
    /// Sender ids or usernames allowed to talk to the bot; empty = allow all.
    allow_from: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: impl Into<String>, allow_from: Vec<String>) -> Self {
        Self {
            token: token.into(),
            allow_from,
            client: reqwest::Client::new(),
        }
    }

    /// Subscribe to the hub and spawn the inbound/outbound loops. Must be
    /// called before `Hub::start_router` so the subscription is routed to.
    pub fn start(
        self: Arc<Self>,
        hub: &Hub,
        cancel: CancellationToken,
    ) -> (JoinHandle<()>, JoinHandle<()>) {
        let outbound_rx = hub.subscribe(CHANNEL_NAME);
        let inbound_tx = hub.inbound_sender();
        log::info!("telegram channel: starting");

        let inbound = {
            let this = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                this.run_inbound(inbound_tx, cancel).await;
            })
        };
        let outbound = tokio::spawn(async move {
            self.run_outbound(outbound_rx, cancel).await;
        });
        (inbound, outbound)
    }

    fn allowed(&self, from: Option<&TelegramUser>) -> bool {
        if self.allow_from.is_empty() {
            return true;
        }
        let Some(user) = from else {
            return false;
        };
        let id = user.id.to_string();
        self.allow_from.iter().any(|a| {
            a == &id || user.username.as_deref().is_some_and(|u| a == u)
        })
    }

    async fn run_inbound(
        &self,
        inbound_tx: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) {
        let mut offset: Option<i64> = None;
        loop {
            let updates = tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("telegram: getUpdates loop stopped");
                    return;
                }
                r = self.get_updates(offset) => r,
            };
            match updates {
                Ok((updates, next)) => {
                    offset = next;
                    for u in updates {
                        let Some(msg) = u.message else { continue };
                        let Some(text) = msg.text else { continue };
                        if !self.allowed(msg.from.as_ref()) {
                            log::debug!("telegram: sender not in allowFrom, ignoring");
                            continue;
                        }
                        let sender = msg
                            .from
                            .as_ref()
                            .map(|f| f.id.to_string())
                            .unwrap_or_else(|| "unknown".to_string());
                        let inbound =
                            InboundMessage::new(CHANNEL_NAME, sender, msg.chat.id.to_string(), text);
                        // Blocking send: inbound backpressure is the contract.
                        if inbound_tx.send(inbound).await.is_err() {
                            log::warn!("telegram: inbound queue closed, stopping loop");
                            return;
                        }
                    }
                }
                Err(e) => {
                    log::debug!("telegram getUpdates error: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                }
            }
        }
    }

    async fn run_outbound(
        &self,
        mut outbound_rx: mpsc::Receiver<OutboundMessage>,
        cancel: CancellationToken,
    ) {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("telegram: outbound loop stopped");
                    return;
                }
                m = outbound_rx.recv() => match m {
                    Some(m) => m,
                    None => return,
                },
            };
            if let Err(e) = self.send_message(&msg.chat_id, &msg.content).await {
                log::warn!("telegram sendMessage failed: {}", e);
            }
        }
    }

    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), String> {
        let mut url = format!(
            "{}/bot{}/getUpdates?timeout={}",
            api_base(),
            self.token,
            LONG_POLL_TIMEOUT
        );
        if let Some(off) = offset {
            url.push_str(&format!("&offset={}", off));
        }
        let res = self.client.get(&url).send().await.map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("getUpdates failed: {} {}", status, body));
        }
        let data: GetUpdatesResponse = res.json().await.map_err(|e| e.to_string())?;
        if !data.ok {
            return Err("getUpdates returned ok: false".to_string());
        }
        let next_offset = data.result.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((data.result, next_offset))
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), String> {
        let url = format!("{}/bot{}/sendMessage", api_base(), self.token);
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("sendMessage failed: {} {}", status, body));
        }
        Ok(())
    }
}

/// Bot API base URL (overridable for tests or proxies).
fn api_base() -> String {
    std::env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| TELEGRAM_API_BASE.to_string())
}
