//! Cron scheduler: persisted reminder jobs that fire back into the hub as
//! synthetic inbound messages, so the model relays them to the user.
//!
//! Jobs are either one-shot (fire at an epoch-millisecond instant) or
//! repeating (fire every N seconds). State lives in `<workspace>/cron/jobs.json`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::hub::InboundMessage;

const TICK_MS: u64 = 1000;

/// When a job fires, either `at_ms` (one-shot) or `every_s` (repeating) is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every_s: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    pub id: String,
    pub name: String,
    /// The reminder text relayed through the agent when the job fires.
    pub message: String,
    /// Originating conversation, so the reply reaches the right user.
    pub channel: String,
    pub chat_id: String,
    pub schedule: Schedule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fired_ms: Option<i64>,
}

impl CronJob {
    fn due(&self, now_ms: i64) -> bool {
        if let Some(at) = self.schedule.at_ms {
            return now_ms >= at;
        }
        if let Some(every) = self.schedule.every_s {
            let last = self.last_fired_ms.unwrap_or(0);
            return now_ms - last >= (every as i64) * 1000;
        }
        false
    }

    fn one_shot(&self) -> bool {
        self.schedule.at_ms.is_some()
    }
}

pub struct CronScheduler {
    jobs: Arc<RwLock<Vec<CronJob>>>,
    path: PathBuf,
}

impl CronScheduler {
    /// Load persisted jobs from `<workspace>/cron/jobs.json` (empty when missing).
    pub async fn load(workspace: impl Into<PathBuf>) -> Self {
        let path = workspace.into().join("cron").join("jobs.json");
        let jobs = match tokio::fs::read_to_string(&path).await {
            Ok(data) => match serde_json::from_str::<Vec<CronJob>>(&data) {
                Ok(jobs) => jobs,
                Err(e) => {
                    log::warn!("cron: ignoring corrupt {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        log::info!("cron: loaded {} job(s)", jobs.len());
        Self {
            jobs: Arc::new(RwLock::new(jobs)),
            path,
        }
    }

    pub async fn add(&self, job: CronJob) -> Result<(), String> {
        self.jobs.write().await.push(job);
        self.persist().await
    }

    pub async fn list(&self) -> Vec<CronJob> {
        self.jobs.read().await.clone()
    }

    /// Remove a job by id; returns whether one was removed.
    pub async fn remove(&self, id: &str) -> Result<bool, String> {
        let removed = {
            let mut jobs = self.jobs.write().await;
            let before = jobs.len();
            jobs.retain(|j| j.id != id);
            jobs.len() != before
        };
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn persist(&self) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("creating cron dir: {}", e))?;
        }
        let jobs = self.jobs.read().await;
        let json = serde_json::to_string_pretty(&*jobs)
            .map_err(|e| format!("serializing cron jobs: {}", e))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| format!("writing {}: {}", self.path.display(), e))
    }

    /// Tick loop: every second, fire due jobs into the inbound queue. One-shot
    /// jobs are removed after firing; repeating jobs update their fire time.
    pub async fn run(&self, cancel: CancellationToken, inbound: mpsc::Sender<InboundMessage>) {
        log::info!("cron: scheduler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("cron: scheduler shutting down");
                    return;
                }
                _ = tokio::time::sleep(std::time::Duration::from_millis(TICK_MS)) => {}
            }
            let now_ms = chrono::Utc::now().timestamp_millis();
            let fired = self.fire_due(now_ms).await;
            for job in fired {
                log::info!("cron fired: {} ({})", job.name, job.message);
                let msg = InboundMessage::new(
                    job.channel.clone(),
                    "cron",
                    job.chat_id.clone(),
                    format!(
                        "[Scheduled reminder fired] {} — Please relay this to the user in a friendly way.",
                        job.message
                    ),
                );
                if inbound.send(msg).await.is_err() {
                    log::warn!("cron: inbound queue closed, stopping scheduler");
                    return;
                }
            }
        }
    }

    /// Collect due jobs, updating/removing them, and persist if anything fired.
    async fn fire_due(&self, now_ms: i64) -> Vec<CronJob> {
        let mut fired = Vec::new();
        {
            let mut jobs = self.jobs.write().await;
            let mut keep = Vec::with_capacity(jobs.len());
            for mut job in jobs.drain(..) {
                if job.due(now_ms) {
                    fired.push(job.clone());
                    if !job.one_shot() {
                        job.last_fired_ms = Some(now_ms);
                        keep.push(job);
                    }
                } else {
                    keep.push(job);
                }
            }
            *jobs = keep;
        }
        if !fired.is_empty() {
            if let Err(e) = self.persist().await {
                log::warn!("cron: persisting after fire failed: {}", e);
            }
        }
        fired
    }
}
