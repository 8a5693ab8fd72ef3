//! Cron tool: lets the model schedule, list, and cancel reminders for the
//! current conversation.

use async_trait::async_trait;
use std::sync::Arc;

use super::{Tool, ToolContext};
use crate::cron::{CronJob, CronScheduler, Schedule};

pub struct CronTool {
    scheduler: Arc<CronScheduler>,
}

impl CronTool {
    pub fn new(scheduler: Arc<CronScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str {
        "cron"
    }

    fn description(&self) -> &str {
        "Schedule reminders: add a one-shot or repeating reminder, list reminders, or remove one"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "list", "remove"],
                    "description": "Operation to perform"
                },
                "message": {
                    "type": "string",
                    "description": "Reminder text (add only)"
                },
                "name": {
                    "type": "string",
                    "description": "Short label for the reminder (add only)"
                },
                "in_seconds": {
                    "type": "integer",
                    "description": "Fire once this many seconds from now (add only)"
                },
                "every_seconds": {
                    "type": "integer",
                    "description": "Fire repeatedly at this interval (add only)"
                },
                "id": {
                    "type": "string",
                    "description": "Job id to remove (remove only)"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> Result<String, String> {
        let action = args
            .get("action")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing 'action' argument".to_string())?;
        match action {
            "add" => {
                let message = args
                    .get("message")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "missing 'message' argument".to_string())?;
                let name = args
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("reminder");
                let in_s = args.get("in_seconds").and_then(|v| v.as_u64());
                let every_s = args.get("every_seconds").and_then(|v| v.as_u64());
                let now_ms = chrono::Utc::now().timestamp_millis();
                // Repeating jobs anchor their interval at creation time.
                let (schedule, last_fired_ms) = match (in_s, every_s) {
                    (Some(s), None) => (
                        Schedule {
                            at_ms: Some(now_ms + (s as i64) * 1000),
                            every_s: None,
                        },
                        None,
                    ),
                    (None, Some(s)) if s > 0 => (
                        Schedule {
                            at_ms: None,
                            every_s: Some(s),
                        },
                        Some(now_ms),
                    ),
                    _ => {
                        return Err(
                            "provide exactly one of 'in_seconds' or 'every_seconds'".to_string()
                        )
                    }
                };
                let job = CronJob {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: name.to_string(),
                    message: message.to_string(),
                    channel: ctx.channel.clone(),
                    chat_id: ctx.chat_id.clone(),
                    schedule,
                    last_fired_ms,
                };
                let id = job.id.clone();
                self.scheduler.add(job).await?;
                Ok(format!("reminder scheduled (id {})", id))
            }
            "list" => {
                let jobs = self.scheduler.list().await;
                if jobs.is_empty() {
                    return Ok("no reminders scheduled".to_string());
                }
                let lines: Vec<String> = jobs
                    .iter()
                    .map(|j| {
                        let when = match (&j.schedule.at_ms, &j.schedule.every_s) {
                            (Some(at), _) => format!("at {}ms", at),
                            (_, Some(every)) => format!("every {}s", every),
                            _ => "unscheduled".to_string(),
                        };
                        format!("{}: {} ({}, {})", j.id, j.message, j.name, when)
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
            "remove" => {
                let id = args
                    .get("id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "missing 'id' argument".to_string())?;
                if self.scheduler.remove(id).await? {
                    Ok("reminder removed".to_string())
                } else {
                    Err(format!("no reminder with id {}", id))
                }
            }
            other => Err(format!("unknown action: {}", other)),
        }
    }
}
