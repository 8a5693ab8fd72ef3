//! Workspace memory files: append-only daily notes (`memory/YYYY-MM-DD.md`)
//! and an overwritable long-term note (`memory/MEMORY.md`). Owned by the
//! agent loop; independent of sessions.

mod ranker;

pub use ranker::LlmRanker;

use chrono::{Duration, Local};
use std::path::PathBuf;

/// A single free-text note, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryItem {
    /// "today" for daily-note lines, "long" for long-term lines.
    pub kind: String,
    pub text: String,
}

pub struct MemoryStore {
    memory_dir: PathBuf,
    /// Cap on items returned by `recent` so a busy week cannot flood a prompt.
    max_items: usize,
}

impl MemoryStore {
    pub fn new(workspace: impl Into<PathBuf>, max_items: usize) -> Self {
        Self {
            memory_dir: workspace.into().join("memory"),
            max_items,
        }
    }

    fn today_path(&self) -> PathBuf {
        self.memory_dir
            .join(format!("{}.md", Local::now().format("%Y-%m-%d")))
    }

    fn long_term_path(&self) -> PathBuf {
        self.memory_dir.join("MEMORY.md")
    }

    /// Append a timestamped line to today's note.
    pub async fn append_today(&self, text: &str) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.memory_dir)
            .await
            .map_err(|e| format!("creating memory dir: {}", e))?;
        let path = self.today_path();
        let mut existing = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        if !existing.is_empty() && !existing.ends_with('\n') {
            existing.push('\n');
        }
        existing.push_str(&format!(
            "[{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            text.trim()
        ));
        tokio::fs::write(&path, existing)
            .await
            .map_err(|e| format!("writing {}: {}", path.display(), e))
    }

    /// Contents of today's note; empty string when none exists yet.
    pub async fn read_today(&self) -> String {
        tokio::fs::read_to_string(self.today_path())
            .await
            .unwrap_or_default()
    }

    pub async fn read_long_term(&self) -> String {
        tokio::fs::read_to_string(self.long_term_path())
            .await
            .unwrap_or_default()
    }

    /// Full overwrite of the long-term note.
    pub async fn write_long_term(&self, text: &str) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.memory_dir)
            .await
            .map_err(|e| format!("creating memory dir: {}", e))?;
        tokio::fs::write(self.long_term_path(), text)
            .await
            .map_err(|e| format!("writing MEMORY.md: {}", e))
    }

    /// Combined memory context for the system prompt: long-term note plus
    /// today's note, with headers; empty string when both are missing.
    pub async fn memory_context(&self) -> String {
        let mut out = String::new();
        let long = self.read_long_term().await;
        if !long.trim().is_empty() {
            out.push_str("## Long-term memory\n");
            out.push_str(long.trim());
            out.push('\n');
        }
        let today = self.read_today().await;
        if !today.trim().is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("## Today's notes\n");
            out.push_str(today.trim());
            out.push('\n');
        }
        out
    }

    /// Note lines from the last `days` daily files (newest day last), with
    /// timestamp prefixes stripped, capped at `max_items`.
    pub async fn recent(&self, days: i64) -> Vec<MemoryItem> {
        let mut items = Vec::new();
        let today = Local::now().date_naive();
        for offset in (0..days.max(1)).rev() {
            let day = today - Duration::days(offset);
            let path = self.memory_dir.join(format!("{}.md", day.format("%Y-%m-%d")));
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            for line in content.lines() {
                let line = strip_timestamp(line.trim());
                if line.is_empty() {
                    continue;
                }
                items.push(MemoryItem {
                    kind: "today".to_string(),
                    text: line.to_string(),
                });
            }
        }
        if items.len() > self.max_items {
            let skip = items.len() - self.max_items;
            items.drain(..skip);
        }
        items
    }

    /// Items for ranking: every non-empty line of today's note and the
    /// long-term note.
    pub async fn all_items(&self) -> Vec<MemoryItem> {
        let mut items = Vec::new();
        for line in self.read_today().await.lines() {
            let line = strip_timestamp(line.trim());
            if !line.is_empty() {
                items.push(MemoryItem {
                    kind: "today".to_string(),
                    text: line.to_string(),
                });
            }
        }
        for line in self.read_long_term().await.lines() {
            let line = line.trim();
            if !line.is_empty() {
                items.push(MemoryItem {
                    kind: "long".to_string(),
                    text: line.to_string(),
                });
            }
        }
        items
    }
}

/// Strip the leading `[YYYY-MM-DD HH:MM:SS] ` prefix written by append_today.
fn strip_timestamp(line: &str) -> &str {
    if line.starts_with('[') {
        if let Some(idx) = line.find("] ") {
            return line[idx + 2..].trim();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_workspace() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("femtobot-memory-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp workspace");
        dir
    }

    #[tokio::test]
    async fn append_today_accumulates_lines() {
        let store = MemoryStore::new(temp_workspace(), 100);
        store.append_today("buy milk").await.unwrap();
        store.append_today("call alice").await.unwrap();
        let today = store.read_today().await;
        assert!(today.contains("buy milk"));
        assert!(today.contains("call alice"));
        assert_eq!(today.lines().count(), 2);
    }

    #[tokio::test]
    async fn write_long_term_overwrites() {
        let store = MemoryStore::new(temp_workspace(), 100);
        store.write_long_term("v1").await.unwrap();
        store.write_long_term("v2").await.unwrap();
        assert_eq!(store.read_long_term().await, "v2");
    }

    #[tokio::test]
    async fn recent_strips_timestamps_and_caps() {
        let store = MemoryStore::new(temp_workspace(), 2);
        store.append_today("one").await.unwrap();
        store.append_today("two").await.unwrap();
        store.append_today("three").await.unwrap();
        let items = store.recent(1).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text, "two");
        assert_eq!(items[1].text, "three");
    }

    #[tokio::test]
    async fn memory_context_empty_when_no_files() {
        let store = MemoryStore::new(temp_workspace(), 100);
        assert!(store.memory_context().await.is_empty());
    }

    #[test]
    fn timestamp_prefix_stripped() {
        assert_eq!(strip_timestamp("[2026-08-30 10:00:00] buy milk"), "buy milk");
        assert_eq!(strip_timestamp("no prefix"), "no prefix");
    }
}
