//! Relevance ranking over memory items using the chat provider as the scorer.
//! Deliberately not a vector index: quality lives in the prompt, not an
//! embedding store.

use std::sync::Arc;

use crate::llm::{ChatMessage, ChatProvider};
use crate::memory::MemoryItem;

pub struct LlmRanker {
    provider: Arc<dyn ChatProvider>,
    model: String,
}

impl LlmRanker {
    pub fn new(provider: Arc<dyn ChatProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Top-`k` items by relevance to `query`.
    ///
    /// Empty input returns empty, and when `k` covers the whole set the items
    /// are returned as-is without a provider call, so turns with few notes
    /// never add provider traffic.
    pub async fn rank(&self, query: &str, items: Vec<MemoryItem>, k: usize) -> Vec<MemoryItem> {
        if items.is_empty() || k == 0 {
            return Vec::new();
        }
        if items.len() <= k {
            return items;
        }

        let mut listing = String::new();
        for (i, item) in items.iter().enumerate() {
            listing.push_str(&format!("{}. [{}] {}\n", i + 1, item.kind, item.text));
        }
        let prompt = format!(
            "You rank notes by relevance to a query.\n\
             Query: {}\n\nNotes:\n{}\n\
             Reply with ONLY the numbers of the {} most relevant notes, \
             most relevant first, comma-separated (e.g. \"3,1,2\").",
            query, listing, k
        );
        let messages = vec![ChatMessage::user(prompt)];
        let response = match self.provider.chat(&messages, &[], &self.model).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("ranker: provider error, falling back to most recent: {}", e);
                return fallback(items, k);
            }
        };

        let indices = parse_indices(&response.content, items.len());
        if indices.is_empty() {
            log::debug!("ranker: unparseable reply {:?}, falling back", response.content);
            return fallback(items, k);
        }
        let mut ranked: Vec<MemoryItem> = indices
            .into_iter()
            .take(k)
            .map(|i| items[i].clone())
            .collect();
        // Pad with most recent unranked items if the model returned too few.
        if ranked.len() < k {
            for item in items.into_iter().rev() {
                if ranked.len() >= k {
                    break;
                }
                if !ranked.contains(&item) {
                    ranked.push(item);
                }
            }
        }
        ranked
    }
}

/// Most recent `k` items, newest last (daily notes are appended in order).
fn fallback(items: Vec<MemoryItem>, k: usize) -> Vec<MemoryItem> {
    let skip = items.len().saturating_sub(k);
    items.into_iter().skip(skip).collect()
}

/// Extract 1-based indices from a reply like "3, 1, 2", deduplicated and
/// bounds-checked. Returns 0-based indices.
fn parse_indices(reply: &str, len: usize) -> Vec<usize> {
    let mut seen = Vec::new();
    for token in reply.split(|c: char| !c.is_ascii_digit()) {
        if token.is_empty() {
            continue;
        }
        if let Ok(n) = token.parse::<usize>() {
            if n >= 1 && n <= len && !seen.contains(&(n - 1)) {
                seen.push(n - 1);
            }
        }
    }
    seen
}
