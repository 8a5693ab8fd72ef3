//! Web tool: fetch a URL over HTTP(S) and return the response body text.

use async_trait::async_trait;

use super::{Tool, ToolContext};

/// Cap on returned body text so one large page cannot flood the transcript.
const MAX_BODY_BYTES: usize = 64 * 1024;

pub struct WebTool {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl WebTool {
    pub fn new(timeout_s: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_s.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }
}

#[async_trait]
impl Tool for WebTool {
    fn name(&self) -> &str {
        "web"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP or HTTPS and return the response body as text"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http:// or https:// URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, args: &serde_json::Value) -> Result<String, String> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing 'url' argument".to_string())?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err("url must start with http:// or https://".to_string());
        }
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("fetching {}: {}", url, e))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| format!("reading body of {}: {}", url, e))?;
        if !status.is_success() {
            return Err(format!("{} returned {}", url, status));
        }
        if body.trim().is_empty() {
            return Ok("(empty body)".to_string());
        }
        Ok(truncate_body(&body, self.max_body_bytes))
    }
}

/// Truncate on a char boundary and mark the cut.
fn truncate_body(body: &str, max_bytes: usize) -> String {
    if body.len() <= max_bytes {
        return body.to_string();
    }
    let mut end = max_bytes;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... (truncated)", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ctx() -> ToolContext {
        ToolContext {
            channel: "test".to_string(),
            chat_id: "1".to_string(),
            workspace: PathBuf::from("/tmp"),
        }
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected() {
        let tool = WebTool::new(5);
        let err = tool
            .execute(&ctx(), &serde_json::json!({"url": "file:///etc/passwd"}))
            .await
            .unwrap_err();
        assert!(err.contains("http"));
    }

    #[tokio::test]
    async fn missing_url_argument() {
        let tool = WebTool::new(5);
        let err = tool.execute(&ctx(), &serde_json::json!({})).await.unwrap_err();
        assert!(err.contains("url"));
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundaries() {
        let body = "é".repeat(100);
        let out = truncate_body(&body, 11);
        assert!(out.ends_with("... (truncated)"));
        assert!(out.starts_with("ééééé"));
    }

    #[test]
    fn short_bodies_pass_through() {
        assert_eq!(truncate_body("hello", 100), "hello");
    }
}
