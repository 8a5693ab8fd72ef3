//! Filesystem tool: read, write, and list files, confined to the workspace.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use super::{Tool, ToolContext};

pub struct FsTool;

/// Join `rel` under `root`, rejecting absolute paths and `..` traversal.
fn resolve(root: &Path, rel: &str) -> Result<PathBuf, String> {
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return Err("path must be relative to the workspace".to_string());
    }
    for comp in rel_path.components() {
        match comp {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(format!("path escapes the workspace: {}", rel)),
        }
    }
    Ok(root.join(rel_path))
}

#[async_trait]
impl Tool for FsTool {
    fn name(&self) -> &str {
        "fs"
    }

    fn description(&self) -> &str {
        "Read, write, or list files inside the workspace"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["read", "write", "list"],
                    "description": "Operation to perform"
                },
                "path": {
                    "type": "string",
                    "description": "Workspace-relative path (directory for list)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write (write only)"
                }
            },
            "required": ["action", "path"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: &serde_json::Value) -> Result<String, String> {
        let action = args
            .get("action")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing 'action' argument".to_string())?;
        let rel = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing 'path' argument".to_string())?;
        let path = resolve(&ctx.workspace, rel)?;

        match action {
            "read" => tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| format!("reading {}: {}", rel, e)),
            "write" => {
                let content = args
                    .get("content")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "missing 'content' argument for write".to_string())?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| format!("creating {}: {}", rel, e))?;
                }
                tokio::fs::write(&path, content)
                    .await
                    .map_err(|e| format!("writing {}: {}", rel, e))?;
                Ok(format!("wrote {} bytes to {}", content.len(), rel))
            }
            "list" => {
                let mut entries = tokio::fs::read_dir(&path)
                    .await
                    .map_err(|e| format!("listing {}: {}", rel, e))?;
                let mut names = Vec::new();
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if entry.path().is_dir() {
                        name.push('/');
                    }
                    names.push(name);
                }
                names.sort();
                if names.is_empty() {
                    Ok("(empty)".to_string())
                } else {
                    Ok(names.join("\n"))
                }
            }
            other => Err(format!("unknown action: {}", other)),
        }
    }
}
