//! Onboarding: create the config directory, a default config file, and the
//! workspace with its bootstrap files (SOUL.md, AGENTS.md, HEARTBEAT.md).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};

const DEFAULT_SOUL: &str = "# Soul

I am femtobot, a personal AI assistant.

## Personality

- Helpful and friendly
- Concise and to the point

## Values

- Accuracy over speed
- User privacy and safety
";

const DEFAULT_AGENTS: &str = "# Agent Instructions

You are a helpful AI assistant. Be concise, accurate, and friendly.
Use the memory tool to note things worth keeping, and the cron tool to
schedule reminders the user asks for.
";

const DEFAULT_HEARTBEAT: &str = "Check scheduled tasks and today's notes. \
If nothing needs attention, do nothing and reply briefly.
";

/// Create the config file (with defaults) and bootstrap the workspace.
/// Existing files are left untouched. Returns (config_path, workspace_path).
pub fn onboard(config_path: Option<PathBuf>) -> Result<(PathBuf, PathBuf)> {
    let config_path = config_path.unwrap_or_else(config::default_config_path);
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(&config_path, default)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let (config, _) = config::load_config(Some(config_path.clone()))?;
    let workspace = config::resolve_workspace_dir(&config);
    init_workspace(&workspace)?;
    Ok((config_path, workspace))
}

/// Create the workspace directory and seed missing bootstrap files.
pub fn init_workspace(workspace: &Path) -> Result<()> {
    std::fs::create_dir_all(workspace.join("memory"))
        .with_context(|| format!("creating workspace at {}", workspace.display()))?;
    for (name, content) in [
        ("SOUL.md", DEFAULT_SOUL),
        ("AGENTS.md", DEFAULT_AGENTS),
        ("HEARTBEAT.md", DEFAULT_HEARTBEAT),
    ] {
        let path = workspace.join(name);
        if !path.exists() {
            std::fs::write(&path, content)
                .with_context(|| format!("writing {}", path.display()))?;
            log::info!("wrote default {} to {}", name, path.display());
        }
    }
    Ok(())
}
