use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use lib::agent::AgentLoop;
use lib::channels::TelegramChannel;
use lib::config::{self, Config};
use lib::context::ContextBuilder;
use lib::cron::CronScheduler;
use lib::hub::Hub;
use lib::llm::{ChatProvider, OpenAiProvider, SamplingSettings, StubProvider};
use lib::memory::{LlmRanker, MemoryStore};
use lib::session::SessionStore;
use lib::tools::{CronTool, FsTool, MemoryTool, MessageTool, ShellTool, ToolRegistry, WebTool};

const HUB_CAPACITY: usize = 200;
const MEMORY_MAX_ITEMS: usize = 200;
const SHELL_TIMEOUT_S: u64 = 60;

#[derive(Parser)]
#[command(name = "femtobot")]
#[command(about = "Femtobot CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and seed the workspace (identity
    /// files, heartbeat checklist, memory directory).
    Onboard {
        /// Config file path (default: FEMTOBOT_CONFIG_PATH or ~/.femtobot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run one agent turn from the command line and print the reply.
    Agent {
        /// Config file path (default: FEMTOBOT_CONFIG_PATH or ~/.femtobot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Message to send to the agent.
        #[arg(long, short)]
        message: String,

        /// Model override for this turn.
        #[arg(long, short = 'M')]
        model: Option<String>,
    },

    /// Run the gateway: channel adapters, cron, heartbeat, and the agent
    /// loop, wired through the message hub. Runs until Ctrl-C.
    Gateway {
        /// Config file path (default: FEMTOBOT_CONFIG_PATH or ~/.femtobot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Model override.
        #[arg(long, short = 'M')]
        model: Option<String>,
    },

    /// Inspect or edit the memory files.
    Memory {
        /// Config file path (default: FEMTOBOT_CONFIG_PATH or ~/.femtobot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        #[command(subcommand)]
        command: MemoryCommands,
    },
}

#[derive(Subcommand)]
enum MemoryCommands {
    /// Print today's notes or the long-term file.
    Read {
        /// Which file to read: "today" or "long".
        #[arg(default_value = "today")]
        target: String,
    },
    /// Append to today's file (timestamped) or to the long-term file.
    Append {
        /// Which file to append to: "today" or "long".
        target: String,
        text: String,
    },
    /// Overwrite the long-term memory file.
    Write { text: String },
    /// Print notes from the last N days.
    Recent {
        #[arg(long, short, default_value_t = 3)]
        days: i64,
    },
    /// Rank today's and long-term notes against a query and print the top K.
    Rank {
        query: String,
        #[arg(long, short, default_value_t = 5)]
        top: usize,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("femtobot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Onboard { config }) => match lib::init::onboard(config) {
            Ok((config_path, workspace)) => {
                println!("config:    {}", config_path.display());
                println!("workspace: {}", workspace.display());
            }
            Err(e) => {
                log::error!("onboard failed: {}", e);
                std::process::exit(1);
            }
        },
        Some(Commands::Agent {
            config,
            message,
            model,
        }) => {
            if let Err(e) = run_agent_once(config, message, model).await {
                log::error!("agent failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, model }) => {
            if let Err(e) = run_gateway(config, model).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Memory { config, command }) => {
            if let Err(e) = run_memory(config, command).await {
                log::error!("memory command failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn build_provider(config: &Config) -> Arc<dyn ChatProvider> {
    match config::resolve_api_key(config) {
        Some(key) => {
            let api_base = config
                .providers
                .openai
                .as_ref()
                .and_then(|p| p.api_base.clone());
            Arc::new(OpenAiProvider::new(
                key,
                api_base,
                config.agents.defaults.request_timeout_s,
                SamplingSettings {
                    max_tokens: config.agents.defaults.max_tokens,
                    temperature: config.agents.defaults.temperature,
                },
            ))
        }
        None => {
            log::warn!("no API key configured, using the stub provider");
            Arc::new(StubProvider)
        }
    }
}

struct Wiring {
    hub: Hub,
    agent: Arc<AgentLoop>,
    scheduler: Arc<CronScheduler>,
}

/// Build the hub, tool registry, scheduler, and agent loop from config.
/// Shared by the gateway and the one-shot agent command.
async fn build_wiring(config: &Config, model: Option<String>) -> anyhow::Result<Wiring> {
    let workspace = config::resolve_workspace_dir(config);
    lib::init::init_workspace(&workspace)?;

    let provider = build_provider(config);
    let hub = Hub::new(HUB_CAPACITY);
    let memory = Arc::new(MemoryStore::new(&workspace, MEMORY_MAX_ITEMS));
    let scheduler = Arc::new(CronScheduler::load(&workspace).await);

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(MessageTool::new(hub.outbound_sender())));
    tools.register(Arc::new(MemoryTool::new(memory.clone())));
    tools.register(Arc::new(ShellTool::new(SHELL_TIMEOUT_S)));
    tools.register(Arc::new(WebTool::new(config.agents.defaults.request_timeout_s)));
    tools.register(Arc::new(FsTool));
    tools.register(Arc::new(CronTool::new(scheduler.clone())));

    let model = model.or_else(|| config.agents.defaults.model.clone());
    let agent = Arc::new(AgentLoop::new(
        provider,
        Arc::new(tools),
        SessionStore::new(&workspace),
        ContextBuilder::new(&workspace),
        memory,
        hub.outbound_sender(),
        workspace,
        model,
        config.agents.defaults.max_tool_iterations,
    ));

    Ok(Wiring {
        hub,
        agent,
        scheduler,
    })
}

async fn run_agent_once(
    config_path: Option<PathBuf>,
    message: String,
    model: Option<String>,
) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let wiring = build_wiring(&config, model).await?;
    let timeout = std::time::Duration::from_secs(config.agents.defaults.request_timeout_s);
    let reply = wiring
        .agent
        .process_direct(&message, timeout)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    println!("{}", reply.trim());
    Ok(())
}

async fn run_gateway(config_path: Option<PathBuf>, model: Option<String>) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    log::info!("starting gateway with config {}", path.display());

    let wiring = build_wiring(&config, model).await?;
    let workspace = config::resolve_workspace_dir(&config);
    let cancel = CancellationToken::new();

    // Channel adapters subscribe before the router starts; the router
    // snapshots the subscriber table once.
    if config.channels.telegram.enabled {
        match config::resolve_telegram_token(&config) {
            Some(token) => {
                let channel = Arc::new(TelegramChannel::new(
                    token,
                    config.channels.telegram.allow_from.clone(),
                ));
                channel.start(&wiring.hub, cancel.clone());
            }
            None => {
                log::warn!("telegram enabled but no token configured, skipping");
            }
        }
    }

    let inbound_rx = wiring.hub.take_inbound().map_err(|e| anyhow::anyhow!("{}", e))?;
    wiring
        .hub
        .start_router(cancel.clone())
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let agent = wiring.agent.clone();
    let agent_cancel = cancel.clone();
    let agent_task = tokio::spawn(async move {
        agent.run(inbound_rx, agent_cancel).await;
    });

    let scheduler = wiring.scheduler.clone();
    let cron_cancel = cancel.clone();
    let cron_inbound = wiring.hub.inbound_sender();
    tokio::spawn(async move {
        scheduler.run(cron_cancel, cron_inbound).await;
    });

    let _ = lib::heartbeat::start(
        workspace,
        std::time::Duration::from_secs(config.agents.defaults.heartbeat_interval_s),
        wiring.hub.inbound_sender(),
        cancel.clone(),
    );

    log::info!("gateway running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");
    cancel.cancel();
    let _ = agent_task.await;
    Ok(())
}

async fn run_memory(
    config_path: Option<PathBuf>,
    command: MemoryCommands,
) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let workspace = config::resolve_workspace_dir(&config);
    lib::init::init_workspace(&workspace)?;
    let store = MemoryStore::new(&workspace, MEMORY_MAX_ITEMS);

    match command {
        MemoryCommands::Read { target } => {
            let content = match target.as_str() {
                "today" => store.read_today().await,
                "long" => store.read_long_term().await,
                other => anyhow::bail!("unknown target {:?} (expected \"today\" or \"long\")", other),
            };
            println!("{}", content.trim_end());
        }
        MemoryCommands::Append { target, text } => {
            match target.as_str() {
                "today" => store
                    .append_today(&text)
                    .await
                    .map_err(|e| anyhow::anyhow!("{}", e))?,
                "long" => {
                    let existing = store.read_long_term().await;
                    let combined = if existing.trim_end().is_empty() {
                        text.clone()
                    } else {
                        format!("{}\n{}", existing.trim_end(), text)
                    };
                    store
                        .write_long_term(&combined)
                        .await
                        .map_err(|e| anyhow::anyhow!("{}", e))?;
                }
                other => anyhow::bail!("unknown target {:?} (expected \"today\" or \"long\")", other),
            }
            println!("appended to {}", target);
        }
        MemoryCommands::Write { text } => {
            store
                .write_long_term(&text)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            println!("written");
        }
        MemoryCommands::Recent { days } => {
            for item in store.recent(days).await {
                println!("[{}] {}", item.kind, item.text);
            }
        }
        MemoryCommands::Rank { query, top } => {
            let provider = build_provider(&config);
            let model = config
                .agents
                .defaults
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string());
            let ranker = LlmRanker::new(provider, model);
            let items = store.all_items().await;
            for item in ranker.rank(&query, items, top).await {
                println!("[{}] {}", item.kind, item.text);
            }
        }
    }
    Ok(())
}
