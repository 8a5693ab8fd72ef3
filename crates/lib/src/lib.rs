//! Femtobot core library: message hub, agent loop, context assembly,
//! sessions, memory, tools, and channel adapters used by the CLI.

pub mod agent;
pub mod channels;
pub mod config;
pub mod context;
pub mod cron;
pub mod heartbeat;
pub mod hub;
pub mod init;
pub mod llm;
pub mod memory;
pub mod session;
pub mod tools;
