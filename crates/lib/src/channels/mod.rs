//! Communication-surface adapters.
//!
//! An adapter translates external events into `InboundMessage`s, subscribes
//! to the hub exactly once for its channel name, and drains its outbound
//! queue into its native send operation. Allow-list filtering is
//! adapter-local; the hub never sees rejected messages.

mod telegram;

pub use telegram::TelegramChannel;
