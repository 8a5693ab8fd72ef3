//! Message hub: decouples channel adapters from the single agent loop consumer.
//!
//! All producers (channel adapters, cron, heartbeat) push into one bounded
//! inbound queue. Replies go to a single outbound queue; a dedicated router
//! task fans each reply out to the subscriber whose channel name matches the
//! reply's target. Subscriptions must all be registered before the router is
//! started; the router snapshots the subscriber table once, so no lock is
//! held on the delivery path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One unit of conversational input, produced by a channel adapter or the scheduler.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Channel the message arrived on (e.g. "telegram", "heartbeat", "cron").
    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Adapter-specific extras (message ids, display names); the core never reads these.
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            timestamp: chrono::Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// ConversationKey: uniquely identifies one session.
    pub fn conversation_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

/// A reply addressed to one channel's conversation.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("inbound queue closed")]
    InboundClosed,
    #[error("inbound receiver already taken")]
    InboundTaken,
    #[error("router already started")]
    RouterStarted,
}

/// Cloneable handle for submitting outbound replies (non-blocking, drop-on-full).
#[derive(Clone)]
pub struct OutboundSender {
    tx: mpsc::Sender<OutboundMessage>,
}

impl OutboundSender {
    /// Try to enqueue a reply for routing. Never blocks: when the outbound
    /// queue is full or closed the message is dropped and logged.
    pub fn try_send(&self, msg: OutboundMessage) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(m)) => {
                log::warn!("hub: outbound queue full, dropping reply for {}:{}", m.channel, m.chat_id);
            }
            Err(mpsc::error::TrySendError::Closed(m)) => {
                log::warn!("hub: outbound queue closed, dropping reply for {}:{}", m.channel, m.chat_id);
            }
        }
    }
}

/// The routing fabric: one inbound queue, one outbound queue, per-channel subscriber queues.
pub struct Hub {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Mutex<Option<mpsc::Receiver<OutboundMessage>>>,
    subscribers: Mutex<HashMap<String, mpsc::Sender<OutboundMessage>>>,
    routing: AtomicBool,
    capacity: usize,
}

impl Hub {
    /// Create a hub whose inbound/outbound/subscriber queues hold `capacity` messages each.
    pub fn new(capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            subscribers: Mutex::new(HashMap::new()),
            routing: AtomicBool::new(false),
            capacity,
        }
    }

    /// Cloneable sender for producers (channel adapters, cron, heartbeat).
    pub fn inbound_sender(&self) -> mpsc::Sender<InboundMessage> {
        self.inbound_tx.clone()
    }

    /// Enqueue an inbound message. Blocks the producer while the queue is
    /// full: inbound user messages must not be lost, so backpressure is the
    /// contract here (and only here).
    pub async fn submit_inbound(&self, msg: InboundMessage) -> Result<(), HubError> {
        self.inbound_tx
            .send(msg)
            .await
            .map_err(|_| HubError::InboundClosed)
    }

    /// Take the inbound receiver. The agent loop is the single consumer; the
    /// second call returns an error.
    pub fn take_inbound(&self) -> Result<mpsc::Receiver<InboundMessage>, HubError> {
        self.inbound_rx
            .lock()
            .expect("inbound_rx lock poisoned")
            .take()
            .ok_or(HubError::InboundTaken)
    }

    /// Handle for submitting replies to the outbound queue.
    pub fn outbound_sender(&self) -> OutboundSender {
        OutboundSender {
            tx: self.outbound_tx.clone(),
        }
    }

    /// Register interest in replies targeted at `channel`. Each adapter must
    /// subscribe exactly once, before `start_router`: the router snapshots
    /// the subscriber table when it starts, so later subscriptions are never
    /// routed to.
    pub fn subscribe(&self, channel: &str) -> mpsc::Receiver<OutboundMessage> {
        if self.routing.load(Ordering::SeqCst) {
            log::error!("hub: subscribe({}) after router start; this subscriber will receive nothing", channel);
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subs = self.subscribers.lock().expect("subscribers lock poisoned");
        if subs.insert(channel.to_string(), tx).is_some() {
            log::warn!("hub: duplicate subscribe for channel {}, replacing", channel);
        }
        rx
    }

    /// Start the dedicated routing task. Delivery is always non-blocking: a
    /// missing subscriber or a full subscriber queue drops the message with a
    /// log entry, so one slow adapter cannot stall replies to the others.
    pub fn start_router(&self, cancel: CancellationToken) -> Result<JoinHandle<()>, HubError> {
        let mut rx = self
            .outbound_rx
            .lock()
            .expect("outbound_rx lock poisoned")
            .take()
            .ok_or(HubError::RouterStarted)?;
        self.routing.store(true, Ordering::SeqCst);
        let subscribers: HashMap<String, mpsc::Sender<OutboundMessage>> = self
            .subscribers
            .lock()
            .expect("subscribers lock poisoned")
            .clone();
        log::info!("hub: router started with {} subscriber(s)", subscribers.len());
        Ok(tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = cancel.cancelled() => {
                        log::info!("hub: router shutting down");
                        return;
                    }
                    msg = rx.recv() => match msg {
                        Some(m) => m,
                        None => {
                            log::info!("hub: outbound queue closed, router stopping");
                            return;
                        }
                    },
                };
                match subscribers.get(&msg.channel) {
                    Some(tx) => match tx.try_send(msg) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(m)) => {
                            log::warn!("hub: subscriber queue full for {}, dropping reply", m.channel);
                        }
                        Err(mpsc::error::TrySendError::Closed(m)) => {
                            log::warn!("hub: subscriber gone for {}, dropping reply", m.channel);
                        }
                    },
                    None => {
                        log::warn!("hub: no subscriber for channel {}, dropping reply", msg.channel);
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inbound_is_fifo_across_producers() {
        let hub = Hub::new(8);
        hub.submit_inbound(InboundMessage::new("telegram", "u1", "c1", "first"))
            .await
            .unwrap();
        hub.submit_inbound(InboundMessage::new("cron", "cron", "c2", "second"))
            .await
            .unwrap();
        let mut rx = hub.take_inbound().unwrap();
        assert_eq!(rx.recv().await.unwrap().content, "first");
        assert_eq!(rx.recv().await.unwrap().content, "second");
    }

    #[tokio::test]
    async fn take_inbound_is_single_consumer() {
        let hub = Hub::new(1);
        assert!(hub.take_inbound().is_ok());
        assert!(matches!(hub.take_inbound(), Err(HubError::InboundTaken)));
    }

    #[tokio::test]
    async fn router_delivers_only_to_matching_subscriber() {
        let hub = Hub::new(8);
        let mut telegram_rx = hub.subscribe("telegram");
        let mut discord_rx = hub.subscribe("discord");
        let cancel = CancellationToken::new();
        hub.start_router(cancel.clone()).unwrap();

        hub.outbound_sender().try_send(OutboundMessage {
            channel: "telegram".to_string(),
            chat_id: "42".to_string(),
            content: "hi".to_string(),
        });

        let got = telegram_rx.recv().await.unwrap();
        assert_eq!(got.chat_id, "42");
        assert!(discord_rx.try_recv().is_err());
        cancel.cancel();
    }

    #[tokio::test]
    async fn router_drops_when_subscriber_queue_full() {
        let hub = Hub::new(1);
        let mut rx = hub.subscribe("telegram");
        let cancel = CancellationToken::new();
        hub.start_router(cancel.clone()).unwrap();

        let out = hub.outbound_sender();
        for i in 0..5 {
            out.try_send(OutboundMessage {
                channel: "telegram".to_string(),
                chat_id: "1".to_string(),
                content: format!("m{}", i),
            });
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        // The first message is delivered; later ones may be dropped, but the
        // router must still be alive and delivering after the burst.
        assert_eq!(rx.recv().await.unwrap().content, "m0");
        while rx.try_recv().is_ok() {}
        out.try_send(OutboundMessage {
            channel: "telegram".to_string(),
            chat_id: "1".to_string(),
            content: "after".to_string(),
        });
        let got = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("router still routing")
            .unwrap();
        assert_eq!(got.content, "after");
        cancel.cancel();
    }

    #[tokio::test]
    async fn second_router_start_fails() {
        let hub = Hub::new(1);
        let cancel = CancellationToken::new();
        hub.start_router(cancel.clone()).unwrap();
        assert!(matches!(
            hub.start_router(cancel.clone()),
            Err(HubError::RouterStarted)
        ));
        cancel.cancel();
    }
}
