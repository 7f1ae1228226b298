//! MQTT session lifecycle.
//!
//! ```text
//!            service(): due              Connected event
//! Disconnected ─────────────▶ Connecting ───────────────▶ Connected
//!      ▲                          │                           │
//!      └──── timeout / refused ───┘◀── drop / publish error ──┘
//! ```
//!
//! Every connect registers a retained `offline` will on `<base>/status`.
//! Reaching `Connected` publishes retained `online`, re-subscribes every
//! output `set` topic and resets the backoff.  Nothing here blocks: the
//! transport reports outcomes through [`MqttTransport::poll_event`].
//!
//! A session that fails while the link may still be up (publish or
//! subscribe error) overwrites the retained status with `offline` and is
//! aborted rather than cleanly disconnected, so the broker still fires the
//! will if that publish never arrives.

use log::{debug, info, warn};

use crate::app::ports::{ConnectOptions, MqttTransport, TransportEvent, Will};
use crate::config::KernelConfig;
use crate::error::TransportError;

use super::topics::{TopicRouter, STATUS_OFFLINE, STATUS_ONLINE};
use super::{InboundMessage, Topic};

pub const INITIAL_BACKOFF_MS: u64 = 1_000;
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
/// Upper bound on broker messages handed to the kernel per tick.
pub const MAX_INBOUND_PER_TICK: usize = 16;

const MAX_SUBSCRIPTIONS: usize = crate::channel::CHANNEL_COUNT;

pub type InboundBatch = heapless::Vec<InboundMessage, MAX_INBOUND_PER_TICK>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting { since_ms: u64 },
    Connected,
}

// ── Backoff ───────────────────────────────────────────────────

/// Exponential reconnect delay: 1 s, 2 s, 4 s … capped at `max_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial_ms: u64,
    max_ms: u64,
    current_ms: u64,
}

impl Backoff {
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        let max_ms = max_ms.max(initial_ms);
        Self { initial_ms, max_ms, current_ms: initial_ms }
    }

    /// Delay to wait now; the following call returns double, up to the cap.
    pub fn next_delay(&mut self) -> u64 {
        let delay = self.current_ms;
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
        delay
    }

    pub fn reset(&mut self) {
        self.current_ms = self.initial_ms;
    }
}

// ── Session ───────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub connect_attempts: u32,
    pub sessions: u32,
    pub drops: u32,
    pub publishes: u32,
    pub publish_failures: u32,
    /// Ticks whose inbound batch filled up, leaving messages for the next tick.
    pub full_batches: u32,
}

struct Settings {
    client_id: String,
    username: Option<String>,
    password: Option<String>,
    keep_alive_secs: u16,
    status_topic: Topic,
    subscriptions: heapless::Vec<Topic, MAX_SUBSCRIPTIONS>,
}

pub struct SessionManager<T: MqttTransport> {
    transport: T,
    state: SessionState,
    backoff: Backoff,
    next_attempt_ms: u64,
    settings: Settings,
    stats: SessionStats,
}

impl<T: MqttTransport> SessionManager<T> {
    /// `client_id` is resolved by the caller: `broker.client_id` from the
    /// document, or one derived from the device MAC.
    pub fn new(transport: T, config: &KernelConfig, router: &TopicRouter, client_id: &str) -> Self {
        let client_id = client_id.to_owned();

        let mut subscriptions = heapless::Vec::new();
        for id in config.outputs() {
            // One topic per channel, never more than the bank holds.
            let _ = subscriptions.push(router.output_set_topic(id));
        }

        Self {
            transport,
            state: SessionState::Disconnected,
            backoff: Backoff::new(
                INITIAL_BACKOFF_MS,
                u64::from(config.broker.reconnect_max_secs) * 1_000,
            ),
            next_attempt_ms: 0,
            settings: Settings {
                client_id,
                username: config.broker.username.clone(),
                password: config.broker.password.clone(),
                keep_alive_secs: config.broker.keep_alive_secs,
                status_topic: router.status_topic(),
                subscriptions,
            },
            stats: SessionStats::default(),
        }
    }

    /// Drain transport events, returning at most [`MAX_INBOUND_PER_TICK`]
    /// messages received while connected.
    pub fn poll_incoming(&mut self, now_ms: u64) -> InboundBatch {
        let mut batch = InboundBatch::new();
        while !batch.is_full() {
            let Some(event) = self.transport.poll_event() else {
                return batch;
            };
            match event {
                TransportEvent::Connected => match self.state {
                    SessionState::Connecting { .. } => self.announce(now_ms),
                    other => debug!("mqtt: ignoring CONNACK in {:?}", other),
                },
                TransportEvent::Disconnected => {
                    if self.state != SessionState::Disconnected {
                        self.on_lost(now_ms, TransportError::ConnectFailed);
                    }
                }
                TransportEvent::Message(msg) => {
                    if self.state == SessionState::Connected {
                        // Capacity checked by the loop condition.
                        let _ = batch.push(msg);
                    }
                }
            }
        }
        self.stats.full_batches += 1;
        batch
    }

    /// Reconnect step: start a connect when the backoff has elapsed and
    /// give up on one that has been pending too long.
    pub fn service(&mut self, now_ms: u64) {
        match self.state {
            SessionState::Disconnected if now_ms >= self.next_attempt_ms => self.begin_connect(now_ms),
            SessionState::Connecting { since_ms } if now_ms.saturating_sub(since_ms) >= CONNECT_TIMEOUT_MS => {
                self.on_lost(now_ms, TransportError::ConnectTimeout);
            }
            _ => {}
        }
    }

    /// Publish while connected.  A failed publish drops the session.
    pub fn publish(&mut self, now_ms: u64, topic: &str, payload: &[u8], retained: bool) -> Result<(), TransportError> {
        if self.state != SessionState::Connected {
            return Err(TransportError::NotConnected);
        }
        match self.transport.publish(topic, payload, retained) {
            Ok(()) => {
                self.stats.publishes += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.publish_failures += 1;
                self.on_failure(now_ms, e);
                Err(e)
            }
        }
    }

    /// Graceful teardown: retained `offline`, then a clean disconnect.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Connected {
            if let Err(e) = self
                .transport
                .publish(&self.settings.status_topic, STATUS_OFFLINE.as_bytes(), true)
            {
                warn!("mqtt: offline status not sent: {}", e);
            }
        }
        if self.state != SessionState::Disconnected {
            self.transport.disconnect();
        }
        self.state = SessionState::Disconnected;
        info!("mqtt: session closed");
    }

    fn begin_connect(&mut self, now_ms: u64) {
        self.stats.connect_attempts += 1;
        let s = &self.settings;
        let opts = ConnectOptions {
            client_id: &s.client_id,
            username: s.username.as_deref(),
            password: s.password.as_deref(),
            keep_alive_secs: s.keep_alive_secs,
            will: Will {
                topic: &s.status_topic,
                payload: STATUS_OFFLINE.as_bytes(),
                retained: true,
            },
        };
        match self.transport.connect(&opts) {
            Ok(()) => {
                info!("mqtt: connecting as '{}'", s.client_id);
                self.state = SessionState::Connecting { since_ms: now_ms };
            }
            Err(e) => self.on_lost(now_ms, e),
        }
    }

    fn announce(&mut self, now_ms: u64) {
        self.state = SessionState::Connected;
        let result = self
            .transport
            .publish(&self.settings.status_topic, STATUS_ONLINE.as_bytes(), true)
            .and_then(|()| {
                self.settings
                    .subscriptions
                    .iter()
                    .try_for_each(|t| self.transport.subscribe(t))
            });
        match result {
            Ok(()) => {
                self.stats.sessions += 1;
                self.backoff.reset();
                info!(
                    "mqtt: connected, {} output topic(s) subscribed",
                    self.settings.subscriptions.len()
                );
            }
            Err(e) => self.on_failure(now_ms, e),
        }
    }

    /// Publish or subscribe error on a session the broker may still
    /// consider live.
    fn on_failure(&mut self, now_ms: u64, err: TransportError) {
        if self.state == SessionState::Connected {
            if let Err(e) = self
                .transport
                .publish(&self.settings.status_topic, STATUS_OFFLINE.as_bytes(), true)
            {
                debug!("mqtt: offline status not sent ({}), leaving it to the will", e);
            }
        }
        self.on_lost(now_ms, err);
    }

    fn on_lost(&mut self, now_ms: u64, err: TransportError) {
        self.transport.abort();
        let delay = self.backoff.next_delay();
        self.next_attempt_ms = now_ms.saturating_add(delay);
        if self.state == SessionState::Connected {
            self.stats.drops += 1;
        }
        self.state = SessionState::Disconnected;
        warn!("mqtt: session lost ({}), retry in {} ms", err, delay);
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn status_topic(&self) -> &str {
        &self.settings.status_topic
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}
