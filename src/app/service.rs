//! Kernel service: the hexagonal core.
//!
//! [`Kernel`] owns the engines, the MQTT session and the channel bank,
//! and runs them in a fixed phase order once per tick.  Hardware and
//! broker are reached only through [`ChannelIo`] and [`MqttTransport`],
//! so the whole kernel runs on the host against mocks.
//!
//! ```text
//!  MqttTransport ──▶ ┌──────────────────────────────┐ ──▶ ChannelIo
//!                    │            Kernel            │
//!      TopicRouter ◀─│  Session · Digital · Analog  │
//!                    └──────────────────────────────┘
//! ```

use log::{debug, info, warn};

use crate::channel::ChannelIo;
use crate::config::KernelConfig;
use crate::engine::{AnalogEngine, DigitalEngine};
use crate::error::{ConfigError, TransportError};
use crate::mqtt::session::SessionManager;
use crate::mqtt::topics::TopicRouter;
use crate::scheduler::{Cooperative, Periodic};

use super::events::KernelEvent;
use super::ports::{EventSink, MqttTransport};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KernelStats {
    pub ticks: u64,
    pub commands_applied: u32,
    pub commands_rejected: u32,
    /// Events that could not be published (session down or publish failed).
    pub events_dropped: u32,
}

// ───────────────────────────────────────────────────────────────
// MQTT event sink
// ───────────────────────────────────────────────────────────────

/// Publishes engine events through the session, stamped with the tick time.
struct MqttSink<'a, T: MqttTransport> {
    router: &'a TopicRouter,
    session: &'a mut SessionManager<T>,
    now_ms: u64,
    dropped: u32,
}

impl<T: MqttTransport> EventSink for MqttSink<'_, T> {
    fn emit(&mut self, event: &KernelEvent) {
        if let KernelEvent::AnalogSample { channel, value, unit } = *event {
            debug!("analog {} = {:.3} {}", channel, value, unit);
        }
        let out = self.router.route_event(event);
        match self
            .session
            .publish(self.now_ms, &out.topic, out.payload.as_bytes(), out.retained)
        {
            Ok(()) => {}
            Err(TransportError::NotConnected) => {
                self.dropped += 1;
                debug!("offline, dropped {}", out.topic);
            }
            Err(e) => {
                self.dropped += 1;
                warn!("publish {} failed: {}", out.topic, e);
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Kernel
// ───────────────────────────────────────────────────────────────

pub struct Kernel<T: MqttTransport, IO: ChannelIo> {
    io: IO,
    router: TopicRouter,
    session: SessionManager<T>,
    digital: DigitalEngine,
    analog: AnalogEngine,
    /// `None` when the status heartbeat is disabled.
    status: Option<Periodic>,
    seen_sessions: u32,
    stats: KernelStats,
}

impl<T: MqttTransport, IO: ChannelIo> Kernel<T, IO> {
    pub fn new(config: &KernelConfig, io: IO, transport: T, client_id: &str) -> Result<Self, ConfigError> {
        let router = TopicRouter::new(&config.base_topic)?;
        let session = SessionManager::new(transport, config, &router, client_id);
        let status = match config.timing.status_interval_secs {
            0 => None,
            secs => Some(Periodic::new(u64::from(secs) * 1_000)),
        };
        info!(
            "kernel: base '{}', {} output(s), {} input(s), {} analog",
            router.base(),
            config.outputs().count(),
            config.inputs().count(),
            config.analog_channels().count()
        );
        Ok(Self {
            io,
            router,
            session,
            digital: DigitalEngine::new(config),
            analog: AnalogEngine::new(config),
            status,
            seen_sessions: 0,
            stats: KernelStats::default(),
        })
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// One pass of the kernel.  Never blocks on the network; bus time is
    /// at most one ADC conversion plus the digital reads, which
    /// configuration validation keeps inside the debounce window.
    pub fn tick(&mut self, now_ms: u64) {
        self.stats.ticks += 1;

        // 1. Drain transport events.
        let inbound = self.session.poll_incoming(now_ms);
        let sessions = self.session.stats().sessions;
        if sessions != self.seen_sessions {
            self.seen_sessions = sessions;
            self.on_new_session(now_ms);
        }

        let mut sink = MqttSink {
            router: &self.router,
            session: &mut self.session,
            now_ms,
            dropped: 0,
        };

        // 2. Route commands, in arrival order.
        for msg in &inbound {
            let result = self
                .router
                .parse_command(&msg.topic, &msg.payload)
                .and_then(|cmd| self.digital.apply_command(cmd, &mut self.io, &mut sink));
            match result {
                Ok(_) => self.stats.commands_applied += 1,
                Err(e) => {
                    self.stats.commands_rejected += 1;
                    warn!("discarding message on {}: {}", msg.topic, e);
                }
            }
        }

        // 3. Inputs.
        self.digital.scan_inputs(now_ms, &mut self.io, &mut sink);

        // 4. Analog.  Readings taken offline would never reach the broker.
        if sink.session.is_connected() {
            self.analog.poll(now_ms, &mut self.io, &mut sink);
        }

        self.stats.events_dropped += sink.dropped;

        // 5. Reconnect step.
        self.session.service(now_ms);

        // 6. Status heartbeat.
        self.refresh_status(now_ms);
    }

    /// The session just announced itself: restart the heartbeat interval
    /// from here and republish every analog reading.
    fn on_new_session(&mut self, now_ms: u64) {
        if let Some(timer) = self.status.as_mut() {
            timer.reset();
            timer.poll(now_ms);
        }
        self.analog.resync();
    }

    fn refresh_status(&mut self, now_ms: u64) {
        let Some(timer) = self.status.as_mut() else {
            return;
        };
        if self.session.is_connected() && timer.poll(now_ms) {
            let mut sink = MqttSink {
                router: &self.router,
                session: &mut self.session,
                now_ms,
                dropped: 0,
            };
            sink.emit(&KernelEvent::StatusOnline);
            self.stats.events_dropped += sink.dropped;
            debug!("status refreshed");
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Graceful stop: retained `offline`, then disconnect.  Output writes
    /// complete inside `tick`, so none can be in flight here.
    pub fn shutdown(&mut self) {
        self.session.shutdown();
        info!("kernel stopped after {} ticks", self.stats.ticks);
    }

    /// Hand back the channel bank and transport, e.g. to rebuild after a
    /// configuration reload.
    pub fn into_parts(self) -> (IO, T) {
        (self.io, self.session.into_transport())
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn session(&self) -> &SessionManager<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionManager<T> {
        &mut self.session
    }

    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    pub fn digital(&self) -> &DigitalEngine {
        &self.digital
    }

    pub fn analog(&self) -> &AnalogEngine {
        &self.analog
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    pub fn stats(&self) -> KernelStats {
        self.stats
    }
}

impl<T: MqttTransport, IO: ChannelIo> Cooperative for Kernel<T, IO> {
    fn tick(&mut self, now_ms: u64) {
        Kernel::tick(self, now_ms);
    }
}
