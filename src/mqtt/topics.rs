//! Topic router: pure mapping between kernel events/commands and the
//! wire protocol.
//!
//! | Purpose        | Topic                        | Payload                         |
//! |----------------|------------------------------|---------------------------------|
//! | Liveness       | `<base>/status`              | `online` / `offline` (retained) |
//! | Input report   | `<base>/input/<c>`           | `1` / `0`                       |
//! | Output command | `<base>/output/<c>/set`      | `0` `1` `true` `false`, any case|
//! | Output ack     | `<base>/output/<c>/state`    | `1` / `0`                       |
//! | Analog reading | `<base>/analog/<c>`          | decimal, e.g. `3.142`           |
//!
//! The router holds nothing but the base topic and never touches a
//! channel: it turns inbound messages into [`OutputCommand`]s and
//! outbound [`KernelEvent`]s into publishes.

use core::fmt::Write;

use crate::app::commands::OutputCommand;
use crate::app::events::KernelEvent;
use crate::channel::ChannelId;
use crate::config::MAX_BASE_TOPIC_LEN;
use crate::error::{ConfigError, ProtocolError};

use super::Topic;

pub const STATUS_ONLINE: &str = "online";
pub const STATUS_OFFLINE: &str = "offline";

/// Enough for any `f32` printed with three decimals in the ranges used.
pub type Payload = heapless::String<24>;

/// A publish ready for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub topic: Topic,
    pub payload: Payload,
    pub retained: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRouter {
    base: heapless::String<MAX_BASE_TOPIC_LEN>,
}

impl TopicRouter {
    pub fn new(base: &str) -> Result<Self, ConfigError> {
        let mut b = heapless::String::new();
        b.push_str(base).map_err(|_| ConfigError::InvalidField("mqtt.base_topic"))?;
        Ok(Self { base: b })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    // ── Outbound topics ───────────────────────────────────────

    pub fn status_topic(&self) -> Topic {
        self.topic(format_args!("/status"))
    }

    pub fn input_topic(&self, channel: ChannelId) -> Topic {
        self.topic(format_args!("/input/{}", channel))
    }

    pub fn output_state_topic(&self, channel: ChannelId) -> Topic {
        self.topic(format_args!("/output/{}/state", channel))
    }

    pub fn output_set_topic(&self, channel: ChannelId) -> Topic {
        self.topic(format_args!("/output/{}/set", channel))
    }

    pub fn analog_topic(&self, channel: ChannelId) -> Topic {
        self.topic(format_args!("/analog/{}", channel))
    }

    fn topic(&self, suffix: core::fmt::Arguments<'_>) -> Topic {
        let mut t = Topic::new();
        // Base is capped at 64 bytes, so the longest suffix always fits.
        let _ = write!(t, "{}{}", self.base, suffix);
        t
    }

    /// Map an engine event onto its publish.
    pub fn route_event(&self, event: &KernelEvent) -> Outbound {
        match *event {
            KernelEvent::InputChanged { channel, value } => Outbound {
                topic: self.input_topic(channel),
                payload: encode_digital(value),
                retained: false,
            },
            KernelEvent::OutputConfirmed { channel, value } => Outbound {
                topic: self.output_state_topic(channel),
                payload: encode_digital(value),
                retained: false,
            },
            KernelEvent::AnalogSample { channel, value, .. } => Outbound {
                topic: self.analog_topic(channel),
                payload: encode_analog(value),
                retained: false,
            },
            KernelEvent::StatusOnline => Outbound {
                topic: self.status_topic(),
                payload: literal(STATUS_ONLINE),
                retained: true,
            },
        }
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Parse `<base>/output/<c>/set` with a boolean token payload.
    pub fn parse_command(&self, topic: &str, payload: &[u8]) -> Result<OutputCommand, ProtocolError> {
        let rest = topic
            .strip_prefix(self.base.as_str())
            .and_then(|r| r.strip_prefix("/output/"))
            .ok_or(ProtocolError::UnknownTopic)?;
        let (index, leaf) = rest.split_once('/').ok_or(ProtocolError::UnknownTopic)?;
        if leaf != "set" {
            return Err(ProtocolError::UnknownTopic);
        }
        let channel = parse_channel(index)?;
        let value = parse_bool_payload(payload)?;
        Ok(OutputCommand { channel, value })
    }
}

/// Decimal channel index without sign or leading zeros.
fn parse_channel(s: &str) -> Result<ChannelId, ProtocolError> {
    let canonical = !s.is_empty()
        && s.len() <= 3
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'));
    if !canonical {
        return Err(ProtocolError::BadChannel);
    }
    s.parse::<u8>()
        .ok()
        .and_then(ChannelId::new)
        .ok_or(ProtocolError::BadChannel)
}

/// Accepts exactly `0`, `1`, `true`, `false`, ignoring ASCII case.
pub fn parse_bool_payload(payload: &[u8]) -> Result<bool, ProtocolError> {
    match payload {
        b"1" => Ok(true),
        b"0" => Ok(false),
        p if p.eq_ignore_ascii_case(b"true") => Ok(true),
        p if p.eq_ignore_ascii_case(b"false") => Ok(false),
        _ => Err(ProtocolError::BadPayload),
    }
}

pub fn encode_digital(value: bool) -> Payload {
    literal(if value { "1" } else { "0" })
}

pub fn encode_analog(value: f32) -> Payload {
    let mut p = Payload::new();
    if write!(p, "{:.3}", value).is_err() {
        // Only reachable for magnitudes far outside every measurement range.
        p.clear();
        let _ = p.push_str("nan");
    }
    p
}

fn literal(s: &str) -> Payload {
    let mut p = Payload::new();
    let _ = p.push_str(s);
    p
}
