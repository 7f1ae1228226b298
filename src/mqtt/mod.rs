//! MQTT side of the kernel: topic mapping, session lifecycle, and the
//! bounded hand-off queue used by threaded clients.

pub mod queue;
pub mod session;
pub mod topics;

/// Base topic (64) plus the longest suffix, `/output/<c>/state`.
pub const MAX_TOPIC_LEN: usize = 96;
/// Inbound payloads are command tokens; anything longer is refused.
pub const MAX_PAYLOAD_LEN: usize = 32;

pub type Topic = heapless::String<MAX_TOPIC_LEN>;

/// A message received from the broker, copied out of the client's buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: Topic,
    pub payload: heapless::Vec<u8, MAX_PAYLOAD_LEN>,
}

impl InboundMessage {
    /// `None` when the topic or payload exceeds the fixed buffers.
    pub fn new(topic: &str, payload: &[u8]) -> Option<Self> {
        let mut t = Topic::new();
        t.push_str(topic).ok()?;
        let payload = heapless::Vec::from_slice(payload).ok()?;
        Some(Self { topic: t, payload })
    }
}
