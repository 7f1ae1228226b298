//! Inbound commands to the kernel.
//!
//! Produced by the [`TopicRouter`](crate::mqtt::topics::TopicRouter) from a
//! `<base>/output/<c>/set` message and consumed by the digital engine's
//! output state machine.

use crate::channel::ChannelId;

/// Request to drive one output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputCommand {
    pub channel: ChannelId,
    pub value: bool,
}
