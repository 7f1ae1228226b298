//! Digital I/O engine.
//!
//! One [`DigitalSlot`] per channel, held in a fixed arena indexed by
//! channel id.  Analog channels occupy an `Unused` slot.
//!
//! ```text
//! Input:   Unprimed ─▶ Idle ─▶ Debouncing{candidate, since}
//!                       ▲              │ held ≥ debounce → Confirmed (publish)
//!                       └──────────────┘ reverted        → Bounced
//!
//! Output:  Idle ─▶ CommandReceived ─▶ Applying ─▶ Confirmed (ack) ─▶ Idle
//!                                             └─▶ Failed (no ack) ─▶ Idle
//! ```

use log::{debug, info, warn};

use crate::app::commands::OutputCommand;
use crate::app::events::KernelEvent;
use crate::app::ports::EventSink;
use crate::channel::{ChannelId, ChannelIo, CHANNEL_COUNT};
use crate::config::KernelConfig;
use crate::error::{HardwareError, ProtocolError};

// ---------------------------------------------------------------------------
// Input state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    /// No successful read yet.
    Unprimed,
    Idle,
    Debouncing { candidate: bool, since_ms: u64 },
}

/// What one scan did to an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStep {
    Primed(bool),
    Steady,
    CandidateSeen(bool),
    Confirmed(bool),
    Bounced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot {
    pub state: InputState,
    pub last_physical_value: Option<bool>,
    pub last_published_value: Option<bool>,
}

impl InputSlot {
    const fn new() -> Self {
        Self {
            state: InputState::Unprimed,
            last_physical_value: None,
            last_published_value: None,
        }
    }

    /// Feed one raw reading taken at `now_ms`.
    fn step(&mut self, raw: bool, now_ms: u64, debounce_ms: u64) -> InputStep {
        let stable = match self.last_physical_value {
            Some(v) => v,
            None => {
                self.last_physical_value = Some(raw);
                self.state = InputState::Idle;
                return InputStep::Primed(raw);
            }
        };

        match self.state {
            InputState::Unprimed | InputState::Idle => {
                if raw == stable {
                    InputStep::Steady
                } else {
                    self.state = InputState::Debouncing { candidate: raw, since_ms: now_ms };
                    InputStep::CandidateSeen(raw)
                }
            }
            InputState::Debouncing { candidate, since_ms } => {
                if raw != candidate {
                    self.state = InputState::Idle;
                    InputStep::Bounced
                } else if now_ms.saturating_sub(since_ms) >= debounce_ms {
                    self.last_physical_value = Some(candidate);
                    self.last_published_value = Some(candidate);
                    self.state = InputState::Idle;
                    InputStep::Confirmed(candidate)
                } else {
                    InputStep::Steady
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Output state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Idle,
    CommandReceived { value: bool },
    Applying { value: bool },
}

/// Terminal result of the most recent command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputOutcome {
    Confirmed(bool),
    Failed(HardwareError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSlot {
    pub state: OutputState,
    pub last_physical_value: Option<bool>,
    pub last_published_value: Option<bool>,
    pub last_outcome: Option<OutputOutcome>,
}

impl OutputSlot {
    const fn new() -> Self {
        Self {
            state: OutputState::Idle,
            last_physical_value: None,
            last_published_value: None,
            last_outcome: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitalSlot {
    Input(InputSlot),
    Output(OutputSlot),
    Unused,
}

pub struct DigitalEngine {
    slots: [DigitalSlot; CHANNEL_COUNT],
    debounce_ms: u64,
}

impl DigitalEngine {
    pub fn new(config: &KernelConfig) -> Self {
        let slots = core::array::from_fn(|i| {
            let c = &config.channels[i];
            if c.is_digital_input() {
                DigitalSlot::Input(InputSlot::new())
            } else if c.is_digital_output() {
                DigitalSlot::Output(OutputSlot::new())
            } else {
                DigitalSlot::Unused
            }
        });
        Self {
            slots,
            debounce_ms: u64::from(config.timing.debounce_ms),
        }
    }

    pub fn slot(&self, id: ChannelId) -> &DigitalSlot {
        &self.slots[id.index()]
    }

    /// Stage a command on its output.  The slot holds it in
    /// `CommandReceived` until [`apply`](Self::apply) attempts the write;
    /// a second command staged before then replaces the value.
    pub fn accept(&mut self, cmd: OutputCommand) -> Result<(), ProtocolError> {
        let DigitalSlot::Output(slot) = &mut self.slots[cmd.channel.index()] else {
            return Err(ProtocolError::NotAnOutput(cmd.channel.get()));
        };
        slot.state = OutputState::CommandReceived { value: cmd.value };
        Ok(())
    }

    /// Drive the value staged on `channel` and acknowledge it.  `None`
    /// when nothing is staged there.
    ///
    /// The slot is `Idle` again on return.  A hardware failure is logged
    /// and produces no ack; it is not an error for the caller.
    pub fn apply(
        &mut self,
        channel: ChannelId,
        io: &mut impl ChannelIo,
        sink: &mut impl EventSink,
    ) -> Option<OutputOutcome> {
        let DigitalSlot::Output(slot) = &mut self.slots[channel.index()] else {
            return None;
        };
        let OutputState::CommandReceived { value } = slot.state else {
            return None;
        };
        let cmd = OutputCommand { channel, value };
        slot.state = OutputState::Applying { value };

        let outcome = match io.write(cmd.channel, cmd.value) {
            Ok(()) => {
                slot.last_physical_value = Some(cmd.value);
                slot.last_published_value = Some(cmd.value);
                sink.emit(&KernelEvent::OutputConfirmed {
                    channel: cmd.channel,
                    value: cmd.value,
                });
                debug!("output {} <- {}", cmd.channel, u8::from(cmd.value));
                OutputOutcome::Confirmed(cmd.value)
            }
            Err(e) => {
                warn!("output {}: write failed: {}", cmd.channel, e);
                OutputOutcome::Failed(e)
            }
        };

        slot.last_outcome = Some(outcome);
        slot.state = OutputState::Idle;
        Some(outcome)
    }

    /// [`accept`](Self::accept) then [`apply`](Self::apply): one command
    /// runs to completion.
    pub fn apply_command(
        &mut self,
        cmd: OutputCommand,
        io: &mut impl ChannelIo,
        sink: &mut impl EventSink,
    ) -> Result<OutputOutcome, ProtocolError> {
        self.accept(cmd)?;
        self.apply(cmd.channel, io, sink)
            .ok_or(ProtocolError::NotAnOutput(cmd.channel.get()))
    }

    /// Read every digital input once and advance its debouncer.
    pub fn scan_inputs(&mut self, now_ms: u64, io: &mut impl ChannelIo, sink: &mut impl EventSink) {
        for id in ChannelId::all() {
            let DigitalSlot::Input(slot) = &mut self.slots[id.index()] else {
                continue;
            };
            let raw = match io.read(id) {
                Ok(v) => match v.as_digital() {
                    Some(b) => b,
                    None => continue,
                },
                Err(e) => {
                    debug!("input {}: read skipped: {}", id, e);
                    continue;
                }
            };
            match slot.step(raw, now_ms, self.debounce_ms) {
                InputStep::Confirmed(value) => {
                    info!("input {} -> {}", id, u8::from(value));
                    sink.emit(&KernelEvent::InputChanged { channel: id, value });
                }
                InputStep::Primed(value) => debug!("input {} primed at {}", id, u8::from(value)),
                InputStep::Bounced => debug!("input {} bounced", id),
                InputStep::Steady | InputStep::CandidateSeen(_) => {}
            }
        }
    }
}
