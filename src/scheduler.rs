//! Cooperative loop pacing.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  main loop                                                   │
//! │                                                              │
//! │   Scheduler::cycle ──▶ now = Clock::now_ms()                 │
//! │          │                                                   │
//! │          ▼                                                   │
//! │   Cooperative::tick(now)                                     │
//! │     1. poll incoming   4. sample analog (Periodic)           │
//! │     2. route commands  5. session service                    │
//! │     3. scan inputs     6. status heartbeat (Periodic)        │
//! │          │                                                   │
//! │          ▼                                                   │
//! │   CycleReport { elapsed, sleep } ──▶ FreeRtos::delay_ms      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The scheduler owns no work of its own.  It timestamps a cycle, runs
//! one tick, and tells the caller how long to sleep to hold the period.

use log::warn;

use crate::app::ports::Clock;

pub const DEFAULT_PERIOD_MS: u64 = 10;

// ═══════════════════════════════════════════════════════════════
//  Interval timer
// ═══════════════════════════════════════════════════════════════

/// Fires on the first poll, then every `interval_ms`.
///
/// A poll that comes late fires once and re-arms from the current time;
/// missed intervals are not replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Periodic {
    interval_ms: u64,
    next_due_ms: Option<u64>,
}

impl Periodic {
    pub const fn new(interval_ms: u64) -> Self {
        Self { interval_ms, next_due_ms: None }
    }

    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.next_due_ms {
            Some(due) if now_ms < due => false,
            Some(due) => {
                let next = due.saturating_add(self.interval_ms);
                self.next_due_ms = Some(if next <= now_ms {
                    now_ms.saturating_add(self.interval_ms)
                } else {
                    next
                });
                true
            }
            None => {
                self.next_due_ms = Some(now_ms.saturating_add(self.interval_ms));
                true
            }
        }
    }

    /// Make the next poll fire immediately.
    pub fn reset(&mut self) {
        self.next_due_ms = None;
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

/// Something that does one bounded slice of work per call.
pub trait Cooperative {
    fn tick(&mut self, now_ms: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub started_ms: u64,
    pub elapsed_ms: u64,
    /// Time left in the period; zero after an overrun.
    pub sleep_ms: u64,
}

pub struct Scheduler<C: Clock> {
    clock: C,
    period_ms: u64,
    cycles: u64,
    overruns: u32,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C) -> Self {
        Self::with_period(clock, DEFAULT_PERIOD_MS)
    }

    pub fn with_period(clock: C, period_ms: u64) -> Self {
        Self {
            clock,
            period_ms: period_ms.max(1),
            cycles: 0,
            overruns: 0,
        }
    }

    pub fn cycle(&mut self, task: &mut impl Cooperative) -> CycleReport {
        let started_ms = self.clock.now_ms();
        task.tick(started_ms);
        let elapsed_ms = self.clock.now_ms().saturating_sub(started_ms);

        self.cycles += 1;
        let sleep_ms = if elapsed_ms >= self.period_ms {
            self.overruns = self.overruns.saturating_add(1);
            warn!(
                "scheduler: cycle {} took {} ms (period {} ms)",
                self.cycles, elapsed_ms, self.period_ms
            );
            0
        } else {
            self.period_ms - elapsed_ms
        };

        CycleReport { started_ms, elapsed_ms, sleep_ms }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
