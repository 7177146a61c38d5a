use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EnvError, Result};

pub const TICKS_PER_SECOND: f64 = 100.0;

/// Convert seconds of game time to whole ticks, rejecting anything that
/// would move the clock backwards or past what a tick counter can hold.
pub fn seconds_to_ticks(seconds: f64) -> Result<u64> {
    let ticks = (seconds * TICKS_PER_SECOND).round();
    if !seconds.is_finite() || seconds < 0.0 || ticks >= u64::MAX as f64 {
        return Err(EnvError::InvalidTimeAdvance(seconds));
    }
    Ok(ticks as u64)
}

// =============================================================================
// Loops and Deferred Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalLoop {
    pub routine: String,
    /// Ticks between iterations. Always at least 1.
    pub period: u64,
}

impl IntervalLoop {
    pub fn new(routine: impl Into<String>, period: u64) -> Result<Self> {
        let routine = routine.into();
        if period == 0 {
            return Err(EnvError::Config(format!("loop `{routine}` has period 0")));
        }
        Ok(Self { routine, period })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredEvent {
    pub routine: String,
    pub due: u64,
}

/// Executes the script side of the schedule.
pub trait LoopRunner {
    /// Run `routine` exactly `iterations` times in one batch.
    fn run_loop(&mut self, routine: &str, iterations: u64) -> Result<()>;

    fn run_deferred(&mut self, routine: &str) -> Result<()>;
}

// =============================================================================
// Virtual Clock
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualClock {
    pub now: u64,
    /// Iterations executed per loop, parallel to the scheduler's loop list.
    pub executed: Vec<u64>,
    pub pending: Option<DeferredEvent>,
}

#[derive(Debug, Clone)]
pub struct VirtualClockScheduler {
    loops: Vec<IntervalLoop>,
    clock: VirtualClock,
}

impl VirtualClockScheduler {
    pub fn new(loops: Vec<IntervalLoop>) -> Self {
        let clock = VirtualClock {
            executed: vec![0; loops.len()],
            ..Default::default()
        };
        Self { loops, clock }
    }

    pub fn loops(&self) -> &[IntervalLoop] {
        &self.loops
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    pub fn now(&self) -> u64 {
        self.clock.now
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.clock.now as f64 / TICKS_PER_SECOND
    }

    pub fn executed(&self, routine: &str) -> Option<u64> {
        self.loops
            .iter()
            .position(|l| l.routine == routine)
            .map(|i| self.clock.executed[i])
    }

    pub fn pending(&self) -> Option<&DeferredEvent> {
        self.clock.pending.as_ref()
    }

    pub fn reset(&mut self) {
        self.clock = VirtualClock {
            executed: vec![0; self.loops.len()],
            ..Default::default()
        };
    }

    /// Replace the clock with one taken from a saved state.
    pub fn restore(&mut self, clock: VirtualClock) -> Result<()> {
        if clock.executed.len() != self.loops.len() {
            return Err(EnvError::Snapshot(format!(
                "clock tracks {} loops, scheduler has {}",
                clock.executed.len(),
                self.loops.len()
            )));
        }
        for (l, &count) in self.loops.iter().zip(&clock.executed) {
            if count.checked_mul(l.period).map_or(true, |covered| covered > clock.now) {
                return Err(EnvError::Snapshot(format!(
                    "loop `{}` ran {count} times by tick {}",
                    l.routine, clock.now
                )));
            }
        }
        self.clock = clock;
        Ok(())
    }

    /// Queue `routine` to run once `delay` ticks from now.
    pub fn schedule(&mut self, routine: &str, delay: u64) -> Result<()> {
        if let Some(p) = &self.clock.pending {
            return Err(EnvError::DeferredEventPending {
                pending: p.routine.clone(),
                requested: routine.to_string(),
            });
        }
        self.clock.pending = Some(DeferredEvent {
            routine: routine.to_string(),
            due: self.clock.now.saturating_add(delay),
        });
        Ok(())
    }

    /// Move the clock forward `ticks` and run every loop iteration that came
    /// due, then the pending event if its time has come.
    pub fn advance<R: LoopRunner + ?Sized>(&mut self, ticks: u64, runner: &mut R) -> Result<()> {
        let target = self
            .clock
            .now
            .checked_add(ticks)
            .ok_or(EnvError::InvalidTimeAdvance(ticks as f64 / TICKS_PER_SECOND))?;
        for (l, executed) in self.loops.iter().zip(self.clock.executed.iter_mut()) {
            let covered = *executed * l.period;
            let iterations = (target - covered) / l.period;
            if iterations > 0 {
                debug!(routine = %l.routine, iterations, "catching up loop");
                runner.run_loop(&l.routine, iterations)?;
                *executed += iterations;
            }
        }
        self.clock.now = target;

        if let Some(event) = self.clock.pending.take_if(|e| e.due <= target) {
            debug!(routine = %event.routine, due = event.due, "deferred event fired");
            runner.run_deferred(&event.routine)?;
        }
        Ok(())
    }
}
