//! Tick-period smoothing and clock-health tracking.
//!
//! The EMA runs on the control loop (the queue consumer), never in the
//! MIDI callback. The watch is the only Mutex in the crate and is touched
//! by the callback thread and the status line only — nowhere near audio.

use std::time::{Duration, Instant};

/// Tick period at 120 BPM, the starting estimate
pub const DEFAULT_TICK_PERIOD_US: u32 = 20_833;

/// Periods outside this window are jitter or dropouts; ignore them
const MIN_TICK_PERIOD_US: u32 = 10_000;
const MAX_TICK_PERIOD_US: u32 = 50_000;

/// No clock activity for this long means the source is gone
const CLOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Exponential moving average of the clock tick period (9:1 smoothing).
///
/// A single out-of-range period (USB stall, dropped tick) moves the
/// estimate not at all; steady tempo changes track within a beat or two.
#[derive(Debug)]
pub struct TickEma {
    avg_period_us: u32,
    last_tick_micros: Option<u64>,
}

impl TickEma {
    pub fn new() -> Self {
        Self {
            avg_period_us: DEFAULT_TICK_PERIOD_US,
            last_tick_micros: None,
        }
    }

    /// Fold in one tick timestamp (monotonic microseconds). Returns the
    /// updated average when a valid period was measured.
    pub fn update(&mut self, tick_micros: u64) -> Option<u32> {
        let result = match self.last_tick_micros {
            Some(last) if tick_micros > last => {
                let period = (tick_micros - last) as u32;
                if (MIN_TICK_PERIOD_US..=MAX_TICK_PERIOD_US).contains(&period) {
                    self.avg_period_us = (self.avg_period_us * 9 + period) / 10;
                    Some(self.avg_period_us)
                } else {
                    None
                }
            }
            _ => None,
        };

        self.last_tick_micros = Some(tick_micros);
        result
    }

    #[allow(dead_code)]
    pub fn average_us(&self) -> u32 {
        self.avg_period_us
    }

    /// Forget the last timestamp so the next tick measures no period.
    /// Called on START; the tempo estimate itself survives.
    pub fn reset_phase(&mut self) {
        self.last_tick_micros = None;
    }
}

impl Default for TickEma {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock source states, for the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    /// No clock activity
    Stopped,
    /// Received Start, waiting for the first tick
    WaitingForClock,
    /// Actively receiving ticks
    Running,
}

/// Sync status derived from the watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    NoDevice,
    NoClockDetected,
    Synced,
}

/// Clock-health bookkeeping shared between the MIDI callback thread and
/// the status line.
#[derive(Debug)]
pub struct ClockWatch {
    state: ClockState,
    last_activity: Instant,
}

impl ClockWatch {
    pub fn new() -> Self {
        Self {
            state: ClockState::Stopped,
            last_activity: Instant::now(),
        }
    }

    pub fn mark_start(&mut self) {
        self.state = ClockState::WaitingForClock;
        self.last_activity = Instant::now();
    }

    pub fn mark_stop(&mut self) {
        self.state = ClockState::Stopped;
        self.last_activity = Instant::now();
    }

    pub fn mark_tick(&mut self) {
        self.state = ClockState::Running;
        self.last_activity = Instant::now();
    }

    #[allow(dead_code)]
    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_timed_out(&self) -> bool {
        self.state != ClockState::Stopped && self.last_activity.elapsed() > CLOCK_TIMEOUT
    }

    pub fn status(&self) -> SyncStatus {
        if self.is_timed_out() {
            SyncStatus::NoClockDetected
        } else if self.state == ClockState::Running {
            SyncStatus::Synced
        } else {
            SyncStatus::NoClockDetected
        }
    }
}

impl Default for ClockWatch {
    fn default() -> Self {
        Self::new()
    }
}
