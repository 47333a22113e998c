//! TimeKeeper: the single source of timing truth bridging the external beat
//! clock (24 PPQN) and the audio sample timeline (44.1 kHz).
//!
//! The audio callback owns the sample counter; the control loop owns the
//! beat/tick counters and tempo, synced from clock ticks. Everything is a
//! per-word atomic so either side can read without locks. Counters use
//! relaxed ordering; the transport word and the beat flag use
//! acquire/release because their observation gates dependent reads.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::types::{TransportState, BEATS_PER_BAR, BLOCK_SAMPLES, PPQN, SAMPLE_RATE};

/// Default tempo when no clock has been seen yet
pub const DEFAULT_BPM: u32 = 120;

/// 22,050 samples per beat at 120 BPM
pub const DEFAULT_SAMPLES_PER_BEAT: u32 = SAMPLE_RATE * 60 / DEFAULT_BPM;

/// Accepted samples-per-beat range (~30-330 BPM). Syncs outside it are
/// rejected and the last known tempo kept.
pub const MIN_SAMPLES_PER_BEAT: u32 = 8_000;
pub const MAX_SAMPLES_PER_BEAT: u32 = 100_000;

/// Samples past a boundary still treated as "on time". Prevents a press
/// landing a hair after the boundary from waiting a full grid period.
pub const ON_TIME_TOLERANCE: u64 = 16;

pub struct TimeKeeper {
    /// Monotonic stereo-frame count since reset (audio side writes)
    sample_position: AtomicU64,

    /// Current beat number, 0-based (control side writes)
    beat_number: AtomicU32,

    /// Tick within the current beat, 0..24 (control side writes)
    tick_in_beat: AtomicU32,

    /// Samples in one beat at the current tempo (control side writes)
    samples_per_beat: AtomicU32,

    /// Transport state word
    transport: AtomicU8,

    /// Latched "a beat boundary was crossed" flag
    beat_flag: AtomicBool,
}

impl TimeKeeper {
    pub fn new() -> Self {
        Self {
            sample_position: AtomicU64::new(0),
            beat_number: AtomicU32::new(0),
            tick_in_beat: AtomicU32::new(0),
            samples_per_beat: AtomicU32::new(DEFAULT_SAMPLES_PER_BEAT),
            transport: AtomicU8::new(TransportState::Stopped as u8),
            beat_flag: AtomicBool::new(false),
        }
    }

    /// Zero the timeline and restore defaults. Called on clock START.
    pub fn reset(&self) {
        self.sample_position.store(0, Ordering::Relaxed);
        self.beat_number.store(0, Ordering::Relaxed);
        self.tick_in_beat.store(0, Ordering::Relaxed);
        self.samples_per_beat.store(DEFAULT_SAMPLES_PER_BEAT, Ordering::Relaxed);
        self.transport.store(TransportState::Stopped as u8, Ordering::Release);
        self.beat_flag.store(false, Ordering::Release);
    }

    // ---- audio timeline (audio side only) ----

    /// Advance the sample counter by one block's worth of frames
    pub fn increment_samples(&self, num_samples: u32) {
        self.sample_position.fetch_add(num_samples as u64, Ordering::Relaxed);
    }

    pub fn sample_position(&self) -> u64 {
        self.sample_position.load(Ordering::Relaxed)
    }

    // ---- beat timeline (control side only) ----

    /// Recalibrate tempo from the smoothed clock tick period.
    ///
    /// `samples_per_beat = tick_period_us * PPQN * SAMPLE_RATE / 1e6`
    /// (at 120 BPM: 20,833 us * 24 * 44,100 / 1e6 = 22,049.6 -> 22,049).
    /// Returns false and leaves state unchanged for out-of-range tempos.
    pub fn sync_to_external_clock(&self, tick_period_us: u32) -> bool {
        let beat_period_us = tick_period_us as u64 * PPQN as u64;
        let spb = (beat_period_us * SAMPLE_RATE as u64 / 1_000_000) as u32;

        if !(MIN_SAMPLES_PER_BEAT..=MAX_SAMPLES_PER_BEAT).contains(&spb) {
            return false;
        }

        self.samples_per_beat.store(spb, Ordering::Relaxed);
        true
    }

    /// Manual tempo override (tests, running without a clock)
    #[allow(dead_code)]
    pub fn set_samples_per_beat(&self, spb: u32) {
        self.samples_per_beat.store(spb, Ordering::Relaxed);
    }

    /// Count one clock tick. Rolls the beat counter and sets the beat flag
    /// every PPQN ticks.
    pub fn increment_tick(&self) {
        let mut tick = self.tick_in_beat.load(Ordering::Relaxed) + 1;

        if tick >= PPQN {
            tick = 0;
            self.beat_number.fetch_add(1, Ordering::Relaxed);
            self.beat_flag.store(true, Ordering::Release);
        }

        self.tick_in_beat.store(tick, Ordering::Relaxed);
    }

    // ---- transport ----

    pub fn set_transport(&self, state: TransportState) {
        self.transport.store(state as u8, Ordering::Release);
    }

    pub fn transport(&self) -> TransportState {
        TransportState::from_u8(self.transport.load(Ordering::Acquire))
    }

    #[allow(dead_code)]
    pub fn is_running(&self) -> bool {
        matches!(self.transport(), TransportState::Playing | TransportState::Recording)
    }

    /// Test-and-clear the beat flag. The flag stays set until consumed, so
    /// every beat is delivered at least once; consecutive beats between
    /// polls collapse into one.
    pub fn poll_beat_flag(&self) -> bool {
        self.beat_flag.swap(false, Ordering::AcqRel)
    }

    // ---- queries ----

    pub fn beat_number(&self) -> u32 {
        self.beat_number.load(Ordering::Relaxed)
    }

    pub fn bar_number(&self) -> u32 {
        self.beat_number() / BEATS_PER_BAR
    }

    pub fn beat_in_bar(&self) -> u32 {
        self.beat_number() % BEATS_PER_BAR
    }

    pub fn tick_in_beat(&self) -> u32 {
        self.tick_in_beat.load(Ordering::Relaxed)
    }

    pub fn samples_per_beat(&self) -> u32 {
        self.samples_per_beat.load(Ordering::Relaxed)
    }

    pub fn bpm(&self) -> f32 {
        let spb = self.samples_per_beat();
        if spb == 0 {
            return 0.0;
        }
        (SAMPLE_RATE * 60) as f32 / spb as f32
    }

    // ---- quantization ----

    /// Samples until the next beat boundary, by position within the beat.
    ///
    /// Relative arithmetic (position modulo samples-per-beat) so tempo
    /// changes never skip or double a boundary. Within ON_TIME_TOLERANCE
    /// past a boundary the answer is 0: fire now.
    #[allow(dead_code)]
    pub fn samples_to_next_beat(&self) -> u32 {
        let spb = self.samples_per_beat() as u64;
        let within_beat = self.sample_position() % spb;

        if within_beat <= ON_TIME_TOLERANCE {
            return 0;
        }

        (spb - within_beat) as u32
    }

    /// Samples until the next subdivision boundary.
    ///
    /// Tick-derived, not sample-modulo: the beat grid advances with the
    /// external clock, so position within the beat is reconstructed as
    /// `tick_in_beat * (spb / PPQN)`. The sample counter and the beat
    /// counter advance independently; deriving from ticks keeps scheduled
    /// events glued to the external grid. Exactly on a boundary (within
    /// the on-time tolerance) the answer is 0.
    pub fn samples_to_next_subdivision(&self, subdivision: u32) -> u32 {
        let spb = self.samples_per_beat();
        let samples_per_tick = spb / PPQN;
        let elapsed = self.tick_in_beat() * samples_per_tick;

        // A full beat or coarser: distance to the beat boundary
        if subdivision >= spb {
            if elapsed as u64 <= ON_TIME_TOLERANCE {
                return 0;
            }
            return spb - elapsed;
        }

        let into_subdivision = elapsed % subdivision;
        if into_subdivision as u64 <= ON_TIME_TOLERANCE {
            return 0;
        }

        // Next multiple of the subdivision, clamped to the beat boundary
        let next = ((elapsed / subdivision) + 1) * subdivision;
        next.min(spb) - elapsed
    }

    /// Samples until the next bar boundary (position modulo samples-per-bar)
    #[allow(dead_code)]
    pub fn samples_to_next_bar(&self) -> u32 {
        let samples_per_bar = self.samples_per_beat() as u64 * BEATS_PER_BAR as u64;
        let within_bar = self.sample_position() % samples_per_bar;

        if within_bar <= ON_TIME_TOLERANCE {
            return 0;
        }

        (samples_per_bar - within_bar) as u32
    }

    /// Sample position where a given beat starts
    #[allow(dead_code)]
    pub fn beat_to_sample(&self, beat: u32) -> u64 {
        beat as u64 * self.samples_per_beat() as u64
    }

    /// Sample position where a given bar starts
    #[allow(dead_code)]
    pub fn bar_to_sample(&self, bar: u32) -> u64 {
        bar as u64 * BEATS_PER_BAR as u64 * self.samples_per_beat() as u64
    }

    /// Beat number containing a sample position (truncating)
    #[allow(dead_code)]
    pub fn sample_to_beat(&self, sample: u64) -> u32 {
        let spb = self.samples_per_beat() as u64;
        if spb == 0 {
            return 0;
        }
        (sample / spb) as u32
    }

    /// Whether the current position sits within one block of the current
    /// beat's boundary
    #[allow(dead_code)]
    pub fn is_on_beat_boundary(&self) -> bool {
        let beat_sample = self.beat_to_sample(self.beat_number());
        let position = self.sample_position();

        position >= beat_sample && position - beat_sample <= BLOCK_SAMPLES as u64
    }

    /// Beat boundary check that also requires the downbeat of the bar
    #[allow(dead_code)]
    pub fn is_on_bar_boundary(&self) -> bool {
        self.beat_in_bar() == 0 && self.is_on_beat_boundary()
    }
}

impl Default for TimeKeeper {
    fn default() -> Self {
        Self::new()
    }
}
