//! Choke: an instant mute with a short crossfade.
//!
//! Engaged means muted. The gain ramps linearly toward the target over
//! roughly `fade_ms` so the cut never clicks.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use crate::audio::{scale_sample, ScheduledSample};
use crate::types::{ScheduleMode, SAMPLE_RATE};

/// Crossfade length. 3 ms keeps the choke tight enough for quantized use.
pub const DEFAULT_FADE_MS: f32 = 3.0;

/// State shared between the choke engine (audio side) and its controller.
#[derive(Debug, Default)]
pub struct ChokeShared {
    /// Engaged = muted
    enabled: AtomicBool,

    /// FREE or QUANTIZED engage
    onset_mode: AtomicU8,

    /// FREE or QUANTIZED release
    length_mode: AtomicU8,

    /// Scheduled engage position (0 = none)
    pub onset_at: ScheduledSample,

    /// Scheduled release position (0 = none)
    pub release_at: ScheduledSample,
}

impl ChokeShared {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engage now (mute)
    pub fn engage(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Release now (unmute)
    pub fn release(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn toggle(&self) {
        if self.is_enabled() {
            self.release();
        } else {
            self.engage();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn onset_mode(&self) -> ScheduleMode {
        ScheduleMode::from_u8(self.onset_mode.load(Ordering::Relaxed))
    }

    pub fn set_onset_mode(&self, mode: ScheduleMode) {
        self.onset_mode.store(mode as u8, Ordering::Relaxed);
    }

    pub fn length_mode(&self) -> ScheduleMode {
        ScheduleMode::from_u8(self.length_mode.load(Ordering::Relaxed))
    }

    pub fn set_length_mode(&self, mode: ScheduleMode) {
        self.length_mode.store(mode as u8, Ordering::Relaxed);
    }
}

/// The audio-side choke state: gain ramp plus schedule evaluation.
pub struct ChokeEngine {
    shared: Arc<ChokeShared>,

    /// Ramped gain, always in [0, 1]
    current_gain: f32,

    /// Ramp length in samples
    fade_samples: f32,
}

impl ChokeEngine {
    pub fn new(shared: Arc<ChokeShared>, fade_ms: f32) -> Self {
        Self {
            shared,
            current_gain: 1.0,
            fade_samples: (fade_ms * SAMPLE_RATE as f32 / 1000.0).round().max(1.0),
        }
    }

    #[allow(dead_code)]
    pub fn current_gain(&self) -> f32 {
        self.current_gain
    }

    /// Process one block in place. `block_start` is the sample position of
    /// the first frame.
    pub fn process_block(&mut self, block_start: u64, left: &mut [i16], right: &mut [i16]) {
        let block_end = block_start + left.len() as u64;

        if self.shared.onset_at.fire_in(block_start, block_end) {
            self.shared.enabled.store(true, Ordering::Release);
        }

        if self.shared.release_at.fire_in(block_start, block_end) {
            self.shared.enabled.store(false, Ordering::Release);
        }

        let target = if self.shared.enabled.load(Ordering::Acquire) { 0.0 } else { 1.0 };

        // The geometric tail of the ramp never quite lands in f32; snap
        // once the residue is inaudible
        if (target - self.current_gain).abs() < 1e-6 {
            self.current_gain = target;
        }

        let increment = (target - self.current_gain) / self.fade_samples;

        for frame in 0..left.len() {
            self.current_gain = (self.current_gain + increment).clamp(0.0, 1.0);
            left[frame] = scale_sample(left[frame], self.current_gain);
            right[frame] = scale_sample(right[frame], self.current_gain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BLOCK_SAMPLES;

    fn full_scale_block() -> (Vec<i16>, Vec<i16>) {
        (vec![10_000; BLOCK_SAMPLES], vec![10_000; BLOCK_SAMPLES])
    }

    fn run_block(engine: &mut ChokeEngine, start: u64) -> (Vec<i16>, Vec<i16>) {
        let (mut left, mut right) = full_scale_block();
        engine.process_block(start, &mut left, &mut right);
        (left, right)
    }

    #[test]
    fn test_passes_through_when_idle() {
        let shared = Arc::new(ChokeShared::new());
        let mut engine = ChokeEngine::new(shared, DEFAULT_FADE_MS);

        let (left, right) = run_block(&mut engine, 0);
        assert_eq!(left[BLOCK_SAMPLES - 1], 10_000);
        assert_eq!(right[BLOCK_SAMPLES - 1], 10_000);
    }

    #[test]
    fn test_engage_ramps_to_silence() {
        let shared = Arc::new(ChokeShared::new());
        let mut engine = ChokeEngine::new(shared.clone(), DEFAULT_FADE_MS);

        shared.engage();

        // First block: ramping down, end of block well below full scale
        let (left, _) = run_block(&mut engine, 0);
        assert!(left[0] < 10_000);
        assert!(left[BLOCK_SAMPLES - 1] < 1_000);

        // A few more blocks and the gain is effectively zero
        for block in 1..4 {
            run_block(&mut engine, block * BLOCK_SAMPLES as u64);
        }
        assert!(engine.current_gain() < 1e-3);
        let (left, _) = run_block(&mut engine, 4 * BLOCK_SAMPLES as u64);
        assert_eq!(left[BLOCK_SAMPLES - 1], 0);
    }

    #[test]
    fn test_release_ramps_back_up() {
        let shared = Arc::new(ChokeShared::new());
        let mut engine = ChokeEngine::new(shared.clone(), DEFAULT_FADE_MS);

        shared.engage();
        for block in 0..5 {
            run_block(&mut engine, block * BLOCK_SAMPLES as u64);
        }
        assert!(engine.current_gain() < 1e-3);

        shared.release();
        for block in 5..10 {
            run_block(&mut engine, block * BLOCK_SAMPLES as u64);
        }
        assert!(engine.current_gain() > 0.999);
    }

    #[test]
    fn test_scheduled_onset_fires_in_containing_block() {
        let shared = Arc::new(ChokeShared::new());
        let mut engine = ChokeEngine::new(shared.clone(), DEFAULT_FADE_MS);

        // Scheduled for sample 300: inside the block [256, 384)
        shared.onset_at.schedule(300);

        run_block(&mut engine, 0);
        assert!(!shared.is_enabled());
        run_block(&mut engine, 128);
        assert!(!shared.is_enabled());

        run_block(&mut engine, 256);
        assert!(shared.is_enabled());
        assert!(!shared.onset_at.is_scheduled());
    }

    #[test]
    fn test_scheduled_release_disables() {
        let shared = Arc::new(ChokeShared::new());
        let mut engine = ChokeEngine::new(shared.clone(), DEFAULT_FADE_MS);

        shared.engage();
        shared.release_at.schedule(6_512);

        // Blocks up to the one containing 6,512 (block start 6,400)
        let mut start = 0u64;
        while start < 6_400 {
            run_block(&mut engine, start);
            start += BLOCK_SAMPLES as u64;
        }
        assert!(shared.is_enabled());

        run_block(&mut engine, 6_400);
        assert!(!shared.is_enabled());
    }

    #[test]
    fn test_enable_when_enabled_is_noop() {
        let shared = Arc::new(ChokeShared::new());
        let mut engine = ChokeEngine::new(shared.clone(), DEFAULT_FADE_MS);

        shared.engage();
        for block in 0..5 {
            run_block(&mut engine, block * BLOCK_SAMPLES as u64);
        }
        let gain_before = engine.current_gain();

        shared.engage();
        let (left, _) = run_block(&mut engine, 5 * BLOCK_SAMPLES as u64);
        assert_eq!(engine.current_gain(), gain_before);
        assert_eq!(left[0], 0);
    }

    #[test]
    fn test_toggle_twice_restores_state() {
        let shared = Arc::new(ChokeShared::new());
        shared.toggle();
        assert!(shared.is_enabled());
        shared.toggle();
        assert!(!shared.is_enabled());
    }
}
