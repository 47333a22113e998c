pub mod choke;
pub mod device;
pub mod engine;
pub mod freeze;
pub mod processor;
pub mod stutter;

use std::sync::atomic::{AtomicU64, Ordering};

/// A sample position scheduled by the control side and consumed by the
/// audio side. 0 means "nothing scheduled"; writing 0 cancels.
///
/// Single writer (control), single reader (audio). Relaxed ordering is
/// enough: the value is self-contained and the audio side only acts on it
/// at block boundaries.
#[derive(Debug, Default)]
pub struct ScheduledSample(AtomicU64);

impl ScheduledSample {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Schedule (control side). A position of 0 would read as "none".
    pub fn schedule(&self, sample: u64) {
        self.0.store(sample, Ordering::Relaxed);
    }

    /// Cancel any pending schedule (control side)
    pub fn cancel(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    /// Pending position, or 0 if none
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn is_scheduled(&self) -> bool {
        self.get() != 0
    }

    /// Consume the schedule if it falls within `[block_start, block_end)`.
    /// Audio side only. Clears the field when it fires.
    pub fn fire_in(&self, block_start: u64, block_end: u64) -> bool {
        let at = self.0.load(Ordering::Relaxed);
        if at != 0 && at >= block_start && at < block_end {
            self.0.store(0, Ordering::Relaxed);
            return true;
        }
        false
    }
}

/// Saturating gain application for the 16-bit sample format
#[inline]
pub fn scale_sample(sample: i16, gain: f32) -> i16 {
    let scaled = (sample as f32 * gain).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_sample_fires_in_window() {
        let field = ScheduledSample::new();
        field.schedule(200);

        assert!(!field.fire_in(0, 128));
        assert!(field.is_scheduled());

        assert!(field.fire_in(128, 256));
        // Consumed
        assert!(!field.is_scheduled());
        assert!(!field.fire_in(128, 256));
    }

    #[test]
    fn test_scheduled_sample_cancel() {
        let field = ScheduledSample::new();
        field.schedule(500);
        field.cancel();
        assert!(!field.fire_in(384, 512));
    }

    #[test]
    fn test_window_is_half_open() {
        let field = ScheduledSample::new();
        field.schedule(256);
        // End of window is exclusive
        assert!(!field.fire_in(128, 256));
        assert!(field.fire_in(256, 384));
    }

    #[test]
    fn test_scale_sample_saturates() {
        assert_eq!(scale_sample(1000, 0.5), 500);
        assert_eq!(scale_sample(i16::MAX, 1.0), i16::MAX);
        assert_eq!(scale_sample(i16::MIN, 1.0), i16::MIN);
        assert_eq!(scale_sample(i16::MAX, 0.0), 0);
    }
}
