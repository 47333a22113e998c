//! Freeze: loop the most recent few milliseconds of input.
//!
//! While disabled the engine copies input into a short circular buffer and
//! passes audio through. On engage the read position snaps to the write
//! position, so playback loops the freshest audio in the buffer.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use crate::audio::ScheduledSample;
use crate::types::{ScheduleMode, SAMPLE_RATE};

/// Loop window length. 3 ms (132 samples) gives the hard single-cycle buzz
/// this freeze is known for.
pub const FREEZE_BUFFER_MS: u32 = 3;

/// Buffer length in samples per channel
pub const FREEZE_BUFFER_SAMPLES: usize = (FREEZE_BUFFER_MS * SAMPLE_RATE / 1000) as usize;

/// State shared between the freeze engine (audio side) and its controller.
#[derive(Debug, Default)]
pub struct FreezeShared {
    enabled: AtomicBool,
    onset_mode: AtomicU8,
    length_mode: AtomicU8,

    /// Scheduled engage position (0 = none)
    pub onset_at: ScheduledSample,

    /// Scheduled release position (0 = none)
    pub release_at: ScheduledSample,
}

impl FreezeShared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engage(&self) {
        self.enabled.store(true, Ordering::Release);
    }

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

/// Audio-side freeze state. The circular buffer and positions belong to the
/// audio callback alone.
pub struct FreezeEngine {
    shared: Arc<FreezeShared>,
    buffer_l: Vec<i16>,
    buffer_r: Vec<i16>,
    write_pos: usize,
    read_pos: usize,

    /// Previous block's enabled state, for catching the engage edge
    was_enabled: bool,
}

impl FreezeEngine {
    pub fn new(shared: Arc<FreezeShared>) -> Self {
        Self {
            shared,
            buffer_l: vec![0; FREEZE_BUFFER_SAMPLES],
            buffer_r: vec![0; FREEZE_BUFFER_SAMPLES],
            write_pos: 0,
            read_pos: 0,
            was_enabled: false,
        }
    }

    /// Process one block in place.
    pub fn process_block(&mut self, block_start: u64, left: &mut [i16], right: &mut [i16]) {
        let block_end = block_start + left.len() as u64;

        if self.shared.onset_at.fire_in(block_start, block_end) {
            self.shared.enabled.store(true, Ordering::Release);
        }

        if self.shared.release_at.fire_in(block_start, block_end) {
            self.shared.enabled.store(false, Ordering::Release);
        }

        let frozen = self.shared.enabled.load(Ordering::Acquire);

        // Engage edge: capture the freshest audio by snapping the read
        // position to the write position on the same block boundary
        if frozen && !self.was_enabled {
            self.read_pos = self.write_pos;
        }
        self.was_enabled = frozen;

        if !frozen {
            // Record continuously and pass through unchanged
            for frame in 0..left.len() {
                self.buffer_l[self.write_pos] = left[frame];
                self.buffer_r[self.write_pos] = right[frame];
                self.write_pos += 1;
                if self.write_pos >= FREEZE_BUFFER_SAMPLES {
                    self.write_pos = 0;
                }
            }
        } else {
            // Loop the buffer; input is discarded
            for frame in 0..left.len() {
                left[frame] = self.buffer_l[self.read_pos];
                right[frame] = self.buffer_r[self.read_pos];
                self.read_pos += 1;
                if self.read_pos >= FREEZE_BUFFER_SAMPLES {
                    self.read_pos = 0;
                }
            }
        }
    }
}
