//! Stutter: arm, capture and replay a bounded slice of the input.
//!
//! An eight-state machine driven from three directions: schedule fields
//! that fire when their sample position lands in the current block,
//! the capture buffer filling, and immediate transition requests from the
//! controller. The control side never touches the buffer or positions;
//! it writes schedule fields and a one-deep request mailbox, and reads
//! the published state and capture length.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::audio::ScheduledSample;
use crate::types::{ScheduleMode, SAMPLE_RATE};

/// Slowest tempo the capture buffer must hold one bar of
pub const MIN_TEMPO_BPM: u32 = 70;

/// One bar at the minimum tempo: (60 / 70) * 44,100 * 4 = 151,200 samples
/// per channel (~590 KB total as stereo i16). Heap-allocated once at
/// startup; the audio path never allocates.
pub const STUTTER_BUFFER_SAMPLES: usize = (60 * SAMPLE_RATE / MIN_TEMPO_BPM) as usize * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum StutterState {
    /// Nothing captured, passing audio through
    #[default]
    IdleNoLoop = 0,
    /// A loop is captured and ready for playback
    IdleWithLoop = 1,
    /// Armed: capture begins when the schedule fires
    WaitCaptureStart = 2,
    /// Recording into the capture buffer
    Capturing = 3,
    /// Still recording, end scheduled
    WaitCaptureEnd = 4,
    /// Armed: playback begins when the schedule fires
    WaitPlaybackOnset = 5,
    /// Looping the captured slice
    Playing = 6,
    /// Still playing, stop scheduled
    WaitPlaybackLength = 7,
}

impl StutterState {
    pub fn from_u8(value: u8) -> StutterState {
        match value {
            1 => StutterState::IdleWithLoop,
            2 => StutterState::WaitCaptureStart,
            3 => StutterState::Capturing,
            4 => StutterState::WaitCaptureEnd,
            5 => StutterState::WaitPlaybackOnset,
            6 => StutterState::Playing,
            7 => StutterState::WaitPlaybackLength,
            _ => StutterState::IdleNoLoop,
        }
    }

    /// Idle states pass audio through and accept new captures
    pub fn is_idle(self) -> bool {
        matches!(self, StutterState::IdleNoLoop | StutterState::IdleWithLoop)
    }
}

/// Immediate transitions requested by the controller. One-deep mailbox:
/// the audio side swaps it back to None each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StutterRequest {
    None = 0,
    StartCapture = 1,
    EndCapture = 2,
    StartPlayback = 3,
    StopPlayback = 4,
}

impl StutterRequest {
    fn from_u8(value: u8) -> StutterRequest {
        match value {
            1 => StutterRequest::StartCapture,
            2 => StutterRequest::EndCapture,
            3 => StutterRequest::StartPlayback,
            4 => StutterRequest::StopPlayback,
            _ => StutterRequest::None,
        }
    }
}

/// State shared between the stutter engine (audio side) and its controller.
#[derive(Debug, Default)]
pub struct StutterShared {
    /// Current machine state (audio side publishes)
    state: AtomicU8,

    /// Captured loop length in samples (audio side publishes)
    capture_len: AtomicU64,

    /// Pending immediate transition (control side stores)
    request: AtomicU8,

    /// Latched "stutter button held" flag; decides the post-capture state
    /// at the moment capture actually ends
    stutter_held: AtomicBool,

    pub capture_start_at: ScheduledSample,
    pub capture_end_at: ScheduledSample,
    pub playback_onset_at: ScheduledSample,
    pub playback_stop_at: ScheduledSample,

    onset_mode: AtomicU8,
    length_mode: AtomicU8,
    capture_start_mode: AtomicU8,
    capture_end_mode: AtomicU8,
}

impl StutterShared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StutterState {
        StutterState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn capture_len(&self) -> u64 {
        self.capture_len.load(Ordering::Relaxed)
    }

    #[allow(dead_code)]
    pub fn has_loop(&self) -> bool {
        self.capture_len() > 0
    }

    /// Queue an immediate transition (control side)
    pub fn request(&self, request: StutterRequest) {
        self.request.store(request as u8, Ordering::Release);
    }

    pub fn set_stutter_held(&self, held: bool) {
        self.stutter_held.store(held, Ordering::Relaxed);
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

    pub fn capture_start_mode(&self) -> ScheduleMode {
        ScheduleMode::from_u8(self.capture_start_mode.load(Ordering::Relaxed))
    }

    pub fn set_capture_start_mode(&self, mode: ScheduleMode) {
        self.capture_start_mode.store(mode as u8, Ordering::Relaxed);
    }

    pub fn capture_end_mode(&self) -> ScheduleMode {
        ScheduleMode::from_u8(self.capture_end_mode.load(Ordering::Relaxed))
    }

    pub fn set_capture_end_mode(&self, mode: ScheduleMode) {
        self.capture_end_mode.store(mode as u8, Ordering::Relaxed);
    }
}

/// Audio-side stutter state. Buffers and positions belong to the audio
/// callback alone.
pub struct StutterEngine {
    shared: Arc<StutterShared>,
    buffer_l: Vec<i16>,
    buffer_r: Vec<i16>,
    write_pos: usize,
    read_pos: usize,
    capture_len: usize,
    state: StutterState,
}

impl StutterEngine {
    pub fn new(shared: Arc<StutterShared>) -> Self {
        Self {
            shared,
            buffer_l: vec![0; STUTTER_BUFFER_SAMPLES],
            buffer_r: vec![0; STUTTER_BUFFER_SAMPLES],
            write_pos: 0,
            read_pos: 0,
            capture_len: 0,
            state: StutterState::IdleNoLoop,
        }
    }

    fn idle_state(&self) -> StutterState {
        if self.capture_len > 0 {
            StutterState::IdleWithLoop
        } else {
            StutterState::IdleNoLoop
        }
    }

    fn begin_capture(&mut self) {
        self.write_pos = 0;
        self.capture_len = 0;
        self.state = StutterState::Capturing;
    }

    /// End capture now. Destination depends on the latched held flag at
    /// this moment; an empty capture falls back to no-loop idle.
    fn finish_capture(&mut self) {
        self.capture_len = self.write_pos;
        self.shared.capture_end_at.cancel();

        if self.capture_len == 0 {
            self.state = StutterState::IdleNoLoop;
        } else if self.shared.stutter_held.load(Ordering::Relaxed) {
            self.read_pos = 0;
            self.state = StutterState::Playing;
        } else {
            self.state = StutterState::IdleWithLoop;
        }
    }

    fn start_playback(&mut self) {
        if self.capture_len > 0 {
            self.read_pos = 0;
            self.state = StutterState::Playing;
        }
    }

    fn apply_request(&mut self, request: StutterRequest) {
        match request {
            StutterRequest::None => {}
            StutterRequest::StartCapture => {
                if self.state.is_idle() || self.state == StutterState::WaitCaptureStart {
                    self.shared.capture_start_at.cancel();
                    self.begin_capture();
                }
            }
            StutterRequest::EndCapture => {
                if matches!(self.state, StutterState::Capturing | StutterState::WaitCaptureEnd) {
                    self.finish_capture();
                }
            }
            StutterRequest::StartPlayback => {
                if matches!(self.state, StutterState::IdleWithLoop | StutterState::WaitPlaybackOnset) {
                    self.shared.playback_onset_at.cancel();
                    self.start_playback();
                }
            }
            StutterRequest::StopPlayback => {
                if matches!(
                    self.state,
                    StutterState::Playing | StutterState::WaitPlaybackLength | StutterState::WaitPlaybackOnset
                ) {
                    self.shared.playback_onset_at.cancel();
                    self.shared.playback_stop_at.cancel();
                    self.state = self.idle_state();
                }
            }
        }
    }

    /// Enter or leave the armed WAIT_* states as the control side schedules
    /// or cancels. A zeroed field while armed is a cancellation.
    fn derive_armed_states(&mut self) {
        match self.state {
            StutterState::IdleNoLoop | StutterState::IdleWithLoop => {
                if self.shared.capture_start_at.is_scheduled() {
                    self.state = StutterState::WaitCaptureStart;
                } else if self.state == StutterState::IdleWithLoop
                    && self.shared.playback_onset_at.is_scheduled()
                {
                    self.state = StutterState::WaitPlaybackOnset;
                }
            }
            StutterState::WaitCaptureStart => {
                if !self.shared.capture_start_at.is_scheduled() {
                    self.state = self.idle_state();
                }
            }
            StutterState::Capturing => {
                if self.shared.capture_end_at.is_scheduled() {
                    self.state = StutterState::WaitCaptureEnd;
                }
            }
            StutterState::WaitPlaybackOnset => {
                if !self.shared.playback_onset_at.is_scheduled() {
                    self.state = StutterState::IdleWithLoop;
                }
            }
            StutterState::Playing => {
                if self.shared.playback_stop_at.is_scheduled() {
                    self.state = StutterState::WaitPlaybackLength;
                }
            }
            _ => {}
        }
    }

    /// Fire schedules that land inside this block. Capture start is
    /// evaluated before capture end; playback onset before playback length.
    fn fire_schedules(&mut self, block_start: u64, block_end: u64) {
        if self.state == StutterState::WaitCaptureStart
            && self.shared.capture_start_at.fire_in(block_start, block_end)
        {
            self.begin_capture();
        }

        if matches!(self.state, StutterState::Capturing | StutterState::WaitCaptureEnd)
            && self.shared.capture_end_at.fire_in(block_start, block_end)
        {
            self.finish_capture();
        }

        if self.state == StutterState::WaitPlaybackOnset
            && self.shared.playback_onset_at.fire_in(block_start, block_end)
        {
            self.start_playback();
        }

        if self.state == StutterState::WaitPlaybackLength
            && self.shared.playback_stop_at.fire_in(block_start, block_end)
        {
            self.state = StutterState::IdleWithLoop;
        }
    }

    /// Process one block in place.
    pub fn process_block(&mut self, block_start: u64, left: &mut [i16], right: &mut [i16]) {
        let block_end = block_start + left.len() as u64;

        let request = StutterRequest::from_u8(
            self.shared.request.swap(StutterRequest::None as u8, Ordering::AcqRel),
        );
        self.apply_request(request);
        self.derive_armed_states();
        self.fire_schedules(block_start, block_end);

        match self.state {
            StutterState::Capturing | StutterState::WaitCaptureEnd => {
                // Append to the capture buffer, pass through unchanged
                for frame in 0..left.len() {
                    if self.write_pos < STUTTER_BUFFER_SAMPLES {
                        self.buffer_l[self.write_pos] = left[frame];
                        self.buffer_r[self.write_pos] = right[frame];
                        self.write_pos += 1;
                    }
                }

                // Buffer full ends the capture regardless of any scheduled
                // (even quantized) end point
                if self.write_pos >= STUTTER_BUFFER_SAMPLES {
                    self.finish_capture();
                }
            }

            StutterState::Playing | StutterState::WaitPlaybackLength => {
                for frame in 0..left.len() {
                    left[frame] = self.buffer_l[self.read_pos];
                    right[frame] = self.buffer_r[self.read_pos];
                    self.read_pos += 1;
                    if self.read_pos >= self.capture_len {
                        self.read_pos = 0;
                    }
                }
            }

            // Idle and armed states pass audio through untouched
            _ => {}
        }

        self.shared.state.store(self.state as u8, Ordering::Release);
        self.shared.capture_len.store(self.capture_len as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BLOCK_SAMPLES;

    fn block(value: i16) -> (Vec<i16>, Vec<i16>) {
        (vec![value; BLOCK_SAMPLES], vec![value; BLOCK_SAMPLES])
    }

    fn run(engine: &mut StutterEngine, start: u64, value: i16) -> (Vec<i16>, Vec<i16>) {
        let (mut left, mut right) = block(value);
        engine.process_block(start, &mut left, &mut right);
        (left, right)
    }

    #[test]
    fn test_initial_state_is_idle_no_loop() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        let (left, _) = run(&mut engine, 0, 123);
        assert_eq!(shared.state(), StutterState::IdleNoLoop);
        assert_eq!(shared.capture_len(), 0);
        // Passthrough
        assert_eq!(left[0], 123);
    }

    #[test]
    fn test_free_capture_then_idle_with_loop() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        shared.set_stutter_held(true);
        shared.request(StutterRequest::StartCapture);

        // Capture three blocks of distinct values
        run(&mut engine, 0, 11);
        assert_eq!(shared.state(), StutterState::Capturing);
        run(&mut engine, 128, 22);
        run(&mut engine, 256, 33);

        // Button released before end: loop parks
        shared.set_stutter_held(false);
        shared.request(StutterRequest::EndCapture);
        run(&mut engine, 384, 44);

        assert_eq!(shared.state(), StutterState::IdleWithLoop);
        assert_eq!(shared.capture_len(), 3 * BLOCK_SAMPLES as u64);
    }

    #[test]
    fn test_capture_held_goes_straight_to_playing() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        shared.set_stutter_held(true);
        shared.request(StutterRequest::StartCapture);
        run(&mut engine, 0, 50);
        run(&mut engine, 128, 60);

        // Still held at end of capture
        shared.request(StutterRequest::EndCapture);
        let (left, _) = run(&mut engine, 256, 0);

        assert_eq!(shared.state(), StutterState::Playing);
        // Playback starts at the head of the captured slice
        assert_eq!(left[0], 50);
    }

    #[test]
    fn test_playback_loops_captured_slice() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        // Capture exactly one block of 77s
        shared.set_stutter_held(true);
        shared.request(StutterRequest::StartCapture);
        run(&mut engine, 0, 77);
        shared.request(StutterRequest::EndCapture);

        // Loop length = 128, so every following block replays the slice
        let (left, _) = run(&mut engine, 128, 0);
        assert_eq!(shared.state(), StutterState::Playing);
        assert!(left.iter().all(|&s| s == 77));

        let (left, _) = run(&mut engine, 256, 1);
        assert!(left.iter().all(|&s| s == 77));
    }

    #[test]
    fn test_stop_playback_returns_to_idle_with_loop() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        shared.set_stutter_held(true);
        shared.request(StutterRequest::StartCapture);
        run(&mut engine, 0, 9);
        shared.request(StutterRequest::EndCapture);
        run(&mut engine, 128, 0);
        assert_eq!(shared.state(), StutterState::Playing);

        shared.set_stutter_held(false);
        shared.request(StutterRequest::StopPlayback);
        let (left, _) = run(&mut engine, 256, 42);

        assert_eq!(shared.state(), StutterState::IdleWithLoop);
        // Passthrough again
        assert_eq!(left[0], 42);
        // Loop retained
        assert!(shared.has_loop());
    }

    #[test]
    fn test_scheduled_capture_start_arms_then_fires() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        shared.set_stutter_held(true);
        shared.capture_start_at.schedule(300);

        run(&mut engine, 0, 1);
        assert_eq!(shared.state(), StutterState::WaitCaptureStart);
        run(&mut engine, 128, 2);
        assert_eq!(shared.state(), StutterState::WaitCaptureStart);

        // Block [256, 384) contains the schedule
        run(&mut engine, 256, 3);
        assert_eq!(shared.state(), StutterState::Capturing);
    }

    #[test]
    fn test_cancel_armed_capture_by_zeroing_field() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        shared.capture_start_at.schedule(10_000);
        run(&mut engine, 0, 1);
        assert_eq!(shared.state(), StutterState::WaitCaptureStart);

        shared.capture_start_at.cancel();
        run(&mut engine, 128, 1);
        assert_eq!(shared.state(), StutterState::IdleNoLoop);
    }

    #[test]
    fn test_scheduled_capture_end_fires() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        shared.set_stutter_held(false);
        shared.request(StutterRequest::StartCapture);
        run(&mut engine, 0, 5);

        // End scheduled inside block [384, 512)
        shared.capture_end_at.schedule(400);
        run(&mut engine, 128, 6);
        assert_eq!(shared.state(), StutterState::WaitCaptureEnd);
        run(&mut engine, 256, 7);
        assert_eq!(shared.state(), StutterState::WaitCaptureEnd);

        run(&mut engine, 384, 8);
        assert_eq!(shared.state(), StutterState::IdleWithLoop);
        // The end fires at the head of block 384: three blocks recorded
        assert_eq!(shared.capture_len(), 3 * BLOCK_SAMPLES as u64);
    }

    #[test]
    fn test_scheduled_playback_onset_and_length() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        // Capture one block, park it
        shared.set_stutter_held(false);
        shared.request(StutterRequest::StartCapture);
        run(&mut engine, 0, 64);
        shared.request(StutterRequest::EndCapture);
        run(&mut engine, 128, 0);
        assert_eq!(shared.state(), StutterState::IdleWithLoop);

        // Arm playback for sample 520 (block [512, 640))
        shared.playback_onset_at.schedule(520);
        run(&mut engine, 256, 0);
        assert_eq!(shared.state(), StutterState::WaitPlaybackOnset);
        run(&mut engine, 384, 0);

        let (left, _) = run(&mut engine, 512, 0);
        assert_eq!(shared.state(), StutterState::Playing);
        assert!(left.iter().all(|&s| s == 64));

        // Schedule the stop inside block [768, 896)
        shared.playback_stop_at.schedule(800);
        run(&mut engine, 640, 0);
        assert_eq!(shared.state(), StutterState::WaitPlaybackLength);

        let (left, _) = run(&mut engine, 768, 13);
        assert_eq!(shared.state(), StutterState::IdleWithLoop);
        // The stop fired at the block head, so this block passes through
        assert!(left.iter().all(|&s| s == 13));
    }

    #[test]
    fn test_cancel_armed_playback_by_zeroing_field() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        shared.set_stutter_held(false);
        shared.request(StutterRequest::StartCapture);
        run(&mut engine, 0, 1);
        shared.request(StutterRequest::EndCapture);
        run(&mut engine, 128, 0);

        shared.playback_onset_at.schedule(10_000);
        run(&mut engine, 256, 0);
        assert_eq!(shared.state(), StutterState::WaitPlaybackOnset);

        shared.playback_onset_at.cancel();
        run(&mut engine, 384, 0);
        assert_eq!(shared.state(), StutterState::IdleWithLoop);
    }

    #[test]
    fn test_buffer_full_ends_capture_and_clears_scheduled_end() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        shared.set_stutter_held(true);
        shared.request(StutterRequest::StartCapture);

        // A capture-end scheduled far beyond the buffer's capacity
        let far_future = (STUTTER_BUFFER_SAMPLES * 4) as u64;
        run(&mut engine, 0, 1);
        shared.capture_end_at.schedule(far_future);

        // Feed blocks until the buffer fills
        let full_blocks = STUTTER_BUFFER_SAMPLES / BLOCK_SAMPLES;
        let mut start = 128u64;
        for _ in 0..full_blocks {
            run(&mut engine, start, 2);
            start += BLOCK_SAMPLES as u64;
            if shared.state() == StutterState::Playing {
                break;
            }
        }

        // Held at fill time: straight to playback, schedule discarded
        assert_eq!(shared.state(), StutterState::Playing);
        assert_eq!(shared.capture_len(), STUTTER_BUFFER_SAMPLES as u64);
        assert!(!shared.capture_end_at.is_scheduled());
    }

    #[test]
    fn test_empty_capture_returns_to_no_loop() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        // Capture start and end scheduled inside the same block: the start
        // fires first (tie-break), the end fires with nothing recorded yet
        shared.set_stutter_held(false);
        shared.capture_start_at.schedule(300);
        shared.capture_end_at.schedule(310);

        run(&mut engine, 0, 1);
        assert_eq!(shared.state(), StutterState::WaitCaptureStart);

        run(&mut engine, 256, 2);
        assert_eq!(shared.capture_len(), 0);
        assert_eq!(shared.state(), StutterState::IdleNoLoop);
    }

    #[test]
    fn test_recapture_replaces_loop() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        shared.set_stutter_held(false);
        shared.request(StutterRequest::StartCapture);
        run(&mut engine, 0, 10);
        run(&mut engine, 128, 10);
        shared.request(StutterRequest::EndCapture);
        run(&mut engine, 256, 0);
        assert_eq!(shared.capture_len(), 2 * BLOCK_SAMPLES as u64);

        // New capture from IDLE_WITH_LOOP resets the buffer
        shared.request(StutterRequest::StartCapture);
        run(&mut engine, 384, 20);
        shared.request(StutterRequest::EndCapture);
        let (left, _) = run(&mut engine, 512, 0);
        assert_eq!(shared.capture_len(), BLOCK_SAMPLES as u64);
        assert_eq!(shared.state(), StutterState::IdleWithLoop);
        // Passthrough block, loop holds the new audio
        assert_eq!(left[0], 0);

        shared.request(StutterRequest::StartPlayback);
        let (left, _) = run(&mut engine, 640, 0);
        assert!(left.iter().all(|&s| s == 20));
    }

    #[test]
    fn test_playing_read_pos_stays_within_capture_len() {
        let shared = Arc::new(StutterShared::new());
        let mut engine = StutterEngine::new(shared.clone());

        // Capture 1.5 blocks' worth via a scheduled end mid-block is not
        // possible (block granularity), so capture 1 block and play many
        shared.set_stutter_held(true);
        shared.request(StutterRequest::StartCapture);
        run(&mut engine, 0, 3);
        shared.request(StutterRequest::EndCapture);

        for block in 1..50u64 {
            let (left, _) = run(&mut engine, block * BLOCK_SAMPLES as u64, 0);
            assert!(left.iter().all(|&s| s == 3));
            assert!(engine.read_pos < engine.capture_len);
        }
    }
}
