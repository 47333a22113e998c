//! The audio-context pipeline: one stereo block through
//! stutter -> freeze -> choke, bracketed by the TimeKeeper.
//!
//! Runs inside the input-stream callback with hard deadlines: no locks, no
//! allocation, no I/O. Schedules are evaluated against the pre-block
//! sample position, so "falls within [start, start + N)" means this block;
//! the shared counter advances after processing.

use std::sync::Arc;

use crate::audio::choke::ChokeEngine;
use crate::audio::freeze::FreezeEngine;
use crate::audio::stutter::StutterEngine;
use crate::timing::TimeKeeper;

pub struct BlockProcessor {
    timekeeper: Arc<TimeKeeper>,
    stutter: StutterEngine,
    freeze: FreezeEngine,
    choke: ChokeEngine,
}

impl BlockProcessor {
    pub fn new(
        timekeeper: Arc<TimeKeeper>,
        stutter: StutterEngine,
        freeze: FreezeEngine,
        choke: ChokeEngine,
    ) -> Self {
        Self { timekeeper, stutter, freeze, choke }
    }

    /// Process one block in place. Effect order matches the device signal
    /// chain: stutter feeds freeze feeds choke.
    pub fn process_block(&mut self, left: &mut [i16], right: &mut [i16]) {
        let block_start = self.timekeeper.sample_position();

        self.stutter.process_block(block_start, left, right);
        self.freeze.process_block(block_start, left, right);
        self.choke.process_block(block_start, left, right);

        self.timekeeper.increment_samples(left.len() as u32);
    }
}
