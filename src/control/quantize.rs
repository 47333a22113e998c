//! The global quantization grid shared by every effect controller.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::timing::TimeKeeper;
use crate::types::Quant;
use crate::visual::BitmapId;

/// Samples subtracted from a quantized onset so external transients line
/// up audibly with the boundary (~3 ms at 44.1 kHz)
pub const DEFAULT_LOOKAHEAD_SAMPLES: u32 = 128;

/// Grid selector plus the onset lookahead. One instance, shared by `Arc`.
#[derive(Debug)]
pub struct QuantGrid {
    selector: AtomicU8,
    lookahead_samples: AtomicU32,
}

impl QuantGrid {
    pub fn new(default: Quant, lookahead_samples: u32) -> Self {
        Self {
            selector: AtomicU8::new(default.index()),
            lookahead_samples: AtomicU32::new(lookahead_samples),
        }
    }

    pub fn get(&self) -> Quant {
        Quant::from_index(self.selector.load(Ordering::Relaxed))
    }

    pub fn set(&self, quant: Quant) {
        self.selector.store(quant.index(), Ordering::Relaxed);
    }

    pub fn lookahead(&self) -> u32 {
        self.lookahead_samples.load(Ordering::Relaxed)
    }

    /// One grid period in samples at the current tempo
    pub fn quantized_duration(&self, timekeeper: &TimeKeeper) -> u32 {
        timekeeper.samples_per_beat() / self.get().divisor()
    }

    /// Samples from now to the next grid boundary
    pub fn samples_to_next_boundary(&self, timekeeper: &TimeKeeper) -> u32 {
        timekeeper.samples_to_next_subdivision(self.quantized_duration(timekeeper))
    }

    /// Absolute onset position for a quantized engage: next boundary,
    /// pulled forward by the lookahead (clamped at "now").
    pub fn onset_sample(&self, timekeeper: &TimeKeeper) -> u64 {
        let to_next = self.samples_to_next_boundary(timekeeper);
        let adjusted = to_next.saturating_sub(self.lookahead());
        timekeeper.sample_position() + adjusted as u64
    }

    /// Absolute position of the next boundary with no lookahead (capture
    /// scheduling wants the true grid point)
    pub fn boundary_sample(&self, timekeeper: &TimeKeeper) -> u64 {
        timekeeper.sample_position() + self.samples_to_next_boundary(timekeeper) as u64
    }
}

/// Bitmap for a grid setting
pub fn quant_bitmap(quant: Quant) -> BitmapId {
    match quant {
        Quant::Q32 => BitmapId::Quant32,
        Quant::Q16 => BitmapId::Quant16,
        Quant::Q8 => BitmapId::Quant8,
        Quant::Q4 => BitmapId::Quant4,
    }
}
