//! Wait-free debug trace ring.
//!
//! Any context (audio callback, clock thread, control loop) may record an
//! event; the control loop dumps or clears the buffer on request. Each slot
//! is a pair of atomics, so a dump that races a writer sees a stale or
//! half-new record at worst, never UB. Debug aid only.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

/// Ring size in events (power of two for mask indexing)
const TRACE_EVENTS: usize = 1024;

/// Trace event ids. Values group by subsystem like a syslog facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TraceId {
    ClockTickRecv = 1,
    ClockTickDropped = 3,
    TransportStart = 10,
    TransportStop = 11,
    TransportContinue = 12,
    BeatLedOn = 101,
    BeatLedOff = 102,
    TickPeriodUpdate = 103,
    TimekeeperSync = 400,
    TransportChange = 401,
    BeatAdvance = 402,
    ChokeEngage = 502,
    ChokeRelease = 503,
    FreezeEngage = 510,
    FreezeRelease = 511,
    StutterCaptureStart = 520,
    StutterCaptureEnd = 521,
    StutterPlay = 522,
    StutterStop = 523,
    CommandDropped = 600,
}

/// One decoded trace record
#[derive(Debug, Clone, Copy)]
pub struct TraceRecord {
    pub micros: u64,
    pub id: u16,
    pub value: u16,
}

/// Fixed trace ring. Clone the `Arc` into every context that records.
pub struct Trace {
    epoch: Instant,
    write_idx: AtomicU32,
    timestamps: Box<[AtomicU64]>,
    /// id in the high 16 bits, value in the low 16
    payloads: Box<[AtomicU32]>,
}

impl Trace {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            write_idx: AtomicU32::new(0),
            timestamps: (0..TRACE_EVENTS).map(|_| AtomicU64::new(0)).collect(),
            payloads: (0..TRACE_EVENTS).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Microseconds since the trace was created
    pub fn now_micros(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Record an event. Wait-free, safe from any context.
    pub fn record(&self, id: TraceId, value: u16) {
        let idx = (self.write_idx.fetch_add(1, Ordering::Relaxed) as usize) & (TRACE_EVENTS - 1);
        // Timestamp 0 marks an empty slot; a record in the first
        // microsecond pins to 1
        self.timestamps[idx].store(self.now_micros().max(1), Ordering::Relaxed);
        self.payloads[idx].store(((id as u32) << 16) | value as u32, Ordering::Relaxed);
    }

    /// Snapshot the buffer in chronological order (oldest first).
    /// Unwritten slots (timestamp 0) are skipped.
    pub fn dump(&self) -> Vec<TraceRecord> {
        let write = self.write_idx.load(Ordering::Relaxed) as usize;
        let mut records = Vec::with_capacity(TRACE_EVENTS);

        for offset in 0..TRACE_EVENTS {
            let idx = (write + offset) & (TRACE_EVENTS - 1);
            let micros = self.timestamps[idx].load(Ordering::Relaxed);
            if micros == 0 {
                continue;
            }
            let payload = self.payloads[idx].load(Ordering::Relaxed);
            records.push(TraceRecord {
                micros,
                id: (payload >> 16) as u16,
                value: (payload & 0xFFFF) as u16,
            });
        }

        records
    }

    /// Reset the buffer
    pub fn clear(&self) {
        for timestamp in self.timestamps.iter() {
            timestamp.store(0, Ordering::Relaxed);
        }
        self.write_idx.store(0, Ordering::Relaxed);
    }

    /// Total events recorded since the last clear
    pub fn recorded(&self) -> u32 {
        self.write_idx.load(Ordering::Relaxed)
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}
