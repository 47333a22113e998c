//! External beat clock input over MIDI.
//!
//! The midir callback thread is a pure producer: it timestamps realtime
//! bytes and pushes them into the SPSC queues the control loop drains.
//! Tempo estimation happens on the consumer side.

pub mod clock;

use anyhow::{Context, Result};
use midir::{Ignore, MidiInput, MidiInputConnection};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::midi::clock::{ClockWatch, SyncStatus};
use crate::spsc::Producer;
use crate::trace::{Trace, TraceId};

const MIDI_CLOCK: u8 = 0xF8;
const MIDI_START: u8 = 0xFA;
const MIDI_CONTINUE: u8 = 0xFB;
const MIDI_STOP: u8 = 0xFC;

/// One clock tick with its arrival time (monotonic microseconds)
#[derive(Debug, Clone, Copy)]
pub struct ClockTick {
    pub micros: u64,
}

/// Transport events from the clock source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Start,
    Stop,
    Continue,
}

/// MIDI input port information
#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub name: String,
    pub index: usize,
}

/// Owns the MIDI connection and the clock-health watch.
pub struct MidiHandler {
    connection: Option<MidiInputConnection<()>>,
    watch: Arc<Mutex<ClockWatch>>,
}

impl MidiHandler {
    pub fn new() -> Self {
        Self {
            connection: None,
            watch: Arc::new(Mutex::new(ClockWatch::new())),
        }
    }

    /// List available MIDI input ports
    pub fn list_ports() -> Result<Vec<MidiPortInfo>> {
        let midi_in = MidiInput::new("stammer-query").context("Failed to create MIDI input")?;

        let ports = midi_in.ports();
        let mut port_infos = Vec::new();

        for (i, port) in ports.iter().enumerate() {
            let name = midi_in
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown Port {}", i));
            port_infos.push(MidiPortInfo { name, index: i });
        }

        Ok(port_infos)
    }

    /// Connect to a port. Clock ticks and transport events flow into the
    /// given queues from the midir callback thread.
    pub fn connect(
        &mut self,
        port_index: usize,
        mut tick_tx: Producer<ClockTick>,
        mut event_tx: Producer<TransportEvent>,
        trace: Arc<Trace>,
    ) -> Result<()> {
        let mut midi_in = MidiInput::new("stammer").context("Failed to create MIDI input")?;
        midi_in.ignore(Ignore::None);

        let ports = midi_in.ports();
        let port = ports
            .get(port_index)
            .context("MIDI port index out of range")?;

        let watch = self.watch.clone();

        let connection = midi_in
            .connect(
                port,
                "stammer-input",
                move |timestamp_us, message, _| {
                    let status = match message.first() {
                        Some(&status) => status,
                        None => return,
                    };

                    match status {
                        MIDI_CLOCK => {
                            watch.lock().mark_tick();
                            if tick_tx.push(ClockTick { micros: timestamp_us }) {
                                trace.record(TraceId::ClockTickRecv, 0);
                            } else {
                                // Dropping is safe: EMA smoothing rides
                                // over a missing tick
                                trace.record(TraceId::ClockTickDropped, 0);
                            }
                        }
                        MIDI_START => {
                            watch.lock().mark_start();
                            event_tx.push(TransportEvent::Start);
                            trace.record(TraceId::TransportStart, 0);
                        }
                        MIDI_STOP => {
                            watch.lock().mark_stop();
                            event_tx.push(TransportEvent::Stop);
                            trace.record(TraceId::TransportStop, 0);
                        }
                        MIDI_CONTINUE => {
                            watch.lock().mark_start();
                            event_tx.push(TransportEvent::Continue);
                            trace.record(TraceId::TransportContinue, 0);
                        }
                        _ => {}
                    }
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!("Failed to connect to MIDI port: {}", e))?;

        self.connection = Some(connection);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        *self.watch.lock() = ClockWatch::new();
    }

    #[allow(dead_code)]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Sync status for the status line
    pub fn sync_status(&self) -> SyncStatus {
        if self.connection.is_none() {
            return SyncStatus::NoDevice;
        }
        self.watch.lock().status()
    }
}

impl Default for MidiHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiHandler {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Get port by name (case-insensitive substring match)
pub fn get_port_by_name(name: &str) -> Result<usize> {
    let ports = MidiHandler::list_ports()?;
    let name_lower = name.to_lowercase();

    for port in ports {
        if port.name.to_lowercase().contains(&name_lower) {
            return Ok(port.index);
        }
    }

    anyhow::bail!("MIDI port '{}' not found", name)
}
