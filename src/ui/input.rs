//! Keyboard input: the stand-in for the hardware buttons and encoders.
//!
//! Effect keys emit press/release command pairs into the button queue,
//! exactly as the key scanner would. Terminals that report key releases
//! (kitty keyboard protocol) get true momentary behavior; elsewhere each
//! tap alternates between the press and release commands.

use std::fs;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::app::App;
use crate::config::ResolvedBinding;
use crate::spsc::Producer;
use crate::types::{Command, CommandKind};

/// Quadrature steps one key tap advances an encoder (one detent)
const STEPS_PER_TAP: i32 = 4;

/// Trace dump destination
const TRACE_DUMP_PATH: &str = "stammer-trace.log";

/// Input-side state: the key table and the button command producer.
pub struct InputHandler {
    key_table: Vec<ResolvedBinding>,
    command_tx: Producer<Command>,

    /// Whether the terminal reports key releases
    release_supported: bool,

    /// Without release reporting, each key alternates press/release;
    /// one latch per key-table entry
    latched: Vec<bool>,

    pub show_help: bool,
}

impl InputHandler {
    pub fn new(
        key_table: Vec<ResolvedBinding>,
        command_tx: Producer<Command>,
        release_supported: bool,
    ) -> Self {
        let latched = vec![false; key_table.len()];
        Self {
            key_table,
            command_tx,
            release_supported,
            latched,
            show_help: false,
        }
    }

    /// Poll and handle all pending terminal events
    pub fn handle_input(&mut self, app: &mut App) -> Result<()> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                self.handle_key_event(app, key);
            }
        }

        Ok(())
    }

    fn handle_key_event(&mut self, app: &mut App, key: KeyEvent) {
        let pressed = match key.kind {
            KeyEventKind::Press => true,
            KeyEventKind::Release => false,
            KeyEventKind::Repeat => return,
        };

        // Quit shortcuts act on press only
        if pressed {
            match key.code {
                KeyCode::Esc => {
                    app.quit();
                    return;
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    app.quit();
                    return;
                }
                _ => {}
            }
        }

        let ch = match key.code {
            KeyCode::Char(ch) => ch,
            _ => return,
        };

        // Effect keys: emit the mapped press/release commands
        if let Some(index) = self.key_table.iter().position(|b| b.key == ch) {
            let binding = self.key_table[index];

            let cmd = if self.release_supported {
                if pressed { Some(binding.press) } else { Some(binding.release) }
            } else if pressed {
                // No release events: each tap alternates press and release
                self.latched[index] = !self.latched[index];
                if self.latched[index] { Some(binding.press) } else { Some(binding.release) }
            } else {
                None
            };

            if let Some(cmd) = cmd {
                if cmd.kind != CommandKind::None && !self.command_tx.push(cmd) {
                    app.show_warning("Button queue full, command dropped");
                }
            }
            return;
        }

        if !pressed {
            return;
        }

        match ch {
            // Virtual encoder turns
            'q' => app.encoder_positions[0] -= STEPS_PER_TAP,
            'w' => app.encoder_positions[0] += STEPS_PER_TAP,
            'e' => app.encoder_positions[1] -= STEPS_PER_TAP,
            'r' => app.encoder_positions[1] += STEPS_PER_TAP,
            'g' => app.encoder_positions[2] -= STEPS_PER_TAP,
            'h' => app.encoder_positions[2] += STEPS_PER_TAP,
            '[' => app.encoder_positions[3] -= STEPS_PER_TAP,
            ']' => app.encoder_positions[3] += STEPS_PER_TAP,

            // Encoder buttons
            '1' => app.encoder_buttons[0] = true,
            '2' => app.encoder_buttons[1] = true,
            '3' => app.encoder_buttons[2] = true,
            '4' => app.encoder_buttons[3] = true,

            // Debug console
            'd' => match dump_trace(app) {
                Ok(count) => {
                    app.show_info(format!("{} trace events -> {}", count, TRACE_DUMP_PATH))
                }
                Err(e) => app.show_error(format!("Trace dump failed: {}", e)),
            },
            'D' => {
                app.trace.clear();
                app.show_info("Trace cleared");
            }
            'i' => {
                let snapshot = app.timing_snapshot();
                app.show_info(snapshot);
            }

            '?' => self.show_help = !self.show_help,

            _ => {}
        }
    }
}

/// Write the trace buffer to disk, oldest record first
fn dump_trace(app: &App) -> Result<usize> {
    let records = app.trace.dump();
    let mut out = String::with_capacity(records.len() * 32);
    out.push_str("micros\tid\tvalue\n");

    for record in &records {
        out.push_str(&format!("{}\t{}\t{}\n", record.micros, record.id, record.value));
    }

    fs::write(TRACE_DUMP_PATH, out)?;
    Ok(records.len())
}
