//! The control context: a single cooperative loop that drains the input
//! queues, runs the effect controllers, tracks the external clock, and
//! keeps the front panel honest. Ticks at ~2 ms from `main`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::audio::choke::ChokeShared;
use crate::audio::freeze::FreezeShared;
use crate::audio::stutter::StutterShared;
use crate::control::choke_ctl::ChokeController;
use crate::control::encoder::{EncoderEvent, EncoderMenu};
use crate::control::freeze_ctl::FreezeController;
use crate::control::quantize::{quant_bitmap, QuantGrid};
use crate::control::registry::{EffectHandle, EffectRegistry};
use crate::control::stutter_ctl::StutterController;
use crate::midi::clock::TickEma;
use crate::midi::{ClockTick, MidiHandler, TransportEvent};
use crate::spsc::Consumer;
use crate::timing::TimeKeeper;
use crate::trace::{Trace, TraceId};
use crate::types::{Command, CommandKind, EffectId, Quant, TransportState, PPQN};
use crate::visual::{LedColor, VisualState};

/// Number of virtual encoders (freeze, stutter, choke, global quant)
pub const NUM_ENCODERS: usize = 4;

const ENCODER_FREEZE: usize = 0;
const ENCODER_STUTTER: usize = 1;
const ENCODER_CHOKE: usize = 2;
const ENCODER_QUANT: usize = 3;

/// Message type for user notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Info,
    Warning,
    Error,
}

/// Transient user notification
#[derive(Debug, Clone)]
pub struct Message {
    pub text: String,
    pub msg_type: MessageType,
    pub timestamp: Instant,
}

/// Main application state
pub struct App {
    pub timekeeper: Arc<TimeKeeper>,
    pub grid: Arc<QuantGrid>,
    pub trace: Arc<Trace>,

    pub choke: Arc<ChokeShared>,
    pub freeze: Arc<FreezeShared>,
    pub stutter: Arc<StutterShared>,

    registry: EffectRegistry,
    choke_ctl: ChokeController,
    freeze_ctl: FreezeController,
    stutter_ctl: StutterController,

    command_rx: Consumer<Command>,
    tick_rx: Consumer<ClockTick>,
    event_rx: Consumer<TransportEvent>,

    /// Tick-period smoothing (consumer side of the clock queue)
    ema: TickEma,

    pub visual: VisualState,
    pub midi_handler: MidiHandler,

    encoders: [EncoderMenu; NUM_ENCODERS],

    /// Raw quadrature positions the front panel advances
    pub encoder_positions: [i32; NUM_ENCODERS],

    /// One-shot encoder button flags, cleared each tick
    pub encoder_buttons: [bool; NUM_ENCODERS],

    /// When the beat LED should go dark again (0 = already dark)
    led_off_sample: u64,

    /// Clock ticks are ignored until a START arrives
    transport_active: bool,

    message: Option<Message>,
    message_duration: Duration,

    should_quit: bool,
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timekeeper: Arc<TimeKeeper>,
        grid: Arc<QuantGrid>,
        trace: Arc<Trace>,
        choke: Arc<ChokeShared>,
        freeze: Arc<FreezeShared>,
        stutter: Arc<StutterShared>,
        command_rx: Consumer<Command>,
        tick_rx: Consumer<ClockTick>,
        event_rx: Consumer<TransportEvent>,
        visual: VisualState,
        midi_handler: MidiHandler,
    ) -> Result<Self> {
        let mut registry = EffectRegistry::new();
        registry.register(EffectId::Choke, choke.clone())?;
        registry.register(EffectId::Freeze, freeze.clone())?;
        registry.register(EffectId::Stutter, stutter.clone())?;

        let choke_ctl =
            ChokeController::new(choke.clone(), timekeeper.clone(), grid.clone(), trace.clone());
        let freeze_ctl =
            FreezeController::new(freeze.clone(), timekeeper.clone(), grid.clone(), trace.clone());
        let stutter_ctl =
            StutterController::new(stutter.clone(), timekeeper.clone(), grid.clone(), trace.clone());

        Ok(Self {
            timekeeper,
            grid,
            trace,
            choke,
            freeze,
            stutter,
            registry,
            choke_ctl,
            freeze_ctl,
            stutter_ctl,
            command_rx,
            tick_rx,
            event_rx,
            ema: TickEma::new(),
            visual,
            midi_handler,
            encoders: [
                EncoderMenu::new(0),
                EncoderMenu::new(0),
                EncoderMenu::new(0),
                EncoderMenu::new(0),
            ],
            encoder_positions: [0; NUM_ENCODERS],
            encoder_buttons: [false; NUM_ENCODERS],
            led_off_sample: 0,
            transport_active: false,
            message: None,
            message_duration: Duration::from_secs(3),
            should_quit: false,
        })
    }

    /// One control-loop iteration
    pub fn tick(&mut self) {
        self.process_commands();
        self.update_encoders();
        self.update_effect_visuals();
        self.process_transport_events();
        self.process_clock_ticks();
        self.update_beat_led();
        self.update_message();
    }

    /// Drain the button command queue: controller interception first,
    /// registry fallback second.
    fn process_commands(&mut self) {
        while let Some(cmd) = self.command_rx.pop() {
            let handled = match cmd.kind {
                CommandKind::Enable | CommandKind::Toggle => {
                    self.choke_ctl.handle_button_press(&cmd, &mut self.visual)
                        || self.freeze_ctl.handle_button_press(&cmd, &mut self.visual)
                        || self.stutter_ctl.handle_button_press(&cmd, &mut self.visual)
                }
                CommandKind::Disable => {
                    self.choke_ctl.handle_button_release(&cmd)
                        || self.freeze_ctl.handle_button_release(&cmd)
                        || self.stutter_ctl.handle_button_release(&cmd, &mut self.visual)
                }
                _ => false,
            };

            if handled {
                continue;
            }

            if self.registry.execute(&cmd) {
                self.apply_default_visuals(&cmd);
            } else {
                self.trace.record(TraceId::CommandDropped, cmd.target as u16);
                self.show_warning(format!(
                    "Unhandled command for {}",
                    cmd.target.name()
                ));
            }
        }
    }

    /// Default LED/display update after a registry-dispatched command
    fn apply_default_visuals(&mut self, cmd: &Command) {
        let handle = match self.registry.get(cmd.target) {
            Some(handle) => handle,
            None => return,
        };

        let enabled = handle.is_enabled();
        let color = if enabled { engaged_color(cmd.target) } else { LedColor::Green };
        self.visual.set_led(cmd.target, color);

        if enabled {
            self.visual.set_last_activated(cmd.target);
        } else if self.visual.last_activated() == cmd.target {
            self.visual.set_last_activated(EffectId::None);
        }

        self.visual.refresh();
    }

    /// Feed each encoder menu and act on its events
    fn update_encoders(&mut self) {
        let now = Instant::now();

        for index in 0..NUM_ENCODERS {
            let events = self.encoders[index].update(
                self.encoder_positions[index],
                self.encoder_buttons[index],
                now,
            );
            self.encoder_buttons[index] = false;

            for event in events {
                self.handle_encoder_event(index, event);
            }
        }
    }

    fn handle_encoder_event(&mut self, index: usize, event: EncoderEvent) {
        match index {
            ENCODER_FREEZE => match event {
                EncoderEvent::ButtonPress => {
                    let bitmap = self.freeze_ctl.cycle_parameter();
                    self.visual.show_bitmap(bitmap);
                }
                EncoderEvent::Turn(delta) => {
                    if let Some(bitmap) = self.freeze_ctl.adjust_parameter(delta) {
                        self.visual.show_bitmap(bitmap);
                    }
                }
                EncoderEvent::Touched => {
                    let bitmap = self.freeze_ctl.parameter_bitmap();
                    self.visual.show_bitmap(bitmap);
                }
                EncoderEvent::CooldownExpired => self.visual.refresh(),
            },

            ENCODER_STUTTER => match event {
                EncoderEvent::ButtonPress => {
                    let bitmap = self.stutter_ctl.cycle_parameter();
                    self.visual.show_bitmap(bitmap);
                }
                EncoderEvent::Turn(delta) => {
                    if let Some(bitmap) = self.stutter_ctl.adjust_parameter(delta) {
                        self.visual.show_bitmap(bitmap);
                    }
                }
                EncoderEvent::Touched => {
                    let bitmap = self.stutter_ctl.parameter_bitmap();
                    self.visual.show_bitmap(bitmap);
                }
                EncoderEvent::CooldownExpired => self.visual.refresh(),
            },

            ENCODER_CHOKE => match event {
                EncoderEvent::ButtonPress => {
                    let bitmap = self.choke_ctl.cycle_parameter();
                    self.visual.show_bitmap(bitmap);
                }
                EncoderEvent::Turn(delta) => {
                    if let Some(bitmap) = self.choke_ctl.adjust_parameter(delta) {
                        self.visual.show_bitmap(bitmap);
                    }
                }
                EncoderEvent::Touched => {
                    let bitmap = self.choke_ctl.parameter_bitmap();
                    self.visual.show_bitmap(bitmap);
                }
                EncoderEvent::CooldownExpired => self.visual.refresh(),
            },

            ENCODER_QUANT => match event {
                EncoderEvent::Turn(delta) => {
                    let current = self.grid.get().index() as i32;
                    let next = (current + delta).clamp(0, 3) as u8;
                    if next != current as u8 {
                        let quant = Quant::from_index(next);
                        self.grid.set(quant);
                        self.visual.show_bitmap(quant_bitmap(quant));
                    }
                }
                EncoderEvent::Touched => {
                    self.visual.show_bitmap(quant_bitmap(self.grid.get()));
                }
                EncoderEvent::CooldownExpired => self.visual.refresh(),
                EncoderEvent::ButtonPress => {}
            },

            _ => {}
        }
    }

    fn update_effect_visuals(&mut self) {
        self.choke_ctl.update_visual_feedback(&mut self.visual);
        self.freeze_ctl.update_visual_feedback(&mut self.visual);
        self.stutter_ctl.update_visual_feedback(&mut self.visual);
    }

    /// Drain transport events. START resets the timeline; CONTINUE
    /// resumes without resetting.
    fn process_transport_events(&mut self) {
        while let Some(event) = self.event_rx.pop() {
            match event {
                TransportEvent::Start => {
                    self.ema.reset_phase();
                    self.transport_active = true;
                    self.timekeeper.reset();
                    self.timekeeper.set_transport(TransportState::Playing);
                    self.trace.record(TraceId::TransportChange, TransportState::Playing as u16);

                    // Light the beat LED for beat zero
                    self.visual.set_beat_led(true);
                    self.led_off_sample =
                        self.timekeeper.sample_position() + self.beat_led_pulse_samples();
                    self.trace.record(TraceId::BeatLedOn, 0);
                }

                TransportEvent::Stop => {
                    self.transport_active = false;
                    self.timekeeper.set_transport(TransportState::Stopped);
                    self.visual.set_beat_led(false);
                    self.led_off_sample = 0;
                    self.trace.record(TraceId::TransportChange, TransportState::Stopped as u16);
                }

                TransportEvent::Continue => {
                    self.transport_active = true;
                    self.timekeeper.set_transport(TransportState::Playing);
                    self.trace.record(TraceId::TransportChange, TransportState::Playing as u16);
                }
            }
        }
    }

    /// Drain clock ticks: smooth the period, recalibrate tempo, count
    /// the tick.
    fn process_clock_ticks(&mut self) {
        while let Some(tick) = self.tick_rx.pop() {
            if !self.transport_active {
                continue;
            }

            if let Some(avg) = self.ema.update(tick.micros) {
                if self.timekeeper.sync_to_external_clock(avg) {
                    self.trace
                        .record(TraceId::TimekeeperSync, self.timekeeper.bpm() as u16);
                }
                self.trace.record(TraceId::TickPeriodUpdate, (avg / 10) as u16);
            }

            self.timekeeper.increment_tick();
        }
    }

    /// Pulse the beat LED: on at each beat flag, off two ticks later
    fn update_beat_led(&mut self) {
        let position = self.timekeeper.sample_position();

        if self.timekeeper.poll_beat_flag() {
            self.visual.set_beat_led(true);
            self.led_off_sample = position + self.beat_led_pulse_samples();
            self.trace.record(TraceId::BeatLedOn, 0);
        }

        if self.led_off_sample > 0 && position >= self.led_off_sample {
            self.visual.set_beat_led(false);
            self.led_off_sample = 0;
            self.trace.record(TraceId::BeatLedOff, 0);
        }
    }

    /// Two clock ticks' worth of samples
    fn beat_led_pulse_samples(&self) -> u64 {
        (self.timekeeper.samples_per_beat() as u64 * 2) / PPQN as u64
    }

    /// Clear an expired message
    fn update_message(&mut self) {
        if let Some(ref msg) = self.message {
            if msg.timestamp.elapsed() > self.message_duration {
                self.message = None;
            }
        }
    }

    pub fn show_info(&mut self, text: impl Into<String>) {
        self.push_message(text, MessageType::Info);
    }

    pub fn show_warning(&mut self, text: impl Into<String>) {
        self.push_message(text, MessageType::Warning);
    }

    pub fn show_error(&mut self, text: impl Into<String>) {
        self.push_message(text, MessageType::Error);
    }

    fn push_message(&mut self, text: impl Into<String>, msg_type: MessageType) {
        self.message = Some(Message {
            text: text.into(),
            msg_type,
            timestamp: Instant::now(),
        });
    }

    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    /// One-line timing snapshot for the debug keys
    pub fn timing_snapshot(&self) -> String {
        format!(
            "pos={} beat={} tick={} spb={} bpm={:.1} dropped: cmd={} clk={} evt={} trace={}",
            self.timekeeper.sample_position(),
            self.timekeeper.beat_number(),
            self.timekeeper.tick_in_beat(),
            self.timekeeper.samples_per_beat(),
            self.timekeeper.bpm(),
            self.command_rx.dropped(),
            self.tick_rx.dropped(),
            self.event_rx.dropped(),
            self.trace.recorded(),
        )
    }

    pub fn transport_str(&self) -> &'static str {
        match self.timekeeper.transport() {
            TransportState::Stopped => "STOPPED",
            TransportState::Playing => "PLAYING",
            TransportState::Recording => "RECORDING",
        }
    }

    pub fn sync_str(&self) -> &'static str {
        use crate::midi::clock::SyncStatus;
        match self.midi_handler.sync_status() {
            SyncStatus::NoDevice => "NO DEVICE",
            SyncStatus::NoClockDetected => "NO CLOCK",
            SyncStatus::Synced => "SYNCED",
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }
}

/// Engaged LED color for the registry fallback path
fn engaged_color(effect: EffectId) -> LedColor {
    match effect {
        EffectId::Choke => LedColor::Red,
        EffectId::Freeze => LedColor::Cyan,
        EffectId::Stutter => LedColor::Blue,
        _ => LedColor::Green,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::quantize::DEFAULT_LOOKAHEAD_SAMPLES;
    use crate::spsc::{self, Producer};
    use crate::visual::DISPLAY_QUEUE_LEN;

    struct Rig {
        app: App,
        command_tx: Producer<Command>,
        tick_tx: Producer<ClockTick>,
        event_tx: Producer<TransportEvent>,
    }

    fn rig() -> Rig {
        let timekeeper = Arc::new(TimeKeeper::new());
        let grid = Arc::new(QuantGrid::new(Quant::Q16, DEFAULT_LOOKAHEAD_SAMPLES));
        let trace = Arc::new(Trace::new());
        let choke = Arc::new(ChokeShared::new());
        let freeze = Arc::new(FreezeShared::new());
        let stutter = Arc::new(StutterShared::new());

        let (command_tx, command_rx) = spsc::channel(32);
        let (tick_tx, tick_rx) = spsc::channel(256);
        let (event_tx, event_rx) = spsc::channel(32);
        let (display_tx, _display_rx) = spsc::channel(DISPLAY_QUEUE_LEN);

        let visual = VisualState::new(
            display_tx,
            choke.clone(),
            freeze.clone(),
            stutter.clone(),
        );

        let app = App::new(
            timekeeper,
            grid,
            trace,
            choke,
            freeze,
            stutter,
            command_rx,
            tick_rx,
            event_rx,
            visual,
            MidiHandler::new(),
        )
        .unwrap();

        Rig { app, command_tx, tick_tx, event_tx }
    }

    #[test]
    fn test_press_command_engages_choke() {
        let mut rig = rig();
        rig.command_tx
            .push(Command::new(CommandKind::Enable, EffectId::Choke));

        rig.app.tick();
        assert!(rig.app.choke.is_enabled());
        assert_eq!(rig.app.visual.led(EffectId::Choke), LedColor::Red);
    }

    #[test]
    fn test_release_command_disables_choke() {
        let mut rig = rig();
        rig.command_tx
            .push(Command::new(CommandKind::Enable, EffectId::Choke));
        rig.app.tick();

        rig.command_tx
            .push(Command::new(CommandKind::Disable, EffectId::Choke));
        rig.app.tick();
        assert!(!rig.app.choke.is_enabled());
        assert_eq!(rig.app.visual.led(EffectId::Choke), LedColor::Green);
    }

    #[test]
    fn test_start_resets_timeline_and_lights_beat_led() {
        let mut rig = rig();
        rig.app.timekeeper.increment_samples(10_000);

        rig.event_tx.push(TransportEvent::Start);
        rig.app.tick();

        assert_eq!(rig.app.timekeeper.sample_position(), 0);
        assert_eq!(rig.app.timekeeper.transport(), TransportState::Playing);
        assert!(rig.app.visual.beat_led());
    }

    #[test]
    fn test_continue_does_not_reset() {
        let mut rig = rig();
        rig.app.timekeeper.increment_samples(10_000);

        rig.event_tx.push(TransportEvent::Continue);
        rig.app.tick();

        assert_eq!(rig.app.timekeeper.sample_position(), 10_000);
        assert_eq!(rig.app.timekeeper.transport(), TransportState::Playing);
    }

    #[test]
    fn test_ticks_ignored_until_start() {
        let mut rig = rig();

        for i in 0..48u64 {
            rig.tick_tx.push(ClockTick { micros: i * 20_833 });
        }
        rig.app.tick();
        assert_eq!(rig.app.timekeeper.beat_number(), 0);
        assert_eq!(rig.app.timekeeper.tick_in_beat(), 0);
    }

    #[test]
    fn test_clock_ticks_drive_beats_and_tempo() {
        let mut rig = rig();
        rig.event_tx.push(TransportEvent::Start);
        rig.app.tick();

        for i in 0..24u64 {
            rig.tick_tx.push(ClockTick { micros: 1_000_000 + i * 20_833 });
        }
        rig.app.tick();

        assert_eq!(rig.app.timekeeper.beat_number(), 1);
        assert_eq!(rig.app.timekeeper.tick_in_beat(), 0);
        let bpm = rig.app.timekeeper.bpm();
        assert!((bpm - 120.0).abs() < 1.0, "bpm = {}", bpm);
    }

    #[test]
    fn test_beat_led_pulses_and_clears() {
        let mut rig = rig();
        rig.event_tx.push(TransportEvent::Start);
        rig.app.tick();

        for i in 0..24u64 {
            rig.tick_tx.push(ClockTick { micros: 1_000_000 + i * 20_833 });
        }
        rig.app.tick();
        assert!(rig.app.visual.beat_led());

        // Advance the audio timeline past the two-tick pulse
        let pulse = rig.app.timekeeper.samples_per_beat() as u64 * 2 / 24;
        rig.app.timekeeper.increment_samples(pulse as u32 + 1);
        rig.app.tick();
        assert!(!rig.app.visual.beat_led());
    }

    #[test]
    fn test_quant_encoder_changes_grid() {
        let mut rig = rig();
        assert_eq!(rig.app.grid.get(), Quant::Q16);

        // One detent up: Q16 -> Q8
        rig.app.encoder_positions[ENCODER_QUANT] = 4;
        rig.app.tick();
        assert_eq!(rig.app.grid.get(), Quant::Q8);

        // Clamped at the top
        rig.app.encoder_positions[ENCODER_QUANT] = 16;
        rig.app.tick();
        assert_eq!(rig.app.grid.get(), Quant::Q4);
        rig.app.encoder_positions[ENCODER_QUANT] = 20;
        rig.app.tick();
        assert_eq!(rig.app.grid.get(), Quant::Q4);
    }

    #[test]
    fn test_choke_encoder_button_cycles_parameter() {
        let mut rig = rig();
        rig.app.encoder_buttons[ENCODER_CHOKE] = true;
        rig.app.tick();
        // Cycled from LENGTH to ONSET; a turn now edits onset mode
        rig.app.encoder_positions[ENCODER_CHOKE] = 4;
        rig.app.tick();
        assert_eq!(
            rig.app.choke.onset_mode(),
            crate::types::ScheduleMode::Quantized
        );
    }

    #[test]
    fn test_messages_expire() {
        let mut rig = rig();
        rig.app.show_warning("test warning");
        assert!(rig.app.message().is_some());

        rig.app.message_duration = Duration::from_millis(0);
        std::thread::sleep(Duration::from_millis(5));
        rig.app.tick();
        assert!(rig.app.message().is_none());
    }

    #[test]
    fn test_func_press_is_intercepted() {
        let mut rig = rig();
        rig.command_tx
            .push(Command::new(CommandKind::Enable, EffectId::Func));
        rig.app.tick();
        // No warning: the stutter controller owns FUNC
        assert!(rig.app.message().is_none());
    }
}
