mod app;
mod audio;
mod config;
mod control;
mod midi;
mod spsc;
mod timing;
mod trace;
mod types;
mod ui;
mod visual;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use crate::app::App;
use crate::audio::choke::{ChokeEngine, ChokeShared, DEFAULT_FADE_MS};
use crate::audio::engine::AudioEngine;
use crate::audio::freeze::{FreezeEngine, FreezeShared};
use crate::audio::processor::BlockProcessor;
use crate::audio::stutter::{StutterEngine, StutterShared};
use crate::config::Config;
use crate::control::quantize::{QuantGrid, DEFAULT_LOOKAHEAD_SAMPLES};
use crate::midi::MidiHandler;
use crate::timing::TimeKeeper;
use crate::trace::Trace;
use crate::ui::input::InputHandler;
use crate::ui::FrontPanel;
use crate::visual::{VisualState, DISPLAY_QUEUE_LEN};

/// Control loop cadence
const CONTROL_TICK: Duration = Duration::from_millis(2);

/// Render every Nth control iteration (~30 fps)
const RENDER_EVERY: u32 = 16;

/// stammer - beat-synced micro-looper (choke / freeze / stutter)
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// List available audio and MIDI devices
    #[arg(short, long)]
    list_devices: bool,

    /// Audio device index or name
    #[arg(short, long)]
    audio_device: Option<String>,

    /// MIDI clock input index or name
    #[arg(short, long)]
    midi_device: Option<String>,

    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Resolve MIDI device string (index or name) to a port index
fn resolve_midi_device(device_str: &str) -> Result<usize> {
    if let Ok(index) = device_str.parse::<usize>() {
        return Ok(index);
    }

    midi::get_port_by_name(device_str)
}

/// List all available audio and MIDI devices
fn list_all_devices() -> Result<()> {
    println!("stammer - available devices");
    println!("===========================");
    println!();

    println!("Audio Input Devices:");
    match audio::device::list_input_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("  No audio input devices found");
            } else {
                for (i, device) in devices.iter().enumerate() {
                    let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                    println!(
                        "  [{}] {} - {}ch @ {}Hz{}",
                        i,
                        device.name,
                        device.max_input_channels,
                        device.sample_rate,
                        default_marker
                    );
                }
            }
        }
        Err(e) => println!("  Error: {}", e),
    }

    println!();

    println!("MIDI Clock Inputs:");
    match MidiHandler::list_ports() {
        Ok(ports) => {
            if ports.is_empty() {
                println!("  No MIDI input devices found");
            } else {
                for port in ports {
                    println!("  [{}] {}", port.index, port.name);
                }
            }
        }
        Err(e) => println!("  Error: {}", e),
    }

    println!();
    println!("Use --audio-device <index or name> to select an audio device");
    println!("Use --midi-device <index or name> to select the clock source");

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_devices {
        return list_all_devices();
    }

    // Config: explicit path, or ./stammer.yaml when present
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => {
            let default_path = PathBuf::from("stammer.yaml");
            if default_path.exists() {
                Config::from_file(&default_path)?
            } else {
                Config::default()
            }
        }
    };

    // Shared timing and effect state
    let trace = Arc::new(Trace::new());
    let timekeeper = Arc::new(TimeKeeper::new());
    let grid = Arc::new(QuantGrid::new(
        config.quantization(),
        config.defaults.lookahead.unwrap_or(DEFAULT_LOOKAHEAD_SAMPLES),
    ));

    let choke = Arc::new(ChokeShared::new());
    let freeze = Arc::new(FreezeShared::new());
    let stutter = Arc::new(StutterShared::new());

    // Cross-context queues
    let (command_tx, command_rx) = spsc::channel(32);
    let (tick_tx, tick_rx) = spsc::channel(256);
    let (event_tx, event_rx) = spsc::channel(32);
    let (display_tx, display_rx) = spsc::channel(DISPLAY_QUEUE_LEN);

    // The audio-context pipeline
    let fade_ms = config.defaults.fade_ms.unwrap_or(DEFAULT_FADE_MS);
    let processor = BlockProcessor::new(
        timekeeper.clone(),
        StutterEngine::new(stutter.clone()),
        FreezeEngine::new(freeze.clone()),
        ChokeEngine::new(choke.clone(), fade_ms),
    );

    // Audio streams
    let audio_arg = args.audio_device.or_else(|| config.devices.audio.clone());
    let device = audio::device::select_input_device(audio_arg.as_deref())?;
    let mut audio_engine = AudioEngine::with_device(device)?;
    let audio_warning = audio_engine.start(processor)?;

    // External clock
    let mut midi_handler = MidiHandler::new();
    let midi_arg = args.midi_device.or_else(|| config.devices.midiin.clone());
    let midi_error = {
        let port = match &midi_arg {
            Some(device_str) => resolve_midi_device(device_str).ok(),
            None => match MidiHandler::list_ports() {
                Ok(ports) if !ports.is_empty() => Some(0),
                _ => None,
            },
        };

        match port {
            Some(index) => midi_handler
                .connect(index, tick_tx, event_tx, trace.clone())
                .err()
                .map(|e| format!("MIDI connect failed: {}", e)),
            None => Some("No MIDI clock source; tempo stays at 120 BPM".to_string()),
        }
    };

    let visual = VisualState::new(display_tx, choke.clone(), freeze.clone(), stutter.clone());

    let mut app = App::new(
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
        midi_handler,
    )?;

    if let Some(warning) = audio_warning {
        app.show_warning(warning);
    }
    if let Some(warning) = midi_error {
        app.show_warning(warning);
    }

    // Terminal setup. Key-release reporting makes the momentary keys real.
    let release_supported = supports_keyboard_enhancement().unwrap_or(false);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    if release_supported {
        execute!(
            io::stdout(),
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    if !release_supported {
        app.show_warning("Terminal lacks key-release reporting; effect keys latch per tap");
    }

    let mut input = InputHandler::new(config.key_table(), command_tx, release_supported);
    let mut panel = FrontPanel::new(display_rx);

    let result = run_app(&mut terminal, &mut app, &mut input, &mut panel);

    // Restore terminal
    if release_supported {
        let _ = execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags);
    }
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// The ~2 ms control loop with a ~30 fps render
fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    input: &mut InputHandler,
    panel: &mut FrontPanel,
) -> Result<()> {
    let mut iteration = 0u32;

    loop {
        input.handle_input(app)?;
        app.tick();
        panel.update();

        iteration = iteration.wrapping_add(1);
        if iteration % RENDER_EVERY == 0 {
            terminal.draw(|frame| ui::render_ui(frame, app, panel, input.show_help))?;
        }

        if app.should_quit() {
            break;
        }

        thread::sleep(CONTROL_TICK);
    }

    Ok(())
}
