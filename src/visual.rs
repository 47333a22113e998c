//! Visual feedback: bitmap ids for the display, colors for the key LEDs.
//!
//! Owned entirely by the control loop. Display updates travel through an
//! SPSC queue to the front panel; LED state is plain fields the renderer
//! reads. What to show is a deterministic function of effect states and
//! the last-activated effect.

use std::sync::Arc;

use crate::audio::choke::ChokeShared;
use crate::audio::freeze::FreezeShared;
use crate::audio::stutter::{StutterShared, StutterState};
use crate::spsc::Producer;
use crate::types::EffectId;

/// Display queue capacity
pub const DISPLAY_QUEUE_LEN: usize = 16;

/// Handle for every pre-authored framebuffer image the display knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BitmapId {
    #[default]
    Default = 0,
    FreezeActive = 1,
    ChokeActive = 2,
    Quant32 = 3,
    Quant16 = 4,
    Quant8 = 5,
    Quant4 = 6,
    ChokeLengthFree = 7,
    ChokeLengthQuant = 8,
    ChokeOnsetFree = 9,
    ChokeOnsetQuant = 10,
    FreezeLengthFree = 11,
    FreezeLengthQuant = 12,
    FreezeOnsetFree = 13,
    FreezeOnsetQuant = 14,
    StutterIdleWithLoop = 15,
    StutterCapturing = 16,
    StutterPlaying = 17,
    StutterOnsetFree = 18,
    StutterOnsetQuant = 19,
    StutterLengthFree = 20,
    StutterLengthQuant = 21,
    StutterCaptureStartFree = 22,
    StutterCaptureStartQuant = 23,
    StutterCaptureEndFree = 24,
    StutterCaptureEndQuant = 25,
}

impl BitmapId {
    pub fn name(self) -> &'static str {
        match self {
            BitmapId::Default => "READY",
            BitmapId::FreezeActive => "FREEZE",
            BitmapId::ChokeActive => "CHOKE",
            BitmapId::Quant32 => "QUANT 1/32",
            BitmapId::Quant16 => "QUANT 1/16",
            BitmapId::Quant8 => "QUANT 1/8",
            BitmapId::Quant4 => "QUANT 1/4",
            BitmapId::ChokeLengthFree => "CHOKE LEN FREE",
            BitmapId::ChokeLengthQuant => "CHOKE LEN QUANT",
            BitmapId::ChokeOnsetFree => "CHOKE ONSET FREE",
            BitmapId::ChokeOnsetQuant => "CHOKE ONSET QUANT",
            BitmapId::FreezeLengthFree => "FREEZE LEN FREE",
            BitmapId::FreezeLengthQuant => "FREEZE LEN QUANT",
            BitmapId::FreezeOnsetFree => "FREEZE ONSET FREE",
            BitmapId::FreezeOnsetQuant => "FREEZE ONSET QUANT",
            BitmapId::StutterIdleWithLoop => "STUTTER LOOP READY",
            BitmapId::StutterCapturing => "STUTTER CAPTURE",
            BitmapId::StutterPlaying => "STUTTER PLAY",
            BitmapId::StutterOnsetFree => "STUTTER ONSET FREE",
            BitmapId::StutterOnsetQuant => "STUTTER ONSET QUANT",
            BitmapId::StutterLengthFree => "STUTTER LEN FREE",
            BitmapId::StutterLengthQuant => "STUTTER LEN QUANT",
            BitmapId::StutterCaptureStartFree => "STUTTER C-START FREE",
            BitmapId::StutterCaptureStartQuant => "STUTTER C-START QUANT",
            BitmapId::StutterCaptureEndFree => "STUTTER C-END FREE",
            BitmapId::StutterCaptureEndQuant => "STUTTER C-END QUANT",
        }
    }
}

/// Key LED colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedColor {
    Off,
    /// Idle momentary key
    #[default]
    Green,
    /// Choke engaged, stutter capturing
    Red,
    /// Stutter playing
    Blue,
    /// Freeze engaged
    Cyan,
    /// Stutter loop parked
    White,
}

/// Bitmap for a stutter machine state
pub fn stutter_state_bitmap(state: StutterState) -> BitmapId {
    match state {
        StutterState::IdleNoLoop => BitmapId::Default,
        StutterState::IdleWithLoop => BitmapId::StutterIdleWithLoop,
        StutterState::WaitCaptureStart | StutterState::Capturing | StutterState::WaitCaptureEnd => {
            BitmapId::StutterCapturing
        }
        StutterState::WaitPlaybackOnset
        | StutterState::Playing
        | StutterState::WaitPlaybackLength => BitmapId::StutterPlaying,
    }
}

/// Number of front-panel keys with LEDs
pub const NUM_KEYS: usize = 4;

/// Fixed key position per effect
pub fn key_index(effect: EffectId) -> Option<usize> {
    match effect {
        EffectId::Freeze => Some(0),
        EffectId::Choke => Some(1),
        EffectId::Stutter => Some(2),
        EffectId::Func => Some(3),
        EffectId::None => None,
    }
}

/// Control-side visual state: LED colors, display priority, beat LED.
pub struct VisualState {
    display_tx: Producer<BitmapId>,
    leds: [LedColor; NUM_KEYS],
    beat_led: bool,
    last_activated: EffectId,

    choke: Arc<ChokeShared>,
    freeze: Arc<FreezeShared>,
    stutter: Arc<StutterShared>,
}

impl VisualState {
    pub fn new(
        display_tx: Producer<BitmapId>,
        choke: Arc<ChokeShared>,
        freeze: Arc<FreezeShared>,
        stutter: Arc<StutterShared>,
    ) -> Self {
        Self {
            display_tx,
            leds: [LedColor::Green, LedColor::Green, LedColor::Green, LedColor::Off],
            beat_led: false,
            last_activated: EffectId::None,
            choke,
            freeze,
            stutter,
        }
    }

    /// Push a bitmap to the display. A full queue drops the frame; the
    /// next refresh repaints.
    pub fn show_bitmap(&mut self, bitmap: BitmapId) {
        self.display_tx.push(bitmap);
    }

    pub fn set_led(&mut self, effect: EffectId, color: LedColor) {
        if let Some(index) = key_index(effect) {
            self.leds[index] = color;
        }
    }

    pub fn led(&self, effect: EffectId) -> LedColor {
        key_index(effect).map(|i| self.leds[i]).unwrap_or(LedColor::Off)
    }

    pub fn set_beat_led(&mut self, on: bool) {
        self.beat_led = on;
    }

    pub fn beat_led(&self) -> bool {
        self.beat_led
    }

    pub fn set_last_activated(&mut self, effect: EffectId) {
        self.last_activated = effect;
    }

    pub fn last_activated(&self) -> EffectId {
        self.last_activated
    }

    /// Repaint the display from effect states.
    ///
    /// Last-activated wins while it is still engaged; otherwise any other
    /// engaged effect shows; otherwise the default screen.
    pub fn refresh(&mut self) {
        let bitmap = self.current_bitmap();
        self.show_bitmap(bitmap);
    }

    fn current_bitmap(&self) -> BitmapId {
        let freeze_active = self.freeze.is_enabled();
        let choke_active = self.choke.is_enabled();
        let stutter_state = self.stutter.state();
        let stutter_active = !stutter_state.is_idle() || stutter_state == StutterState::IdleWithLoop;

        match self.last_activated {
            EffectId::Freeze if freeze_active => return BitmapId::FreezeActive,
            EffectId::Choke if choke_active => return BitmapId::ChokeActive,
            EffectId::Stutter if stutter_active => return stutter_state_bitmap(stutter_state),
            _ => {}
        }

        if freeze_active {
            BitmapId::FreezeActive
        } else if choke_active {
            BitmapId::ChokeActive
        } else if !stutter_state.is_idle() {
            stutter_state_bitmap(stutter_state)
        } else {
            BitmapId::Default
        }
    }
}
