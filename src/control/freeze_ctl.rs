//! Freeze controller. Same press/release contract as the choke
//! controller, but engage means "loop the buffer" rather than "mute".

use std::sync::Arc;

use crate::audio::freeze::FreezeShared;
use crate::control::choke_ctl::step_mode;
use crate::control::quantize::QuantGrid;
use crate::timing::TimeKeeper;
use crate::trace::{Trace, TraceId};
use crate::types::{Command, CommandKind, EffectId, ScheduleMode};
use crate::visual::{BitmapId, LedColor, VisualState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeParam {
    Length,
    Onset,
}

pub struct FreezeController {
    effect: Arc<FreezeShared>,
    timekeeper: Arc<TimeKeeper>,
    grid: Arc<QuantGrid>,
    trace: Arc<Trace>,
    parameter: FreezeParam,
}

impl FreezeController {
    pub fn new(
        effect: Arc<FreezeShared>,
        timekeeper: Arc<TimeKeeper>,
        grid: Arc<QuantGrid>,
        trace: Arc<Trace>,
    ) -> Self {
        Self {
            effect,
            timekeeper,
            grid,
            trace,
            parameter: FreezeParam::Length,
        }
    }

    pub fn length_bitmap(mode: ScheduleMode) -> BitmapId {
        match mode {
            ScheduleMode::Free => BitmapId::FreezeLengthFree,
            ScheduleMode::Quantized => BitmapId::FreezeLengthQuant,
        }
    }

    pub fn onset_bitmap(mode: ScheduleMode) -> BitmapId {
        match mode {
            ScheduleMode::Free => BitmapId::FreezeOnsetFree,
            ScheduleMode::Quantized => BitmapId::FreezeOnsetQuant,
        }
    }

    pub fn handle_button_press(&mut self, cmd: &Command, visual: &mut VisualState) -> bool {
        if cmd.target != EffectId::Freeze {
            return false;
        }
        if !matches!(cmd.kind, CommandKind::Enable | CommandKind::Toggle) {
            return false;
        }

        let length_mode = self.effect.length_mode();

        match self.effect.onset_mode() {
            ScheduleMode::Free => {
                self.effect.engage();
                self.trace.record(TraceId::FreezeEngage, 0);

                if length_mode == ScheduleMode::Quantized {
                    let duration = self.grid.quantized_duration(&self.timekeeper);
                    let release = self.timekeeper.sample_position() + duration as u64;
                    self.effect.release_at.schedule(release);
                }

                visual.set_led(EffectId::Freeze, LedColor::Cyan);
                visual.set_last_activated(EffectId::Freeze);
                visual.show_bitmap(BitmapId::FreezeActive);
            }
            ScheduleMode::Quantized => {
                let onset = self.grid.onset_sample(&self.timekeeper);
                self.effect.onset_at.schedule(onset);

                if length_mode == ScheduleMode::Quantized {
                    let duration = self.grid.quantized_duration(&self.timekeeper);
                    self.effect.release_at.schedule(onset + duration as u64);
                }
            }
        }

        true
    }

    pub fn handle_button_release(&mut self, cmd: &Command) -> bool {
        if cmd.target != EffectId::Freeze {
            return false;
        }
        if cmd.kind != CommandKind::Disable {
            return false;
        }

        if self.effect.length_mode() == ScheduleMode::Quantized {
            return true;
        }

        self.effect.onset_at.cancel();
        false
    }

    pub fn update_visual_feedback(&mut self, visual: &mut VisualState) {
        let enabled = self.effect.is_enabled();

        if enabled && visual.last_activated() != EffectId::Freeze {
            visual.set_led(EffectId::Freeze, LedColor::Cyan);
            visual.set_last_activated(EffectId::Freeze);
            visual.show_bitmap(BitmapId::FreezeActive);
            self.trace.record(TraceId::FreezeEngage, 1);
        }

        if !enabled
            && visual.last_activated() == EffectId::Freeze
            && self.effect.length_mode() == ScheduleMode::Quantized
        {
            visual.set_led(EffectId::Freeze, LedColor::Green);
            visual.set_last_activated(EffectId::None);
            visual.refresh();
            self.trace.record(TraceId::FreezeRelease, 1);
        }
    }

    pub fn current_parameter(&self) -> FreezeParam {
        self.parameter
    }

    pub fn cycle_parameter(&mut self) -> BitmapId {
        self.parameter = match self.parameter {
            FreezeParam::Length => FreezeParam::Onset,
            FreezeParam::Onset => FreezeParam::Length,
        };
        self.parameter_bitmap()
    }

    pub fn adjust_parameter(&mut self, delta: i32) -> Option<BitmapId> {
        match self.parameter {
            FreezeParam::Length => {
                let current = self.effect.length_mode();
                let next = step_mode(current, delta);
                if next != current {
                    self.effect.set_length_mode(next);
                    return Some(Self::length_bitmap(next));
                }
            }
            FreezeParam::Onset => {
                let current = self.effect.onset_mode();
                let next = step_mode(current, delta);
                if next != current {
                    self.effect.set_onset_mode(next);
                    return Some(Self::onset_bitmap(next));
                }
            }
        }
        None
    }

    pub fn parameter_bitmap(&self) -> BitmapId {
        match self.parameter {
            FreezeParam::Length => Self::length_bitmap(self.effect.length_mode()),
            FreezeParam::Onset => Self::onset_bitmap(self.effect.onset_mode()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spsc;
    use crate::visual::DISPLAY_QUEUE_LEN;

    struct Rig {
        controller: FreezeController,
        effect: Arc<FreezeShared>,
        timekeeper: Arc<TimeKeeper>,
        visual: VisualState,
    }

    fn rig() -> Rig {
        let timekeeper = Arc::new(TimeKeeper::new());
        timekeeper.set_samples_per_beat(22_050);
        let grid = Arc::new(QuantGrid::new(crate::types::Quant::Q16, 128));
        let effect = Arc::new(FreezeShared::new());
        let trace = Arc::new(Trace::new());

        let (display_tx, _display_rx) = spsc::channel(DISPLAY_QUEUE_LEN);
        let visual = VisualState::new(
            display_tx,
            Arc::new(crate::audio::choke::ChokeShared::new()),
            effect.clone(),
            Arc::new(crate::audio::stutter::StutterShared::new()),
        );

        let controller =
            FreezeController::new(effect.clone(), timekeeper.clone(), grid, trace);
        Rig { controller, effect, timekeeper, visual }
    }

    fn press() -> Command {
        Command::new(CommandKind::Enable, EffectId::Freeze)
    }

    fn release() -> Command {
        Command::new(CommandKind::Disable, EffectId::Freeze)
    }

    #[test]
    fn test_free_press_engages_and_paints() {
        let mut rig = rig();
        assert!(rig.controller.handle_button_press(&press(), &mut rig.visual));
        assert!(rig.effect.is_enabled());
        assert_eq!(rig.visual.led(EffectId::Freeze), LedColor::Cyan);
        assert_eq!(rig.visual.last_activated(), EffectId::Freeze);
    }

    #[test]
    fn test_quantized_onset_scheduled() {
        let mut rig = rig();
        rig.effect.set_onset_mode(ScheduleMode::Quantized);
        rig.timekeeper.increment_tick();
        rig.timekeeper.increment_samples(2_048);

        rig.controller.handle_button_press(&press(), &mut rig.visual);
        assert!(!rig.effect.is_enabled());
        assert_eq!(rig.effect.onset_at.get(), 2_048 + (5_512 - 918) as u64 - 128);
    }

    #[test]
    fn test_release_with_free_length_falls_through() {
        let mut rig = rig();
        rig.controller.handle_button_press(&press(), &mut rig.visual);
        assert!(!rig.controller.handle_button_release(&release()));
    }

    #[test]
    fn test_release_absorbed_under_quantized_length() {
        let mut rig = rig();
        rig.effect.set_length_mode(ScheduleMode::Quantized);
        rig.controller.handle_button_press(&press(), &mut rig.visual);
        assert!(rig.controller.handle_button_release(&release()));
        assert!(rig.effect.is_enabled());
    }

    #[test]
    fn test_visual_edges() {
        let mut rig = rig();
        rig.effect.set_length_mode(ScheduleMode::Quantized);

        rig.effect.engage();
        rig.controller.update_visual_feedback(&mut rig.visual);
        assert_eq!(rig.visual.last_activated(), EffectId::Freeze);

        rig.effect.release();
        rig.controller.update_visual_feedback(&mut rig.visual);
        assert_eq!(rig.visual.last_activated(), EffectId::None);
        assert_eq!(rig.visual.led(EffectId::Freeze), LedColor::Green);
    }

    #[test]
    fn test_parameter_editing() {
        let mut rig = rig();
        assert_eq!(rig.controller.parameter_bitmap(), BitmapId::FreezeLengthFree);

        assert_eq!(rig.controller.adjust_parameter(1), Some(BitmapId::FreezeLengthQuant));
        assert_eq!(rig.effect.length_mode(), ScheduleMode::Quantized);

        rig.controller.cycle_parameter();
        assert_eq!(rig.controller.current_parameter(), FreezeParam::Onset);
    }
}
