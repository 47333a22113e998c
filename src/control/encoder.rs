//! Encoder menu abstraction.
//!
//! The front panel feeds each menu a raw quadrature position and button
//! state; the menu turns them into detent turns (with hysteresis) and
//! tracks the "touched" display window. Events come back to the caller
//! instead of firing callbacks, so all parameter edits stay in one place.

use std::time::{Duration, Instant};

/// Quadrature steps per detent turn
const STEPS_PER_TURN: i32 = 4;

/// How long the parameter display lingers after the last touch
const DISPLAY_COOLDOWN: Duration = Duration::from_secs(2);

/// What an encoder did this update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderEvent {
    /// Whole detent turns since the last event (signed)
    Turn(i32),
    ButtonPress,
    /// First touch after idle: show the parameter display
    Touched,
    /// 2 s since release: return the display to the effect view
    CooldownExpired,
}

/// One encoder's menu state.
#[derive(Debug)]
pub struct EncoderMenu {
    last_position: i32,
    accumulator: i32,
    last_button: bool,
    touched: bool,
    released_at: Option<Instant>,
}

impl EncoderMenu {
    pub fn new(initial_position: i32) -> Self {
        Self {
            last_position: initial_position,
            accumulator: 0,
            last_button: false,
            touched: false,
            released_at: None,
        }
    }

    #[allow(dead_code)]
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Fold in the current hardware state. Events are ordered: touch
    /// first, then button/turn, then cooldown.
    pub fn update(&mut self, position: i32, button_pressed: bool, now: Instant) -> Vec<EncoderEvent> {
        let mut events = Vec::new();

        // Button edge counts as a touch
        if button_pressed && !self.last_button {
            if !self.touched {
                self.touched = true;
                events.push(EncoderEvent::Touched);
            }
            self.released_at = None;
            events.push(EncoderEvent::ButtonPress);
        }
        self.last_button = button_pressed;

        let delta = position - self.last_position;
        if delta != 0 {
            if !self.touched {
                self.touched = true;
                events.push(EncoderEvent::Touched);
            }
            self.released_at = None;

            self.accumulator += delta;
            let turns = self.accumulator / STEPS_PER_TURN;
            if turns != 0 {
                events.push(EncoderEvent::Turn(turns));
                // Keep the remainder so slow motion still accumulates
                self.accumulator %= STEPS_PER_TURN;
            }

            self.last_position = position;
        } else if self.touched && self.released_at.is_none() && !button_pressed {
            // Just went quiet: start the cooldown
            self.released_at = Some(now);
        }

        if let Some(released) = self.released_at {
            if now.duration_since(released) >= DISPLAY_COOLDOWN {
                self.touched = false;
                self.released_at = None;
                events.push(EncoderEvent::CooldownExpired);
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_detent_emits_turn() {
        let mut menu = EncoderMenu::new(0);
        let now = Instant::now();

        let events = menu.update(4, false, now);
        assert!(events.contains(&EncoderEvent::Touched));
        assert!(events.contains(&EncoderEvent::Turn(1)));
    }

    #[test]
    fn test_sub_detent_motion_accumulates() {
        let mut menu = EncoderMenu::new(0);
        let now = Instant::now();

        // Two steps: below the hysteresis threshold
        let events = menu.update(2, false, now);
        assert!(!events.iter().any(|e| matches!(e, EncoderEvent::Turn(_))));

        // Two more complete the detent
        let events = menu.update(4, false, now);
        assert!(events.contains(&EncoderEvent::Turn(1)));
    }

    #[test]
    fn test_reverse_turn_is_negative() {
        let mut menu = EncoderMenu::new(0);
        let now = Instant::now();

        let events = menu.update(-8, false, now);
        assert!(events.contains(&EncoderEvent::Turn(-2)));
    }

    #[test]
    fn test_button_press_edge_only() {
        let mut menu = EncoderMenu::new(0);
        let now = Instant::now();

        let events = menu.update(0, true, now);
        assert!(events.contains(&EncoderEvent::ButtonPress));

        // Held: no repeat
        let events = menu.update(0, true, now);
        assert!(!events.contains(&EncoderEvent::ButtonPress));

        // Release and press again
        menu.update(0, false, now);
        let events = menu.update(0, true, now);
        assert!(events.contains(&EncoderEvent::ButtonPress));
    }

    #[test]
    fn test_cooldown_expires_after_two_seconds() {
        let mut menu = EncoderMenu::new(0);
        let start = Instant::now();

        menu.update(4, false, start);
        assert!(menu.is_touched());

        // Goes quiet: cooldown starts
        menu.update(4, false, start);
        let events = menu.update(4, false, start + Duration::from_millis(1_999));
        assert!(!events.contains(&EncoderEvent::CooldownExpired));
        assert!(menu.is_touched());

        let events = menu.update(4, false, start + Duration::from_secs(2));
        assert!(events.contains(&EncoderEvent::CooldownExpired));
        assert!(!menu.is_touched());
    }

    #[test]
    fn test_motion_resets_cooldown() {
        let mut menu = EncoderMenu::new(0);
        let start = Instant::now();

        menu.update(4, false, start);
        menu.update(4, false, start);

        // More motion 1.5 s in: the window restarts
        menu.update(8, false, start + Duration::from_millis(1_500));
        menu.update(8, false, start + Duration::from_millis(1_600));

        let events = menu.update(8, false, start + Duration::from_millis(2_500));
        assert!(!events.contains(&EncoderEvent::CooldownExpired));

        let events = menu.update(8, false, start + Duration::from_millis(3_700));
        assert!(events.contains(&EncoderEvent::CooldownExpired));
    }
}
