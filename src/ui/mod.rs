pub mod input;
pub mod widgets;

use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::Frame;

use crate::app::App;
use crate::spsc::Consumer;
use crate::visual::BitmapId;

/// The display collaborator: drains the bitmap queue and remembers the
/// image currently "on screen".
pub struct FrontPanel {
    display_rx: Consumer<BitmapId>,
    current_bitmap: BitmapId,
}

impl FrontPanel {
    pub fn new(display_rx: Consumer<BitmapId>) -> Self {
        Self {
            display_rx,
            current_bitmap: BitmapId::Default,
        }
    }

    /// Apply pending display messages (latest wins)
    pub fn update(&mut self) {
        while let Some(bitmap) = self.display_rx.pop() {
            self.current_bitmap = bitmap;
        }
    }

    pub fn current_bitmap(&self) -> BitmapId {
        self.current_bitmap
    }
}

/// Render the whole front panel
pub fn render_ui(frame: &mut Frame, app: &App, panel: &FrontPanel, show_help: bool) {
    if show_help {
        widgets::help_view::render(frame, frame.area());
        return;
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Length(4),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(frame.area());

    widgets::oled::render(frame, rows[0], panel.current_bitmap());
    widgets::led_row::render(frame, rows[1], app);
    widgets::status_bar::render(frame, rows[2], app);
    widgets::message_line::render(frame, rows[3], app);
}
