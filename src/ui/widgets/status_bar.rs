use ratatui::layout::{Alignment, Rect};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::app::App;

/// Render the status bar
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let bar = app.timekeeper.bar_number();
    let beat_in_bar = app.timekeeper.beat_in_bar();

    let status_text = format!(
        "  {} | {:.1} bpm | {} | bar {} beat {} | quant {}",
        app.transport_str(),
        app.timekeeper.bpm(),
        app.sync_str(),
        bar + 1,
        beat_in_bar + 1,
        app.grid.get().name(),
    );

    let widget = Paragraph::new(status_text).alignment(Alignment::Left);
    frame.render_widget(widget, area);
}
