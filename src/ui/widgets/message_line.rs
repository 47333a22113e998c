use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::app::{App, MessageType};

/// Render the transient message line (or the help hint when idle)
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let (text, color) = match app.message() {
        Some(message) => {
            let color = match message.msg_type {
                MessageType::Info => Color::Gray,
                MessageType::Warning => Color::Yellow,
                MessageType::Error => Color::Red,
            };
            (format!("  {}", message.text), color)
        }
        None => ("  ? help | esc quit".to_string(), Color::DarkGray),
    };

    let widget = Paragraph::new(text)
        .alignment(Alignment::Left)
        .style(Style::default().fg(color));
    frame.render_widget(widget, area);
}
