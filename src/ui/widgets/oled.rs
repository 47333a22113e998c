use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::visual::BitmapId;

/// Render the virtual OLED: the current bitmap's name, boxed
pub fn render(frame: &mut Frame, area: Rect, bitmap: BitmapId) {
    let widget = Paragraph::new(format!("\n{}", bitmap.name()))
        .alignment(Alignment::Center)
        .style(Style::default().add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL).title(" display "));

    frame.render_widget(widget, area);
}
