use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::app::App;
use crate::types::EffectId;
use crate::visual::LedColor;

fn led_color(led: LedColor) -> Color {
    match led {
        LedColor::Off => Color::DarkGray,
        LedColor::Green => Color::Green,
        LedColor::Red => Color::Red,
        LedColor::Blue => Color::Blue,
        LedColor::Cyan => Color::Cyan,
        LedColor::White => Color::White,
    }
}

/// Render the four key LEDs plus the beat LED as colored cells
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let cells = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 5),
            Constraint::Ratio(1, 5),
            Constraint::Ratio(1, 5),
            Constraint::Ratio(1, 5),
            Constraint::Ratio(1, 5),
        ])
        .split(area);

    let keys = [
        ("freeze", app.visual.led(EffectId::Freeze)),
        ("choke", app.visual.led(EffectId::Choke)),
        ("stutter", app.visual.led(EffectId::Stutter)),
        ("func", app.visual.led(EffectId::Func)),
    ];

    for (i, (label, led)) in keys.iter().enumerate() {
        let widget = Paragraph::new("  ●  ")
            .alignment(Alignment::Center)
            .style(Style::default().fg(led_color(*led)))
            .block(Block::default().borders(Borders::ALL).title(format!(" {} ", label)));
        frame.render_widget(widget, cells[i]);
    }

    let beat_color = if app.visual.beat_led() { Color::Yellow } else { Color::DarkGray };
    let beat = Paragraph::new("  ●  ")
        .alignment(Alignment::Center)
        .style(Style::default().fg(beat_color))
        .block(Block::default().borders(Borders::ALL).title(" beat "));
    frame.render_widget(beat, cells[4]);
}
