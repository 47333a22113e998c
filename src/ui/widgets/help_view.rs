use ratatui::layout::{Alignment, Rect};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

const HELP_TEXT: &str = "\
stammer - beat-synced micro-looper

  keys (momentary)
    f          freeze
    c          choke
    s          stutter (hold space first to capture)
    space      func modifier

  encoders (each tap = one detent)
    q / w      freeze parameter down / up
    e / r      stutter parameter down / up
    g / h      choke parameter down / up
    [ / ]      global quantization down / up
    1 2 3 4    encoder buttons (cycle parameter)

  debug
    d          dump trace to stammer-trace.log
    D          clear trace
    i          timing snapshot

  ?            toggle this help
  esc          quit";

/// Render the help view
pub fn render(frame: &mut Frame, area: Rect) {
    let widget = Paragraph::new(HELP_TEXT)
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::ALL).title(" help "));
    frame.render_widget(widget, area);
}
