use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the status line, highlighted when there is something to report
pub fn draw_footer(frame: &mut Frame, area: Rect, status: Option<&str>) {
  let line = match status {
    Some(msg) => Line::from(Span::styled(
      format!(" {} ", msg),
      Style::default().fg(Color::White).bg(Color::Red),
    )),
    None => Line::default(),
  };

  frame.render_widget(
    Paragraph::new(line).style(Style::default().bg(Color::Black)),
    area,
  );
}
