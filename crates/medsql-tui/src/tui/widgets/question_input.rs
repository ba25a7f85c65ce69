// Question input box.

use ratatui::layout::{Position, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::tui::ViewState;

const PLACEHOLDER: &str = "Ask a question about the practice's data...";

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let border = if state.input_mode {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let title = if state.input_mode {
        " Question (Enter to ask, Esc to leave) "
    } else {
        " Question (press i to type) "
    };

    let line = if state.input.is_empty() && !state.input_mode {
        Line::from(Span::styled(PLACEHOLDER, Style::default().fg(Color::DarkGray)))
    } else {
        Line::from(visible_tail(&state.input, area.width.saturating_sub(3) as usize))
    };

    let paragraph = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(border),
    );
    frame.render_widget(paragraph, area);

    if state.input_mode && area.height > 2 {
        let shown = visible_tail(&state.input, area.width.saturating_sub(3) as usize);
        let x = area.x + 1 + shown.chars().count() as u16;
        frame.set_cursor_position(Position::new(x.min(area.right().saturating_sub(2)), area.y + 1));
    }
}

/// The last `width` characters of `input`, so the cursor end stays visible.
fn visible_tail(input: &str, width: usize) -> String {
    let len = input.chars().count();
    input.chars().skip(len.saturating_sub(width)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_input_shows_the_end() {
        assert_eq!(visible_tail("abcdef", 4), "cdef");
        assert_eq!(visible_tail("abc", 10), "abc");
        assert_eq!(visible_tail("", 0), "");
    }

    #[test]
    fn placeholder_when_idle() {
        let backend = ratatui::backend::TestBackend::new(60, 3);
        let mut terminal = ratatui::Terminal::new(backend).unwrap();
        let state = ViewState::default();
        terminal
            .draw(|frame| render(frame, frame.area(), &state))
            .unwrap();
        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(text.contains("Ask a question"));
    }

    #[test]
    fn typing_renders_text() {
        let backend = ratatui::backend::TestBackend::new(60, 3);
        let mut terminal = ratatui::Terminal::new(backend).unwrap();
        let mut state = ViewState::default();
        state.input_mode = true;
        state.input = "Who owns the most equity?".into();
        terminal
            .draw(|frame| render(frame, frame.area(), &state))
            .unwrap();
        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(text.contains("Who owns the most equity?"));
        assert!(!text.contains("Ask a question"));
    }
}
