// Sidebar panels: example questions grouped by category, and recent questions.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use medsql_app::examples::EXAMPLE_CATEGORIES;

use super::focused_border_style;
use crate::tui::{Focus, ViewState};

fn selected_style() -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(Color::Cyan)
        .add_modifier(Modifier::BOLD)
}

/// Example lines with category headers. Returns the lines and the line index
/// of the selected example.
fn example_lines(selected: usize, focused: bool) -> (Vec<Line<'static>>, usize) {
    let mut lines = Vec::new();
    let mut index = 0;
    let mut selected_line = 0;
    for category in EXAMPLE_CATEGORIES {
        lines.push(Line::from(Span::styled(
            category.name,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )));
        for question in category.questions {
            let style = if focused && index == selected {
                selected_line = lines.len();
                selected_style()
            } else {
                Style::default()
            };
            lines.push(Line::from(Span::styled(format!(" {question}"), style)));
            index += 1;
        }
    }
    (lines, selected_line)
}

pub fn render_examples(frame: &mut Frame, area: Rect, state: &ViewState) {
    let focused = state.focus == Focus::Examples;
    let (lines, selected_line) = example_lines(state.example_selected, focused);

    // Keep the selection on screen.
    let inner_height = area.height.saturating_sub(2) as usize;
    let scroll = (selected_line + 1).saturating_sub(inner_height);

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Examples ")
                .border_style(focused_border_style(focused, Style::default())),
        )
        .scroll((scroll.min(u16::MAX as usize) as u16, 0));
    frame.render_widget(paragraph, area);
}

pub fn render_recent(frame: &mut Frame, area: Rect, state: &ViewState) {
    let focused = state.focus == Focus::Recent;
    let lines: Vec<Line<'static>> = if state.recent.is_empty() {
        vec![Line::from(Span::styled(
            "No questions yet",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        state
            .recent
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let style = if focused && i == state.recent_selected {
                    selected_style()
                } else {
                    Style::default()
                };
                Line::from(Span::styled(format!(" {q}"), style))
            })
            .collect()
    };

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Recent (x to clear) ")
            .border_style(focused_border_style(focused, Style::default())),
    );
    frame.render_widget(paragraph, area);
}
