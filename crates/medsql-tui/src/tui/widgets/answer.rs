// Answer panel: the current question, tool activity, and the streamed or
// final markdown answer.
//
// Auto-scrolls to the bottom while the agent is thinking; otherwise honours
// the "answer" scroll offset.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use medsql_app::agent::ToolActivity;
use medsql_app::protocol::AgentStatus;

use super::focused_border_style;
use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState, focused: bool) {
    let lines = build_lines(state);

    let inner_height = area.height.saturating_sub(2) as usize;
    let scroll = if state.status == AgentStatus::Running && lines.len() > inner_height {
        lines.len() - inner_height
    } else {
        state.scroll("answer")
    };

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(build_title(state))
                .border_style(focused_border_style(focused, border_style(state.status))),
        )
        .wrap(Wrap { trim: false })
        .scroll((scroll.min(u16::MAX as usize) as u16, 0));
    frame.render_widget(paragraph, area);
}

fn build_title(state: &ViewState) -> Line<'static> {
    let mut spans = vec![Span::styled(
        " Answer",
        Style::default().add_modifier(Modifier::BOLD),
    )];
    match (state.status, state.processing_time) {
        (AgentStatus::Complete, Some(elapsed)) => spans.push(Span::styled(
            format!(" -- processed in {:.2} seconds ", elapsed.as_secs_f64()),
            Style::default().fg(Color::Green),
        )),
        (AgentStatus::Running, _) => spans.push(Span::styled(
            " -- thinking... ",
            Style::default().fg(Color::Yellow),
        )),
        (AgentStatus::Error, _) => {
            spans.push(Span::styled(" -- error ", Style::default().fg(Color::Red)))
        }
        _ => spans.push(Span::raw(" ")),
    }
    Line::from(spans)
}

fn border_style(status: AgentStatus) -> Style {
    match status {
        AgentStatus::Running => Style::default().fg(Color::Yellow),
        AgentStatus::Error => Style::default().fg(Color::Red),
        _ => Style::default(),
    }
}

fn build_lines(state: &ViewState) -> Vec<Line<'static>> {
    let Some(question) = &state.current_question else {
        return vec![
            Line::from(Span::styled(
                "Ask a question about the practice's finances, vendors or patients.",
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(Span::styled(
                "Press i to type, or Tab to pick an example from the sidebar.",
                Style::default().fg(Color::DarkGray),
            )),
        ];
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Q: ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled(question.clone(), Style::default().add_modifier(Modifier::BOLD)),
        ]),
        Line::default(),
    ];

    if !state.tool_activity.is_empty() {
        lines.extend(state.tool_activity.iter().map(activity_line));
        lines.push(Line::default());
    }

    if state.answer_text.is_empty() {
        if state.status == AgentStatus::Running {
            lines.push(Line::from(Span::styled(
                "Thinking...",
                Style::default().fg(Color::Yellow),
            )));
        }
    } else {
        lines.extend(markdown_lines(&state.answer_text));
    }
    lines
}

fn activity_line(activity: &ToolActivity) -> Line<'static> {
    let color = if activity.is_error() {
        Color::Red
    } else {
        Color::DarkGray
    };
    Line::from(Span::styled(activity.line(), Style::default().fg(color)))
}

/// Per-line markdown styling. Inline emphasis is left as-is.
pub fn markdown_lines(text: &str) -> Vec<Line<'static>> {
    let mut in_code = false;
    let mut lines = Vec::new();
    for raw in text.lines() {
        let trimmed = raw.trim_start();
        if trimmed.starts_with("```") {
            in_code = !in_code;
            lines.push(Line::from(Span::styled(
                raw.to_string(),
                Style::default().fg(Color::DarkGray),
            )));
            continue;
        }
        let style = if in_code {
            Style::default().fg(Color::Green)
        } else if trimmed.starts_with('#') {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else if trimmed.starts_with('|') {
            Style::default().fg(Color::White)
        } else if trimmed.starts_with('>') {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::ITALIC)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(raw.to_string(), style)));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use medsql_app::agent::ToolOutcome;

    fn buffer_text(terminal: &ratatui::Terminal<ratatui::backend::TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn markdown_styles_by_line_kind() {
        let lines = markdown_lines("# Profit\nplain\n```sql\nSELECT 1\n```\n| a |\n> note");
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0].spans[0].style.fg, Some(Color::Cyan));
        assert_eq!(lines[1].spans[0].style.fg, None);
        assert_eq!(lines[3].spans[0].style.fg, Some(Color::Green));
        assert_eq!(lines[5].spans[0].style.fg, Some(Color::White));
        assert_eq!(lines[6].spans[0].style.fg, Some(Color::Yellow));
    }

    #[test]
    fn code_fence_does_not_leak_heading_style() {
        let lines = markdown_lines("```\n# not a heading\n```");
        assert_eq!(lines[1].spans[0].style.fg, Some(Color::Green));
    }

    #[test]
    fn idle_shows_hint() {
        let lines = build_lines(&ViewState::default());
        assert!(lines[0].spans[0].content.contains("Ask a question"));
    }

    #[test]
    fn running_shows_activity_and_thinking() {
        let mut state = ViewState::default();
        state.current_question = Some("Who owns the practice?".into());
        state.status = AgentStatus::Running;
        state.tool_activity.push(ToolActivity {
            tool: "run_sql_query".into(),
            summary: "run SELECT owner_name FROM practice_owners".into(),
            outcome: ToolOutcome::Failed("no such table".into()),
            elapsed: Duration::from_millis(2),
        });

        let lines = build_lines(&state);
        assert_eq!(lines[2].spans[0].style.fg, Some(Color::Red));
        assert_eq!(lines.last().unwrap().spans[0].content, "Thinking...");
    }

    #[test]
    fn title_shows_processing_time() {
        let backend = ratatui::backend::TestBackend::new(80, 10);
        let mut terminal = ratatui::Terminal::new(backend).unwrap();
        let mut state = ViewState::default();
        state.current_question = Some("q".into());
        state.answer_text = "Net profit was $80,000.".into();
        state.status = AgentStatus::Complete;
        state.processing_time = Some(Duration::from_millis(2300));
        terminal
            .draw(|frame| render(frame, frame.area(), &state, false))
            .unwrap();
        let text = buffer_text(&terminal);
        assert!(text.contains("processed in 2.30 seconds"));
        assert!(text.contains("Net profit was $80,000."));
    }

    #[test]
    fn streaming_auto_scrolls_without_panic() {
        let backend = ratatui::backend::TestBackend::new(60, 6);
        let mut terminal = ratatui::Terminal::new(backend).unwrap();
        let mut state = ViewState::default();
        state.current_question = Some("q".into());
        state.status = AgentStatus::Running;
        state.answer_text = (0..40).map(|i| format!("line {i}\n")).collect();
        terminal
            .draw(|frame| render(frame, frame.area(), &state, true))
            .unwrap();
        assert!(buffer_text(&terminal).contains("line 39"));
    }
}
