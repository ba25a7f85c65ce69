// Status bar widget: database, agent status, tab indicator, notices.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use medsql_app::protocol::{AgentStatus, TabId};

use crate::tui::ViewState;

/// Render the status bar into the given area.
///
/// Layout: [app name] [database] [status] | [tab bar] [notice]
pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let mut spans = vec![Span::styled(
        " MedSQL ",
        Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];

    let db = if state.db_path.is_empty() {
        "no database"
    } else {
        state.db_path.as_str()
    };
    spans.push(Span::styled(format!(" {db} "), Style::default().fg(Color::Gray)));

    let (dot, color) = status_indicator(state.status);
    spans.push(Span::styled(format!("{dot} "), Style::default().fg(color)));
    spans.push(Span::styled(state.status.label(), Style::default().fg(Color::White)));

    spans.push(Span::styled(" | ", Style::default().fg(Color::Gray)));
    spans.extend(tab_spans(state.active_tab));

    if let Some(notice) = &state.notice {
        spans.push(Span::styled(
            format!(" {notice}"),
            Style::default().fg(Color::Yellow),
        ));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}

pub fn status_indicator(status: AgentStatus) -> (&'static str, Color) {
    match status {
        AgentStatus::Idle => ("●", Color::DarkGray),
        AgentStatus::Running => ("●", Color::Yellow),
        AgentStatus::Complete => ("●", Color::Green),
        AgentStatus::Error => ("●", Color::Red),
    }
}

/// "[1:Answer] [2:Schema] [3:Diagnostics]" with the active tab highlighted.
pub fn tab_spans(active: TabId) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for (i, tab) in TabId::ALL.into_iter().enumerate() {
        let style = if tab == active {
            Style::default()
                .fg(Color::Black)
                .bg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::styled(format!("[{}:{}]", i + 1, tab.title()), style));
        spans.push(Span::raw(" "));
    }
    spans
}
