// Diagnostics panel: database reachability, table counts, model and caches.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use medsql_app::agent::DiagnosticsReport;

use super::focused_border_style;
use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState, focused: bool) {
    let lines = match &state.diagnostics {
        Some(report) => report_lines(report),
        None => vec![Line::from(Span::styled(
            "Running diagnostics...",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Diagnostics (d to re-run) ")
                .border_style(focused_border_style(focused, Style::default())),
        )
        .wrap(Wrap { trim: false })
        .scroll((state.scroll("diagnostics").min(u16::MAX as usize) as u16, 0));
    frame.render_widget(paragraph, area);
}

fn check(ok: bool) -> Span<'static> {
    if ok {
        Span::styled("✓ ", Style::default().fg(Color::Green))
    } else {
        Span::styled("✗ ", Style::default().fg(Color::Red))
    }
}

fn heading(text: &'static str) -> Line<'static> {
    Line::from(Span::styled(
        text,
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))
}

pub fn report_lines(report: &DiagnosticsReport) -> Vec<Line<'static>> {
    let db = &report.database;
    let mut lines = vec![heading("Database")];

    lines.push(Line::from(vec![
        check(db.reachable),
        Span::raw(format!(
            "{} ({} in {} ms)",
            db.path.display(),
            if db.reachable { "reachable" } else { "unreachable" },
            db.elapsed.as_millis()
        )),
    ]));
    if let Some(error) = &db.error {
        lines.push(Line::from(Span::styled(
            format!("  {error}"),
            Style::default().fg(Color::Red),
        )));
    }
    for (table, rows) in &db.tables {
        lines.push(Line::from(vec![
            check(*rows > 0),
            Span::raw(format!("{table:<28}{rows:>6} rows")),
        ]));
    }

    lines.push(Line::default());
    lines.push(heading("Language model"));
    lines.push(Line::from(vec![
        check(report.llm_configured),
        Span::raw(if report.llm_configured {
            format!("{} (API key set)", report.model)
        } else {
            format!("{} (no API key, set GROQ_API_KEY)", report.model)
        }),
    ]));

    lines.push(Line::default());
    lines.push(heading("Caches"));
    lines.push(Line::from(format!(
        "  schema: {}",
        if report.schema_cached { "cached" } else { "cold" }
    )));
    let qc = report.query_cache;
    lines.push(Line::from(format!(
        "  query results: {} entries, {} hits, {} misses",
        qc.entries, qc.hits, qc.misses
    )));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use medsql_core::cache::CacheStats;
    use medsql_core::db::Diagnostics;

    fn report(reachable: bool) -> DiagnosticsReport {
        DiagnosticsReport {
            database: Diagnostics {
                path: PathBuf::from("medical_practice.db"),
                reachable,
                elapsed: Duration::from_millis(3),
                tables: if reachable {
                    vec![("vendors".into(), 5), ("audit_log".into(), 0)]
                } else {
                    Vec::new()
                },
                error: (!reachable).then(|| "unable to open database file".to_string()),
            },
            model: "llama-3.3-70b-versatile".into(),
            llm_configured: false,
            schema_cached: true,
            query_cache: CacheStats {
                hits: 2,
                misses: 3,
                entries: 3,
            },
        }
    }

    fn text(lines: &[Line<'static>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn reachable_database_lists_tables() {
        let lines = report_lines(&report(true));
        let text = text(&lines);
        assert!(text[1].starts_with("✓ medical_practice.db (reachable"));
        assert!(text[2].starts_with("✓ vendors"));
        assert!(text[3].starts_with("✗ audit_log"));
        assert!(text.iter().any(|l| l.contains("no API key")));
        assert!(text.iter().any(|l| l == "  query results: 3 entries, 2 hits, 3 misses"));
    }

    #[test]
    fn unreachable_database_shows_error() {
        let text = text(&report_lines(&report(false)));
        assert!(text[1].starts_with("✗ "));
        assert_eq!(text[2], "  unable to open database file");
    }

    #[test]
    fn render_without_report() {
        let backend = ratatui::backend::TestBackend::new(60, 8);
        let mut terminal = ratatui::Terminal::new(backend).unwrap();
        let state = ViewState::default();
        terminal
            .draw(|frame| render(frame, frame.area(), &state, true))
            .unwrap();
    }
}
