// Schema panel: tables with row counts, columns and relationships.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use medsql_core::schema::{DatabaseSchema, TableSchema};

use super::focused_border_style;
use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState, focused: bool) {
    let (title, lines) = match (&state.schema, &state.schema_error) {
        (Some(schema), _) => (
            format!(
                " Schema -- {} tables, {} rows ",
                schema.tables.len(),
                schema.total_rows()
            ),
            schema_lines(schema),
        ),
        (None, Some(error)) => (
            " Schema -- unavailable ".to_string(),
            vec![Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            ))],
        ),
        (None, None) => (
            " Schema ".to_string(),
            vec![Line::from(Span::styled(
                "Loading schema...",
                Style::default().fg(Color::DarkGray),
            ))],
        ),
    };

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(focused_border_style(focused, Style::default())),
        )
        .wrap(Wrap { trim: false })
        .scroll((state.scroll("schema").min(u16::MAX as usize) as u16, 0));
    frame.render_widget(paragraph, area);
}

fn schema_lines(schema: &DatabaseSchema) -> Vec<Line<'static>> {
    if schema.tables.is_empty() {
        return vec![Line::from("The database has no tables.")];
    }
    let mut lines = Vec::new();
    for table in &schema.tables {
        lines.extend(table_lines(table));
        lines.push(Line::default());
    }
    lines
}

fn table_lines(table: &TableSchema) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
        Span::styled(
            table.name.clone(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  ({} rows)", table.row_count),
            Style::default().fg(Color::DarkGray),
        ),
    ])];

    for col in &table.columns {
        let mut spans = vec![
            Span::raw(format!("  {:<24}", col.name)),
            Span::styled(
                if col.data_type.is_empty() {
                    "ANY".to_string()
                } else {
                    col.data_type.clone()
                },
                Style::default().fg(Color::Green),
            ),
        ];
        if col.primary_key {
            spans.push(Span::styled(" PK", Style::default().fg(Color::Yellow)));
        }
        if !col.nullable && !col.primary_key {
            spans.push(Span::styled(" NOT NULL", Style::default().fg(Color::DarkGray)));
        }
        lines.push(Line::from(spans));
    }

    for fk in &table.foreign_keys {
        lines.push(Line::from(Span::styled(
            format!("  {} → {}.{}", fk.from, fk.to_table, fk.to_column),
            Style::default().fg(Color::Magenta),
        )));
    }
    lines
}
