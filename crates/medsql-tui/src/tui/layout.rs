// Screen layout: panel arrangement and sizing.
//
// +--------------------------------------------------+
// | Status Bar (1 row)                                |
// +--------------------------------------------------+
// | Question Input (3 rows)                           |
// +-------------------------+------------------------+
// | Main Panel (65%)         | Sidebar (35%)          |
// |                          | +- Examples (60%) ----+|
// |                          | +- Recent (40%) ------+|
// +-------------------------+------------------------+
// | Help Bar (1 row)                                  |
// +--------------------------------------------------+

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Resolved screen areas for each dashboard zone.
#[derive(Debug, Clone)]
pub struct AppLayout {
    /// Database, agent status and tabs.
    pub status_bar: Rect,
    pub question_input: Rect,
    /// Tab-switched content: answer, schema or diagnostics.
    pub main_panel: Rect,
    pub examples: Rect,
    pub recent: Rect,
    /// Keyboard shortcut hints.
    pub help_bar: Rect,
}

pub fn build_layout(area: Rect) -> AppLayout {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status bar
            Constraint::Length(3), // question input
            Constraint::Min(8),    // main + sidebar
            Constraint::Length(1), // help bar
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(vertical[2]);

    let sidebar = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(horizontal[1]);

    AppLayout {
        status_bar: vertical[0],
        question_input: vertical[1],
        main_panel: horizontal[0],
        examples: sidebar[0],
        recent: sidebar[1],
        help_bar: vertical[3],
    }
}
