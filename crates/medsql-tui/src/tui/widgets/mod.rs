// TUI widget modules for each dashboard panel.

use ratatui::style::{Color, Modifier, Style};

pub mod answer;
pub mod diagnostics;
pub mod help_bar;
pub mod question_input;
pub mod quit_confirm;
pub mod schema;
pub mod sidebar;
pub mod status_bar;

/// Border style for a panel, highlighted when it owns keyboard focus.
pub fn focused_border_style(focused: bool, base: Style) -> Style {
    if focused {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        base
    }
}
