// Keyboard input handling and command dispatch.
//
// Translates crossterm key events into UserCommand messages sent to the
// app orchestrator, or into local ViewState mutations (question editing,
// tab switching, scrolling, sidebar selection).

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use medsql_app::examples::all_examples;
use medsql_app::protocol::{TabId, UserCommand};

use super::{Focus, ViewState};

/// Lines moved by PageUp/PageDown.
const PAGE_SIZE: usize = 20;

/// Handle a keyboard event.
///
/// Returns `Some(UserCommand)` when the key press should be forwarded to the
/// app orchestrator, `None` when it was handled locally.
pub fn handle_key(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    // crossterm reports releases on some platforms.
    if key_event.kind != KeyEventKind::Press {
        return None;
    }

    if key_event.modifiers.contains(KeyModifiers::CONTROL) && key_event.code == KeyCode::Char('c') {
        return Some(UserCommand::Quit);
    }

    if view_state.confirm_quit {
        return handle_confirm_quit(key_event, view_state);
    }

    if view_state.input_mode {
        return handle_input_mode(key_event, view_state);
    }

    match key_event.code {
        KeyCode::Char('i') | KeyCode::Char('/') => {
            view_state.input_mode = true;
            None
        }

        KeyCode::Char('1') => switch_tab(view_state, TabId::Answer),
        KeyCode::Char('2') => switch_tab(view_state, TabId::Schema),
        KeyCode::Char('3') => switch_tab(view_state, TabId::Diagnostics),

        KeyCode::Tab => {
            view_state.focus = view_state.focus.next();
            None
        }

        KeyCode::Up | KeyCode::Char('k') => {
            move_up(view_state);
            None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            move_down(view_state);
            None
        }
        KeyCode::PageUp => {
            scroll_up(view_state, PAGE_SIZE);
            None
        }
        KeyCode::PageDown => {
            scroll_down(view_state, PAGE_SIZE);
            None
        }

        KeyCode::Enter => match view_state.focus {
            Focus::Main => None,
            Focus::Examples => view_state
                .selected_example()
                .map(|q| UserCommand::Ask(q.to_string())),
            Focus::Recent => view_state
                .selected_recent()
                .map(|q| UserCommand::Ask(q.to_string())),
        },

        KeyCode::Char('c') => Some(UserCommand::Cancel),
        KeyCode::Char('r') => Some(UserCommand::RefreshSchema),
        KeyCode::Char('d') => {
            view_state.active_tab = TabId::Diagnostics;
            Some(UserCommand::RunDiagnostics)
        }
        KeyCode::Char('e') => Some(UserCommand::Export),
        KeyCode::Char('x') => Some(UserCommand::ClearHistory),

        KeyCode::Esc => {
            view_state.notice = None;
            view_state.focus = Focus::Main;
            None
        }

        KeyCode::Char('q') => {
            view_state.confirm_quit = true;
            None
        }

        _ => None,
    }
}

/// `y`/`q` confirm, `n`/Esc cancel, everything else is swallowed.
fn handle_confirm_quit(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Char('q') | KeyCode::Char('Q') => {
            Some(UserCommand::Quit)
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            view_state.confirm_quit = false;
            None
        }
        _ => None,
    }
}

/// Enter submits a non-blank question, Esc leaves the box keeping the text.
fn handle_input_mode(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    match key_event.code {
        KeyCode::Esc => {
            view_state.input_mode = false;
            None
        }
        KeyCode::Enter => {
            let question = view_state.input.trim().to_string();
            if question.is_empty() {
                return None;
            }
            view_state.input.clear();
            view_state.input_mode = false;
            Some(UserCommand::Ask(question))
        }
        KeyCode::Backspace => {
            view_state.input.pop();
            None
        }
        KeyCode::Char(c) => {
            view_state.input.push(c);
            None
        }
        _ => None,
    }
}

fn switch_tab(view_state: &mut ViewState, tab: TabId) -> Option<UserCommand> {
    view_state.active_tab = tab;
    None
}

fn move_up(view_state: &mut ViewState) {
    match view_state.focus {
        Focus::Main => scroll_up(view_state, 1),
        Focus::Examples => {
            view_state.example_selected = view_state.example_selected.saturating_sub(1);
        }
        Focus::Recent => {
            view_state.recent_selected = view_state.recent_selected.saturating_sub(1);
        }
    }
}

fn move_down(view_state: &mut ViewState) {
    match view_state.focus {
        Focus::Main => scroll_down(view_state, 1),
        Focus::Examples => {
            let last = all_examples().len().saturating_sub(1);
            view_state.example_selected = (view_state.example_selected + 1).min(last);
        }
        Focus::Recent => {
            let last = view_state.recent.len().saturating_sub(1);
            view_state.recent_selected = (view_state.recent_selected + 1).min(last);
        }
    }
}

/// Scroll state key for the active tab.
fn active_widget_key(view_state: &ViewState) -> &'static str {
    match view_state.active_tab {
        TabId::Answer => "answer",
        TabId::Schema => "schema",
        TabId::Diagnostics => "diagnostics",
    }
}

fn scroll_up(view_state: &mut ViewState, lines: usize) {
    let key = active_widget_key(view_state);
    let offset = view_state.scroll_offset.entry(key.to_string()).or_insert(0);
    *offset = offset.saturating_sub(lines);
}

fn scroll_down(view_state: &mut ViewState, lines: usize) {
    let key = active_widget_key(view_state);
    let offset = view_state.scroll_offset.entry(key.to_string()).or_insert(0);
    *offset = offset.saturating_add(lines);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
