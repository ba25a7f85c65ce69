// TUI dashboard: layout, input handling, and widget rendering.
//
// The TUI owns a `ViewState` that mirrors what the orchestrator reports. The
// app pushes `UiUpdate` messages over an mpsc channel; the TUI applies them
// to `ViewState` and re-renders at ~30 fps.

pub mod input;
pub mod layout;
pub mod widgets;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{Event, EventStream};
use futures_util::StreamExt;
use ratatui::Frame;
use tokio::sync::mpsc;

use medsql_app::agent::{DiagnosticsReport, ToolActivity, ToolOutcome};
use medsql_app::examples::all_examples;
use medsql_app::protocol::{AgentStatus, TabId, UiUpdate, UserCommand};
use medsql_core::schema::DatabaseSchema;

use layout::build_layout;

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

/// Which region receives arrow keys and Enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Main,
    Examples,
    Recent,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Main => Focus::Examples,
            Focus::Examples => Focus::Recent,
            Focus::Recent => Focus::Main,
        }
    }
}

/// TUI-local state that mirrors the application state for rendering.
#[derive(Default)]
pub struct ViewState {
    /// Database location shown in the status bar.
    pub db_path: String,
    pub status: AgentStatus,
    /// Text being typed into the question box.
    pub input: String,
    /// Whether keystrokes go to the question box.
    pub input_mode: bool,
    pub current_question: Option<String>,
    /// Streamed tokens, replaced by the final markdown once answered.
    pub answer_text: String,
    pub processing_time: Option<Duration>,
    pub tool_activity: Vec<ToolActivity>,
    pub schema: Option<Arc<DatabaseSchema>>,
    pub schema_error: Option<String>,
    pub diagnostics: Option<DiagnosticsReport>,
    /// Recent questions, newest first.
    pub recent: Vec<String>,
    pub notice: Option<String>,
    pub active_tab: TabId,
    /// Per-widget scroll offsets (keyed by widget name).
    pub scroll_offset: HashMap<String, usize>,
    pub focus: Focus,
    pub example_selected: usize,
    pub recent_selected: usize,
    pub confirm_quit: bool,
}

impl ViewState {
    pub fn new(db_path: impl Into<String>) -> Self {
        ViewState {
            db_path: db_path.into(),
            ..Default::default()
        }
    }

    /// The example question under the sidebar cursor.
    pub fn selected_example(&self) -> Option<&'static str> {
        all_examples().get(self.example_selected).map(|(_, q)| *q)
    }

    pub fn selected_recent(&self) -> Option<&str> {
        self.recent.get(self.recent_selected).map(String::as_str)
    }

    pub fn scroll(&self, key: &str) -> usize {
        self.scroll_offset.get(key).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// UiUpdate processing
// ---------------------------------------------------------------------------

/// Apply a single UiUpdate to the ViewState.
pub fn apply_ui_update(state: &mut ViewState, update: UiUpdate) {
    match update {
        UiUpdate::QueryStarted { question } => {
            state.current_question = Some(question);
            state.answer_text.clear();
            state.tool_activity.clear();
            state.processing_time = None;
            state.status = AgentStatus::Running;
            state.active_tab = TabId::Answer;
            state.scroll_offset.insert("answer".to_string(), 0);
            state.notice = None;
        }
        UiUpdate::Token(text) => {
            // Late tokens after a result or cancel are ignored.
            if state.status == AgentStatus::Running {
                state.answer_text.push_str(&text);
            }
        }
        UiUpdate::ToolActivity(activity) => record_activity(&mut state.tool_activity, activity),
        UiUpdate::AnswerReady(answer) => {
            state.answer_text = answer.markdown.clone();
            state.tool_activity = answer.tool_calls.clone();
            state.processing_time = Some(answer.elapsed);
            state.status = AgentStatus::Complete;
        }
        UiUpdate::AnswerFailed(message) => {
            state.answer_text = message;
            state.status = AgentStatus::Error;
        }
        UiUpdate::SchemaLoaded(schema) => {
            state.schema = Some(schema);
            state.schema_error = None;
        }
        UiUpdate::SchemaUnavailable(message) => {
            state.schema = None;
            state.schema_error = Some(message);
        }
        UiUpdate::Diagnostics(report) => {
            state.diagnostics = Some(*report);
        }
        UiUpdate::History(recent) => {
            state.recent = recent;
            state.recent_selected = state
                .recent_selected
                .min(state.recent.len().saturating_sub(1));
        }
        UiUpdate::Cancelled => {
            state.status = AgentStatus::Idle;
            state.notice = Some("Query cancelled".to_string());
        }
        UiUpdate::Notice(message) => {
            state.notice = Some(message);
        }
    }
}

/// A finished tool replaces the pending entry for the same tool.
fn record_activity(log: &mut Vec<ToolActivity>, activity: ToolActivity) {
    if activity.outcome != ToolOutcome::Requested {
        if let Some(pending) = log
            .iter_mut()
            .find(|a| a.outcome == ToolOutcome::Requested && a.tool == activity.tool)
        {
            *pending = activity;
            return;
        }
    }
    log.push(activity);
}

// ---------------------------------------------------------------------------
// Render frame
// ---------------------------------------------------------------------------

/// Render the complete dashboard frame.
pub fn render_frame(frame: &mut Frame, state: &ViewState) {
    let layout = build_layout(frame.area());

    widgets::status_bar::render(frame, layout.status_bar, state);
    widgets::question_input::render(frame, layout.question_input, state);

    let main_focused = state.focus == Focus::Main;
    match state.active_tab {
        TabId::Answer => widgets::answer::render(frame, layout.main_panel, state, main_focused),
        TabId::Schema => widgets::schema::render(frame, layout.main_panel, state, main_focused),
        TabId::Diagnostics => {
            widgets::diagnostics::render(frame, layout.main_panel, state, main_focused)
        }
    }

    widgets::sidebar::render_examples(frame, layout.examples, state);
    widgets::sidebar::render_recent(frame, layout.recent, state);
    widgets::help_bar::render(frame, layout.help_bar, state);

    if state.confirm_quit {
        widgets::quit_confirm::render(frame, frame.area());
    }
}

// ---------------------------------------------------------------------------
// Main TUI loop
// ---------------------------------------------------------------------------

/// Run the TUI event loop.
///
/// This is the main entry point for the terminal UI. It:
/// 1. Initializes the terminal (enters raw mode, enables alternate screen).
/// 2. Installs a panic hook to restore the terminal on crash.
/// 3. Runs an async select loop: UI updates, keyboard input, render ticks.
/// 4. Restores the terminal on clean exit.
pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
    mut view_state: ViewState,
) -> anyhow::Result<()> {
    let mut terminal = ratatui::init();

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = ratatui::restore();
        original_hook(panic_info);
    }));

    let mut event_stream = EventStream::new();

    let mut render_tick = tokio::time::interval(Duration::from_millis(33));
    render_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let result = loop {
        tokio::select! {
            update = ui_rx.recv() => {
                match update {
                    Some(ui_update) => apply_ui_update(&mut view_state, ui_update),
                    // App is shutting down.
                    None => break Ok(()),
                }
            }

            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key_event))) => {
                        if let Some(cmd) = input::handle_key(key_event, &mut view_state) {
                            let quit = cmd == UserCommand::Quit;
                            let _ = cmd_tx.send(cmd).await;
                            if quit {
                                break Ok(());
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(anyhow::Error::from(e).context("terminal input error")),
                    None => break Ok(()),
                }
            }

            _ = render_tick.tick() => {
                if let Err(e) = terminal.draw(|frame| render_frame(frame, &view_state)) {
                    break Err(anyhow::Error::from(e).context("failed to draw frame"));
                }
            }
        }
    };

    ratatui::restore();
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
