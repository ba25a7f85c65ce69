// Application state and orchestration logic.
//
// The central event loop that coordinates user commands from the TUI,
// streamed model output, and progress from the agent task. Keeps track of the
// in-flight question and pushes UI updates to the TUI render loop.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use medsql_core::config::Config;
use medsql_core::sql::preprocess_question;
use medsql_core::store::StateStore;

use crate::agent::{render_failure, AgentAnswer, SqlAgent, ToolActivity};
use crate::export::export_answer;
use crate::history::QueryHistory;
use crate::protocol::{AgentEvent, AgentStatus, LlmEvent, UiUpdate, UserCommand};

/// Number of recent questions shown in the sidebar.
pub const RECENT_QUESTIONS: usize = 5;

/// State-store key holding the most recent export.
pub const LAST_EXPORT_KEY: &str = "last_export";

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub config: Config,
    /// Shared with spawned question tasks.
    pub agent: Arc<SqlAgent>,
    pub history: QueryHistory,
    pub store: Option<Arc<StateStore>>,
    pub current_task: Option<tokio::task::JoinHandle<()>>,
    /// Monotonically increasing counter identifying the current question.
    /// Incremented each time a question is started or cancelled; events from
    /// older generations are discarded.
    pub generation: u64,
    pub status: AgentStatus,
    pub last_answer: Option<Arc<AgentAnswer>>,
    pub export_dir: PathBuf,
    /// Senders cloned into each question task.
    pub llm_tx: mpsc::Sender<LlmEvent>,
    pub agent_tx: mpsc::Sender<AgentEvent>,
}

impl AppState {
    pub fn new(
        config: Config,
        agent: Arc<SqlAgent>,
        store: Option<Arc<StateStore>>,
        llm_tx: mpsc::Sender<LlmEvent>,
        agent_tx: mpsc::Sender<AgentEvent>,
    ) -> Self {
        let history = match &store {
            Some(store) => QueryHistory::with_store(Arc::clone(store)),
            None => QueryHistory::new(),
        };
        let export_dir = config.export.resolve_dir();
        AppState {
            config,
            agent,
            history,
            store,
            current_task: None,
            generation: 0,
            status: AgentStatus::Idle,
            last_answer: None,
            export_dir,
            llm_tx,
            agent_tx,
        }
    }

    /// Abort the in-flight question task, if any.
    pub fn cancel_task(&mut self) {
        if let Some(handle) = self.current_task.take() {
            handle.abort();
            info!("Cancelled in-flight question");
        }
    }

    /// Cancel whatever is running and start answering `question`.
    /// Returns the generation assigned to it.
    pub fn start_question(&mut self, question: String) -> u64 {
        self.cancel_task();
        self.generation += 1;
        self.status = AgentStatus::Running;
        // Same text the agent answers and the store persists.
        self.history.record(&preprocess_question(&question));

        let generation = self.generation;
        let agent = Arc::clone(&self.agent);
        let llm_tx = self.llm_tx.clone();
        let agent_tx = self.agent_tx.clone();

        info!("Question {generation}: {question}");
        self.current_task = Some(tokio::spawn(async move {
            let event = match agent.ask(&question, &llm_tx, &agent_tx, generation).await {
                Ok(answer) => AgentEvent::Finished {
                    answer: Box::new(answer),
                    generation,
                },
                Err(e) => {
                    warn!("Question {generation} failed: {e}");
                    AgentEvent::Failed {
                        message: render_failure(&e),
                        generation,
                    }
                }
            };
            let _ = agent_tx.send(event).await;
        }));

        generation
    }

    fn is_stale(&self, generation: u64) -> bool {
        if generation != self.generation {
            debug!(
                "Discarding stale event (event gen: {}, current gen: {})",
                generation, self.generation
            );
            return true;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the application event loop.
///
/// Listens on three channels using `tokio::select!`:
/// - `llm_rx`: streamed tokens from the model
/// - `agent_rx`: tool progress and final results from the question task
/// - `cmd_rx`: commands from the TUI
///
/// Returns when `Quit` arrives or the command channel closes.
pub async fn run(
    mut llm_rx: mpsc::Receiver<LlmEvent>,
    mut agent_rx: mpsc::Receiver<AgentEvent>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    send_startup(&state, &ui_tx).await;

    // The state holds senders for both channels, so they only close if the
    // state is torn down; stop polling rather than spin if that happens.
    let mut llm_open = true;
    let mut agent_open = true;

    loop {
        tokio::select! {
            // Tokens are always sent before the result that follows them, so
            // draining them first keeps the UI stream in order.
            biased;

            // --- Model tokens ---
            llm_event = llm_rx.recv(), if llm_open => {
                match llm_event {
                    Some(event) => handle_llm_event(&state, event, &ui_tx).await,
                    None => {
                        info!("LLM channel closed");
                        llm_open = false;
                    }
                }
            }

            // --- Agent progress and results ---
            agent_event = agent_rx.recv(), if agent_open => {
                match agent_event {
                    Some(event) => handle_agent_event(&mut state, event, &ui_tx).await,
                    None => {
                        info!("Agent channel closed");
                        agent_open = false;
                    }
                }
            }

            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => {
                        handle_user_command(&mut state, cmd, &ui_tx).await;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    state.cancel_task();
    info!("Application event loop exiting");
    Ok(())
}

/// Initial schema, diagnostics and history for the dashboard.
async fn send_startup(state: &AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    send_schema(state, ui_tx).await;
    let report = state.agent.diagnostics().await;
    let _ = ui_tx.send(UiUpdate::Diagnostics(Box::new(report))).await;
    let _ = ui_tx
        .send(UiUpdate::History(state.history.recent(RECENT_QUESTIONS)))
        .await;
}

async fn send_schema(state: &AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    let update = match state.agent.schema().await {
        Ok(schema) => {
            info!(
                "Schema loaded: {} tables, {} rows",
                schema.tables.len(),
                schema.total_rows()
            );
            UiUpdate::SchemaLoaded(schema)
        }
        Err(e) => {
            warn!("Schema unavailable: {e}");
            UiUpdate::SchemaUnavailable(e.to_string())
        }
    };
    let _ = ui_tx.send(update).await;
}

async fn handle_llm_event(state: &AppState, event: LlmEvent, ui_tx: &mpsc::Sender<UiUpdate>) {
    if state.is_stale(event.generation()) {
        return;
    }

    match event {
        LlmEvent::Token { text, .. } => {
            let _ = ui_tx.send(UiUpdate::Token(text)).await;
        }
        LlmEvent::ToolRequested { name, .. } => {
            let _ = ui_tx
                .send(UiUpdate::ToolActivity(ToolActivity::requested(&name)))
                .await;
        }
    }
}

async fn handle_agent_event(
    state: &mut AppState,
    event: AgentEvent,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    if state.is_stale(event.generation()) {
        return;
    }

    match event {
        AgentEvent::ToolFinished { activity, .. } => {
            let _ = ui_tx.send(UiUpdate::ToolActivity(activity)).await;
        }
        AgentEvent::Finished { answer, .. } => {
            state.current_task = None;
            state.status = AgentStatus::Complete;
            state.history.persist(
                &answer.question,
                answer.elapsed.as_millis() as u64,
                answer.sql.as_deref(),
            );
            let answer: Arc<AgentAnswer> = Arc::from(answer);
            state.last_answer = Some(Arc::clone(&answer));
            let _ = ui_tx.send(UiUpdate::AnswerReady(answer)).await;
            let _ = ui_tx
                .send(UiUpdate::History(state.history.recent(RECENT_QUESTIONS)))
                .await;
        }
        AgentEvent::Failed { message, .. } => {
            state.current_task = None;
            state.status = AgentStatus::Error;
            let _ = ui_tx.send(UiUpdate::AnswerFailed(message)).await;
        }
    }
}

async fn handle_user_command(
    state: &mut AppState,
    cmd: UserCommand,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    match cmd {
        UserCommand::Ask(question) => {
            let question = question.trim().to_string();
            if question.is_empty() {
                let _ = ui_tx
                    .send(UiUpdate::Notice("Please enter a question.".to_string()))
                    .await;
                return;
            }
            state.start_question(question.clone());
            let _ = ui_tx.send(UiUpdate::QueryStarted { question }).await;
            let _ = ui_tx
                .send(UiUpdate::History(state.history.recent(RECENT_QUESTIONS)))
                .await;
        }
        UserCommand::Cancel => {
            if state.status != AgentStatus::Running {
                return;
            }
            state.cancel_task();
            // Anything the aborted task already queued is now stale.
            state.generation += 1;
            state.status = AgentStatus::Idle;
            let _ = ui_tx.send(UiUpdate::Cancelled).await;
        }
        UserCommand::RefreshSchema => {
            state.agent.invalidate_caches();
            send_schema(state, ui_tx).await;
            let _ = ui_tx
                .send(UiUpdate::Notice("Schema reloaded".to_string()))
                .await;
        }
        UserCommand::RunDiagnostics => {
            let report = state.agent.diagnostics().await;
            let _ = ui_tx.send(UiUpdate::Diagnostics(Box::new(report))).await;
        }
        UserCommand::Export => {
            let notice = match &state.last_answer {
                Some(answer) => match export_answer(answer, &state.export_dir, Local::now()) {
                    Ok(paths) => {
                        let names: Vec<String> =
                            paths.iter().map(|p| p.display().to_string()).collect();
                        if let Some(store) = &state.store {
                            let record = serde_json::json!({
                                "question": answer.question,
                                "files": names,
                            });
                            if let Err(e) = store.save_state(LAST_EXPORT_KEY, &record) {
                                warn!("Failed to record export: {e:#}");
                            }
                        }
                        format!("Exported {}", names.join(", "))
                    }
                    Err(e) => {
                        warn!("Export failed: {e:#}");
                        format!("Export failed: {e}")
                    }
                },
                None => "Nothing to export yet".to_string(),
            };
            let _ = ui_tx.send(UiUpdate::Notice(notice)).await;
        }
        UserCommand::ClearHistory => {
            state.history.clear();
            let _ = ui_tx.send(UiUpdate::History(Vec::new())).await;
        }
        UserCommand::Quit => {
            // Handled by the event loop.
        }
    }
}
