// Message types exchanged between the orchestrator, the agent task and the
// TUI.
//
// Every event produced on behalf of a question carries the generation that
// was current when the question was asked, so the orchestrator can drop
// output from a question that has since been cancelled or superseded.

use std::sync::Arc;

use medsql_core::schema::DatabaseSchema;

use crate::agent::{AgentAnswer, DiagnosticsReport, ToolActivity};

pub use medsql_llm::client::LlmEvent;

// ---------------------------------------------------------------------------
// TUI -> App
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Ask(String),
    /// Abort the in-flight question, if any.
    Cancel,
    RefreshSchema,
    RunDiagnostics,
    /// Write the last answer to the export directory.
    Export,
    ClearHistory,
    Quit,
}

// ---------------------------------------------------------------------------
// Agent task -> App
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum AgentEvent {
    ToolFinished {
        activity: ToolActivity,
        generation: u64,
    },
    Finished {
        answer: Box<AgentAnswer>,
        generation: u64,
    },
    /// The question failed; `message` is ready-to-display markdown.
    Failed { message: String, generation: u64 },
}

impl AgentEvent {
    pub fn generation(&self) -> u64 {
        match self {
            AgentEvent::ToolFinished { generation, .. }
            | AgentEvent::Finished { generation, .. }
            | AgentEvent::Failed { generation, .. } => *generation,
        }
    }
}

// ---------------------------------------------------------------------------
// App -> TUI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum UiUpdate {
    /// A new question is being processed; clears the answer panel.
    QueryStarted { question: String },
    Token(String),
    ToolActivity(ToolActivity),
    AnswerReady(Arc<AgentAnswer>),
    AnswerFailed(String),
    /// The in-flight question was aborted; nothing more will arrive for it.
    Cancelled,
    SchemaLoaded(Arc<DatabaseSchema>),
    /// Startup or reload could not read the schema.
    SchemaUnavailable(String),
    Diagnostics(Box<DiagnosticsReport>),
    /// Recent questions, newest first.
    History(Vec<String>),
    /// Transient one-line message for the status bar.
    Notice(String),
}

/// Progress of the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    Complete,
    Error,
}

impl AgentStatus {
    pub fn label(self) -> &'static str {
        match self {
            AgentStatus::Idle => "Idle",
            AgentStatus::Running => "Thinking...",
            AgentStatus::Complete => "Done",
            AgentStatus::Error => "Error",
        }
    }
}

/// Tabs of the main panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TabId {
    #[default]
    Answer,
    Schema,
    Diagnostics,
}

impl TabId {
    pub const ALL: [TabId; 3] = [TabId::Answer, TabId::Schema, TabId::Diagnostics];

    pub fn title(self) -> &'static str {
        match self {
            TabId::Answer => "Answer",
            TabId::Schema => "Schema",
            TabId::Diagnostics => "Diagnostics",
        }
    }
}
