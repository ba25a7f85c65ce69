// Question-answering agent.
//
// Drives one question from plain English to a markdown answer: load the
// schema, let the model call database tools for a bounded number of rounds,
// then post-process its final answer with rewrite notes and data-quality
// remarks. Blocking SQLite work runs on the blocking thread pool so the
// streaming client and the orchestrator stay responsive.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use medsql_core::cache::{CacheStats, QueryResultCache};
use medsql_core::config::Config;
use medsql_core::db::{Database, Diagnostics, QueryResult};
use medsql_core::insights::append_data_quality_insights;
use medsql_core::schema::{DatabaseSchema, SchemaCache};
use medsql_core::sql::{
    add_distinct_for_joins, extract_sql_block, preprocess_question, relax_string_matching,
};
use medsql_llm::client::{ChatMessage, ChatModel, ChatRequest, LlmError, ToolCall, Usage};
use medsql_llm::prompt::{build_user_prompt, system_prompt};
use medsql_llm::tools::{tool_definitions, ToolInvocation};

use crate::protocol::{AgentEvent, LlmEvent};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Database connection failed. Please check that the database exists and is properly initialized.")]
    NoDatabase,

    #[error("Please enter a question.")]
    EmptyQuestion,

    #[error("Failed to retrieve database schema. Check database connection and initialization. ({0})")]
    Schema(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("the model kept requesting tools for {rounds} rounds without answering")]
    ToolRoundsExhausted { rounds: usize },
}

/// Markdown shown to the user for a failed question.
pub fn render_failure(err: &AgentError) -> String {
    match err {
        AgentError::NoDatabase | AgentError::EmptyQuestion | AgentError::Schema(_) => {
            err.to_string()
        }
        other => format!(
            "\n## Error Processing Query\n\
             \n\
             I encountered an issue while processing your question: `{other}`\n\
             \n\
             ### Troubleshooting suggestions:\n\
             1. Try rephrasing your question with more specific details\n\
             2. Check if you're referring to tables or columns that exist in the database\n\
             3. If asking about specific values, double-check spellings and formatting\n\
             4. For complex questions, try breaking them down into simpler parts\n\
             \n\
             If the problem persists, please contact technical support.\n"
        ),
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The model asked for the tool; it has not run yet.
    Requested,
    Succeeded(String),
    Failed(String),
}

/// One tool call as shown in the activity log.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolActivity {
    pub tool: String,
    pub summary: String,
    pub outcome: ToolOutcome,
    pub elapsed: Duration,
}

impl ToolActivity {
    pub fn requested(tool: &str) -> Self {
        ToolActivity {
            tool: tool.to_string(),
            summary: tool.to_string(),
            outcome: ToolOutcome::Requested,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failed(_))
    }

    /// Single display line, e.g. `✓ run SELECT ... (3 rows, 12 ms)`.
    pub fn line(&self) -> String {
        match &self.outcome {
            ToolOutcome::Requested => format!("… {}", self.summary),
            ToolOutcome::Succeeded(detail) => format!(
                "✓ {} ({detail}, {} ms)",
                self.summary,
                self.elapsed.as_millis()
            ),
            ToolOutcome::Failed(detail) => format!("✗ {}: {detail}", self.summary),
        }
    }
}

/// A fully processed answer.
#[derive(Debug, Clone)]
pub struct AgentAnswer {
    pub question: String,
    /// The model's final text as streamed.
    pub response: String,
    /// `response` plus rewrite notes and data-quality remarks.
    pub markdown: String,
    /// SQL shown in the answer, or else the last query the model ran.
    pub sql: Option<String>,
    pub improved_sql: Option<String>,
    pub rewrite_notes: Vec<String>,
    pub last_result: Option<Arc<QueryResult>>,
    pub tool_calls: Vec<ToolActivity>,
    pub elapsed: Duration,
    pub usage: Usage,
}

impl AgentAnswer {
    /// What post-processing added after the streamed response.
    pub fn appendix(&self) -> &str {
        self.markdown.strip_prefix(&self.response).unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub database: Diagnostics,
    pub model: String,
    pub llm_configured: bool,
    pub schema_cached: bool,
    pub query_cache: CacheStats,
}

// ---------------------------------------------------------------------------
// SqlAgent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub max_tool_rounds: usize,
    pub max_result_rows: usize,
    pub rewrite_notes: bool,
    pub sample_rows: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub schema_ttl: Duration,
    pub query_cache_capacity: usize,
}

impl AgentOptions {
    pub fn from_config(config: &Config) -> Self {
        AgentOptions {
            max_tool_rounds: config.agent.max_tool_rounds.max(1),
            max_result_rows: config.agent.max_result_rows.max(1),
            rewrite_notes: config.agent.rewrite_notes,
            sample_rows: config.database.sample_rows,
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            schema_ttl: Duration::from_secs(config.cache.schema_ttl_secs),
            query_cache_capacity: config.cache.query_results_capacity,
        }
    }
}

pub struct SqlAgent {
    db: Option<Database>,
    db_path: PathBuf,
    model: Arc<dyn ChatModel>,
    schema_cache: Arc<SchemaCache>,
    query_cache: Arc<QueryResultCache>,
    options: AgentOptions,
}

impl SqlAgent {
    pub fn new(
        db: Option<Database>,
        db_path: PathBuf,
        model: Arc<dyn ChatModel>,
        options: AgentOptions,
    ) -> Self {
        SqlAgent {
            db,
            db_path,
            model,
            schema_cache: Arc::new(SchemaCache::new(options.schema_ttl)),
            query_cache: Arc::new(QueryResultCache::new(options.query_cache_capacity)),
            options,
        }
    }

    /// Open and validate the configured database. A missing, unreadable or
    /// table-less database is logged and leaves the agent without one; every question then fails
    /// with [`AgentError::NoDatabase`].
    pub fn connect(config: &Config, model: Arc<dyn ChatModel>) -> Self {
        let options = AgentOptions::from_config(config);
        let timeout = Duration::from_secs(config.database.connection_timeout_secs);

        let (db_path, db) = match config.database.file_path() {
            Ok(path) => match Database::open(&path, config.database.pool_size, timeout)
                .and_then(|db| db.validate().map(|_| db))
            {
                Ok(db) => (path, Some(db)),
                Err(e) => {
                    warn!("Database unavailable: {e}");
                    (path, None)
                }
            },
            Err(e) => {
                warn!("Invalid database URL: {e}");
                (PathBuf::from(&config.database.url), None)
            }
        };

        SqlAgent::new(db, db_path, model, options)
    }

    pub fn has_database(&self) -> bool {
        self.db.is_some()
    }

    pub fn db_path(&self) -> &std::path::Path {
        &self.db_path
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// The cached schema, introspecting the database if needed.
    pub async fn schema(&self) -> Result<Arc<DatabaseSchema>, AgentError> {
        let db = self.db.clone().ok_or(AgentError::NoDatabase)?;
        let cache = Arc::clone(&self.schema_cache);
        let sample_rows = self.options.sample_rows;

        tokio::task::spawn_blocking(move || cache.get_or_load(&db, sample_rows))
            .await
            .map_err(|e| AgentError::Schema(e.to_string()))?
            .map_err(|e| AgentError::Schema(e.to_string()))
    }

    /// Drop cached schema and query results.
    pub fn invalidate_caches(&self) {
        self.schema_cache.invalidate();
        self.query_cache.clear();
    }

    pub async fn diagnostics(&self) -> DiagnosticsReport {
        let database = match self.db.clone() {
            Some(db) => {
                let path = self.db_path.clone();
                tokio::task::spawn_blocking(move || db.diagnostics())
                    .await
                    .unwrap_or_else(|e| unreachable_database(path, e.to_string()))
            }
            None => unreachable_database(
                self.db_path.clone(),
                "database file not found; run `medsql init-db`".to_string(),
            ),
        };

        DiagnosticsReport {
            database,
            model: self.model.model_id().to_string(),
            llm_configured: self.model.is_configured(),
            schema_cached: self.schema_cache.peek().is_some(),
            query_cache: self.query_cache.stats(),
        }
    }

    /// Answer `question`, streaming model tokens to `llm_tx` and tool
    /// progress to `agent_tx`. Every event is tagged with `generation`.
    pub async fn ask(
        &self,
        question: &str,
        llm_tx: &mpsc::Sender<LlmEvent>,
        agent_tx: &mpsc::Sender<AgentEvent>,
        generation: u64,
    ) -> Result<AgentAnswer, AgentError> {
        let started = Instant::now();
        let db = self.db.clone().ok_or(AgentError::NoDatabase)?;

        let question = preprocess_question(question);
        if question.is_empty() {
            return Err(AgentError::EmptyQuestion);
        }

        let schema = self.schema().await?;
        let mut messages = vec![
            ChatMessage::system(system_prompt()),
            ChatMessage::user(build_user_prompt(&schema.render_markdown(), &question)),
        ];
        let tools = tool_definitions();

        let mut usage = Usage::default();
        let mut activities = Vec::new();
        let mut last_query: Option<(String, Arc<QueryResult>)> = None;

        for round in 0..self.options.max_tool_rounds {
            let request = ChatRequest {
                messages: messages.clone(),
                tools: tools.clone(),
                max_tokens: self.options.max_tokens,
                temperature: self.options.temperature,
            };
            let outcome = self.model.stream_chat(&request, llm_tx, generation).await?;
            usage.add(outcome.usage);

            if outcome.tool_calls.is_empty() {
                let answer = self.finish(
                    question,
                    outcome.content,
                    last_query,
                    activities,
                    usage,
                    started.elapsed(),
                );
                info!(
                    "Query processed in {:.2} seconds ({} prompt + {} completion tokens, {} round(s))",
                    answer.elapsed.as_secs_f64(),
                    answer.usage.prompt_tokens,
                    answer.usage.completion_tokens,
                    round + 1
                );
                return Ok(answer);
            }

            debug!(
                "Round {}: model requested {} tool call(s)",
                round + 1,
                outcome.tool_calls.len()
            );
            messages.push(ChatMessage::assistant(
                outcome.content,
                outcome.tool_calls.clone(),
            ));

            for call in &outcome.tool_calls {
                let (content, activity, executed) = self.execute_tool(&db, &schema, call).await;
                if executed.is_some() {
                    last_query = executed;
                }
                let _ = agent_tx
                    .send(AgentEvent::ToolFinished {
                        activity: activity.clone(),
                        generation,
                    })
                    .await;
                activities.push(activity);
                messages.push(ChatMessage::tool(call.id.clone(), content));
            }
        }

        Err(AgentError::ToolRoundsExhausted {
            rounds: self.options.max_tool_rounds,
        })
    }

    /// Run one tool call. Returns the text handed back to the model, the
    /// activity record, and for successful queries the SQL and its result.
    async fn execute_tool(
        &self,
        db: &Database,
        schema: &DatabaseSchema,
        call: &ToolCall,
    ) -> (String, ToolActivity, Option<(String, Arc<QueryResult>)>) {
        let started = Instant::now();
        let invocation = match ToolInvocation::parse(call) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!("Rejected tool call: {e}");
                let activity = ToolActivity {
                    tool: call.function.name.clone(),
                    summary: call.function.name.clone(),
                    outcome: ToolOutcome::Failed(e.to_string()),
                    elapsed: started.elapsed(),
                };
                return (format!("Error: {e}"), activity, None);
            }
        };

        let mut executed = None;
        let (content, outcome) = match &invocation {
            ToolInvocation::ListTables => {
                let lines: Vec<String> = schema
                    .tables
                    .iter()
                    .map(|t| format!("- {} ({} rows)", t.name, t.row_count))
                    .collect();
                let detail = format!("{} tables", lines.len());
                (lines.join("\n"), ToolOutcome::Succeeded(detail))
            }
            ToolInvocation::DescribeTable { table_name } => match schema.table(table_name) {
                Some(table) => (
                    table.describe(),
                    ToolOutcome::Succeeded(format!("{} columns", table.columns.len())),
                ),
                None => {
                    let message = format!("unknown table `{table_name}`");
                    (
                        format!(
                            "Error: {message}. Available tables: {}",
                            schema.table_names().join(", ")
                        ),
                        ToolOutcome::Failed(message),
                    )
                }
            },
            ToolInvocation::RunSqlQuery { query, limit } => {
                let max_rows = limit
                    .unwrap_or(self.options.max_result_rows)
                    .clamp(1, self.options.max_result_rows);
                let db = db.clone();
                let cache = Arc::clone(&self.query_cache);
                let sql = query.clone();

                match tokio::task::spawn_blocking(move || cache.get_or_run(&db, &sql, max_rows))
                    .await
                {
                    Ok(Ok((result, cached))) => {
                        let detail = format!(
                            "{} rows{}",
                            result.len(),
                            if cached { ", cached" } else { "" }
                        );
                        let content = format_query_result(&result);
                        executed = Some((query.clone(), result));
                        (content, ToolOutcome::Succeeded(detail))
                    }
                    Ok(Err(e)) => {
                        warn!("Query failed: {e}");
                        (format!("Error: {e}"), ToolOutcome::Failed(e.to_string()))
                    }
                    Err(e) => {
                        warn!("Query task failed: {e}");
                        (
                            format!("Error: query task failed: {e}"),
                            ToolOutcome::Failed(e.to_string()),
                        )
                    }
                }
            }
        };

        let activity = ToolActivity {
            tool: invocation.name().to_string(),
            summary: invocation.summary(),
            outcome,
            elapsed: started.elapsed(),
        };
        (content, activity, executed)
    }

    fn finish(
        &self,
        question: String,
        response: String,
        last_query: Option<(String, Arc<QueryResult>)>,
        tool_calls: Vec<ToolActivity>,
        usage: Usage,
        elapsed: Duration,
    ) -> AgentAnswer {
        let (last_sql, last_result) = match last_query {
            Some((sql, result)) => (Some(sql), Some(result)),
            None => (None, None),
        };
        let sql = extract_sql_block(&response).or(last_sql);

        let mut rewrite_notes = Vec::new();
        let mut improved_sql = None;
        if let Some(original) = &sql {
            let (distinct, distinct_note) = add_distinct_for_joins(original);
            let (relaxed, match_note) = relax_string_matching(&distinct);
            rewrite_notes.extend(
                [distinct_note, match_note]
                    .into_iter()
                    .flatten()
                    .map(str::to_string),
            );
            if relaxed != *original {
                improved_sql = Some(relaxed);
            }
        }

        let mut markdown = response.clone();
        if self.options.rewrite_notes {
            if let Some(improved) = &improved_sql {
                for note in &rewrite_notes {
                    markdown.push_str(&format!("\n\n> 🔍 Query improved: {note}."));
                }
                markdown.push_str(&format!("\n\n```sql\n{improved}\n```\n"));
            }
        }
        let markdown = append_data_quality_insights(&markdown, last_result.as_deref());

        AgentAnswer {
            question,
            response,
            markdown,
            sql,
            improved_sql,
            rewrite_notes,
            last_result,
            tool_calls,
            elapsed,
            usage,
        }
    }
}

fn unreachable_database(path: PathBuf, error: String) -> Diagnostics {
    Diagnostics {
        path,
        reachable: false,
        elapsed: Duration::ZERO,
        tables: Vec::new(),
        error: Some(error),
    }
}

/// Query output as handed back to the model.
fn format_query_result(result: &QueryResult) -> String {
    if result.is_empty() {
        return format!(
            "The query returned no rows. Columns: {}",
            result.columns.join(", ")
        );
    }
    format!("{} rows\n\n{}", result.len(), result.to_markdown_table())
}
