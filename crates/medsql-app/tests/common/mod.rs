// Shared fixtures: a seeded practice database and a scripted chat model.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use medsql_app::agent::{AgentOptions, SqlAgent};
use medsql_core::config::*;
use medsql_core::db::Database;
use medsql_core::seed::init_database;
use medsql_llm::client::{
    ChatModel, ChatOutcome, ChatRequest, FunctionCall, LlmError, LlmEvent, ToolCall, Usage,
};

/// Token counts every scripted completion reports.
pub const TURN_USAGE: Usage = Usage {
    prompt_tokens: 100,
    completion_tokens: 10,
};

/// One scripted model turn.
pub enum Turn {
    Text(String),
    Tools(Vec<ToolCall>),
    Fail(LlmError),
    /// Never completes; used to exercise cancellation.
    Hang,
    /// Never completes, but a detached sender streams `text` after `delay`,
    /// the way a stream reader can outlive the question that started it.
    Late { text: String, delay: Duration },
}

pub struct ScriptedModel {
    turns: Mutex<VecDeque<Turn>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<Turn>) -> Self {
        ScriptedModel {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, turn: Turn) {
        self.turns.lock().unwrap().push_back(turn);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        tx: &mpsc::Sender<LlmEvent>,
        generation: u64,
    ) -> Result<ChatOutcome, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let turn = self.turns.lock().unwrap().pop_front();

        match turn {
            Some(Turn::Text(content)) => {
                for piece in content.split_inclusive(' ') {
                    tx.send(LlmEvent::Token {
                        text: piece.to_string(),
                        generation,
                    })
                    .await
                    .map_err(|_| LlmError::Cancelled)?;
                }
                Ok(ChatOutcome {
                    content,
                    finish_reason: Some("stop".into()),
                    usage: TURN_USAGE,
                    ..Default::default()
                })
            }
            Some(Turn::Tools(tool_calls)) => {
                for call in &tool_calls {
                    tx.send(LlmEvent::ToolRequested {
                        name: call.function.name.clone(),
                        generation,
                    })
                    .await
                    .map_err(|_| LlmError::Cancelled)?;
                }
                Ok(ChatOutcome {
                    tool_calls,
                    finish_reason: Some("tool_calls".into()),
                    usage: TURN_USAGE,
                    ..Default::default()
                })
            }
            Some(Turn::Fail(err)) => Err(err),
            Some(Turn::Hang) => loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            },
            Some(Turn::Late { text, delay }) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx
                        .send(LlmEvent::ToolRequested {
                            name: "run_sql_query".into(),
                            generation,
                        })
                        .await;
                    let _ = tx.send(LlmEvent::Token { text, generation }).await;
                });
                loop {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
            }
            None => Err(LlmError::EmptyResponse),
        }
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

pub fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        function: FunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        },
    }
}

pub fn run_sql(id: &str, query: &str) -> Turn {
    let args = serde_json::json!({ "query": query }).to_string();
    Turn::Tools(vec![tool_call(id, "run_sql_query", &args)])
}

pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("medsql-app-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// A freshly seeded practice database under a per-test temp dir.
pub fn seeded_database(name: &str) -> (Database, PathBuf) {
    let path = temp_dir(name).join("medical_practice.db");
    init_database(&path).unwrap();
    let db = Database::open(&path, 2, Duration::from_secs(5)).unwrap();
    (db, path)
}

pub fn options() -> AgentOptions {
    AgentOptions {
        max_tool_rounds: 4,
        max_result_rows: 100,
        rewrite_notes: true,
        sample_rows: 3,
        max_tokens: 512,
        temperature: 0.1,
        schema_ttl: Duration::from_secs(300),
        query_cache_capacity: 10,
    }
}

pub fn agent_with(name: &str, turns: Vec<Turn>, options: AgentOptions) -> (SqlAgent, Arc<ScriptedModel>) {
    let (db, path) = seeded_database(name);
    let model = Arc::new(ScriptedModel::new(turns));
    let agent = SqlAgent::new(Some(db), path, Arc::clone(&model) as Arc<dyn ChatModel>, options);
    (agent, model)
}

pub fn agent(name: &str, turns: Vec<Turn>) -> (SqlAgent, Arc<ScriptedModel>) {
    agent_with(name, turns, options())
}

pub fn test_config(db_path: &std::path::Path, export_dir: &std::path::Path) -> Config {
    Config {
        database: DatabaseSettings {
            url: format!("sqlite:///{}", db_path.display()),
            pool_size: 2,
            connection_timeout_secs: 5,
            sample_rows: 3,
            state_path: ":memory:".into(),
        },
        llm: LlmSettings {
            api_url: "http://localhost/v1/chat/completions".into(),
            model: "scripted".into(),
            max_tokens: 512,
            temperature: 0.1,
            request_timeout_secs: 60,
        },
        agent: AgentSettings {
            max_tool_rounds: 4,
            max_result_rows: 100,
            rewrite_notes: true,
        },
        cache: CacheSettings {
            query_results_capacity: 10,
            schema_ttl_secs: 300,
        },
        logging: LoggingSettings::default(),
        export: ExportSettings {
            dir: Some(export_dir.display().to_string()),
        },
        credentials: CredentialsConfig::default(),
    }
}

/// Drain everything currently buffered on `rx`.
pub fn drain<T>(rx: &mut mpsc::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}
