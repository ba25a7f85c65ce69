// Orchestrator behaviour: startup updates, question lifecycle, cancellation,
// stale output, schema reloads, diagnostics, export and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use medsql_app::agent::SqlAgent;
use medsql_app::app::{run, AppState, LAST_EXPORT_KEY};
use medsql_app::protocol::{UiUpdate, UserCommand};
use medsql_core::store::StateStore;
use medsql_llm::client::LlmError;

use common::*;

struct Harness {
    cmd_tx: mpsc::Sender<UserCommand>,
    ui_rx: mpsc::Receiver<UiUpdate>,
    handle: JoinHandle<anyhow::Result<()>>,
    model: Arc<ScriptedModel>,
    db_path: std::path::PathBuf,
    export_dir: std::path::PathBuf,
}

fn start(name: &str, turns: Vec<Turn>, store: Option<Arc<StateStore>>) -> Harness {
    let (db, path) = seeded_database(name);
    let export_dir = temp_dir(&format!("{name}-exports"));
    let config = test_config(&path, &export_dir);
    let model = Arc::new(ScriptedModel::new(turns));
    let agent = Arc::new(SqlAgent::new(Some(db), path.clone(), model.clone(), options()));

    let (llm_tx, llm_rx) = mpsc::channel(256);
    let (agent_tx, agent_rx) = mpsc::channel(64);
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    let state = AppState::new(config, agent, store, llm_tx, agent_tx);
    let handle = tokio::spawn(run(llm_rx, agent_rx, cmd_rx, ui_tx, state));
    Harness {
        cmd_tx,
        ui_rx,
        handle,
        model,
        db_path: path,
        export_dir,
    }
}

async fn next_update(rx: &mut mpsc::Receiver<UiUpdate>) -> UiUpdate {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for a UI update")
        .expect("UI channel closed")
}

/// Collect updates up to and including the first one matching `done`.
async fn collect_until(
    rx: &mut mpsc::Receiver<UiUpdate>,
    done: impl Fn(&UiUpdate) -> bool,
) -> Vec<UiUpdate> {
    let mut seen = Vec::new();
    loop {
        let update = next_update(rx).await;
        let finished = done(&update);
        seen.push(update);
        if finished {
            return seen;
        }
    }
}

async fn skip_startup(rx: &mut mpsc::Receiver<UiUpdate>) {
    collect_until(rx, |u| matches!(u, UiUpdate::History(_))).await;
}

#[tokio::test]
async fn startup_reports_schema_diagnostics_and_history() {
    let mut h = start("startup", Vec::new(), None);

    match next_update(&mut h.ui_rx).await {
        UiUpdate::SchemaLoaded(schema) => assert_eq!(schema.tables.len(), 8),
        other => panic!("expected SchemaLoaded, got {other:?}"),
    }
    match next_update(&mut h.ui_rx).await {
        UiUpdate::Diagnostics(report) => {
            assert!(report.database.reachable);
            assert_eq!(report.model, "scripted");
            assert!(report.schema_cached);
        }
        other => panic!("expected Diagnostics, got {other:?}"),
    }
    assert!(matches!(next_update(&mut h.ui_rx).await, UiUpdate::History(h) if h.is_empty()));
}

#[tokio::test]
async fn question_streams_tokens_then_answer() {
    let text = "Total revenue for Q4 2024 was higher than Q3.";
    let mut h = start(
        "ask",
        vec![
            run_sql("call_1", "SELECT period_start, total_revenue FROM profit_loss_reports"),
            Turn::Text(text.into()),
        ],
        None,
    );
    skip_startup(&mut h.ui_rx).await;

    h.cmd_tx
        .send(UserCommand::Ask("  Compare total revenue between Q3 and Q4 2024 ".into()))
        .await
        .unwrap();
    let updates = collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::AnswerReady(_))).await;

    assert!(matches!(
        &updates[0],
        UiUpdate::QueryStarted { question } if question == "Compare total revenue between Q3 and Q4 2024"
    ));
    let streamed: String = updates
        .iter()
        .filter_map(|u| match u {
            UiUpdate::Token(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, text);
    assert!(updates.iter().any(|u| matches!(u, UiUpdate::ToolActivity(a) if a.tool == "run_sql_query")));

    let UiUpdate::AnswerReady(answer) = updates.last().unwrap() else {
        unreachable!()
    };
    assert!(answer.markdown.starts_with(text));
    assert!(answer.last_result.is_some());

    match next_update(&mut h.ui_rx).await {
        UiUpdate::History(recent) => {
            assert_eq!(recent, vec!["Compare total revenue between Q3 and Q4 2024"])
        }
        other => panic!("expected History, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_discards_the_in_flight_question() {
    let mut h = start(
        "cancel",
        vec![Turn::Hang, Turn::Text("Second answer.".into())],
        None,
    );
    skip_startup(&mut h.ui_rx).await;

    h.cmd_tx.send(UserCommand::Ask("first".into())).await.unwrap();
    collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::QueryStarted { .. })).await;
    // Wait until the first question is blocked inside the model.
    while h.model.request_count() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    h.cmd_tx.send(UserCommand::Cancel).await.unwrap();
    collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::Cancelled)).await;

    h.cmd_tx.send(UserCommand::Ask("second".into())).await.unwrap();
    let updates = collect_until(&mut h.ui_rx, |u| {
        matches!(u, UiUpdate::AnswerReady(_) | UiUpdate::AnswerFailed(_))
    })
    .await;
    match updates.last().unwrap() {
        UiUpdate::AnswerReady(answer) => {
            assert_eq!(answer.question, "second");
            assert_eq!(answer.markdown, "Second answer.");
        }
        other => panic!("expected AnswerReady, got {other:?}"),
    }
}

#[tokio::test]
async fn output_from_a_superseded_question_is_dropped() {
    let mut h = start(
        "stale",
        vec![
            Turn::Late {
                text: "stale answer".into(),
                delay: Duration::from_millis(200),
            },
            Turn::Text("Fresh answer.".into()),
        ],
        None,
    );
    skip_startup(&mut h.ui_rx).await;

    h.cmd_tx.send(UserCommand::Ask("first".into())).await.unwrap();
    collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::QueryStarted { .. })).await;
    while h.model.request_count() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Supersede the first question before its output shows up.
    h.cmd_tx.send(UserCommand::Ask("second".into())).await.unwrap();
    let mut updates = collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::AnswerReady(_))).await;

    // Let the late output land, then flush the loop with a command.
    tokio::time::sleep(Duration::from_millis(400)).await;
    h.cmd_tx.send(UserCommand::RunDiagnostics).await.unwrap();
    updates.extend(collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::Diagnostics(_))).await);

    let tokens: String = updates
        .iter()
        .filter_map(|u| match u {
            UiUpdate::Token(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, "Fresh answer.");
    assert!(!updates.iter().any(|u| matches!(u, UiUpdate::ToolActivity(_))));
    let answers: Vec<_> = updates
        .iter()
        .filter_map(|u| match u {
            UiUpdate::AnswerReady(a) => Some(a.question.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(answers, vec!["second"]);
}

#[tokio::test]
async fn refresh_schema_picks_up_new_tables_and_clears_query_cache() {
    let mut h = start(
        "refresh",
        vec![
            run_sql("call_1", "SELECT COUNT(*) FROM supply_catalog"),
            Turn::Text("There are 5 items.".into()),
        ],
        None,
    );
    skip_startup(&mut h.ui_rx).await;

    h.cmd_tx.send(UserCommand::Ask("How many supplies?".into())).await.unwrap();
    collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::AnswerReady(_))).await;

    let conn = rusqlite::Connection::open(&h.db_path).unwrap();
    conn.execute_batch("CREATE TABLE referral_sources (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .unwrap();
    drop(conn);

    h.cmd_tx.send(UserCommand::RefreshSchema).await.unwrap();
    let updates = collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::Notice(n) if n == "Schema reloaded")).await;
    let schema = updates
        .iter()
        .find_map(|u| match u {
            UiUpdate::SchemaLoaded(schema) => Some(Arc::clone(schema)),
            _ => None,
        })
        .expect("refresh should report the schema");
    assert_eq!(schema.tables.len(), 9);
    assert!(schema.table("referral_sources").is_some());

    h.cmd_tx.send(UserCommand::RunDiagnostics).await.unwrap();
    let updates = collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::Diagnostics(_))).await;
    let Some(UiUpdate::Diagnostics(report)) = updates.last() else {
        unreachable!()
    };
    assert_eq!(report.query_cache.entries, 0);
    assert!(report.database.tables.iter().any(|(name, _)| name == "referral_sources"));
}

#[tokio::test]
async fn run_diagnostics_reports_current_state() {
    let mut h = start(
        "diagnostics",
        vec![
            run_sql("call_1", "SELECT vendor FROM purchase_orders"),
            Turn::Text("Three vendors.".into()),
        ],
        None,
    );
    skip_startup(&mut h.ui_rx).await;

    h.cmd_tx.send(UserCommand::Ask("List vendors".into())).await.unwrap();
    collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::AnswerReady(_))).await;

    h.cmd_tx.send(UserCommand::RunDiagnostics).await.unwrap();
    let updates = collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::Diagnostics(_))).await;
    match updates.last().unwrap() {
        UiUpdate::Diagnostics(report) => {
            assert!(report.database.reachable);
            assert_eq!(report.database.tables.len(), 8);
            assert_eq!(report.model, "scripted");
            assert!(report.schema_cached);
            assert_eq!(report.query_cache.entries, 1);
        }
        other => panic!("expected Diagnostics, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_questions_report_troubleshooting_markdown() {
    let mut h = start("failed", vec![Turn::Fail(LlmError::Timeout { secs: 60 })], None);
    skip_startup(&mut h.ui_rx).await;

    h.cmd_tx.send(UserCommand::Ask("Profit?".into())).await.unwrap();
    let updates = collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::AnswerFailed(_))).await;
    let UiUpdate::AnswerFailed(message) = updates.last().unwrap() else {
        unreachable!()
    };
    assert!(message.contains("## Error Processing Query"));
    assert!(message.contains("timed out after 60s"));
}

#[tokio::test]
async fn blank_questions_are_rejected() {
    let mut h = start("blank", Vec::new(), None);
    skip_startup(&mut h.ui_rx).await;

    h.cmd_tx.send(UserCommand::Ask("   ".into())).await.unwrap();
    assert!(matches!(
        next_update(&mut h.ui_rx).await,
        UiUpdate::Notice(n) if n == "Please enter a question."
    ));
    assert_eq!(h.model.request_count(), 0);
}

#[tokio::test]
async fn export_writes_the_last_answer() {
    let store = Arc::new(StateStore::open(":memory:").unwrap());
    let mut h = start(
        "export",
        vec![
            run_sql("call_1", "SELECT item_name, unit_price FROM supply_catalog WHERE unit_price > 1900"),
            Turn::Text("Two items cost more than $1900.".into()),
        ],
        Some(Arc::clone(&store)),
    );
    skip_startup(&mut h.ui_rx).await;

    h.cmd_tx.send(UserCommand::Export).await.unwrap();
    assert!(matches!(
        next_update(&mut h.ui_rx).await,
        UiUpdate::Notice(n) if n == "Nothing to export yet"
    ));

    h.cmd_tx
        .send(UserCommand::Ask("Show me items in the supply catalog with price greater than $1900".into()))
        .await
        .unwrap();
    collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::AnswerReady(_))).await;

    h.cmd_tx.send(UserCommand::Export).await.unwrap();
    collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::Notice(n) if n.starts_with("Exported"))).await;

    let mut extensions: Vec<String> = std::fs::read_dir(&h.export_dir)
        .unwrap()
        .map(|e| e.unwrap().path().extension().unwrap().to_string_lossy().into_owned())
        .collect();
    extensions.sort();
    assert_eq!(extensions, vec!["csv", "md"]);

    let recorded = store.load_state(LAST_EXPORT_KEY).unwrap().unwrap();
    assert_eq!(
        recorded["question"],
        "Show me items in the supply catalog with price greater than $1900"
    );
    assert_eq!(recorded["files"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn answered_questions_are_persisted_and_clearable() {
    let store = Arc::new(StateStore::open(":memory:").unwrap());
    store.record_query("earlier question", Some(5), None).unwrap();

    let mut h = start(
        "persist",
        vec![Turn::Text("MedSure Holdings owns 40%.".into())],
        Some(Arc::clone(&store)),
    );
    let startup = collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::History(_))).await;
    assert!(matches!(startup.last(), Some(UiUpdate::History(h)) if h == &vec!["earlier question".to_string()]));

    h.cmd_tx
        .send(UserCommand::Ask("Who owns  the most equity -- voting\n in the practice?".into()))
        .await
        .unwrap();
    let updates = collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::AnswerReady(_))).await;
    let expected = vec![
        "Who owns the most equity in the practice?".to_string(),
        "earlier question".to_string(),
    ];
    // The sidebar and the store hold the same cleaned-up text.
    assert!(updates.iter().any(|u| matches!(u, UiUpdate::History(h) if h == &expected)));
    assert_eq!(store.recent_questions(5).unwrap(), expected);

    h.cmd_tx.send(UserCommand::ClearHistory).await.unwrap();
    collect_until(&mut h.ui_rx, |u| matches!(u, UiUpdate::History(h) if h.is_empty())).await;
    assert_eq!(store.history_len().unwrap(), 0);
}

#[tokio::test]
async fn quit_ends_the_loop() {
    let mut h = start("quit", Vec::new(), None);
    skip_startup(&mut h.ui_rx).await;

    h.cmd_tx.send(UserCommand::Quit).await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), h.handle)
        .await
        .expect("loop did not exit")
        .expect("loop panicked");
    assert!(result.is_ok());
}
