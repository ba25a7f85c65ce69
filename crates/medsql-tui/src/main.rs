// MedSQL entry point.
//
// Startup sequence:
// 1. Parse the command line
// 2. Load config (.env, defaults copy, assistant.toml, credentials.toml)
// 3. Initialize tracing (log to file, not terminal)
// 4. Run `init-db`, a one-shot `ask`, or the dashboard:
//    build the model client and agent, open the state store, create channels,
//    spawn the app loop, run the TUI until quit, then clean up.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use medsql_app::agent::SqlAgent;
use medsql_app::app::{self, AppState};
use medsql_core::config::{self, Config};
use medsql_core::store::StateStore;
use medsql_llm::client::LlmClient;
use medsql_tui::cli::{self, Command};
use medsql_tui::tui::{self, ViewState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let command = cli::parse_args(std::env::args().skip(1))?;

    match command {
        Command::Help => {
            print!("{}", cli::USAGE);
            Ok(())
        }
        Command::InitDb => {
            let config = setup()?;
            cli::init_db(&config)
        }
        Command::Ask(question) => {
            let config = setup()?;
            cli::ask(&config, &question).await
        }
        Command::Dashboard => {
            let config = setup()?;
            run_dashboard(config).await
        }
    }
}

fn setup() -> anyhow::Result<Config> {
    let config = config::load_config().context("failed to load configuration")?;
    init_tracing(&config.logging.level)?;
    info!("MedSQL starting up");
    info!(
        "Config loaded: database={}, model={}",
        config.database.url, config.llm.model
    );
    if config.credentials.agno_api_key.is_some() {
        info!("AGNO_API_KEY is set; it is not used by this build");
    }
    Ok(config)
}

async fn run_dashboard(config: Config) -> anyhow::Result<()> {
    let llm_client = LlmClient::from_config(&config);
    if llm_client.is_active() {
        info!("LLM client initialized (API key configured)");
    } else {
        warn!("LLM client disabled (no GROQ_API_KEY)");
    }

    let agent = Arc::new(SqlAgent::connect(&config, Arc::new(llm_client)));

    let store = match StateStore::open(&config.database.state_path) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!("Query history will not be persisted: {e:#}");
            None
        }
    };

    let (llm_tx, llm_rx) = mpsc::channel(256);
    let (agent_tx, agent_rx) = mpsc::channel(64);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    let view_state = ViewState::new(agent.db_path().display().to_string());
    let app_state = AppState::new(config, agent, store, llm_tx, agent_tx);

    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(llm_rx, agent_rx, cmd_rx, ui_tx, app_state).await {
            error!("Application loop error: {e:#}");
        }
    });

    info!("Dashboard ready");

    // Blocks until the user quits.
    if let Err(e) = tui::run(ui_rx, cmd_tx, view_state).await {
        error!("TUI error: {e:#}");
    }

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    info!("MedSQL shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (the terminal belongs to the TUI).
///
/// `RUST_LOG` wins when set; otherwise `level` applies to the medsql crates
/// and everything else logs warnings only.
fn init_tracing(level: &str) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("medsql.log"))?;

    let default_filter = ["medsql", "medsql_core", "medsql_llm", "medsql_app", "medsql_tui"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .chain(std::iter::once("warn".to_string()))
        .collect::<Vec<_>>()
        .join(",");

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
