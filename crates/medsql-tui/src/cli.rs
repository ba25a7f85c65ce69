// Command-line entry points that run without the dashboard.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::mpsc;
use tracing::info;

use medsql_app::agent::{render_failure, SqlAgent};
use medsql_app::protocol::{AgentEvent, LlmEvent};
use medsql_core::config::Config;
use medsql_core::seed;
use medsql_llm::client::LlmClient;

pub const USAGE: &str = "\
Usage: medsql [COMMAND]

Commands:
  (none)             open the interactive dashboard
  init-db            recreate the sample practice database
  ask <question...>  answer one question and exit
  help               show this message

Configuration is read from config/assistant.toml, config/credentials.toml
and .env (GROQ_API_KEY, DATABASE_URL, LOG_LEVEL).
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Dashboard,
    InitDb,
    Ask(String),
    Help,
}

/// Parse the arguments after the program name.
pub fn parse_args<I, S>(args: I) -> anyhow::Result<Command>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = args.into_iter().map(Into::into);
    let Some(first) = args.next() else {
        return Ok(Command::Dashboard);
    };
    match first.as_str() {
        "init-db" => Ok(Command::InitDb),
        "ask" => {
            let question = args.collect::<Vec<_>>().join(" ");
            if question.trim().is_empty() {
                bail!("`ask` needs a question, e.g. medsql ask \"Who owns the most equity?\"");
            }
            Ok(Command::Ask(question.trim().to_string()))
        }
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => bail!("unknown command `{other}`\n\n{USAGE}"),
    }
}

/// `medsql init-db`: rebuild the practice database and print what was created.
pub fn init_db(config: &Config) -> anyhow::Result<()> {
    let path = config
        .database
        .file_path()
        .context("cannot resolve database path")?;
    let report = seed::init_database(&path)
        .with_context(|| format!("failed to initialize {}", path.display()))?;
    info!("Initialized {} tables at {}", report.tables.len(), path.display());
    print!("{}", report.render());
    Ok(())
}

/// `medsql ask`: stream the answer to stdout, tool progress to stderr.
pub async fn ask(config: &Config, question: &str) -> anyhow::Result<()> {
    let agent = SqlAgent::connect(config, Arc::new(LlmClient::from_config(config)));

    let (llm_tx, llm_rx) = mpsc::channel(256);
    let (agent_tx, agent_rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_progress(llm_rx, agent_rx));

    let result = agent.ask(question, &llm_tx, &agent_tx, 0).await;
    drop(llm_tx);
    drop(agent_tx);
    let _ = printer.await;

    match result {
        Ok(answer) => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", answer.appendix())?;
            writeln!(
                stdout,
                "\nQuery processed in {:.2} seconds",
                answer.elapsed.as_secs_f64()
            )?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", render_failure(&e));
            Err(anyhow::Error::new(e).context("question failed"))
        }
    }
}

async fn print_progress(mut llm_rx: mpsc::Receiver<LlmEvent>, mut agent_rx: mpsc::Receiver<AgentEvent>) {
    let mut llm_open = true;
    let mut agent_open = true;
    while llm_open || agent_open {
        tokio::select! {
            biased;

            event = llm_rx.recv(), if llm_open => match event {
                Some(LlmEvent::Token { text, .. }) => {
                    let mut stdout = std::io::stdout().lock();
                    let _ = stdout.write_all(text.as_bytes());
                    let _ = stdout.flush();
                }
                Some(LlmEvent::ToolRequested { .. }) => {}
                None => llm_open = false,
            },

            event = agent_rx.recv(), if agent_open => match event {
                Some(AgentEvent::ToolFinished { activity, .. }) => eprintln!("{}", activity.line()),
                Some(_) => {}
                None => agent_open = false,
            },
        }
    }
}
