use anyhow::Result;
use askchambre::config::AppConfig;
use askchambre::conversation::{
    ConversationState, Event, Orchestrator, OrchestratorSettings, Role, StepOutcome, Turn,
};
use askchambre::db::{SqliteGateway, Table};
use askchambre::llm::LlmClient;
use askchambre::schema::DescribeMode;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "askchambre")]
#[command(about = "Ask questions about parliamentary data in plain language")]
struct Args {
    /// First question; when omitted the prompt asks for one
    query: Option<String>,

    /// SQLite database to query (or set DATABASE_PATH)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Gemini model name (or set MODEL_NAME)
    #[arg(short, long)]
    model: Option<String>,

    /// Gemini API key (or set API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Upper bound in seconds for each model or database call
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Ground SQL generation in the raw metadata records instead of the text summary
    #[arg(long)]
    structured_schema: bool,

    /// Print the generated SQL statement with each answer
    #[arg(long)]
    show_sql: bool,

    /// Maximum table rows printed per answer
    #[arg(long, default_value_t = 20)]
    max_rows: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(database) = args.database.clone() {
        config.database_path = database;
    }
    if let Some(model) = args.model.clone() {
        config.model = Some(model);
    }
    if let Some(api_key) = args.api_key.clone() {
        config.api_key = Some(api_key);
    }
    if let Some(secs) = args.timeout_secs.filter(|s| *s > 0) {
        config.step_timeout = Duration::from_secs(secs);
    }

    info!(database = %config.database_path.display(), model = ?config.model, "askchambre starting");

    let gateway = SqliteGateway::open(&config.database_path).with_busy_timeout(config.busy_timeout);
    let orchestrator = Orchestrator::new(
        Arc::new(LlmClient::from_config(&config)),
        Arc::new(gateway),
        OrchestratorSettings {
            model: config.model.clone(),
            step_timeout: config.step_timeout,
            synthesis_schema: if args.structured_schema {
                DescribeMode::Structured
            } else {
                DescribeMode::Text
            },
        },
    );

    println!("AskMyChambre - semantic search for parliamentary data");
    println!("Commands: /new starts a new search once an answer is shown, /quit exits.\n");

    let mut state = ConversationState::new();
    let mut shown = 0;
    let mut pending = args.query.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let input = match pending.take() {
            Some(text) => text,
            None => {
                if let Some(placeholder) = state.stage().placeholder() {
                    print!("{}\n> ", placeholder);
                    std::io::stdout().flush()?;
                }
                match lines.next_line().await? {
                    Some(line) => line,
                    None => break,
                }
            }
        };

        let outcome = match input.trim() {
            "/quit" | "/exit" => break,
            "/new" => orchestrator.apply(&mut state, Event::Reset).await,
            text => {
                if state.stage().accepts_input() {
                    println!("Thinking...");
                }
                orchestrator.drive(&mut state, text).await
            }
        };

        if let StepOutcome::Rejected(rejection) = &outcome {
            println!("({})\n", rejection);
        }
        if state.history().len() < shown {
            // Reset cleared the transcript.
            shown = 0;
            println!("--- new search ---\n");
        }
        for turn in &state.history()[shown..] {
            print_turn(turn, args.max_rows);
        }
        shown = state.history().len();

        if args.show_sql && matches!(outcome, StepOutcome::Advanced { .. }) {
            if let Some(answer) = state.answer() {
                println!("SQL: {}\n", answer.sql);
            }
        }
    }

    Ok(())
}

fn print_turn(turn: &Turn, max_rows: usize) {
    match turn.role {
        // The user's own lines are already on screen.
        Role::User => {}
        Role::Assistant => {
            println!("{}\n", turn.text);
            if let Some(table) = turn.table.as_ref().filter(|t| !t.is_empty()) {
                print_table(table, max_rows);
            }
        }
    }
}

fn print_table(table: &Table, max_rows: usize) {
    let cell = |v: &serde_json::Value| match v {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let shown: Vec<Vec<String>> = table
        .rows
        .iter()
        .take(max_rows)
        .map(|row| row.iter().map(cell).collect())
        .collect();

    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &shown {
        for (idx, value) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(idx) {
                *w = (*w).max(value.chars().count()).min(40);
            }
        }
    }

    let render = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| {
                let clipped: String = v.chars().take(*w).collect();
                format!("{:<width$}", clipped, width = *w)
            })
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("{}", render(table.columns.as_slice()));
    println!(
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for row in &shown {
        println!("{}", render(row.as_slice()));
    }
    if table.row_count() > shown.len() {
        println!("... {} more rows", table.row_count() - shown.len());
    }
    println!();
}
