pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod prompts;
pub mod schema;
pub mod synthesizer;

pub use config::AppConfig;
pub use conversation::{ConversationState, Event, Orchestrator, OrchestratorSettings, Stage, StepOutcome};
pub use db::{DataGateway, QueryResult, SqliteGateway, Table};
pub use error::{ChatError, CompletionError, GatewayError, Result};
pub use llm::{LlmClient, TextGenerator};
