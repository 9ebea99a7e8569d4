//! Shared fixtures: a scripted text generator and a seeded in-memory database

#![allow(dead_code)]

use askchambre::conversation::{Orchestrator, OrchestratorSettings};
use askchambre::db::{DataGateway, SqliteGateway};
use askchambre::error::CompletionError;
use askchambre::llm::TextGenerator;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub type Reply = Result<String, CompletionError>;

/// Answers generation calls from a fixed queue and records every prompt.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    pub fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call waits for one notification on `gate` before answering.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, prompt: &str, _model: Option<&str>) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::Failed("script exhausted".to_string())))
    }
}

pub const CLARIFYING_QUESTION: &str =
    "Do you mean bills voted in a particular year, or bills that are still under review?";

pub const SUMMARY: &str = "Based on your request, here's what I found: two bills adopted in 2023.";

/// In-memory database with a described `bills` table.
pub fn seeded_gateway() -> Arc<SqliteGateway> {
    let gateway = SqliteGateway::in_memory();
    for sql in [
        "CREATE TABLE table_metadata (table_name TEXT, name TEXT, description TEXT)",
        "INSERT INTO table_metadata VALUES \
            ('bills', 'title', 'Title of the bill'), \
            ('bills', 'year', 'Year the bill was adopted'), \
            ('bills', 'status', NULL)",
        "CREATE TABLE bills (id INTEGER PRIMARY KEY, title TEXT, year INTEGER, status TEXT)",
        "INSERT INTO bills (title, year, status) VALUES \
            ('Budget 2023', 2023, 'adopted'), \
            ('Pension reform', 2023, 'adopted'), \
            ('Energy transition', 2021, 'adopted'), \
            ('Immigration', 2024, 'under review')",
    ] {
        gateway.execute(sql).expect("seed statement");
    }
    Arc::new(gateway)
}

/// In-memory database without any `table_metadata`.
pub fn undescribed_gateway() -> Arc<SqliteGateway> {
    let gateway = SqliteGateway::in_memory();
    gateway
        .execute("CREATE TABLE bills (id INTEGER PRIMARY KEY, title TEXT, year INTEGER)")
        .expect("seed statement");
    Arc::new(gateway)
}

pub fn orchestrator(generator: &Arc<ScriptedGenerator>, gateway: &Arc<SqliteGateway>) -> Orchestrator {
    orchestrator_with(generator, gateway, OrchestratorSettings::default())
}

pub fn orchestrator_with(
    generator: &Arc<ScriptedGenerator>,
    gateway: &Arc<SqliteGateway>,
    settings: OrchestratorSettings,
) -> Orchestrator {
    let generator: Arc<dyn TextGenerator> = generator.clone();
    let gateway: Arc<dyn DataGateway> = gateway.clone();
    Orchestrator::new(generator, gateway, settings)
}
