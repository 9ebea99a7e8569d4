//! Conversation Orchestrator - the dispatch function behind every stage change
//!
//! `apply` is the only place a conversation moves. User events are checked
//! against the current stage; `Advance` runs the pending automatic stage at most
//! once and is a no-op everywhere else, so re-invoking a settled conversation
//! never repeats a generation call.

use super::state::{Answer, ConversationState, Rejection, Stage};
use crate::db::{DataGateway, QueryResult};
use crate::error::{ChatError, CompletionError, GatewayError, Result};
use crate::llm::TextGenerator;
use crate::prompts;
use crate::schema::{self, DescribeMode};
use crate::synthesizer::{GeneratedQuery, QuerySynthesizer, SynthesisRequest};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Text typed by the user.
    Submit(String),
    /// Re-invocation: run the pending automatic stage, if any.
    Advance,
    /// "New conversation".
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Advanced { from: Stage, to: Stage },
    Unchanged,
    Rejected(Rejection),
}

#[derive(Debug, Clone)]
pub struct Stepped {
    pub state: ConversationState,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Model passed to every generation call; `None` uses the generator's default.
    pub model: Option<String>,
    /// Bound on each generation or database call.
    pub step_timeout: Duration,
    /// Schema form used to ground SQL synthesis.
    pub synthesis_schema: DescribeMode,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            model: None,
            step_timeout: Duration::from_secs(120),
            synthesis_schema: DescribeMode::Text,
        }
    }
}

pub struct Orchestrator {
    generator: Arc<dyn TextGenerator>,
    gateway: Arc<dyn DataGateway>,
    synthesizer: QuerySynthesizer,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        gateway: Arc<dyn DataGateway>,
        settings: OrchestratorSettings,
    ) -> Self {
        let synthesizer = QuerySynthesizer::new(Arc::clone(&generator), settings.model.clone());
        Self {
            generator,
            gateway,
            synthesizer,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Value-in, value-out form of [`Orchestrator::apply`].
    pub async fn step(&self, mut state: ConversationState, event: Event) -> Stepped {
        let outcome = self.apply(&mut state, event).await;
        Stepped { state, outcome }
    }

    pub async fn apply(&self, state: &mut ConversationState, event: Event) -> StepOutcome {
        let from = state.stage();
        let result = match event {
            Event::Submit(text) => state.submit(&text).map(|_| ()),
            Event::Reset => state.reset().map(|_| ()),
            Event::Advance => match from {
                Stage::Clarifying => {
                    self.clarify(state).await;
                    Ok(())
                }
                Stage::Processing => {
                    self.process(state).await;
                    Ok(())
                }
                _ => Ok(()),
            },
        };

        match result {
            Err(rejection) => {
                debug!(stage = %from, %rejection, "trigger rejected");
                StepOutcome::Rejected(rejection)
            }
            Ok(()) if state.stage() == from => StepOutcome::Unchanged,
            Ok(()) => {
                info!(from = %from, to = %state.stage(), "stage transition");
                StepOutcome::Advanced { from, to: state.stage() }
            }
        }
    }

    /// Submits `text` and runs automatic stages until the conversation waits
    /// for the user again.
    pub async fn drive(&self, state: &mut ConversationState, text: &str) -> StepOutcome {
        let first = self.apply(state, Event::Submit(text.to_string())).await;
        if let StepOutcome::Rejected(_) = first {
            return first;
        }
        let mut last = first;
        while state.stage().is_automatic() {
            last = self.apply(state, Event::Advance).await;
        }
        last
    }

    async fn clarify(&self, state: &mut ConversationState) {
        let query = state.initial_query().unwrap_or_default().to_string();
        match self.clarification_question(&query).await {
            Ok(question) => state.complete_clarification(question),
            Err(err) => {
                warn!(error = %err, "clarification failed");
                state.fail_automatic_stage(format!(
                    "Sorry, I encountered an error. An error occurred during clarification: {}",
                    err
                ));
            }
        }
    }

    async fn clarification_question(&self, user_query: &str) -> Result<String> {
        let schema = self.schema_context(DescribeMode::Text).await?;
        let prompt = prompts::clarification_prompt(&schema, user_query);
        match self.complete("clarification", &prompt).await? {
            Ok(question) if !question.trim().is_empty() => Ok(question.trim().to_string()),
            // Nothing usable came back, but the model is reachable: ask the fallback question.
            Ok(_) | Err(CompletionError::EmptyResponse { .. }) => {
                Ok(prompts::CLARIFICATION_FALLBACK.to_string())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn process(&self, state: &mut ConversationState) {
        let query = state.initial_query().unwrap_or_default().to_string();
        let question = state.clarification_prompt().unwrap_or_default().to_string();
        let response = state.clarification_response().unwrap_or_default().to_string();
        match self.answer(&query, &question, &response).await {
            Ok(answer) => state.complete_processing(answer),
            Err(err) => {
                warn!(error = %err, "processing failed");
                state.fail_automatic_stage(format!(
                    "Sorry, I encountered an error. An error occurred while processing your query: {}",
                    err
                ));
            }
        }
    }

    async fn answer(
        &self,
        user_query: &str,
        clarifying_question: &str,
        clarification_answer: &str,
    ) -> Result<Answer> {
        let schema = self.schema_context(self.settings.synthesis_schema).await?;
        let request = SynthesisRequest {
            user_query,
            clarifying_question,
            clarification_answer,
            schema_description: &schema,
        };
        let sql = self
            .bounded("SQL synthesis", self.synthesizer.synthesize(&request))
            .await??;

        let result = self.run_query(&sql).await?;
        if let Some(failure) = result.failure() {
            return Err(failure.clone().into());
        }

        let prompt = prompts::summary_prompt(
            user_query,
            clarifying_question,
            clarification_answer,
            &result.digest(),
        );
        let reply = self
            .complete("summary", &prompt)
            .await
            .and_then(|r| r.map_err(ChatError::from));
        let summary = match reply {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => prompts::summary_fallback(result.has_rows()),
            Err(err) => {
                warn!(error = %err, "summary failed, using fallback text");
                prompts::summary_fallback(result.has_rows())
            }
        };

        Ok(Answer { sql, result, summary })
    }

    async fn run_query(&self, sql: &GeneratedQuery) -> Result<QueryResult> {
        let gateway = Arc::clone(&self.gateway);
        let statement = sql.as_str().to_string();
        let handle = tokio::task::spawn_blocking(move || gateway.run(&statement));
        self.bounded("query execution", handle)
            .await?
            .map_err(|e| ChatError::QueryExecutionFailed {
                reason: format!("query worker stopped: {}", e),
                query: sql.as_str().chars().take(GatewayError::QUERY_EXCERPT_CHARS).collect(),
            })
    }

    async fn schema_context(&self, mode: DescribeMode) -> Result<String> {
        let gateway = Arc::clone(&self.gateway);
        let handle = tokio::task::spawn_blocking(move || schema::schema_context(gateway.as_ref(), mode));
        self.bounded("schema lookup", handle)
            .await?
            .map_err(|e| ChatError::ConnectionUnavailable(format!("schema worker stopped: {}", e)))
    }

    /// Outer error: the call did not finish in time. Inner: the generator's own report.
    async fn complete(
        &self,
        purpose: &'static str,
        prompt: &str,
    ) -> Result<std::result::Result<String, CompletionError>> {
        debug!(purpose, prompt_chars = prompt.len(), "generation call");
        self.bounded(purpose, self.generator.complete(prompt, self.settings.model.as_deref()))
            .await
    }

    async fn bounded<F, T>(&self, stage: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.settings.step_timeout, fut)
            .await
            .map_err(|_| ChatError::Timeout {
                stage,
                after: self.settings.step_timeout,
            })
    }
}
