//! Conversation state - stages, transcript and the user-driven transitions

use crate::db::{QueryResult, Table};
use crate::synthesizer::GeneratedQuery;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    AwaitingQuery,
    Clarifying,
    AwaitingClarification,
    Processing,
    Done,
}

impl Stage {
    /// Stages that wait for the user to type something.
    pub fn accepts_input(self) -> bool {
        matches!(self, Stage::AwaitingQuery | Stage::AwaitingClarification)
    }

    /// Stages that advance on their own, without user input.
    pub fn is_automatic(self) -> bool {
        matches!(self, Stage::Clarifying | Stage::Processing)
    }

    pub fn can_reset(self) -> bool {
        self == Stage::Done
    }

    /// Placeholder for the input box; `None` while input is disabled.
    pub fn placeholder(self) -> Option<&'static str> {
        match self {
            Stage::AwaitingQuery => Some("What can I help you with?"),
            Stage::AwaitingClarification => Some("Please provide more details or refine your query."),
            Stage::Done => Some("Type here to start a new search, or use the button below."),
            Stage::Clarifying | Stage::Processing => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::AwaitingQuery => "awaiting_query",
            Stage::Clarifying => "clarifying",
            Stage::AwaitingClarification => "awaiting_clarification",
            Stage::Processing => "processing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub table: Option<Table>,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into(), table: None, at: Utc::now() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into(), table: None, at: Utc::now() }
    }

    pub fn with_table(mut self, table: Option<Table>) -> Self {
        self.table = table;
        self
    }
}

/// Outcome of a completed PROCESSING stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub sql: GeneratedQuery,
    pub result: QueryResult,
    pub summary: String,
}

/// Why a trigger was refused. A refused trigger never changes the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    InputNotAccepted { stage: Stage },
    EmptyInput,
    ResetNotAvailable { stage: Stage },
    /// Another step for the same conversation is still running.
    Busy,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InputNotAccepted { stage } => write!(f, "input is not accepted while {}", stage),
            Rejection::EmptyInput => f.write_str("input is empty"),
            Rejection::ResetNotAvailable { stage } => write!(f, "reset is not available while {}", stage),
            Rejection::Busy => f.write_str("a step is already in flight for this conversation"),
        }
    }
}

/// One dialogue. Mutated only through the orchestrator's transitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    stage: Stage,
    initial_query: Option<String>,
    clarification_prompt: Option<String>,
    clarification_response: Option<String>,
    answer: Option<Answer>,
    history: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn initial_query(&self) -> Option<&str> {
        self.initial_query.as_deref()
    }

    pub fn clarification_prompt(&self) -> Option<&str> {
        self.clarification_prompt.as_deref()
    }

    pub fn clarification_response(&self) -> Option<&str> {
        self.clarification_response.as_deref()
    }

    pub fn answer(&self) -> Option<&Answer> {
        self.answer.as_ref()
    }

    /// Transcript in insertion order.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Records user text for the current stage and moves to the automatic
    /// stage that consumes it. The text reaches the transcript before any
    /// long-running step starts.
    pub fn submit(&mut self, text: &str) -> Result<Stage, Rejection> {
        let text = text.trim();
        let next = match self.stage {
            Stage::AwaitingQuery => Stage::Clarifying,
            Stage::AwaitingClarification => Stage::Processing,
            stage => return Err(Rejection::InputNotAccepted { stage }),
        };
        if text.is_empty() {
            return Err(Rejection::EmptyInput);
        }

        self.history.push(Turn::user(text));
        if next == Stage::Clarifying {
            self.initial_query = Some(text.to_string());
        } else {
            self.clarification_response = Some(text.to_string());
        }
        self.stage = next;
        Ok(self.stage)
    }

    /// Discards the whole conversation. Only available once it is done.
    pub fn reset(&mut self) -> Result<Stage, Rejection> {
        if !self.stage.can_reset() {
            return Err(Rejection::ResetNotAvailable { stage: self.stage });
        }
        *self = Self::default();
        Ok(self.stage)
    }

    pub(crate) fn complete_clarification(&mut self, question: String) {
        debug_assert_eq!(self.stage, Stage::Clarifying);
        self.history.push(Turn::assistant(question.clone()));
        self.clarification_prompt = Some(question);
        self.stage = Stage::AwaitingClarification;
    }

    pub(crate) fn complete_processing(&mut self, answer: Answer) {
        debug_assert_eq!(self.stage, Stage::Processing);
        self.history
            .push(Turn::assistant(answer.summary.clone()).with_table(answer.result.table().cloned()));
        self.answer = Some(answer);
        self.stage = Stage::Done;
    }

    /// Appends `notice` and returns to the stage the user can retry from.
    /// Earlier inputs are kept.
    pub(crate) fn fail_automatic_stage(&mut self, notice: String) {
        self.history.push(Turn::assistant(notice));
        self.stage = match self.stage {
            Stage::Clarifying => Stage::AwaitingQuery,
            Stage::Processing => Stage::AwaitingClarification,
            other => other,
        };
    }
}
