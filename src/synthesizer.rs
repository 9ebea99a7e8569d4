//! Query Synthesizer - one generation call, one SELECT statement
//!
//! Malformed output is rejected, never repaired by a second call; the caller
//! decides whether to retry.

use crate::error::{ChatError, Result};
use crate::llm::TextGenerator;
use crate::prompts;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// A single SQL SELECT statement produced by the model, without trailing `;`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuery(String);

impl GeneratedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for GeneratedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four inputs of a synthesis call.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub user_query: &'a str,
    pub clarifying_question: &'a str,
    pub clarification_answer: &'a str,
    pub schema_description: &'a str,
}

impl SynthesisRequest<'_> {
    pub fn prompt(&self) -> String {
        prompts::sql_synthesis_prompt(
            self.schema_description,
            self.user_query,
            self.clarifying_question,
            self.clarification_answer,
        )
    }
}

pub struct QuerySynthesizer {
    generator: Arc<dyn TextGenerator>,
    model: Option<String>,
}

impl QuerySynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, model: Option<String>) -> Self {
        Self { generator, model }
    }

    pub async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<GeneratedQuery> {
        let prompt = request.prompt();
        debug!(prompt_chars = prompt.len(), "requesting SQL synthesis");

        let raw = self
            .generator
            .complete(&prompt, self.model.as_deref())
            .await
            .map_err(ChatError::from)?;

        let query = normalize_sql(&raw)?;
        info!(sql = %query, "synthesized query");
        Ok(query)
    }
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```$").expect("fence pattern is valid")
    })
}

/// Checks the model output against the output contract: one SELECT statement,
/// optionally inside a single code fence, optionally ending in `;`.
pub fn normalize_sql(raw: &str) -> Result<GeneratedQuery> {
    let mut sql = raw.trim();
    if let Some(inner) = fence_pattern().captures(sql).and_then(|c| c.get(1)) {
        sql = inner.as_str().trim();
    }
    if sql.is_empty() {
        return Err(ChatError::SynthesisFailed("model returned an empty query".to_string()));
    }

    let sql = sql.strip_suffix(';').unwrap_or(sql).trim_end();
    if has_statement_separator(sql) {
        return Err(ChatError::SynthesisFailed(format!(
            "expected a single statement, got: {}",
            excerpt(sql)
        )));
    }

    let starts_with_select = sql
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("select"))
        .unwrap_or(false)
        && sql[6..].starts_with(|c: char| c.is_whitespace() || c == '*' || c == '(');
    if !starts_with_select {
        return Err(ChatError::SynthesisFailed(format!(
            "expected a SELECT statement, got: {}",
            excerpt(sql)
        )));
    }

    Ok(GeneratedQuery(sql.to_string()))
}

/// `;` outside string literals and quoted identifiers.
fn has_statement_separator(sql: &str) -> bool {
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, ';') => return true,
            (None, _) => {}
        }
    }
    false
}

fn excerpt(sql: &str) -> String {
    sql.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        reply: std::result::Result<String, CompletionError>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for Canned {
        async fn complete(&self, prompt: &str, _model: Option<&str>) -> std::result::Result<String, CompletionError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone()
        }
    }

    fn synthesizer(reply: std::result::Result<String, CompletionError>) -> (QuerySynthesizer, Arc<Canned>) {
        let canned = Arc::new(Canned { reply, prompts: Mutex::new(Vec::new()) });
        (QuerySynthesizer::new(canned.clone(), None), canned)
    }

    fn request() -> SynthesisRequest<'static> {
        SynthesisRequest {
            user_query: "List all customer names who have placed an order.",
            clarifying_question: "Do you need high or low priority users",
            clarification_answer: "High",
            schema_description: "Table customers:\n  id (Customer unique identifier)",
        }
    }

    #[tokio::test]
    async fn test_returns_statement_from_model() {
        let expected = "SELECT customers.name\nFROM customers\nJOIN orders ON customers.id = orders.customer_id";
        let (synth, canned) = synthesizer(Ok(format!("{};\n", expected)));
        let query = synth.synthesize(&request()).await.unwrap();
        assert_eq!(query.as_str(), expected);

        let prompts = canned.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Do you need high or low priority users"));
    }

    #[tokio::test]
    async fn test_generation_failure_is_synthesis_failed() {
        let (synth, _) = synthesizer(Err(CompletionError::Failed("HTTP 500".into())));
        assert!(matches!(
            synth.synthesize(&request()).await,
            Err(ChatError::SynthesisFailed(_))
        ));

        let (synth, _) = synthesizer(Err(CompletionError::ModelUnspecified));
        assert!(matches!(
            synth.synthesize(&request()).await,
            Err(ChatError::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn test_strips_single_code_fence() {
        let query = normalize_sql("```sql\nselect * from laws;\n```").unwrap();
        assert_eq!(query.as_str(), "select * from laws");
    }

    #[test]
    fn test_rejects_commentary_and_non_select() {
        assert!(normalize_sql("").is_err());
        assert!(normalize_sql("Here is your query: SELECT 1").is_err());
        assert!(normalize_sql("DELETE FROM laws").is_err());
        assert!(normalize_sql("SELECTED").is_err());
    }

    #[test]
    fn test_rejects_multiple_statements() {
        assert!(normalize_sql("SELECT 1; DROP TABLE laws;").is_err());
        let query = normalize_sql("SELECT * FROM laws WHERE LOWER(title) = LOWER('a;b');").unwrap();
        assert!(query.as_str().ends_with("LOWER('a;b')"));
    }
}
