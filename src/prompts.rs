//! Prompts - the three generation calls a conversation makes
//!
//! Inputs are embedded verbatim; nothing here escapes or rewrites user text.

/// Returned to the user when the model produced nothing usable for the clarification.
pub const CLARIFICATION_FALLBACK: &str = "I'm having a bit of trouble formulating a clarification right now. \
Could you please try rephrasing your query or try again shortly?";

/// Asks the model for up to three clarifying questions about `user_query`.
pub fn clarification_prompt(schema: &str, user_query: &str) -> String {
    format!(
        r#"Your goal is to guide the user to make their query more precise based on the available data. The following information from the 'table_metadata' table describes the available data structures:
---SCHEMA START---
{schema}
---SCHEMA END---

User query: "{user_query}"

Follow up with up to 3 relevant clarifying questions to help narrow down the user's request. Do not answer the user query directly; just ask questions. If the user's query is already very clear and seems actionable based on the schema, you can state your understanding of the query and ask for user confirmation. Assume the user does not know the exact content of the data, so keep questions high-level. The idea is to narrow down the user's demand to something that we have available, without asking for precision that we will not be able to match. Give the user enough context to choose from (including examples and SQL variables), because you have only one chance to ask for precisions."#
    )
}

/// Single-shot SQLite SELECT generation over the supplied schema.
pub fn sql_synthesis_prompt(
    schema: &str,
    user_query: &str,
    clarifying_question: &str,
    clarification_answer: &str,
) -> String {
    format!(
        r#"You are an expert in SQL query generation. Generate a valid SQLite SELECT query for the following request.

Database Schema:
{schema}

User Query:
"{user_query}"

Questions to precise user query:
"{clarifying_question}"

User precision of the Query:
"{clarification_answer}"

Return exactly one SELECT statement and nothing else. Use only the tables and columns provided in the Database Schema.
Always use LOWER(column) = LOWER(value) for text comparisons to ensure case-insensitive behavior in SQLite.
Return just the PURE QUERY, no markdown formatting and no explanation!"#
    )
}

/// Turns the conversation plus a result digest into a short user-facing answer.
pub fn summary_prompt(
    user_query: &str,
    clarifying_question: &str,
    clarification_answer: &str,
    result_digest: &str,
) -> String {
    format!(
        r#"Initial user query: '{user_query}'
AI's clarifying question/statement: '{clarifying_question}'
User's response to clarification: '{clarification_answer}'
Database query result summary: {result_digest}

Based on all the information above, provide a concise, user-friendly text response. If data was found, start with 'Based on your request, here's what I found:' and briefly describe the nature of the data in the table. If no data was found, explain that. Keep the explanation to one or two sentences. Do not repeat the raw inputs extensively."#
    )
}

/// Used when the summary call fails; the table is still shown.
pub fn summary_fallback(has_rows: bool) -> String {
    let mut text = String::from("I've processed your request. ");
    if has_rows {
        text.push_str("Data is displayed below.");
    } else {
        text.push_str("However, no specific data was found for your criteria.");
    }
    text
}
