//! Helpers for reading model text as JSON

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::ProblemRef;

/// Remove a surrounding Markdown code fence, if present
///
/// Handles ```` ```json ```` style openers, with or without a line break
/// after the language tag, and a closing fence. Text without a fence is
/// returned trimmed.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Language tag, if any, runs up to the first non-word character
    let body = rest
        .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '_'))
        .trim_start();

    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parse model output as a JSON array of `T`
pub fn parse_json_array<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, serde_json::Error> {
    serde_json::from_str(strip_code_fence(text))
}

/// Problem reference as the model echoes it back
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProblemRef {
    pub doc_id: String,
    pub problem_id: String,
}

impl RawProblemRef {
    pub fn parse(&self) -> Result<ProblemRef, String> {
        let doc_id = Uuid::parse_str(self.doc_id.trim())
            .map_err(|_| format!("invalid docId '{}'", self.doc_id))?;
        let problem_id = Uuid::parse_str(self.problem_id.trim())
            .map_err(|_| format!("invalid problemId '{}'", self.problem_id))?;
        Ok(ProblemRef { doc_id, problem_id })
    }
}

/// Trim tags, drop blanks and repeats, keep first-seen order
pub fn clean_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}
