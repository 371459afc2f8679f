//! Per-ward problem clustering
//!
//! Two levels: problems are grouped by the ward of their document, then into
//! similar-problem sub-groups within the ward. Each ward also gets one label
//! summarizing its situation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::ai_client::CompletionBackend;
use super::ai_output::{clean_tags, parse_json_array, RawProblemRef};
use super::partition::{verify_ward_groups, ProblemSet};
use crate::error::PipelineError;
use crate::models::{Document, WardGroup, WardProblemGroup};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptProblem<'a> {
    ward: &'a str,
    category: &'a [String],
    description: &'a str,
    doc_id: Uuid,
    problem_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWardGroup {
    #[serde(default)]
    ward: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    problems: Vec<RawSubGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSubGroup {
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    problem_ids: Vec<RawProblemRef>,
}

pub struct WardClusterer {
    backend: Arc<dyn CompletionBackend>,
}

impl WardClusterer {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    pub async fn cluster(&self, documents: &[Document]) -> Result<Vec<WardGroup>, PipelineError> {
        let set = ProblemSet::from_documents(documents);
        if set.is_empty() {
            return Ok(Vec::new());
        }

        let problems: Vec<PromptProblem<'_>> = documents
            .iter()
            .flat_map(|doc| {
                let ward = doc.ward_label();
                doc.problems.iter().map(move |p| PromptProblem {
                    ward,
                    category: &p.category,
                    description: &p.description.english,
                    doc_id: doc.id,
                    problem_id: p.id,
                })
            })
            .collect();

        let input = serde_json::to_string_pretty(&problems)
            .map_err(|e| PipelineError::InvalidClusterFormat(e.to_string()))?;

        let text = self
            .backend
            .complete(&ward_prompt(&input), &[])
            .await
            .map_err(|e| PipelineError::ExtractionCallFailed(format!("ward clustering: {}", e)))?;

        let raw: Vec<RawWardGroup> = parse_json_array(&text)
            .map_err(|e| invalid(format!("not a JSON ward array: {}", e)))?;

        let groups = raw
            .into_iter()
            .map(build_ward_group)
            .collect::<Result<Vec<_>, _>>()?;

        verify_ward_groups(&set, &groups).map_err(|e| invalid(e.to_string()))?;

        tracing::debug!(
            problems = set.len(),
            wards = groups.len(),
            "Ward groups built"
        );
        Ok(groups)
    }
}

fn invalid(reason: String) -> PipelineError {
    PipelineError::InvalidClusterFormat(format!("ward report: {}", reason))
}

fn build_ward_group(raw: RawWardGroup) -> Result<WardGroup, PipelineError> {
    let ward = raw.ward.trim();
    if ward.is_empty() {
        return Err(invalid("ward group without a ward".to_string()));
    }
    let category = raw.category.trim();
    if category.is_empty() {
        return Err(invalid(format!("ward '{}' has no category", ward)));
    }
    if raw.problems.is_empty() {
        return Err(invalid(format!("ward '{}' has no problems", ward)));
    }

    let problems = raw
        .problems
        .iter()
        .enumerate()
        .map(|(index, sub)| {
            let issues = clean_tags(&sub.issues);
            let summary = sub.summary.trim();
            if sub.problem_ids.is_empty() || issues.is_empty() || summary.is_empty() {
                return Err(invalid(format!(
                    "ward '{}' group {} needs problemIds, issues and a summary",
                    ward, index
                )));
            }
            let problem_ids = sub
                .problem_ids
                .iter()
                .map(RawProblemRef::parse)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid(format!("ward '{}' group {}: {}", ward, index, e)))?;
            Ok(WardProblemGroup {
                issues,
                summary: summary.to_string(),
                problem_ids,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WardGroup {
        ward_id: Uuid::new_v4(),
        ward: ward.to_string(),
        category: category.to_string(),
        problems,
    })
}

fn ward_prompt(input: &str) -> String {
    format!(
        r#"You analyze ward-level complaint data. Each input entry has "ward", "category" (tags), "description" (English), "docId" and "problemId".

Group the problems by ward, then group similar problems within each ward.

For each ward return:
- "ward": the ward exactly as given in the input
- "category": one short label for the ward's overall situation (e.g. "water shortage", "poor sanitation")
- "problems": the similar-problem groups of this ward, each with
  - "issues": unique tags combined from the grouped problems
  - "summary": a short description of the core issue
  - "problemIds": array of {{ "docId": "...", "problemId": "..." }}

Rules:
- Every problem appears in exactly one group, under its own ward.
- List each ward once. Use only ids from the input.
- Return raw JSON, no markdown.

Format:
[
  {{
    "ward": "Ward 1",
    "category": "poor sanitation",
    "problems": [
      {{
        "issues": ["garbage"],
        "summary": "Garbage is not collected regularly.",
        "problemIds": [{{ "docId": "...", "problemId": "..." }}]
      }}
    ]
  }}
]

Input:
{input}
"#
    )
}
