//! Cross-document common-problem clustering
//!
//! Every problem of a request goes to the model in one prompt; the answer
//! must group each problem exactly once. Shape violations anywhere fail the
//! whole pass.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::ai_client::CompletionBackend;
use super::ai_output::{clean_tags, parse_json_array, RawProblemRef};
use super::partition::{verify_common_groups, ProblemSet};
use crate::error::PipelineError;
use crate::models::{CommonProblemGroup, Document};

/// One problem as presented to the model
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptProblem<'a> {
    source_document_id: Uuid,
    id: Uuid,
    category: &'a [String],
    description: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGroup {
    #[serde(default)]
    problem_ids: Vec<RawProblemRef>,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    summary: String,
}

pub struct CommonProblemClusterer {
    backend: Arc<dyn CompletionBackend>,
}

impl CommonProblemClusterer {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Partition every problem of `documents` into summarized groups
    pub async fn cluster(&self, documents: &[Document]) -> Result<Vec<CommonProblemGroup>, PipelineError> {
        let set = ProblemSet::from_documents(documents);
        if set.is_empty() {
            return Ok(Vec::new());
        }

        let problems: Vec<PromptProblem<'_>> = documents
            .iter()
            .flat_map(|doc| {
                doc.problems.iter().map(move |p| PromptProblem {
                    source_document_id: doc.id,
                    id: p.id,
                    category: &p.category,
                    description: &p.description.english,
                })
            })
            .collect();

        let input = serde_json::to_string_pretty(&problems)
            .map_err(|e| PipelineError::InvalidClusterFormat(e.to_string()))?;
        let prompt = common_problems_prompt(&input);

        let text = self
            .backend
            .complete(&prompt, &[])
            .await
            .map_err(|e| PipelineError::ExtractionCallFailed(format!("common problems: {}", e)))?;

        let raw: Vec<RawGroup> = parse_json_array(&text)
            .map_err(|e| invalid(format!("not a JSON group array: {}", e)))?;

        let groups = raw
            .into_iter()
            .enumerate()
            .map(|(index, group)| build_group(index, group))
            .collect::<Result<Vec<_>, _>>()?;

        verify_common_groups(&set, &groups).map_err(|e| invalid(e.to_string()))?;

        tracing::debug!(
            problems = set.len(),
            groups = groups.len(),
            "Common problem groups built"
        );
        Ok(groups)
    }
}

fn invalid(reason: String) -> PipelineError {
    PipelineError::InvalidClusterFormat(format!("common problems: {}", reason))
}

fn build_group(index: usize, raw: RawGroup) -> Result<CommonProblemGroup, PipelineError> {
    if raw.problem_ids.is_empty() {
        return Err(invalid(format!("group {} has no problemIds", index)));
    }
    let issues = clean_tags(&raw.issues);
    if issues.is_empty() {
        return Err(invalid(format!("group {} has no issues", index)));
    }
    let summary = raw.summary.trim();
    if summary.is_empty() {
        return Err(invalid(format!("group {} has no summary", index)));
    }

    let problem_ids = raw
        .problem_ids
        .iter()
        .map(RawProblemRef::parse)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(format!("group {}: {}", index, e)))?;

    Ok(CommonProblemGroup {
        id: Uuid::new_v4(),
        problem_ids,
        issues,
        summary: summary.to_string(),
    })
}

fn common_problems_prompt(input: &str) -> String {
    format!(
        r#"You analyze citizen complaints about civic infrastructure.

Below is a JSON array of problems. Each has "sourceDocumentId", "id", "category" (tags) and "description" (English text).

Group the problems into common-problem groups using:
- overlap of category tags
- semantic similarity of the English descriptions

For each group return:
- "problemIds": array of {{ "docId": <sourceDocumentId>, "problemId": <id> }}
- "issues": merged, deduplicated category tags of the group
- "summary": one specific sentence describing the shared problem

Rules:
- Every problem must appear in exactly one group. Do not skip or repeat any.
- Use only ids from the input.
- Avoid generic summaries.

Return only a JSON array:
[
  {{
    "problemIds": [{{ "docId": "...", "problemId": "..." }}],
    "issues": ["..."],
    "summary": "..."
  }}
]

Problems:
{input}
"#
    )
}
