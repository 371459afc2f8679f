//! Complaint extraction from page images
//!
//! One model call per source file with every page attached. The model's
//! loosely-typed records are validated here before any domain
//! [`Document`] is built; nothing it says is trusted as-is.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use super::ai_client::{CompletionBackend, PageImage};
use super::ai_output::parse_json_array;
use crate::error::PipelineError;
use crate::models::{Document, Problem, ProblemDescription};

/// Country code applied when the page shows none
pub const DEFAULT_COUNTRY_CODE: &str = "+91";

/// Fixed category vocabulary offered to the model
pub const CATEGORIES: [&str; 8] = [
    "water",
    "electricity",
    "garbage",
    "pollution",
    "roads",
    "education",
    "farming",
    "general",
];

/// Record shape as the model emits it
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    name: Value,
    #[serde(default)]
    ward: Value,
    #[serde(default)]
    phone_number: Value,
    #[serde(default)]
    country_code: Value,
    #[serde(default)]
    issues: Value,
    #[serde(default)]
    problems: Value,
}

pub struct Extractor {
    backend: Arc<dyn CompletionBackend>,
    service_root: PathBuf,
}

impl Extractor {
    /// `service_root` is the directory image references are made relative to
    pub fn new(backend: Arc<dyn CompletionBackend>, service_root: PathBuf) -> Self {
        Self {
            backend,
            service_root,
        }
    }

    /// Extract complaint records from one file's pages
    ///
    /// Each record is stamped with the page image it came from and with
    /// `doc_url`, the source file reference.
    pub async fn extract(&self, pages: &[PathBuf], doc_url: &str) -> Result<Vec<Document>, PipelineError> {
        if pages.is_empty() {
            return Ok(Vec::new());
        }

        let mut images = Vec::with_capacity(pages.len());
        for page in pages {
            let image = PageImage::load_jpeg(page)
                .await
                .map_err(|e| PipelineError::ExtractionCallFailed(e.to_string()))?;
            images.push(image);
        }

        let prompt = extraction_prompt(pages.len());
        let text = self
            .backend
            .complete(&prompt, &images)
            .await
            .map_err(|e| PipelineError::ExtractionCallFailed(e.to_string()))?;

        tracing::debug!(doc_url, response_chars = text.len(), "Extraction response received");

        let records: Vec<RawRecord> = parse_json_array(&text)
            .map_err(|e| PipelineError::ExtractionParseFailed(format!("not a JSON record array: {}", e)))?;

        let tokens: HashMap<String, usize> = (0..pages.len())
            .map(|i| (page_token(i), i))
            .collect();

        records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                let page = match record.page_token.as_deref().map(str::trim) {
                    Some(token) if !token.is_empty() => *tokens.get(token).ok_or_else(|| {
                        PipelineError::ExtractionParseFailed(format!(
                            "record {} names unknown page '{}'",
                            index, token
                        ))
                    })?,
                    _ if index < pages.len() => index,
                    _ => {
                        return Err(PipelineError::ExtractionParseFailed(format!(
                            "record {} has no page token and exceeds the {} page(s) sent",
                            index,
                            pages.len()
                        )))
                    }
                };
                let image_url = relative_url(&self.service_root, &pages[page]);
                build_document(index, record, image_url, doc_url)
            })
            .collect()
    }
}

/// Token announcing the page at `index` (0-based)
fn page_token(index: usize) -> String {
    format!("page-{}", index + 1)
}

fn extraction_prompt(page_count: usize) -> String {
    let pages: Vec<String> = (0..page_count).map(page_token).collect();
    format!(
        r#"You are reading scanned complaint forms. The {count} attached images are, in order: {pages}.

For every complaint found, emit one record with:
- "pageToken": the token of the image the complaint is on (one of: {pages})
- "name": complainant name. If written in Hindi, transliterate and write it as EnglishName (HindiName), e.g. Ram (राम). English names stay unchanged. Never put the Hindi name first.
- "ward": the ward number or name. It may be labelled "Ward", "Ward No.", "Ward Number", "W.No.", "W-12", "वार्ड", "वार्ड संख्या", "वार्ड क्रमांक" or "वार्ड नंबर". Always use the key "ward".
- "phoneNumber": the phone number as written
- "issues": the unique categories of this complaint's problems
- "problems": one object per marked problem with
  - "category": one or more of {categories}
  - "description": {{ "english": "...", "hindi": "..." }}

Rules:
- Copy each problem literally into the field of its original language and translate it exactly into the other field.
- Never put the same text in both "english" and "hindi".
- Do not summarize, rephrase, infer, or invent problems that are not clearly visible.

Return only a JSON array:
[
  {{
    "pageToken": "page-1",
    "name": "...",
    "ward": "...",
    "phoneNumber": "...",
    "issues": ["water"],
    "problems": [
      {{ "category": ["water"], "description": {{ "english": "...", "hindi": "..." }} }}
    ]
  }}
]"#,
        count = page_count,
        pages = pages.join(", "),
        categories = CATEGORIES.join(", "),
    )
}

fn build_document(
    index: usize,
    record: RawRecord,
    image_url: String,
    doc_url: &str,
) -> Result<Document, PipelineError> {
    let Value::Array(raw_problems) = record.problems else {
        return Err(PipelineError::ExtractionParseFailed(format!(
            "record {}: 'problems' is not an array",
            index
        )));
    };

    let problems = raw_problems
        .iter()
        .enumerate()
        .map(|(p, raw)| build_problem(raw).map_err(|reason| {
            PipelineError::ExtractionParseFailed(format!("record {} problem {}: {}", index, p, reason))
        }))
        .collect::<Result<Vec<_>, _>>()?;

    let mut issues = string_list(&record.issues);
    if issues.is_empty() {
        issues = problems
            .iter()
            .flat_map(|p| p.category.iter().cloned())
            .collect();
    }
    dedup_preserving_order(&mut issues);

    Ok(Document {
        id: Uuid::new_v4(),
        name: loose_string(&record.name).unwrap_or_default(),
        ward: loose_string(&record.ward),
        phone_number: loose_string(&record.phone_number),
        country_code: loose_string(&record.country_code)
            .unwrap_or_else(|| DEFAULT_COUNTRY_CODE.to_string()),
        image_url,
        doc_url: doc_url.to_string(),
        issues,
        problems,
    })
}

fn build_problem(raw: &Value) -> Result<Problem, String> {
    let description = raw
        .get("description")
        .ok_or_else(|| "missing description".to_string())?;
    let english = description
        .get("english")
        .and_then(loose_text)
        .ok_or_else(|| "missing english description".to_string())?;
    let hindi = description
        .get("hindi")
        .and_then(loose_text)
        .ok_or_else(|| "missing hindi description".to_string())?;

    let mut category = raw.get("category").map(string_list).unwrap_or_default();
    dedup_preserving_order(&mut category);

    Ok(Problem {
        id: Uuid::new_v4(),
        category,
        description: ProblemDescription { english, hindi },
    })
}

/// Non-empty trimmed text; numbers are accepted and rendered
fn loose_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        other => loose_text(other),
    }
}

fn loose_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// A single string or a list of strings, blanks dropped
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(loose_text).collect(),
        other => loose_text(other).into_iter().collect(),
    }
}

fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

/// Path relative to `root`, with forward slashes and a leading `/`
pub fn relative_url(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai_client::AiError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedBackend {
        response: Result<String, ()>,
        prompts: Mutex<Vec<(String, usize)>>,
    }

    impl FixedBackend {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for FixedBackend {
        async fn complete(&self, prompt: &str, images: &[PageImage]) -> Result<String, AiError> {
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), images.len()));
            self.response
                .clone()
                .map_err(|_| AiError::Api { status: 500, body: "down".to_string() })
        }
    }

    fn pages(root: &Path, count: usize) -> Vec<PathBuf> {
        let dir = root.join("uploads").join("generated").join("req");
        std::fs::create_dir_all(&dir).unwrap();
        (1..=count)
            .map(|n| {
                let path = dir.join(format!("page-x-{}.jpg", n));
                std::fs::write(&path, [0xff, 0xd8]).unwrap();
                path
            })
            .collect()
    }

    #[tokio::test]
    async fn test_positional_mapping_and_defaults() {
        let root = tempfile::tempdir().unwrap();
        let pages = pages(root.path(), 2);
        let backend = FixedBackend::replying(
            r#"```json
            [
              {"name": "Ram (राम)", "ward": 12, "phoneNumber": "98100",
               "problems": [{"category": "water", "description": {"english": "No water", "hindi": "पानी नहीं"}}]},
              {"name": "Sita", "problems": []}
            ]
            ```"#,
        );
        let extractor = Extractor::new(backend.clone(), root.path().to_path_buf());

        let docs = extractor.extract(&pages, "/uploads/pdf/a.pdf").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].ward.as_deref(), Some("12"));
        assert_eq!(docs[0].country_code, "+91");
        assert_eq!(docs[0].problems[0].category, vec!["water"]);
        assert_eq!(docs[0].issues, vec!["water"]);
        assert_eq!(docs[0].image_url, "/uploads/generated/req/page-x-1.jpg");
        assert_eq!(docs[1].image_url, "/uploads/generated/req/page-x-2.jpg");
        assert_eq!(docs[1].ward, None);
        assert_eq!(docs[1].doc_url, "/uploads/pdf/a.pdf");

        let calls = backend.prompts.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, 2);
        assert!(calls[0].0.contains("page-1, page-2"));
    }

    #[tokio::test]
    async fn test_page_token_overrides_position() {
        let root = tempfile::tempdir().unwrap();
        let pages = pages(root.path(), 2);
        let backend = FixedBackend::replying(
            r#"[
              {"pageToken": "page-2", "name": "B", "problems": []},
              {"pageToken": "page-2", "name": "C", "problems": []},
              {"pageToken": "page-1", "name": "A", "problems": []}
            ]"#,
        );
        let extractor = Extractor::new(backend, root.path().to_path_buf());

        let docs = extractor.extract(&pages, "/a.pdf").await.unwrap();
        assert!(docs[0].image_url.ends_with("page-x-2.jpg"));
        assert!(docs[1].image_url.ends_with("page-x-2.jpg"));
        assert!(docs[2].image_url.ends_with("page-x-1.jpg"));
    }

    #[tokio::test]
    async fn test_unknown_token_and_overflow_rejected() {
        let root = tempfile::tempdir().unwrap();
        let pages = pages(root.path(), 1);

        let unknown = Extractor::new(
            FixedBackend::replying(r#"[{"pageToken": "page-7", "problems": []}]"#),
            root.path().to_path_buf(),
        );
        assert!(matches!(
            unknown.extract(&pages, "/a.pdf").await,
            Err(PipelineError::ExtractionParseFailed(_))
        ));

        let overflow = Extractor::new(
            FixedBackend::replying(r#"[{"problems": []}, {"problems": []}]"#),
            root.path().to_path_buf(),
        );
        assert!(matches!(
            overflow.extract(&pages, "/a.pdf").await,
            Err(PipelineError::ExtractionParseFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_shapes_rejected() {
        let root = tempfile::tempdir().unwrap();
        let pages = pages(root.path(), 1);

        for body in [
            "this is not json",
            r#"{"name": "not an array"}"#,
            r#"[{"name": "A", "problems": "none"}]"#,
            r#"[{"name": "A", "problems": [{"category": ["water"], "description": {"english": "x", "hindi": " "}}]}]"#,
        ] {
            let extractor = Extractor::new(FixedBackend::replying(body), root.path().to_path_buf());
            assert!(
                matches!(
                    extractor.extract(&pages, "/a.pdf").await,
                    Err(PipelineError::ExtractionParseFailed(_))
                ),
                "accepted: {}",
                body
            );
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_call_failure() {
        let root = tempfile::tempdir().unwrap();
        let pages = pages(root.path(), 1);
        let backend = Arc::new(FixedBackend {
            response: Err(()),
            prompts: Mutex::new(Vec::new()),
        });
        let extractor = Extractor::new(backend, root.path().to_path_buf());
        assert!(matches!(
            extractor.extract(&pages, "/a.pdf").await,
            Err(PipelineError::ExtractionCallFailed(_))
        ));
    }

    #[test]
    fn test_relative_url() {
        let root = Path::new("/srv/civic");
        assert_eq!(
            relative_url(root, Path::new("/srv/civic/uploads/generated/r/page-1.jpg")),
            "/uploads/generated/r/page-1.jpg"
        );
        assert_eq!(relative_url(root, Path::new("/elsewhere/p.jpg")), "/elsewhere/p.jpg");
    }
}
