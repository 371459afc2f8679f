//! Test Helper Utilities
//!
//! Temp-file database, stub rasterizer and a prompt-aware stub AI backend
//! shared by the civic-ai integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use civic_ai::db::{init_database_pool, requests};
use civic_ai::models::{NewRequest, Request};
use civic_ai::services::{
    AiError, CompletionBackend, GenerationOrchestrator, PageImage, PageRasterizer,
    RasterizeError,
};
use civic_common::config::RootFolderInitializer;
use civic_common::events::{CivicEvent, EventBus};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Root folder, database and event bus for one test
pub struct TestEnv {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub layout: RootFolderInitializer,
    pub event_bus: EventBus,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let layout = RootFolderInitializer::new(dir.path().join("root"));
        layout.ensure_directory_exists().unwrap();
        let pool = init_database_pool(&layout.database_path()).await.unwrap();
        Self {
            dir,
            pool,
            layout,
            event_bus: EventBus::new(256),
        }
    }

    pub fn orchestrator(
        &self,
        rasterizer: StubRasterizer,
        backend: Arc<StubBackend>,
    ) -> Arc<GenerationOrchestrator> {
        self.orchestrator_with(Arc::new(rasterizer), backend)
    }

    pub fn orchestrator_with(
        &self,
        rasterizer: Arc<dyn PageRasterizer>,
        backend: Arc<StubBackend>,
    ) -> Arc<GenerationOrchestrator> {
        Arc::new(GenerationOrchestrator::new(
            self.pool.clone(),
            self.event_bus.clone(),
            rasterizer,
            backend,
            self.layout.clone(),
        ))
    }

    /// Insert a draft request over `/uploads/pdf/<stem>.pdf` files
    pub async fn create_request(&self, owner: &str, stems: &[&str]) -> Request {
        let pdf = stems
            .iter()
            .map(|stem| {
                let reference = format!("/uploads/pdf/{}.pdf", stem);
                std::fs::write(self.layout.pdf_upload_dir().join(format!("{}.pdf", stem)), b"%PDF-1.4")
                    .unwrap();
                reference
            })
            .collect();
        let request = Request::new(NewRequest {
            title: "Ward survey".to_string(),
            description: "Complaints collected door to door".to_string(),
            pdf,
            created_by: owner.to_string(),
        });
        requests::create_request(&self.pool, &request).await.unwrap();
        request
    }
}

/// Drain everything currently buffered on a subscription
pub fn drain_events(rx: &mut broadcast::Receiver<CivicEvent>) -> Vec<CivicEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Rasterizer writing `<stem>-page-<n>.jpg` placeholders
#[derive(Clone, Default)]
pub struct StubRasterizer {
    pub pages_per_file: usize,
    pub failing: HashSet<String>,
}

impl StubRasterizer {
    pub fn pages(pages_per_file: usize) -> Self {
        Self {
            pages_per_file,
            failing: HashSet::new(),
        }
    }

    pub fn failing_on(mut self, stem: &str) -> Self {
        self.failing.insert(stem.to_string());
        self
    }
}

#[async_trait]
impl PageRasterizer for StubRasterizer {
    async fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, RasterizeError> {
        let stem = pdf
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if self.failing.contains(&stem) {
            return Err(RasterizeError::ConverterFailed(format!("cannot convert {}", stem)));
        }
        if !pdf.is_file() {
            return Err(RasterizeError::SourceUnreadable(pdf.display().to_string()));
        }

        std::fs::create_dir_all(out_dir)?;
        (1..=self.pages_per_file)
            .map(|n| {
                let path = out_dir.join(format!("{}-page-{}.jpg", stem, n));
                std::fs::write(&path, [0xff, 0xd8, 0xff])?;
                Ok(path)
            })
            .collect()
    }
}

/// Rasterizer that panics on every call
pub struct PanickingRasterizer;

#[async_trait]
impl PageRasterizer for PanickingRasterizer {
    async fn rasterize(&self, pdf: &Path, _out_dir: &Path) -> Result<Vec<PathBuf>, RasterizeError> {
        panic!("converter crashed on {}", pdf.display());
    }
}

/// How the stub answers clustering prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterReply {
    /// Valid partitions derived from the prompt input
    Valid,
    /// Common-problem groups without a summary
    MissingSummary,
}

/// AI backend that answers by prompt kind
///
/// Extraction replies are looked up by the stem of the first attached page
/// image. Clustering replies are built from the problems listed in the
/// prompt: one common group per first category tag and one ward group per
/// ward with a single sub-group.
pub struct StubBackend {
    extraction: HashMap<String, String>,
    cluster_reply: ClusterReply,
    calls: Mutex<Vec<&'static str>>,
}

impl StubBackend {
    pub fn new(cluster_reply: ClusterReply) -> Self {
        Self {
            extraction: HashMap::new(),
            cluster_reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply for pages of `stem`
    pub fn with_extraction(mut self, stem: &str, reply: Value) -> Self {
        self.extraction.insert(stem.to_string(), reply.to_string());
        self
    }

    /// Raw (possibly malformed) reply for pages of `stem`
    pub fn with_raw_extraction(mut self, stem: &str, reply: &str) -> Self {
        self.extraction.insert(stem.to_string(), reply.to_string());
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, kind: &'static str) {
        self.calls.lock().unwrap().push(kind);
    }
}

#[async_trait]
impl CompletionBackend for StubBackend {
    async fn complete(&self, prompt: &str, images: &[PageImage]) -> Result<String, AiError> {
        if let Some((_, input)) = prompt.rsplit_once("Problems:\n") {
            self.record("common");
            let problems: Vec<Value> = serde_json::from_str(input.trim()).unwrap();
            return Ok(common_reply(&problems, self.cluster_reply).to_string());
        }

        if let Some((_, input)) = prompt.rsplit_once("Input:\n") {
            self.record("ward");
            let problems: Vec<Value> = serde_json::from_str(input.trim()).unwrap();
            return Ok(ward_reply(&problems).to_string());
        }

        self.record("extract");
        let first = images
            .first()
            .and_then(|i| i.path.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let stem = first.split("-page-").next().unwrap_or_default();
        self.extraction
            .get(stem)
            .cloned()
            .ok_or_else(|| AiError::Api {
                status: 400,
                body: format!("no scripted reply for {}", stem),
            })
    }
}

fn common_reply(problems: &[Value], mode: ClusterReply) -> Value {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
    for p in problems {
        let tag = p["category"][0].as_str().unwrap_or("general").to_string();
        if !groups.contains_key(&tag) {
            order.push(tag.clone());
        }
        groups.entry(tag).or_default().push(json!({
            "docId": p["sourceDocumentId"],
            "problemId": p["id"],
        }));
    }

    Value::Array(
        order
            .into_iter()
            .map(|tag| {
                let ids = groups.remove(&tag).unwrap_or_default();
                match mode {
                    ClusterReply::Valid => json!({
                        "problemIds": ids,
                        "issues": [tag],
                        "summary": format!("Residents report {} problems.", tag),
                    }),
                    ClusterReply::MissingSummary => json!({
                        "problemIds": ids,
                        "issues": [tag],
                    }),
                }
            })
            .collect(),
    )
}

fn ward_reply(problems: &[Value]) -> Value {
    let mut order: Vec<String> = Vec::new();
    let mut wards: HashMap<String, Vec<Value>> = HashMap::new();
    for p in problems {
        let ward = p["ward"].as_str().unwrap_or_default().to_string();
        if !wards.contains_key(&ward) {
            order.push(ward.clone());
        }
        wards.entry(ward).or_default().push(json!({
            "docId": p["docId"],
            "problemId": p["problemId"],
        }));
    }

    Value::Array(
        order
            .into_iter()
            .map(|ward| {
                let ids = wards.remove(&ward).unwrap_or_default();
                json!({
                    "ward": ward,
                    "category": "civic services",
                    "problems": [{
                        "issues": ["general"],
                        "summary": "Several service complaints.",
                        "problemIds": ids,
                    }],
                })
            })
            .collect(),
    )
}

/// Extraction reply: one record on page 1 with the given ward and problem tags
pub fn one_record(name: &str, ward: Option<&str>, categories: &[&str]) -> Value {
    let problems: Vec<Value> = categories
        .iter()
        .map(|c| {
            json!({
                "category": [c],
                "description": {
                    "english": format!("There is a {} problem", c),
                    "hindi": format!("{} की समस्या है", c),
                },
            })
        })
        .collect();
    json!([{
        "pageToken": "page-1",
        "name": name,
        "ward": ward,
        "phoneNumber": "9876543210",
        "issues": categories,
        "problems": problems,
    }])
}
