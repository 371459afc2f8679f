//! Complaint intake request and its extracted documents
//!
//! Generation state machine:
//! DRAFT → IN_PROGRESS → COMPLETED, with IN_PROGRESS → FAILED when an
//! aggregate pass or persistence step fails. IN_PROGRESS is the lock held by
//! exactly one pipeline run; COMPLETED and FAILED release it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Ward label used for documents that carry no ward
pub const WARD_NOT_PROVIDED: &str = "Ward not provided";

/// Maximum title length accepted on creation
const MAX_TITLE_LEN: usize = 120;

/// Request lifecycle status (stored as an integer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Active,
    Deleted,
}

impl RequestStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            RequestStatus::Deleted => 0,
            RequestStatus::Active => 1,
            RequestStatus::Pending => -1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(RequestStatus::Deleted),
            1 => Some(RequestStatus::Active),
            -1 => Some(RequestStatus::Pending),
            _ => None,
        }
    }
}

/// Generation status; doubles as the per-request pipeline lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GenerationStatus {
    /// Created, never generated
    Draft,
    /// A pipeline run holds the request
    InProgress,
    /// Documents and all three reports are persisted
    Completed,
    /// Last run failed after acquiring the request
    Failed,
}

impl GenerationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationStatus::Draft => "draft",
            GenerationStatus::InProgress => "inProgress",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(GenerationStatus::Draft),
            "inProgress" => Ok(GenerationStatus::InProgress),
            "completed" => Ok(GenerationStatus::Completed),
            "failed" => Ok(GenerationStatus::Failed),
            other => Err(format!("unknown generation status: {}", other)),
        }
    }
}

/// Bilingual problem text; both fields are populated independently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDescription {
    pub english: String,
    pub hindi: String,
}

/// One grievance within a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Unique within the owning document; clusters reference it
    pub id: Uuid,
    pub category: Vec<String>,
    pub description: ProblemDescription,
}

/// One extracted complainant record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Assigned at extraction time, stable afterwards
    pub id: Uuid,
    pub name: String,
    pub ward: Option<String>,
    pub phone_number: Option<String>,
    pub country_code: String,
    /// Page image the record was read from
    pub image_url: String,
    /// Source PDF reference
    pub doc_url: String,
    pub issues: Vec<String>,
    pub problems: Vec<Problem>,
}

impl Document {
    /// Ward label used for grouping; blank or missing wards share the sentinel
    pub fn ward_label(&self) -> &str {
        match self.ward.as_deref().map(str::trim) {
            Some(ward) if !ward.is_empty() => ward,
            _ => WARD_NOT_PROVIDED,
        }
    }
}

/// Complaint intake request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Source PDF references, processed in this order
    pub pdf_files: Vec<String>,
    pub document_count: usize,
    pub documents: Vec<Document>,
    pub status: RequestStatus,
    pub generation_status: GenerationStatus,
    /// Owning user; notifications are addressed here
    pub created_by: String,
    pub generated_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Create a pending draft request
    pub fn new(new_request: NewRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: new_request.title.trim().to_string(),
            description: new_request.description.trim().to_string(),
            pdf_files: new_request.pdf,
            document_count: 0,
            documents: Vec::new(),
            status: RequestStatus::Pending,
            generation_status: GenerationStatus::Draft,
            created_by: new_request.created_by,
            generated_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Listing projection of a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub pdf_files: Vec<String>,
    pub document_count: usize,
    pub generation_status: GenerationStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Request creation payload
#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    pub title: String,
    pub description: String,
    /// Source PDF references (already uploaded)
    pub pdf: Vec<String>,
    pub created_by: String,
}

impl NewRequest {
    /// Validate creation input, returning every violation found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let title = self.title.trim();
        if title.is_empty() {
            errors.push("title must not be empty".to_string());
        } else if title.chars().count() > MAX_TITLE_LEN {
            errors.push(format!("title must be at most {} characters", MAX_TITLE_LEN));
        }
        if self.description.trim().is_empty() {
            errors.push("description must not be empty".to_string());
        }
        if self.pdf.is_empty() {
            errors.push("at least one PDF file is required".to_string());
        }
        if self.pdf.iter().any(|p| p.trim().is_empty()) {
            errors.push("PDF references must not be empty".to_string());
        }
        if self.created_by.trim().is_empty() {
            errors.push("created_by must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
