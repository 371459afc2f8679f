//! Aggregate reports derived from a request's documents
//!
//! A request owns at most one report of each kind; a new successful run
//! replaces the previous report wholesale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to one problem inside one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProblemRef {
    pub doc_id: Uuid,
    pub problem_id: Uuid,
}

/// Cross-document cluster of similar problems
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonProblemGroup {
    pub id: Uuid,
    pub problem_ids: Vec<ProblemRef>,
    /// Merged, deduplicated category tags
    pub issues: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonProblemReport {
    pub id: Uuid,
    pub request_id: Uuid,
    pub common_problems: Vec<CommonProblemGroup>,
    pub created_at: DateTime<Utc>,
}

/// Sub-cluster of similar problems inside one ward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardProblemGroup {
    pub issues: Vec<String>,
    pub summary: String,
    pub problem_ids: Vec<ProblemRef>,
}

/// All clustered problems of one ward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardGroup {
    pub ward_id: Uuid,
    pub ward: String,
    /// Single label summarizing the ward's problems
    pub category: String,
    pub problems: Vec<WardProblemGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardReport {
    pub id: Uuid,
    pub request_id: Uuid,
    pub wards: Vec<WardGroup>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub issue: String,
    pub problem_count: usize,
}

/// Exact per-ward counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardTally {
    pub ward: String,
    pub total_problems: usize,
    pub category: Vec<CategoryCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardAnalysisReport {
    pub id: Uuid,
    pub request_id: Uuid,
    pub wards: Vec<WardTally>,
    pub created_at: DateTime<Utc>,
}

impl CommonProblemReport {
    pub fn new(request_id: Uuid, common_problems: Vec<CommonProblemGroup>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            common_problems,
            created_at: Utc::now(),
        }
    }
}

impl WardReport {
    pub fn new(request_id: Uuid, wards: Vec<WardGroup>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            wards,
            created_at: Utc::now(),
        }
    }
}

impl WardAnalysisReport {
    pub fn new(request_id: Uuid, wards: Vec<WardTally>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            wards,
            created_at: Utc::now(),
        }
    }
}
