//! Data models for civic-ai (complaint ingestion service)
//!
//! - Request lifecycle and generation state machine
//! - Extracted complaint documents and problems
//! - Aggregate reports derived from a request's documents

pub mod report;
pub mod request;

pub use report::{
    CategoryCount, CommonProblemGroup, CommonProblemReport, ProblemRef, WardAnalysisReport,
    WardGroup, WardProblemGroup, WardReport, WardTally,
};
pub use request::{
    Document, GenerationStatus, NewRequest, Problem, ProblemDescription, Request, RequestStatus,
    RequestSummary, WARD_NOT_PROVIDED,
};
