//! Service modules for the complaint ingestion pipeline
//!
//! Leaf-first: rasterizer, AI client, extractor, accumulator, the two
//! clusterers and the ward tally; `pipeline` sequences them.

pub mod accumulator;
pub mod ai_client;
pub mod ai_output;
pub mod common_problems;
pub mod extractor;
pub mod partition;
pub mod pipeline;
pub mod rasterizer;
pub mod ward_clusterer;
pub mod ward_tally;

pub use accumulator::Accumulator;
pub use ai_client::{AiError, CompletionBackend, GeminiClient, PageImage};
pub use common_problems::CommonProblemClusterer;
pub use extractor::Extractor;
pub use pipeline::{FileOutcome, GenerationOrchestrator, RunSummary, StartOutcome};
pub use rasterizer::{PageRasterizer, PdftoppmRasterizer, RasterizeError};
pub use ward_clusterer::WardClusterer;
pub use ward_tally::tally_wards;
