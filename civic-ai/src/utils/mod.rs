//! Utility modules for civic-ai

pub mod retry;

pub use retry::{retry_on_lock, retry_transient, RetryPolicy, Transient};
