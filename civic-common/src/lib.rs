//! # Civic Common Library
//!
//! Shared code for the civic complaint services:
//! - Error and result types
//! - Event types (`CivicEvent`) and the `EventBus`
//! - Bootstrap configuration and root folder resolution
//! - Server-Sent Events helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
