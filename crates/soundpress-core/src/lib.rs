//! Shared types for the soundpress application: the unified error type,
//! typed identifiers, and configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod model;

pub use error::{Error, Result};
pub use ids::JobId;
pub use model::{Job, JobState};
