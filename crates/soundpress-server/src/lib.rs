//! HTTP server for soundpress: the in-memory job store and lifecycle
//! engine, the orchestrator driving transcodes, and the Axum API surface.

pub mod context;
pub mod error;
pub mod middleware;
pub mod orchestrator;
pub mod router;
pub mod routes;
pub mod store;

pub use context::AppContext;
pub use error::AppError;
pub use router::build_router;
pub use store::{JobStore, JobUpdate};
