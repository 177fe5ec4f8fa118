//! Shared application context.
//!
//! [`AppContext`] is passed to every route handler via Axum state. It is
//! cheaply cloneable because it only holds `Arc`s and tokens.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use soundpress_av::{ToolRegistry, Transcoder};
use soundpress_core::config::Config;

use crate::middleware::rate_limit::SharedLimiter;
use crate::store::JobStore;

/// Application context shared by all request handlers.
#[derive(Clone)]
pub struct AppContext {
    /// Immutable configuration snapshot.
    pub config: Arc<Config>,
    /// The in-memory job store.
    pub store: Arc<JobStore>,
    /// The encoder backend. Swapped for a scripted one in tests.
    pub transcoder: Arc<dyn Transcoder>,
    /// External tool registry (ffmpeg, ffprobe).
    pub tools: Arc<ToolRegistry>,
    /// Admission control: one permit per concurrently running transcode.
    pub slots: Arc<Semaphore>,
    /// Rate limiter for job submission.
    pub limiter: SharedLimiter,
    /// Fired on shutdown; stops background tasks and running encodes.
    pub shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(
        config: Arc<Config>,
        transcoder: Arc<dyn Transcoder>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.jobs.max_concurrent));
        let limiter =
            crate::middleware::rate_limit::create_limiter(config.server.rate_limit_per_minute);
        Self {
            config,
            store: Arc::new(JobStore::new()),
            transcoder,
            tools,
            slots,
            limiter,
            shutdown: CancellationToken::new(),
        }
    }
}
