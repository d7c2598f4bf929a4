use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{http::Request, middleware::Next, response::Response};
use serde::Serialize;

/// Process-wide request counters shown on the status page.
#[derive(Debug, Default)]
pub struct RequestStats {
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    streams_opened: AtomicU64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub streams_opened: u64,
}

pub type SharedRequestStats = Arc<RequestStats>;

impl RequestStats {
    pub fn record_stream(&self) {
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
        }
    }
}

/// Counts every request and logs its outcome.
pub async fn track_requests<B>(req: Request<B>, next: Next<B>, stats: SharedRequestStats) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    stats.total_requests.fetch_add(1, Ordering::Relaxed);
    let response = next.run(req).await;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        stats.failed_requests.fetch_add(1, Ordering::Relaxed);
    }
    tracing::debug!(
        %method,
        %path,
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request finished"
    );
    response
}
