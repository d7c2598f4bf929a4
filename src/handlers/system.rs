use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::app::AppState;
use crate::envelope::{timestamp, ApiResponse};
use crate::health_monitor::HealthSnapshot;
use crate::middleware::StatsSnapshot;

#[derive(Serialize)]
pub struct Liveness {
    status: &'static str,
    timestamp: String,
    uptime_seconds: u64,
}

/// 系统状态信息
#[derive(Serialize)]
pub struct SystemStatus {
    version: &'static str,
    uptime_seconds: u64,
    server_port: u16,
    backends: Backends,
    stats: StatsSnapshot,
    records: RecordCounts,
    health: Option<HealthSnapshot>,
}

#[derive(Serialize)]
pub struct Backends {
    ollama: String,
    openllm: String,
}

#[derive(Serialize)]
pub struct RecordCounts {
    users: usize,
    products: usize,
}

pub async fn health(Extension(state): Extension<AppState>) -> Json<Liveness> {
    Json(Liveness {
        status: "ok",
        timestamp: timestamp(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// 状态页面接口
pub async fn status(Extension(state): Extension<AppState>) -> Json<SystemStatus> {
    let records = RecordCounts {
        users: state.users.lock().await.len(),
        products: state.products.lock().await.len(),
    };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        server_port: state.config.server_port,
        backends: Backends {
            ollama: state.config.ollama.base_url.clone(),
            openllm: state.config.openllm.base_url.clone(),
        },
        stats: state.stats.snapshot(),
        records,
        health: state.health.snapshot().await,
    })
}

pub async fn not_found() -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::failure("NOT_FOUND", "the requested resource does not exist")),
    )
}
