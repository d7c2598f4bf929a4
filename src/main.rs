use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use llm_gateway::config::{load_dotenv, AppConfig};
use llm_gateway::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 日志
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("llm_gateway=debug,tower_http=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. 配置
    load_dotenv();
    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!(
        ollama = %config.ollama.base_url,
        openllm = %config.openllm.base_url,
        "configuration loaded"
    );

    // 3. 共享状态与后台健康检查
    let state = AppState::from_config(config.clone())?;
    state.health.clone().start_background_checks();

    // 4. 路由与监听
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let app = build_router(state);

    tracing::info!(%addr, "llm-gateway listening");
    tracing::info!("health: http://127.0.0.1:{}/health, status: http://127.0.0.1:{}/status", addr.port(), addr.port());

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
