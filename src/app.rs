use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request};
use axum::middleware::Next;
use axum::routing::{get, post};
use axum::{Extension, Router};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::handlers::{chat, models, openllm, products, system, users};
use crate::health_monitor::HealthMonitor;
use crate::middleware::{self, SharedRequestStats};
use crate::store::{self, Product, RecordStore, User};
use crate::upstream::{InferenceBackend, OllamaClient, OpenLlmClient};

/// Everything a handler can reach. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub ollama: Arc<dyn InferenceBackend>,
    pub openllm: Arc<dyn InferenceBackend>,
    pub users: Arc<Mutex<RecordStore<User>>>,
    pub products: Arc<Mutex<RecordStore<Product>>>,
    pub stats: SharedRequestStats,
    pub health: Arc<HealthMonitor>,
    pub started_at: Instant,
}

impl AppState {
    /// State with the demo records and the given backends.
    pub fn new(
        config: Arc<AppConfig>,
        ollama: Arc<dyn InferenceBackend>,
        openllm: Arc<dyn InferenceBackend>,
    ) -> Self {
        let health = HealthMonitor::new(vec![ollama.clone(), openllm.clone()])
            .with_check_interval(config.health_check_interval);
        Self {
            config,
            ollama,
            openllm,
            users: Arc::new(Mutex::new(store::users::seeded())),
            products: Arc::new(Mutex::new(store::products::seeded())),
            stats: SharedRequestStats::default(),
            health: Arc::new(health),
            started_at: Instant::now(),
        }
    }

    /// State talking to the daemons named in `config`.
    pub fn from_config(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let ollama = Arc::new(OllamaClient::new(config.ollama.clone())?);
        let openllm = Arc::new(OpenLlmClient::new(config.openllm.clone())?);
        Ok(Self::new(config, ollama, openllm))
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/chat", post(chat::chat))
        .route("/chat/stream", post(chat::chat_stream))
        .route("/models", get(models::list_models))
        .route("/models/:name", get(models::get_model))
        .route("/openllm/chat", post(openllm::chat))
        .route("/openllm/generate", post(openllm::generate))
        .route("/openllm/health", get(openllm::health))
        .route("/openllm/models", get(openllm::list_models))
        .route(
            "/users",
            get(users::list)
                .post(users::create)
                .put(users::update_from_body)
                .delete(users::delete_from_body),
        )
        .route(
            "/users/:id",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route(
            "/products",
            get(products::list)
                .post(products::create)
                .put(products::bulk_update)
                .delete(products::bulk_delete),
        )
        .route(
            "/products/:id",
            get(products::get).put(products::update).delete(products::delete),
        );

    let stats = state.stats.clone();
    let cors = cors_layer(&state.config.cors_origin);

    Router::new()
        .route("/health", get(system::health))
        .route("/status", get(system::status))
        .nest("/api", api)
        .fallback(system::not_found)
        .layer(Extension(state))
        .layer(axum::middleware::from_fn(move |req: Request<Body>, next: Next<Body>| {
            let stats = stats.clone();
            async move { middleware::track_requests(req, next, stats).await }
        }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origin.trim() == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin.trim()) {
        Ok(value) => layer.allow_origin(value),
        Err(e) => {
            tracing::warn!("Invalid CORS_ORIGIN {:?} ({}), allowing any origin", origin, e);
            layer.allow_origin(Any)
        }
    }
}
