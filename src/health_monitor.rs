use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::envelope::timestamp;
use crate::upstream::InferenceBackend;

#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub service: &'static str,
    pub healthy: bool,
}

/// Result of the most recent background probe round.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub checked_at: String,
    pub backends: Vec<BackendHealth>,
}

/// HealthMonitor 定期探测上游推理服务，只用于状态页展示。
pub struct HealthMonitor {
    backends: Vec<Arc<dyn InferenceBackend>>,
    last: RwLock<Option<HealthSnapshot>>,
    check_interval: Duration,
}

impl HealthMonitor {
    pub fn new(backends: Vec<Arc<dyn InferenceBackend>>) -> Self {
        Self {
            backends,
            last: RwLock::new(None),
            check_interval: Duration::from_secs(60),
        }
    }

    /// 设置检查间隔
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub async fn snapshot(&self) -> Option<HealthSnapshot> {
        self.last.read().await.clone()
    }

    /// Probes every backend once and stores the result.
    pub async fn check_now(&self) -> HealthSnapshot {
        let mut backends = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let healthy = backend.check_health().await;
            if !healthy {
                tracing::warn!("{} is not reachable", backend.name());
            }
            backends.push(BackendHealth {
                service: backend.name(),
                healthy,
            });
        }

        let snapshot = HealthSnapshot {
            checked_at: timestamp(),
            backends,
        };
        *self.last.write().await = Some(snapshot.clone());
        snapshot
    }

    /// 启动后台探测任务。间隔为 0 时不启动。
    pub fn start_background_checks(self: Arc<Self>) {
        if self.check_interval.is_zero() {
            tracing::info!("Background health checks disabled");
            return;
        }

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.check_interval);
            loop {
                ticker.tick().await;
                let snapshot = self.check_now().await;
                tracing::debug!(?snapshot, "Background health check completed");
            }
        });
    }
}
