use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Liveness reporting for the moving parts of a service.
///
/// Each service depends on a handful of things it cannot serve without:
/// the Postgres pool, the object storage bucket, its own request loop.
/// Every one of them is registered as a component and must keep reporting
/// healthy before its deadline expires:
///   - if any component reported unhealthy, the process is unhealthy
///   - if a component missed its deadline, it is marked stalled and the
///     process is unhealthy
///   - a registry with no components is unhealthy
///
/// Readiness is a separate, static probe and is not handled here.
#[derive(Default, Debug)]
pub struct HealthStatus {
    pub healthy: bool,
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    /// 200 when healthy, 500 otherwise. The body lists every component for debugging.
    fn into_response(self) -> Response {
        let body = format!("{self:?}");
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Set on registration, until the first report
    Starting,
    /// Reported healthy, must report again before the deadline
    HealthyUntil(time::OffsetDateTime),
    Unhealthy,
    /// The HealthyUntil deadline passed without a new report
    Stalled,
}

struct HealthMessage {
    component: String,
    status: ComponentStatus,
}

#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    sender: mpsc::Sender<HealthMessage>,
}

impl HealthHandle {
    /// Must be called more often than the deadline given at registration.
    pub async fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            time::OffsetDateTime::now_utc().add(self.deadline),
        ))
        .await
    }

    pub async fn report_status(&self, status: ComponentStatus) {
        let message = HealthMessage {
            component: self.component.clone(),
            status,
        };
        if let Err(err) = self.sender.send(message).await {
            warn!("failed to report health status: {}", err)
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }
}

/// A dependency check run periodically by [`spawn_probe_loop`].
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self) -> bool;
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
    sender: mpsc::Sender<HealthMessage>,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        let (tx, mut rx) = mpsc::channel::<HealthMessage>(16);
        let registry = Self {
            name: name.to_owned(),
            components: Default::default(),
            sender: tx,
        };

        let components = registry.components.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Ok(mut map) = components.write() {
                    _ = map.insert(message.component, message.status);
                } else {
                    warn!("poisoned HealthRegistry lock")
                }
            }
        });

        registry
    }

    /// Registers a component. The returned handle is given to whatever reports on it.
    pub async fn register(&self, component: String, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component,
            deadline,
            sender: self.sender.clone(),
        };
        handle.report_status(ComponentStatus::Starting).await;
        handle
    }

    /// Overall process status. Usable directly as an axum handler result.
    pub fn get_status(&self) -> HealthStatus {
        let components = match self.components.read() {
            Ok(components) => components,
            Err(_) => {
                warn!("poisoned HealthRegistry lock");
                return HealthStatus::default();
            }
        };

        let now = time::OffsetDateTime::now_utc();
        let mut result = HealthStatus {
            healthy: !components.is_empty(),
            components: HashMap::with_capacity(components.len()),
        };

        for (name, status) in components.iter() {
            let status = match status {
                ComponentStatus::HealthyUntil(until) if until.gt(&now) => status.clone(),
                ComponentStatus::HealthyUntil(_) => ComponentStatus::Stalled,
                other => other.clone(),
            };
            if !matches!(status, ComponentStatus::HealthyUntil(_)) {
                result.healthy = false;
            }
            _ = result.components.insert(name.clone(), status);
        }

        match result.healthy {
            true => info!("{} health check ok", self.name),
            false => warn!("{} health check failed: {:?}", self.name, result.components),
        }
        result
    }
}

/// Reports healthy on a fixed interval for as long as the runtime is alive.
pub fn spawn_heartbeat(handle: HealthHandle, interval: Duration) {
    tokio::spawn(async move {
        loop {
            handle.report_healthy().await;
            tokio::time::sleep(interval).await;
        }
    });
}

/// Runs `probe` on a fixed interval and reports its outcome through `handle`.
pub fn spawn_probe_loop<P>(handle: HealthHandle, probe: P, interval: Duration)
where
    P: Probe + 'static,
{
    tokio::spawn(async move {
        loop {
            if probe.probe().await {
                handle.report_healthy().await;
            } else {
                warn!(component = handle.component(), "dependency probe failed");
                handle.report_status(ComponentStatus::Unhealthy).await;
            }
            tokio::time::sleep(interval).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn assert_or_retry<F>(check: F)
    where
        F: Fn() -> bool,
    {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !check() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(check())
    }

    #[tokio::test]
    async fn defaults_to_unhealthy() {
        let registry = HealthRegistry::new("liveness");
        assert!(!registry.get_status().healthy);
    }

    #[tokio::test]
    async fn component_lifecycle() {
        let registry = HealthRegistry::new("liveness");

        let handle = registry
            .register("postgres".to_string(), Duration::from_secs(30))
            .await;
        assert_or_retry(|| registry.get_status().components.len() == 1).await;
        assert_eq!(
            registry.get_status().components.get("postgres"),
            Some(&ComponentStatus::Starting)
        );
        assert!(!registry.get_status().healthy);

        handle.report_healthy().await;
        assert_or_retry(|| registry.get_status().healthy).await;

        handle.report_status(ComponentStatus::Unhealthy).await;
        assert_or_retry(|| !registry.get_status().healthy).await;
        assert_eq!(
            registry.get_status().components.get("postgres"),
            Some(&ComponentStatus::Unhealthy)
        );
    }

    #[tokio::test]
    async fn missed_deadline_is_stalled() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry
            .register("object_storage".to_string(), Duration::from_millis(1))
            .await;
        handle.report_healthy().await;

        assert_or_retry(|| {
            registry.get_status().components.get("object_storage")
                == Some(&ComponentStatus::Stalled)
        })
        .await;
        assert!(!registry.get_status().healthy);
    }

    #[tokio::test]
    async fn one_failing_component_fails_the_process() {
        let registry = HealthRegistry::new("liveness");
        let ok = registry
            .register("http".to_string(), Duration::from_secs(30))
            .await;
        let failing = registry
            .register("postgres".to_string(), Duration::from_secs(30))
            .await;
        ok.report_healthy().await;
        failing.report_status(ComponentStatus::Unhealthy).await;

        assert_or_retry(|| registry.get_status().components.len() == 2).await;
        assert_or_retry(|| {
            registry.get_status().components.get("http").map(|s| s != &ComponentStatus::Starting)
                == Some(true)
        })
        .await;
        assert!(!registry.get_status().healthy);
    }

    struct Toggle(Arc<AtomicBool>);

    #[async_trait]
    impl Probe for Toggle {
        async fn probe(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn probe_loop_follows_the_probe() {
        let registry = HealthRegistry::new("liveness");
        let up = Arc::new(AtomicBool::new(true));
        let handle = registry
            .register("postgres".to_string(), Duration::from_secs(30))
            .await;
        spawn_probe_loop(handle, Toggle(up.clone()), Duration::from_millis(10));

        assert_or_retry(|| registry.get_status().healthy).await;

        up.store(false, Ordering::SeqCst);
        assert_or_retry(|| !registry.get_status().healthy).await;
    }

    #[tokio::test]
    async fn status_response_codes() {
        let healthy = HealthStatus {
            healthy: true,
            components: Default::default(),
        };
        assert_eq!(healthy.into_response().status(), StatusCode::OK);

        let unhealthy = HealthStatus::default();
        assert_eq!(
            unhealthy.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
