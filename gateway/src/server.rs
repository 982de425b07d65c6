use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Context;
use health::{spawn_heartbeat, spawn_probe_loop, HealthRegistry};
use tokio::net::TcpListener;

use crate::{
    config::Config,
    proxy::{Upstream, UpstreamProbe},
    router::{router, AppState},
};

const PROBE_INTERVAL: Duration = Duration::from_secs(10);
const PROBE_DEADLINE: Duration = Duration::from_secs(30);

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let client = reqwest::Client::builder()
        .timeout(config.upstream_timeout())
        .build()
        .context("failed to build upstream client")?;

    let store = Upstream::new("store", &config.store_service_url);
    let analysis = Upstream::new("analysis", &config.analysis_service_url);

    let liveness = HealthRegistry::new("liveness");
    let simple_loop = liveness
        .register("simple_loop".to_string(), PROBE_DEADLINE)
        .await;
    spawn_heartbeat(simple_loop, PROBE_INTERVAL);

    for upstream in [&store, &analysis] {
        let handle = liveness
            .register(format!("upstream_{}", upstream.name), PROBE_DEADLINE)
            .await;
        spawn_probe_loop(
            handle,
            UpstreamProbe::new(client.clone(), upstream.clone()),
            PROBE_INTERVAL,
        );
    }

    let state = AppState {
        client,
        store: Arc::new(store),
        analysis: Arc::new(analysis),
        max_body_bytes: config.max_body_bytes,
    };
    let app = router(state, liveness, config.enable_metrics);

    tracing::info!(
        address = ?listener.local_addr()?,
        store = %config.store_service_url,
        analysis = %config.analysis_service_url,
        "gateway listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")
}
