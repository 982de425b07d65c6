use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Context;
use common_blob_store::{BlobStore, BlobStoreProbe, KeyScheme, S3BlobStore};
use common_database::{get_pool, PgProbe};
use health::{spawn_heartbeat, spawn_probe_loop, HealthRegistry};
use tokio::net::TcpListener;

use crate::{
    clients::{HttpFileTextReader, HttpWordCloud},
    config::Config,
    repository::PgFileStatRepository,
    router::{router, AppState},
    service::AnalysisService,
};

const PROBE_INTERVAL: Duration = Duration::from_secs(10);
const PROBE_DEADLINE: Duration = Duration::from_secs(30);

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let pool = get_pool(&config.database_url, config.max_pg_connections)
        .await
        .context("failed to create Postgres pool")?;
    tracing::info!(
        max_connections = config.max_pg_connections,
        "created Postgres pool"
    );

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
    }

    let options = config.wordcloud.options();
    let picture_content_type = options.content_type();
    let pictures: Arc<dyn BlobStore> = Arc::new(S3BlobStore::from_config(
        &config.object_storage,
        KeyScheme::new(&config.pictures_prefix, &options.format.to_ascii_lowercase()),
    ));

    let texts = HttpFileTextReader::new(&config.store_service_url, config.store_service_timeout())
        .context("failed to build store service client")?;
    let renderer = HttpWordCloud::new(&config.wordcloud.url, options, config.wordcloud.timeout())
        .context("failed to build word cloud client")?;

    let liveness = HealthRegistry::new("liveness");
    let simple_loop = liveness
        .register("simple_loop".to_string(), PROBE_DEADLINE)
        .await;
    spawn_heartbeat(simple_loop, PROBE_INTERVAL);

    let postgres = liveness
        .register("postgres".to_string(), PROBE_DEADLINE)
        .await;
    spawn_probe_loop(postgres, PgProbe(pool.clone()), PROBE_INTERVAL);

    let object_storage = liveness
        .register("object_storage".to_string(), PROBE_DEADLINE)
        .await;
    spawn_probe_loop(
        object_storage,
        BlobStoreProbe(pictures.clone()),
        PROBE_INTERVAL,
    );

    let analysis = AnalysisService::new(
        Arc::new(texts),
        Arc::new(renderer),
        pictures,
        Arc::new(PgFileStatRepository::new(pool)),
    );
    let state = AppState {
        analysis: Arc::new(analysis),
        picture_content_type,
    };

    let app = router(state, liveness, config.enable_metrics);

    tracing::info!(
        address = ?listener.local_addr()?,
        store_service = %config.store_service_url,
        "analysis service listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")
}
