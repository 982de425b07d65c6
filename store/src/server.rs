use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Context;
use common_blob_store::{BlobStore, BlobStoreProbe, KeyScheme, S3BlobStore};
use common_database::{get_pool, PgProbe};
use health::{spawn_heartbeat, spawn_probe_loop, HealthRegistry};
use tokio::net::TcpListener;

use crate::{
    config::Config, repository::PgFileRepository, router::router, service::FileService,
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

    let storage: Arc<dyn BlobStore> = Arc::new(S3BlobStore::from_config(
        &config.object_storage,
        KeyScheme::new(&config.files_prefix, "txt"),
    ));

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
        BlobStoreProbe(storage.clone()),
        PROBE_INTERVAL,
    );

    let files = FileService::new(
        Arc::new(PgFileRepository::new(pool)),
        storage,
        config.hash_algorithm,
    );

    let app = router(
        Arc::new(files),
        liveness,
        config.max_upload_bytes,
        config.enable_metrics,
    );

    tracing::info!(
        address = ?listener.local_addr()?,
        hash_algorithm = %config.hash_algorithm,
        "store service listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")
}
