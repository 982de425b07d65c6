use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Error as SqlxError,
};

pub const DEFAULT_TIMEOUTS: DatabaseTimeouts = DatabaseTimeouts {
    statement_timeout: Duration::from_secs(5),
    lock_timeout: Duration::from_secs(1),
    acquire_timeout: Duration::from_secs(3),
    idle_timeout: Duration::from_secs(300),
    max_lifetime: Duration::from_secs(1800),
    idle_in_transaction_session_timeout: Duration::from_secs(15),
};

#[derive(Debug, Clone)]
pub struct DatabaseTimeouts {
    pub statement_timeout: Duration,
    pub lock_timeout: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub idle_in_transaction_session_timeout: Duration,
}

/// Outcome of an insert keyed by a unique column.
///
/// Repositories never surface a uniqueness conflict as an error: when another
/// writer got there first, the existing row's key is returned as `Existing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted<T> {
    Created(T),
    Existing(T),
}

impl<T> Inserted<T> {
    pub fn into_inner(self) -> T {
        match self {
            Inserted::Created(v) | Inserted::Existing(v) => v,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Inserted::Created(_))
    }
}

/// The capabilities every record repository offers, whatever its backing store.
#[async_trait]
pub trait Repository: Send + Sync {
    type Record: Send;
    type NewRecord: Send;

    /// Atomic insert-if-absent on the record's unique key.
    async fn add_one(&self, data: Self::NewRecord) -> Result<Inserted<i64>, SqlxError>;

    async fn find_all(&self) -> Result<Vec<Self::Record>, SqlxError>;
}

pub async fn get_pool(url: &str, max_connections: u32) -> Result<PgPool, SqlxError> {
    get_pool_with_timeouts(url, max_connections, DEFAULT_TIMEOUTS).await
}

pub async fn get_pool_with_timeouts(
    url: &str,
    max_connections: u32,
    timeouts: DatabaseTimeouts,
) -> Result<PgPool, SqlxError> {
    let statement_ms = timeouts.statement_timeout.as_millis();
    let lock_ms = timeouts.lock_timeout.as_millis();
    let idle_tx_secs = timeouts.idle_in_transaction_session_timeout.as_secs();

    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeouts.acquire_timeout)
        .test_before_acquire(true)
        .idle_timeout(timeouts.idle_timeout)
        .max_lifetime(timeouts.max_lifetime)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                // SET does not accept bind parameters
                sqlx::query(&format!("SET statement_timeout = '{statement_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;
                sqlx::query(&format!("SET lock_timeout = '{lock_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;
                sqlx::query(&format!(
                    "SET idle_in_transaction_session_timeout = '{idle_tx_secs}s'"
                ))
                .execute(&mut *conn)
                .await?;
                Ok(())
            })
        })
        .connect(url)
        .await
}

/// Liveness probe for the pool: a trivial round trip.
pub struct PgProbe(pub PgPool);

#[async_trait]
impl health::Probe for PgProbe {
    async fn probe(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.0).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "postgres probe failed");
                false
            }
        }
    }
}

/// 23505 unique_violation
pub fn is_unique_violation(error: &SqlxError) -> bool {
    match error {
        SqlxError::Database(db_error) => match db_error.code() {
            Some(code) => code.as_ref() == "23505",
            None => db_error
                .message()
                .to_lowercase()
                .contains("violates unique constraint"),
        },
        _ => false,
    }
}

/// Errors worth reporting as "try again later" rather than as a server fault
pub fn is_transient_error(error: &SqlxError) -> bool {
    match error {
        SqlxError::Io(_) | SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Tls(_) => {
            true
        }

        SqlxError::Database(db_error) => match db_error.code() {
            // 08*** connection exception, 53*** insufficient resources,
            // 57*** operator intervention (includes statement_timeout),
            // 40001 serialization failure, 40P01 deadlock
            Some(code) => {
                let code = code.as_ref();
                code.starts_with("08")
                    || code.starts_with("53")
                    || code.starts_with("57")
                    || code == "40001"
                    || code == "40P01"
            }
            None => false,
        },

        _ => false,
    }
}
