use async_trait::async_trait;
use common_database::{is_unique_violation, Inserted, Repository};
use serde::Serialize;
use sqlx::{Error as SqlxError, PgPool};

/// A stored text file. `hash` is the content fingerprint and is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: i64,
    pub name: String,
    pub hash: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub name: String,
    pub hash: String,
    pub location: String,
}

#[async_trait]
pub trait FileRepository: Repository<Record = FileRecord, NewRecord = NewFile> {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<FileRecord>, SqlxError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<FileRecord>, SqlxError>;

    async fn get_location(&self, id: i64) -> Result<Option<String>, SqlxError>;
}

pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn id_for_hash(&self, hash: &str) -> Result<i64, SqlxError> {
        sqlx::query_scalar("SELECT id FROM files WHERE hash = $1")
            .bind(hash)
            .fetch_one(&self.pool)
            .await
    }
}

#[async_trait]
impl Repository for PgFileRepository {
    type Record = FileRecord;
    type NewRecord = NewFile;

    async fn add_one(&self, data: NewFile) -> Result<Inserted<i64>, SqlxError> {
        let inserted: Result<Option<i64>, SqlxError> = sqlx::query_scalar(
            r#"
            INSERT INTO files (name, hash, location)
            VALUES ($1, $2, $3)
            ON CONFLICT (hash) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&data.name)
        .bind(&data.hash)
        .bind(&data.location)
        .fetch_optional(&self.pool)
        .await;

        match inserted {
            Ok(Some(id)) => Ok(Inserted::Created(id)),
            Ok(None) => Ok(Inserted::Existing(self.id_for_hash(&data.hash).await?)),
            Err(e) if is_unique_violation(&e) => {
                Ok(Inserted::Existing(self.id_for_hash(&data.hash).await?))
            }
            Err(e) => Err(e),
        }
    }

    async fn find_all(&self) -> Result<Vec<FileRecord>, SqlxError> {
        sqlx::query_as::<_, FileRecord>("SELECT id, name, hash, location FROM files ORDER BY id")
            .fetch_all(&self.pool)
            .await
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<FileRecord>, SqlxError> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT id, name, hash, location FROM files WHERE hash = $1",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<FileRecord>, SqlxError> {
        sqlx::query_as::<_, FileRecord>("SELECT id, name, hash, location FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_location(&self, id: i64) -> Result<Option<String>, SqlxError> {
        sqlx::query_scalar("SELECT location FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }
}
