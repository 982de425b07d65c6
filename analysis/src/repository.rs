use async_trait::async_trait;
use common_database::{is_unique_violation, Inserted, Repository};
use sqlx::{Error as SqlxError, PgPool};

/// Cached statistics for one stored file. At most one per `file_id`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FileStatRecord {
    pub id: i64,
    pub file_id: i64,
    pub word_count: i64,
    pub char_count: i64,
    /// Whether no other record shared `normalized_hash` when this one was created.
    /// Never updated afterwards.
    pub is_unique: bool,
    pub wordcloud_location: String,
    pub normalized_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileStat {
    pub file_id: i64,
    pub word_count: i64,
    pub char_count: i64,
    pub is_unique: bool,
    pub wordcloud_location: String,
    pub normalized_hash: String,
}

#[async_trait]
pub trait FileStatRepository:
    Repository<Record = FileStatRecord, NewRecord = NewFileStat>
{
    async fn find_by_file_id(&self, file_id: i64) -> Result<Option<FileStatRecord>, SqlxError>;

    async fn exists_by_normalized_hash(&self, normalized_hash: &str) -> Result<bool, SqlxError>;
}

const SELECT_STAT: &str = r#"
    SELECT id, file_id, word_count, char_count, is_unique, wordcloud_location, normalized_hash
    FROM file_stat
"#;

pub struct PgFileStatRepository {
    pool: PgPool,
}

impl PgFileStatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn id_for_file(&self, file_id: i64) -> Result<i64, SqlxError> {
        sqlx::query_scalar("SELECT id FROM file_stat WHERE file_id = $1")
            .bind(file_id)
            .fetch_one(&self.pool)
            .await
    }
}

#[async_trait]
impl Repository for PgFileStatRepository {
    type Record = FileStatRecord;
    type NewRecord = NewFileStat;

    async fn add_one(&self, data: NewFileStat) -> Result<Inserted<i64>, SqlxError> {
        let inserted: Result<Option<i64>, SqlxError> = sqlx::query_scalar(
            r#"
            INSERT INTO file_stat
                (file_id, word_count, char_count, is_unique, wordcloud_location, normalized_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (file_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(data.file_id)
        .bind(data.word_count)
        .bind(data.char_count)
        .bind(data.is_unique)
        .bind(&data.wordcloud_location)
        .bind(&data.normalized_hash)
        .fetch_optional(&self.pool)
        .await;

        match inserted {
            Ok(Some(id)) => Ok(Inserted::Created(id)),
            Ok(None) => Ok(Inserted::Existing(self.id_for_file(data.file_id).await?)),
            Err(e) if is_unique_violation(&e) => {
                Ok(Inserted::Existing(self.id_for_file(data.file_id).await?))
            }
            Err(e) => Err(e),
        }
    }

    async fn find_all(&self) -> Result<Vec<FileStatRecord>, SqlxError> {
        sqlx::query_as::<_, FileStatRecord>(&format!("{SELECT_STAT} ORDER BY id"))
            .fetch_all(&self.pool)
            .await
    }
}

#[async_trait]
impl FileStatRepository for PgFileStatRepository {
    async fn find_by_file_id(&self, file_id: i64) -> Result<Option<FileStatRecord>, SqlxError> {
        sqlx::query_as::<_, FileStatRecord>(&format!("{SELECT_STAT} WHERE file_id = $1"))
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn exists_by_normalized_hash(&self, normalized_hash: &str) -> Result<bool, SqlxError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM file_stat WHERE normalized_hash = $1)")
            .bind(normalized_hash)
            .fetch_one(&self.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_stat(file_id: i64, hash: &str) -> NewFileStat {
        NewFileStat {
            file_id,
            word_count: 2,
            char_count: 7,
            is_unique: true,
            wordcloud_location: format!("picture/{file_id}.png"),
            normalized_hash: hash.to_string(),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires postgres, set DATABASE_URL"]
    async fn test_insert_and_lookup(db: PgPool) {
        let repo = PgFileStatRepository::new(db);

        assert!(!repo.exists_by_normalized_hash("h1").await.unwrap());
        let id = repo.add_one(new_stat(5, "h1")).await.unwrap();
        assert!(id.was_created());

        let stat = repo.find_by_file_id(5).await.unwrap().unwrap();
        assert_eq!(stat.id, id.into_inner());
        assert_eq!(stat.wordcloud_location, "picture/5.png");
        assert!(repo.exists_by_normalized_hash("h1").await.unwrap());
        assert_eq!(repo.find_by_file_id(6).await.unwrap(), None);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires postgres, set DATABASE_URL"]
    async fn test_one_record_per_file(db: PgPool) {
        let repo = PgFileStatRepository::new(db);

        let first = repo.add_one(new_stat(1, "h1")).await.unwrap();
        let second = repo.add_one(new_stat(1, "h2")).await.unwrap();

        assert_eq!(second, Inserted::Existing(first.into_inner()));
        let all = repo.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].normalized_hash, "h1");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires postgres, set DATABASE_URL"]
    async fn test_shared_hash_across_files(db: PgPool) {
        let repo = PgFileStatRepository::new(db);

        repo.add_one(new_stat(1, "same")).await.unwrap();
        let second = repo.add_one(new_stat(2, "same")).await.unwrap();

        assert!(second.was_created());
        assert_eq!(repo.find_all().await.unwrap().len(), 2);
    }
}
