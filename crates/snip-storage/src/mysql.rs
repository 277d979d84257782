use async_trait::async_trait;
use jiff::Timestamp;
use snip_core::error::{Result, StorageError};
use snip_core::{ReadRepository, Repository, ShortCode, Stats, UrlRecord, UserId};
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Schema of the `short_urls` table.
pub const SCHEMA: &str = include_str!("../ddl/mysql/short_urls.sql");

/// Number of short codes soft-deleted per transaction.
pub const DELETE_CHUNK_SIZE: usize = 100;

/// MySQL implementation of the repository contract.
///
/// Soft delete is implemented with `is_deleted`. URLs are stored as `TEXT` of
/// any length; uniqueness is enforced by a unique key on the generated
/// `active_url_hash` column (SHA-256 of the URL), which is `NULL` for deleted
/// rows, so only active records compete for a URL. Short codes are unique
/// across all rows and never reused.
#[derive(Debug, Clone)]
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    /// Creates a repository from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `short_urls` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn active_code_for(&self, original_url: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT short_code
            FROM short_urls
            WHERE active_url_hash = UNHEX(SHA2(?, 256))
            LIMIT 1
            "#,
        )
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|row| row.try_get::<String, _>("short_code").map_err(map_sqlx_error))
            .transpose()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn row_to_record(row: &MySqlRow) -> Result<UrlRecord> {
    let short_code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
    let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
    let user_id: String = row.try_get("user_id").map_err(map_sqlx_error)?;
    let deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;

    Ok(UrlRecord {
        short_code: ShortCode::new_unchecked(short_code),
        original_url,
        owner: UserId::new_unchecked(user_id),
        deleted,
    })
}

fn parse_count(row: &MySqlRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column).map_err(map_sqlx_error)?;
    u64::try_from(value)
        .map_err(|_| StorageError::InvalidData(format!("negative {column} count: {value}")))
}

/// Soft-deletes one chunk of codes inside its own transaction.
async fn soft_delete_chunk(pool: MySqlPool, owner: String, codes: Vec<String>) -> Result<u64> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    let mut query: QueryBuilder<MySql> =
        QueryBuilder::new("UPDATE short_urls SET is_deleted = TRUE WHERE user_id = ");
    query.push_bind(owner);
    query.push(" AND is_deleted = FALSE AND short_code IN (");
    let mut separated = query.separated(", ");
    for code in codes {
        separated.push_bind(code);
    }
    separated.push_unseparated(")");

    let result = query
        .build()
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
    tx.commit().await.map_err(map_sqlx_error)?;

    Ok(result.rows_affected())
}

#[async_trait]
impl ReadRepository for MySqlRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        let row = sqlx::query(
            r#"
            SELECT short_code, original_url, user_id, is_deleted
            FROM short_urls
            WHERE short_code = ?
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn get_by_owner(&self, owner: &UserId) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT short_code, original_url, user_id, is_deleted
            FROM short_urls
            WHERE user_id = ?
              AND is_deleted = FALSE
            "#,
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn stats(&self) -> Result<Stats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total_urls, COUNT(DISTINCT user_id) AS total_users
            FROM short_urls
            WHERE is_deleted = FALSE
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Stats {
            total_urls: parse_count(&row, "total_urls")?,
            total_users: parse_count(&row, "total_users")?,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn save(&self, code: &ShortCode, original_url: &str, owner: &UserId) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO short_urls (short_code, original_url, user_id, is_deleted, created_at)
            VALUES (?, ?, ?, FALSE, ?)
            "#,
        )
        .bind(code.as_str())
        .bind(original_url)
        .bind(owner.as_str())
        .bind(Timestamp::now().as_second())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // Either key may have fired. If an active row holds the URL the
            // caller gets that row's code, otherwise the code itself collided.
            Err(err) if is_unique_violation(&err) => match self.active_code_for(original_url).await? {
                Some(existing) => Err(StorageError::UrlConflict(existing)),
                None => Err(StorageError::CodeTaken(code.to_string())),
            },
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn delete_by_owner(&self, owner: &UserId, codes: &[ShortCode]) -> Result<u64> {
        if codes.is_empty() {
            return Ok(0);
        }

        let mut chunks = JoinSet::new();
        for chunk in codes.chunks(DELETE_CHUNK_SIZE) {
            let codes = chunk.iter().map(ToString::to_string).collect();
            chunks.spawn(soft_delete_chunk(self.pool.clone(), owner.to_string(), codes));
        }

        let mut deleted = 0;
        while let Some(joined) = chunks.join_next().await {
            match joined {
                Ok(Ok(affected)) => deleted += affected,
                // Returning drops the JoinSet, aborting chunks still in flight.
                // Chunks that already committed stay committed.
                Ok(Err(err)) => {
                    warn!(owner = %owner, error = %err, "soft delete chunk failed");
                    return Err(err);
                }
                Err(err) => {
                    return Err(StorageError::Operation(format!(
                        "soft delete chunk task failed: {err}"
                    )))
                }
            }
        }

        debug!(owner = %owner, requested = codes.len(), deleted, "soft-deleted records");
        Ok(deleted)
    }
}
