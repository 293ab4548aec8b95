//! PostgreSQL backend on sqlx
//!
//! [`PgStore`] wraps a [`PgPool`] and is the [`Connection`] a production
//! repository uses; [`PgTransaction`] is the transaction it opens. Arguments
//! arrive as [`SqlValue`]s and are bound one by one, NULLs with the parameter
//! type of their [`SqlKind`]. Rows are returned as [`PgRow`]s and decoded by
//! the record's `sqlx::FromRow` implementation:
//!
//! ```rust,ignore
//! #[derive(sqlx::FromRow)]
//! struct Contact {
//!     id: String,
//!     user_id: String,
//!     born: Option<chrono::NaiveDate>,
//! }
//!
//! let contacts: Repository<Contact, PgStore> = Repository::new("contacts", store);
//! ```
//!
//! With [`DatabaseConfig::statement_timeout_secs`] set, every pooled
//! connection carries a server-side `statement_timeout`, so an overrunning
//! statement is cancelled by the server and reported as
//! [`StoreErrorKind::Timeout`](crate::error::StoreErrorKind::Timeout).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use std::time::Duration;

use super::{Connection, PlaceholderStyle, Queryable, Transaction};
use crate::config::DatabaseConfig;
use crate::error::{sanitize_url, StoreError};
use crate::record::{FromStoreRow, SqlKind, SqlValue};

/// Create a PostgreSQL connection pool with retry logic
///
/// Failed attempts are retried `max_retries` times with exponential backoff
/// starting at `retry_delay_secs`.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!(
                        "Database connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!(
                        statement_timeout = ?config.statement_timeout(),
                        "Database connection pool created: max={}, min={}",
                        config.max_connections,
                        config.min_connections
                    );
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;

                if attempt > config.max_retries || !e.is_retriable() {
                    tracing::error!(
                        "Failed to connect to database after {} attempt(s): {}",
                        attempt,
                        e
                    );
                    return Err(e);
                }

                let delay = base_delay * 2_u32.pow(attempt.saturating_sub(1));

                tracing::warn!(
                    "Database connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Connection options for `config`, including the session statement timeout
fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions, StoreError> {
    let options: PgConnectOptions = config
        .url
        .parse()
        .map_err(|e| StoreError::from(e).add_context(sanitize_url(&config.url)))?;

    Ok(match config.statement_timeout() {
        Some(timeout) => options.options([("statement_timeout", timeout.as_millis().to_string())]),
        None => options,
    })
}

async fn try_create_pool(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    let options = connect_options(config)?;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
        .connect_with(options)
        .await
        .map_err(|e| StoreError::from(e).add_context(sanitize_url(&config.url)))
}

/// A pooled PostgreSQL connection source
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        Ok(Self::new(create_pool(config).await?))
    }

    /// The underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Queryable for PgStore {
    type Row = PgRow;

    async fn fetch_optional(&mut self, sql: &str, args: &[SqlValue]) -> Result<Option<PgRow>, StoreError> {
        let query = bind_all(sqlx::query(sql), args)?;
        Ok(query.fetch_optional(&self.pool).await?)
    }

    async fn fetch_all(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<PgRow>, StoreError> {
        let query = bind_all(sqlx::query(sql), args)?;
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64, StoreError> {
        let query = bind_all(sqlx::query(sql), args)?;
        Ok(query.execute(&self.pool).await?.rows_affected())
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }
}

#[async_trait]
impl Connection for PgStore {
    type Transaction = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction, StoreError> {
        let tx = self.pool.begin().await.map_err(|e| {
            StoreError::transaction_failed(format!("failed to begin transaction: {e}"))
        })?;
        Ok(PgTransaction { tx })
    }
}

/// An open PostgreSQL transaction
///
/// Dropping it without committing rolls it back.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl Queryable for PgTransaction {
    type Row = PgRow;

    async fn fetch_optional(&mut self, sql: &str, args: &[SqlValue]) -> Result<Option<PgRow>, StoreError> {
        let query = bind_all(sqlx::query(sql), args)?;
        Ok(query.fetch_optional(&mut *self.tx).await?)
    }

    async fn fetch_all(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<PgRow>, StoreError> {
        let query = bind_all(sqlx::query(sql), args)?;
        Ok(query.fetch_all(&mut *self.tx).await?)
    }

    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64, StoreError> {
        let query = bind_all(sqlx::query(sql), args)?;
        Ok(query.execute(&mut *self.tx).await?.rows_affected())
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::transaction_failed(format!("commit failed: {e}")))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StoreError::transaction_failed(format!("rollback failed: {e}")))
    }
}

impl<T> FromStoreRow<PgRow> for T
where
    T: for<'r> sqlx::FromRow<'r, PgRow> + Send + 'static,
{
    fn from_store_row(row: &PgRow) -> Result<Self, StoreError> {
        T::from_row(row).map_err(StoreError::from)
    }
}

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

fn bind_all<'q>(mut query: PgQuery<'q>, args: &[SqlValue]) -> Result<PgQuery<'q>, StoreError> {
    for value in args {
        query = bind_value(query, value)?;
    }
    Ok(query)
}

fn bind_value<'q>(query: PgQuery<'q>, value: &SqlValue) -> Result<PgQuery<'q>, StoreError> {
    Ok(match value {
        SqlValue::Null(kind) => bind_null(query, *kind),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
        SqlValue::Uuid(v) => query.bind(*v),
        SqlValue::Timestamp(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(v.clone()),
        SqlValue::List(_) => {
            return Err(StoreError::invalid_statement(
                "list arguments must be expanded with a named statement",
            ))
        }
    })
}

// Untyped NULLs go out as text and rely on the server's assignment cast.
fn bind_null(query: PgQuery<'_>, kind: SqlKind) -> PgQuery<'_> {
    match kind {
        SqlKind::Bool => query.bind(None::<bool>),
        SqlKind::Int => query.bind(None::<i64>),
        SqlKind::Float => query.bind(None::<f64>),
        SqlKind::Bytes => query.bind(None::<Vec<u8>>),
        SqlKind::Uuid => query.bind(None::<uuid::Uuid>),
        SqlKind::Timestamp => query.bind(None::<DateTime<Utc>>),
        SqlKind::Json => query.bind(None::<serde_json::Value>),
        SqlKind::Text | SqlKind::Unknown => query.bind(None::<String>),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreErrorKind, StoreOperation};
    use crate::repository::{Pagination, Repository, RepositoryErrorKind};
    use crate::updatable;
    use chrono::NaiveDate;

    const DATABASE_URL: &str = "GROUNDWORK_TEST_DATABASE_URL";

    fn database_config(statement_timeout_secs: Option<u64>) -> DatabaseConfig {
        let url = std::env::var(DATABASE_URL)
            .unwrap_or_else(|_| panic!("{DATABASE_URL} must point at a disposable Postgres database"));
        DatabaseConfig {
            url,
            max_connections: 4,
            min_connections: 0,
            connection_timeout_secs: 5,
            max_retries: 0,
            retry_delay_secs: 1,
            statement_timeout_secs,
        }
    }

    #[derive(Debug, sqlx::FromRow)]
    struct Item {
        id: String,
        user_id: String,
        qty: Option<i32>,
        born: Option<NaiveDate>,
        seen_at: Option<DateTime<Utc>>,
        label: Option<String>,
        tags: Option<Vec<String>>,
    }

    #[derive(Default)]
    struct ItemUpdate {
        qty: Option<Option<i32>>,
        seen_at: Option<Option<DateTime<Utc>>>,
        label: Option<Option<String>>,
    }

    updatable!(ItemUpdate {
        qty => "qty",
        seen_at => "seen_at",
        label => "label",
    });

    /// A fresh table holding one row with id `1`
    async fn items_table(store: &PgStore) -> String {
        let table = format!("groundwork_items_{}", uuid::Uuid::new_v4().simple());
        store
            .clone()
            .execute(
                &format!(
                    "CREATE TABLE {table} (
                        id TEXT PRIMARY KEY,
                        user_id TEXT NOT NULL,
                        qty INTEGER,
                        price NUMERIC(10, 2),
                        born DATE,
                        seen_at TIMESTAMPTZ,
                        label TEXT,
                        tags TEXT[],
                        deactivated_at TIMESTAMPTZ,
                        deleted_at TIMESTAMPTZ
                    )"
                ),
                &[],
            )
            .await
            .unwrap();
        store
            .clone()
            .execute(
                &format!(
                    "INSERT INTO {table} (id, user_id, qty, price, born, seen_at, label, tags)
                     VALUES ('1', 'u1', 3, 9.99, '1990-05-17', now(), 'first', ARRAY['a', 'b'])"
                ),
                &[],
            )
            .await
            .unwrap();
        table
    }

    async fn drop_table(store: &PgStore, table: &str) {
        store
            .clone()
            .execute(&format!("DROP TABLE IF EXISTS {table}"), &[])
            .await
            .unwrap();
    }

    #[test]
    fn test_list_arguments_are_not_bindable() {
        let list = SqlValue::List(vec![SqlValue::from("a")]);
        let err = match bind_value(sqlx::query("SELECT $1"), &list) {
            Err(err) => err,
            Ok(_) => panic!("bound a list argument"),
        };
        assert_eq!(err.kind, StoreErrorKind::InvalidStatement);
        assert_eq!(err.operation, StoreOperation::Compile);
    }

    #[test]
    fn test_connect_options_reject_bad_url() {
        let config = DatabaseConfig {
            url: "postgres://admin:hunter2@db:port/app".to_string(),
            max_connections: 1,
            min_connections: 0,
            connection_timeout_secs: 1,
            max_retries: 0,
            retry_delay_secs: 1,
            statement_timeout_secs: Some(1),
        };
        let err = connect_options(&config).unwrap_err();
        assert_eq!(err.context.as_deref(), Some("postgres://<redacted>@db:port/app"));
        assert!(!err.to_string().contains("hunter2"));
    }

    #[tokio::test]
    #[ignore = "needs GROUNDWORK_TEST_DATABASE_URL"]
    async fn test_decodes_non_text_columns() {
        let store = PgStore::connect(&database_config(None)).await.unwrap();
        let table = items_table(&store).await;
        let repo: Repository<Item, PgStore> = Repository::new(table.clone(), store.clone());

        let item = repo.get_by_id("1").await.unwrap();
        assert_eq!(item.id, "1");
        assert_eq!(item.user_id, "u1");
        assert_eq!(item.qty, Some(3));
        assert_eq!(item.born, NaiveDate::from_ymd_opt(1990, 5, 17));
        assert!(item.seen_at.is_some());
        assert_eq!(item.label.as_deref(), Some("first"));
        assert_eq!(item.tags, Some(vec!["a".to_string(), "b".to_string()]));

        let listed = repo.list_by_user_id("u1", Pagination::default()).await.unwrap();
        assert_eq!(listed.len(), 1);

        drop_table(&store, &table).await;
    }

    #[tokio::test]
    #[ignore = "needs GROUNDWORK_TEST_DATABASE_URL"]
    async fn test_update_writes_null_into_typed_columns() {
        let store = PgStore::connect(&database_config(None)).await.unwrap();
        let table = items_table(&store).await;
        let repo: Repository<Item, PgStore> = Repository::new(table.clone(), store.clone());

        let clear = ItemUpdate {
            qty: Some(None),
            seen_at: Some(None),
            label: Some(None),
        };
        assert!(repo.update("1", &clear).await.unwrap());

        let item = repo.get_by_id("1").await.unwrap();
        assert_eq!(item.qty, None);
        assert_eq!(item.seen_at, None);
        assert_eq!(item.label, None);
        assert_eq!(item.born, NaiveDate::from_ymd_opt(1990, 5, 17));

        let set = ItemUpdate {
            qty: Some(Some(11)),
            ..Default::default()
        };
        assert!(repo.update("1", &set).await.unwrap());
        assert_eq!(repo.get_by_id("1").await.unwrap().qty, Some(11));

        drop_table(&store, &table).await;
    }

    #[tokio::test]
    #[ignore = "needs GROUNDWORK_TEST_DATABASE_URL"]
    async fn test_rollback_discards_and_commit_persists() {
        let store = PgStore::connect(&database_config(None)).await.unwrap();
        let table = items_table(&store).await;
        let mut repo: Repository<Item, PgStore> = Repository::new(table.clone(), store.clone());
        let outside: Repository<Item, PgStore> = Repository::new(table.clone(), store.clone());

        repo.begin().await.unwrap();
        let bump = ItemUpdate {
            qty: Some(Some(7)),
            ..Default::default()
        };
        assert!(repo.update("1", &bump).await.unwrap());
        assert_eq!(repo.get_by_id("1").await.unwrap().qty, Some(7));
        assert_eq!(outside.get_by_id("1").await.unwrap().qty, Some(3));
        repo.rollback().await.unwrap();
        assert_eq!(repo.get_by_id("1").await.unwrap().qty, Some(3));

        repo.begin().await.unwrap();
        let bump = ItemUpdate {
            qty: Some(Some(8)),
            ..Default::default()
        };
        assert!(repo.update("1", &bump).await.unwrap());
        repo.commit().await.unwrap();
        repo.reset();
        assert_eq!(outside.get_by_id("1").await.unwrap().qty, Some(8));

        drop_table(&store, &table).await;
    }

    #[tokio::test]
    #[ignore = "needs GROUNDWORK_TEST_DATABASE_URL"]
    async fn test_soft_delete_hides_row() {
        let store = PgStore::connect(&database_config(None)).await.unwrap();
        let table = items_table(&store).await;
        let repo: Repository<Item, PgStore> = Repository::new(table.clone(), store.clone());

        assert!(!repo.is_deleted("1").await.unwrap());
        assert!(repo.soft_delete("1").await.unwrap());
        assert!(!repo.soft_delete("1").await.unwrap());
        assert!(repo.is_deleted("1").await.unwrap());

        let err = repo.get_by_id("1").await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::NotFound);

        drop_table(&store, &table).await;
    }

    #[tokio::test]
    #[ignore = "needs GROUNDWORK_TEST_DATABASE_URL"]
    async fn test_statement_timeout_cancels_on_server() {
        let store = PgStore::connect(&database_config(Some(1))).await.unwrap();
        let observer = PgStore::connect(&database_config(None)).await.unwrap();

        let started = std::time::Instant::now();
        let err = store
            .clone()
            .execute("SELECT pg_sleep(4)", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(3));

        let still_running: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM pg_stat_activity WHERE state = 'active' AND query = 'SELECT pg_sleep(4)'",
        )
        .fetch_one(observer.pool())
        .await
        .unwrap();
        assert_eq!(still_running, 0);
    }
}
