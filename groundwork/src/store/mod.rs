//! Store capabilities
//!
//! Repositories run statements against a [`Store`]: either a plain
//! [`Connection`] (typically a pool handle, cheap to clone) or a shared
//! [`TxHandle`] to one open transaction. The variant is a tagged enum, so
//! "am I in a transaction" is a match rather than a runtime type check.
//!
//! ```text
//!   Store::Connection(C) ──begin()──▶ Store::Transaction(TxHandle<C>)
//!          ▲                                   │
//!          └──────────── reset() ◀── commit() / rollback()
//! ```
//!
//! A [`TxHandle`] can be cloned into several repositories so that they all
//! take part in the same unit of work. Once the transaction is committed or
//! rolled back, every clone fails further statements with
//! [`StoreErrorKind::TransactionFinished`](crate::error::StoreErrorKind::TransactionFinished).

pub mod named;

#[cfg(test)]
pub(crate) mod mock;

#[cfg(feature = "database")]
pub mod postgres;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::record::{NamedArgs, SqlValue};

#[cfg(feature = "database")]
pub use postgres::{create_pool, PgStore, PgTransaction};

/// How a backend numbers its positional parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `?` for every parameter
    #[default]
    Question,
    /// `$1`, `$2`, ... (Postgres)
    Dollar,
}

impl PlaceholderStyle {
    /// Convert a statement written with `?` into this style
    pub fn rebind(self, sql: &str) -> String {
        match self {
            Self::Question => sql.to_string(),
            Self::Dollar => named::rebind(sql),
        }
    }
}

/// Something that can run statements
///
/// Implemented by connections and by open transactions. Arguments are
/// positional and bound in the backend's [`PlaceholderStyle`]. Rows come back
/// in the backend's own row type; records decode them through
/// [`FromStoreRow`](crate::record::FromStoreRow).
#[async_trait]
pub trait Queryable: Send {
    /// The backend's native row type
    type Row: Send + 'static;

    /// Run a query and return its first row, if any
    async fn fetch_optional(&mut self, sql: &str, args: &[SqlValue]) -> Result<Option<Self::Row>, StoreError>;

    /// Run a query and return every row
    async fn fetch_all(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<Self::Row>, StoreError>;

    /// Run a statement and return the number of affected rows
    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64, StoreError>;

    /// Placeholder syntax this backend expects
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Convert a `?` statement into this backend's placeholder syntax
    fn rebind(&self, sql: &str) -> String {
        self.placeholder_style().rebind(sql)
    }

    /// Run a `:name` statement and return the number of affected rows
    async fn named_execute(&mut self, sql: &str, args: &NamedArgs) -> Result<u64, StoreError> {
        let (sql, values) = named::compile(sql, args)?;
        let sql = self.rebind(&sql);
        self.execute(&sql, &values).await
    }

    /// Run a `:name` query and return every row
    async fn named_fetch_all(&mut self, sql: &str, args: &NamedArgs) -> Result<Vec<Self::Row>, StoreError> {
        let (sql, values) = named::compile(sql, args)?;
        let sql = self.rebind(&sql);
        self.fetch_all(&sql, &values).await
    }
}

/// A base handle that can open transactions
#[async_trait]
pub trait Connection: Queryable + Clone + Sync + 'static {
    /// The transaction type this connection opens
    type Transaction: Transaction<Row = Self::Row>;

    /// Open a transaction
    async fn begin(&self) -> Result<Self::Transaction, StoreError>;
}

/// An open transaction
#[async_trait]
pub trait Transaction: Queryable + 'static {
    /// Make the transaction's writes durable
    async fn commit(self) -> Result<(), StoreError>;

    /// Discard the transaction's writes
    async fn rollback(self) -> Result<(), StoreError>;
}

/// Shared handle to one open transaction
///
/// Clones refer to the same transaction. Statements are serialized through
/// the handle, and after [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) every clone reports
/// [`StoreError::transaction_finished`].
pub struct TxHandle<C: Connection> {
    inner: Arc<Mutex<Option<C::Transaction>>>,
    style: PlaceholderStyle,
}

impl<C: Connection> Clone for TxHandle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            style: self.style,
        }
    }
}

impl<C: Connection> std::fmt::Debug for TxHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxHandle")
            .field("id", &Arc::as_ptr(&self.inner))
            .field("style", &self.style)
            .finish()
    }
}

impl<C: Connection> TxHandle<C> {
    /// Wrap a freshly opened transaction
    pub fn new(tx: C::Transaction) -> Self {
        let style = tx.placeholder_style();
        Self {
            inner: Arc::new(Mutex::new(Some(tx))),
            style,
        }
    }

    /// Whether both handles refer to the same transaction
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether the transaction is still open
    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Placeholder syntax of the underlying transaction
    pub fn placeholder_style(&self) -> PlaceholderStyle {
        self.style
    }

    /// Commit the transaction
    pub async fn commit(&self) -> Result<(), StoreError> {
        let tx = self
            .inner
            .lock()
            .await
            .take()
            .ok_or_else(StoreError::transaction_finished)?;
        tx.commit().await
    }

    /// Roll the transaction back
    pub async fn rollback(&self) -> Result<(), StoreError> {
        let tx = self
            .inner
            .lock()
            .await
            .take()
            .ok_or_else(StoreError::transaction_finished)?;
        tx.rollback().await
    }

    async fn fetch_optional(&self, sql: &str, args: &[SqlValue]) -> Result<Option<C::Row>, StoreError> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(StoreError::transaction_finished)?;
        tx.fetch_optional(sql, args).await
    }

    async fn fetch_all(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<C::Row>, StoreError> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(StoreError::transaction_finished)?;
        tx.fetch_all(sql, args).await
    }

    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<u64, StoreError> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(StoreError::transaction_finished)?;
        tx.execute(sql, args).await
    }
}

/// The handle a repository currently runs statements against
pub enum Store<C: Connection> {
    /// A base connection, outside any transaction
    Connection(C),
    /// A shared open transaction
    Transaction(TxHandle<C>),
}

impl<C: Connection> Clone for Store<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Connection(conn) => Self::Connection(conn.clone()),
            Self::Transaction(tx) => Self::Transaction(tx.clone()),
        }
    }
}

impl<C: Connection> std::fmt::Debug for Store<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(_) => f.write_str("Store::Connection"),
            Self::Transaction(tx) => f.debug_tuple("Store::Transaction").field(tx).finish(),
        }
    }
}

impl<C: Connection> From<C> for Store<C> {
    fn from(conn: C) -> Self {
        Self::Connection(conn)
    }
}

impl<C: Connection> Store<C> {
    /// Whether statements run inside a transaction
    pub fn in_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }

    /// The transaction handle, when in a transaction
    pub fn transaction(&self) -> Option<&TxHandle<C>> {
        match self {
            Self::Transaction(tx) => Some(tx),
            Self::Connection(_) => None,
        }
    }

    /// Placeholder syntax of the underlying backend
    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            Self::Connection(conn) => conn.placeholder_style(),
            Self::Transaction(tx) => tx.placeholder_style(),
        }
    }

    /// Convert a `?` statement into the backend's placeholder syntax
    pub fn rebind(&self, sql: &str) -> String {
        self.placeholder_style().rebind(sql)
    }

    /// Run a query and return its first row, if any
    pub async fn fetch_optional(&self, sql: &str, args: &[SqlValue]) -> Result<Option<C::Row>, StoreError> {
        tracing::debug!(in_transaction = self.in_transaction(), sql, "fetch_optional");
        match self {
            Self::Connection(conn) => conn.clone().fetch_optional(sql, args).await,
            Self::Transaction(tx) => tx.fetch_optional(sql, args).await,
        }
    }

    /// Run a query and return every row
    pub async fn fetch_all(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<C::Row>, StoreError> {
        tracing::debug!(in_transaction = self.in_transaction(), sql, "fetch_all");
        match self {
            Self::Connection(conn) => conn.clone().fetch_all(sql, args).await,
            Self::Transaction(tx) => tx.fetch_all(sql, args).await,
        }
    }

    /// Run a statement and return the number of affected rows
    pub async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<u64, StoreError> {
        tracing::debug!(in_transaction = self.in_transaction(), sql, "execute");
        match self {
            Self::Connection(conn) => conn.clone().execute(sql, args).await,
            Self::Transaction(tx) => tx.execute(sql, args).await,
        }
    }

    /// Run a `:name` query and return every row
    pub async fn named_fetch_all(&self, sql: &str, args: &NamedArgs) -> Result<Vec<C::Row>, StoreError> {
        let (sql, values) = named::compile(sql, args)?;
        self.fetch_all(&self.rebind(&sql), &values).await
    }

    /// Run a `:name` statement and return the number of affected rows
    pub async fn named_execute(&self, sql: &str, args: &NamedArgs) -> Result<u64, StoreError> {
        let (sql, values) = named::compile(sql, args)?;
        self.execute(&self.rebind(&sql), &values).await
    }
}

/// Something whose store can be restored after a transaction ends
///
/// Implemented by every repository, so heterogeneous repositories enrolled
/// in one transaction can be reset together.
pub trait Transactable: Send {
    /// Return to the store held before the transaction began
    fn reset(&mut self);

    /// Whether statements currently run inside a transaction
    fn in_transaction(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::mock::{Event, MockStore};
    use super::*;
    use crate::error::StoreErrorKind;

    #[tokio::test]
    async fn test_connection_statements_run_outside_transaction() {
        let conn = MockStore::new();
        let store = Store::from(conn.clone());

        store.execute("DELETE FROM t", &[]).await.unwrap();

        assert!(!store.in_transaction());
        let log = conn.statements();
        assert_eq!(log.len(), 1);
        assert!(!log[0].in_transaction);
    }

    #[tokio::test]
    async fn test_cloned_handles_share_one_transaction() {
        let conn = MockStore::new();
        let handle: TxHandle<MockStore> = TxHandle::new(conn.begin().await.unwrap());
        let other = handle.clone();
        assert!(handle.ptr_eq(&other));

        let a = Store::Transaction(handle.clone());
        let b = Store::Transaction(other);
        a.execute("UPDATE a SET x = 1", &[]).await.unwrap();
        b.execute("UPDATE b SET x = 1", &[]).await.unwrap();
        handle.commit().await.unwrap();

        assert!(conn.statements().iter().all(|s| s.in_transaction));
        assert_eq!(conn.events(), vec![Event::Begin, Event::Commit]);
    }

    #[tokio::test]
    async fn test_statements_after_commit_fail() {
        let conn = MockStore::new();
        let handle: TxHandle<MockStore> = TxHandle::new(conn.begin().await.unwrap());
        let store = Store::Transaction(handle.clone());

        handle.commit().await.unwrap();
        assert!(!handle.is_open().await);

        let err = store.execute("UPDATE t SET x = 1", &[]).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::TransactionFinished);
        let err = handle.rollback().await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::TransactionFinished);
    }

    #[tokio::test]
    async fn test_named_execute_rebinds_for_backend() {
        let conn = MockStore::new();
        let store = Store::from(conn.clone());
        let mut args = NamedArgs::new();
        args.insert("id".to_string(), SqlValue::Int(9));

        store
            .named_execute("DELETE FROM t WHERE id = :id", &args)
            .await
            .unwrap();

        let log = conn.statements();
        assert_eq!(log[0].sql, "DELETE FROM t WHERE id = $1");
        assert_eq!(log[0].args, vec![SqlValue::Int(9)]);
    }
}
