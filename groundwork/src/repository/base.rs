//! Repository bound to one table, carrying its own transaction context
//!
//! A [`Repository`] runs every statement against its current [`Store`].
//! [`begin`](Repository::begin) switches it onto a fresh transaction and
//! remembers the connection it came from; [`reset`](Repository::reset)
//! switches back.
//!
//! ```text
//!           begin / set_tx                 commit
//!   Idle ─────────────────▶ InTransaction ───────▶ InTransaction
//!    ▲                          │                        │
//!    └──── rollback / reset ────┘◀──────── reset ────────┘
//! ```
//!
//! All transitions take `&mut self`, so one repository can only be driven by
//! one unit of work at a time. Several repositories share a transaction by
//! enrolling with [`set_tx`](Repository::set_tx) and are restored together by
//! [`rollback_with`](Repository::rollback_with) or
//! [`reset_with`](Repository::reset_with).

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use super::error::{RepositoryError, RepositoryResult};
use super::pagination::{Pagination, TableOptions};
use super::scope::Scope;
use crate::config::RepositoryConfig;
use crate::error::StoreErrorKind;
use crate::record::{FromStoreRow, NamedArgs, SqlValue, Updatable};
use crate::store::{Connection, Store, Transactable, TxHandle};

/// What `commit` and `rollback` do when no transaction is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MisusePolicy {
    /// Treat it as a bug in the calling code and panic
    #[default]
    Panic,
    /// Return an `InvalidState` error
    Error,
}

/// Default page sizes when a caller passes a zero limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLimits {
    /// Default for [`Repository::list`]
    pub list: u64,
    /// Default for [`Repository::list_by_user_id`]
    pub by_user: u64,
}

impl Default for ListLimits {
    fn default() -> Self {
        Self {
            list: 20,
            by_user: 100,
        }
    }
}

/// Table-bound CRUD plus transaction lifecycle
///
/// `T` is the record type rows decode into; it implements
/// [`FromStoreRow`] for the row type of `C`.
pub struct Repository<T, C: Connection> {
    pub(super) table: String,
    pub(super) options: TableOptions,
    pub(super) limits: ListLimits,
    misuse: MisusePolicy,
    current: Store<C>,
    parent: Option<Store<C>>,
    _record: PhantomData<fn() -> T>,
}

impl<T, C: Connection> std::fmt::Debug for Repository<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.table)
            .field("options", &self.options)
            .field("limits", &self.limits)
            .field("misuse", &self.misuse)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut parts = name.split('.');
    parts.all(|part| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

impl<T, C: Connection> Repository<T, C> {
    /// Bind a repository to `table` on a base connection
    ///
    /// # Panics
    ///
    /// Panics if `table` is not a plain (optionally schema-qualified) SQL
    /// identifier. Table names are interpolated into statements.
    pub fn new(table: impl Into<String>, conn: C) -> Self {
        let table = table.into();
        assert!(is_identifier(&table), "invalid table name: {table:?}");
        Self {
            table,
            options: TableOptions::default(),
            limits: ListLimits::default(),
            misuse: MisusePolicy::default(),
            current: Store::Connection(conn),
            parent: None,
            _record: PhantomData,
        }
    }

    /// Apply list defaults, visibility and misuse policy from configuration
    #[must_use]
    pub fn with_config(mut self, config: &RepositoryConfig) -> Self {
        self.options = TableOptions {
            hide_deactivated: config.hide_deactivated,
            hide_deleted: config.hide_deleted,
        };
        self.limits = ListLimits {
            list: config.default_list_limit,
            by_user: config.default_user_list_limit,
        };
        self.misuse = config.misuse;
        self
    }

    /// Set which soft-state markers hide rows
    #[must_use]
    pub fn with_options(mut self, options: TableOptions) -> Self {
        self.options = options;
        self
    }

    /// Set default page sizes
    #[must_use]
    pub fn with_limits(mut self, limits: ListLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the behavior of `commit`/`rollback` outside a transaction
    #[must_use]
    pub fn with_misuse(mut self, misuse: MisusePolicy) -> Self {
        self.misuse = misuse;
        self
    }

    /// The table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Visibility options
    pub fn options(&self) -> TableOptions {
        self.options
    }

    /// The store statements currently run against
    pub fn store(&self) -> &Store<C> {
        &self.current
    }

    /// Whether statements currently run inside a transaction
    pub fn in_transaction(&self) -> bool {
        self.current.in_transaction()
    }

    /// The active transaction, if any
    pub fn transaction(&self) -> Option<&TxHandle<C>> {
        self.current.transaction()
    }

    /// CRUD against the current store
    pub fn scope(&self) -> Scope<'_, T, C> {
        Scope::new(self, &self.current)
    }

    /// CRUD against an explicitly supplied store
    ///
    /// The repository's own transaction state is ignored.
    pub fn using<'r>(&'r self, store: &'r Store<C>) -> Scope<'r, T, C> {
        Scope::new(self, store)
    }

    /// Open a transaction and switch onto it
    ///
    /// The returned handle can enroll other repositories with
    /// [`set_tx`](Self::set_tx). Fails with `InvalidState` if a transaction
    /// is already active.
    pub async fn begin(&mut self) -> RepositoryResult<TxHandle<C>> {
        let conn = match &self.current {
            Store::Connection(conn) => conn.clone(),
            Store::Transaction(_) => {
                tracing::warn!(table = %self.table, "begin called while a transaction is active");
                return Err(RepositoryError::invalid_state(format!(
                    "transaction already active on {}",
                    self.table
                )));
            }
        };

        let handle = TxHandle::new(conn.begin().await.map_err(|e| {
            tracing::error!(table = %self.table, error = %e, "failed to begin transaction");
            RepositoryError::from(e)
        })?);
        self.enter(handle.clone());
        tracing::debug!(table = %self.table, "transaction started");
        Ok(handle)
    }

    /// Enroll in a transaction opened elsewhere
    ///
    /// Enrolling twice in the same transaction is a no-op; enrolling while a
    /// different transaction is active fails with `InvalidState`.
    pub fn set_tx(&mut self, handle: &TxHandle<C>) -> RepositoryResult<()> {
        match &self.current {
            Store::Transaction(active) if active.ptr_eq(handle) => Ok(()),
            Store::Transaction(_) => Err(RepositoryError::invalid_state(format!(
                "{} is already enrolled in another transaction",
                self.table
            ))),
            Store::Connection(_) => {
                self.enter(handle.clone());
                tracing::debug!(table = %self.table, "enrolled in transaction");
                Ok(())
            }
        }
    }

    fn enter(&mut self, handle: TxHandle<C>) {
        let previous = std::mem::replace(&mut self.current, Store::Transaction(handle));
        self.parent = Some(previous);
    }

    /// Commit the active transaction
    ///
    /// The repository stays on the finished transaction until
    /// [`reset`](Self::reset). A failed commit is returned and leaves the
    /// repository's state unchanged.
    ///
    /// # Panics
    ///
    /// Panics when called outside a transaction under [`MisusePolicy::Panic`].
    pub async fn commit(&mut self) -> RepositoryResult<()> {
        let Some(handle) = self.current.transaction() else {
            return self.misuse("commit");
        };

        handle.commit().await.map_err(|e| {
            tracing::warn!(table = %self.table, error = %e, "commit failed");
            RepositoryError::from(e)
        })?;
        tracing::debug!(table = %self.table, "transaction committed");
        Ok(())
    }

    /// Roll back the active transaction and reset
    ///
    /// # Panics
    ///
    /// Panics when called outside a transaction under [`MisusePolicy::Panic`].
    pub async fn rollback(&mut self) -> RepositoryResult<()> {
        self.rollback_with(&mut []).await
    }

    /// Roll back, then reset this repository and every enrolled one
    ///
    /// The resets happen even when the rollback itself fails. A transaction
    /// that was already finished through another enrolled repository counts
    /// as rolled back.
    ///
    /// # Panics
    ///
    /// Panics when called outside a transaction under [`MisusePolicy::Panic`].
    pub async fn rollback_with(&mut self, others: &mut [&mut dyn Transactable]) -> RepositoryResult<()> {
        let Some(handle) = self.current.transaction().cloned() else {
            return self.misuse("rollback");
        };

        let result = match handle.rollback().await {
            Ok(()) => {
                tracing::debug!(table = %self.table, "transaction rolled back");
                Ok(())
            }
            Err(e) if e.kind == StoreErrorKind::TransactionFinished => Ok(()),
            Err(e) => {
                tracing::warn!(table = %self.table, error = %e, "rollback failed");
                Err(RepositoryError::from(e))
            }
        };

        self.reset_with(others);
        result
    }

    /// Return to the store held before the transaction began
    pub fn reset(&mut self) {
        self.restore_parent();
    }

    /// Reset this repository and every enrolled one
    pub fn reset_with(&mut self, others: &mut [&mut dyn Transactable]) {
        self.restore_parent();
        for other in others.iter_mut() {
            other.reset();
        }
    }

    fn restore_parent(&mut self) {
        if let Some(parent) = self.parent.take() {
            self.current = parent;
            tracing::debug!(table = %self.table, "store reset");
        }
    }

    fn misuse(&self, operation: &str) -> RepositoryResult<()> {
        match self.misuse {
            MisusePolicy::Panic => panic!(
                "{operation} called on repository for {} outside a transaction",
                self.table
            ),
            MisusePolicy::Error => Err(RepositoryError::invalid_state(format!(
                "{operation} called outside a transaction on {}",
                self.table
            ))),
        }
    }

}

impl<T: FromStoreRow<C::Row>, C: Connection> Repository<T, C> {
    /// Up to `page.limit` live rows (20 when zero), in store order
    pub async fn list(&self, page: Pagination) -> RepositoryResult<Vec<T>> {
        self.scope().list(page).await
    }

    /// The live row with this id, or `NotFound`
    pub async fn get_by_id(&self, id: &str) -> RepositoryResult<T> {
        self.scope().get_by_id(id).await
    }

    /// The first live row belonging to `user_id`, or `NotFound`
    pub async fn get_by_user_id(&self, user_id: &str) -> RepositoryResult<T> {
        self.scope().get_by_user_id(user_id).await
    }

    /// Up to `page.limit` live rows belonging to `user_id` (100 when zero)
    pub async fn list_by_user_id(&self, user_id: &str, page: Pagination) -> RepositoryResult<Vec<T>> {
        self.scope().list_by_user_id(user_id, page).await
    }

    /// Write the present fields of `update` to the live row with this id
    pub async fn update<U: Updatable>(&self, id: &str, update: &U) -> RepositoryResult<bool> {
        self.scope().update(id, update).await
    }

    /// Set `deactivated_at` to now
    pub async fn deactivate(&self, id: &str) -> RepositoryResult<bool> {
        self.scope().deactivate(id).await
    }

    /// Clear `deactivated_at`
    pub async fn activate(&self, id: &str) -> RepositoryResult<bool> {
        self.scope().activate(id).await
    }

    /// Set `deleted_at` to now
    pub async fn soft_delete(&self, id: &str) -> RepositoryResult<bool> {
        self.scope().soft_delete(id).await
    }

    /// Whether the row with this id carries a deletion marker
    pub async fn is_deleted(&self, id: &str) -> RepositoryResult<bool> {
        self.scope().is_deleted(id).await
    }

    /// Run a caller-written query and decode every row
    pub async fn select<R: FromStoreRow<C::Row>>(&self, sql: &str, args: &[SqlValue]) -> RepositoryResult<Vec<R>> {
        self.scope().select(sql, args).await
    }

    /// Run a caller-written query and decode its first row, or `NotFound`
    pub async fn get<R: FromStoreRow<C::Row>>(&self, sql: &str, args: &[SqlValue]) -> RepositoryResult<R> {
        self.scope().get(sql, args).await
    }

    /// Compile a `:name` statement into the backend's positional form
    pub fn named(&self, sql: &str, args: &NamedArgs) -> RepositoryResult<(String, Vec<SqlValue>)> {
        self.scope().named(sql, args)
    }

    /// Run a caller-written `:name` statement
    pub async fn named_execute(&self, sql: &str, args: &NamedArgs) -> RepositoryResult<u64> {
        self.scope().named_execute(sql, args).await
    }
}

impl<T, C: Connection> Transactable for Repository<T, C> {
    fn reset(&mut self) {
        self.restore_parent();
    }

    fn in_transaction(&self) -> bool {
        self.current.in_transaction()
    }
}
