//! CRUD against one store
//!
//! A [`Scope`] pairs a repository's table settings with the store to run on:
//! [`Repository::scope`] uses the repository's current store, and
//! [`Repository::using`] takes one threaded in by the caller, for example a
//! [`Store::Transaction`] shared across several repositories.
//!
//! Only the table name is interpolated into statements; every value is
//! bound as a parameter.

use chrono::Utc;

use super::base::Repository;
use super::error::{RepositoryError, RepositoryOperation, RepositoryResult};
use super::pagination::Pagination;
use crate::error::StoreError;
use crate::record::{extract_updatable, FromStoreRow, NamedArgs, SqlValue, Updatable};
use crate::store::{named, Connection, Store};

const TARGET_ID: &str = "_target_id";

/// A repository's operations bound to a specific store
pub struct Scope<'r, T, C: Connection> {
    repo: &'r Repository<T, C>,
    store: &'r Store<C>,
}

impl<'r, T, C: Connection> Scope<'r, T, C> {
    pub(super) fn new(repo: &'r Repository<T, C>, store: &'r Store<C>) -> Self {
        Self { repo, store }
    }

    /// The store statements run against
    pub fn store(&self) -> &Store<C> {
        self.store
    }
}

impl<'r, T: FromStoreRow<C::Row>, C: Connection> Scope<'r, T, C> {
    fn table(&self) -> &str {
        &self.repo.table
    }

    fn live(&self) -> &'static str {
        self.repo.options.live_predicate()
    }

    fn trace(&self, operation: RepositoryOperation) {
        tracing::debug!(
            table = %self.repo.table,
            in_transaction = self.store.in_transaction(),
            %operation,
            "repository operation"
        );
    }

    fn failed(operation: RepositoryOperation) -> impl Fn(StoreError) -> RepositoryError {
        move |err| RepositoryError::from(err).with_operation(operation)
    }

    fn decode_all<R: FromStoreRow<C::Row>>(
        rows: &[C::Row],
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<R>> {
        rows.iter()
            .map(|row| R::from_store_row(row).map_err(Self::failed(operation)))
            .collect()
    }

    fn decode<R: FromStoreRow<C::Row>>(row: &C::Row, operation: RepositoryOperation) -> RepositoryResult<R> {
        R::from_store_row(row).map_err(Self::failed(operation))
    }

    /// Up to `page.limit` live rows, in store order
    ///
    /// A zero limit takes the repository default (20 unless configured).
    pub async fn list(&self, page: Pagination) -> RepositoryResult<Vec<T>> {
        let op = RepositoryOperation::List;
        self.trace(op);
        let sql = self.store.rebind(&format!(
            "SELECT * FROM {} WHERE {} LIMIT ? OFFSET ?",
            self.table(),
            self.live()
        ));
        let args = [
            bound(page.limit_or(self.repo.limits.list)),
            bound(page.offset),
        ];
        let rows = self.store.fetch_all(&sql, &args).await.map_err(Self::failed(op))?;
        Self::decode_all(&rows, op)
    }

    /// The live row with this id, or `NotFound`
    pub async fn get_by_id(&self, id: &str) -> RepositoryResult<T> {
        let op = RepositoryOperation::GetById;
        self.trace(op);
        let sql = self.store.rebind(&format!(
            "SELECT * FROM {} WHERE id = ? AND {}",
            self.table(),
            self.live()
        ));
        let row = self
            .store
            .fetch_optional(&sql, &[SqlValue::from(id)])
            .await
            .map_err(Self::failed(op))?
            .ok_or_else(|| RepositoryError::not_found(self.table(), id))?;
        Self::decode(&row, op)
    }

    /// The first live row belonging to `user_id`, or `NotFound`
    ///
    /// Which row wins when several match is up to the store.
    pub async fn get_by_user_id(&self, user_id: &str) -> RepositoryResult<T> {
        let op = RepositoryOperation::GetByUserId;
        self.trace(op);
        let sql = self.store.rebind(&format!(
            "SELECT * FROM {} WHERE user_id = ? AND {} LIMIT 1",
            self.table(),
            self.live()
        ));
        let row = self
            .store
            .fetch_optional(&sql, &[SqlValue::from(user_id)])
            .await
            .map_err(Self::failed(op))?
            .ok_or_else(|| {
                RepositoryError::not_found(self.table(), user_id).with_operation(op)
            })?;
        Self::decode(&row, op)
    }

    /// Up to `page.limit` live rows belonging to `user_id`
    ///
    /// A zero limit takes the repository default (100 unless configured).
    /// No matching rows is an empty list, not an error.
    pub async fn list_by_user_id(&self, user_id: &str, page: Pagination) -> RepositoryResult<Vec<T>> {
        let op = RepositoryOperation::ListByUserId;
        self.trace(op);
        let sql = self.store.rebind(&format!(
            "SELECT * FROM {} WHERE user_id = ? AND {} LIMIT ? OFFSET ?",
            self.table(),
            self.live()
        ));
        let args = [
            SqlValue::from(user_id),
            bound(page.limit_or(self.repo.limits.by_user)),
            bound(page.offset),
        ];
        let rows = self.store.fetch_all(&sql, &args).await.map_err(Self::failed(op))?;
        Self::decode_all(&rows, op)
    }

    /// Write the present fields of `update` to the live row with this id
    ///
    /// Fails with `NoFieldsToUpdate`, without touching the store, when no
    /// field is present. Returns whether a row changed.
    pub async fn update<U: Updatable>(&self, id: &str, update: &U) -> RepositoryResult<bool> {
        let op = RepositoryOperation::Update;
        let assignments = extract_updatable(update);
        if assignments.is_empty() {
            return Err(RepositoryError::no_fields_to_update().with_entity(self.table(), id));
        }
        self.trace(op);

        let sql = format!(
            "UPDATE {} SET {} WHERE id = :{TARGET_ID} AND {}",
            self.table(),
            assignments.set_list(),
            self.live()
        );
        let mut args = assignments.values;
        args.insert(TARGET_ID.to_string(), SqlValue::from(id));

        let affected = self
            .store
            .named_execute(&sql, &args)
            .await
            .map_err(Self::failed(op))?;
        Ok(affected > 0)
    }

    /// Set `deactivated_at` to now
    pub async fn deactivate(&self, id: &str) -> RepositoryResult<bool> {
        let op = RepositoryOperation::Deactivate;
        self.trace(op);
        let sql = format!(
            "UPDATE {} SET deactivated_at = :time WHERE id = :id",
            self.table()
        );
        self.mark(op, &sql, id, Some(SqlValue::from(Utc::now()))).await
    }

    /// Clear `deactivated_at`
    pub async fn activate(&self, id: &str) -> RepositoryResult<bool> {
        let op = RepositoryOperation::Activate;
        self.trace(op);
        let sql = format!(
            "UPDATE {} SET deactivated_at = NULL WHERE id = :id",
            self.table()
        );
        self.mark(op, &sql, id, None).await
    }

    /// Set `deleted_at` to now
    ///
    /// Deleting an already deleted row changes nothing and returns `false`.
    pub async fn soft_delete(&self, id: &str) -> RepositoryResult<bool> {
        let op = RepositoryOperation::SoftDelete;
        self.trace(op);
        let sql = format!(
            "UPDATE {} SET deleted_at = :time WHERE id = :id AND deleted_at IS NULL",
            self.table()
        );
        self.mark(op, &sql, id, Some(SqlValue::from(Utc::now()))).await
    }

    async fn mark(
        &self,
        op: RepositoryOperation,
        sql: &str,
        id: &str,
        time: Option<SqlValue>,
    ) -> RepositoryResult<bool> {
        let mut args = NamedArgs::new();
        args.insert("id".to_string(), SqlValue::from(id));
        if let Some(time) = time {
            args.insert("time".to_string(), time);
        }
        let affected = self
            .store
            .named_execute(sql, &args)
            .await
            .map_err(Self::failed(op))?;
        Ok(affected > 0)
    }

    /// Whether the row with this id carries a deletion marker
    ///
    /// An unknown id is `false`.
    pub async fn is_deleted(&self, id: &str) -> RepositoryResult<bool> {
        let op = RepositoryOperation::IsDeleted;
        self.trace(op);
        let sql = self.store.rebind(&format!(
            "SELECT 1 FROM {} WHERE id = ? AND deleted_at IS NOT NULL LIMIT 1",
            self.table()
        ));
        let row = self
            .store
            .fetch_optional(&sql, &[SqlValue::from(id)])
            .await
            .map_err(Self::failed(op))?;
        Ok(row.is_some())
    }

    /// Run a caller-written query and decode every row
    ///
    /// `sql` must already use the backend's placeholder syntax.
    pub async fn select<R: FromStoreRow<C::Row>>(&self, sql: &str, args: &[SqlValue]) -> RepositoryResult<Vec<R>> {
        let op = RepositoryOperation::Statement;
        self.trace(op);
        let rows = self.store.fetch_all(sql, args).await.map_err(Self::failed(op))?;
        Self::decode_all(&rows, op)
    }

    /// Run a caller-written query and decode its first row, or `NotFound`
    pub async fn get<R: FromStoreRow<C::Row>>(&self, sql: &str, args: &[SqlValue]) -> RepositoryResult<R> {
        let op = RepositoryOperation::Statement;
        self.trace(op);
        let row = self
            .store
            .fetch_optional(sql, args)
            .await
            .map_err(Self::failed(op))?
            .ok_or_else(|| {
                RepositoryError::new(
                    op,
                    super::error::RepositoryErrorKind::NotFound,
                    "no rows returned",
                )
            })?;
        Self::decode(&row, op)
    }

    /// Compile a `:name` statement into the backend's positional form
    ///
    /// List arguments expand for `IN (:ids)` clauses.
    pub fn named(&self, sql: &str, args: &NamedArgs) -> RepositoryResult<(String, Vec<SqlValue>)> {
        let (sql, values) =
            named::compile(sql, args).map_err(Self::failed(RepositoryOperation::Statement))?;
        Ok((self.store.rebind(&sql), values))
    }

    /// Run a caller-written `:name` statement and return the affected row count
    pub async fn named_execute(&self, sql: &str, args: &NamedArgs) -> RepositoryResult<u64> {
        let op = RepositoryOperation::Statement;
        self.trace(op);
        self.store
            .named_execute(sql, args)
            .await
            .map_err(Self::failed(op))
    }
}

fn bound(n: u64) -> SqlValue {
    SqlValue::Int(i64::try_from(n).unwrap_or(i64::MAX))
}
