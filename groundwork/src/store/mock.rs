//! Recording in-memory store for tests
//!
//! Responses are scripted in order; with nothing scripted, queries return no
//! rows and statements affect nothing. Every statement is logged with its
//! arguments and whether it ran inside a transaction.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{Connection, PlaceholderStyle, Queryable, Transaction};
use crate::error::StoreError;
use crate::record::{Row, SqlValue};

/// A scripted result for the next statement
#[derive(Debug, Clone)]
pub enum Response {
    Rows(Vec<Row>),
    Affected(u64),
    Fail(StoreError),
}

/// A statement as the store saw it
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<SqlValue>,
    pub in_transaction: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct State {
    responses: VecDeque<Response>,
    statements: Vec<Statement>,
    events: Vec<Event>,
    fail_commit: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<State>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Response) -> &Self {
        self.state.lock().unwrap().responses.push_back(response);
        self
    }

    pub fn push_rows(&self, rows: Vec<Row>) -> &Self {
        self.push(Response::Rows(rows))
    }

    pub fn push_affected(&self, n: u64) -> &Self {
        self.push(Response::Affected(n))
    }

    pub fn fail_next(&self, err: StoreError) -> &Self {
        self.push(Response::Fail(err))
    }

    pub fn fail_commit(&self) {
        self.state.lock().unwrap().fail_commit = true;
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn last_statement(&self) -> Option<Statement> {
        self.state.lock().unwrap().statements.last().cloned()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    fn record(&self, sql: &str, args: &[SqlValue], in_transaction: bool) -> Option<Response> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(Statement {
            sql: sql.to_string(),
            args: args.to_vec(),
            in_transaction,
        });
        state.responses.pop_front()
    }

    fn rows(&self, sql: &str, args: &[SqlValue], in_transaction: bool) -> Result<Vec<Row>, StoreError> {
        match self.record(sql, args, in_transaction) {
            None => Ok(Vec::new()),
            Some(Response::Rows(rows)) => Ok(rows),
            Some(Response::Fail(err)) => Err(err),
            Some(Response::Affected(_)) => panic!("scripted Affected for a query: {sql}"),
        }
    }

    fn affected(&self, sql: &str, args: &[SqlValue], in_transaction: bool) -> Result<u64, StoreError> {
        match self.record(sql, args, in_transaction) {
            None => Ok(0),
            Some(Response::Affected(n)) => Ok(n),
            Some(Response::Fail(err)) => Err(err),
            Some(Response::Rows(_)) => panic!("scripted Rows for a statement: {sql}"),
        }
    }
}

#[async_trait]
impl Queryable for MockStore {
    type Row = Row;

    async fn fetch_optional(&mut self, sql: &str, args: &[SqlValue]) -> Result<Option<Row>, StoreError> {
        Ok(self.rows(sql, args, false)?.into_iter().next())
    }

    async fn fetch_all(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        self.rows(sql, args, false)
    }

    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64, StoreError> {
        self.affected(sql, args, false)
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }
}

#[async_trait]
impl Connection for MockStore {
    type Transaction = MockTransaction;

    async fn begin(&self) -> Result<MockTransaction, StoreError> {
        self.state.lock().unwrap().events.push(Event::Begin);
        Ok(MockTransaction { store: self.clone() })
    }
}

#[derive(Debug)]
pub struct MockTransaction {
    store: MockStore,
}

#[async_trait]
impl Queryable for MockTransaction {
    type Row = Row;

    async fn fetch_optional(&mut self, sql: &str, args: &[SqlValue]) -> Result<Option<Row>, StoreError> {
        Ok(self.store.rows(sql, args, true)?.into_iter().next())
    }

    async fn fetch_all(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        self.store.rows(sql, args, true)
    }

    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64, StoreError> {
        self.store.affected(sql, args, true)
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(self) -> Result<(), StoreError> {
        let mut state = self.store.state.lock().unwrap();
        if state.fail_commit {
            return Err(StoreError::transaction_failed("commit refused"));
        }
        state.events.push(Event::Commit);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.store.state.lock().unwrap().events.push(Event::Rollback);
        Ok(())
    }
}
