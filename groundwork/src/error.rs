//! Error types shared across the crate
//!
//! Each layer owns a narrow error type ([`StoreError`] for statement execution,
//! [`RepositoryError`](crate::repository::RepositoryError) for repository
//! operations, [`IdPrefixError`](crate::ids::IdPrefixError) for id normalization,
//! [`CacheError`](crate::cache::CacheError) for the key-value store). The
//! crate-wide [`Error`] wraps all of them and exposes a stable [`Error::code`]
//! that a boundary layer can translate into a protocol response.

use std::fmt;
use thiserror::Error;

use crate::cache::CacheError;
use crate::crypt::CryptoError;
use crate::ids::IdPrefixError;
use crate::repository::RepositoryError;

// ============================================================================
// Structured Store Errors
// ============================================================================

/// Store operation being performed when the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// Establishing a connection
    Connect,
    /// Reading rows
    Query,
    /// Executing a write statement
    Execute,
    /// Transaction operations (begin, commit, rollback)
    Transaction,
    /// Compiling a named-parameter statement
    Compile,
    /// Decoding a row into a record
    Decode,
    /// Acquiring a connection from the pool
    PoolAcquire,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Query => write!(f, "query"),
            Self::Execute => write!(f, "execute"),
            Self::Transaction => write!(f, "transaction"),
            Self::Compile => write!(f, "compile"),
            Self::Decode => write!(f, "decode"),
            Self::PoolAcquire => write!(f, "pool_acquire"),
        }
    }
}

/// Category of store error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// Failed to establish connection
    ConnectionFailed,
    /// Constraint violation (unique, foreign key, check)
    ConstraintViolation,
    /// Statement execution failed
    QueryFailed,
    /// Transaction failed (begin, commit, or rollback)
    TransactionFailed,
    /// The transaction was already committed or rolled back
    TransactionFinished,
    /// Named parameters could not be bound
    InvalidStatement,
    /// Type conversion error
    TypeConversion,
    /// Configuration error
    Configuration,
    /// Operation timed out
    Timeout,
    /// Connection pool exhausted
    PoolExhausted,
    /// Other/unknown error
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::QueryFailed => write!(f, "query_failed"),
            Self::TransactionFailed => write!(f, "transaction_failed"),
            Self::TransactionFinished => write!(f, "transaction_finished"),
            Self::InvalidStatement => write!(f, "invalid_statement"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Configuration => write!(f, "configuration"),
            Self::Timeout => write!(f, "timeout"),
            Self::PoolExhausted => write!(f, "pool_exhausted"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured store error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// The operation being performed when the error occurred
    pub operation: StoreOperation,
    /// The category of error
    pub kind: StoreErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Additional context (e.g., table name, statement fragment)
    pub context: Option<String>,
}

impl StoreError {
    /// Create a new store error
    pub fn new(operation: StoreOperation, kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            StoreOperation::Connect,
            StoreErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::new(StoreOperation::Query, StoreErrorKind::QueryFailed, message)
    }

    /// Create a timeout error
    pub fn timeout(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::Timeout, message)
    }

    /// Create a pool exhausted error
    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::new(
            StoreOperation::PoolAcquire,
            StoreErrorKind::PoolExhausted,
            message,
        )
    }

    /// Create a transaction failed error
    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::new(
            StoreOperation::Transaction,
            StoreErrorKind::TransactionFailed,
            message,
        )
    }

    /// The shared transaction handle was already committed or rolled back
    pub fn transaction_finished() -> Self {
        Self::new(
            StoreOperation::Transaction,
            StoreErrorKind::TransactionFinished,
            "transaction has already been committed or rolled back",
        )
    }

    /// Create an invalid statement error (named parameter compilation)
    pub fn invalid_statement(message: impl Into<String>) -> Self {
        Self::new(
            StoreOperation::Compile,
            StoreErrorKind::InvalidStatement,
            message,
        )
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::ConnectionFailed | StoreErrorKind::Timeout | StoreErrorKind::PoolExhausted
        )
    }

    /// Add context to an existing error
    #[must_use]
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Database {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(ref ctx) = self.context {
            write!(f, " [context: {}]", ctx)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {}

/// Sanitize a connection URL by removing credentials
pub fn sanitize_url(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(scheme_end) = url.find("://") {
            if scheme_end < at_pos {
                let scheme = &url[..scheme_end + 3];
                let after_at = &url[at_pos + 1..];
                return format!("{}<redacted>@{}", scheme, after_at);
            }
        }
    }
    url.to_string()
}

// ============================================================================
// Crate Error
// ============================================================================

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Structured store error with operation context
    #[error("{0}")]
    Database(StoreError),

    /// Repository operation error
    #[error("{0}")]
    Repository(RepositoryError),

    /// Identifier prefix validation error
    #[error("{0}")]
    Id(#[from] IdPrefixError),

    /// Key-value store error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Encryption or decryption failure
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable, machine-readable code for this error
    pub fn code(&self) -> &'static str {
        use crate::repository::RepositoryErrorKind as K;

        match self {
            Error::Config(_) => "config_error",
            Error::Database(_) => "store_failure",
            Error::Repository(e) => match e.kind {
                K::NotFound => "not_found",
                K::NoFieldsToUpdate => "no_fields_to_update",
                K::InvalidState => "invalid_state",
                K::ConstraintViolation => "constraint_violation",
                K::ConnectionFailed => "connection_failed",
                K::Timeout => "timeout",
                K::Decode => "decode_error",
                K::StoreFailure => "store_failure",
            },
            Error::Id(e) => e.code(),
            Error::Cache(CacheError::NotFound { .. }) => "not_found",
            Error::Cache(_) => "cache_error",
            Error::Crypto(_) => "crypto_error",
            Error::Io(_) => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Whether the caller supplied bad input (as opposed to a server-side failure)
    ///
    /// Prefix validation, empty partial updates and not-found lookups are
    /// client-class outcomes; configuration problems in the prefix tables
    /// (`UnknownModel`, `UnknownField`) are not.
    pub fn is_client_error(&self) -> bool {
        use crate::repository::RepositoryErrorKind as K;

        match self {
            Error::Repository(e) => matches!(e.kind, K::NotFound | K::NoFieldsToUpdate),
            Error::Id(e) => e.is_caller_error(),
            Error::Cache(CacheError::NotFound { .. }) => true,
            _ => false,
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Database(err)
    }
}

impl From<RepositoryError> for Error {
    fn from(err: RepositoryError) -> Self {
        Error::Repository(err)
    }
}

/// SQLSTATE raised when `statement_timeout` cancels a statement
#[cfg(feature = "database")]
const QUERY_CANCELED: &str = "57014";

// Conversion from sqlx::Error to StoreError
#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as E;
        match err {
            E::RowNotFound => Self::query_failed("Row not found"),
            E::PoolTimedOut => Self::pool_exhausted("Connection pool timed out"),
            E::PoolClosed => Self::connection_failed("Connection pool is closed"),
            E::Protocol(msg) => Self::query_failed(msg),
            E::Configuration(e) => Self::new(
                StoreOperation::Connect,
                StoreErrorKind::Configuration,
                e.to_string(),
            ),
            E::Io(e) => Self::connection_failed(e.to_string()),
            E::Tls(e) => Self::connection_failed(format!("TLS error: {}", e)),
            E::TypeNotFound { type_name } => Self::new(
                StoreOperation::Query,
                StoreErrorKind::TypeConversion,
                format!("Type not found: {}", type_name),
            ),
            E::ColumnNotFound(col) => Self::new(
                StoreOperation::Decode,
                StoreErrorKind::TypeConversion,
                format!("Column not found: {}", col),
            ),
            E::ColumnDecode { index, source } => Self::new(
                StoreOperation::Decode,
                StoreErrorKind::TypeConversion,
                format!("Failed to decode column {}: {}", index, source),
            ),
            E::Decode(e) => Self::new(
                StoreOperation::Decode,
                StoreErrorKind::TypeConversion,
                e.to_string(),
            ),
            E::Database(db_err) if db_err.code().as_deref() == Some(QUERY_CANCELED) => {
                Self::timeout(StoreOperation::Query, db_err.to_string())
            }
            E::Database(db_err) => {
                let kind = if db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation()
                {
                    StoreErrorKind::ConstraintViolation
                } else {
                    StoreErrorKind::QueryFailed
                };
                Self::new(StoreOperation::Query, kind, db_err.to_string())
            }
            E::WorkerCrashed => Self::connection_failed("Database worker crashed"),
            _ => Self::new(StoreOperation::Query, StoreErrorKind::Other, err.to_string()),
        }
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(StoreError::from(err))
    }
}

#[cfg(feature = "cache")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Cache(CacheError::from(err))
    }
}
