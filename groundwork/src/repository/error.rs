//! Repository error types
//!
//! Structured errors for repository operations: what was being done, what
//! went wrong, and which entity was involved.
//!
//! # Example
//!
//! ```rust
//! use groundwork::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("User", "usr_123");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert!(error.entity_id.is_some());
//! ```

use std::fmt;

use crate::error::{StoreError, StoreErrorKind};

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Listing rows of the table
    List,
    /// Fetching a single row by id
    GetById,
    /// Fetching the first row belonging to a user
    GetByUserId,
    /// Listing rows belonging to a user
    ListByUserId,
    /// Partial update of a row
    Update,
    /// Setting `deactivated_at`
    Deactivate,
    /// Clearing `deactivated_at`
    Activate,
    /// Setting `deleted_at`
    SoftDelete,
    /// Checking the soft-delete marker
    IsDeleted,
    /// Caller-supplied statement
    Statement,
    /// Transaction lifecycle (begin, commit, rollback, enrollment)
    Transaction,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => write!(f, "list"),
            Self::GetById => write!(f, "get_by_id"),
            Self::GetByUserId => write!(f, "get_by_user_id"),
            Self::ListByUserId => write!(f, "list_by_user_id"),
            Self::Update => write!(f, "update"),
            Self::Deactivate => write!(f, "deactivate"),
            Self::Activate => write!(f, "activate"),
            Self::SoftDelete => write!(f, "soft_delete"),
            Self::IsDeleted => write!(f, "is_deleted"),
            Self::Statement => write!(f, "statement"),
            Self::Transaction => write!(f, "transaction"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Entity was not found
    NotFound,
    /// A partial update carried no present fields
    NoFieldsToUpdate,
    /// Transaction operation invalid in the repository's current state
    InvalidState,
    /// Database constraint violation
    ConstraintViolation,
    /// Failed to connect to database
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// A row could not be decoded into the record type
    Decode,
    /// Underlying store failure
    StoreFailure,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::NoFieldsToUpdate => write!(f, "no_fields_to_update"),
            Self::InvalidState => write!(f, "invalid_state"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::Decode => write!(f, "decode"),
            Self::StoreFailure => write!(f, "store_failure"),
        }
    }
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use groundwork::repository::RepositoryError;
///
/// let error = RepositoryError::not_found("User", "abc123");
/// assert_eq!(
///     error.to_string(),
///     "Repository not_found error during get_by_id: Entity not found [User: abc123]"
/// );
/// assert!(!error.is_retriable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The type of entity involved (e.g., "User", "Contact")
    pub entity_type: Option<String>,
    /// The ID of the entity involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            operation: RepositoryOperation::GetById,
            kind: RepositoryErrorKind::NotFound,
            message: "Entity not found".to_string(),
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
        }
    }

    /// A partial update with nothing to write
    pub fn no_fields_to_update() -> Self {
        Self::new(
            RepositoryOperation::Update,
            RepositoryErrorKind::NoFieldsToUpdate,
            "no fields to update",
        )
    }

    /// A transaction operation that is not valid in the current state
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Transaction,
            RepositoryErrorKind::InvalidState,
            message,
        )
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::Timeout
        )
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(entity_type), Some(entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        let kind = match err.kind {
            StoreErrorKind::ConstraintViolation => RepositoryErrorKind::ConstraintViolation,
            StoreErrorKind::ConnectionFailed | StoreErrorKind::PoolExhausted => {
                RepositoryErrorKind::ConnectionFailed
            }
            StoreErrorKind::Timeout => RepositoryErrorKind::Timeout,
            StoreErrorKind::TypeConversion => RepositoryErrorKind::Decode,
            StoreErrorKind::TransactionFinished => RepositoryErrorKind::InvalidState,
            _ => RepositoryErrorKind::StoreFailure,
        };
        Self::new(RepositoryOperation::Statement, kind, err.to_string())
    }
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
