//! Record values and row decoding
//!
//! Arguments travel to a backend as [`SqlValue`]s produced by [`ToSqlValue`].
//! A NULL keeps the [`SqlKind`] of the Rust type it came from, so the backend
//! can bind it with the right parameter type.
//!
//! Rows come back in each backend's native row type and are turned into
//! records through [`FromStoreRow`]. The Postgres backend hands its rows to
//! `sqlx::FromRow`, so records used with it derive that. The in-process
//! backends produce a [`Row`] of [`SqlValue`]s, which records rebuild
//! themselves from through the [`Record`] trait.
//!
//! # Example
//!
//! ```rust
//! use groundwork::record::{Record, Row, RowError, SqlValue};
//!
//! struct Contact {
//!     id: String,
//!     user_id: String,
//!     nickname: Option<String>,
//! }
//!
//! impl Record for Contact {
//!     fn from_row(row: &Row) -> Result<Self, RowError> {
//!         Ok(Self {
//!             id: row.get("id")?,
//!             user_id: row.get("user_id")?,
//!             nickname: row.get("nickname")?,
//!         })
//!     }
//! }
//!
//! let row = Row::new()
//!     .with("id", "abc")
//!     .with("user_id", "u1")
//!     .with("nickname", SqlValue::NULL);
//! let contact = Contact::from_row(&row).unwrap();
//! assert_eq!(contact.id, "abc");
//! assert!(contact.nickname.is_none());
//! ```

mod fields;

pub use fields::{extract_updatable, Assignments, Updatable, UpdateField};

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{StoreError, StoreErrorKind, StoreOperation};

/// Named statement arguments, keyed by parameter name without the leading `:`
pub type NamedArgs = HashMap<String, SqlValue>;

/// The SQL type family a value, or a NULL standing in for one, belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SqlKind {
    /// Boolean
    Bool,
    /// Integer of any width
    Int,
    /// Floating point
    Float,
    /// Text
    Text,
    /// Raw bytes
    Bytes,
    /// UUID
    Uuid,
    /// Timestamp
    Timestamp,
    /// JSON document
    Json,
    /// No type information; backends bind it as text
    #[default]
    Unknown,
}

/// A single value bound to, or read from, a statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL of the given kind
    Null(SqlKind),
    /// Boolean
    Bool(bool),
    /// Any integer width, widened to 64 bits
    Int(i64),
    /// Any float width, widened to 64 bits
    Float(f64),
    /// Text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// UUID
    Uuid(Uuid),
    /// Timestamp, normalized to UTC
    Timestamp(DateTime<Utc>),
    /// JSON document
    Json(serde_json::Value),
    /// A list; expanded into one placeholder per element inside named statements
    List(Vec<SqlValue>),
}

impl SqlValue {
    /// A NULL with no type information
    pub const NULL: SqlValue = SqlValue::Null(SqlKind::Unknown);

    /// Name of the variant, used in decode error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null(_) => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
            Self::Json(_) => "json",
            Self::List(_) => "list",
        }
    }

    /// Whether this is SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Type family of the value; lists report [`SqlKind::Unknown`]
    pub fn kind(&self) -> SqlKind {
        match self {
            Self::Null(kind) => *kind,
            Self::Bool(_) => SqlKind::Bool,
            Self::Int(_) => SqlKind::Int,
            Self::Float(_) => SqlKind::Float,
            Self::Text(_) => SqlKind::Text,
            Self::Bytes(_) => SqlKind::Bytes,
            Self::Uuid(_) => SqlKind::Uuid,
            Self::Timestamp(_) => SqlKind::Timestamp,
            Self::Json(_) => SqlKind::Json,
            Self::List(_) => SqlKind::Unknown,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(_) => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "'{}'", v),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::Uuid(v) => write!(f, "{}", v),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Json(v) => write!(f, "{}", v),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Conversion of a Rust value into a bindable [`SqlValue`]
pub trait ToSqlValue {
    /// Convert to a statement argument
    fn to_sql_value(&self) -> SqlValue;

    /// Kind of the values this type produces; used to type its NULL
    fn sql_kind() -> SqlKind
    where
        Self: Sized,
    {
        SqlKind::Unknown
    }
}

macro_rules! to_sql_value {
    ($($ty:ty as $kind:ident => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl ToSqlValue for $ty {
                fn to_sql_value(&self) -> SqlValue {
                    let $v = self;
                    $body
                }

                fn sql_kind() -> SqlKind {
                    SqlKind::$kind
                }
            }

            impl Presence for $ty {
                fn present(&self) -> Option<SqlValue> {
                    Some(self.to_sql_value())
                }
            }

            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    value.to_sql_value()
                }
            }
        )*
    };
}

to_sql_value! {
    String as Text => |v| SqlValue::Text(v.clone()),
    &str as Text => |v| SqlValue::Text((*v).to_string()),
    bool as Bool => |v| SqlValue::Bool(*v),
    i16 as Int => |v| SqlValue::Int(i64::from(*v)),
    i32 as Int => |v| SqlValue::Int(i64::from(*v)),
    i64 as Int => |v| SqlValue::Int(*v),
    u32 as Int => |v| SqlValue::Int(i64::from(*v)),
    f32 as Float => |v| SqlValue::Float(f64::from(*v)),
    f64 as Float => |v| SqlValue::Float(*v),
    Uuid as Uuid => |v| SqlValue::Uuid(*v),
    DateTime<Utc> as Timestamp => |v| SqlValue::Timestamp(*v),
    NaiveDateTime as Timestamp => |v| SqlValue::Timestamp(v.and_utc()),
    serde_json::Value as Json => |v| SqlValue::Json(v.clone()),
}

impl ToSqlValue for SqlValue {
    fn to_sql_value(&self) -> SqlValue {
        self.clone()
    }
}

impl Presence for SqlValue {
    fn present(&self) -> Option<SqlValue> {
        Some(self.clone())
    }
}

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn to_sql_value(&self) -> SqlValue {
        match self {
            Some(v) => v.to_sql_value(),
            None => SqlValue::Null(T::sql_kind()),
        }
    }

    fn sql_kind() -> SqlKind {
        T::sql_kind()
    }
}

impl<T: ToSqlValue> ToSqlValue for Vec<T> {
    fn to_sql_value(&self) -> SqlValue {
        SqlValue::List(self.iter().map(ToSqlValue::to_sql_value).collect())
    }
}

impl<T: ToSqlValue> Presence for Vec<T> {
    fn present(&self) -> Option<SqlValue> {
        Some(self.to_sql_value())
    }
}

/// Whether a field carries a value for a partial update
///
/// `Option<T>` is the absent sentinel: `None` means "not supplied" and the
/// column is left out of the statement. Everything else is present, including
/// empty strings and zeros. `Option<Option<T>>` expresses "set this column to
/// NULL" as `Some(None)`.
pub trait Presence {
    /// The value to write, or `None` when the field is absent
    fn present(&self) -> Option<SqlValue>;
}

impl<T: ToSqlValue> Presence for Option<T> {
    fn present(&self) -> Option<SqlValue> {
        self.as_ref().map(ToSqlValue::to_sql_value)
    }
}

/// Failure to read a column out of a [`Row`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    /// The row has no column with this name
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// The column holds a value of a different type
    #[error("column '{column}' expected {expected}, found {found}")]
    TypeMismatch {
        /// Column name
        column: String,
        /// Requested type
        expected: &'static str,
        /// Stored value type
        found: &'static str,
    },
}

/// Conversion of a stored [`SqlValue`] into a Rust value
pub trait FromSqlValue: Sized {
    /// Name used in mismatch errors
    const EXPECTED: &'static str;

    /// Convert, returning `None` when the value has an incompatible type
    fn from_sql_value(value: &SqlValue) -> Option<Self>;
}

impl FromSqlValue for String {
    const EXPECTED: &'static str = "text";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Uuid(u) => Some(u.to_string()),
            _ => None,
        }
    }
}

impl FromSqlValue for bool {
    const EXPECTED: &'static str = "bool";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromSqlValue for i64 {
    const EXPECTED: &'static str = "int";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromSqlValue for i32 {
    const EXPECTED: &'static str = "int";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Int(i) => i32::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl FromSqlValue for f64 {
    const EXPECTED: &'static str = "float";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Float(v) => Some(*v),
            SqlValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromSqlValue for Uuid {
    const EXPECTED: &'static str = "uuid";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Uuid(u) => Some(*u),
            SqlValue::Text(s) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    const EXPECTED: &'static str = "timestamp";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl FromSqlValue for serde_json::Value {
    const EXPECTED: &'static str = "json";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Json(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromSqlValue for Vec<u8> {
    const EXPECTED: &'static str = "bytes";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null(_) => Some(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

/// A decoded result row: column names with their values, in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Create an empty row
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, builder style
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(column, value);
        self
    }

    /// Append a column
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.columns.push((column.into(), value.into()));
    }

    /// Raw value of a column
    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Typed value of a column
    pub fn get<T: FromSqlValue>(&self, column: &str) -> Result<T, RowError> {
        let value = self
            .value(column)
            .ok_or_else(|| RowError::ColumnNotFound(column.to_string()))?;
        T::from_sql_value(value).ok_or_else(|| RowError::TypeMismatch {
            column: column.to_string(),
            expected: T::EXPECTED,
            found: value.type_name(),
        })
    }

    /// Column names in select order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A persisted record that can be rebuilt from a [`Row`]
pub trait Record: Sized + Send + Sync + 'static {
    /// Decode one row
    fn from_row(row: &Row) -> Result<Self, RowError>;
}

/// Decoding of a backend's native row type `R` into a record
///
/// Every [`Record`] decodes from [`Row`]. With the `database` feature, every
/// `sqlx::FromRow` type decodes from `sqlx::postgres::PgRow`.
pub trait FromStoreRow<R>: Sized + Send + 'static {
    /// Decode one row
    fn from_store_row(row: &R) -> Result<Self, StoreError>;
}

impl<T: Record> FromStoreRow<Row> for T {
    fn from_store_row(row: &Row) -> Result<Self, StoreError> {
        T::from_row(row).map_err(StoreError::from)
    }
}

impl From<RowError> for StoreError {
    fn from(err: RowError) -> Self {
        StoreError::new(
            StoreOperation::Decode,
            StoreErrorKind::TypeConversion,
            err.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_treats_empty_values_as_present() {
        assert_eq!(String::new().present(), Some(SqlValue::Text(String::new())));
        assert_eq!(0_i64.present(), Some(SqlValue::Int(0)));
        assert_eq!(Some(String::new()).present(), Some(SqlValue::Text(String::new())));
        assert_eq!(None::<String>.present(), None);
    }

    #[test]
    fn test_presence_of_nested_option_sets_null() {
        let clear: Option<Option<String>> = Some(None);
        assert_eq!(clear.present(), Some(SqlValue::Null(SqlKind::Text)));

        let absent: Option<Option<String>> = None;
        assert_eq!(absent.present(), None);
    }

    #[test]
    fn test_null_keeps_the_kind_of_its_type() {
        let qty: Option<Option<i32>> = Some(None);
        assert_eq!(qty.present(), Some(SqlValue::Null(SqlKind::Int)));

        let seen_at: Option<Option<DateTime<Utc>>> = Some(None);
        assert_eq!(seen_at.present(), Some(SqlValue::Null(SqlKind::Timestamp)));

        let ok: Option<Option<bool>> = Some(None);
        assert_eq!(ok.present().map(|v| v.kind()), Some(SqlKind::Bool));

        assert_eq!(None::<serde_json::Value>.to_sql_value(), SqlValue::Null(SqlKind::Json));
        assert!(SqlValue::NULL.is_null());
        assert_eq!(SqlValue::NULL.kind(), SqlKind::Unknown);
    }

    #[test]
    fn test_record_decodes_through_store_row() {
        struct Named {
            name: String,
        }

        impl Record for Named {
            fn from_row(row: &Row) -> Result<Self, RowError> {
                Ok(Self {
                    name: row.get("name")?,
                })
            }
        }

        let named = Named::from_store_row(&Row::new().with("name", "alice")).unwrap();
        assert_eq!(named.name, "alice");

        let err = match Named::from_store_row(&Row::new().with("name", 1_i64)) {
            Err(err) => err,
            Ok(_) => panic!("decoded an int column as text"),
        };
        assert_eq!(err.operation, StoreOperation::Decode);
        assert_eq!(err.kind, StoreErrorKind::TypeConversion);
    }

    #[test]
    fn test_row_get_typed() {
        let id = Uuid::new_v4();
        let row = Row::new()
            .with("id", id)
            .with("name", "alice")
            .with("age", 42_i32)
            .with("deleted_at", SqlValue::NULL);

        assert_eq!(row.get::<Uuid>("id").unwrap(), id);
        assert_eq!(row.get::<String>("id").unwrap(), id.to_string());
        assert_eq!(row.get::<String>("name").unwrap(), "alice");
        assert_eq!(row.get::<i32>("age").unwrap(), 42);
        assert_eq!(row.get::<Option<DateTime<Utc>>>("deleted_at").unwrap(), None);
    }

    #[test]
    fn test_row_get_errors() {
        let row = Row::new().with("name", "alice");

        assert_eq!(
            row.get::<String>("missing").unwrap_err(),
            RowError::ColumnNotFound("missing".to_string())
        );
        assert_eq!(
            row.get::<i64>("name").unwrap_err(),
            RowError::TypeMismatch {
                column: "name".to_string(),
                expected: "int",
                found: "text",
            }
        );
    }

    #[test]
    fn test_vec_becomes_list() {
        let value = vec!["a".to_string(), "b".to_string()].to_sql_value();
        assert_eq!(
            value,
            SqlValue::List(vec![
                SqlValue::Text("a".to_string()),
                SqlValue::Text("b".to_string())
            ])
        );
        assert_eq!(value.to_string(), "['a', 'b']");
    }
}
