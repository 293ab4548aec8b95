//! Partial-update field extraction
//!
//! A partial update touches only the columns whose input fields were
//! supplied. Each update payload type declares, once, which of its fields map
//! to which persistence column; [`extract_updatable`] walks that declaration
//! in order and keeps the fields that are present.
//!
//! Only use this for partial updates. Inserts and full-row reads must not
//! drop absent fields, since there an absent value may be intentional.
//!
//! # Example
//!
//! ```rust
//! use groundwork::record::extract_updatable;
//! use groundwork::updatable;
//!
//! struct ContactUpdate {
//!     nickname: Option<String>,
//!     email: Option<String>,
//!     audit_note: String,
//! }
//!
//! updatable!(ContactUpdate {
//!     nickname => "nickname",
//!     email => "email",
//!     audit_note,
//! });
//!
//! let update = ContactUpdate {
//!     nickname: Some("al".to_string()),
//!     email: None,
//!     audit_note: "ignored".to_string(),
//! };
//! let assignments = extract_updatable(&update);
//! assert_eq!(assignments.clauses, vec!["nickname=:nickname".to_string()]);
//! assert_eq!(assignments.values.len(), 1);
//! ```

use super::{NamedArgs, SqlValue};

/// One declared field of an update payload
pub struct UpdateField<T> {
    /// Rust field name
    pub name: &'static str,
    /// Persistence column; untagged fields are never written
    pub column: Option<&'static str>,
    /// Reads the field, `None` when absent
    pub value: fn(&T) -> Option<SqlValue>,
}

impl<T> std::fmt::Debug for UpdateField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateField")
            .field("name", &self.name)
            .field("column", &self.column)
            .finish()
    }
}

/// An update payload with a field descriptor built once per type
///
/// Implement with the [`updatable!`](crate::updatable) macro.
pub trait Updatable: Sized + Send + Sync + 'static {
    /// Declared fields in declaration order
    fn update_fields() -> &'static [UpdateField<Self>];
}

/// Column assignments extracted from an update payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignments {
    /// `column=:column` clauses in declaration order
    pub clauses: Vec<String>,
    /// Values keyed by column
    pub values: NamedArgs,
}

impl Assignments {
    /// Whether no field was present
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Number of assigned columns
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// The clauses joined for a `SET` list
    pub fn set_list(&self) -> String {
        self.clauses.join(", ")
    }
}

/// Collect the present, tagged fields of `item`
///
/// Untagged fields are skipped rather than rejected. An empty result is the
/// caller's signal that there is nothing to update.
pub fn extract_updatable<T: Updatable>(item: &T) -> Assignments {
    let fields = T::update_fields();
    let mut assignments = Assignments {
        clauses: Vec::with_capacity(fields.len()),
        values: NamedArgs::with_capacity(fields.len()),
    };

    for field in fields {
        let Some(column) = field.column else {
            continue;
        };
        if let Some(value) = (field.value)(item) {
            assignments.clauses.push(format!("{column}=:{column}"));
            assignments.values.insert(column.to_string(), value);
        }
    }

    assignments
}

/// Declare the partial-update descriptor of a struct
///
/// `field => "column"` maps a field to its persistence column; a bare `field`
/// is untagged and never written. Tagged field types must implement
/// [`Presence`](crate::record::Presence), so `Option<T>` fields are skipped
/// when `None`.
#[macro_export]
macro_rules! updatable {
    ($ty:ident { $($field:ident $(=> $column:literal)?),* $(,)? }) => {
        impl $crate::record::Updatable for $ty {
            fn update_fields() -> &'static [$crate::record::UpdateField<Self>] {
                static FIELDS: $crate::__private::Lazy<Vec<$crate::record::UpdateField<$ty>>> =
                    $crate::__private::Lazy::new(|| {
                        vec![
                            $(
                                $crate::record::UpdateField {
                                    name: stringify!($field),
                                    column: $crate::updatable!(@column $($column)?),
                                    value: $crate::updatable!(@value $ty, $field $(, $column)?),
                                },
                            )*
                        ]
                    });
                FIELDS.as_slice()
            }
        }
    };
    (@column $column:literal) => {
        Some($column)
    };
    (@column) => {
        None
    };
    (@value $ty:ident, $field:ident, $column:literal) => {
        |item: &$ty| $crate::record::Presence::present(&item.$field)
    };
    (@value $ty:ident, $field:ident) => {
        |_: &$ty| None
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SqlKind;
    use chrono::{DateTime, Utc};

    struct ProfileUpdate {
        display_name: Option<String>,
        bio: Option<String>,
        age: Option<i32>,
        avatar: Option<Option<String>>,
        last_seen: Option<DateTime<Utc>>,
        scratch: Option<String>,
    }

    updatable!(ProfileUpdate {
        display_name => "display_name",
        bio => "bio",
        age => "age",
        avatar => "avatar_url",
        last_seen => "last_seen_at",
        scratch,
    });

    fn empty() -> ProfileUpdate {
        ProfileUpdate {
            display_name: None,
            bio: None,
            age: None,
            avatar: None,
            last_seen: None,
            scratch: None,
        }
    }

    #[test]
    fn test_no_present_fields_yields_empty() {
        let assignments = extract_updatable(&empty());
        assert!(assignments.is_empty());
        assert!(assignments.values.is_empty());
    }

    #[test]
    fn test_present_fields_in_declaration_order() {
        let update = ProfileUpdate {
            age: Some(30),
            display_name: Some("Ada".to_string()),
            ..empty()
        };

        let assignments = extract_updatable(&update);
        assert_eq!(
            assignments.clauses,
            vec!["display_name=:display_name".to_string(), "age=:age".to_string()]
        );
        assert_eq!(
            assignments.values.get("display_name"),
            Some(&SqlValue::Text("Ada".to_string()))
        );
        assert_eq!(assignments.values.get("age"), Some(&SqlValue::Int(30)));
        assert_eq!(assignments.set_list(), "display_name=:display_name, age=:age");
    }

    #[test]
    fn test_empty_string_and_zero_are_present() {
        let update = ProfileUpdate {
            bio: Some(String::new()),
            age: Some(0),
            ..empty()
        };

        let assignments = extract_updatable(&update);
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments.values.get("bio"), Some(&SqlValue::Text(String::new())));
        assert_eq!(assignments.values.get("age"), Some(&SqlValue::Int(0)));
    }

    #[test]
    fn test_untagged_fields_are_skipped() {
        let update = ProfileUpdate {
            scratch: Some("not persisted".to_string()),
            ..empty()
        };

        assert!(extract_updatable(&update).is_empty());
    }

    #[test]
    fn test_explicit_null_uses_column_name() {
        let update = ProfileUpdate {
            avatar: Some(None),
            ..empty()
        };

        let assignments = extract_updatable(&update);
        assert_eq!(assignments.clauses, vec!["avatar_url=:avatar_url".to_string()]);
        assert_eq!(assignments.values.get("avatar_url"), Some(&SqlValue::Null(SqlKind::Text)));
    }

    #[test]
    fn test_column_count_matches_present_tagged_fields() {
        let update = ProfileUpdate {
            display_name: Some("Ada".to_string()),
            bio: Some("hi".to_string()),
            age: Some(1),
            avatar: Some(Some("a.png".to_string())),
            last_seen: Some(Utc::now()),
            scratch: Some("x".to_string()),
        };

        let assignments = extract_updatable(&update);
        assert_eq!(assignments.len(), 5);
        assert_eq!(assignments.values.len(), 5);
        for clause in &assignments.clauses {
            let column = clause.split('=').next().unwrap();
            assert!(assignments.values.contains_key(column));
        }
    }

    #[test]
    fn test_descriptor_is_built_once() {
        let first = ProfileUpdate::update_fields().as_ptr();
        let second = ProfileUpdate::update_fields().as_ptr();
        assert_eq!(first, second);
        assert_eq!(ProfileUpdate::update_fields().len(), 6);
        assert_eq!(ProfileUpdate::update_fields()[5].column, None);
    }
}
