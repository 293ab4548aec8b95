//! Entity id prefixes
//!
//! Identifiers leave the service as `<prefix>_<id>` (for example
//! `usr_6f1c...`) and are stored bare. The prefix identifies the entity type,
//! so a contact id can never be passed where a user id is expected.
//!
//! The mapping is a closed table: [`PrefixTable::standard`] holds every known
//! entity and foreign-key field, and an unknown model or field is an error
//! rather than a guess.
//!
//! Records opt in by declaring their string fields with [`id_fields!`](crate::id_fields):
//!
//! ```rust
//! use groundwork::ids::{sanitize_inbound, sanitize_outbound};
//! use groundwork::id_fields;
//!
//! struct Device {
//!     id: String,
//!     user_id: String,
//!     label: String,
//! }
//!
//! id_fields!(Device as "Device" {
//!     "Id" => id,
//!     "UserId" => user_id,
//!     "Label" => label,
//! });
//!
//! let mut device = Device {
//!     id: "devc_42".to_string(),
//!     user_id: "usr_7".to_string(),
//!     label: "phone".to_string(),
//! };
//! sanitize_inbound(&mut device).unwrap();
//! assert_eq!(device.id, "42");
//! assert_eq!(device.user_id, "7");
//!
//! sanitize_outbound(&mut device).unwrap();
//! assert_eq!(device.id, "devc_42");
//! assert_eq!(device.label, "phone");
//! ```

use once_cell::sync::Lazy;
use std::collections::HashMap;
use uuid::Uuid;

/// Field name that carries a record's own id
pub const ID_FIELD: &str = "Id";

/// Error type for prefix validation and normalization
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdPrefixError {
    /// The model has no registered prefix
    #[error("model unknown: {model}")]
    UnknownModel {
        /// The model name that was looked up
        model: String,
    },

    /// An inline field has no registered relational prefix
    #[error("unknown field type: {field}")]
    UnknownField {
        /// The field name that was looked up
        field: String,
    },

    /// The caller supplied an id without its prefix
    #[error("input missing prefix {prefix}_ on {field}")]
    MissingPrefix {
        /// Field that failed validation
        field: String,
        /// The expected prefix, without the separator
        prefix: String,
    },

    /// The number of inline outputs does not match the declared fields
    #[error("invalid inline length: expected {expected}, got {actual}")]
    InvalidInlineLength {
        /// Declared field count
        expected: usize,
        /// Supplied output count
        actual: usize,
    },
}

impl IdPrefixError {
    /// Stable, machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownModel { .. } => "unknown_model",
            Self::UnknownField { .. } => "unknown_field",
            Self::MissingPrefix { .. } => "missing_prefix",
            Self::InvalidInlineLength { .. } => "invalid_inline_length",
        }
    }

    /// Whether the caller's input was at fault, rather than the table configuration
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::MissingPrefix { .. })
    }
}

/// Accessors for one string field of a record
pub struct IdField<T> {
    /// Declared field name, matched against the prefix tables
    pub name: &'static str,
    /// Reads the field
    pub get: fn(&T) -> &String,
    /// Overwrites the field
    pub set: fn(&mut T, String),
}

impl<T> std::fmt::Debug for IdField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdField").field("name", &self.name).finish()
    }
}

/// Declared id-bearing fields of a record type
pub struct IdFields<T> {
    model: &'static str,
    fields: Vec<IdField<T>>,
}

impl<T> IdFields<T> {
    /// Start a descriptor for `model`, the entity name looked up for the `Id` field
    #[must_use]
    pub fn new(model: &'static str) -> Self {
        Self {
            model,
            fields: Vec::new(),
        }
    }

    /// Declare a string field
    #[must_use]
    pub fn field(mut self, name: &'static str, get: fn(&T) -> &String, set: fn(&mut T, String)) -> Self {
        self.fields.push(IdField { name, get, set });
        self
    }

    /// The model name
    pub fn model(&self) -> &'static str {
        self.model
    }

    /// Declared fields in declaration order
    pub fn fields(&self) -> &[IdField<T>] {
        &self.fields
    }

    fn find(&self, name: &str) -> Option<&IdField<T>> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A record whose ids are prefixed at the service boundary
///
/// Implement with the [`id_fields!`](crate::id_fields) macro.
pub trait Identified: Sized + 'static {
    /// Field descriptor, built once per type
    fn id_fields() -> &'static IdFields<Self>;
}

/// Declare the id descriptor of a struct
///
/// `"FieldName" => field` maps the name matched against the prefix tables to
/// a `String` field. `"Id"` is the record's own id; names found in the
/// relational table are foreign keys; anything else is carried but ignored by
/// the non-inline operations.
#[macro_export]
macro_rules! id_fields {
    ($ty:ident as $model:literal { $($name:literal => $field:ident),* $(,)? }) => {
        impl $crate::ids::Identified for $ty {
            fn id_fields() -> &'static $crate::ids::IdFields<Self> {
                static FIELDS: $crate::__private::Lazy<$crate::ids::IdFields<$ty>> =
                    $crate::__private::Lazy::new(|| {
                        $crate::ids::IdFields::new($model)
                            $(
                                .field(
                                    $name,
                                    |record: &$ty| &record.$field,
                                    |record: &mut $ty, value: String| record.$field = value,
                                )
                            )*
                    });
                &FIELDS
            }
        }
    };
}

/// Closed mapping from entity and foreign-key names to prefixes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixTable {
    models: HashMap<String, String>,
    relations: HashMap<String, String>,
}

static STANDARD: Lazy<PrefixTable> = Lazy::new(|| {
    PrefixTable::new()
        .with_model("User", "usr")
        .with_model("Platform", "plat")
        .with_model("PlatformMember", "membr")
        .with_model("Network", "netw")
        .with_model("Asset", "asst")
        .with_model("Device", "devc")
        .with_model("Contact", "cont")
        .with_model("Location", "loc")
        .with_model("Instrument", "inst")
        .with_model("TxLeg", "txleg")
        .with_model("Transaction", "tx")
        .with_model("AuthStrategy", "auth")
        .with_model("ApiKey", "apikey")
        .with_model("Contract", "cx")
        .with_model("MemberRole", "mrole")
        .with_model("MemberInvite", "minv")
        .with_model("NetworkData", "ndata")
        .with_relation("UserId", "usr")
        .with_relation("PlatformId", "plat")
        .with_relation("MemberId", "membr")
        .with_relation("ContactId", "cont")
        .with_relation("DeviceId", "devc")
        .with_relation("InstrumentId", "inst")
        .with_relation("NetworkId", "netw")
        .with_relation("OriginTxLegId", "txleg")
        .with_relation("DestinationTxLegId", "txleg")
        .with_relation("ReceiptTxId", "txleg")
        .with_relation("ResponseTxId", "txleg")
        .with_relation("AssetId", "asst")
        .with_relation("RoleId", "mrole")
});

impl PrefixTable {
    /// An empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The table of every entity known to the platform
    pub fn standard() -> &'static PrefixTable {
        &STANDARD
    }

    /// Register an entity prefix
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.models.insert(model.into(), prefix.into());
        self
    }

    /// Register a foreign-key field prefix
    #[must_use]
    pub fn with_relation(mut self, field: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.relations.insert(field.into(), prefix.into());
        self
    }

    /// Prefix of an entity
    pub fn model_prefix(&self, model: &str) -> Result<&str, IdPrefixError> {
        self.models
            .get(model)
            .map(String::as_str)
            .ok_or_else(|| IdPrefixError::UnknownModel {
                model: model.to_string(),
            })
    }

    /// Prefix of a foreign-key field, if registered
    pub fn relation_prefix(&self, field: &str) -> Option<&str> {
        self.relations.get(field).map(String::as_str)
    }

    /// Generate a fresh external id for `model`
    pub fn new_id(&self, model: &str) -> Result<String, IdPrefixError> {
        let prefix = self.model_prefix(model)?;
        Ok(prefixed(prefix, &Uuid::new_v4().to_string()))
    }

    /// Validate and remove prefixes from a record arriving from a caller
    ///
    /// The record's `Id` uses its model prefix, and every declared field found
    /// in the relational table uses that field's prefix. Every field is checked
    /// before any is rewritten, so on error the record is left untouched.
    pub fn sanitize_inbound<T: Identified>(&self, record: &mut T) -> Result<(), IdPrefixError> {
        let descriptor = T::id_fields();
        let mut stripped = Vec::new();

        for (field, prefix) in self.prefixed_fields(descriptor)? {
            let bare = strip_prefix(field.name, prefix, (field.get)(record))?;
            stripped.push((field, bare.to_string()));
        }

        for (field, bare) in stripped {
            (field.set)(record, bare);
        }
        Ok(())
    }

    /// Add prefixes to a record about to be returned to a caller
    ///
    /// Values are not validated; any string is prefixed.
    pub fn sanitize_outbound<T: Identified>(&self, record: &mut T) -> Result<(), IdPrefixError> {
        let descriptor = T::id_fields();
        for (field, prefix) in self.prefixed_fields(descriptor)? {
            let value = prefixed(prefix, (field.get)(record));
            (field.set)(record, value);
        }
        Ok(())
    }

    /// Strip prefixes from `source`'s fields into positional outputs
    ///
    /// Every declared field of `T` must be a registered relational field, and
    /// `out` must hold exactly one slot per declared field. Outputs are only
    /// written once every field has been validated.
    pub fn sanitize_inline_inbound<T: Identified>(
        &self,
        source: &T,
        out: &mut [&mut String],
    ) -> Result<(), IdPrefixError> {
        let prefixes = self.inline_prefixes::<T>(out.len())?;
        let mut stripped = Vec::with_capacity(prefixes.len());
        for (field, prefix) in T::id_fields().fields().iter().zip(prefixes) {
            stripped.push(strip_prefix(field.name, prefix, (field.get)(source))?.to_string());
        }
        for (slot, bare) in out.iter_mut().zip(stripped) {
            **slot = bare;
        }
        Ok(())
    }

    /// Prefix `source`'s fields into positional outputs
    pub fn sanitize_inline_outbound<T: Identified>(
        &self,
        source: &T,
        out: &mut [&mut String],
    ) -> Result<(), IdPrefixError> {
        let prefixes = self.inline_prefixes::<T>(out.len())?;
        for ((field, prefix), slot) in T::id_fields().fields().iter().zip(prefixes).zip(out.iter_mut()) {
            **slot = prefixed(prefix, (field.get)(source));
        }
        Ok(())
    }

    fn prefixed_fields<'d, T>(
        &self,
        descriptor: &'d IdFields<T>,
    ) -> Result<Vec<(&'d IdField<T>, &str)>, IdPrefixError> {
        let mut fields = Vec::new();
        if let Some(id) = descriptor.find(ID_FIELD) {
            fields.push((id, self.model_prefix(descriptor.model())?));
        }
        for field in descriptor.fields() {
            if let Some(prefix) = self.relation_prefix(field.name) {
                fields.push((field, prefix));
            }
        }
        Ok(fields)
    }

    fn inline_prefixes<T: Identified>(&self, supplied: usize) -> Result<Vec<&str>, IdPrefixError> {
        let fields = T::id_fields().fields();
        if fields.len() != supplied {
            return Err(IdPrefixError::InvalidInlineLength {
                expected: fields.len(),
                actual: supplied,
            });
        }
        fields
            .iter()
            .map(|field| {
                self.relation_prefix(field.name)
                    .ok_or_else(|| IdPrefixError::UnknownField {
                        field: field.name.to_string(),
                    })
            })
            .collect()
    }
}

/// `<prefix>_<value>`
pub fn prefixed(prefix: &str, value: &str) -> String {
    format!("{prefix}_{value}")
}

/// Remove `<prefix>_` from `value`, failing with `MissingPrefix` when absent
pub fn strip_prefix<'v>(field: &str, prefix: &str, value: &'v str) -> Result<&'v str, IdPrefixError> {
    value
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or_else(|| IdPrefixError::MissingPrefix {
            field: field.to_string(),
            prefix: prefix.to_string(),
        })
}

/// [`PrefixTable::sanitize_inbound`] against the standard table
pub fn sanitize_inbound<T: Identified>(record: &mut T) -> Result<(), IdPrefixError> {
    PrefixTable::standard().sanitize_inbound(record)
}

/// [`PrefixTable::sanitize_outbound`] against the standard table
pub fn sanitize_outbound<T: Identified>(record: &mut T) -> Result<(), IdPrefixError> {
    PrefixTable::standard().sanitize_outbound(record)
}

/// [`PrefixTable::sanitize_inline_inbound`] against the standard table
pub fn sanitize_inline_inbound<T: Identified>(source: &T, out: &mut [&mut String]) -> Result<(), IdPrefixError> {
    PrefixTable::standard().sanitize_inline_inbound(source, out)
}

/// [`PrefixTable::sanitize_inline_outbound`] against the standard table
pub fn sanitize_inline_outbound<T: Identified>(source: &T, out: &mut [&mut String]) -> Result<(), IdPrefixError> {
    PrefixTable::standard().sanitize_inline_outbound(source, out)
}

/// [`PrefixTable::new_id`] against the standard table
pub fn new_id(model: &str) -> Result<String, IdPrefixError> {
    PrefixTable::standard().new_id(model)
}
