//! # groundwork
//!
//! Shared plumbing for backend services that sit on a relational store and a
//! key-value store.
//!
//! ## Features
//!
//! - **Repositories**: table-bound CRUD (list, lookups by id and owning user,
//!   partial updates, deactivation, soft deletion) with a transaction context
//!   that several repositories can share
//! - **Partial updates**: declare which fields of an update struct map to
//!   columns with [`updatable!`]; absent fields are left alone
//! - **Prefixed ids**: external identifiers carry a type prefix (`usr_...`)
//!   that is stripped on the way in and restored on the way out
//! - **Key-value store**: one capability over single-node Redis, Redis
//!   cluster and an in-process store
//! - **Crypt**: AES-GCM sealing of strings and serializable values
//! - **Validation**: UUID and email checks for request payloads
//! - **Configuration** with Figment, **structured logging** with tracing
//!
//! ## Example
//!
//! ```rust,no_run
//! use groundwork::prelude::*;
//!
//! #[derive(Debug, sqlx::FromRow)]
//! struct Contact {
//!     id: String,
//!     user_id: String,
//!     nickname: String,
//! }
//!
//! groundwork::id_fields!(Contact as "Contact" { "Id" => id, "UserId" => user_id });
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let db = config
//!         .database
//!         .as_ref()
//!         .ok_or_else(|| Error::Internal("no database configured".into()))?;
//!     let store = PgStore::connect(db).await?;
//!
//!     let contacts: Repository<Contact, PgStore> =
//!         Repository::new("contacts", store).with_config(&config.repository);
//!
//!     let mut contact = contacts.get_by_id(&strip_prefix("Id", "cont", "cont_42")?).await?;
//!     sanitize_outbound(&mut contact)?;
//!     tracing::info!(id = %contact.id, nickname = %contact.nickname, "found contact");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod crypt;
pub mod error;
pub mod ids;
pub mod observability;
pub mod record;
pub mod repository;
pub mod store;
pub mod validate;

pub use error::{Error, Result};

/// Support items for the crate's macros
#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{CacheError, KeyValueStore, KeyValueStoreExt, MemoryStore};
    #[cfg(feature = "cache")]
    pub use crate::cache::RedisStore;
    pub use crate::config::{Config, DatabaseConfig, RedisConfig, RepositoryConfig};
    pub use crate::error::{Error, Result, StoreError, StoreErrorKind, StoreOperation};
    pub use crate::ids::{
        new_id, prefixed, sanitize_inbound, sanitize_inline_inbound, sanitize_inline_outbound,
        sanitize_outbound, strip_prefix, IdPrefixError, Identified, PrefixTable,
    };
    pub use crate::observability::init_tracing;
    pub use crate::record::{
        extract_updatable, FromSqlValue, FromStoreRow, NamedArgs, Presence, Record, Row, RowError,
        SqlKind, SqlValue, ToSqlValue, Updatable,
    };
    pub use crate::repository::{
        MisusePolicy, Pagination, Repository, RepositoryError, RepositoryErrorKind,
        RepositoryResult, TableOptions,
    };
    pub use crate::store::{Connection, Queryable, Store, Transactable, Transaction, TxHandle};
    #[cfg(feature = "database")]
    pub use crate::store::{PgStore, PgTransaction};
    pub use crate::validate::{is_uuid, valid_email};
}
