//! Table-bound repositories
//!
//! A [`Repository`] wraps one table and one connection. It offers the CRUD
//! operations every entity table shares (listing, lookups by id and by
//! owning user, partial updates, deactivation and soft deletion) plus raw
//! escape hatches, and carries its own transaction context so callers do not
//! have to thread a transaction through every call.
//!
//! # Example
//!
//! ```rust,ignore
//! use groundwork::prelude::*;
//!
//! let mut contacts: Repository<Contact, PgStore> = Repository::new("contacts", store.clone());
//! let mut devices: Repository<Device, PgStore> = Repository::new("devices", store);
//!
//! let tx = contacts.begin().await?;
//! devices.set_tx(&tx)?;
//!
//! let result = async {
//!     contacts.update(&contact_id, &ContactUpdate { nickname: Some(name), ..Default::default() }).await?;
//!     devices.deactivate(&device_id).await?;
//!     Ok::<_, RepositoryError>(())
//! }
//! .await;
//!
//! match result {
//!     Ok(()) => {
//!         contacts.commit().await?;
//!         contacts.reset_with(&mut [&mut devices]);
//!     }
//!     Err(e) => {
//!         contacts.rollback_with(&mut [&mut devices]).await?;
//!         return Err(e.into());
//!     }
//! }
//! ```

mod base;
mod error;
mod pagination;
mod scope;

#[cfg(test)]
pub(crate) mod fixtures;

pub use base::{ListLimits, MisusePolicy, Repository};
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult};
pub use pagination::{Pagination, TableOptions};
pub use scope::Scope;
