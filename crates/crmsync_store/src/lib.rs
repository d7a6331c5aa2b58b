//! # crmsync Store
//!
//! Relational store abstraction for crmsync.
//!
//! The sync engine never writes SQL itself. Everything it needs from the
//! destination database goes through the [`Store`] trait:
//!
//! - DDL on physical data tables (create, add/rename/drop column, existence checks)
//! - Upserts keyed by the remote record identifier
//! - The transactional deletion-reconciliation step
//! - Persistence of the per-entity field catalog
//!
//! ## Available Stores
//!
//! - [`SqliteStore`] - SQLite via `rusqlite`, file-backed or in-memory
//!
//! ## Example
//!
//! ```rust
//! use crmsync_store::{SqlType, SqlValue, SqliteStore, Store};
//!
//! let store = SqliteStore::in_memory().unwrap();
//! store.ensure_data_table("tbl_deals").unwrap();
//! store.add_column("tbl_deals", "title_title", SqlType::Text).unwrap();
//! store
//!     .upsert_row("tbl_deals", 7, &[("title_title".into(), SqlValue::from("Kickoff"))])
//!     .unwrap();
//! assert_eq!(store.count_rows("tbl_deals").unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod descriptor;
mod error;
mod sqlite;
mod store;
mod value;

pub use descriptor::{FieldDescriptor, FieldType};
pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;
pub use store::{Row, Store, SOURCE_ID_COLUMN, SYNCED_AT_COLUMN};
pub use value::{SqlType, SqlValue};
