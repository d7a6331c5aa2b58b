//! # crmsync Engine
//!
//! Replicates the records of a remote CRM into a relational store whose
//! schema follows the remote field catalog.
//!
//! This crate provides:
//! - [`FieldCatalog`]: persistent identity of remote fields across renames
//!   and deletions
//! - [`SchemaEvolver`]: applies the catalog to the physical tables
//! - [`SyncOrchestrator`]: pagination, coercion, upserts, deletion
//!   reconciliation, retries and rate-limit cooperation
//! - Full and incremental runs with divergence handling and a run log
//!
//! ## Architecture
//!
//! Every data pass runs its stages in a fixed order:
//! 1. Catalog sync (new, renamed and deleted fields)
//! 2. Schema evolution (create, rename and drop columns)
//! 3. Paginated upserts by ascending remote identifier
//! 4. Deletion reconciliation, for unrestricted passes only
//!
//! All state lives in the tenant's store; components receive an explicit
//! [`TenantContext`].
//!
//! ## Key Invariants
//!
//! - A physical column name is decided once and only changes through a
//!   pending rename
//! - Renames are two-phase: recorded by the catalog, committed by the evolver
//! - Upserts are idempotent
//! - Reconciliation deletes all absent rows or none
//! - Incremental runs never leave the replica short; they escalate instead

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod coerce;
mod config;
mod context;
mod cursor;
mod error;
mod naming;
mod run_log;
mod schema;
mod sync;

pub use catalog::{normalize_type, CatalogStats, FieldCatalog, ObservedField};
pub use coerce::{coerce_record, coerce_value, FieldMap, FieldSpec, MULTIPLE_SEPARATOR};
pub use config::{PacingConfig, PlanTier, RetryConfig, SyncConfig};
pub use context::{EntityReport, EntityTarget, TenantContext};
pub use cursor::SyncCursor;
pub use error::{SyncError, SyncResult};
pub use naming::{physical_column, sanitize, CATALOG_TABLE_PREFIX, DATA_TABLE_PREFIX};
pub use run_log::{FileRunLog, MemoryRunLog, RunLog, RunLogEntry, RunOutcome, RunStatus};
pub use schema::{sql_type_for, SchemaEvolver, SchemaReport};
pub use sync::{changed_since, DeletionSweep, SyncMode, SyncOrchestrator};
