//! Store trait definition.

use crate::descriptor::FieldDescriptor;
use crate::error::StoreResult;
use crate::value::{SqlType, SqlValue};
use std::collections::{BTreeMap, BTreeSet};

/// Primary key column of every physical data table.
pub const SOURCE_ID_COLUMN: &str = "source_id";

/// Sync timestamp column of every physical data table.
pub const SYNCED_AT_COLUMN: &str = "synced_at";

/// A physical row, column name to value.
pub type Row = BTreeMap<String, SqlValue>;

/// The relational destination of a sync run.
///
/// A store owns one tenant's database. Every method is individually atomic;
/// only [`Store::reconcile_ids`] spans several statements and it runs inside
/// a transaction.
///
/// # Invariants
///
/// - DDL helpers are idempotent where their name says so (`ensure_*`)
/// - `upsert_row` always refreshes [`SYNCED_AT_COLUMN`]
/// - `reconcile_ids` either deletes every absent row or none of them
/// - Catalog tables enforce uniqueness of `remote_field_id`
///
/// # Implementors
///
/// - [`super::SqliteStore`]
pub trait Store: Send + Sync {
    /// Creates a physical data table with its minimal shape if it is absent.
    fn ensure_data_table(&self, table: &str) -> StoreResult<()>;

    /// Returns true if the table exists.
    fn table_exists(&self, table: &str) -> StoreResult<bool>;

    /// Returns true if the column exists on the table.
    fn column_exists(&self, table: &str, column: &str) -> StoreResult<bool>;

    /// Lists the column names of a table, in declaration order.
    fn columns(&self, table: &str) -> StoreResult<Vec<String>>;

    /// Adds a column.
    fn add_column(&self, table: &str, column: &str, sql_type: SqlType) -> StoreResult<()>;

    /// Renames a column in place, keeping its data.
    fn rename_column(&self, table: &str, from: &str, to: &str) -> StoreResult<()>;

    /// Drops a column and its data.
    fn drop_column(&self, table: &str, column: &str) -> StoreResult<()>;

    /// Inserts the row, or updates the given columns if `source_id` exists.
    ///
    /// An empty `values` slice is a no-op.
    fn upsert_row(&self, table: &str, source_id: i64, values: &[(String, SqlValue)])
        -> StoreResult<()>;

    /// Reads one row by its remote identifier.
    fn fetch_row(&self, table: &str, source_id: i64) -> StoreResult<Option<Row>>;

    /// Returns the remote identifiers of all rows, ascending.
    fn row_ids(&self, table: &str) -> StoreResult<Vec<i64>>;

    /// Counts the rows of a table.
    fn count_rows(&self, table: &str) -> StoreResult<u64>;

    /// Deletes every row whose identifier is not in `keep`.
    ///
    /// Returns the number of deleted rows. On failure the transaction is
    /// rolled back and the table is unchanged.
    fn reconcile_ids(&self, table: &str, keep: &BTreeSet<i64>) -> StoreResult<u64>;

    /// Creates a catalog table if it is absent.
    fn ensure_catalog(&self, catalog: &str) -> StoreResult<()>;

    /// Loads all catalog rows, ordered by row id.
    fn load_catalog(&self, catalog: &str) -> StoreResult<Vec<FieldDescriptor>>;

    /// Inserts a catalog row and returns its row id.
    fn insert_descriptor(&self, catalog: &str, field: &FieldDescriptor) -> StoreResult<i64>;

    /// Overwrites a catalog row identified by `field.id`.
    fn update_descriptor(&self, catalog: &str, field: &FieldDescriptor) -> StoreResult<()>;

    /// Permanently removes a catalog row.
    fn delete_descriptor(&self, catalog: &str, id: i64) -> StoreResult<()>;

    /// Clears the soft-delete marker on every catalog row.
    fn clear_deleted_marks(&self, catalog: &str) -> StoreResult<()>;

    /// Moves pending names into place and clears rename flags.
    ///
    /// Returns the number of committed renames.
    fn commit_pending_renames(&self, catalog: &str) -> StoreResult<u64>;
}
