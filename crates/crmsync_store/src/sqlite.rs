//! SQLite store.

use crate::descriptor::{FieldDescriptor, FieldType};
use crate::error::{StoreError, StoreResult};
use crate::store::{Row, Store, SOURCE_ID_COLUMN, SYNCED_AT_COLUMN};
use crate::value::{SqlType, SqlValue};
use parking_lot::Mutex;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Millisecond-precision timestamp expression used for sync and catalog stamps.
const NOW: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now')";

const CATALOG_COLUMNS: &str = "id, remote_field_id, friendly_name, pending_friendly_name, \
     field_type, physical_table, physical_column, is_multiple, is_deleted, needs_rename, \
     last_updated";

/// A [`Store`] backed by a single SQLite database.
///
/// One connection is shared behind a mutex, so a store can be handed to the
/// engine as `Arc<dyn Store>` and used from any thread. Statements from
/// different callers are serialized.
///
/// # Example
///
/// ```rust
/// use crmsync_store::{SqliteStore, Store};
///
/// let store = SqliteStore::in_memory().unwrap();
/// store.ensure_data_table("tbl_tasks").unwrap();
/// assert!(store.table_exists("tbl_tasks").unwrap());
/// ```
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (creating if absent) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        debug!("Opened SQLite store at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        })
    }

    /// Returns the database file path, or `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Quotes an SQL identifier.
fn quote_ident(name: &str) -> StoreResult<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

fn read_descriptor(row: &rusqlite::Row<'_>) -> rusqlite::Result<(FieldDescriptor, String)> {
    let field_type: String = row.get(4)?;
    let field = FieldDescriptor {
        id: row.get(0)?,
        remote_field_id: row.get(1)?,
        friendly_name: row.get(2)?,
        pending_friendly_name: row.get(3)?,
        field_type: FieldType::Text,
        physical_table: row.get(5)?,
        physical_column: row.get(6)?,
        is_multiple: row.get::<_, i64>(7)? != 0,
        is_deleted: row.get::<_, i64>(8)? != 0,
        needs_rename: row.get::<_, i64>(9)? != 0,
        last_updated: row.get(10)?,
    };
    Ok((field, field_type))
}

impl Store for SqliteStore {
    fn ensure_data_table(&self, table: &str) -> StoreResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({SOURCE_ID_COLUMN} INTEGER PRIMARY KEY, {SYNCED_AT_COLUMN} TIMESTAMP)",
            quote_ident(table)?
        );
        self.conn.lock().execute(&sql, [])?;
        Ok(())
    }

    fn table_exists(&self, table: &str) -> StoreResult<bool> {
        let found = self
            .conn
            .lock()
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn column_exists(&self, table: &str, column: &str) -> StoreResult<bool> {
        let found = self
            .conn
            .lock()
            .query_row(
                "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
                params![table, column],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn columns(&self, table: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let names = stmt
            .query_map(params![table], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn add_column(&self, table: &str, column: &str, sql_type: SqlType) -> StoreResult<()> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table)?,
            quote_ident(column)?,
            sql_type.as_sql()
        );
        self.conn.lock().execute(&sql, [])?;
        Ok(())
    }

    fn rename_column(&self, table: &str, from: &str, to: &str) -> StoreResult<()> {
        let sql = format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_ident(table)?,
            quote_ident(from)?,
            quote_ident(to)?
        );
        self.conn.lock().execute(&sql, [])?;
        Ok(())
    }

    fn drop_column(&self, table: &str, column: &str) -> StoreResult<()> {
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(table)?,
            quote_ident(column)?
        );
        self.conn.lock().execute(&sql, [])?;
        Ok(())
    }

    fn upsert_row(
        &self,
        table: &str,
        source_id: i64,
        values: &[(String, SqlValue)],
    ) -> StoreResult<()> {
        if values.is_empty() {
            return Ok(());
        }

        let columns = values
            .iter()
            .map(|(column, _)| quote_ident(column))
            .collect::<StoreResult<Vec<_>>>()?;
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>();
        let updates = columns
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>();

        let sql = format!(
            "INSERT INTO {table} ({cols}, {SOURCE_ID_COLUMN}, {SYNCED_AT_COLUMN}) \
             VALUES ({placeholders}, ?{id_param}, {NOW}) \
             ON CONFLICT({SOURCE_ID_COLUMN}) DO UPDATE SET {updates}, \
             {SYNCED_AT_COLUMN} = excluded.{SYNCED_AT_COLUMN}",
            table = quote_ident(table)?,
            cols = columns.join(", "),
            placeholders = placeholders.join(", "),
            id_param = columns.len() + 1,
            updates = updates.join(", "),
        );

        let mut bound: Vec<&dyn ToSql> = values.iter().map(|(_, v)| v as &dyn ToSql).collect();
        bound.push(&source_id);

        self.conn.lock().execute(&sql, bound.as_slice())?;
        Ok(())
    }

    fn fetch_row(&self, table: &str, source_id: i64) -> StoreResult<Option<Row>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {SOURCE_ID_COLUMN} = ?1",
            quote_ident(table)?
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let row = stmt
            .query_row(params![source_id], |row| {
                let mut out = Row::new();
                for (i, name) in names.iter().enumerate() {
                    out.insert(name.clone(), SqlValue::from_value_ref(row.get_ref(i)?));
                }
                Ok(out)
            })
            .optional()?;
        Ok(row)
    }

    fn row_ids(&self, table: &str) -> StoreResult<Vec<i64>> {
        let sql = format!(
            "SELECT {SOURCE_ID_COLUMN} FROM {} ORDER BY {SOURCE_ID_COLUMN}",
            quote_ident(table)?
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn count_rows(&self, table: &str) -> StoreResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
        let count: i64 = self.conn.lock().query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn reconcile_ids(&self, table: &str, keep: &BTreeSet<i64>) -> StoreResult<u64> {
        let delete_sql = format!(
            "DELETE FROM {} WHERE {SOURCE_ID_COLUMN} NOT IN (SELECT source_id FROM temp.staged_ids)",
            quote_ident(table)?
        );

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let staged = (|| -> rusqlite::Result<u64> {
            tx.execute_batch(
                "CREATE TEMP TABLE IF NOT EXISTS staged_ids (source_id INTEGER PRIMARY KEY);
                 DELETE FROM temp.staged_ids;",
            )?;
            {
                let mut insert =
                    tx.prepare("INSERT OR IGNORE INTO temp.staged_ids (source_id) VALUES (?1)")?;
                for id in keep {
                    insert.execute(params![id])?;
                }
            }
            let deleted = tx.execute(&delete_sql, [])?;
            tx.execute_batch("DROP TABLE temp.staged_ids;")?;
            Ok(deleted as u64)
        })();

        match staged {
            Ok(deleted) => {
                tx.commit().map_err(|source| StoreError::RolledBack {
                    table: table.to_string(),
                    source,
                })?;
                Ok(deleted)
            }
            Err(source) => {
                if let Err(e) = tx.rollback() {
                    warn!("Rollback of reconciliation on {} failed: {}", table, e);
                }
                Err(StoreError::RolledBack {
                    table: table.to_string(),
                    source,
                })
            }
        }
    }

    fn ensure_catalog(&self, catalog: &str) -> StoreResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_field_id TEXT NOT NULL UNIQUE,
                friendly_name TEXT NOT NULL,
                pending_friendly_name TEXT,
                field_type TEXT NOT NULL,
                physical_table TEXT NOT NULL,
                physical_column TEXT NOT NULL,
                is_multiple INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                needs_rename INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT
            )",
            quote_ident(catalog)?
        );
        self.conn.lock().execute(&sql, [])?;
        Ok(())
    }

    fn load_catalog(&self, catalog: &str) -> StoreResult<Vec<FieldDescriptor>> {
        let sql = format!(
            "SELECT {CATALOG_COLUMNS} FROM {} ORDER BY id ASC",
            quote_ident(catalog)?
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], read_descriptor)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut field, ty)| {
                field.field_type = ty
                    .parse()
                    .map_err(|message: String| StoreError::corrupt_catalog(catalog, message))?;
                Ok(field)
            })
            .collect()
    }

    fn insert_descriptor(&self, catalog: &str, field: &FieldDescriptor) -> StoreResult<i64> {
        let sql = format!(
            "INSERT INTO {} (remote_field_id, friendly_name, pending_friendly_name, field_type, \
             physical_table, physical_column, is_multiple, is_deleted, needs_rename, last_updated) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, {NOW})",
            quote_ident(catalog)?
        );
        let conn = self.conn.lock();
        conn.execute(
            &sql,
            params![
                field.remote_field_id,
                field.friendly_name,
                field.pending_friendly_name,
                field.field_type.as_str(),
                field.physical_table,
                field.physical_column,
                field.is_multiple,
                field.is_deleted,
                field.needs_rename,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update_descriptor(&self, catalog: &str, field: &FieldDescriptor) -> StoreResult<()> {
        let sql = format!(
            "UPDATE {} SET remote_field_id = ?1, friendly_name = ?2, pending_friendly_name = ?3, \
             field_type = ?4, physical_table = ?5, physical_column = ?6, is_multiple = ?7, \
             is_deleted = ?8, needs_rename = ?9, last_updated = {NOW} WHERE id = ?10",
            quote_ident(catalog)?
        );
        self.conn.lock().execute(
            &sql,
            params![
                field.remote_field_id,
                field.friendly_name,
                field.pending_friendly_name,
                field.field_type.as_str(),
                field.physical_table,
                field.physical_column,
                field.is_multiple,
                field.is_deleted,
                field.needs_rename,
                field.id,
            ],
        )?;
        Ok(())
    }

    fn delete_descriptor(&self, catalog: &str, id: i64) -> StoreResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", quote_ident(catalog)?);
        self.conn.lock().execute(&sql, params![id])?;
        Ok(())
    }

    fn clear_deleted_marks(&self, catalog: &str) -> StoreResult<()> {
        let sql = format!(
            "UPDATE {} SET is_deleted = 0 WHERE is_deleted <> 0",
            quote_ident(catalog)?
        );
        self.conn.lock().execute(&sql, [])?;
        Ok(())
    }

    fn commit_pending_renames(&self, catalog: &str) -> StoreResult<u64> {
        let sql = format!(
            "UPDATE {} SET friendly_name = COALESCE(pending_friendly_name, friendly_name), \
             pending_friendly_name = NULL, needs_rename = 0, last_updated = {NOW} \
             WHERE needs_rename = 1",
            quote_ident(catalog)?
        );
        let committed = self.conn.lock().execute(&sql, [])?;
        Ok(committed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn text(s: &str) -> SqlValue {
        SqlValue::from(s)
    }

    fn descriptor(remote_id: &str, name: &str) -> FieldDescriptor {
        FieldDescriptor::new(
            remote_id,
            name,
            FieldType::Text,
            "tbl_deals",
            format!("{}_{}", name.to_lowercase(), remote_id.to_lowercase()),
            false,
        )
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("a\"b").unwrap(), "\"a\"\"b\"");
        assert!(matches!(
            quote_ident(""),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn data_table_ddl() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(!store.table_exists("tbl_deals").unwrap());

        store.ensure_data_table("tbl_deals").unwrap();
        store.ensure_data_table("tbl_deals").unwrap();
        assert!(store.table_exists("tbl_deals").unwrap());
        assert_eq!(
            store.columns("tbl_deals").unwrap(),
            vec![SOURCE_ID_COLUMN.to_string(), SYNCED_AT_COLUMN.to_string()]
        );

        store
            .add_column("tbl_deals", "status_uf_1", SqlType::Text)
            .unwrap();
        assert!(store.column_exists("tbl_deals", "status_uf_1").unwrap());

        store
            .rename_column("tbl_deals", "status_uf_1", "stage_uf_1")
            .unwrap();
        assert!(!store.column_exists("tbl_deals", "status_uf_1").unwrap());
        assert!(store.column_exists("tbl_deals", "stage_uf_1").unwrap());

        store.drop_column("tbl_deals", "stage_uf_1").unwrap();
        assert!(!store.column_exists("tbl_deals", "stage_uf_1").unwrap());
    }

    #[test]
    fn upsert_inserts_then_updates() {
        let store = SqliteStore::in_memory().unwrap();
        store.ensure_data_table("tbl_deals").unwrap();
        store.add_column("tbl_deals", "title", SqlType::Text).unwrap();
        store
            .add_column("tbl_deals", "amount", SqlType::Numeric)
            .unwrap();

        store
            .upsert_row(
                "tbl_deals",
                10,
                &[
                    ("title".into(), text("First")),
                    ("amount".into(), SqlValue::Real(12.5)),
                ],
            )
            .unwrap();
        let first = store.fetch_row("tbl_deals", 10).unwrap().unwrap();

        store
            .upsert_row("tbl_deals", 10, &[("title".into(), text("Second"))])
            .unwrap();
        let second = store.fetch_row("tbl_deals", 10).unwrap().unwrap();

        assert_eq!(store.count_rows("tbl_deals").unwrap(), 1);
        assert_eq!(second["title"], text("Second"));
        assert_eq!(second["amount"], SqlValue::Real(12.5));
        assert!(second[SYNCED_AT_COLUMN].as_text() >= first[SYNCED_AT_COLUMN].as_text());
    }

    #[test]
    fn upsert_with_no_values_is_noop() {
        let store = SqliteStore::in_memory().unwrap();
        store.ensure_data_table("tbl_deals").unwrap();
        store.upsert_row("tbl_deals", 1, &[]).unwrap();
        assert_eq!(store.count_rows("tbl_deals").unwrap(), 0);
    }

    #[test]
    fn reconcile_removes_absent_rows() {
        let store = SqliteStore::in_memory().unwrap();
        store.ensure_data_table("tbl_deals").unwrap();
        store.add_column("tbl_deals", "title", SqlType::Text).unwrap();
        for id in 1..=4 {
            store
                .upsert_row("tbl_deals", id, &[("title".into(), text("x"))])
                .unwrap();
        }

        let keep: BTreeSet<i64> = [1, 3].into_iter().collect();
        let deleted = store.reconcile_ids("tbl_deals", &keep).unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(store.row_ids("tbl_deals").unwrap(), vec![1, 3]);

        // Staging table does not leak between runs.
        let deleted = store.reconcile_ids("tbl_deals", &keep).unwrap();
        assert_eq!(deleted, 0);
    }

    #[test]
    fn reconcile_on_missing_table_rolls_back() {
        let store = SqliteStore::in_memory().unwrap();
        let keep: BTreeSet<i64> = [1].into_iter().collect();
        let err = store.reconcile_ids("tbl_missing", &keep).unwrap_err();
        assert!(matches!(err, StoreError::RolledBack { .. }));
    }

    #[test]
    fn catalog_crud() {
        let store = SqliteStore::in_memory().unwrap();
        store.ensure_catalog("idx_deals").unwrap();
        store.ensure_catalog("idx_deals").unwrap();

        let mut field = descriptor("UF_CRM_1", "Status");
        field.id = store.insert_descriptor("idx_deals", &field).unwrap();
        store
            .insert_descriptor("idx_deals", &descriptor("TITLE", "Title"))
            .unwrap();

        let loaded = store.load_catalog("idx_deals").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].remote_field_id, "UF_CRM_1");
        assert!(loaded[0].last_updated.is_some());

        field.pending_friendly_name = Some("Stage".into());
        field.needs_rename = true;
        field.is_deleted = true;
        store.update_descriptor("idx_deals", &field).unwrap();

        store.clear_deleted_marks("idx_deals").unwrap();
        assert_eq!(store.commit_pending_renames("idx_deals").unwrap(), 1);

        let loaded = store.load_catalog("idx_deals").unwrap();
        assert_eq!(loaded[0].friendly_name, "Stage");
        assert_eq!(loaded[0].pending_friendly_name, None);
        assert!(!loaded[0].needs_rename);
        assert!(!loaded[0].is_deleted);

        store.delete_descriptor("idx_deals", field.id).unwrap();
        assert_eq!(store.load_catalog("idx_deals").unwrap().len(), 1);
    }

    #[test]
    fn catalog_rejects_duplicate_remote_ids() {
        let store = SqliteStore::in_memory().unwrap();
        store.ensure_catalog("idx_deals").unwrap();
        store
            .insert_descriptor("idx_deals", &descriptor("UF_CRM_1", "Status"))
            .unwrap();
        let result = store.insert_descriptor("idx_deals", &descriptor("UF_CRM_1", "Other"));
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }

    #[test]
    fn file_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tenant.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            assert_eq!(store.path(), Some(path.as_path()));
            store.ensure_data_table("tbl_tasks").unwrap();
            store.add_column("tbl_tasks", "title", SqlType::Text).unwrap();
            store
                .upsert_row("tbl_tasks", 5, &[("title".into(), text("Call"))])
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let row = store.fetch_row("tbl_tasks", 5).unwrap().unwrap();
        assert_eq!(row["title"], text("Call"));
    }
}
