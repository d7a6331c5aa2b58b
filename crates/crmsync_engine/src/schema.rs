//! The schema evolver.

use crate::context::{EntityTarget, TenantContext};
use crate::error::{SyncError, SyncResult};
use crate::naming::physical_column;
use crmsync_store::{FieldDescriptor, FieldType, SqlType};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// What one schema evolution changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    /// Columns created.
    pub columns_added: u64,
    /// Columns renamed in place.
    pub columns_renamed: u64,
    /// Columns dropped for deleted fields.
    pub columns_dropped: u64,
    /// Catalog rows permanently removed.
    pub fields_removed: u64,
    /// Pending names committed.
    pub renames_committed: u64,
}

impl SchemaReport {
    /// Returns true if nothing changed.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Column type of a field. Multiple-valued fields are always text.
pub fn sql_type_for(field: &FieldDescriptor) -> SqlType {
    if field.is_multiple {
        return SqlType::Text;
    }
    match field.field_type {
        FieldType::Integer => SqlType::Integer,
        FieldType::Double => SqlType::Numeric,
        FieldType::Date => SqlType::Date,
        FieldType::DateTime => SqlType::Timestamp,
        FieldType::Text => SqlType::Text,
    }
}

/// Applies the catalog to the physical tables of one entity.
///
/// Every structural change is preceded by an existence check, so running
/// the evolver again after a partial failure finishes the job.
pub struct SchemaEvolver<'a> {
    ctx: &'a TenantContext,
    target: &'a EntityTarget,
}

impl<'a> SchemaEvolver<'a> {
    /// Creates an evolver for one entity.
    pub fn new(ctx: &'a TenantContext, target: &'a EntityTarget) -> Self {
        Self { ctx, target }
    }

    /// Brings the physical schema in line with the catalog.
    ///
    /// Runs in three ordered steps: live fields (tables, renames, missing
    /// columns), then deleted fields (drop column, remove catalog row), then
    /// the commit of pending names.
    pub fn update_physical_schema(&self) -> SyncResult<SchemaReport> {
        let store = self.ctx.store();
        let catalog = self.target.catalog_table();
        store.ensure_catalog(&catalog)?;

        let fields = store.load_catalog(&catalog)?;
        let mut report = SchemaReport::default();
        let mut tables = BTreeSet::new();

        for field in fields.iter().filter(|f| !f.is_deleted) {
            if tables.insert(field.physical_table.as_str()) {
                store.ensure_data_table(&field.physical_table)?;
            }
            if field.needs_rename {
                self.rename_column(&catalog, field, &mut report)?;
            } else {
                self.ensure_column(&field.physical_table, &field.physical_column, sql_type_for(field), &mut report)?;
            }
        }

        for field in fields.iter().filter(|f| f.is_deleted) {
            if store.column_exists(&field.physical_table, &field.physical_column)? {
                store.drop_column(&field.physical_table, &field.physical_column)?;
                info!(
                    table = %field.physical_table,
                    column = %field.physical_column,
                    "dropped column of deleted field"
                );
                report.columns_dropped += 1;
            }
            store.delete_descriptor(&catalog, field.id)?;
            report.fields_removed += 1;
        }

        report.renames_committed = store.commit_pending_renames(&catalog)?;

        if !report.is_noop() {
            info!(
                tenant = %self.ctx.tenant(),
                entity = %self.target.table_base_name,
                added = report.columns_added,
                renamed = report.columns_renamed,
                dropped = report.columns_dropped,
                "physical schema updated"
            );
        }
        Ok(report)
    }

    fn ensure_column(
        &self,
        table: &str,
        column: &str,
        sql_type: SqlType,
        report: &mut SchemaReport,
    ) -> SyncResult<()> {
        let store = self.ctx.store();
        if !store.column_exists(table, column)? {
            store.add_column(table, column, sql_type)?;
            report.columns_added += 1;
        }
        Ok(())
    }

    fn rename_column(
        &self,
        catalog: &str,
        field: &FieldDescriptor,
        report: &mut SchemaReport,
    ) -> SyncResult<()> {
        let store = self.ctx.store();
        let table = &field.physical_table;
        let old = &field.physical_column;
        let new = physical_column(field.effective_name(), &field.remote_field_id);

        if &new == old {
            self.ensure_column(table, &new, sql_type_for(field), report)?;
        } else if store.column_exists(table, old)? && !store.column_exists(table, &new)? {
            store.rename_column(table, old, &new)?;
            info!(%table, from = %old, to = %new, "renamed column");
            report.columns_renamed += 1;
        } else {
            let conflict = if store.column_exists(table, &new)? {
                SyncError::schema_conflict(table, &new, "rename target already exists")
            } else {
                SyncError::schema_conflict(table, old, "column to rename is missing")
            };
            warn!(%conflict, "falling back to creating the renamed column");
            self.ensure_column(table, &new, sql_type_for(field), report)?;
        }

        let mut updated = field.clone();
        updated.physical_column = new;
        store.update_descriptor(catalog, &updated)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldCatalog;
    use crmsync_remote::EntityKind;
    use crmsync_store::{SqlValue, Store};
    use crmsync_testkit::{field, multiple_field, FakeCrm, TestStore};
    use std::sync::Arc;

    fn setup() -> (Arc<FakeCrm>, TestStore, TenantContext, EntityTarget) {
        let crm = Arc::new(FakeCrm::new(EntityKind::Crm { id: 2 }));
        let store = TestStore::memory();
        let ctx = TenantContext::new("acme", crm.clone(), store.store.clone());
        let target = EntityTarget::new("deals", EntityKind::Crm { id: 2 }, "deals");
        (crm, store, ctx, target)
    }

    #[test]
    fn type_mapping() {
        let mut field = FieldDescriptor::new("F", "F", FieldType::Double, "t", "c", false);
        assert_eq!(sql_type_for(&field), SqlType::Numeric);
        field.field_type = FieldType::DateTime;
        assert_eq!(sql_type_for(&field), SqlType::Timestamp);
        field.field_type = FieldType::Integer;
        field.is_multiple = true;
        assert_eq!(sql_type_for(&field), SqlType::Text);
    }

    #[test]
    fn creates_table_and_columns_idempotently() {
        let (crm, store, ctx, target) = setup();
        crm.add_field("title", field("string", "Title"));
        crm.add_field("opportunity", field("money", "Amount"));
        crm.add_field("ufCrmTags", multiple_field("integer", "Tags"));
        FieldCatalog::new(&ctx, &target).sync_field_mapping().unwrap();

        let evolver = SchemaEvolver::new(&ctx, &target);
        let report = evolver.update_physical_schema().unwrap();
        assert_eq!(report.columns_added, 3);

        let columns = store.columns("tbl_deals").unwrap();
        assert_eq!(
            columns,
            vec!["source_id", "synced_at", "amount_opportunity", "title_title", "tags_ufcrmtags"]
        );

        assert!(evolver.update_physical_schema().unwrap().is_noop());
    }

    #[test]
    fn rename_keeps_data() {
        let (crm, store, ctx, target) = setup();
        crm.add_field("UF_CRM_1", field("string", "Status"));
        let catalog = FieldCatalog::new(&ctx, &target);
        let evolver = SchemaEvolver::new(&ctx, &target);
        catalog.sync_field_mapping().unwrap();
        evolver.update_physical_schema().unwrap();
        store
            .upsert_row("tbl_deals", 1, &[("status_uf_crm_1".into(), SqlValue::from("won"))])
            .unwrap();

        crm.rename_field("UF_CRM_1", "Stage");
        catalog.sync_field_mapping().unwrap();
        let report = evolver.update_physical_schema().unwrap();
        assert_eq!(report.columns_renamed, 1);
        assert_eq!(report.renames_committed, 1);

        let field = &catalog.descriptors().unwrap()[0];
        assert!(!field.needs_rename);
        assert_eq!(field.friendly_name, "Stage");
        assert_eq!(field.pending_friendly_name, None);
        assert_eq!(field.physical_column, "stage_uf_crm_1");

        let row = store.fetch_row("tbl_deals", 1).unwrap().unwrap();
        assert_eq!(row["stage_uf_crm_1"], SqlValue::from("won"));
        assert!(!row.contains_key("status_uf_crm_1"));
    }

    #[test]
    fn rename_of_missing_column_creates_it() {
        let (crm, store, ctx, target) = setup();
        crm.add_field("UF_CRM_1", field("string", "Status"));
        let catalog = FieldCatalog::new(&ctx, &target);
        catalog.sync_field_mapping().unwrap();

        // Renamed before the column was ever created.
        crm.rename_field("UF_CRM_1", "Stage");
        catalog.sync_field_mapping().unwrap();
        let report = SchemaEvolver::new(&ctx, &target).update_physical_schema().unwrap();

        assert_eq!(report.columns_added, 1);
        assert!(store.column_exists("tbl_deals", "stage_uf_crm_1").unwrap());
        assert!(!store.column_exists("tbl_deals", "status_uf_crm_1").unwrap());
    }

    #[test]
    fn multiplicity_change_keeps_column() {
        let (crm, store, ctx, target) = setup();
        crm.add_field("UF_CRM_3", field("string", "Tags"));
        let catalog = FieldCatalog::new(&ctx, &target);
        let evolver = SchemaEvolver::new(&ctx, &target);
        catalog.sync_field_mapping().unwrap();
        evolver.update_physical_schema().unwrap();

        crm.set_multiple("UF_CRM_3", true);
        assert_eq!(catalog.sync_field_mapping().unwrap().renamed, 1);
        let report = evolver.update_physical_schema().unwrap();
        assert_eq!(report.columns_renamed, 0);
        assert_eq!(report.columns_added, 0);

        let field = &catalog.descriptors().unwrap()[0];
        assert!(field.is_multiple);
        assert!(!field.needs_rename);
        assert!(store.column_exists("tbl_deals", "tags_uf_crm_3").unwrap());
    }

    #[test]
    fn deleted_fields_are_dropped_and_forgotten() {
        let (crm, store, ctx, target) = setup();
        crm.add_field("title", field("string", "Title"));
        crm.add_field("UF_CRM_2", field("string", "Region"));
        let catalog = FieldCatalog::new(&ctx, &target);
        let evolver = SchemaEvolver::new(&ctx, &target);
        catalog.sync_field_mapping().unwrap();
        evolver.update_physical_schema().unwrap();

        crm.remove_field("UF_CRM_2");
        catalog.sync_field_mapping().unwrap();
        let report = evolver.update_physical_schema().unwrap();
        assert_eq!(report.columns_dropped, 1);
        assert_eq!(report.fields_removed, 1);
        assert!(!store.column_exists("tbl_deals", "region_uf_crm_2").unwrap());
        assert_eq!(catalog.descriptors().unwrap().len(), 1);
    }
}
