//! The field catalog.
//!
//! The catalog is the persistent identity map between remote field
//! identifiers and physical columns. It is the only place a physical column
//! name is decided, and it only decides it once per field: later label
//! changes are recorded as pending renames for the [`SchemaEvolver`] to apply.
//!
//! [`SchemaEvolver`]: crate::SchemaEvolver

use crate::context::{EntityTarget, TenantContext};
use crate::error::SyncResult;
use crate::naming::physical_column;
use crmsync_store::{FieldDescriptor, FieldType};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Remote types that are never replicated.
const EXCLUDED_TYPES: &[&str] = &["boolean", "bool", "file", "disk_file", "webdav", "attachment"];

/// Counts produced by one catalog sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    /// Fields seen for the first time.
    pub new: u64,
    /// Fields whose label or multiplicity changed.
    pub renamed: u64,
    /// Known fields absent from the listing.
    pub deleted: u64,
    /// Fields seen again without change.
    pub unchanged: u64,
}

/// Normalizes a remote type name. `None` means the field is not replicated.
pub fn normalize_type(remote_type: &str) -> Option<FieldType> {
    let remote_type = remote_type.trim().to_lowercase();
    if EXCLUDED_TYPES.contains(&remote_type.as_str()) {
        return None;
    }
    let field_type = match remote_type.as_str() {
        "double" | "money" | "number" | "numeric" => FieldType::Double,
        "integer" | "int" => FieldType::Integer,
        "date" => FieldType::Date,
        "datetime" => FieldType::DateTime,
        _ => FieldType::Text,
    };
    Some(field_type)
}

/// A field as reported by the remote listing, after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedField {
    /// Remote identifier.
    pub remote_field_id: String,
    /// Best available human label.
    pub friendly_name: String,
    /// Normalized type.
    pub field_type: FieldType,
    /// Whether the field holds a list.
    pub is_multiple: bool,
}

impl ObservedField {
    /// Normalizes one listing entry. Returns `None` for excluded types.
    pub fn from_listing(remote_field_id: &str, meta: &Value) -> Option<Self> {
        let remote_type = meta["type"].as_str().unwrap_or("string");
        let field_type = normalize_type(remote_type)?;

        let friendly_name = ["title", "TITLE", "formLabel", "listLabel"]
            .iter()
            .filter_map(|key| meta[*key].as_str())
            .map(str::trim)
            .find(|label| !label.is_empty())
            .unwrap_or(remote_field_id)
            .to_string();

        let flag = ["isMultiple", "multiple", "MULTIPLE"]
            .iter()
            .map(|key| &meta[*key])
            .find(|value| !value.is_null());
        let is_multiple = matches!(flag, Some(Value::Bool(true)))
            || matches!(flag, Some(Value::String(s)) if s == "Y")
            || remote_type.eq_ignore_ascii_case("array");

        Some(Self {
            remote_field_id: remote_field_id.to_string(),
            friendly_name,
            field_type,
            is_multiple,
        })
    }
}

/// Tracks the identity of each remote field of one entity.
pub struct FieldCatalog<'a> {
    ctx: &'a TenantContext,
    target: &'a EntityTarget,
}

impl<'a> FieldCatalog<'a> {
    /// Creates a catalog handle for one entity.
    pub fn new(ctx: &'a TenantContext, target: &'a EntityTarget) -> Self {
        Self { ctx, target }
    }

    /// Reconciles the persisted catalog with the remote field listing.
    ///
    /// New fields get a physical column right away. Label or multiplicity
    /// changes become pending renames. Known fields missing from the listing
    /// are soft-deleted, unless the listing was empty altogether.
    pub fn sync_field_mapping(&self) -> SyncResult<CatalogStats> {
        let store = self.ctx.store();
        let catalog = self.target.catalog_table();
        store.ensure_catalog(&catalog)?;

        let listing = self.ctx.remote().list_fields(&self.target.kind)?;

        let known: HashMap<String, FieldDescriptor> = store
            .load_catalog(&catalog)?
            .into_iter()
            .map(|field| (field.remote_field_id.clone(), field))
            .collect();
        store.clear_deleted_marks(&catalog)?;

        let mut stats = CatalogStats::default();
        let mut seen = HashSet::new();

        for (remote_field_id, meta) in &listing {
            let Some(observed) = ObservedField::from_listing(remote_field_id, meta) else {
                continue;
            };
            seen.insert(remote_field_id.as_str());

            let Some(existing) = known.get(remote_field_id) else {
                let field = FieldDescriptor::new(
                    &observed.remote_field_id,
                    &observed.friendly_name,
                    observed.field_type,
                    self.target.data_table(),
                    physical_column(&observed.friendly_name, &observed.remote_field_id),
                    observed.is_multiple,
                );
                store.insert_descriptor(&catalog, &field)?;
                debug!(field = %remote_field_id, column = %field.physical_column, "new field");
                stats.new += 1;
                continue;
            };

            if existing.is_deleted {
                debug!(field = %remote_field_id, "field reappeared");
            }

            if existing.friendly_name != observed.friendly_name
                || existing.is_multiple != observed.is_multiple
            {
                let mut updated = existing.clone();
                updated.pending_friendly_name = Some(observed.friendly_name.clone());
                updated.is_multiple = observed.is_multiple;
                updated.needs_rename = true;
                updated.is_deleted = false;
                store.update_descriptor(&catalog, &updated)?;
                debug!(
                    field = %remote_field_id,
                    from = %existing.friendly_name,
                    to = %observed.friendly_name,
                    "field changed"
                );
                stats.renamed += 1;
            } else {
                stats.unchanged += 1;
            }
        }

        if !seen.is_empty() {
            for field in known.values() {
                if seen.contains(field.remote_field_id.as_str()) {
                    continue;
                }
                let mut deleted = field.clone();
                deleted.is_deleted = true;
                store.update_descriptor(&catalog, &deleted)?;
                stats.deleted += 1;
            }
        }

        info!(
            tenant = %self.ctx.tenant(),
            entity = %self.target.table_base_name,
            new = stats.new,
            renamed = stats.renamed,
            deleted = stats.deleted,
            unchanged = stats.unchanged,
            "field catalog synced"
        );
        Ok(stats)
    }

    /// Every catalog row, ordered by row id.
    pub fn descriptors(&self) -> SyncResult<Vec<FieldDescriptor>> {
        let store = self.ctx.store();
        let catalog = self.target.catalog_table();
        store.ensure_catalog(&catalog)?;
        Ok(store.load_catalog(&catalog)?)
    }

    /// Catalog rows that are not soft-deleted.
    pub fn active_fields(&self) -> SyncResult<Vec<FieldDescriptor>> {
        Ok(self
            .descriptors()?
            .into_iter()
            .filter(|field| !field.is_deleted)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_testkit::{cataloged_type_strategy, field, multiple_field, FakeCrm, TestStore, EXCLUDED_TYPES as KIT_EXCLUDED};
    use crmsync_remote::EntityKind;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<FakeCrm>, TestStore, TenantContext, EntityTarget) {
        let crm = Arc::new(FakeCrm::new(EntityKind::Spa { id: 1054 }));
        let store = TestStore::memory();
        let ctx = TenantContext::new("acme", crm.clone(), store.store.clone());
        let target = EntityTarget::new("deals", EntityKind::Spa { id: 1054 }, "deals");
        (crm, store, ctx, target)
    }

    #[test]
    fn type_normalization() {
        assert_eq!(normalize_type("money"), Some(FieldType::Double));
        assert_eq!(normalize_type("Number"), Some(FieldType::Double));
        assert_eq!(normalize_type("integer"), Some(FieldType::Integer));
        assert_eq!(normalize_type("datetime"), Some(FieldType::DateTime));
        assert_eq!(normalize_type("crm_status"), Some(FieldType::Text));
        assert_eq!(normalize_type("boolean"), None);
        assert_eq!(normalize_type("disk_file"), None);
    }

    #[test]
    fn label_fallbacks() {
        let observed = ObservedField::from_listing("TITLE", &json!({ "type": "string", "TITLE": "Name" })).unwrap();
        assert_eq!(observed.friendly_name, "Name");

        let observed = ObservedField::from_listing(
            "UF_CRM_5",
            &json!({ "type": "string", "title": "", "formLabel": "Region" }),
        )
        .unwrap();
        assert_eq!(observed.friendly_name, "Region");

        let observed = ObservedField::from_listing("UF_CRM_6", &json!({ "type": "string" })).unwrap();
        assert_eq!(observed.friendly_name, "UF_CRM_6");
    }

    #[test]
    fn multiplicity_flags() {
        let check = |meta: Value| ObservedField::from_listing("F", &meta).unwrap().is_multiple;
        assert!(check(json!({ "isMultiple": true })));
        assert!(check(json!({ "multiple": "Y" })));
        assert!(check(json!({ "MULTIPLE": "Y" })));
        assert!(check(json!({ "type": "array" })));
        assert!(!check(json!({ "isMultiple": false, "multiple": "Y" })));
        assert!(!check(json!({ "MULTIPLE": "N" })));
    }

    #[test]
    fn catalog_sync_is_idempotent() {
        let (crm, _store, ctx, target) = setup();
        crm.add_field("title", field("string", "Title"));
        crm.add_field("opportunity", field("money", "Amount"));
        crm.add_field("ufCrm1Tags", multiple_field("enumeration", "Tags"));
        crm.add_field("isManual", field("boolean", "Manual"));

        let catalog = FieldCatalog::new(&ctx, &target);
        let first = catalog.sync_field_mapping().unwrap();
        assert_eq!(first, CatalogStats { new: 3, ..Default::default() });

        let second = catalog.sync_field_mapping().unwrap();
        assert_eq!(second, CatalogStats { unchanged: 3, ..Default::default() });

        let fields = catalog.descriptors().unwrap();
        let amount = fields.iter().find(|f| f.remote_field_id == "opportunity").unwrap();
        assert_eq!(amount.field_type, FieldType::Double);
        assert_eq!(amount.physical_column, "amount_opportunity");
        assert_eq!(amount.physical_table, "tbl_deals");
    }

    #[test]
    fn rename_is_pending() {
        let (crm, _store, ctx, target) = setup();
        crm.add_field("UF_CRM_1", field("string", "Status"));
        let catalog = FieldCatalog::new(&ctx, &target);
        catalog.sync_field_mapping().unwrap();

        crm.rename_field("UF_CRM_1", "Stage");
        let stats = catalog.sync_field_mapping().unwrap();
        assert_eq!(stats.renamed, 1);

        let field = &catalog.descriptors().unwrap()[0];
        assert!(field.needs_rename);
        assert_eq!(field.friendly_name, "Status");
        assert_eq!(field.pending_friendly_name.as_deref(), Some("Stage"));
        assert_eq!(field.physical_column, "status_uf_crm_1");
    }

    #[test]
    fn deletion_and_resurrection() {
        let (crm, _store, ctx, target) = setup();
        crm.add_field("title", field("string", "Title"));
        crm.add_field("UF_CRM_2", field("string", "Region"));
        let catalog = FieldCatalog::new(&ctx, &target);
        catalog.sync_field_mapping().unwrap();

        crm.remove_field("UF_CRM_2");
        let stats = catalog.sync_field_mapping().unwrap();
        assert_eq!(stats.deleted, 1);
        assert_eq!(catalog.active_fields().unwrap().len(), 1);

        crm.add_field("UF_CRM_2", field("string", "Region"));
        let stats = catalog.sync_field_mapping().unwrap();
        assert_eq!(stats, CatalogStats { unchanged: 2, ..Default::default() });
        assert_eq!(catalog.active_fields().unwrap().len(), 2);
    }

    #[test]
    fn empty_listing_deletes_nothing() {
        let (crm, _store, ctx, target) = setup();
        crm.add_field("title", field("string", "Title"));
        let catalog = FieldCatalog::new(&ctx, &target);
        catalog.sync_field_mapping().unwrap();

        crm.remove_field("title");
        let stats = catalog.sync_field_mapping().unwrap();
        assert_eq!(stats, CatalogStats::default());
        assert_eq!(catalog.active_fields().unwrap().len(), 1);
    }

    #[test]
    fn listing_failure_propagates() {
        let (crm, _store, ctx, target) = setup();
        crm.fail_next(crmsync_remote::RemoteError::api("crm.item.fields", "ACCESS_DENIED", "denied"));
        assert!(FieldCatalog::new(&ctx, &target).sync_field_mapping().is_err());
    }

    proptest! {
        #[test]
        fn excluded_types_never_cataloged(ty in prop::sample::select(KIT_EXCLUDED)) {
            prop_assert_eq!(normalize_type(ty), None);
        }

        #[test]
        fn cataloged_types_always_kept(ty in cataloged_type_strategy()) {
            prop_assert!(normalize_type(ty).is_some());
        }
    }
}
