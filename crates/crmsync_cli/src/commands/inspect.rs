//! Inspect command implementation.

use super::{check_entity_filter, open_store, select_targets};
use crate::config::Config;
use crate::error::CliResult;
use crmsync_store::{FieldDescriptor, Store};
use serde::Serialize;

/// Local state of one entity.
#[derive(Debug, Serialize)]
pub struct EntityInspection {
    /// Tenant key.
    pub tenant: String,
    /// Entity key.
    pub entity: String,
    /// Remote entity kind.
    pub kind: String,
    /// Catalog table name.
    pub catalog_table: String,
    /// Data table name.
    pub data_table: String,
    /// Replicated rows, if the data table exists.
    pub rows: Option<u64>,
    /// Catalog rows.
    pub fields: Vec<FieldDescriptor>,
}

/// Prints the catalog and row counts of the selected entities.
///
/// Only local stores are read; tenants never synced are reported empty.
pub fn run(config: &Config, tenant: Option<&str>, entity: Option<&str>, format: &str) -> CliResult<()> {
    let entities = collect(config, tenant, entity)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entities)?),
        _ => print_text_output(&entities),
    }
    Ok(())
}

/// Reads the local state of the selected entities.
pub fn collect(config: &Config, tenant: Option<&str>, entity: Option<&str>) -> CliResult<Vec<EntityInspection>> {
    let mut entities = Vec::new();
    for (key, tenant_config) in config.select_tenants(tenant)? {
        let targets = select_targets(config, tenant_config, entity);
        let store = if config.store_path(key).exists() {
            Some(open_store(config, key)?)
        } else {
            None
        };

        for target in targets {
            let catalog_table = target.catalog_table();
            let data_table = target.data_table();
            let (rows, fields) = match &store {
                Some(store) => {
                    let rows = if store.table_exists(&data_table)? {
                        Some(store.count_rows(&data_table)?)
                    } else {
                        None
                    };
                    let fields = if store.table_exists(&catalog_table)? {
                        store.load_catalog(&catalog_table)?
                    } else {
                        Vec::new()
                    };
                    (rows, fields)
                }
                None => (None, Vec::new()),
            };

            entities.push(EntityInspection {
                tenant: key.to_string(),
                entity: target.key.clone(),
                kind: target.kind.to_string(),
                catalog_table,
                data_table,
                rows,
                fields,
            });
        }
    }
    check_entity_filter(entity, entities.len())?;
    Ok(entities)
}

fn print_text_output(entities: &[EntityInspection]) {
    for e in entities {
        println!("{} / {} ({})", e.tenant.to_uppercase(), e.entity, e.kind);
        let rows = e.rows.map_or_else(|| "-".to_string(), |n| n.to_string());
        println!("  tables: {} / {}  rows: {}", e.catalog_table, e.data_table, rows);
        for field in &e.fields {
            let mut line = format!(
                "  [{}] {} -> {} ({}{})",
                field.id,
                field.remote_field_id,
                field.physical_column,
                field.field_type,
                if field.is_multiple { ", multiple" } else { "" }
            );
            if let Some(pending) = &field.pending_friendly_name {
                line.push_str(&format!(" pending rename to \"{pending}\""));
            }
            if field.is_deleted {
                line.push_str(" deleted");
            }
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::run::execute;
    use crate::commands::test_support::{config, FakeConnector};
    use crmsync_engine::{MemoryRunLog, SyncMode};
    use crmsync_remote::EntityKind;
    use crmsync_testkit::{field, FakeCrm};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn never_synced_tenant_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let entities = collect(&config, Some("globex"), None).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].rows, None);
        assert!(entities[0].fields.is_empty());
        // Inspection never creates stores.
        assert!(!dir.path().join("crm_globex.db").exists());
    }

    #[test]
    fn reports_catalog_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let crm = Arc::new(FakeCrm::new(EntityKind::Crm { id: 2 }));
        crm.add_field("title", field("string", "Title"));
        crm.put_records(1, 7, |id| json!({ "title": format!("Deal {id}") }));
        execute(
            &config,
            Some("acme"),
            None,
            SyncMode::Full,
            false,
            &FakeConnector(crm),
            Arc::new(MemoryRunLog::new()),
        )
        .unwrap();

        let entities = collect(&config, Some("acme"), Some("deals")).unwrap();
        assert_eq!(entities[0].kind, "crm:2");
        assert_eq!(entities[0].rows, Some(7));
        assert_eq!(entities[0].fields.len(), 1);
        assert_eq!(entities[0].fields[0].physical_column, "title_title");

        let encoded = serde_json::to_value(&entities).unwrap();
        assert_eq!(encoded[0]["data_table"], "tbl_deals");
    }
}
