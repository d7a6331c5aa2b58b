//! Catalog command implementation.

use super::{check_entity_filter, select_targets, tenant_context, Connector};
use crate::config::Config;
use crate::error::CliResult;
use crmsync_engine::{CatalogStats, SchemaReport};
use serde::Serialize;

/// What one catalog refresh changed.
#[derive(Debug, Serialize)]
pub struct CatalogSummary {
    /// Tenant key.
    pub tenant: String,
    /// Entity key.
    pub entity: String,
    /// Catalog changes.
    pub fields: CatalogStats,
    /// Physical schema changes.
    pub schema: SchemaReport,
}

/// Refreshes catalogs and schemas without moving data, then prints the counts.
pub fn run(
    config: &Config,
    tenant: Option<&str>,
    entity: Option<&str>,
    connector: &dyn Connector,
    format: &str,
) -> CliResult<()> {
    let summaries = collect(config, tenant, entity, connector)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summaries)?),
        _ => print_text_output(&summaries),
    }
    Ok(())
}

/// Runs catalog sync and schema evolution for the selected entities.
pub fn collect(
    config: &Config,
    tenant: Option<&str>,
    entity: Option<&str>,
    connector: &dyn Connector,
) -> CliResult<Vec<CatalogSummary>> {
    let mut summaries = Vec::new();
    for (key, tenant_config) in config.select_tenants(tenant)? {
        let targets = select_targets(config, tenant_config, entity);
        if targets.is_empty() {
            continue;
        }
        let ctx = tenant_context(config, key, tenant_config, connector)?;
        for target in &targets {
            let orchestrator = ctx.orchestrator(target);
            let fields = orchestrator.catalog().sync_field_mapping()?;
            let schema = orchestrator.evolver().update_physical_schema()?;
            summaries.push(CatalogSummary {
                tenant: key.to_string(),
                entity: target.key.clone(),
                fields,
                schema,
            });
        }
    }
    check_entity_filter(entity, summaries.len())?;
    Ok(summaries)
}

fn print_text_output(summaries: &[CatalogSummary]) {
    for s in summaries {
        println!(
            "{} / {}: fields new={} renamed={} deleted={} unchanged={}; columns added={} renamed={} dropped={}",
            s.tenant.to_uppercase(),
            s.entity,
            s.fields.new,
            s.fields.renamed,
            s.fields.deleted,
            s.fields.unchanged,
            s.schema.columns_added,
            s.schema.columns_renamed,
            s.schema.columns_dropped,
        );
    }
}
