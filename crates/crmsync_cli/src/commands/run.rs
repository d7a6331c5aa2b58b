//! Run command implementation.

use super::{check_entity_filter, select_targets, tenant_context, Connector};
use crate::config::{Config, TenantConfig};
use crate::error::{CliError, CliResult};
use crmsync_engine::{EntityReport, RunLog, SyncMode};
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of one tenant.
#[derive(Debug)]
pub struct TenantRun {
    /// Tenant key.
    pub tenant: String,
    /// One report per entity, in configuration order.
    pub reports: Vec<EntityReport>,
    /// Set when the tenant could not be set up at all.
    pub error: Option<String>,
}

impl TenantRun {
    /// Number of failed entity runs, counting a setup failure as one.
    pub fn failures(&self) -> usize {
        let failed = self.reports.iter().filter(|r| !r.outcome.is_ok()).count();
        failed + usize::from(self.error.is_some())
    }
}

/// Runs the selected tenants and entities, then prints a summary.
pub fn run(
    config: &Config,
    tenant: Option<&str>,
    entity: Option<&str>,
    mode: SyncMode,
    parallel: bool,
    connector: &dyn Connector,
    run_log: Arc<dyn RunLog>,
) -> CliResult<()> {
    let runs = execute(config, tenant, entity, mode, parallel, connector, run_log)?;
    print_summary(&runs);

    let failures: usize = runs.iter().map(TenantRun::failures).sum();
    if failures > 0 {
        return Err(CliError::RunsFailed(failures));
    }
    Ok(())
}

/// Runs the selected tenants and entities.
///
/// Entities of one tenant always run one after the other; with `parallel`
/// each tenant gets its own thread.
pub fn execute(
    config: &Config,
    tenant: Option<&str>,
    entity: Option<&str>,
    mode: SyncMode,
    parallel: bool,
    connector: &dyn Connector,
    run_log: Arc<dyn RunLog>,
) -> CliResult<Vec<TenantRun>> {
    let tenants = config.select_tenants(tenant)?;
    let matched: usize = tenants
        .iter()
        .map(|(_, t)| select_targets(config, t, entity).len())
        .sum();
    check_entity_filter(entity, matched)?;

    let runs = if parallel && tenants.len() > 1 {
        std::thread::scope(|scope| {
            let handles: Vec<_> = tenants
                .iter()
                .map(|&(key, t)| {
                    let run_log = run_log.clone();
                    let handle =
                        scope.spawn(move || run_tenant(config, key, t, entity, mode, connector, run_log));
                    (key, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(key, handle)| {
                    handle
                        .join()
                        .map_err(|_| CliError::WorkerPanicked(key.to_string()))
                })
                .collect::<CliResult<Vec<_>>>()
        })?
    } else {
        tenants
            .iter()
            .map(|&(key, t)| run_tenant(config, key, t, entity, mode, connector, run_log.clone()))
            .collect()
    };
    Ok(runs)
}

fn run_tenant(
    config: &Config,
    key: &str,
    tenant: &TenantConfig,
    entity: Option<&str>,
    mode: SyncMode,
    connector: &dyn Connector,
    run_log: Arc<dyn RunLog>,
) -> TenantRun {
    let targets = select_targets(config, tenant, entity);
    info!(tenant = key, entities = targets.len(), ?mode, "starting tenant");

    match tenant_context(config, key, tenant, connector) {
        Ok(ctx) => TenantRun {
            tenant: key.to_string(),
            reports: ctx.with_run_log(run_log).run_entities(&targets, mode),
            error: None,
        },
        Err(e) => {
            error!(tenant = key, error = %e, "tenant setup failed");
            TenantRun {
                tenant: key.to_string(),
                reports: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}

fn print_summary(runs: &[TenantRun]) {
    for run in runs {
        println!("{}", run.tenant.to_uppercase());
        if let Some(error) = &run.error {
            println!("  setup failed: {error}");
        }
        for report in &run.reports {
            let outcome = &report.outcome;
            println!(
                "  {:<20} {:<6} {:>8}  {}",
                report.key,
                outcome.status,
                outcome.count,
                outcome.detail.as_deref().unwrap_or("")
            );
        }
    }
}
