//! Per-tenant context and entity targets.

use crate::config::{PlanTier, SyncConfig};
use crate::naming::{CATALOG_TABLE_PREFIX, DATA_TABLE_PREFIX};
use crate::run_log::{MemoryRunLog, RunLog, RunOutcome};
use crate::sync::{SyncMode, SyncOrchestrator};
use crmsync_remote::{EntityKind, RemoteSource};
use crmsync_store::Store;
use std::fmt;
use std::sync::Arc;

/// One entity configured for a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTarget {
    /// Configuration key of the entity.
    pub key: String,
    /// Remote kind.
    pub kind: EntityKind,
    /// Base name of the catalog and physical tables.
    pub table_base_name: String,
}

impl EntityTarget {
    /// Creates a new entity target.
    pub fn new(key: impl Into<String>, kind: EntityKind, table_base_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind,
            table_base_name: table_base_name.into(),
        }
    }

    /// The field catalog table of this entity.
    pub fn catalog_table(&self) -> String {
        format!("{CATALOG_TABLE_PREFIX}{}", self.table_base_name)
    }

    /// The physical data table of this entity.
    pub fn data_table(&self) -> String {
        format!("{DATA_TABLE_PREFIX}{}", self.table_base_name)
    }
}

impl fmt::Display for EntityTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key, self.kind)
    }
}

/// Outcome of one entity within a tenant run.
#[derive(Debug, Clone)]
pub struct EntityReport {
    /// Configuration key of the entity.
    pub key: String,
    /// What happened.
    pub outcome: RunOutcome,
}

/// Everything a sync run needs for one tenant.
///
/// Passed explicitly to every component; there is no process-wide registry.
pub struct TenantContext {
    tenant: String,
    plan: PlanTier,
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn Store>,
    run_log: Arc<dyn RunLog>,
    config: SyncConfig,
}

impl TenantContext {
    /// Creates a context with default configuration and an in-memory run log.
    pub fn new(
        tenant: impl Into<String>,
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            plan: PlanTier::default(),
            remote,
            store,
            run_log: Arc::new(MemoryRunLog::new()),
            config: SyncConfig::default(),
        }
    }

    /// Sets the plan tier.
    pub fn with_plan(mut self, plan: PlanTier) -> Self {
        self.plan = plan;
        self
    }

    /// Sets the run log.
    pub fn with_run_log(mut self, run_log: Arc<dyn RunLog>) -> Self {
        self.run_log = run_log;
        self
    }

    /// Sets the engine configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Tenant key.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Plan tier.
    pub fn plan(&self) -> PlanTier {
        self.plan
    }

    /// The remote source.
    pub fn remote(&self) -> &dyn RemoteSource {
        self.remote.as_ref()
    }

    /// The tenant's store.
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// The run log.
    pub fn run_log(&self) -> &dyn RunLog {
        self.run_log.as_ref()
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Creates an orchestrator for one entity.
    pub fn orchestrator<'a>(&'a self, target: &'a EntityTarget) -> SyncOrchestrator<'a> {
        SyncOrchestrator::new(self, target)
    }

    /// Runs every entity in order.
    ///
    /// Entities never share tables, but they run one after the other; a
    /// failed entity is reported and the next one still runs.
    pub fn run_entities(&self, targets: &[EntityTarget], mode: SyncMode) -> Vec<EntityReport> {
        targets
            .iter()
            .map(|target| {
                tracing::info!(tenant = %self.tenant, entity = %target, ?mode, "starting entity run");
                EntityReport {
                    key: target.key.clone(),
                    outcome: self.orchestrator(target).run(mode),
                }
            })
            .collect()
    }
}

impl fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantContext")
            .field("tenant", &self.tenant)
            .field("plan", &self.plan)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
