//! CLI command implementations.

pub mod catalog;
pub mod inspect;
pub mod run;

use crate::config::{Config, TenantConfig};
use crate::curl::CurlClient;
use crate::error::{CliError, CliResult};
use crmsync_engine::{EntityTarget, TenantContext};
use crmsync_remote::{RemoteSource, WebhookSource};
use crmsync_store::SqliteStore;
use std::sync::Arc;

/// Builds the remote source of a tenant.
pub trait Connector: Sync {
    /// Connects to the tenant's remote CRM.
    fn connect(&self, tenant: &TenantConfig) -> Arc<dyn RemoteSource>;
}

/// Connects through the tenant's webhook URL using `curl`.
#[derive(Debug, Default)]
pub struct WebhookConnector {
    client: CurlClient,
}

impl WebhookConnector {
    /// Creates a connector using `client` for every tenant.
    pub fn new(client: CurlClient) -> Self {
        Self { client }
    }
}

impl Connector for WebhookConnector {
    fn connect(&self, tenant: &TenantConfig) -> Arc<dyn RemoteSource> {
        Arc::new(WebhookSource::new(tenant.webhook_url.clone(), self.client.clone()))
    }
}

/// Opens (creating if needed) the store of a tenant.
pub fn open_store(config: &Config, tenant: &str) -> CliResult<SqliteStore> {
    std::fs::create_dir_all(&config.storage.directory)?;
    Ok(SqliteStore::open(config.store_path(tenant))?)
}

/// Builds the context of one tenant.
pub fn tenant_context(
    config: &Config,
    key: &str,
    tenant: &TenantConfig,
    connector: &dyn Connector,
) -> CliResult<TenantContext> {
    let store = open_store(config, key)?;
    Ok(TenantContext::new(key, connector.connect(tenant), Arc::new(store))
        .with_plan(tenant.plan_tier())
        .with_config(config.sync_config()))
}

/// Entities of a tenant, optionally restricted to one key.
pub fn select_targets(config: &Config, tenant: &TenantConfig, entity: Option<&str>) -> Vec<EntityTarget> {
    let mut targets = config.targets(tenant);
    if let Some(entity) = entity {
        targets.retain(|target| target.key == entity);
    }
    targets
}

/// Fails when an entity filter matched nothing in any tenant.
fn check_entity_filter(entity: Option<&str>, matched: usize) -> CliResult<()> {
    match entity {
        Some(entity) if matched == 0 => Err(CliError::UnknownEntity(entity.to_string())),
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crmsync_testkit::FakeCrm;
    use serde_json::json;
    use std::path::Path;

    /// Hands the same fake remote to every tenant.
    pub struct FakeConnector(pub Arc<FakeCrm>);

    impl Connector for FakeConnector {
        fn connect(&self, _tenant: &TenantConfig) -> Arc<dyn RemoteSource> {
            self.0.clone()
        }
    }

    /// Two tenants replicating deals into `dir`.
    pub fn config(dir: &Path) -> Config {
        let document = json!({
            "storage": { "directory": dir, "db_prefix": "crm_" },
            "global_entities": {
                "deals": { "type": "crm", "id": 2, "table_base_name": "deals" }
            },
            "tenants": {
                "acme": { "plan": "enterprise", "webhook_url": "https://acme.example.com/rest/1/a/" },
                "globex": { "webhook_url": "https://globex.example.com/rest/1/g/" }
            }
        });
        Config::parse(&document.to_string()).unwrap()
    }
}
