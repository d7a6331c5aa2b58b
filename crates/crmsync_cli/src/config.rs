//! Tenant configuration file.
//!
//! ```json
//! {
//!   "storage": { "directory": "/var/lib/crmsync", "db_prefix": "crm_" },
//!   "sync": { "incremental_window_hours": 10, "utc_offset_hours": -3 },
//!   "http": { "curl": "/usr/bin/curl", "timeout_secs": 120 },
//!   "global_entities": {
//!     "companies": { "type": "company", "table_base_name": "companies" }
//!   },
//!   "tenants": {
//!     "acme": {
//!       "plan": "enterprise",
//!       "webhook_url": "https://acme.example.com/rest/1/abc/",
//!       "entities": { "deals": { "type": "crm", "id": 2, "table_base_name": "deals" } }
//!     }
//!   }
//! }
//! ```

use crate::curl::CurlClient;
use crmsync_engine::{sanitize, EntityTarget, PlanTier, SyncConfig};
use crmsync_remote::EntityKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading or querying the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Configuration path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid configuration.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// No tenant with this key.
    #[error("unknown tenant '{0}'")]
    UnknownTenant(String),
}

/// The whole configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Where tenant stores live.
    pub storage: StorageConfig,
    /// Engine overrides.
    #[serde(default)]
    pub sync: SyncSettings,
    /// Transport overrides.
    #[serde(default)]
    pub http: HttpSettings,
    /// Entities replicated for every tenant.
    #[serde(default)]
    pub global_entities: BTreeMap<String, EntityConfig>,
    /// Tenants by key.
    pub tenants: BTreeMap<String, TenantConfig>,
}

/// Store placement.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one database file per tenant.
    pub directory: PathBuf,
    /// Database file name prefix.
    #[serde(default = "default_db_prefix")]
    pub db_prefix: String,
}

fn default_db_prefix() -> String {
    "crm_".to_string()
}

/// Optional engine overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncSettings {
    /// Incremental window for auto runs.
    pub incremental_window_hours: Option<u32>,
    /// Offset used to render window bounds.
    pub utc_offset_hours: Option<i32>,
}

/// Optional transport overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpSettings {
    /// The `curl` executable.
    pub curl: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: Option<u64>,
}

/// One tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    /// `enterprise` or anything else.
    #[serde(default)]
    pub plan: String,
    /// Inbound webhook base URL.
    pub webhook_url: String,
    /// Tenant-specific entities; these override global ones with the same key.
    #[serde(default)]
    pub entities: BTreeMap<String, EntityConfig>,
}

impl TenantConfig {
    /// The tenant's plan tier.
    pub fn plan_tier(&self) -> PlanTier {
        self.plan.parse().unwrap_or_default()
    }
}

/// One replicated entity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityConfig {
    /// Remote entity kind.
    #[serde(flatten)]
    pub kind: EntityKind,
    /// Base of the catalog and data table names.
    pub table_base_name: String,
}

impl Config {
    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses a configuration document.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Engine configuration with the file's overrides applied.
    pub fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::new();
        if let Some(hours) = self.sync.incremental_window_hours {
            config = config.with_incremental_window(hours);
        }
        if let Some(offset) = self.sync.utc_offset_hours {
            config = config.with_utc_offset(offset);
        }
        config
    }

    /// HTTP client with the file's overrides applied.
    pub fn curl_client(&self) -> CurlClient {
        let mut client = CurlClient::new();
        if let Some(program) = &self.http.curl {
            client = client.with_program(program.clone());
        }
        if let Some(secs) = self.http.timeout_secs {
            client = client.with_timeout(Duration::from_secs(secs));
        }
        client
    }

    /// Tenants to process: all of them, or the one named.
    pub fn select_tenants(&self, key: Option<&str>) -> Result<Vec<(&str, &TenantConfig)>, ConfigError> {
        match key {
            None => Ok(self.tenants.iter().map(|(k, t)| (k.as_str(), t)).collect()),
            Some(key) => self
                .tenants
                .get_key_value(key)
                .map(|(k, t)| vec![(k.as_str(), t)])
                .ok_or_else(|| ConfigError::UnknownTenant(key.to_string())),
        }
    }

    /// Entities of a tenant, global ones first overridden by the tenant's own.
    pub fn targets(&self, tenant: &TenantConfig) -> Vec<EntityTarget> {
        let mut merged = self.global_entities.clone();
        merged.extend(tenant.entities.clone());
        merged
            .into_iter()
            .map(|(key, entity)| EntityTarget::new(key, entity.kind, entity.table_base_name))
            .collect()
    }

    /// Database file of a tenant.
    pub fn store_path(&self, tenant: &str) -> PathBuf {
        self.storage
            .directory
            .join(format!("{}{}.db", self.storage.db_prefix, sanitize(tenant)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "storage": { "directory": "/data" },
        "sync": { "incremental_window_hours": 4 },
        "global_entities": {
            "companies": { "type": "company", "table_base_name": "companies" },
            "deals": { "type": "crm", "id": 2, "table_base_name": "deals" }
        },
        "tenants": {
            "Acme Ltda.": {
                "plan": "Enterprise",
                "webhook_url": "https://acme.example.com/rest/1/abc/",
                "entities": {
                    "deals": { "type": "crm", "id": 2, "table_base_name": "acme_deals" },
                    "projects": { "type": "spa", "id": 1054, "table_base_name": "projects" }
                }
            },
            "globex": { "webhook_url": "https://globex.example.com/rest/7/xyz" }
        }
    }"#;

    #[test]
    fn parses_entities_and_plans() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.storage.db_prefix, "crm_");
        assert_eq!(config.tenants.len(), 2);

        let acme = &config.tenants["Acme Ltda."];
        assert_eq!(acme.plan_tier(), PlanTier::Enterprise);
        assert_eq!(acme.entities["projects"].kind, EntityKind::Spa { id: 1054 });
        assert_eq!(config.tenants["globex"].plan_tier(), PlanTier::Standard);
    }

    #[test]
    fn tenant_entities_override_globals() {
        let config = Config::parse(SAMPLE).unwrap();

        let acme = config.targets(&config.tenants["Acme Ltda."]);
        let keys: Vec<&str> = acme.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["companies", "deals", "projects"]);
        assert_eq!(acme[1].table_base_name, "acme_deals");

        let globex = config.targets(&config.tenants["globex"]);
        assert_eq!(globex.len(), 2);
        assert_eq!(globex[1].table_base_name, "deals");
    }

    #[test]
    fn overrides_and_paths() {
        let config = Config::parse(SAMPLE).unwrap();
        let sync = config.sync_config();
        assert_eq!(sync.incremental_window_hours, 4);
        assert_eq!(sync.utc_offset_hours, -3);

        assert_eq!(
            config.store_path("Acme Ltda."),
            PathBuf::from("/data/crm_acme_ltda.db")
        );
    }

    #[test]
    fn tenant_selection() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.select_tenants(None).unwrap().len(), 2);
        assert_eq!(config.select_tenants(Some("globex")).unwrap()[0].0, "globex");
        assert!(matches!(
            config.select_tenants(Some("initech")),
            Err(ConfigError::UnknownTenant(_))
        ));
    }

    #[test]
    fn rejects_unknown_entity_type() {
        let text = r#"{
            "storage": { "directory": "/data" },
            "tenants": { "a": { "webhook_url": "u", "entities": { "x": { "type": "lead", "table_base_name": "x" } } } }
        }"#;
        assert!(matches!(Config::parse(text), Err(ConfigError::Parse(_))));
    }
}
