//! Collaborator storage seams.
//!
//! The engine reads platform programs and credentials through narrow traits
//! and appends execution rows and normalized records the same way. The
//! in-memory implementations back the CLI and the tests; a deployment wires
//! real stores behind the same traits.

use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;

use fleetsync_core_types::{
    Credentials, ExecutionId, ExecutionRecord, NormalizedFinancialRecord, PlatformConfig,
    PlatformId, TenantId,
};

/// Supplies decrypted platform credentials per (tenant, platform).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credentials(
        &self,
        tenant_id: &TenantId,
        platform_id: &PlatformId,
    ) -> Option<Credentials>;
}

/// Read access to stored automation programs.
#[async_trait]
pub trait PlatformConfigStore: Send + Sync {
    async fn get_config(&self, platform_id: &PlatformId) -> Option<PlatformConfig>;
}

/// Write target for execution rows and normalized financial records.
///
/// Executions are append-only from the outside; the orchestrator is the only
/// writer and saves the same row again as its status advances.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn save_execution(&self, record: ExecutionRecord);
    async fn get_execution(&self, id: ExecutionId) -> Option<ExecutionRecord>;
    async fn insert_financial_records(&self, records: Vec<NormalizedFinancialRecord>);
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    inner: DashMap<(TenantId, PlatformId), Credentials>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, credentials: Credentials) {
        self.inner.insert(
            (
                credentials.tenant_id.clone(),
                credentials.platform_id.clone(),
            ),
            credentials,
        );
    }

    /// Load a YAML list of credentials, e.g. for local development.
    pub fn load_yaml(&self, path: &Path) -> anyhow::Result<usize> {
        let raw = std::fs::read_to_string(path)?;
        let bundle: CredentialsBundle = serde_yaml::from_str(&raw)?;
        let count = bundle.credentials.len();
        for credentials in bundle.credentials {
            self.insert(credentials);
        }
        Ok(count)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_credentials(
        &self,
        tenant_id: &TenantId,
        platform_id: &PlatformId,
    ) -> Option<Credentials> {
        self.inner
            .get(&(tenant_id.clone(), platform_id.clone()))
            .map(|entry| entry.value().clone())
    }
}

#[derive(Debug, Deserialize)]
struct CredentialsBundle {
    credentials: Vec<Credentials>,
}

#[derive(Default)]
pub struct InMemoryPlatformConfigStore {
    inner: DashMap<PlatformId, PlatformConfig>,
}

impl InMemoryPlatformConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, config: PlatformConfig) {
        self.inner.insert(config.platform_id.clone(), config);
    }

    /// Load a YAML bundle of platform programs.
    pub fn load_yaml(&self, path: &Path) -> anyhow::Result<usize> {
        let raw = std::fs::read_to_string(path)?;
        let bundle: PlatformBundle = serde_yaml::from_str(&raw)?;
        let count = bundle.platforms.len();
        for config in bundle.platforms {
            self.insert(config);
        }
        Ok(count)
    }
}

#[async_trait]
impl PlatformConfigStore for InMemoryPlatformConfigStore {
    async fn get_config(&self, platform_id: &PlatformId) -> Option<PlatformConfig> {
        self.inner
            .get(platform_id)
            .map(|entry| entry.value().clone())
    }
}

#[derive(Debug, Deserialize)]
struct PlatformBundle {
    platforms: Vec<PlatformConfig>,
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    executions: DashMap<ExecutionId, ExecutionRecord>,
    records: Mutex<Vec<NormalizedFinancialRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All normalized records inserted so far, in insertion order.
    pub fn financial_records(&self) -> Vec<NormalizedFinancialRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save_execution(&self, record: ExecutionRecord) {
        self.executions.insert(record.id, record);
    }

    async fn get_execution(&self, id: ExecutionId) -> Option<ExecutionRecord> {
        self.executions.get(&id).map(|entry| entry.value().clone())
    }

    async fn insert_financial_records(&self, records: Vec<NormalizedFinancialRecord>) {
        self.records.lock().extend(records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_core_types::LoginMode;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn platform_bundle_yaml_round_trips_through_the_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("platforms.yaml");
        fs::write(
            &path,
            r##"
platforms:
  - platform_id: bolt
    login_mode: automatic
    base_url: "https://partners.bolt.example"
    login_steps:
      - order: 1
        kind: goto
        value: "https://partners.bolt.example/login"
    extraction_steps:
      - order: 1
        kind: download
        selector: "#export, .export-btn"
"##,
        )
        .unwrap();

        let store = InMemoryPlatformConfigStore::new();
        assert_eq!(store.load_yaml(&path).unwrap(), 1);

        let config = store.get_config(&PlatformId::new("bolt")).await.unwrap();
        assert_eq!(config.login_mode, LoginMode::Automatic);
        assert_eq!(config.extraction_steps[0].selectors.len(), 2);
    }

    #[tokio::test]
    async fn credentials_yaml_loads_with_opaque_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.yaml");
        fs::write(
            &path,
            r#"
credentials:
  - platform_id: bolt
    tenant_id: fleet-1
    fields:
      email: driver@example.com
      password: hunter2
"#,
        )
        .unwrap();

        let store = InMemoryCredentialStore::new();
        assert_eq!(store.load_yaml(&path).unwrap(), 1);

        let creds = store
            .get_credentials(&TenantId::new("fleet-1"), &PlatformId::new("bolt"))
            .await
            .unwrap();
        assert_eq!(creds.field("email"), Some("driver@example.com"));
        assert!(creds.field("api_key").is_none());
    }

    #[tokio::test]
    async fn record_store_keeps_executions_by_id() {
        use chrono::NaiveDate;
        use fleetsync_core_types::Period;

        let store = InMemoryRecordStore::new();
        let record = ExecutionRecord::new(
            TenantId::new("fleet-1"),
            PlatformId::new("bolt"),
            Period::new(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            ),
        );
        let id = record.id;
        store.save_execution(record).await;

        assert!(store.get_execution(id).await.is_some());
        assert!(store.get_execution(ExecutionId::new()).await.is_none());
    }
}
