//! Platform configuration and credentials.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::step::Step;
use crate::{PlatformId, TenantId};

/// How authentication against the platform is performed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMode {
    /// Login steps are executed by the interpreter and verified afterwards.
    Automatic,
    /// A human completes login out of band; the engine only opens the portal.
    Manual,
}

/// Stored automation program for one platform integration.
///
/// Immutable during a run; edited only by an external admin workflow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub platform_id: PlatformId,
    #[serde(default)]
    pub login_steps: Vec<Step>,
    #[serde(default)]
    pub extraction_steps: Vec<Step>,
    pub login_mode: LoginMode,
    pub base_url: String,
    #[serde(default)]
    pub login_url: Option<String>,
    /// Platforms with an official client-credentials API bypass the browser.
    #[serde(default)]
    pub direct_api: Option<DirectApiConfig>,
}

/// OAuth2 client-credentials endpoint description for direct-API platforms.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectApiConfig {
    pub token_url: String,
    pub api_base_url: String,
    #[serde(default)]
    pub scope: Option<String>,
}

impl PlatformConfig {
    /// Login steps sorted by `order`, ready for sequential execution.
    pub fn ordered_login_steps(&self) -> Vec<Step> {
        Self::ordered(&self.login_steps)
    }

    /// Extraction steps sorted by `order`, ready for sequential execution.
    pub fn ordered_extraction_steps(&self) -> Vec<Step> {
        Self::ordered(&self.extraction_steps)
    }

    fn ordered(steps: &[Step]) -> Vec<Step> {
        let mut sorted = steps.to_vec();
        sorted.sort_by_key(|step| step.order);
        sorted
    }

    pub fn portal_url(&self) -> &str {
        self.login_url.as_deref().unwrap_or(&self.base_url)
    }
}

/// Decrypted platform credentials for one tenant.
///
/// Opaque to the interpreter except for named-field lookup. The `Debug`
/// rendering never exposes field values, so records and logs stay clean of
/// secrets.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub platform_id: PlatformId,
    pub tenant_id: TenantId,
    fields: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(platform_id: PlatformId, tenant_id: TenantId) -> Self {
        Self {
            platform_id,
            tenant_id,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("platform_id", &self.platform_id)
            .field("tenant_id", &self.tenant_id)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepKind;

    #[test]
    fn steps_are_sorted_by_order() {
        let config = PlatformConfig {
            platform_id: PlatformId::new("bolt"),
            login_steps: vec![
                Step::new(2, StepKind::Click),
                Step::new(1, StepKind::Goto),
            ],
            extraction_steps: Vec::new(),
            login_mode: LoginMode::Automatic,
            base_url: "https://partners.example.com".into(),
            login_url: None,
            direct_api: None,
        };
        let ordered = config.ordered_login_steps();
        assert_eq!(ordered[0].kind, StepKind::Goto);
        assert_eq!(ordered[1].kind, StepKind::Click);
    }

    #[test]
    fn credentials_debug_redacts_values() {
        let creds = Credentials::new(PlatformId::new("bolt"), TenantId::new("fleet-1"))
            .with_field("email", "driver@example.com")
            .with_field("password", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("password"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("driver@example.com"));
    }
}
