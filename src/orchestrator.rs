//! Execution orchestrator.
//!
//! Ties the session pool, flow runners, parser and record stores together for
//! one synchronization request, and owns the execution state machine:
//! `pending -> running -> {success | partial | error}`. The record is
//! persisted on every transition so callers can poll it by id while the
//! spawned task runs.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fleetsync_api_client::DirectApiClient;
use fleetsync_browser_session::manager::{
    SessionConfig, SessionKey, SessionManager,
};
use fleetsync_core_types::{
    Credentials, ExecutionId, ExecutionRecord, ExecutionStatus, NormalizedFinancialRecord, Period,
    PlatformConfig, PlatformId, TenantId,
};
use fleetsync_report_parse::{normalize, parse_report};
use fleetsync_step_flow::{
    run_extraction, run_login, ArtifactPaths, ExtractionResult, ExtractionStatus, RunContext,
};

use crate::config::EngineConfig;
use crate::stores::{CredentialStore, PlatformConfigStore, RecordStore};

/// Configuration faults surface synchronously, before any browser work.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no platform configuration stored for {0}")]
    MissingPlatformConfig(PlatformId),
    #[error("no credentials stored for tenant {tenant_id} on platform {platform_id}")]
    MissingCredentials {
        tenant_id: TenantId,
        platform_id: PlatformId,
    },
    #[error("platform {0} declares zero extraction steps")]
    NoExtractionSteps(PlatformId),
}

enum FlowOutcome {
    LoginFailed(Option<String>),
    Extracted(ExtractionResult),
}

/// The execution engine callers start synchronizations through. Cheap to
/// clone; clones share the session pool, stores and cancellation registry.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    sessions: Arc<SessionManager>,
    credentials: Arc<dyn CredentialStore>,
    platforms: Arc<dyn PlatformConfigStore>,
    records: Arc<dyn RecordStore>,
    cancel_tokens: Arc<DashMap<ExecutionId, CancellationToken>>,
}

impl Engine {
    /// Engine backed by real chromium sessions under the configured roots.
    pub fn new(
        config: EngineConfig,
        credentials: Arc<dyn CredentialStore>,
        platforms: Arc<dyn PlatformConfigStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(SessionConfig {
            sessions_root: config.sessions_root.clone(),
            headless: config.headless,
            profile: Default::default(),
        }));
        Self::with_sessions(config, sessions, credentials, platforms, records)
    }

    /// Engine over an externally built session pool, so tests inject scripted
    /// drivers through the pool's factory.
    pub fn with_sessions(
        config: EngineConfig,
        sessions: Arc<SessionManager>,
        credentials: Arc<dyn CredentialStore>,
        platforms: Arc<dyn PlatformConfigStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            config,
            sessions,
            credentials,
            platforms,
            records,
            cancel_tokens: Arc::new(DashMap::new()),
        }
    }

    /// Validate the request, persist a `pending` record and spawn the run.
    ///
    /// One execution row per request; repeated requests for the same period
    /// create new rows. Reconciliation of duplicate periods belongs to the
    /// collaborator that reads the records.
    pub async fn start_execution(
        &self,
        tenant_id: TenantId,
        platform_id: PlatformId,
        period: Period,
    ) -> Result<ExecutionId, EngineError> {
        let config = self
            .platforms
            .get_config(&platform_id)
            .await
            .ok_or_else(|| EngineError::MissingPlatformConfig(platform_id.clone()))?;

        let credentials = self
            .credentials
            .get_credentials(&tenant_id, &platform_id)
            .await;
        let needs_credentials = config.direct_api.is_some()
            || config.login_mode == fleetsync_core_types::LoginMode::Automatic;
        if needs_credentials && credentials.is_none() {
            return Err(EngineError::MissingCredentials {
                tenant_id,
                platform_id,
            });
        }
        if config.direct_api.is_none() && config.extraction_steps.is_empty() {
            return Err(EngineError::NoExtractionSteps(platform_id));
        }

        let record = ExecutionRecord::new(tenant_id, platform_id, period);
        let id = record.id;
        self.records.save_execution(record.clone()).await;

        let cancel = CancellationToken::new();
        self.cancel_tokens.insert(id, cancel.clone());

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(record, config, credentials, cancel).await;
            engine.cancel_tokens.remove(&id);
        });

        Ok(id)
    }

    /// Request cancellation of a running execution. Partial results up to the
    /// cancellation point are persisted; the session is still released with
    /// its profile kept.
    pub fn cancel_execution(&self, id: ExecutionId) {
        if let Some(token) = self.cancel_tokens.get(&id) {
            token.cancel();
        }
    }

    pub async fn get_execution(&self, id: ExecutionId) -> Option<ExecutionRecord> {
        self.records.get_execution(id).await
    }

    async fn run(
        &self,
        mut record: ExecutionRecord,
        config: PlatformConfig,
        credentials: Option<Credentials>,
        cancel: CancellationToken,
    ) {
        record.status = ExecutionStatus::Running;
        record.log("execution started");
        self.records.save_execution(record.clone()).await;

        if let Some(direct) = config.direct_api.clone() {
            self.run_direct(record, &config, direct, credentials, cancel)
                .await;
        } else {
            self.run_browser(record, &config, credentials, cancel).await;
        }
    }

    async fn run_browser(
        &self,
        mut record: ExecutionRecord,
        config: &PlatformConfig,
        credentials: Option<Credentials>,
        cancel: CancellationToken,
    ) {
        let key = SessionKey::new(record.tenant_id.clone(), record.platform_id.clone());
        let lease = match self.sessions.acquire(key).await {
            Ok(lease) => lease,
            Err(err) => {
                error!(target: "orchestrator", execution = %record.id, %err, "session unavailable");
                record.log(format!("session unavailable: {err}"));
                record.finish(ExecutionStatus::Error, Some(err.to_string()));
                self.records.save_execution(record).await;
                return;
            }
        };

        let mut paths = ArtifactPaths::under(&lease.profile_dir);
        paths.downloads_root = self.config.downloads_root.clone();
        paths.screenshots_root = self.config.screenshots_root.clone();
        if let Err(err) = paths.ensure() {
            record.log(format!("artifact directories unavailable: {err}"));
            record.finish(ExecutionStatus::Error, Some(err.to_string()));
            self.sessions.release(lease).await;
            self.records.save_execution(record).await;
            return;
        }

        let mut ctx = RunContext::new(
            record.tenant_id.clone(),
            record.platform_id.clone(),
            record.period,
            credentials,
            paths,
        );

        let driver = lease.driver();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = async {
                let login = run_login(driver.as_ref(), config, &mut ctx).await;
                if !login.success {
                    return FlowOutcome::LoginFailed(login.reason);
                }
                FlowOutcome::Extracted(run_extraction(driver.as_ref(), config, &mut ctx).await)
            } => Some(outcome),
        };

        // Cleanup runs on every path including cancellation; the profile
        // directory is kept so a failed run does not force a fresh login.
        self.sessions.release(lease).await;

        record.logs.extend(ctx.logs.iter().cloned());
        record.screenshots = ctx.screenshots.clone();
        record.downloaded_files = ctx.downloaded_files.clone();

        match outcome {
            None => {
                warn!(target: "orchestrator", execution = %record.id, "execution cancelled");
                record.log("execution cancelled by caller");
                let status = if record.downloaded_files.is_empty() {
                    ExecutionStatus::Error
                } else {
                    ExecutionStatus::Partial
                };
                record.finish(status, Some("execution cancelled".into()));
            }
            Some(FlowOutcome::LoginFailed(reason)) => {
                let reason = reason.unwrap_or_else(|| "login failed".into());
                record.finish(ExecutionStatus::Error, Some(reason));
            }
            Some(FlowOutcome::Extracted(extraction)) => {
                self.settle_extraction(&mut record, &ctx, extraction).await;
            }
        }

        info!(
            target: "orchestrator",
            execution = %record.id,
            status = ?record.status,
            artifacts = record.downloaded_files.len(),
            "execution finished"
        );
        self.records.save_execution(record).await;
    }

    /// Parse whatever was downloaded and derive the terminal status.
    async fn settle_extraction(
        &self,
        record: &mut ExecutionRecord,
        ctx: &RunContext,
        extraction: ExtractionResult,
    ) {
        if extraction.status == ExtractionStatus::NoArtifacts {
            record.finish(
                ExecutionStatus::Error,
                Some("no artifacts downloaded although downloads were configured".into()),
            );
            return;
        }

        let mut parsed: Vec<NormalizedFinancialRecord> = Vec::new();
        let mut parse_failures = 0usize;
        for file in &ctx.downloaded_files {
            let raw = parse_report(file, &record.platform_id);
            match &raw.error {
                None => parsed.push(normalize(
                    &record.platform_id,
                    &record.tenant_id,
                    record.period,
                    &raw,
                )),
                Some(reason) => {
                    parse_failures += 1;
                    record.log(format!("failed to parse {}: {reason}", file.display()));
                }
            }
        }

        let emitted = parsed.len();
        if !parsed.is_empty() {
            self.records.insert_financial_records(parsed).await;
            record.log(format!("emitted {emitted} normalized record(s)"));
        }

        let (status, error) = terminal_status(
            extraction.status,
            extraction.run.soft_failures,
            ctx.downloaded_files.len(),
            emitted,
            parse_failures,
        );
        record.finish(status, error);
    }

    async fn run_direct(
        &self,
        mut record: ExecutionRecord,
        config: &PlatformConfig,
        direct: fleetsync_core_types::platform::DirectApiConfig,
        credentials: Option<Credentials>,
        cancel: CancellationToken,
    ) {
        record.log("direct api path selected, browser bypassed");

        let (client_id, client_secret) = match credentials.as_ref().and_then(|creds| {
            Some((
                creds.field("client_id")?.to_string(),
                creds.field("client_secret")?.to_string(),
            ))
        }) {
            Some(pair) => pair,
            None => {
                record.log("credentials lack client_id/client_secret fields");
                record.finish(
                    ExecutionStatus::Error,
                    Some("incomplete credentials for direct api".into()),
                );
                self.records.save_execution(record).await;
                return;
            }
        };

        let client = DirectApiClient::new(
            config.platform_id.clone(),
            direct,
            client_id,
            client_secret,
        );

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            fetched = client.fetch_earnings(&record.tenant_id, record.period) => Some(fetched),
        };

        match fetched {
            None => {
                record.log("execution cancelled by caller");
                record.finish(ExecutionStatus::Error, Some("execution cancelled".into()));
            }
            Some(Ok(normalized)) => {
                record.log(format!(
                    "fetched earnings over the direct api ({} entries)",
                    normalized.raw_row_count
                ));
                self.records.insert_financial_records(vec![normalized]).await;
                record.finish(ExecutionStatus::Success, None);
            }
            Some(Err(err)) => {
                error!(target: "orchestrator", execution = %record.id, %err, "direct api call failed");
                record.log(format!("direct api call failed: {err}"));
                record.finish(ExecutionStatus::Error, Some(err.to_string()));
            }
        }

        self.records.save_execution(record).await;
    }
}

/// Terminal status rules once extraction ran to its end.
fn terminal_status(
    extraction: ExtractionStatus,
    soft_failures: usize,
    artifacts: usize,
    emitted: usize,
    parse_failures: usize,
) -> (ExecutionStatus, Option<String>) {
    if artifacts > 0 && emitted == 0 {
        return (
            ExecutionStatus::Error,
            Some("no downloaded artifact could be parsed".into()),
        );
    }
    if extraction == ExtractionStatus::Partial || soft_failures > 0 || parse_failures > 0 {
        return (
            ExecutionStatus::Partial,
            Some(format!(
                "{soft_failures} soft-failed step(s), {parse_failures} unparsable artifact(s)"
            )),
        );
    }
    (ExecutionStatus::Success, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn clean_run_is_success() {
        let (status, error) = terminal_status(ExtractionStatus::Complete, 0, 1, 1, 0);
        assert_eq!(status, ExecutionStatus::Success);
        assert!(error.is_none());
    }

    #[test]
    fn soft_failures_downgrade_to_partial() {
        let (status, _) = terminal_status(ExtractionStatus::Partial, 2, 1, 1, 0);
        assert_eq!(status, ExecutionStatus::Partial);
    }

    #[test]
    fn unparsable_artifacts_among_good_ones_are_partial() {
        let (status, _) = terminal_status(ExtractionStatus::Complete, 0, 2, 1, 1);
        assert_eq!(status, ExecutionStatus::Partial);
    }

    #[test]
    fn total_parse_failure_is_an_error() {
        let (status, error) = terminal_status(ExtractionStatus::Complete, 0, 2, 0, 2);
        assert_eq!(status, ExecutionStatus::Error);
        assert!(error.unwrap().contains("no downloaded artifact"));
    }

    #[test]
    fn navigation_only_run_without_artifacts_is_success() {
        let (status, _) = terminal_status(ExtractionStatus::Complete, 0, 0, 0, 0);
        assert_eq!(status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn missing_platform_config_fails_synchronously() {
        use crate::stores::{
            InMemoryCredentialStore, InMemoryPlatformConfigStore, InMemoryRecordStore,
        };
        use tempfile::tempdir;

        let root = tempdir().unwrap();
        let engine = Arc::new(Engine::new(
            EngineConfig::under(root.path()),
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemoryPlatformConfigStore::new()),
            Arc::new(InMemoryRecordStore::new()),
        ));

        let period = Period::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
        );
        let err = engine
            .start_execution(TenantId::new("fleet-1"), PlatformId::new("nope"), period)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingPlatformConfig(_)));
    }
}
