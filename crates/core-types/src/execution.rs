//! Execution audit records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ExecutionId, Period, PlatformId, TenantId};

/// Lifecycle of one synchronization execution.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Partial,
    Error,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Partial | ExecutionStatus::Error
        )
    }
}

/// Append-only audit row for one execution. Mutated only by the orchestrator,
/// terminal once status reaches success/partial/error, never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub tenant_id: TenantId,
    pub platform_id: PlatformId,
    pub status: ExecutionStatus,
    pub period: Period,
    pub logs: Vec<String>,
    pub screenshots: Vec<PathBuf>,
    pub downloaded_files: Vec<PathBuf>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    pub fn new(tenant_id: TenantId, platform_id: PlatformId, period: Period) -> Self {
        Self {
            id: ExecutionId::new(),
            tenant_id,
            platform_id,
            status: ExecutionStatus::Pending,
            period,
            logs: Vec::new(),
            screenshots: Vec::new(),
            downloaded_files: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    /// Terminal transition; sets the finish timestamp exactly once.
    pub fn finish(&mut self, status: ExecutionStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> ExecutionRecord {
        ExecutionRecord::new(
            TenantId::new("fleet-1"),
            PlatformId::new("bolt"),
            Period::new(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            ),
        )
    }

    #[test]
    fn new_record_starts_pending() {
        let record = sample();
        assert_eq!(record.status, ExecutionStatus::Pending);
        assert!(!record.status.is_terminal());
        assert!(record.finished_at.is_none());
    }

    #[test]
    fn finish_is_terminal_and_stamped_once() {
        let mut record = sample();
        record.finish(ExecutionStatus::Partial, Some("one step soft-failed".into()));
        assert!(record.status.is_terminal());
        let first = record.finished_at;
        record.finish(ExecutionStatus::Error, None);
        assert_eq!(record.finished_at, first);
    }
}
