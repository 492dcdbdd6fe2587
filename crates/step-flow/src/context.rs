//! Per-run mutable state shared by the flow runners.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use fleetsync_core_types::{Credentials, Period, PlatformId, TenantId};

/// Filesystem layout for run artifacts.
#[derive(Clone, Debug)]
pub struct ArtifactPaths {
    /// Final resting place of downloaded reports.
    pub downloads_root: PathBuf,
    /// Diagnostic screenshots.
    pub screenshots_root: PathBuf,
    /// Scratch directory the browser downloads into before files are renamed
    /// to their deterministic path.
    pub staging_dir: PathBuf,
}

impl ArtifactPaths {
    pub fn under(root: &Path) -> Self {
        Self {
            downloads_root: root.join("downloads"),
            screenshots_root: root.join("screenshots"),
            staging_dir: root.join("staging"),
        }
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.downloads_root)?;
        std::fs::create_dir_all(&self.screenshots_root)?;
        std::fs::create_dir_all(&self.staging_dir)?;
        Ok(())
    }
}

/// Mutable context threaded through one execution's flows.
///
/// Collects logs, screenshots and downloaded artifacts; the orchestrator
/// copies them into the execution record at the end. Dates come from the
/// requested period, never computed inside the interpreter.
pub struct RunContext {
    pub tenant_id: TenantId,
    pub platform_id: PlatformId,
    pub period: Period,
    pub credentials: Option<Credentials>,
    pub paths: ArtifactPaths,
    pub logs: Vec<String>,
    pub screenshots: Vec<PathBuf>,
    pub downloaded_files: Vec<PathBuf>,
}

impl RunContext {
    pub fn new(
        tenant_id: TenantId,
        platform_id: PlatformId,
        period: Period,
        credentials: Option<Credentials>,
        paths: ArtifactPaths,
    ) -> Self {
        Self {
            tenant_id,
            platform_id,
            period,
            credentials,
            paths,
            logs: Vec::new(),
            screenshots: Vec::new(),
            downloaded_files: Vec::new(),
        }
    }

    pub fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!(
            target: "step-flow",
            tenant = %self.tenant_id,
            platform = %self.platform_id,
            "{line}"
        );
        self.logs.push(line);
    }

    /// Deterministic artifact path:
    /// `{downloads_root}/{platform}_{tenant}_{timestamp}_{suggested_name}`.
    pub fn artifact_path(&self, suggested_name: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        self.paths.downloads_root.join(format!(
            "{}_{}_{}_{}",
            self.platform_id, self.tenant_id, stamp, suggested_name
        ))
    }

    /// Screenshot path under the parallel screenshots tree.
    pub fn screenshot_path(&self, label: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        self.paths.screenshots_root.join(format!(
            "{}_{}_{}_{}.png",
            self.platform_id, self.tenant_id, stamp, label
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    #[test]
    fn artifact_paths_follow_the_naming_scheme() {
        let root = tempdir().unwrap();
        let ctx = RunContext::new(
            TenantId::new("fleet-1"),
            PlatformId::new("bolt"),
            Period::new(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            ),
            None,
            ArtifactPaths::under(root.path()),
        );

        let artifact = ctx.artifact_path("weekly.csv");
        let name = artifact.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("bolt_fleet-1_"));
        assert!(name.ends_with("_weekly.csv"));
        assert!(artifact.starts_with(&ctx.paths.downloads_root));

        let shot = ctx.screenshot_path("step_4");
        assert!(shot.to_string_lossy().ends_with("_step_4.png"));
    }
}
