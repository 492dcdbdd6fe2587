//! Extraction flow runner.
//!
//! Runs the platform's navigation/download program for the requested period.
//! Partial extraction is a valid, reportable outcome: whatever artifacts were
//! collected are always returned, even when later steps soft-failed. The only
//! hard failure is ending with zero files while the configuration declared at
//! least one download step.

use fleetsync_browser_session::driver::PageDriver;
use fleetsync_core_types::{PlatformConfig, StepKind};

use crate::context::RunContext;
use crate::interpreter::{run_steps, StepRunResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExtractionStatus {
    /// Every step completed and every declared download produced a file.
    Complete,
    /// Some steps soft-failed but at least the artifacts collected so far are
    /// usable.
    Partial,
    /// The configuration declared downloads and none materialized. The caller
    /// must mark the execution `error`, not `partial`.
    NoArtifacts,
}

#[derive(Clone, Debug)]
pub struct ExtractionResult {
    pub status: ExtractionStatus,
    pub run: StepRunResult,
}

pub async fn run_extraction(
    driver: &dyn PageDriver,
    config: &PlatformConfig,
    ctx: &mut RunContext,
) -> ExtractionResult {
    let steps = config.ordered_extraction_steps();
    let declares_download = steps.iter().any(|step| step.kind == StepKind::Download);

    let run = run_steps(driver, &steps, ctx).await;

    let status = if declares_download && ctx.downloaded_files.is_empty() {
        ctx.log("extraction produced zero artifacts although downloads were configured");
        ExtractionStatus::NoArtifacts
    } else if run.ok {
        ExtractionStatus::Complete
    } else {
        ctx.log(format!(
            "extraction finished with {} soft-failed step(s), {} artifact(s) kept",
            run.soft_failures,
            ctx.downloaded_files.len()
        ));
        ExtractionStatus::Partial
    };

    ExtractionResult { status, run }
}
