//! Sequential step interpreter.
//!
//! Strictly ordered, no branching. Any fault inside a single step is caught,
//! logged with the step's order, paired with a diagnostic screenshot and
//! degraded to a soft-failure; the interpreter then advances to the next step.
//! Steps are not transactional.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::warn;

use fleetsync_browser_session::driver::{DriverError, DriverErrorKind, PageDriver};
use fleetsync_core_types::{Step, StepKind};

use crate::context::RunContext;

/// Downloads get a longer floor than ordinary steps; report exports are slow
/// on the target portals.
const DOWNLOAD_TIMEOUT_FLOOR_MS: u64 = 30_000;

/// Aggregate outcome of one step list run. `ok` means zero soft-failures.
#[derive(Clone, Debug, Default)]
pub struct StepRunResult {
    pub ok: bool,
    pub soft_failures: usize,
    /// Order of the first step that soft-failed, if any.
    pub failed_step: Option<u32>,
}

enum StepOutcome {
    Done(String),
    Skipped(String),
}

/// Execute steps in ascending `order`. Never returns an error and never
/// panics on behalf of a step: faults degrade to logged soft-failures.
pub async fn run_steps(
    driver: &dyn PageDriver,
    steps: &[Step],
    ctx: &mut RunContext,
) -> StepRunResult {
    let mut ordered: Vec<&Step> = steps.iter().collect();
    ordered.sort_by_key(|step| step.order);

    let mut result = StepRunResult {
        ok: true,
        soft_failures: 0,
        failed_step: None,
    };

    for step in ordered {
        match execute_step(driver, step, ctx).await {
            Ok(StepOutcome::Done(detail)) => {
                ctx.log(format!("step {} {}: {detail}", step.order, step.kind.as_str()));
            }
            Ok(StepOutcome::Skipped(reason)) => {
                ctx.log(format!(
                    "step {} {} skipped: {reason}",
                    step.order,
                    step.kind.as_str()
                ));
            }
            Err(err) => {
                result.ok = false;
                result.soft_failures += 1;
                if result.failed_step.is_none() {
                    result.failed_step = Some(step.order);
                }
                ctx.log(format!(
                    "step {} {} soft-failed: {err}",
                    step.order,
                    step.kind.as_str()
                ));
                capture_screenshot(driver, ctx, &format!("step_{}_failed", step.order)).await;
            }
        }
    }

    result
}

async fn execute_step(
    driver: &dyn PageDriver,
    step: &Step,
    ctx: &mut RunContext,
) -> Result<StepOutcome, DriverError> {
    let timeout = Duration::from_millis(step.timeout_ms);

    match step.kind {
        StepKind::Goto => {
            let url = match &step.value {
                Some(url) => url,
                None => return Ok(StepOutcome::Skipped("goto step without url".into())),
            };
            driver.navigate(url, timeout).await?;
            Ok(StepOutcome::Done(format!("navigated to {url}")))
        }
        StepKind::Wait => {
            let millis = step
                .value
                .as_deref()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(step.timeout_ms);
            sleep(Duration::from_millis(millis)).await;
            Ok(StepOutcome::Done(format!("waited {millis}ms")))
        }
        StepKind::WaitSelector => {
            let winner = driver.wait_for_any(&step.selectors, timeout).await?;
            Ok(StepOutcome::Done(format!("selector resolved: {winner}")))
        }
        StepKind::Click => {
            // Resolution and the click share the step's budget.
            let started = Instant::now();
            let winner = driver.wait_for_any(&step.selectors, timeout).await?;
            driver
                .click(&winner, timeout.saturating_sub(started.elapsed()))
                .await?;
            Ok(StepOutcome::Done(format!("clicked {winner}")))
        }
        StepKind::Type => {
            let text = match &step.value {
                Some(text) => text.clone(),
                None => return Ok(StepOutcome::Skipped("type step without value".into())),
            };
            let winner = fill_first(driver, step, &text, timeout).await?;
            Ok(StepOutcome::Done(format!("typed into {winner}")))
        }
        StepKind::FillCredential => {
            let field = match &step.credential_field {
                Some(field) => field.clone(),
                None => {
                    return Ok(StepOutcome::Skipped(
                        "fill_credential step without field name".into(),
                    ))
                }
            };
            let value = ctx
                .credentials
                .as_ref()
                .and_then(|creds| creds.field(&field))
                .map(str::to_string);
            match value {
                Some(value) => {
                    let winner = fill_first(driver, step, &value, timeout).await?;
                    Ok(StepOutcome::Done(format!(
                        "filled credential '{field}' into {winner}"
                    )))
                }
                // Missing credential fields are a logged no-op, not a failure.
                None => Ok(StepOutcome::Skipped(format!(
                    "credential field '{field}' not available"
                ))),
            }
        }
        StepKind::FillDateStart => {
            let text = ctx.period.start_display();
            let winner = fill_first(driver, step, &text, timeout).await?;
            Ok(StepOutcome::Done(format!("filled start date into {winner}")))
        }
        StepKind::FillDateEnd => {
            let text = ctx.period.end_display();
            let winner = fill_first(driver, step, &text, timeout).await?;
            Ok(StepOutcome::Done(format!("filled end date into {winner}")))
        }
        StepKind::Download => {
            let trigger = if step.selectors.is_empty() {
                None
            } else {
                Some(driver.wait_for_any(&step.selectors, timeout).await?)
            };
            let deadline =
                Duration::from_millis(step.timeout_ms.max(DOWNLOAD_TIMEOUT_FLOOR_MS));
            let file = driver
                .download(trigger.as_deref(), &ctx.paths.staging_dir, deadline)
                .await?;
            let destination = ctx.artifact_path(&file.suggested_name);
            move_file(&file.staged_path, &destination)?;
            ctx.downloaded_files.push(destination.clone());
            Ok(StepOutcome::Done(format!(
                "downloaded {}",
                destination.display()
            )))
        }
        StepKind::PressKey => {
            let key = step.value.as_deref().unwrap_or("Enter");
            driver.press_key(key).await?;
            Ok(StepOutcome::Done(format!("pressed {key}")))
        }
        StepKind::Screenshot => {
            capture_screenshot(driver, ctx, &format!("step_{}", step.order)).await;
            Ok(StepOutcome::Done("screenshot captured".into()))
        }
        StepKind::Unknown => Ok(StepOutcome::Skipped("unrecognized step kind".into())),
    }
}

/// Resolve the first visible candidate and type into it. Resolution and the
/// typing share one budget.
async fn fill_first(
    driver: &dyn PageDriver,
    step: &Step,
    text: &str,
    timeout: Duration,
) -> Result<String, DriverError> {
    let started = Instant::now();
    let winner = driver.wait_for_any(&step.selectors, timeout).await?;
    driver
        .type_text(&winner, text, timeout.saturating_sub(started.elapsed()))
        .await?;
    Ok(winner)
}

/// Diagnostic capture. Failures here are swallowed; a broken screenshot must
/// not turn into another step failure.
async fn capture_screenshot(driver: &dyn PageDriver, ctx: &mut RunContext, label: &str) {
    match driver.screenshot().await {
        Ok(bytes) => {
            let path = ctx.screenshot_path(label);
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match std::fs::write(&path, bytes) {
                Ok(()) => ctx.screenshots.push(path),
                Err(err) => {
                    warn!(target: "step-flow", %err, "failed to write screenshot");
                }
            }
        }
        Err(err) => {
            warn!(target: "step-flow", %err, "screenshot capture failed");
        }
    }
}

fn move_file(from: &Path, to: &Path) -> Result<(), DriverError> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| DriverError::new(DriverErrorKind::Io).with_hint(err.to_string()))?;
    }
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Staging and downloads may sit on different filesystems.
    std::fs::copy(from, to)
        .map_err(|err| DriverError::new(DriverErrorKind::Io).with_hint(err.to_string()))?;
    let _ = std::fs::remove_file(from);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ArtifactPaths;
    use chrono::NaiveDate;
    use fleetsync_browser_session::scripted::{RecordedAction, ScriptedDriver};
    use fleetsync_core_types::{Credentials, Period, PlatformId, TenantId};
    use tempfile::TempDir;

    fn ctx(root: &TempDir, credentials: Option<Credentials>) -> RunContext {
        let paths = ArtifactPaths::under(root.path());
        paths.ensure().unwrap();
        RunContext::new(
            TenantId::new("fleet-1"),
            PlatformId::new("bolt"),
            Period::new(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            ),
            credentials,
            paths,
        )
    }

    fn creds() -> Credentials {
        Credentials::new(PlatformId::new("bolt"), TenantId::new("fleet-1"))
            .with_field("email", "driver@example.com")
            .with_field("password", "hunter2")
    }

    #[tokio::test]
    async fn steps_run_in_ascending_order() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new().with_known_selectors(["#first", "#second"]);
        let mut ctx = ctx(&root, None);

        let steps = vec![
            Step::new(2, StepKind::Click).with_selectors(["#second"]),
            Step::new(1, StepKind::Click).with_selectors(["#first"]),
        ];
        let result = run_steps(&driver, &steps, &mut ctx).await;

        assert!(result.ok);
        assert_eq!(
            driver.actions(),
            vec![
                RecordedAction::Click("#first".into()),
                RecordedAction::Click("#second".into()),
            ]
        );
    }

    #[tokio::test]
    async fn selector_candidates_fall_through_to_first_match() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new().with_known_selectors(["#fallback"]);
        let mut ctx = ctx(&root, None);

        let steps = vec![Step::new(1, StepKind::Click)
            .with_selectors(["#preferred", "#fallback"])
            .with_timeout_ms(200)];
        let result = run_steps(&driver, &steps, &mut ctx).await;

        assert!(result.ok);
        assert_eq!(driver.actions(), vec![RecordedAction::Click("#fallback".into())]);
    }

    #[tokio::test]
    async fn unresolved_selector_is_a_soft_failure_and_run_continues() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new().with_known_selectors(["#later"]);
        let mut ctx = ctx(&root, None);

        let steps = vec![
            Step::new(1, StepKind::Click)
                .with_selectors(["#gone"])
                .with_timeout_ms(100),
            Step::new(2, StepKind::Click).with_selectors(["#later"]),
        ];
        let result = run_steps(&driver, &steps, &mut ctx).await;

        assert!(!result.ok);
        assert_eq!(result.soft_failures, 1);
        assert_eq!(result.failed_step, Some(1));
        // The later step still ran.
        assert!(driver
            .actions()
            .contains(&RecordedAction::Click("#later".into())));
        // The soft failure left a diagnostic screenshot and a log line.
        assert_eq!(ctx.screenshots.len(), 1);
        assert!(ctx.logs.iter().any(|l| l.contains("soft-failed")));
    }

    #[tokio::test]
    async fn hidden_candidate_loses_to_a_visible_fallback() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new()
            .with_known_selectors(["#menu", "#menu-mobile"])
            .with_hidden_selectors(["#menu"]);
        let mut ctx = ctx(&root, None);

        let steps = vec![Step::new(1, StepKind::Click)
            .with_selectors(["#menu", "#menu-mobile"])
            .with_timeout_ms(200)];
        let result = run_steps(&driver, &steps, &mut ctx).await;

        assert!(result.ok);
        assert_eq!(
            driver.actions(),
            vec![RecordedAction::Click("#menu-mobile".into())]
        );
    }

    #[tokio::test]
    async fn slow_resolution_shrinks_the_action_deadline() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new()
            .with_known_selectors(["#go"])
            .with_resolve_delay(Duration::from_millis(300));
        let mut ctx = ctx(&root, None);

        let steps = vec![Step::new(1, StepKind::Click)
            .with_selectors(["#go"])
            .with_timeout_ms(1_000)];
        let result = run_steps(&driver, &steps, &mut ctx).await;

        assert!(result.ok);
        let deadlines = driver.action_deadlines();
        assert_eq!(deadlines.len(), 1);
        // The click gets what is left of the 1s budget, not a fresh 1s.
        assert!(
            deadlines[0] <= Duration::from_millis(700),
            "click deadline {:?} should exclude the time spent resolving",
            deadlines[0]
        );
    }

    #[tokio::test]
    async fn fill_credential_resolves_named_field() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new().with_known_selectors(["input[name=email]"]);
        let mut ctx = ctx(&root, Some(creds()));

        let steps = vec![Step::new(1, StepKind::FillCredential)
            .with_selectors(["input[name=email]"])
            .with_credential_field("email")];
        let result = run_steps(&driver, &steps, &mut ctx).await;

        assert!(result.ok);
        assert_eq!(
            driver.actions(),
            vec![RecordedAction::Type {
                selector: "input[name=email]".into(),
                text: "driver@example.com".into(),
            }]
        );
    }

    #[tokio::test]
    async fn missing_credential_field_is_a_logged_noop() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new().with_known_selectors(["input[name=otp]"]);
        let mut ctx = ctx(&root, Some(creds()));

        let steps = vec![Step::new(1, StepKind::FillCredential)
            .with_selectors(["input[name=otp]"])
            .with_credential_field("otp")];
        let result = run_steps(&driver, &steps, &mut ctx).await;

        assert!(result.ok, "missing credential field must not fail the run");
        assert!(driver.actions().is_empty());
        assert!(ctx.logs.iter().any(|l| l.contains("otp")));
    }

    #[tokio::test]
    async fn date_steps_fill_the_portal_display_format() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new().with_known_selectors(["#from", "#to"]);
        let mut ctx = ctx(&root, None);

        let steps = vec![
            Step::new(1, StepKind::FillDateStart).with_selectors(["#from"]),
            Step::new(2, StepKind::FillDateEnd).with_selectors(["#to"]),
        ];
        run_steps(&driver, &steps, &mut ctx).await;

        assert_eq!(
            driver.actions(),
            vec![
                RecordedAction::Type {
                    selector: "#from".into(),
                    text: "01/01/2025".into(),
                },
                RecordedAction::Type {
                    selector: "#to".into(),
                    text: "07/01/2025".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn download_lands_on_the_deterministic_path() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new()
            .with_known_selectors(["#export"])
            .with_download("weekly.csv", b"h\n1".to_vec());
        let mut ctx = ctx(&root, None);

        let steps =
            vec![Step::new(1, StepKind::Download).with_selectors(["#export"])];
        let result = run_steps(&driver, &steps, &mut ctx).await;

        assert!(result.ok);
        assert_eq!(ctx.downloaded_files.len(), 1);
        let saved = &ctx.downloaded_files[0];
        assert!(saved.exists(), "artifact must exist on disk after the run");
        let name = saved.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("bolt_fleet-1_") && name.ends_with("_weekly.csv"));
    }

    #[tokio::test]
    async fn failed_download_keeps_previously_collected_artifacts() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new()
            .with_known_selectors(["#export"])
            .with_download("first.csv", b"h\n1".to_vec());
        let mut ctx = ctx(&root, None);

        // Second download has no scripted payload and times out.
        let steps = vec![
            Step::new(1, StepKind::Download).with_selectors(["#export"]),
            Step::new(2, StepKind::Download).with_selectors(["#export"]),
        ];
        let result = run_steps(&driver, &steps, &mut ctx).await;

        assert!(!result.ok);
        assert_eq!(ctx.downloaded_files.len(), 1);
        assert!(ctx.downloaded_files[0].exists());
    }

    #[tokio::test]
    async fn unknown_kind_and_malformed_steps_never_escape() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new();
        let mut ctx = ctx(&root, None);

        let steps = vec![
            Step::new(1, StepKind::Unknown),
            Step::new(2, StepKind::Goto), // no url
            Step::new(3, StepKind::Type).with_selectors(["#x"]), // no value
            Step::new(4, StepKind::FillCredential).with_selectors(["#x"]), // no field
        ];
        let result = run_steps(&driver, &steps, &mut ctx).await;

        // Malformed steps are skips, not failures.
        assert!(result.ok);
        assert_eq!(ctx.logs.len(), 4);
    }
}
