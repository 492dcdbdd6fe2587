//! Login flow runner.
//!
//! Runs a platform's login steps, then checks the post-condition: an
//! authenticated portal redirects away from its login/auth pages. Only this
//! check is authoritative for login success; individual step failures stay
//! soft because selector drift on a login form does not prove the session is
//! unauthenticated (the profile may already carry valid cookies).

use tracing::info;
use url::Url;

use fleetsync_browser_session::driver::PageDriver;
use fleetsync_core_types::{LoginMode, PlatformConfig};

use crate::context::RunContext;
use crate::interpreter::run_steps;

#[derive(Clone, Debug)]
pub struct LoginResult {
    pub success: bool,
    pub reason: Option<String>,
}

impl LoginResult {
    fn ok() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// Path segments that mark a page as part of an authentication flow.
const AUTH_SEGMENTS: &[&str] = &["login", "signin", "sign-in", "auth", "session"];

/// True when the URL no longer sits on an authentication page.
pub fn url_looks_authenticated(raw: &str) -> bool {
    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => return false,
    };
    let Some(segments) = parsed.path_segments() else {
        return true;
    };
    !segments
        .map(|segment| segment.to_ascii_lowercase())
        .any(|segment| AUTH_SEGMENTS.contains(&segment.as_str()))
}

/// Execute the platform's login program and verify the post-condition.
///
/// With `login_mode == manual` the runner only opens the portal; a human
/// completes authentication out of band and the persistent profile carries it
/// forward.
pub async fn run_login(
    driver: &dyn PageDriver,
    config: &PlatformConfig,
    ctx: &mut RunContext,
) -> LoginResult {
    if config.login_mode == LoginMode::Manual {
        let portal = config.portal_url();
        ctx.log(format!("manual login mode: opening portal {portal}"));
        if let Err(err) = driver
            .navigate(portal, std::time::Duration::from_millis(30_000))
            .await
        {
            ctx.log(format!("portal navigation failed: {err}"));
        }
        return LoginResult::ok();
    }

    let steps = config.ordered_login_steps();
    let run = run_steps(driver, &steps, ctx).await;
    if !run.ok {
        ctx.log(format!(
            "login flow had {} soft-failed step(s); verifying post-condition anyway",
            run.soft_failures
        ));
    }

    match driver.current_url().await {
        Ok(url) if url_looks_authenticated(&url) => {
            info!(target: "step-flow", platform = %config.platform_id, "login verified");
            ctx.log(format!("login verified, landed on {url}"));
            LoginResult::ok()
        }
        Ok(url) => {
            let reason = format!("post-login check failed: still on auth page {url}");
            ctx.log(reason.clone());
            LoginResult::failed(reason)
        }
        Err(err) => {
            let reason = format!("post-login check failed: could not read current url: {err}");
            ctx.log(reason.clone());
            LoginResult::failed(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ArtifactPaths;
    use chrono::NaiveDate;
    use fleetsync_browser_session::scripted::ScriptedDriver;
    use fleetsync_core_types::{
        Credentials, Period, PlatformId, Step, StepKind, TenantId,
    };
    use tempfile::TempDir;

    #[test]
    fn auth_path_segments_are_detected() {
        assert!(!url_looks_authenticated("https://portal.example.com/login"));
        assert!(!url_looks_authenticated(
            "https://portal.example.com/auth/callback"
        ));
        assert!(!url_looks_authenticated(
            "https://portal.example.com/drivers/signin"
        ));
        assert!(url_looks_authenticated(
            "https://portal.example.com/dashboard"
        ));
        // Substrings inside a segment do not count.
        assert!(url_looks_authenticated(
            "https://portal.example.com/plugins-catalog"
        ));
        assert!(!url_looks_authenticated("not a url"));
    }

    fn config(login_mode: fleetsync_core_types::LoginMode) -> PlatformConfig {
        PlatformConfig {
            platform_id: PlatformId::new("bolt"),
            login_steps: vec![
                Step::new(1, StepKind::Goto)
                    .with_value("https://portal.example.com/login"),
                Step::new(2, StepKind::FillCredential)
                    .with_selectors(["input[name=email]"])
                    .with_credential_field("email"),
                Step::new(3, StepKind::FillCredential)
                    .with_selectors(["input[name=password]"])
                    .with_credential_field("password"),
                Step::new(4, StepKind::Click).with_selectors(["button[type=submit]"]),
            ],
            extraction_steps: Vec::new(),
            login_mode,
            base_url: "https://portal.example.com".into(),
            login_url: Some("https://portal.example.com/login".into()),
            direct_api: None,
        }
    }

    fn ctx(root: &TempDir) -> RunContext {
        let paths = ArtifactPaths::under(root.path());
        paths.ensure().unwrap();
        RunContext::new(
            TenantId::new("fleet-1"),
            PlatformId::new("bolt"),
            Period::new(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            ),
            Some(
                Credentials::new(PlatformId::new("bolt"), TenantId::new("fleet-1"))
                    .with_field("email", "driver@example.com")
                    .with_field("password", "hunter2"),
            ),
            paths,
        )
    }

    #[tokio::test]
    async fn successful_login_passes_the_post_condition() {
        let root = TempDir::new().unwrap();
        // The portal redirects to the dashboard once the profile is
        // authenticated; the scripted driver models that on navigation.
        let driver = ScriptedDriver::new()
            .with_known_selectors([
                "input[name=email]",
                "input[name=password]",
                "button[type=submit]",
            ])
            .with_login_redirect(
                "https://portal.example.com/login",
                "https://portal.example.com/dashboard",
            );
        let mut ctx = ctx(&root);

        let cfg = config(fleetsync_core_types::LoginMode::Automatic);
        let result = run_login(&driver, &cfg, &mut ctx).await;

        assert!(result.success, "reason: {:?}", result.reason);
    }

    #[tokio::test]
    async fn stale_auth_url_fails_the_post_condition() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new().with_known_selectors([
            "input[name=email]",
            "input[name=password]",
            "button[type=submit]",
        ]);
        let mut ctx = ctx(&root);

        let cfg = config(fleetsync_core_types::LoginMode::Automatic);
        let result = run_login(&driver, &cfg, &mut ctx).await;

        assert!(!result.success);
        let reason = result.reason.unwrap();
        assert!(reason.contains("auth page"), "{reason}");
        assert!(ctx.logs.iter().any(|l| l.contains("post-login check failed")));
    }

    #[tokio::test]
    async fn manual_mode_skips_login_steps_entirely() {
        let root = TempDir::new().unwrap();
        let driver = ScriptedDriver::new();
        let mut ctx = ctx(&root);

        let cfg = config(fleetsync_core_types::LoginMode::Manual);
        let result = run_login(&driver, &cfg, &mut ctx).await;

        assert!(result.success);
        // Only the portal navigation happened, no credential typing.
        let actions = driver.actions();
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            fleetsync_browser_session::scripted::RecordedAction::Navigate(url)
                if url == "https://portal.example.com/login"
        ));
    }
}
