//! Real browser driver over chromiumoxide.
//!
//! Launches a chromium instance with a persistent `user_data_dir`, applies the
//! session fingerprint profile and exposes the [`PageDriver`] surface. The
//! process handle is closed on release; the profile directory stays on disk.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType,
};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorParams, SetDownloadBehaviorBehavior,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::driver::{DownloadedFile, DriverError, DriverErrorKind, PageDriver};
use crate::fingerprint::{launch_args, SessionProfile, WEBDRIVER_PATCH};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DOWNLOAD_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Driver bound to one launched chromium instance and one page.
pub struct ChromiumDriver {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumDriver {
    /// Launch chromium on the given persistent profile directory.
    ///
    /// Fails fast with an [`DriverErrorKind::Io`] error when the browser
    /// process cannot start; callers must not retry in a tight loop.
    pub async fn launch(
        profile_dir: &Path,
        headless: bool,
        profile: &SessionProfile,
    ) -> Result<Self, DriverError> {
        let config = BrowserConfig::builder()
            .user_data_dir(profile_dir)
            .window_size(profile.viewport.width, profile.viewport.height)
            .args(launch_args(headless))
            .request_timeout(Duration::from_secs(30))
            .launch_timeout(Duration::from_secs(20))
            .build()
            .map_err(|err| {
                DriverError::new(DriverErrorKind::Io)
                    .with_hint(format!("browser config error: {err}"))
            })?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|err| {
            DriverError::new(DriverErrorKind::Io)
                .with_hint(format!("failed to launch chromium: {err}"))
        })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(target: "browser-session", %err, "browser handler event error");
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(map_cdp)?;

        let driver = Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task,
        };
        driver.apply_profile(profile).await?;
        Ok(driver)
    }

    async fn apply_profile(&self, profile: &SessionProfile) -> Result<(), DriverError> {
        self.page
            .set_user_agent(profile.user_agent.as_str())
            .await
            .map_err(map_cdp)?;
        self.page
            .execute(SetTimezoneOverrideParams::new(profile.timezone.clone()))
            .await
            .map_err(map_cdp)?;
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                profile.viewport.width as i64,
                profile.viewport.height as i64,
                profile.viewport.device_scale_factor,
                false,
            ))
            .await
            .map_err(map_cdp)?;
        self.page
            .evaluate_on_new_document(WEBDRIVER_PATCH)
            .await
            .map_err(map_cdp)?;
        Ok(())
    }

    /// Poll candidate selectors until one resolves to a visible element or
    /// the deadline passes. Attached-but-hidden matches (display:none login
    /// forms, collapsed menus) keep polling so a later candidate or a layout
    /// change can still win.
    async fn resolve_first(
        &self,
        selectors: &[String],
        deadline: Duration,
    ) -> Result<(String, chromiumoxide::element::Element), DriverError> {
        let started = Instant::now();
        loop {
            for selector in selectors {
                if let Ok(element) = self.page.find_element(selector.as_str()).await {
                    // No clickable point means no rendered box.
                    if element.clickable_point().await.is_ok() {
                        return Ok((selector.clone(), element));
                    }
                }
            }
            if started.elapsed() >= deadline {
                return Err(DriverError::new(DriverErrorKind::TargetNotFound).with_hint(
                    format!(
                        "no visible candidate within {}ms: {:?}",
                        deadline.as_millis(),
                        selectors
                    ),
                ));
            }
            sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn dispatch_key(&self, kind: DispatchKeyEventType, key: &str) -> Result<(), DriverError> {
        let mut builder = DispatchKeyEventParams::builder().r#type(kind).key(key);
        if key == "Enter" {
            builder = builder.text("\r");
        }
        let params = builder
            .build()
            .map_err(|err| DriverError::new(DriverErrorKind::Internal).with_hint(err))?;
        self.page.execute(params).await.map_err(map_cdp)?;
        Ok(())
    }

    /// Short randomized settle delay after navigation; target pages are not
    /// deterministic about load completion.
    async fn settle(&self) {
        let jitter = rand::thread_rng().gen_range(200..600);
        sleep(Duration::from_millis(500 + jitter)).await;
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), DriverError> {
        let navigation = async {
            self.page.goto(url).await.map_err(map_cdp)?;
            self.page.wait_for_navigation().await.map_err(map_cdp)?;
            Ok::<_, DriverError>(())
        };
        match tokio::time::timeout(deadline, navigation).await {
            Ok(result) => {
                result?;
                self.settle().await;
                Ok(())
            }
            Err(_) => Err(DriverError::new(DriverErrorKind::NavTimeout)
                .with_hint(format!("navigation to {url} exceeded {}ms", deadline.as_millis()))),
        }
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let url = self.page.url().await.map_err(map_cdp)?;
        url.ok_or_else(|| {
            DriverError::new(DriverErrorKind::Internal).with_hint("page has no url")
        })
    }

    async fn wait_for_any(
        &self,
        selectors: &[String],
        deadline: Duration,
    ) -> Result<String, DriverError> {
        let (selector, _) = self.resolve_first(selectors, deadline).await?;
        Ok(selector)
    }

    async fn click(&self, selector: &str, deadline: Duration) -> Result<(), DriverError> {
        let (_, element) = self
            .resolve_first(std::slice::from_ref(&selector.to_string()), deadline)
            .await?;
        element.click().await.map_err(map_cdp)?;
        Ok(())
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        deadline: Duration,
    ) -> Result<(), DriverError> {
        let (_, element) = self
            .resolve_first(std::slice::from_ref(&selector.to_string()), deadline)
            .await?;
        element.click().await.map_err(map_cdp)?;
        element.type_str(text).await.map_err(map_cdp)?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.dispatch_key(DispatchKeyEventType::KeyDown, key).await?;
        self.dispatch_key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(map_cdp)
    }

    async fn download(
        &self,
        trigger: Option<&str>,
        staging_dir: &Path,
        deadline: Duration,
    ) -> Result<DownloadedFile, DriverError> {
        std::fs::create_dir_all(staging_dir).map_err(|err| {
            DriverError::new(DriverErrorKind::Io)
                .with_hint(format!("failed to create staging dir: {err}"))
        })?;

        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(staging_dir.display().to_string())
            .build()
            .map_err(|err| DriverError::new(DriverErrorKind::Internal).with_hint(err))?;
        self.page.execute(params).await.map_err(map_cdp)?;

        let started_at = SystemTime::now();
        if let Some(selector) = trigger {
            self.click(selector, Duration::from_secs(10)).await?;
        }

        await_staged_file(staging_dir, started_at, deadline).await
    }

    async fn close(&self) {
        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            if let Err(err) = browser.close().await {
                warn!(target: "browser-session", %err, "browser close failed");
            }
            if let Err(err) = browser.wait().await {
                debug!(target: "browser-session", %err, "browser wait failed");
            }
        }
        self.handler_task.abort();
    }
}

/// Poll the staging directory until a new, fully written file appears.
///
/// Chromium writes `.crdownload` files while a transfer is in flight; a file
/// counts as complete once it carries a final name and its size is stable
/// across two polls.
async fn await_staged_file(
    staging_dir: &Path,
    started_at: SystemTime,
    deadline: Duration,
) -> Result<DownloadedFile, DriverError> {
    let poll_started = Instant::now();
    let mut last_size: Option<(PathBuf, u64)> = None;

    while poll_started.elapsed() < deadline {
        if let Some(candidate) = newest_candidate(staging_dir, started_at) {
            let size = std::fs::metadata(&candidate).map(|m| m.len()).unwrap_or(0);
            match &last_size {
                Some((path, previous)) if *path == candidate && *previous == size && size > 0 => {
                    let suggested_name = candidate
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "download.bin".to_string());
                    return Ok(DownloadedFile {
                        staged_path: candidate,
                        suggested_name,
                    });
                }
                _ => last_size = Some((candidate, size)),
            }
        }
        sleep(DOWNLOAD_POLL_INTERVAL).await;
    }

    Err(DriverError::new(DriverErrorKind::DownloadTimeout)
        .with_hint(format!("no completed download within {}ms", deadline.as_millis())))
}

fn newest_candidate(staging_dir: &Path, started_at: SystemTime) -> Option<PathBuf> {
    let entries = std::fs::read_dir(staging_dir).ok()?;
    entries
        .flatten()
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            !name.starts_with('.') && !name.ends_with(".crdownload") && !name.ends_with(".tmp")
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            (modified >= started_at).then(|| (entry.path(), modified))
        })
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
}

fn map_cdp(err: chromiumoxide::error::CdpError) -> DriverError {
    let hint = err.to_string();
    let kind = match err {
        chromiumoxide::error::CdpError::Timeout => DriverErrorKind::NavTimeout,
        _ => DriverErrorKind::Io,
    };
    DriverError::new(kind).with_hint(hint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn staged_file_is_detected_once_size_is_stable() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("report.csv");
        fs::write(&target, b"a,b,c\n1,2,3\n").unwrap();

        let found = await_staged_file(
            dir.path(),
            SystemTime::now() - Duration::from_secs(5),
            Duration::from_secs(3),
        )
        .await
        .unwrap();
        assert_eq!(found.suggested_name, "report.csv");
        assert_eq!(found.staged_path, target);
    }

    #[tokio::test]
    async fn in_flight_downloads_are_ignored() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("report.csv.crdownload"), b"partial").unwrap();

        let result = await_staged_file(
            dir.path(),
            SystemTime::now() - Duration::from_secs(5),
            Duration::from_millis(700),
        )
        .await;
        assert!(matches!(
            result.unwrap_err().kind,
            DriverErrorKind::DownloadTimeout
        ));
    }
}
