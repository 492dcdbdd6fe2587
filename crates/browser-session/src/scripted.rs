//! Scripted in-memory driver for tests and dry runs.
//!
//! Behaves like a deterministic portal: known selectors resolve, configured
//! downloads materialize as real files in the staging directory, and every
//! action is recorded so tests can assert on the exact sequence.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{DownloadedFile, DriverError, DriverErrorKind, PageDriver};

/// One action observed by the scripted driver, for test assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedAction {
    Navigate(String),
    Click(String),
    Type { selector: String, text: String },
    PressKey(String),
    Screenshot,
    Download { trigger: Option<String> },
    Close,
}

#[derive(Default)]
struct ScriptedState {
    current_url: String,
    actions: Vec<RecordedAction>,
    action_deadlines: Vec<Duration>,
    downloads_served: usize,
}

/// Deterministic [`PageDriver`] double.
pub struct ScriptedDriver {
    known_selectors: HashSet<String>,
    /// Attached to the page but without a rendered box; resolution skips
    /// them and direct interaction fails.
    hidden_selectors: HashSet<String>,
    /// URL the driver reports after a navigation to `login_success_redirect.0`.
    login_redirect: Option<(String, String)>,
    download_payloads: Vec<(String, Vec<u8>)>,
    fail_downloads: bool,
    resolve_delay: Duration,
    state: Mutex<ScriptedState>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            known_selectors: HashSet::new(),
            hidden_selectors: HashSet::new(),
            login_redirect: None,
            download_payloads: Vec::new(),
            fail_downloads: false,
            resolve_delay: Duration::ZERO,
            state: Mutex::new(ScriptedState::default()),
        }
    }

    pub fn with_known_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_selectors
            .extend(selectors.into_iter().map(Into::into));
        self
    }

    /// Mark selectors as present but not visible, like a `display:none`
    /// login form on an already authenticated page.
    pub fn with_hidden_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden_selectors
            .extend(selectors.into_iter().map(Into::into));
        self
    }

    /// Delay every candidate resolution, like a slow portal page.
    pub fn with_resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = delay;
        self
    }

    /// After navigating to `from`, report `to` as the current URL. Simulates
    /// a portal redirecting away from its login page once authenticated.
    pub fn with_login_redirect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.login_redirect = Some((from.into(), to.into()));
        self
    }

    /// Serve these files, in order, for successive download steps.
    pub fn with_download(mut self, name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        self.download_payloads.push((name.into(), payload.into()));
        self
    }

    /// Make every download step time out.
    pub fn with_failing_downloads(mut self) -> Self {
        self.fail_downloads = true;
        self
    }

    pub fn actions(&self) -> Vec<RecordedAction> {
        self.state.lock().actions.clone()
    }

    /// Deadlines passed to `click`/`type_text`, in call order.
    pub fn action_deadlines(&self) -> Vec<Duration> {
        self.state.lock().action_deadlines.clone()
    }

    pub fn set_current_url(&self, url: impl Into<String>) {
        self.state.lock().current_url = url.into();
    }

    fn resolve(&self, selectors: &[String]) -> Option<String> {
        selectors
            .iter()
            .find(|s| self.is_visible(s))
            .cloned()
    }

    fn is_visible(&self, selector: &str) -> bool {
        self.known_selectors.contains(selector) && !self.hidden_selectors.contains(selector)
    }
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn navigate(&self, url: &str, _deadline: Duration) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.actions.push(RecordedAction::Navigate(url.to_string()));
        state.current_url = match &self.login_redirect {
            Some((from, to)) if url == from => to.clone(),
            _ => url.to_string(),
        };
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().current_url.clone())
    }

    async fn wait_for_any(
        &self,
        selectors: &[String],
        _deadline: Duration,
    ) -> Result<String, DriverError> {
        if self.resolve_delay > Duration::ZERO {
            tokio::time::sleep(self.resolve_delay).await;
        }
        self.resolve(selectors).ok_or_else(|| {
            DriverError::new(DriverErrorKind::TargetNotFound)
                .with_hint(format!("no visible candidate among {selectors:?}"))
        })
    }

    async fn click(&self, selector: &str, deadline: Duration) -> Result<(), DriverError> {
        if !self.is_visible(selector) {
            return Err(DriverError::new(DriverErrorKind::TargetNotFound).with_hint(selector));
        }
        let mut state = self.state.lock();
        state.actions.push(RecordedAction::Click(selector.to_string()));
        state.action_deadlines.push(deadline);
        Ok(())
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        deadline: Duration,
    ) -> Result<(), DriverError> {
        if !self.is_visible(selector) {
            return Err(DriverError::new(DriverErrorKind::TargetNotFound).with_hint(selector));
        }
        let mut state = self.state.lock();
        state.actions.push(RecordedAction::Type {
            selector: selector.to_string(),
            text: text.to_string(),
        });
        state.action_deadlines.push(deadline);
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.state
            .lock()
            .actions
            .push(RecordedAction::PressKey(key.to_string()));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.state.lock().actions.push(RecordedAction::Screenshot);
        // Smallest valid PNG header; enough for diagnostics-path tests.
        Ok(vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'])
    }

    async fn download(
        &self,
        trigger: Option<&str>,
        staging_dir: &Path,
        _deadline: Duration,
    ) -> Result<DownloadedFile, DriverError> {
        let served = {
            let mut state = self.state.lock();
            state.actions.push(RecordedAction::Download {
                trigger: trigger.map(String::from),
            });
            let index = state.downloads_served;
            state.downloads_served += 1;
            index
        };

        if self.fail_downloads {
            return Err(DriverError::new(DriverErrorKind::DownloadTimeout)
                .with_hint("scripted download failure"));
        }

        let (name, payload) = self.download_payloads.get(served).ok_or_else(|| {
            DriverError::new(DriverErrorKind::DownloadTimeout)
                .with_hint("no scripted download payload left")
        })?;

        std::fs::create_dir_all(staging_dir).map_err(|err| {
            DriverError::new(DriverErrorKind::Io).with_hint(err.to_string())
        })?;
        let staged_path: PathBuf = staging_dir.join(name);
        std::fs::write(&staged_path, payload)
            .map_err(|err| DriverError::new(DriverErrorKind::Io).with_hint(err.to_string()))?;

        Ok(DownloadedFile {
            staged_path,
            suggested_name: name.clone(),
        })
    }

    async fn close(&self) {
        self.state.lock().actions.push(RecordedAction::Close);
    }
}
