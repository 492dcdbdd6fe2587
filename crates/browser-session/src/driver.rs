//! Capability surface the step interpreter drives.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// High-level failure categories surfaced by a page driver.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DriverErrorKind {
    /// Navigation did not settle within the deadline.
    NavTimeout,
    /// No selector candidate resolved to a visible element in time.
    TargetNotFound,
    /// A download was triggered but no file materialized before the deadline.
    DownloadTimeout,
    /// Browser transport I/O failure.
    Io,
    Internal,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DriverErrorKind::NavTimeout => "navigation timed out",
            DriverErrorKind::TargetNotFound => "target element not found",
            DriverErrorKind::DownloadTimeout => "download timed out",
            DriverErrorKind::Io => "browser i/o failure",
            DriverErrorKind::Internal => "internal error",
        };
        write!(f, "{label}")
    }
}

/// Driver error with an optional human-readable hint.
#[derive(Clone, Debug)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub hint: Option<String>,
}

impl std::error::Error for DriverError {}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {hint}")?;
        }
        Ok(())
    }
}

impl DriverError {
    pub fn new(kind: DriverErrorKind) -> Self {
        Self { kind, hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// A file the driver saved after a triggered download.
#[derive(Clone, Debug)]
pub struct DownloadedFile {
    /// Location inside the staging directory the driver was pointed at.
    pub staged_path: PathBuf,
    /// Filename suggested by the browser/server.
    pub suggested_name: String,
}

/// Minimal browser capability surface required by the step interpreter.
///
/// Implemented by the real chromium driver and by scripted test doubles, so
/// flow logic is testable without a browser.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for DOM-ready within the deadline.
    async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), DriverError>;

    /// URL of the current document.
    async fn current_url(&self) -> Result<String, DriverError>;

    /// Resolve the first visible element among the candidates, polling up to
    /// the deadline. Returns the winning selector.
    async fn wait_for_any(
        &self,
        selectors: &[String],
        deadline: Duration,
    ) -> Result<String, DriverError>;

    async fn click(&self, selector: &str, deadline: Duration) -> Result<(), DriverError>;

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        deadline: Duration,
    ) -> Result<(), DriverError>;

    /// Dispatch a key press (e.g. `Enter`) to the focused element.
    async fn press_key(&self, key: &str) -> Result<(), DriverError>;

    /// Capture a full-page screenshot as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// Click the optional trigger and wait for a download to complete inside
    /// `staging_dir`, up to the deadline.
    async fn download(
        &self,
        trigger: Option<&str>,
        staging_dir: &Path,
        deadline: Duration,
    ) -> Result<DownloadedFile, DriverError>;

    /// Close the in-process browser handle. On-disk profile state survives.
    async fn close(&self);
}
