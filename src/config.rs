//! Engine configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Filesystem roots and browser options for the engine.
///
/// All artifact and profile paths the engine writes live under these roots;
/// nothing else on disk is touched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root for persistent per-(tenant, platform) browser profiles.
    #[serde(default = "default_sessions_root")]
    pub sessions_root: PathBuf,
    /// Final resting place for downloaded report artifacts.
    #[serde(default = "default_downloads_root")]
    pub downloads_root: PathBuf,
    /// Diagnostic screenshots, parallel tree to the downloads.
    #[serde(default = "default_screenshots_root")]
    pub screenshots_root: PathBuf,
    #[serde(default = "default_headless")]
    pub headless: bool,
}

fn default_sessions_root() -> PathBuf {
    PathBuf::from("data/sessions")
}

fn default_downloads_root() -> PathBuf {
    PathBuf::from("data/downloads")
}

fn default_screenshots_root() -> PathBuf {
    PathBuf::from("data/screenshots")
}

fn default_headless() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sessions_root: default_sessions_root(),
            downloads_root: default_downloads_root(),
            screenshots_root: default_screenshots_root(),
            headless: default_headless(),
        }
    }
}

impl EngineConfig {
    /// Load from a YAML file; absent fields fall back to the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Config with every root placed under one directory, used by tests and
    /// ad-hoc runs.
    pub fn under(root: &Path) -> Self {
        Self {
            sessions_root: root.join("sessions"),
            downloads_root: root.join("downloads"),
            screenshots_root: root.join("screenshots"),
            headless: true,
        }
    }
}
