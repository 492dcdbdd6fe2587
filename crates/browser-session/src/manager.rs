//! Session pool keyed by (tenant, platform).
//!
//! At most one live browser may exist per key at a time: concurrent writers to
//! the same on-disk profile directory corrupt browser state, so a second
//! `acquire` for the same key waits on the key's slot instead of opening a
//! second browser. Across keys, sessions are fully independent.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use fleetsync_core_types::{PlatformId, TenantId};

use crate::chromium::ChromiumDriver;
use crate::driver::PageDriver;
use crate::fingerprint::SessionProfile;

#[derive(Clone, Debug, Error)]
pub enum SessionError {
    /// The underlying browser process could not start (e.g. missing runtime).
    /// Terminal for the execution; callers must not retry in a tight loop.
    #[error("browser failed to start: {0}")]
    BrowserStart(String),
    #[error("profile directory inaccessible: {0}")]
    ProfileDir(String),
    #[error("internal session error: {0}")]
    Internal(String),
}

/// Pool key: one persistent browser profile per (tenant, platform) pair.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionKey {
    pub tenant_id: TenantId,
    pub platform_id: PlatformId,
}

impl SessionKey {
    pub fn new(tenant_id: TenantId, platform_id: PlatformId) -> Self {
        Self {
            tenant_id,
            platform_id,
        }
    }
}

/// Everything a driver factory needs to open a session.
#[derive(Clone, Debug)]
pub struct DriverRequest {
    pub profile_dir: PathBuf,
    pub headless: bool,
    pub profile: SessionProfile,
}

/// Pluggable driver construction, so tests inject scripted drivers the same
/// way the real pool launches chromium.
pub type DriverFactory = Arc<
    dyn Fn(DriverRequest) -> BoxFuture<'static, Result<Arc<dyn PageDriver>, SessionError>>
        + Send
        + Sync,
>;

/// Live, exclusive handle on one session. Holding the lease holds the key's
/// slot; dropping it (via [`SessionManager::release`]) frees the key for the
/// next execution. The profile directory outlives every lease.
pub struct SessionLease {
    pub key: SessionKey,
    pub profile_dir: PathBuf,
    driver: Arc<dyn PageDriver>,
    _slot: OwnedMutexGuard<()>,
}

impl SessionLease {
    pub fn driver(&self) -> Arc<dyn PageDriver> {
        Arc::clone(&self.driver)
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Root under which per-key profile directories are created.
    pub sessions_root: PathBuf,
    pub headless: bool,
    pub profile: SessionProfile,
}

impl SessionConfig {
    pub fn new(sessions_root: impl Into<PathBuf>) -> Self {
        Self {
            sessions_root: sessions_root.into(),
            headless: true,
            profile: SessionProfile::default(),
        }
    }
}

/// Owns session lifecycle: acquire (create or wait), release (close handle,
/// keep profile), and best-effort diagnostics.
pub struct SessionManager {
    config: SessionConfig,
    slots: DashMap<SessionKey, Arc<Mutex<()>>>,
    factory: DriverFactory,
}

impl SessionManager {
    /// Pool backed by real chromium sessions.
    pub fn new(config: SessionConfig) -> Self {
        let factory: DriverFactory = Arc::new(|request: DriverRequest| {
            Box::pin(async move {
                let driver =
                    ChromiumDriver::launch(&request.profile_dir, request.headless, &request.profile)
                        .await
                        .map_err(|err| SessionError::BrowserStart(err.to_string()))?;
                Ok(Arc::new(driver) as Arc<dyn PageDriver>)
            })
        });
        Self::with_factory(config, factory)
    }

    pub fn with_factory(config: SessionConfig, factory: DriverFactory) -> Self {
        Self {
            config,
            slots: DashMap::new(),
            factory,
        }
    }

    /// Deterministic profile directory for a key.
    pub fn profile_dir(&self, key: &SessionKey) -> PathBuf {
        self.config
            .sessions_root
            .join(key.platform_id.0.as_str())
            .join(key.tenant_id.0.as_str())
    }

    /// Open (or wait for) the session for this key.
    ///
    /// Waits until no other execution holds the key, ensures the persistent
    /// profile directory exists, then opens a driver on it. Re-opening the
    /// same directory restores cookies and local storage, so an already
    /// authenticated portal does not ask for login again.
    pub async fn acquire(&self, key: SessionKey) -> Result<SessionLease, SessionError> {
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = slot.lock_owned().await;

        let profile_dir = self.profile_dir(&key);
        std::fs::create_dir_all(&profile_dir)
            .map_err(|err| SessionError::ProfileDir(format!("{}: {err}", profile_dir.display())))?;

        let request = DriverRequest {
            profile_dir: profile_dir.clone(),
            headless: self.config.headless,
            profile: self.config.profile.clone(),
        };
        let driver = (self.factory)(request).await?;

        info!(
            target: "browser-session",
            tenant = %key.tenant_id,
            platform = %key.platform_id,
            profile_dir = %profile_dir.display(),
            "session acquired"
        );

        Ok(SessionLease {
            key,
            profile_dir,
            driver,
            _slot: guard,
        })
    }

    /// Close the in-process handle. The profile directory is always kept so a
    /// later `acquire` resumes the authenticated state.
    pub async fn release(&self, lease: SessionLease) {
        lease.driver.close().await;
        debug!(
            target: "browser-session",
            tenant = %lease.key.tenant_id,
            platform = %lease.key.platform_id,
            "session released, profile kept"
        );
        drop(lease); // frees the key's slot
        self.evict_idle();
    }

    /// Diagnostic capture that never fails: on any internal error it logs and
    /// returns `None`.
    pub async fn screenshot(&self, lease: &SessionLease) -> Option<Vec<u8>> {
        match lease.driver().screenshot().await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(target: "browser-session", %err, "screenshot capture failed");
                None
            }
        }
    }

    /// Drop slots for keys nobody currently holds, so the registry stays
    /// bounded by the number of live leases plus waiters. Runs after every
    /// release. Profile directories are untouched.
    pub fn evict_idle(&self) {
        self.slots
            .retain(|_, slot| slot.try_lock().is_err() || Arc::strong_count(slot) > 1);
    }
}
