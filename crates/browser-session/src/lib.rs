//! Persistent-profile browser session management.
//!
//! One browser profile per (tenant, platform) pair, durable on disk so that
//! cookies and local storage survive process restarts and repeated logins are
//! avoided. The in-memory handle is ephemeral; the profile directory is never
//! deleted on release.

pub mod chromium;
pub mod driver;
pub mod fingerprint;
pub mod manager;
pub mod scripted;

pub use driver::{DriverError, DriverErrorKind, PageDriver};
pub use fingerprint::{SessionProfile, Viewport};
pub use manager::{
    DriverFactory, SessionConfig, SessionError, SessionKey, SessionLease, SessionManager,
};
