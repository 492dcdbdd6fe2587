//! Fleetsync RPA execution engine.
//!
//! Configuration-driven browser automation against fleet platform portals:
//! persistent per-(tenant, platform) sessions, a declarative step interpreter
//! for login and extraction flows, a download -> parse -> normalize pipeline
//! and an OAuth2 direct-API fallback for platforms that offer one.

pub mod config;
pub mod orchestrator;
pub mod stores;
pub mod telemetry;

pub use config::EngineConfig;
pub use orchestrator::{Engine, EngineError};
pub use stores::{
    CredentialStore, InMemoryCredentialStore, InMemoryPlatformConfigStore, InMemoryRecordStore,
    PlatformConfigStore, RecordStore,
};
