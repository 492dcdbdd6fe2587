//! Shared primitives for the fleetsync RPA execution engine.
//!
//! Everything the member crates exchange lives here: identifiers, the
//! declarative step model, platform configuration, execution records and the
//! normalized financial record that both the browser path and the direct API
//! path produce.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod execution;
pub mod platform;
pub mod record;
pub mod step;

pub use execution::{ExecutionRecord, ExecutionStatus};
pub use platform::{Credentials, LoginMode, PlatformConfig};
pub use record::NormalizedFinancialRecord;
pub use step::{Step, StepKind};

/// Fleet-owner customer on whose behalf a session/execution runs.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External platform integration identifier (e.g. `bolt`, `viaverde`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PlatformId(pub String);

impl PlatformId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one synchronization execution.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Date range a synchronization covers, inclusive on both ends.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Display format used when filling date inputs on target portals.
pub const DATE_DISPLAY_FORMAT: &str = "%d/%m/%Y";

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Start date formatted the way target portals expect it typed.
    pub fn start_display(&self) -> String {
        self.start.format(DATE_DISPLAY_FORMAT).to_string()
    }

    /// End date formatted the way target portals expect it typed.
    pub fn end_display(&self) -> String {
        self.end.format(DATE_DISPLAY_FORMAT).to_string()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
