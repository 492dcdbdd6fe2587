//! Step interpreter and flow runners.
//!
//! Executes stored automation programs against a page driver. Step faults are
//! contained at the step boundary: the target pages are uncontrolled
//! third-party UIs, and a single cosmetic change must not abort an otherwise
//! successful run.

pub mod context;
pub mod extraction;
pub mod interpreter;
pub mod login;

pub use context::{ArtifactPaths, RunContext};
pub use extraction::{run_extraction, ExtractionResult, ExtractionStatus};
pub use interpreter::{run_steps, StepRunResult};
pub use login::{run_login, url_looks_authenticated, LoginResult};
