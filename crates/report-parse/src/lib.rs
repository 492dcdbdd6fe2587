//! Downloaded-artifact parsing and normalization.
//!
//! Pure functions: a file goes in, a best-effort [`RawReport`] comes out, and
//! [`normalize`] folds it into the platform-agnostic financial record. Parsing
//! never panics and never fails hard for malformed cells; only a file whose
//! structure is unrecognizable sets the report's `error` field.

use std::path::Path;

use fleetsync_core_types::PlatformId;

pub mod amount;
pub mod delimited;
pub mod normalize;
pub mod pdf;
pub mod raw;

pub use amount::parse_amount;
pub use delimited::parse_csv_report;
pub use normalize::normalize;
pub use pdf::parse_pdf_report;
pub use raw::RawReport;

/// Parse an artifact, dispatching on the file extension.
pub fn parse_report(path: &Path, platform: &PlatformId) -> RawReport {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" | "tsv" | "txt" => parse_csv_report(path, platform),
        "pdf" => parse_pdf_report(path, platform),
        other => RawReport::structural_error(format!("unsupported artifact format: {other:?}")),
    }
}
