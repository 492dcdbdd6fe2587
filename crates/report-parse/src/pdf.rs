//! PDF report parsing via text-layer extraction.
//!
//! Scanned-image PDFs without a text layer come back empty; that surfaces as
//! a structural error rather than a report full of zeros.

use std::path::Path;

use regex::Regex;
use tracing::debug;

use fleetsync_core_types::PlatformId;

use crate::amount::parse_amount;
use crate::raw::{Field, RawReport};

/// Extract the PDF's text layer and capture per-field totals line by line.
pub fn parse_pdf_report(path: &Path, platform: &PlatformId) -> RawReport {
    let text = match pdf_extract::extract_text(path) {
        Ok(text) => text,
        Err(err) => {
            return RawReport::structural_error(format!(
                "failed to extract text from {}: {err}",
                path.display()
            ))
        }
    };

    if text.trim().is_empty() {
        return RawReport::structural_error(format!(
            "no text layer in {}",
            path.display()
        ));
    }

    // "<label> ... <amount>" on one line; the amount is the last numeric
    // token so trailing units or currency symbols do not break the capture.
    let amount_pattern = match Regex::new(r"(-?[\d.,]*\d)\s*(?:\u{20ac}|eur|l|kwh)?\s*$") {
        Ok(pattern) => pattern,
        Err(err) => return RawReport::structural_error(format!("invalid amount pattern: {err}")),
    };

    let mut report = RawReport::default();
    let mut matched_fields = 0usize;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lowered = trimmed.to_lowercase();
        let Some(field) = Field::ALL
            .iter()
            .find(|field| field.matches_header(&lowered))
        else {
            continue;
        };
        let Some(capture) = amount_pattern.captures(&lowered) else {
            continue;
        };
        field.assign(&mut report, parse_amount(&capture[1]));
        matched_fields += 1;
    }

    if matched_fields == 0 {
        return RawReport::structural_error(format!(
            "no recognized field labels in {}",
            path.display()
        ));
    }

    // PDF statements are summaries, not row dumps; count matched lines so
    // downstream "did we parse anything" checks behave the same as CSV.
    report.raw_row_count = matched_fields;

    debug!(
        target: "report-parse",
        platform = %platform,
        fields = matched_fields,
        "parsed pdf report"
    );
    report
}
