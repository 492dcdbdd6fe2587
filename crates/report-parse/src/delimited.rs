//! Delimited-text report parsing.
//!
//! Column lookup is fuzzy: a column feeds a field when its lowercased header
//! contains one of the field's candidate substrings. Portals rename and
//! re-punctuate headers between releases; exact matching would break weekly.

use std::path::Path;

use csv::ReaderBuilder;
use tracing::debug;

use fleetsync_core_types::PlatformId;

use crate::amount::parse_amount;
use crate::raw::{Field, RawReport};

/// Parse a delimited report file into per-field totals over all data rows.
pub fn parse_csv_report(path: &Path, platform: &PlatformId) -> RawReport {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            return RawReport::structural_error(format!(
                "failed to read {}: {err}",
                path.display()
            ))
        }
    };

    let delimiter = sniff_delimiter(&content);
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());

    // Map each column index to the field its header identifies.
    let columns: Vec<(usize, Field)> = match reader.headers() {
        Ok(headers) => headers
            .iter()
            .enumerate()
            .filter_map(|(index, header)| {
                let lowered = header.trim().to_lowercase();
                Field::ALL
                    .iter()
                    .find(|field| field.matches_header(&lowered))
                    .map(|field| (index, *field))
            })
            .collect(),
        Err(err) => {
            return RawReport::structural_error(format!("failed to read headers: {err}"))
        }
    };

    if columns.is_empty() {
        return RawReport::structural_error(format!(
            "no recognized column headers in {}",
            path.display()
        ));
    }

    let mut report = RawReport::default();
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            // A single broken row does not discard the report.
            Err(err) => {
                debug!(target: "report-parse", platform = %platform, %err, "skipping malformed row");
                continue;
            }
        };
        report.raw_row_count += 1;
        for (index, field) in &columns {
            if let Some(cell) = row.get(*index) {
                field.assign(&mut report, parse_amount(cell));
            }
        }
    }

    debug!(
        target: "report-parse",
        platform = %platform,
        rows = report.raw_row_count,
        columns = columns.len(),
        "parsed delimited report"
    );
    report
}

/// Portuguese exports commonly use `;`; fall back to tab, then comma.
fn sniff_delimiter(content: &str) -> u8 {
    let header_line = content.lines().next().unwrap_or_default();
    if header_line.contains(';') {
        b';'
    } else if header_line.contains('\t') {
        b'\t'
    } else {
        b','
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_report(name: &str, content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn semicolon_delimited_portuguese_headers() {
        let (_dir, path) = write_report(
            "weekly.csv",
            "Motorista;Ganhos brutos|\u{20ac};Ganhos l\u{ed}quidos|\u{20ac};Gorjetas;Portagens\n\
             Ana;2.000,00;1.234,56;10,50;3,20\n\
             Rui;1.000,00;800,00;0,00;1,80\n",
        );

        let report = parse_csv_report(&path, &PlatformId::new("bolt"));
        assert!(report.is_usable());
        assert_eq!(report.raw_row_count, 2);
        assert_eq!(report.gross_earnings, 3000.0);
        assert_eq!(report.net_earnings, 2034.56);
        assert_eq!(report.tips, 10.5);
        assert_eq!(report.toll_amount, 5.0);
    }

    #[test]
    fn comma_delimited_english_headers() {
        let (_dir, path) = write_report(
            "weekly.csv",
            "Driver,Gross,Net,Tips\nAna,\"1,234.56\",\"1,000.00\",5.00\n",
        );

        let report = parse_csv_report(&path, &PlatformId::new("uber"));
        assert!(report.is_usable());
        assert_eq!(report.gross_earnings, 1234.56);
        assert_eq!(report.net_earnings, 1000.0);
    }

    #[test]
    fn malformed_cells_default_to_zero_without_discarding_the_report() {
        let (_dir, path) = write_report(
            "weekly.csv",
            "Ganhos l\u{ed}quidos\nnot-a-number\n1.234,56\n",
        );

        let report = parse_csv_report(&path, &PlatformId::new("bolt"));
        assert!(report.is_usable());
        assert_eq!(report.raw_row_count, 2);
        assert_eq!(report.net_earnings, 1234.56);
    }

    #[test]
    fn unrecognized_headers_set_the_error_field() {
        let (_dir, path) = write_report("weekly.csv", "foo;bar\n1;2\n");

        let report = parse_csv_report(&path, &PlatformId::new("bolt"));
        assert!(report.error.is_some());
    }

    #[test]
    fn missing_file_is_an_error_report_not_a_panic() {
        let dir = tempdir().unwrap();
        let report = parse_csv_report(&dir.path().join("gone.csv"), &PlatformId::new("bolt"));
        assert!(report.error.is_some());
    }
}
