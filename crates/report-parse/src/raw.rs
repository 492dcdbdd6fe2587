//! Intermediate per-file extraction result.

use serde::{Deserialize, Serialize};

/// Fixed set of named fields extracted from one artifact, before the
/// platform-specific normalization formula is applied.
///
/// All amounts default to `0.0`; `error` is set only when the file's
/// structure was not recognized at all (e.g. none of the expected headers
/// matched), in which case the totals are meaningless.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReport {
    pub gross_earnings: f64,
    pub net_earnings: f64,
    pub tips: f64,
    pub bonuses: f64,
    pub fees: f64,
    pub fuel_liters: f64,
    pub kwh: f64,
    pub toll_amount: f64,
    pub raw_row_count: usize,
    pub error: Option<String>,
}

impl RawReport {
    pub fn structural_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_usable(&self) -> bool {
        self.error.is_none()
    }
}

/// The extraction fields a parser can assign into, shared by the CSV and PDF
/// paths so header candidates and regex patterns stay in one table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Field {
    Gross,
    Net,
    Tips,
    Bonuses,
    Fees,
    FuelLiters,
    Kwh,
    Tolls,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Gross,
        Field::Net,
        Field::Tips,
        Field::Bonuses,
        Field::Fees,
        Field::FuelLiters,
        Field::Kwh,
        Field::Tolls,
    ];

    /// Case-insensitive substrings that identify this field in a column
    /// header. Portuguese labels first; the portals localize inconsistently.
    pub fn header_candidates(&self) -> &'static [&'static str] {
        match self {
            Field::Gross => &["ganhos brutos", "bruto", "gross", "total earnings"],
            Field::Net => &["ganhos l\u{ed}quidos", "l\u{ed}quido", "liquido", "net"],
            Field::Tips => &["gorjeta", "tip"],
            Field::Bonuses => &["b\u{f3}nus", "bonus", "campanha", "incentivo"],
            Field::Fees => &["taxa", "comiss", "fee", "servi\u{e7}o"],
            Field::FuelLiters => &["litros", "combust\u{ed}vel", "fuel", "liters"],
            Field::Kwh => &["kwh", "energia", "carregamento"],
            Field::Tolls => &["portagem", "portagens", "toll", "via verde"],
        }
    }

    pub fn assign(&self, report: &mut RawReport, value: f64) {
        let slot = match self {
            Field::Gross => &mut report.gross_earnings,
            Field::Net => &mut report.net_earnings,
            Field::Tips => &mut report.tips,
            Field::Bonuses => &mut report.bonuses,
            Field::Fees => &mut report.fees,
            Field::FuelLiters => &mut report.fuel_liters,
            Field::Kwh => &mut report.kwh,
            Field::Tolls => &mut report.toll_amount,
        };
        *slot += value;
    }

    /// Whether a lowercased header matches this field.
    pub fn matches_header(&self, header: &str) -> bool {
        self.header_candidates()
            .iter()
            .any(|candidate| header.contains(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuzzy_header_matching_is_contains_based() {
        assert!(Field::Net.matches_header("ganhos l\u{ed}quidos|\u{20ac}"));
        assert!(Field::Tolls.matches_header("total portagens (\u{20ac})"));
        assert!(!Field::Tips.matches_header("ganhos brutos"));
    }

    #[test]
    fn assign_accumulates_across_rows() {
        let mut report = RawReport::default();
        Field::Gross.assign(&mut report, 10.0);
        Field::Gross.assign(&mut report, 5.5);
        assert_eq!(report.gross_earnings, 15.5);
    }
}
