//! Numeric normalization for monetary cells.

/// Parse an amount the way the portals print them: currency symbols and
/// grouping dots stripped, comma decimal separator normalized to a dot.
/// Malformed input yields `0.0`; a single bad cell must not discard a report.
///
/// `"1.234,56 €"` → `1234.56`, `"-12,5"` → `-12.5`, `"n/a"` → `0.0`.
pub fn parse_amount(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if cleaned.is_empty() {
        return 0.0;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');

    let normalized = match (last_comma, last_dot) {
        // Comma is the decimal separator; dots are grouping.
        (Some(comma), Some(dot)) if comma > dot => {
            cleaned.replace('.', "").replace(',', ".")
        }
        // Dot is the decimal separator; commas are grouping.
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    normalized.parse::<f64>().unwrap_or(0.0)
}
