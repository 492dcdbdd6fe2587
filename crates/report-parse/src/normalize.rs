//! Per-platform normalization into the common financial record.

use fleetsync_core_types::{NormalizedFinancialRecord, Period, PlatformId, TenantId};

/// Platforms whose artifacts are expense statements (tolls, fuel, charging)
/// rather than earnings reports. Their totals pass through as costs and the
/// earnings formula is skipped.
const EXPENSE_PLATFORMS: [&str; 3] = ["viaverde", "prio", "miio"];

/// Fold a parsed report into the platform-agnostic record.
///
/// Earnings platforms: net is taken as reported when the portal provides it,
/// otherwise derived as gross + tips + bonuses - fees - tolls. Expense
/// platforms report no earnings at all; their amounts are kept as-is.
/// Pure and deterministic; an unusable report yields an empty record.
pub fn normalize(
    platform: &PlatformId,
    tenant_id: &TenantId,
    period: Period,
    raw: &crate::RawReport,
) -> NormalizedFinancialRecord {
    let mut record =
        NormalizedFinancialRecord::empty(platform.clone(), tenant_id.clone(), period);
    if !raw.is_usable() {
        return record;
    }

    record.gross_earnings = raw.gross_earnings;
    record.tips = raw.tips;
    record.bonuses = raw.bonuses;
    record.fees = raw.fees;
    record.fuel_liters = raw.fuel_liters;
    record.kwh = raw.kwh;
    record.toll_amount = raw.toll_amount;
    record.raw_row_count = raw.raw_row_count;

    record.net_earnings = if is_expense_platform(platform) {
        0.0
    } else if raw.net_earnings != 0.0 {
        raw.net_earnings
    } else {
        raw.gross_earnings + raw.tips + raw.bonuses - raw.fees - raw.toll_amount
    };

    record
}

fn is_expense_platform(platform: &PlatformId) -> bool {
    EXPENSE_PLATFORMS
        .iter()
        .any(|candidate| platform.as_str().eq_ignore_ascii_case(candidate))
}
