//! Platform-agnostic financial output.

use serde::{Deserialize, Serialize};

use crate::{Period, PlatformId, TenantId};

/// Common output of the report normalizer, regardless of which platform or
/// file format produced it.
///
/// `net_earnings` is always derived from the platform-specific gross/fee
/// fields with a fixed per-platform formula; it is never stored without the
/// inputs that justify it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFinancialRecord {
    pub platform: PlatformId,
    pub tenant_id: TenantId,
    pub period: Period,
    pub gross_earnings: f64,
    pub net_earnings: f64,
    pub tips: f64,
    pub bonuses: f64,
    pub fees: f64,
    pub fuel_liters: f64,
    pub kwh: f64,
    pub toll_amount: f64,
    pub raw_row_count: usize,
}

impl NormalizedFinancialRecord {
    pub fn empty(platform: PlatformId, tenant_id: TenantId, period: Period) -> Self {
        Self {
            platform,
            tenant_id,
            period,
            gross_earnings: 0.0,
            net_earnings: 0.0,
            tips: 0.0,
            bonuses: 0.0,
            fees: 0.0,
            fuel_liters: 0.0,
            kwh: 0.0,
            toll_amount: 0.0,
            raw_row_count: 0,
        }
    }
}
