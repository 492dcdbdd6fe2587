//! OAuth2 client-credentials access to platforms with an official API.
//!
//! Platforms that publish a partner API skip the browser path entirely; this
//! client fetches the same figures over HTTP and maps them into the common
//! [`NormalizedFinancialRecord`] shape.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use fleetsync_core_types::platform::DirectApiConfig;
use fleetsync_core_types::{NormalizedFinancialRecord, Period, PlatformId, TenantId};

/// Tokens are refreshed this long before their reported expiry.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Fixed backoff before the single retry after a 429.
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("token endpoint rejected the request ({status}): {body}")]
    Token { status: StatusCode, body: String },
    #[error("http transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode upstream payload: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Clone, Debug)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Earnings payload as the partner APIs return it. Absent fields default to
/// zero so sparse responses still normalize.
#[derive(Debug, Default, Deserialize)]
struct EarningsPayload {
    #[serde(default)]
    gross_earnings: f64,
    #[serde(default)]
    net_earnings: f64,
    #[serde(default)]
    tips: f64,
    #[serde(default)]
    bonuses: f64,
    #[serde(default)]
    fees: f64,
    #[serde(default)]
    fuel_liters: f64,
    #[serde(default)]
    kwh: f64,
    #[serde(default)]
    toll_amount: f64,
    #[serde(default)]
    entry_count: usize,
}

/// Authenticated client for one platform's partner API.
pub struct DirectApiClient {
    platform_id: PlatformId,
    config: DirectApiConfig,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl DirectApiClient {
    pub fn new(
        platform_id: PlatformId,
        config: DirectApiConfig,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            platform_id,
            config,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    /// Current access token, fetching a new one when the cached token is
    /// missing or within the refresh margin of expiry.
    pub async fn get_access_token(&self) -> Result<String, UpstreamError> {
        if let Some(cached) = self.token.lock().as_ref() {
            if cached.is_fresh(Utc::now()) {
                return Ok(cached.access_token.clone());
            }
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> Result<String, UpstreamError> {
        let mut params = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ];
        if let Some(scope) = &self.config.scope {
            params.push(("scope", scope.clone()));
        }

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(UpstreamError::Token { status, body });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        if let Some(error) = parsed.error {
            let description = parsed.error_description.unwrap_or_default();
            return Err(UpstreamError::Token {
                status,
                body: format!("{error}: {description}"),
            });
        }
        let access_token = parsed.access_token.ok_or_else(|| UpstreamError::Token {
            status,
            body: "token response carried no access_token".into(),
        })?;

        let expires_in = parsed.expires_in.unwrap_or(3600);
        let cached = CachedToken {
            access_token: access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        };
        *self.token.lock() = Some(cached);

        debug!(
            target: "api-client",
            platform = %self.platform_id,
            expires_in,
            "obtained access token"
        );
        Ok(access_token)
    }

    /// Issue an authenticated request against the platform API.
    ///
    /// A 401 forces one token refresh and one retry; a 429 waits a fixed
    /// backoff and retries once. Any other failure surfaces as
    /// [`UpstreamError`].
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, UpstreamError> {
        let url = format!(
            "{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );

        let mut token = self.get_access_token().await?;
        let mut refreshed = false;
        let mut backed_off = false;

        loop {
            let response = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .query(params)
                .send()
                .await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !refreshed {
                warn!(
                    target: "api-client",
                    platform = %self.platform_id,
                    "access token rejected, refreshing once"
                );
                *self.token.lock() = None;
                token = self.refresh_token().await?;
                refreshed = true;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS && !backed_off {
                warn!(
                    target: "api-client",
                    platform = %self.platform_id,
                    backoff_ms = RATE_LIMIT_BACKOFF.as_millis() as u64,
                    "rate limited, retrying once"
                );
                tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                backed_off = true;
                continue;
            }

            let body = response.text().await?;
            if !status.is_success() {
                return Err(UpstreamError::Status { status, body });
            }
            return Ok(serde_json::from_str(&body)?);
        }
    }

    /// Fetch earnings for a period and map them into the normalized record.
    pub async fn fetch_earnings(
        &self,
        tenant_id: &TenantId,
        period: Period,
    ) -> Result<NormalizedFinancialRecord, UpstreamError> {
        let params = [
            ("start_date", period.start.format("%Y-%m-%d").to_string()),
            ("end_date", period.end.format("%Y-%m-%d").to_string()),
        ];
        let payload = self.request(Method::GET, "earnings", &params).await?;
        let earnings: EarningsPayload = serde_json::from_value(payload)?;
        Ok(map_earnings(
            &self.platform_id,
            tenant_id,
            period,
            &earnings,
        ))
    }

    #[cfg(test)]
    fn seed_token(&self, access_token: &str, expires_at: DateTime<Utc>) {
        *self.token.lock() = Some(CachedToken {
            access_token: access_token.into(),
            expires_at,
        });
    }
}

fn map_earnings(
    platform_id: &PlatformId,
    tenant_id: &TenantId,
    period: Period,
    payload: &EarningsPayload,
) -> NormalizedFinancialRecord {
    let mut record =
        NormalizedFinancialRecord::empty(platform_id.clone(), tenant_id.clone(), period);
    record.gross_earnings = payload.gross_earnings;
    record.net_earnings = payload.net_earnings;
    record.tips = payload.tips;
    record.bonuses = payload.bonuses;
    record.fees = payload.fees;
    record.fuel_liters = payload.fuel_liters;
    record.kwh = payload.kwh;
    record.toll_amount = payload.toll_amount;
    record.raw_row_count = payload.entry_count;
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn client() -> DirectApiClient {
        DirectApiClient::new(
            PlatformId::new("uber"),
            DirectApiConfig {
                token_url: "https://auth.example.com/oauth/token".into(),
                api_base_url: "https://api.example.com/v1/".into(),
                scope: Some("partner.payments".into()),
            },
            "client-id",
            "client-secret",
        )
    }

    fn period() -> Period {
        Period::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
        )
    }

    #[tokio::test]
    async fn fresh_cached_token_is_served_without_a_network_call() {
        let client = client();
        client.seed_token("tok-1", Utc::now() + chrono::Duration::hours(1));

        let token = client.get_access_token().await.unwrap();
        assert_eq!(token, "tok-1");
    }

    #[test]
    fn token_within_refresh_margin_counts_as_stale() {
        let now = Utc::now();
        let stale = CachedToken {
            access_token: "tok".into(),
            expires_at: now + chrono::Duration::seconds(REFRESH_MARGIN_SECS - 5),
        };
        let fresh = CachedToken {
            access_token: "tok".into(),
            expires_at: now + chrono::Duration::seconds(REFRESH_MARGIN_SECS + 300),
        };
        assert!(!stale.is_fresh(now));
        assert!(fresh.is_fresh(now));
    }

    #[test]
    fn sparse_earnings_payload_maps_with_zero_defaults() {
        let payload: EarningsPayload =
            serde_json::from_str(r#"{"net_earnings": 1234.56, "entry_count": 3}"#).unwrap();
        let record = map_earnings(
            &PlatformId::new("uber"),
            &TenantId::new("fleet-1"),
            period(),
            &payload,
        );
        assert_eq!(record.net_earnings, 1234.56);
        assert_eq!(record.gross_earnings, 0.0);
        assert_eq!(record.raw_row_count, 3);
        assert_eq!(record.period, period());
    }

    #[test]
    fn token_error_payload_shape_is_recognized() {
        let parsed: TokenResponse = serde_json::from_str(
            r#"{"error": "invalid_client", "error_description": "bad secret"}"#,
        )
        .unwrap();
        assert_eq!(parsed.error.as_deref(), Some("invalid_client"));
        assert!(parsed.access_token.is_none());
    }
}
