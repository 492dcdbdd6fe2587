//! Fingerprint profile applied to every session page.
//!
//! Target portals fingerprint automation aggressively; sessions present a
//! consistent desktop profile (user agent, locale, timezone, viewport) and
//! suppress the obvious automation markers.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 768,
            device_scale_factor: 1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionProfile {
    pub user_agent: String,
    pub accept_language: String,
    pub locale: String,
    pub timezone: String,
    pub viewport: Viewport,
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self {
            user_agent: concat!(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36"
            )
            .to_string(),
            accept_language: "pt-PT,pt;q=0.9,en;q=0.8".to_string(),
            locale: "pt-PT".to_string(),
            timezone: "Europe/Lisbon".to_string(),
            viewport: Viewport::default(),
        }
    }
}

/// Chrome launch flags that strip automation fingerprints and keep a
/// persistent profile quiet. Mirrors what the portals tolerate in practice.
pub fn launch_args(headless: bool) -> Vec<&'static str> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled",
        "--disable-background-networking",
        "--disable-background-timer-throttling",
        "--disable-breakpad",
        "--disable-client-side-phishing-detection",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-hang-monitor",
        "--disable-popup-blocking",
        "--disable-prompt-on-repost",
        "--disable-sync",
        "--metrics-recording-only",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--use-mock-keychain",
    ];
    if headless {
        args.push("--headless=new");
        args.push("--hide-scrollbars");
        args.push("--mute-audio");
    }
    args
}

/// Script evaluated on every new document to hide `navigator.webdriver`.
pub const WEBDRIVER_PATCH: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";
