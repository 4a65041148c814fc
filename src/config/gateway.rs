use std::time::Duration;

/// Hosted checkout settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_base: String,
    pub api_key: String,
    pub site_id: String,
    /// Shared secret for webhook signatures; unsigned webhooks are accepted when unset
    pub webhook_secret: Option<String>,
    pub notify_url: String,
    pub return_url: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Returns None when the gateway is not configured
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GATEWAY_API_KEY").ok()?;
        let site_id = std::env::var("GATEWAY_SITE_ID").ok()?;
        let api_base = std::env::var("GATEWAY_API_BASE")
            .unwrap_or_else(|_| "https://api-checkout.cinetpay.com/v2".to_string());
        let base_url = std::env::var("WEB_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        Some(Self {
            api_base,
            api_key,
            site_id,
            webhook_secret: std::env::var("GATEWAY_WEBHOOK_SECRET").ok(),
            notify_url: format!("{}/api/payments/webhook", base_url),
            return_url: format!("{}/pending", base_url),
            timeout: Duration::from_secs(30),
        })
    }
}
