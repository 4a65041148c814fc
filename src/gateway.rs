//! Hosted-checkout payment gateway API (CinetPay-style REST endpoints)

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::{AppError, Result};
use crate::models::{Participant, PaymentStatus};

/// Customer and amount details for a checkout session
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub transaction_id: &'a str,
    pub amount: u64,
    pub currency: &'a str,
    pub description: String,
    pub participant: &'a Participant,
    pub return_url: String,
}

#[derive(Serialize)]
struct InitiateBody<'a> {
    apikey: &'a str,
    site_id: &'a str,
    transaction_id: &'a str,
    amount: u64,
    currency: &'a str,
    description: &'a str,
    customer_name: &'a str,
    customer_surname: &'a str,
    customer_email: &'a str,
    customer_phone_number: &'a str,
    notify_url: &'a str,
    return_url: &'a str,
    channels: &'a str,
}

#[derive(Serialize)]
struct CheckBody<'a> {
    apikey: &'a str,
    site_id: &'a str,
    transaction_id: &'a str,
}

#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    code: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CheckoutSession {
    pub payment_token: String,
    pub payment_url: String,
}

#[derive(Deserialize, Debug)]
struct CheckData {
    status: String,
    #[serde(default)]
    payment_method: Option<String>,
}

/// Payment state as reported by the gateway
#[derive(Debug, Clone, Serialize)]
pub struct RemoteStatus {
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub raw_status: String,
    pub payment_method: Option<String>,
}

fn map_remote_status(raw: &str) -> PaymentStatus {
    match raw {
        "ACCEPTED" => PaymentStatus::Success,
        "REFUSED" | "CANCELED" | "CANCELLED" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

pub struct GatewayClient {
    config: GatewayConfig,
    http_client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Gateway {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { config, http_client })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Open a hosted checkout session
    pub async fn initiate(&self, request: &CheckoutRequest<'_>) -> Result<CheckoutSession> {
        let body = InitiateBody {
            apikey: &self.config.api_key,
            site_id: &self.config.site_id,
            transaction_id: request.transaction_id,
            amount: request.amount,
            currency: request.currency,
            description: &request.description,
            customer_name: &request.participant.last_name,
            customer_surname: &request.participant.first_name,
            customer_email: &request.participant.email,
            customer_phone_number: &request.participant.phone,
            notify_url: &self.config.notify_url,
            return_url: &request.return_url,
            channels: "ALL",
        };

        let response = self
            .http_client
            .post(format!("{}/payment", self.config.api_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Gateway {
                message: if e.is_timeout() {
                    "Payment gateway did not answer within the timeout".to_string()
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        let parsed: ApiResponse<CheckoutSession> = response.json().await.map_err(|e| AppError::Gateway {
            message: format!("Unreadable initiate response ({}): {}", status, e),
        })?;

        if parsed.code != "201" {
            warn!("Gateway refused checkout {}: {} {}", request.transaction_id, parsed.code, parsed.message);
            return Err(AppError::Gateway {
                message: format!("{} ({})", parsed.message, parsed.code),
            });
        }

        parsed.data.ok_or_else(|| AppError::Gateway {
            message: "Initiate response carried no checkout data".to_string(),
        })
    }

    /// Ask the gateway for the current state of a transaction
    pub async fn check(&self, transaction_id: &str) -> Result<RemoteStatus> {
        let body = CheckBody {
            apikey: &self.config.api_key,
            site_id: &self.config.site_id,
            transaction_id,
        };

        let response = self
            .http_client
            .post(format!("{}/payment/check", self.config.api_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Gateway {
                message: e.to_string(),
            })?;

        let parsed: ApiResponse<CheckData> = response.json().await.map_err(|e| AppError::Gateway {
            message: format!("Unreadable check response: {}", e),
        })?;

        debug!("Gateway check {}: code={} message={}", transaction_id, parsed.code, parsed.message);

        let (raw_status, payment_method) = match parsed.data {
            Some(data) => (data.status, data.payment_method),
            None => (parsed.message, None),
        };

        Ok(RemoteStatus {
            transaction_id: transaction_id.to_string(),
            status: map_remote_status(&raw_status),
            raw_status,
            payment_method,
        })
    }
}

/// Constant-time check of a hex HMAC-SHA256 signature over the raw body
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Transaction id from a webhook body, form-encoded or JSON
pub fn parse_transaction_id(body: &[u8]) -> Option<String> {
    const KEYS: [&str; 2] = ["cpm_trans_id", "transaction_id"];

    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        return KEYS
            .iter()
            .find_map(|k| json.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string);
    }

    let text = std::str::from_utf8(body).ok()?;
    text.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if KEYS.contains(&key) {
            urlencoding::decode(&value.replace('+', " "))
                .ok()
                .map(|v| v.into_owned())
                .filter(|v| !v.is_empty())
        } else {
            None
        }
    })
}
