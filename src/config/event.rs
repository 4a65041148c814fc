use serde::{Deserialize, Serialize};

/// Event settings shared by every workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Human-readable event name used in emails and pages
    pub event_name: String,

    /// Price of one place, in whole currency units
    #[serde(default = "default_unit_price")]
    pub unit_price: u64,

    /// ISO currency code
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Maximum places one payment may cover
    #[serde(default = "default_max_places")]
    pub max_places: u8,

    /// Address that receives admin notifications
    #[serde(default)]
    pub admin_email: String,

    /// Public QR rendering API; the QR id is appended as `data`
    #[serde(default = "default_qr_api_base")]
    pub qr_api_base: String,

    /// Public base URL of this service, used in links sent to participants
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_unit_price() -> u64 {
    5000
}

fn default_currency() -> String {
    "XOF".to_string()
}

fn default_max_places() -> u8 {
    10
}

fn default_qr_api_base() -> String {
    "https://api.qrserver.com/v1/create-qr-code/".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            event_name: "Annual Gala".to_string(),
            unit_price: default_unit_price(),
            currency: default_currency(),
            max_places: default_max_places(),
            admin_email: String::new(),
            qr_api_base: default_qr_api_base(),
            public_base_url: default_public_base_url(),
        }
    }
}

impl EventConfig {
    /// Load an event config from a JSON file
    pub fn load_from_file(path: &str) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| crate::error::AppError::ConfigLoad {
            path: path.to_string(),
            source: e,
        })?;

        let config: EventConfig = serde_json::from_str(&content).map_err(|e| {
            crate::error::AppError::ConfigParse {
                path: path.to_string(),
                source: e,
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides on top of file or default values
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(name) = std::env::var("EVENT_NAME") {
            self.event_name = name;
        }
        if let Some(price) = std::env::var("EVENT_UNIT_PRICE")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.unit_price = price;
        }
        if let Ok(currency) = std::env::var("EVENT_CURRENCY") {
            self.currency = currency;
        }
        if let Ok(email) = std::env::var("ADMIN_NOTIFICATION_EMAIL") {
            self.admin_email = email;
        }
        if let Ok(url) = std::env::var("WEB_BASE_URL") {
            self.public_base_url = url;
        }
        self
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.unit_price == 0 {
            return Err(crate::error::AppError::ConfigValidation {
                message: "unit_price must be greater than zero".to_string(),
            });
        }
        if self.max_places == 0 {
            return Err(crate::error::AppError::ConfigValidation {
                message: "max_places must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// URL of a rendered QR image for a ticket id
    pub fn qr_image_url(&self, qr_code_id: &str) -> String {
        format!(
            "{}?size=300x300&data={}",
            self.qr_api_base,
            urlencoding::encode(qr_code_id)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_defaults() {
        let json = r#"{ "event_name": "Gala 2026" }"#;
        let config: EventConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.event_name, "Gala 2026");
        assert_eq!(config.unit_price, 5000);
        assert_eq!(config.max_places, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_price_is_invalid() {
        let json = r#"{ "event_name": "Gala", "unit_price": 0 }"#;
        let config: EventConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_qr_image_url_is_encoded() {
        let config = EventConfig::default();
        assert_eq!(
            config.qr_image_url("EVT-AB 12"),
            "https://api.qrserver.com/v1/create-qr-code/?size=300x300&data=EVT-AB%2012"
        );
    }
}
