/// Template-send API settings. Every credential comes from the environment.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub service_id: String,
    pub public_key: String,
    pub private_key: Option<String>,
    pub templates: EmailTemplates,
}

/// Template id per outbound message kind
#[derive(Debug, Clone)]
pub struct EmailTemplates {
    pub registration: String,
    pub payment_pending: String,
    pub admin_payment: String,
    pub payment_confirmed: String,
    pub payment_rejected: String,
    pub membership_request: String,
    pub admin_membership: String,
    pub membership_approved: String,
    pub membership_rejected: String,
    pub custom: String,
}

impl EmailTemplates {
    /// Template ids read from `EMAIL_TEMPLATE_*`, falling back to `fallback`
    fn from_env(fallback: &str) -> Self {
        let var = |name: &str| {
            std::env::var(format!("EMAIL_TEMPLATE_{}", name)).unwrap_or_else(|_| fallback.to_string())
        };
        Self {
            registration: var("REGISTRATION"),
            payment_pending: var("PAYMENT_PENDING"),
            admin_payment: var("ADMIN_PAYMENT"),
            payment_confirmed: var("PAYMENT_CONFIRMED"),
            payment_rejected: var("PAYMENT_REJECTED"),
            membership_request: var("MEMBERSHIP_REQUEST"),
            admin_membership: var("ADMIN_MEMBERSHIP"),
            membership_approved: var("MEMBERSHIP_APPROVED"),
            membership_rejected: var("MEMBERSHIP_REJECTED"),
            custom: var("CUSTOM"),
        }
    }

    /// Same template for every message kind
    pub fn uniform(template_id: &str) -> Self {
        Self {
            registration: template_id.to_string(),
            payment_pending: template_id.to_string(),
            admin_payment: template_id.to_string(),
            payment_confirmed: template_id.to_string(),
            payment_rejected: template_id.to_string(),
            membership_request: template_id.to_string(),
            admin_membership: template_id.to_string(),
            membership_approved: template_id.to_string(),
            membership_rejected: template_id.to_string(),
            custom: template_id.to_string(),
        }
    }
}

impl EmailConfig {
    /// Returns None when the email service is not configured
    pub fn from_env() -> Option<Self> {
        let service_id = std::env::var("EMAIL_SERVICE_ID").ok()?;
        let public_key = std::env::var("EMAIL_PUBLIC_KEY").ok()?;
        let private_key = std::env::var("EMAIL_PRIVATE_KEY").ok();
        let api_url = std::env::var("EMAIL_API_URL")
            .unwrap_or_else(|_| "https://api.emailjs.com/api/v1.0/email/send".to_string());
        let default_template =
            std::env::var("EMAIL_TEMPLATE_DEFAULT").unwrap_or_else(|_| "template_default".to_string());

        Some(Self {
            api_url,
            service_id,
            public_key,
            private_key,
            templates: EmailTemplates::from_env(&default_template),
        })
    }
}
