use serde::{Deserialize, Serialize};

/// Environment-driven configuration.
///
/// Missing or placeholder values do not fail startup; the dependent feature
/// returns a configuration error on first use instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_assistant_id: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_price_subscription: String,
    pub stripe_price_credits: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub environment: String,
}

/// Values such as "your_openai_api_key_here" left over from an .env template
/// count as unset.
fn is_placeholder(value: &str) -> bool {
    value.is_empty() || value.starts_with("your_")
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(name)
                .filter(|v| !is_placeholder(v))
                .unwrap_or_default()
        };

        Self {
            openai_api_key: var("OPENAI_API_KEY"),
            openai_assistant_id: var("OPENAI_ASSISTANT_ID"),
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            stripe_price_subscription: var("STRIPE_PRICE_SUBSCRIPTION"),
            stripe_price_credits: var("STRIPE_PRICE_CREDITS"),
            supabase_url: lookup("SUPABASE_URL")
                .filter(|v| !is_placeholder(v))
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            supabase_anon_key: var("SUPABASE_ANON_KEY"),
            supabase_service_role_key: var("SUPABASE_SERVICE_ROLE_KEY"),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
        }
    }

    /// Whether the OpenAI credential is usable.
    pub fn openai_configured(&self) -> bool {
        !self.openai_api_key.is_empty()
    }

    /// Whether the assistant itself is addressable.
    pub fn assistant_configured(&self) -> bool {
        self.openai_configured() && !self.openai_assistant_id.is_empty()
    }

    pub fn database_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn webhook_configured(&self) -> bool {
        !self.stripe_webhook_secret.is_empty()
    }
}
