/// Core error types for the companion backend.
#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Assistant error: {0}")]
    Assistant(#[from] AssistantError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("OpenAI API key not configured")]
    NoApiKey,

    #[error("OpenAI Assistant ID not configured")]
    NoAssistantId,

    #[error("Supabase credentials not configured")]
    NoDatabase,

    #[error("Stripe webhook secret not configured")]
    NoWebhookSecret,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header missing or malformed")]
    MissingBearer,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Identity lookup failed: {0}")]
    Lookup(String),

    #[error("Resource does not belong to the caller")]
    Forbidden,
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse row: {0}")]
    Parse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing Stripe signature header")]
    MissingSignature,

    #[error("Invalid Stripe signature")]
    InvalidSignature,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, CompanionError>;
