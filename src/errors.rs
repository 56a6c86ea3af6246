use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Environment error: {0}")]
    EnvError(#[from] env::VarError),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

// Gmail API error types. RateLimitError is the only variant the batch
// fetcher retries. MessageNotFound is the only per-message failure that
// still leaves a scan complete.
#[derive(Debug, Clone, Error)]
pub enum GmailApiError {
    #[error("Gmail API error: {0}")]
    ApiError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Message retrieval error: {0}")]
    MessageRetrievalError(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Message format error: {0}")]
    MessageFormatError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limit error: {0}")]
    RateLimitError(String),
}

impl GmailApiError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, GmailApiError::RateLimitError(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GmailApiError::MessageNotFound(_))
    }
}

pub type GmailResult<T> = std::result::Result<T, GmailApiError>;

#[derive(Debug, Error)]
pub enum CalendarApiError {
    #[error("Calendar API error: {0}")]
    ApiError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Event format error: {0}")]
    EventFormatError(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

pub type CalendarResult<T> = std::result::Result<T, CalendarApiError>;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Completion API key is not configured")]
    MissingApiKey,

    #[error("Completion API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Empty completion returned by the model")]
    EmptyResponse,
}

/// Domain errors surfaced to callers of the assistant operations.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Google credentials not found for user {0}")]
    CredentialsMissing(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Gmail(#[from] GmailApiError),

    #[error(transparent)]
    Calendar(#[from] CalendarApiError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AssistantError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        AssistantError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type AssistantResult<T> = std::result::Result<T, AssistantError>;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Invalid redirect URI '{0}'")]
    InvalidRedirectUri(String),

    #[error("OAuth callback server error: {0}")]
    Server(#[source] std::io::Error),

    #[error("Timed out waiting for the OAuth callback")]
    CallbackTimeout,

    #[error("OAuth state mismatch, possible CSRF attempt")]
    StateMismatch,

    #[error("Authorization was denied: {0}")]
    Denied(String),

    #[error("Google did not return a refresh token; revoke the app's access and try again")]
    NoRefreshToken,

    #[error(transparent)]
    Token(#[from] GmailApiError),

    #[error("Could not store credentials: {0}")]
    Storage(#[source] std::io::Error),
}
