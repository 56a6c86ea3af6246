use crate::errors::{AssistantError, CalendarApiError, CompletionError, GmailApiError};
use log::{debug, error};
use mcp_attr::jsoncall::ErrorCode;
use mcp_attr::Error as McpError;

/// Error codes returned by the assistant MCP server
pub mod error_codes {
    /// General application errors for unspecified issues
    pub const GENERAL_ERROR: u32 = 1000;

    /// Configuration related errors (environment variables, etc.)
    pub const CONFIG_ERROR: u32 = 1001;

    /// Authentication errors (missing or revoked Google credentials)
    pub const AUTH_ERROR: u32 = 1002;

    /// API errors from Gmail or Calendar
    pub const API_ERROR: u32 = 1003;

    /// Conversation, draft, persona or event does not exist
    pub const NOT_FOUND_ERROR: u32 = 1004;

    /// Message format/missing field errors
    pub const MESSAGE_FORMAT_ERROR: u32 = 1005;

    /// Rejected tool arguments
    pub const INVALID_INPUT_ERROR: u32 = 1006;

    /// Text generation failures
    pub const COMPLETION_ERROR: u32 = 1007;

    pub fn get_error_description(code: u32) -> &'static str {
        match code {
            CONFIG_ERROR => "Configuration Error: Missing or invalid environment variables",
            AUTH_ERROR => "Authentication Error: Google credentials are missing, expired or revoked",
            API_ERROR => "Google API Error: The request to the Gmail or Calendar API failed",
            NOT_FOUND_ERROR => "Not Found: The referenced record does not exist",
            MESSAGE_FORMAT_ERROR => "Message Format Error: The API response has missing or invalid fields",
            INVALID_INPUT_ERROR => "Invalid Input: The tool arguments were rejected",
            COMPLETION_ERROR => "Completion Error: The text generation service failed",
            GENERAL_ERROR => "General Error: An unspecified error occurred in the assistant server",
            _ => "Unknown Error: An unclassified error occurred",
        }
    }

    pub fn get_troubleshooting_steps(code: u32) -> &'static str {
        match code {
            CONFIG_ERROR => "Check that GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET are set in your .env file or exported in your shell.",
            AUTH_ERROR => "Link your Google account again with the 'auth' command. Your refresh token may have expired or been revoked.",
            API_ERROR => "The Google API request failed. Check your internet connection and review the specific error details.",
            NOT_FOUND_ERROR => "Verify the id you passed. Drafts and conversations only live as long as the server process.",
            MESSAGE_FORMAT_ERROR => "The API returned data in an unexpected format. Retry the request or report the message id.",
            INVALID_INPUT_ERROR => "Review the tool arguments and try again.",
            COMPLETION_ERROR => "Check OPENAI_API_KEY and OPENAI_MODEL, then retry.",
            GENERAL_ERROR => "Review server logs for more details about what went wrong.",
            _ => "Check the server logs for more specific error information.",
        }
    }
}

/// Creates a detailed McpError with the error code, description and troubleshooting steps.
pub fn to_mcp_error(message: &str, code: u32) -> McpError {
    use error_codes::{get_error_description, get_troubleshooting_steps};

    let detailed_error = format!(
        "ERROR CODE {}: {}\n\nDETAILS: {}\n\nTROUBLESHOOTING: {}",
        code,
        get_error_description(code),
        message,
        get_troubleshooting_steps(code)
    );

    error!("Creating MCP error: {} (code: {})", message, code);

    McpError::new(ErrorCode(code as i64)).with_message(detailed_error, true)
}

pub fn map_gmail_error(err: &GmailApiError) -> McpError {
    let code = match err {
        GmailApiError::AuthError(_) => error_codes::AUTH_ERROR,
        GmailApiError::MessageFormatError(_) => error_codes::MESSAGE_FORMAT_ERROR,
        GmailApiError::MessageNotFound(_) => error_codes::NOT_FOUND_ERROR,
        GmailApiError::ApiError(_)
        | GmailApiError::MessageRetrievalError(_)
        | GmailApiError::NetworkError(_)
        | GmailApiError::RateLimitError(_) => error_codes::API_ERROR,
    };
    to_mcp_error(&err.to_string(), code)
}

pub fn map_assistant_error(err: &AssistantError) -> McpError {
    match err {
        AssistantError::CredentialsMissing(_) => {
            to_mcp_error(&err.to_string(), error_codes::AUTH_ERROR)
        }
        AssistantError::NotFound { .. } => to_mcp_error(&err.to_string(), error_codes::NOT_FOUND_ERROR),
        AssistantError::InvalidInput(_) => {
            to_mcp_error(&err.to_string(), error_codes::INVALID_INPUT_ERROR)
        }
        AssistantError::Gmail(e) => map_gmail_error(e),
        AssistantError::Calendar(CalendarApiError::AuthError(msg)) => {
            to_mcp_error(msg, error_codes::AUTH_ERROR)
        }
        AssistantError::Calendar(e) => to_mcp_error(&e.to_string(), error_codes::API_ERROR),
        AssistantError::Completion(CompletionError::MissingApiKey) => {
            to_mcp_error(&err.to_string(), error_codes::CONFIG_ERROR)
        }
        AssistantError::Completion(e) => to_mcp_error(&e.to_string(), error_codes::COMPLETION_ERROR),
        AssistantError::Config(e) => to_mcp_error(&e.to_string(), error_codes::CONFIG_ERROR),
    }
}

/// Converts a serde_json::Value (string or number) to u32 with a default value
pub fn parse_max_results(value: Option<serde_json::Value>, default: u32) -> u32 {
    match value {
        Some(serde_json::Value::Number(num)) => match num.as_u64() {
            Some(n) if n <= u32::MAX as u64 => n as u32,
            _ => {
                debug!("Number not convertible to u32, using default {}", default);
                default
            }
        },
        Some(serde_json::Value::String(s)) => s.trim().parse::<u32>().unwrap_or_else(|_| {
            debug!("Could not parse string '{}' as u32, using default {}", s, default);
            default
        }),
        Some(other) => {
            debug!(
                "Unexpected value type for max_results: {:?}, using default {}",
                other, default
            );
            default
        }
        None => default,
    }
}

/// Reads a record id passed either as a number or as a numeric string.
pub fn parse_id(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(num) => num.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

pub fn encode_base64_url_safe(data: &[u8]) -> String {
    base64::encode_config(data, base64::URL_SAFE)
}

/// Decodes standard or URL-safe base64, with or without padding.
pub fn decode_base64(data: &str) -> Result<String, String> {
    let normalized: String = data
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    let bytes = base64::decode_config(&normalized, base64::URL_SAFE_NO_PAD)
        .map_err(|e| format!("Base64 decode error: {}", e))?;
    String::from_utf8(bytes).map_err(|e| format!("UTF-8 decode error: {}", e))
}

/// Keeps enough of a secret to recognise it in logs without disclosing it.
pub fn truncate_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "<short-secret>".to_string()
    }
}
