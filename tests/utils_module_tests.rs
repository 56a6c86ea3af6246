/// Utils Module Tests
///
/// Tests for MCP error mapping, argument parsing and base64 helpers.
use gmail_assistant::errors::{AssistantError, CalendarApiError, CompletionError, GmailApiError};
use gmail_assistant::utils::error_codes::{
    get_error_description, API_ERROR, AUTH_ERROR, CONFIG_ERROR, INVALID_INPUT_ERROR, NOT_FOUND_ERROR,
};
use gmail_assistant::utils::{
    decode_base64, encode_base64_url_safe, map_assistant_error, parse_id, parse_max_results, to_mcp_error,
};
use serde_json::json;

fn has_code(err: &mcp_attr::Error, code: u32) -> bool {
    format!("{:?}", err).contains(&code.to_string())
}

#[cfg(test)]
mod utils_tests {
    use super::*;

    #[test]
    fn test_to_mcp_error_includes_code() {
        let err = to_mcp_error("boom", CONFIG_ERROR);
        assert!(has_code(&err, CONFIG_ERROR));
        assert!(get_error_description(CONFIG_ERROR).starts_with("Configuration Error"));
        assert!(get_error_description(9999).starts_with("Unknown Error"));
    }

    #[test]
    fn test_assistant_error_codes() {
        let cases = [
            (AssistantError::CredentialsMissing("me".to_string()), AUTH_ERROR),
            (AssistantError::not_found("Email draft", 7), NOT_FOUND_ERROR),
            (AssistantError::InvalidInput("bad".to_string()), INVALID_INPUT_ERROR),
            (
                AssistantError::Gmail(GmailApiError::RateLimitError("HTTP 429".to_string())),
                API_ERROR,
            ),
            (
                AssistantError::Calendar(CalendarApiError::AuthError("HTTP 401".to_string())),
                AUTH_ERROR,
            ),
            (AssistantError::Completion(CompletionError::MissingApiKey), CONFIG_ERROR),
        ];

        for (err, code) in cases {
            assert!(has_code(&map_assistant_error(&err), code), "{:?}", err);
        }
    }

    #[test]
    fn test_parse_max_results() {
        assert_eq!(parse_max_results(Some(json!(25)), 10), 25);
        assert_eq!(parse_max_results(Some(json!(" 30 ")), 10), 30);
        assert_eq!(parse_max_results(Some(json!("lots")), 10), 10);
        assert_eq!(parse_max_results(Some(json!(true)), 10), 10);
        assert_eq!(parse_max_results(None, 10), 10);
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id(&json!(12)), Some(12));
        assert_eq!(parse_id(&json!("12")), Some(12));
        assert_eq!(parse_id(&json!(-1)), None);
        assert_eq!(parse_id(&json!(null)), None);
    }

    #[test]
    fn test_base64_url_safe_round_trip_of_html() {
        let html = "<p>Café?</p>";
        let encoded = encode_base64_url_safe(html.as_bytes());
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        assert_eq!(decode_base64(&encoded).unwrap(), html);
    }
}
