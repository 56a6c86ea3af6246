use crate::auth::TokenManager;
use crate::config::{GMAIL_API_BASE_URL, GMAIL_BATCH_URL};
use crate::errors::{GmailApiError, GmailResult};
use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

type Result<T> = GmailResult<T>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: Option<String>,
}

/// One page of a `messages.list` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub result_size_estimate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// The header metadata of one message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageHeaders {
    pub id: String,
    pub headers: Vec<MessageHeader>,
}

impl MessageHeaders {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(MessageHeader {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Values of every header with this name, compared case-insensitively.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    #[serde(default)]
    payload: Option<RawPayload>,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
}

impl From<RawMessage> for MessageHeaders {
    fn from(raw: RawMessage) -> Self {
        MessageHeaders {
            id: raw.id,
            headers: raw.payload.map(|p| p.headers).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailProfile {
    pub email_address: String,
    #[serde(default)]
    pub messages_total: u64,
    #[serde(default)]
    pub threads_total: u64,
}

/// The mailbox operations contact resolution and sending rely on.
///
/// `batch_get` reports a rate limit on any part as a batch-level
/// `RateLimitError` so the caller can retry the batch as a whole; other
/// per-message failures come back as individual `Err` items.
#[async_trait]
pub trait MailboxProvider: Send + Sync {
    async fn list_messages(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessagePage>;

    async fn batch_get(&self, ids: &[String]) -> Result<Vec<Result<MessageHeaders>>>;

    /// Sends a base64url-encoded RFC 822 message and returns the new message id.
    async fn send_raw(&self, raw: &str) -> Result<String>;
}

pub struct GmailClient {
    client: Client,
    token_manager: Mutex<TokenManager>,
    api_base: String,
    batch_url: String,
}

impl GmailClient {
    pub fn new(token_manager: TokenManager) -> Self {
        Self {
            client: Client::new(),
            token_manager: Mutex::new(token_manager),
            api_base: GMAIL_API_BASE_URL.to_string(),
            batch_url: GMAIL_BATCH_URL.to_string(),
        }
    }

    /// Overrides the REST and batch endpoints (used against mock servers).
    pub fn with_endpoints(mut self, api_base: impl Into<String>, batch_url: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.batch_url = batch_url.into();
        self
    }

    async fn token(&self) -> Result<String> {
        let mut manager = self.token_manager.lock().await;
        manager.get_token(&self.client).await
    }

    pub async fn get_profile(&self) -> Result<GmailProfile> {
        let token = self.token().await?;
        let url = format!("{}/users/me/profile", self.api_base);
        debug!("Fetching Gmail profile from {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| GmailApiError::MessageFormatError(format!("Invalid profile response: {}", e)))
    }
}

#[async_trait]
impl MailboxProvider for GmailClient {
    async fn list_messages(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessagePage> {
        let token = self.token().await?;
        let url = format!("{}/users/me/messages", self.api_base);

        let mut params = vec![("maxResults", max_results.to_string())];
        if let Some(q) = query {
            params.push(("q", q.to_string()));
        }
        if let Some(t) = page_token {
            params.push(("pageToken", t.to_string()));
        }

        debug!(
            "Listing messages (query={:?}, page_token={:?}, max_results={})",
            query, page_token, max_results
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&params)
            .send()
            .await
            .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("Message list failed with status {}: {}", status, body);
            return Err(status_error(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| GmailApiError::MessageFormatError(format!("Invalid list response: {}", e)))
    }

    async fn batch_get(&self, ids: &[String]) -> Result<Vec<Result<MessageHeaders>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let token = self.token().await?;
        let boundary = format!("batch_{}", uuid::Uuid::new_v4().simple());
        let body = build_batch_body(&boundary, ids);

        debug!("Sending batch request for {} messages", ids.len());

        let response = self
            .client
            .post(&self.batch_url)
            .bearer_auth(&token)
            .header(
                "Content-Type",
                format!("multipart/mixed; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        let response_boundary = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(boundary_from_content_type);
        let text = response
            .text()
            .await
            .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            warn!("Batch request failed with status {}", status);
            return Err(status_error(status, &text));
        }

        let response_boundary = response_boundary.ok_or_else(|| {
            GmailApiError::MessageFormatError("Batch response has no multipart boundary".to_string())
        })?;

        parse_batch_response(&text, &response_boundary, ids)
    }

    async fn send_raw(&self, raw: &str) -> Result<String> {
        let token = self.token().await?;
        let url = format!("{}/users/me/messages/send", self.api_base);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("Sending message failed with status {}: {}", status, body);
            return Err(status_error(status, &body));
        }

        let sent: MessageRef = serde_json::from_str(&body)
            .map_err(|e| GmailApiError::MessageFormatError(format!("Invalid send response: {}", e)))?;
        Ok(sent.id)
    }
}

/// Maps a non-success HTTP status to an error, recognising both 429 and the
/// 403 `rateLimitExceeded` form Gmail uses for per-user quotas.
pub fn status_error(status: StatusCode, body: &str) -> GmailApiError {
    let rate_limited_403 = status == StatusCode::FORBIDDEN
        && (body.contains("rateLimitExceeded") || body.contains("userRateLimitExceeded"));

    if status == StatusCode::TOO_MANY_REQUESTS || rate_limited_403 {
        GmailApiError::RateLimitError(format!("HTTP {}", status.as_u16()))
    } else if status == StatusCode::UNAUTHORIZED {
        GmailApiError::AuthError(format!("HTTP {}: {}", status.as_u16(), body))
    } else if status == StatusCode::NOT_FOUND {
        GmailApiError::MessageNotFound(format!("HTTP {}", status.as_u16()))
    } else {
        GmailApiError::ApiError(format!("HTTP {}: {}", status.as_u16(), body))
    }
}

pub fn build_batch_body(boundary: &str, ids: &[String]) -> String {
    let mut body = String::new();
    for (i, id) in ids.iter().enumerate() {
        body.push_str(&format!("--{}\r\n", boundary));
        body.push_str("Content-Type: application/http\r\n");
        body.push_str(&format!("Content-ID: <item{}>\r\n\r\n", i + 1));
        body.push_str(&format!(
            "GET /gmail/v1/users/me/messages/{}?format=metadata&metadataHeaders=From&metadataHeaders=To HTTP/1.1\r\n\r\n",
            urlencoding::encode(id)
        ));
    }
    body.push_str(&format!("--{}--\r\n", boundary));
    body
}

pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// Splits a multipart batch response into one result per requested id.
///
/// Parts are matched to ids through their `Content-ID` (`<response-itemN>`),
/// or by position when a part carries none. A part whose `Content-ID` names
/// no requested item is ignored. Ids with no part in the response become
/// errors. A rate-limited part fails the whole batch so it is retried.
pub fn parse_batch_response(
    body: &str,
    boundary: &str,
    ids: &[String],
) -> Result<Vec<Result<MessageHeaders>>> {
    let normalized = body.replace("\r\n", "\n");
    let delimiter = format!("--{}", boundary);

    let mut slots: Vec<Option<Result<MessageHeaders>>> = vec![None; ids.len()];

    let parts = normalized
        .split(delimiter.as_str())
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "--");

    for (position, part) in parts.enumerate() {
        let index = match content_id(part) {
            Some(value) => match item_index(value).filter(|i| *i < ids.len()) {
                Some(index) => index,
                None => {
                    warn!("Ignoring batch part with unexpected Content-ID {}", value);
                    continue;
                }
            },
            None if position < ids.len() => position,
            None => {
                warn!("Ignoring unexpected extra batch part {}", position + 1);
                continue;
            }
        };
        if slots[index].is_some() {
            warn!("Ignoring duplicate batch part for message {}", ids[index]);
            continue;
        }

        let item = match inner_status(part) {
            Some(code) if (200..300).contains(&code) => match json_body(part) {
                Some(json) => serde_json::from_str::<RawMessage>(json)
                    .map(MessageHeaders::from)
                    .map_err(|e| {
                        GmailApiError::MessageFormatError(format!(
                            "Failed to parse message {}: {}",
                            ids[index], e
                        ))
                    }),
                None => Err(GmailApiError::MessageFormatError(format!(
                    "No JSON body for message {}",
                    ids[index]
                ))),
            },
            Some(code) => Err(part_error(code, part, &ids[index])?),
            None => Err(GmailApiError::MessageFormatError(format!(
                "Missing HTTP status for message {}",
                ids[index]
            ))),
        };
        slots[index] = Some(item);
    }

    Ok(slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.unwrap_or_else(|| {
                Err(GmailApiError::MessageRetrievalError(format!(
                    "No response received for message {}",
                    ids[i]
                )))
            })
        })
        .collect())
}

/// Classifies a failed part like a top-level response. A rate limit comes
/// back as `Err` so the caller abandons the batch.
fn part_error(code: u16, part: &str, id: &str) -> Result<GmailApiError> {
    let error = match StatusCode::from_u16(code) {
        Ok(status) => status_error(status, json_body(part).unwrap_or(part)),
        Err(_) => GmailApiError::MessageFormatError(format!("Invalid HTTP status {}", code)),
    };

    match error {
        GmailApiError::RateLimitError(_) => Err(GmailApiError::RateLimitError(format!(
            "HTTP {} while fetching message {}",
            code, id
        ))),
        GmailApiError::MessageNotFound(_) => Ok(GmailApiError::MessageNotFound(id.to_string())),
        GmailApiError::ApiError(msg) => Ok(GmailApiError::MessageRetrievalError(format!(
            "{} for message {}",
            msg, id
        ))),
        other => Ok(other),
    }
}

fn content_id(part: &str) -> Option<&str> {
    part.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-id")
            .then(|| value.trim())
    })
}

/// `<response-item3>` is index 2.
fn item_index(content_id: &str) -> Option<usize> {
    let pos = content_id.rfind("item")?;
    let digits: String = content_id[pos + 4..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<usize>().ok()?.checked_sub(1)
}

fn inner_status(part: &str) -> Option<u16> {
    let line = part.lines().find(|l| l.starts_with("HTTP/"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

fn json_body(part: &str) -> Option<&str> {
    let start = part.find('{')?;
    let end = part.rfind('}')?;
    (end >= start).then(|| &part[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_from_content_type() {
        assert_eq!(
            boundary_from_content_type("multipart/mixed; boundary=batch_abc"),
            Some("batch_abc".to_string())
        );
        assert_eq!(
            boundary_from_content_type("multipart/mixed; boundary=\"quoted\""),
            Some("quoted".to_string())
        );
        assert_eq!(boundary_from_content_type("application/json"), None);
    }

    #[test]
    fn test_status_error_classification() {
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_rate_limit());
        assert!(status_error(StatusCode::FORBIDDEN, "{\"reason\":\"userRateLimitExceeded\"}").is_rate_limit());
        assert!(!status_error(StatusCode::FORBIDDEN, "{\"reason\":\"insufficientPermissions\"}").is_rate_limit());
        assert!(status_error(StatusCode::NOT_FOUND, "").is_not_found());
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            GmailApiError::AuthError(_)
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            GmailApiError::ApiError(_)
        ));
    }

    #[test]
    fn test_batch_body_has_one_part_per_id() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let body = build_batch_body("xyz", &ids);
        assert_eq!(body.matches("--xyz\r\n").count(), 2);
        assert!(body.contains("Content-ID: <item2>"));
        assert!(body.ends_with("--xyz--\r\n"));
    }
}
