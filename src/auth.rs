use crate::config::{get_token_expiry_seconds, Config, OAUTH_TOKEN_URL};
use crate::credentials::GoogleCredentials;
use crate::errors::{GmailApiError, GmailResult};
use crate::utils::truncate_secret;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

type Result<T> = GmailResult<T>;

/// Seconds shaved off every reported lifetime so a token is never used in
/// its last minute.
const EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: u64,
}

/// Posts a form to Google's token endpoint and decodes the JSON reply.
///
/// A rejected request is an `AuthError` carrying Google's error body, an
/// undecodable reply an `ApiError`.
pub(crate) async fn post_token_form<T: DeserializeOwned>(
    client: &Client,
    token_url: &str,
    params: &[(&str, &str)],
    purpose: &str,
) -> Result<T> {
    debug!("Requesting {} from {}", purpose, token_url);

    let response = client
        .post(token_url)
        .form(params)
        .send()
        .await
        .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| GmailApiError::NetworkError(e.to_string()))?;

    if !status.is_success() {
        error!("{} failed. Status: {}, Error: {}", purpose, status, body);
        return Err(GmailApiError::AuthError(format!(
            "{} failed. Status: {}, Error: {}",
            purpose, status, body
        )));
    }

    serde_json::from_str(&body).map_err(|e| {
        error!("Failed to parse {} response: {}", purpose, e);
        GmailApiError::ApiError(format!("Failed to parse token response: {}", e))
    })
}

/// Keeps a Google access token fresh for one linked account.
#[derive(Debug, Clone)]
pub struct TokenManager {
    credentials: GoogleCredentials,
    expires_at: DateTime<Utc>,
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl TokenManager {
    /// Starts from the stored access token when there is one. Without a
    /// recorded expiry it is trusted for `TOKEN_EXPIRY_SECONDS`.
    pub fn new(config: &Config, credentials: &GoogleCredentials) -> Self {
        let expires_at = match (&credentials.access_token, credentials.expires_at) {
            (Some(_), Some(at)) => at,
            (Some(_), None) => Utc::now() + Duration::seconds(get_token_expiry_seconds() as i64),
            (None, _) => Utc::now(),
        };

        Self {
            credentials: credentials.clone(),
            expires_at,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: OAUTH_TOKEN_URL.to_string(),
        }
    }

    /// Points token refreshes at a different endpoint (used against mock servers).
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn is_valid(&self) -> bool {
        self.credentials
            .access_token
            .as_deref()
            .map_or(false, |t| !t.is_empty())
            && Utc::now() < self.expires_at
    }

    /// The credentials as of the last refresh.
    pub fn credentials(&self) -> &GoogleCredentials {
        &self.credentials
    }

    pub async fn get_token(&mut self, client: &Client) -> Result<String> {
        if !self.is_valid() {
            self.refresh(client).await?;
        }
        Ok(self.credentials.access_token.clone().unwrap_or_default())
    }

    async fn refresh(&mut self, client: &Client) -> Result<()> {
        debug!(
            "Refreshing access token with client_id {} and refresh token {}",
            truncate_secret(&self.client_id),
            truncate_secret(&self.credentials.refresh_token)
        );

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let refreshed: RefreshResponse = post_token_form(client, &self.token_url, &params, "Token refresh").await?;

        let lifetime = refreshed.expires_in.saturating_sub(EXPIRY_MARGIN_SECS);
        self.expires_at = Utc::now() + Duration::seconds(lifetime as i64);
        self.credentials.expires_at = Some(self.expires_at);
        self.credentials.access_token = Some(refreshed.access_token);

        debug!("Access token refreshed, valid for {} seconds", lifetime);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_expiry_is_respected() {
        let config = Config::new("id", "secret");
        let mut credentials = GoogleCredentials::new("refresh").with_access_token("access");
        credentials.expires_at = Some(Utc::now() - Duration::seconds(1));
        assert!(!TokenManager::new(&config, &credentials).is_valid());

        credentials.expires_at = Some(Utc::now() + Duration::hours(1));
        assert!(TokenManager::new(&config, &credentials).is_valid());
    }

    #[test]
    fn test_no_access_token_needs_refresh() {
        let config = Config::new("id", "secret");
        let tm = TokenManager::new(&config, &GoogleCredentials::new("refresh"));
        assert!(!tm.is_valid());
        assert_eq!(tm.credentials().refresh_token, "refresh");
    }
}
