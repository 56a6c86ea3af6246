//! Google OAuth: the consent URL, the local callback server and the code exchange.

use crate::auth::{post_token_form, TokenManager};
use crate::config::{Config, OAUTH_AUTH_URL, OAUTH_TOKEN_URL};
use crate::credentials::{default_credentials_path, save_account, GoogleCredentials, LinkedAccount};
use crate::errors::{GmailResult, OAuthError};
use crate::gmail_api::GmailClient;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use log::{info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use url::Url;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// The consent page URL. Offline access with forced consent so Google
/// always returns a refresh token.
pub fn authorization_url(config: &Config, state: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &config.scopes.join(" "))
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("include_granted_scopes", "true")
        .append_pair("state", state)
        .finish();
    format!("{}?{}", OAUTH_AUTH_URL, query)
}

/// An unguessable value tying the callback to this flow.
pub fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchange {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenExchange {
    pub fn into_credentials(self) -> Result<GoogleCredentials, OAuthError> {
        let refresh_token = self.refresh_token.ok_or(OAuthError::NoRefreshToken)?;
        let mut credentials = GoogleCredentials::new(refresh_token).with_access_token(self.access_token);
        credentials.expires_at = Some(Utc::now() + chrono::Duration::seconds(self.expires_in as i64));
        Ok(credentials)
    }
}

/// Trades an authorization code for tokens.
pub async fn exchange_code(client: &Client, config: &Config, code: &str, token_url: &str) -> GmailResult<TokenExchange> {
    let params = [
        ("code", code),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("grant_type", "authorization_code"),
    ];

    post_token_form(client, token_url, &params, "Authorization code exchange").await
}

#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    sender: Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>,
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    let page = if params.error.is_some() {
        "<h1>Authorization failed</h1><p>Return to the terminal for details.</p>"
    } else {
        "<h1>Authorization complete</h1><p>You can close this window.</p>"
    };

    let sender = state
        .sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(params);
    }

    Html(page)
}

/// Serves the redirect URI until Google calls back, then returns the code.
async fn wait_for_code(config: &Config, expected_state: &str, auth_url: &str) -> Result<String, OAuthError> {
    let redirect = Url::parse(&config.redirect_uri)
        .map_err(|_| OAuthError::InvalidRedirectUri(config.redirect_uri.clone()))?;
    let host = redirect
        .host_str()
        .ok_or_else(|| OAuthError::InvalidRedirectUri(config.redirect_uri.clone()))?
        .to_string();
    let port = redirect
        .port_or_known_default()
        .ok_or_else(|| OAuthError::InvalidRedirectUri(config.redirect_uri.clone()))?;

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .map_err(OAuthError::Server)?;
    info!("Waiting for the OAuth callback on {}", config.redirect_uri);

    let (code_tx, code_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = Router::new()
        .route(redirect.path(), get(handle_callback))
        .with_state(CallbackState {
            sender: Arc::new(Mutex::new(Some(code_tx))),
        });

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    if let Err(e) = webbrowser::open(auth_url) {
        warn!("Could not open a browser: {}", e);
    }
    println!("If your browser did not open, visit this URL to authorize:\n\n{}\n", auth_url);

    let received = tokio::time::timeout(CALLBACK_TIMEOUT, code_rx).await;
    let _ = shutdown_tx.send(());
    if let Ok(Err(e)) = server.await {
        warn!("OAuth callback server stopped with an error: {}", e);
    }

    let params = match received {
        Ok(Ok(params)) => params,
        Ok(Err(_)) | Err(_) => return Err(OAuthError::CallbackTimeout),
    };

    if let Some(reason) = params.error {
        return Err(OAuthError::Denied(reason));
    }
    if params.state.as_deref() != Some(expected_state) {
        return Err(OAuthError::StateMismatch);
    }
    params
        .code
        .ok_or_else(|| OAuthError::Denied("no authorization code in callback".to_string()))
}

/// Runs the browser consent flow and stores the linked account in the
/// user's configuration directory.
pub async fn run_oauth_flow(config: &Config) -> Result<LinkedAccount, OAuthError> {
    let state = random_state();
    let auth_url = authorization_url(config, &state);
    let code = wait_for_code(config, &state, &auth_url).await?;

    let client = Client::new();
    let credentials = exchange_code(&client, config, &code, OAUTH_TOKEN_URL)
        .await?
        .into_credentials()?;

    let gmail = GmailClient::new(TokenManager::new(config, &credentials));
    let profile = gmail.get_profile().await?;

    let account = LinkedAccount {
        email: profile.email_address,
        name: config.user_name.clone(),
        credentials,
    };

    let path = default_credentials_path().ok_or_else(|| {
        OAuthError::Storage(io::Error::new(
            io::ErrorKind::NotFound,
            "no configuration directory for this user",
        ))
    })?;
    save_account(&path, &account).map_err(OAuthError::Storage)?;

    info!("Linked Google account {}", account.email);
    Ok(account)
}

/// Refreshes a token for the account and reads its Gmail profile.
pub async fn test_credentials(config: &Config, account: &LinkedAccount) -> GmailResult<String> {
    let gmail = GmailClient::new(TokenManager::new(config, &account.credentials));
    let profile = gmail.get_profile().await?;
    Ok(format!(
        "Connected to Gmail as {} ({} messages, {} threads)",
        profile.email_address, profile.messages_total, profile.threads_total
    ))
}
