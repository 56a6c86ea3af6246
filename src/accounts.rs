//! Per-user Google API clients built from stored credentials.

use crate::auth::TokenManager;
use crate::calendar_api::{CalendarClient, CalendarProvider};
use crate::config::{Config, CALENDAR_API_BASE_URL, GMAIL_API_BASE_URL, GMAIL_BATCH_URL, OAUTH_TOKEN_URL};
use crate::errors::{AssistantError, AssistantResult};
use crate::gmail_api::{GmailClient, MailboxProvider};
use crate::store::Store;
use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Hands out the mailbox and calendar of a user, failing with
/// `CredentialsMissing` when the user never linked a Google account.
#[async_trait]
pub trait MailboxAccess: Send + Sync {
    async fn mailbox_for(&self, owner: &str) -> AssistantResult<Arc<dyn MailboxProvider>>;
    async fn calendar_for(&self, owner: &str) -> AssistantResult<Arc<dyn CalendarProvider>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    pub gmail_api: String,
    pub gmail_batch: String,
    pub calendar_api: String,
    pub token_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            gmail_api: GMAIL_API_BASE_URL.to_string(),
            gmail_batch: GMAIL_BATCH_URL.to_string(),
            calendar_api: CALENDAR_API_BASE_URL.to_string(),
            token_url: OAUTH_TOKEN_URL.to_string(),
        }
    }
}

impl GoogleEndpoints {
    /// Every endpoint rooted at one mock server.
    pub fn at(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            gmail_api: format!("{}/gmail/v1", base),
            gmail_batch: format!("{}/batch/gmail/v1", base),
            calendar_api: format!("{}/calendar/v3", base),
            token_url: format!("{}/token", base),
        }
    }
}

pub struct GoogleAccounts {
    config: Config,
    store: Arc<dyn Store>,
    endpoints: GoogleEndpoints,
    gmail: Mutex<HashMap<String, Arc<GmailClient>>>,
    calendars: Mutex<HashMap<String, Arc<CalendarClient>>>,
}

impl GoogleAccounts {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            store,
            endpoints: GoogleEndpoints::default(),
            gmail: Mutex::new(HashMap::new()),
            calendars: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn token_manager(&self, owner: &str) -> AssistantResult<TokenManager> {
        let credentials = self
            .store
            .get_credentials(owner)
            .await
            .ok_or_else(|| AssistantError::CredentialsMissing(owner.to_string()))?;
        Ok(TokenManager::new(&self.config, &credentials).with_token_url(self.endpoints.token_url.clone()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The concrete Gmail client, shared between calls for the same user.
    pub async fn gmail_client(&self, owner: &str) -> AssistantResult<Arc<GmailClient>> {
        let mut clients = self.gmail.lock().await;
        if let Some(client) = clients.get(owner) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(
            GmailClient::new(self.token_manager(owner).await?)
                .with_endpoints(self.endpoints.gmail_api.clone(), self.endpoints.gmail_batch.clone()),
        );
        debug!("Created Gmail client for {}", owner);
        clients.insert(owner.to_string(), Arc::clone(&client));
        Ok(client)
    }

    pub async fn calendar_client(&self, owner: &str) -> AssistantResult<Arc<CalendarClient>> {
        let mut clients = self.calendars.lock().await;
        if let Some(client) = clients.get(owner) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(
            CalendarClient::new(self.token_manager(owner).await?)
                .with_base_url(self.endpoints.calendar_api.clone()),
        );
        debug!("Created Calendar client for {}", owner);
        clients.insert(owner.to_string(), Arc::clone(&client));
        Ok(client)
    }

    /// Drops cached clients so the next call picks up relinked credentials.
    pub async fn forget(&self, owner: &str) {
        self.gmail.lock().await.remove(owner);
        self.calendars.lock().await.remove(owner);
        info!("Discarded cached Google clients for {}", owner);
    }
}

#[async_trait]
impl MailboxAccess for GoogleAccounts {
    async fn mailbox_for(&self, owner: &str) -> AssistantResult<Arc<dyn MailboxProvider>> {
        let client: Arc<dyn MailboxProvider> = self.gmail_client(owner).await?;
        Ok(client)
    }

    async fn calendar_for(&self, owner: &str) -> AssistantResult<Arc<dyn CalendarProvider>> {
        let client: Arc<dyn CalendarProvider> = self.calendar_client(owner).await?;
        Ok(client)
    }
}
