use crate::accounts::{GoogleAccounts, MailboxAccess};
use crate::completion::OpenAiClient;
use crate::config::Config;
use crate::contact_cache::ContactCache;
use crate::credentials::{default_credentials_path, linked_account, GoogleCredentials};
use crate::errors::{AssistantError, AssistantResult};
use crate::orchestrator::{Assistant, EventRequest};
use crate::resolver::{ContactResolver, ResolveResponse};
use crate::store::{MemoryStore, Store, User};
use crate::utils::{error_codes, map_assistant_error, map_gmail_error, parse_id, parse_max_results, to_mcp_error};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use mcp_attr::server::{mcp_server, McpServer};
use mcp_attr::Result as McpResult;
use serde::Serialize;
use std::sync::Arc;

const DEFAULT_EVENT_COUNT: u32 = 10;

/// The MCP face of the assistant. All tools act for a single linked user.
#[derive(Clone)]
pub struct AssistantServer {
    owner: String,
    assistant: Arc<Assistant>,
    accounts: Arc<GoogleAccounts>,
}

impl AssistantServer {
    pub fn new(owner: impl Into<String>, assistant: Arc<Assistant>, accounts: Arc<GoogleAccounts>) -> Self {
        Self {
            owner: owner.into(),
            assistant,
            accounts,
        }
    }

    /// Wires the in-memory store, Google clients, contact cache and
    /// completion client from configuration.
    pub async fn from_config(config: Config) -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

        let path = default_credentials_path();
        let account = match linked_account(&config, path.as_deref()) {
            Ok(account) => account,
            Err(e) => {
                warn!("Could not read stored credentials: {}", e);
                None
            }
        };

        let owner = account
            .as_ref()
            .map(|a| a.email.clone())
            .or_else(|| config.user_email.clone())
            .unwrap_or_else(|| "me".to_string());

        store
            .upsert_user(User {
                email: owner.clone(),
                name: account
                    .as_ref()
                    .and_then(|a| a.name.clone())
                    .or_else(|| config.user_name.clone()),
                selected_persona_id: None,
            })
            .await;

        match account {
            Some(account) => {
                info!("Acting for linked Google account {}", account.email);
                store.save_credentials(&owner, account.credentials).await;
            }
            None => warn!("No Google account linked; run the 'auth' command first"),
        }

        let accounts = Arc::new(GoogleAccounts::new(config.clone(), Arc::clone(&store)));
        let access: Arc<dyn MailboxAccess> = accounts.clone();
        let cache = Arc::new(ContactCache::new(config.scan.cache_ttl));
        let resolver = Arc::new(ContactResolver::new(Arc::clone(&access), cache, config.scan.clone()));
        let generator = Arc::new(OpenAiClient::from_config(&config));
        let assistant = Arc::new(Assistant::new(store, generator, access, resolver));

        Self::new(owner, assistant, accounts)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub async fn resolve_names(&self, names: &[String]) -> AssistantResult<ResolveResponse> {
        self.assistant.resolver().resolve_contacts(&self.owner, names).await
    }

    /// Installs new credentials for the owner and drops what was derived from
    /// the old ones: cached Google clients and harvested contacts.
    pub async fn relink(&self, credentials: GoogleCredentials) {
        self.assistant.store().save_credentials(&self.owner, credentials).await;
        self.accounts.forget(&self.owner).await;
        self.assistant.resolver().cache().invalidate(&self.owner);
        info!("Reloaded Google credentials for {}", self.owner);
    }
}

fn to_json<T: Serialize>(value: &T) -> McpResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        error!("Failed to serialize tool result: {}", e);
        to_mcp_error(&format!("Failed to serialize result: {}", e), error_codes::GENERAL_ERROR)
    })
}

fn required_id(value: &serde_json::Value, name: &str) -> McpResult<u64> {
    parse_id(value).ok_or_else(|| {
        to_mcp_error(
            &format!("'{}' must be a positive integer, got {}", name, value),
            error_codes::INVALID_INPUT_ERROR,
        )
    })
}

fn optional_id(value: Option<serde_json::Value>, name: &str) -> McpResult<Option<u64>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => required_id(&v, name).map(Some),
    }
}

fn parse_time(value: &str, name: &str) -> McpResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            to_mcp_error(
                &format!("'{}' must be an RFC 3339 timestamp such as 2025-04-15T14:30:00Z: {}", name, e),
                error_codes::INVALID_INPUT_ERROR,
            )
        })
}

fn fail(tool: &str, err: AssistantError) -> mcp_attr::Error {
    error!("{} failed: {}", tool, err);
    map_assistant_error(&err)
}

#[mcp_server]
impl McpServer for AssistantServer {
    /// Gmail Assistant
    ///
    /// Drafts and sends email through Gmail in the voice of an AI persona,
    /// schedules Google Calendar events, and finds recipients by name in the
    /// user's mail history.
    #[prompt]
    async fn assistant_prompt(&self) -> McpResult<&str> {
        Ok("Gmail Assistant")
    }

    /// Find email addresses for people by name
    ///
    /// Searches the senders and recipients of the user's mail for each name,
    /// case-insensitively, against both display names and addresses.
    ///
    /// Args:
    ///   names: The names (or partial addresses) to look up, e.g. ["Bob", "Jane Doe"]
    #[tool]
    async fn resolve_contacts(&self, names: Vec<String>) -> McpResult<String> {
        info!("=== START resolve_contacts MCP command ===");
        debug!("resolve_contacts called with names={:?}", names);

        let response = self
            .assistant
            .resolver()
            .resolve_contacts(&self.owner, &names)
            .await
            .map_err(|e| fail("resolve_contacts", e))?;

        info!("=== END resolve_contacts MCP command (success) ===");
        to_json(&response)
    }

    /// Draft an email from a natural-language request
    ///
    /// Generates a subject and body in the selected persona's voice, stores the
    /// draft, and suggests recipients for any names mentioned in the request.
    ///
    /// Args:
    ///   prompt: What the email should say, e.g. "Ask Bob to move our sync to Friday"
    ///   conversation_id: Optional conversation to attach the draft to. A new one is started when omitted.
    #[tool]
    async fn draft_email(&self, prompt: String, conversation_id: Option<serde_json::Value>) -> McpResult<String> {
        info!("=== START draft_email MCP command ===");
        let conversation_id = optional_id(conversation_id, "conversation_id")?;

        let outcome = self
            .assistant
            .draft_email(&self.owner, &prompt, conversation_id)
            .await
            .map_err(|e| fail("draft_email", e))?;

        info!("=== END draft_email MCP command (success) ===");
        to_json(&outcome)
    }

    /// Send a drafted email
    ///
    /// Sends the final subject and body as an HTML email from the user's Gmail account.
    ///
    /// Args:
    ///   draft_id: The id returned by draft_email
    ///   to: The recipient's email address
    ///   subject: The final subject line
    ///   body: The final body (HTML allowed)
    ///   conversation_id: Optional conversation; defaults to the draft's conversation
    #[tool]
    async fn send_email(
        &self,
        draft_id: serde_json::Value,
        to: String,
        subject: String,
        body: String,
        conversation_id: Option<serde_json::Value>,
    ) -> McpResult<String> {
        info!("=== START send_email MCP command ===");
        let draft_id = required_id(&draft_id, "draft_id")?;
        let conversation_id = optional_id(conversation_id, "conversation_id")?;

        let sent = self
            .assistant
            .send_email(&self.owner, draft_id, &to, &subject, &body, conversation_id)
            .await
            .map_err(|e| fail("send_email", e))?;

        info!("=== END send_email MCP command (success) ===");
        to_json(&sent)
    }

    /// List the available AI personas
    #[tool]
    async fn list_personas(&self) -> McpResult<String> {
        to_json(&self.assistant.list_personas().await)
    }

    /// Select the persona used for new conversations
    ///
    /// Args:
    ///   persona_id: The id of a persona from list_personas
    #[tool]
    async fn select_persona(&self, persona_id: serde_json::Value) -> McpResult<String> {
        let persona_id = required_id(&persona_id, "persona_id")?;
        let user = self
            .assistant
            .select_persona(&self.owner, persona_id)
            .await
            .map_err(|e| fail("select_persona", e))?;
        to_json(&user)
    }

    /// List the user's conversations
    #[tool]
    async fn list_conversations(&self) -> McpResult<String> {
        to_json(&self.assistant.list_conversations(&self.owner).await)
    }

    /// Get the messages of a conversation, oldest first
    ///
    /// Args:
    ///   conversation_id: The conversation to read
    #[tool]
    async fn conversation_messages(&self, conversation_id: serde_json::Value) -> McpResult<String> {
        let conversation_id = required_id(&conversation_id, "conversation_id")?;
        let messages = self
            .assistant
            .conversation_messages(&self.owner, conversation_id)
            .await
            .map_err(|e| fail("conversation_messages", e))?;
        to_json(&messages)
    }

    /// Talk to the selected persona
    ///
    /// Args:
    ///   prompt: The user's message
    ///   conversation_id: Optional conversation to continue. A new one is started when omitted.
    #[tool]
    async fn chat(&self, prompt: String, conversation_id: Option<serde_json::Value>) -> McpResult<String> {
        info!("=== START chat MCP command ===");
        let conversation_id = optional_id(conversation_id, "conversation_id")?;

        let reply = self
            .assistant
            .chat(&self.owner, &prompt, conversation_id)
            .await
            .map_err(|e| fail("chat", e))?;

        info!("=== END chat MCP command (success) ===");
        to_json(&reply)
    }

    /// Create a Google Calendar event
    ///
    /// Times are RFC 3339 timestamps and are stored in UTC. Attendees may be
    /// email addresses or names; names are looked up in the user's mail and
    /// must match exactly one contact.
    ///
    /// Args:
    ///   summary: Event title
    ///   start: Start time, e.g. "2025-04-15T14:30:00Z"
    ///   end: End time, e.g. "2025-04-15T15:30:00Z"
    ///   attendees: Optional list of email addresses or names
    ///   location: Optional location
    ///   description: Optional description
    ///   create_meet_link: Whether to attach a Google Meet link (default: false)
    #[tool]
    #[allow(clippy::too_many_arguments)]
    async fn create_event(
        &self,
        summary: String,
        start: String,
        end: String,
        attendees: Option<Vec<String>>,
        location: Option<String>,
        description: Option<String>,
        create_meet_link: Option<bool>,
    ) -> McpResult<String> {
        info!("=== START create_event MCP command ===");
        let request = EventRequest {
            summary,
            start: parse_time(&start, "start")?,
            end: parse_time(&end, "end")?,
            location,
            description,
            attendees: attendees.unwrap_or_default(),
            create_meet_link: create_meet_link.unwrap_or(false),
        };

        let event = self
            .assistant
            .schedule_event(&self.owner, request)
            .await
            .map_err(|e| fail("create_event", e))?;

        info!("=== END create_event MCP command (success) ===");
        to_json(&event)
    }

    /// List upcoming events from the primary calendar
    ///
    /// Args:
    ///   max_results: Optional maximum number of events (default: 10). Can be a number (3) or a string ("3").
    #[tool]
    async fn list_events(&self, max_results: Option<serde_json::Value>) -> McpResult<String> {
        let max = parse_max_results(max_results, DEFAULT_EVENT_COUNT);
        let events = self
            .assistant
            .upcoming_events(&self.owner, max)
            .await
            .map_err(|e| fail("list_events", e))?;
        to_json(&events)
    }

    /// List the events scheduled through this assistant
    #[tool]
    async fn scheduled_events(&self) -> McpResult<String> {
        to_json(&self.assistant.scheduled_events(&self.owner).await)
    }

    /// Delete a calendar event and notify its attendees
    ///
    /// Args:
    ///   event_id: The Google Calendar event id
    #[tool]
    async fn delete_event(&self, event_id: String) -> McpResult<String> {
        self.assistant
            .delete_event(&self.owner, &event_id)
            .await
            .map_err(|e| fail("delete_event", e))?;
        Ok(format!("Event {} deleted", event_id))
    }

    /// Reload the linked Google account
    ///
    /// Rereads the credentials stored by the `auth` command, for when the
    /// account was linked again while the server was running.
    #[tool]
    async fn reload_credentials(&self) -> McpResult<String> {
        let path = default_credentials_path();
        let account = linked_account(self.accounts.config(), path.as_deref()).map_err(|e| {
            to_mcp_error(
                &format!("Could not read stored credentials: {}", e),
                error_codes::AUTH_ERROR,
            )
        })?;

        match account {
            Some(account) => {
                self.relink(account.credentials).await;
                Ok(format!("Reloaded Google credentials for {}", self.owner))
            }
            None => Err(to_mcp_error(
                "No Google account linked; run the 'auth' command first",
                error_codes::AUTH_ERROR,
            )),
        }
    }

    /// Check the connection to Gmail
    ///
    /// Refreshes the access token and reads the Gmail profile of the linked account.
    #[tool]
    async fn check_connection(&self) -> McpResult<String> {
        info!("=== START check_connection MCP command ===");

        let gmail = self
            .accounts
            .gmail_client(&self.owner)
            .await
            .map_err(|e| fail("check_connection", e))?;
        let profile = gmail.get_profile().await.map_err(|e| {
            error!("Connection check failed: {}", e);
            map_gmail_error(&e)
        })?;

        info!("=== END check_connection MCP command (success) ===");
        Ok(format!(
            "Connected to Gmail as {} ({} messages, {} threads)",
            profile.email_address, profile.messages_total, profile.threads_total
        ))
    }
}
