//! Persistence for users, conversations, email drafts and calendar records.

use crate::credentials::GoogleCredentials;
use crate::errors::{AssistantError, AssistantResult};
use crate::persona::{default_personas, Persona};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub name: Option<String>,
    pub selected_persona_id: Option<u64>,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            selected_persona_id: None,
        }
    }

    /// The name used to sign off emails.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: u64,
    pub user_email: String,
    pub persona_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub conversation_id: u64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEmailDraft {
    pub conversation_id: u64,
    pub recipient_name: String,
    pub user_prompt: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub id: u64,
    pub conversation_id: u64,
    pub recipient_name: String,
    pub user_prompt: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSentEmail {
    pub email_draft_id: u64,
    pub conversation_id: u64,
    pub recipient_email: String,
    pub gmail_message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentEmail {
    pub id: u64,
    pub email_draft_id: u64,
    pub conversation_id: u64,
    pub recipient_email: String,
    pub gmail_message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScheduledEvent {
    pub user_email: String,
    pub event_id: String,
    pub summary: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub hangout_link: Option<String>,
    pub attendees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub id: u64,
    pub user_email: String,
    pub event_id: String,
    pub summary: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub hangout_link: Option<String>,
    pub attendees: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_user(&self, user: User) -> User;
    async fn get_user(&self, email: &str) -> Option<User>;
    async fn select_persona(&self, email: &str, persona_id: u64) -> AssistantResult<User>;

    async fn list_personas(&self) -> Vec<Persona>;
    async fn get_persona(&self, id: u64) -> Option<Persona>;

    async fn save_credentials(&self, email: &str, credentials: GoogleCredentials);
    async fn get_credentials(&self, email: &str) -> Option<GoogleCredentials>;

    async fn create_conversation(&self, user_email: &str, persona_id: u64) -> Conversation;
    async fn get_conversation(&self, id: u64) -> Option<Conversation>;
    async fn list_conversations(&self, user_email: &str) -> Vec<Conversation>;
    async fn add_message(&self, conversation_id: u64, role: Role, content: &str) -> AssistantResult<ChatMessage>;
    async fn messages(&self, conversation_id: u64) -> Vec<ChatMessage>;

    async fn create_draft(&self, draft: NewEmailDraft) -> AssistantResult<EmailDraft>;
    async fn get_draft(&self, id: u64) -> Option<EmailDraft>;
    async fn record_sent(&self, sent: NewSentEmail) -> AssistantResult<SentEmail>;
    async fn sent_for_draft(&self, email_draft_id: u64) -> Vec<SentEmail>;

    async fn save_event(&self, event: NewScheduledEvent) -> ScheduledEvent;
    async fn list_events(&self, user_email: &str) -> Vec<ScheduledEvent>;
    /// Returns whether a record was removed.
    async fn delete_event(&self, user_email: &str, event_id: &str) -> bool;
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, User>,
    personas: BTreeMap<u64, Persona>,
    credentials: HashMap<String, GoogleCredentials>,
    conversations: BTreeMap<u64, Conversation>,
    messages: Vec<ChatMessage>,
    drafts: BTreeMap<u64, EmailDraft>,
    sent: Vec<SentEmail>,
    events: Vec<ScheduledEvent>,
    last_id: u64,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }
}

/// Process-local store. Record ids are unique across all tables.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A store seeded with the default personas.
    pub fn new() -> Self {
        Self::with_personas(default_personas())
    }

    pub fn with_personas(personas: Vec<Persona>) -> Self {
        let mut tables = Tables::default();
        for persona in personas {
            tables.last_id = tables.last_id.max(persona.id);
            tables.personas.insert(persona.id, persona);
        }
        Self {
            tables: RwLock::new(tables),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_user(&self, user: User) -> User {
        let mut tables = self.tables.write().await;
        let merged = match tables.users.get(&user.email) {
            Some(existing) => User {
                email: user.email.clone(),
                name: user.name.or_else(|| existing.name.clone()),
                selected_persona_id: user.selected_persona_id.or(existing.selected_persona_id),
            },
            None => user,
        };
        tables.users.insert(merged.email.clone(), merged.clone());
        merged
    }

    async fn get_user(&self, email: &str) -> Option<User> {
        self.tables.read().await.users.get(email).cloned()
    }

    async fn select_persona(&self, email: &str, persona_id: u64) -> AssistantResult<User> {
        let mut tables = self.tables.write().await;
        if !tables.personas.contains_key(&persona_id) {
            return Err(AssistantError::not_found("Persona", persona_id));
        }
        let user = tables
            .users
            .get_mut(email)
            .ok_or_else(|| AssistantError::not_found("User", email))?;
        user.selected_persona_id = Some(persona_id);
        debug!("User {} selected persona {}", email, persona_id);
        Ok(user.clone())
    }

    async fn list_personas(&self) -> Vec<Persona> {
        self.tables.read().await.personas.values().cloned().collect()
    }

    async fn get_persona(&self, id: u64) -> Option<Persona> {
        self.tables.read().await.personas.get(&id).cloned()
    }

    async fn save_credentials(&self, email: &str, credentials: GoogleCredentials) {
        let mut tables = self.tables.write().await;
        tables.credentials.insert(email.to_string(), credentials);
    }

    async fn get_credentials(&self, email: &str) -> Option<GoogleCredentials> {
        self.tables.read().await.credentials.get(email).cloned()
    }

    async fn create_conversation(&self, user_email: &str, persona_id: u64) -> Conversation {
        let mut tables = self.tables.write().await;
        let conversation = Conversation {
            id: tables.next_id(),
            user_email: user_email.to_string(),
            persona_id,
            created_at: Utc::now(),
        };
        tables.conversations.insert(conversation.id, conversation.clone());
        conversation
    }

    async fn get_conversation(&self, id: u64) -> Option<Conversation> {
        self.tables.read().await.conversations.get(&id).cloned()
    }

    async fn list_conversations(&self, user_email: &str) -> Vec<Conversation> {
        self.tables
            .read()
            .await
            .conversations
            .values()
            .filter(|c| c.user_email == user_email)
            .cloned()
            .collect()
    }

    async fn add_message(&self, conversation_id: u64, role: Role, content: &str) -> AssistantResult<ChatMessage> {
        let mut tables = self.tables.write().await;
        if !tables.conversations.contains_key(&conversation_id) {
            return Err(AssistantError::not_found("Conversation", conversation_id));
        }
        let message = ChatMessage {
            id: tables.next_id(),
            conversation_id,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn messages(&self, conversation_id: u64) -> Vec<ChatMessage> {
        self.tables
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    async fn create_draft(&self, draft: NewEmailDraft) -> AssistantResult<EmailDraft> {
        let mut tables = self.tables.write().await;
        if !tables.conversations.contains_key(&draft.conversation_id) {
            return Err(AssistantError::not_found("Conversation", draft.conversation_id));
        }
        let draft = EmailDraft {
            id: tables.next_id(),
            conversation_id: draft.conversation_id,
            recipient_name: draft.recipient_name,
            user_prompt: draft.user_prompt,
            subject: draft.subject,
            body: draft.body,
            created_at: Utc::now(),
        };
        tables.drafts.insert(draft.id, draft.clone());
        Ok(draft)
    }

    async fn get_draft(&self, id: u64) -> Option<EmailDraft> {
        self.tables.read().await.drafts.get(&id).cloned()
    }

    async fn record_sent(&self, sent: NewSentEmail) -> AssistantResult<SentEmail> {
        let mut tables = self.tables.write().await;
        if !tables.drafts.contains_key(&sent.email_draft_id) {
            return Err(AssistantError::not_found("Email draft", sent.email_draft_id));
        }
        let sent = SentEmail {
            id: tables.next_id(),
            email_draft_id: sent.email_draft_id,
            conversation_id: sent.conversation_id,
            recipient_email: sent.recipient_email,
            gmail_message_id: sent.gmail_message_id,
            sent_at: Utc::now(),
        };
        tables.sent.push(sent.clone());
        Ok(sent)
    }

    async fn sent_for_draft(&self, email_draft_id: u64) -> Vec<SentEmail> {
        self.tables
            .read()
            .await
            .sent
            .iter()
            .filter(|s| s.email_draft_id == email_draft_id)
            .cloned()
            .collect()
    }

    async fn save_event(&self, event: NewScheduledEvent) -> ScheduledEvent {
        let mut tables = self.tables.write().await;
        let event = ScheduledEvent {
            id: tables.next_id(),
            user_email: event.user_email,
            event_id: event.event_id,
            summary: event.summary,
            location: event.location,
            description: event.description,
            start: event.start,
            end: event.end,
            hangout_link: event.hangout_link,
            attendees: event.attendees,
            created_at: Utc::now(),
        };
        tables.events.push(event.clone());
        event
    }

    async fn list_events(&self, user_email: &str) -> Vec<ScheduledEvent> {
        self.tables
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.user_email == user_email)
            .cloned()
            .collect()
    }

    async fn delete_event(&self, user_email: &str, event_id: &str) -> bool {
        let mut tables = self.tables.write().await;
        let before = tables.events.len();
        tables
            .events
            .retain(|e| !(e.user_email == user_email && e.event_id == event_id));
        tables.events.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_unique_across_tables() {
        let store = MemoryStore::new();
        let conversation = store.create_conversation("me@example.com", 1).await;
        let message = store
            .add_message(conversation.id, Role::User, "hello")
            .await
            .unwrap();
        assert_ne!(conversation.id, message.id);
        assert!(conversation.id > 1, "persona ids are reserved");
    }

    #[tokio::test]
    async fn test_draft_requires_conversation() {
        let store = MemoryStore::new();
        let result = store
            .create_draft(NewEmailDraft {
                conversation_id: 999,
                recipient_name: String::new(),
                user_prompt: "hi".into(),
                subject: "s".into(),
                body: "b".into(),
            })
            .await;
        assert!(matches!(result, Err(AssistantError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_select_unknown_persona() {
        let store = MemoryStore::new();
        store.upsert_user(User::new("me@example.com")).await;
        assert!(store.select_persona("me@example.com", 42).await.is_err());
        let user = store.select_persona("me@example.com", 1).await.unwrap();
        assert_eq!(user.selected_persona_id, Some(1));
    }
}
