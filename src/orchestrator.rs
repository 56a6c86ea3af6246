//! Drafting, sending, chatting and scheduling on behalf of a user.

use crate::accounts::MailboxAccess;
use crate::calendar_api::{CalendarEvent, EventDetails};
use crate::completion::{CompletionRequest, TextGenerator};
use crate::errors::{AssistantError, AssistantResult};
use crate::names::extract_names;
use crate::persona::Persona;
use crate::prompts::{conversation_context, draft_instructions, split_subject_and_body};
use crate::resolver::{ContactResolver, SuggestedRecipient};
use crate::store::{
    ChatMessage, Conversation, EmailDraft, NewEmailDraft, NewScheduledEvent, NewSentEmail, Role, ScheduledEvent,
    SentEmail, Store, User,
};
use crate::utils::encode_base64_url_safe;
use chrono::{DateTime, Local, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DRAFT_TEMPERATURE: f32 = 0.0;
const DRAFT_MAX_TOKENS: u32 = 500;
const CHAT_TEMPERATURE: f32 = 0.8;
const CHAT_MAX_TOKENS: u32 = 400;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftOutcome {
    pub draft: EmailDraft,
    pub suggested_recipients: Vec<SuggestedRecipient>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub conversation_id: u64,
    pub reply: String,
}

/// An event to schedule. Attendees are addresses or names to resolve.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventRequest {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub create_meet_link: bool,
}

pub struct Assistant {
    store: Arc<dyn Store>,
    generator: Arc<dyn TextGenerator>,
    access: Arc<dyn MailboxAccess>,
    resolver: Arc<ContactResolver>,
}

impl Assistant {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn TextGenerator>,
        access: Arc<dyn MailboxAccess>,
        resolver: Arc<ContactResolver>,
    ) -> Self {
        Self {
            store,
            generator,
            access,
            resolver,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<ContactResolver> {
        &self.resolver
    }

    async fn user(&self, owner: &str) -> AssistantResult<User> {
        self.store
            .get_user(owner)
            .await
            .ok_or_else(|| AssistantError::not_found("User", owner))
    }

    async fn persona(&self, id: u64) -> AssistantResult<Persona> {
        self.store
            .get_persona(id)
            .await
            .ok_or_else(|| AssistantError::not_found("Persona", id))
    }

    /// The user's selected persona, or the first available one.
    async fn persona_for(&self, user: &User) -> AssistantResult<Persona> {
        if let Some(id) = user.selected_persona_id {
            return self.persona(id).await;
        }
        self.store
            .list_personas()
            .await
            .into_iter()
            .next()
            .ok_or_else(|| AssistantError::not_found("Persona", "default"))
    }

    /// An existing conversation of this user, or a new one with the user's persona.
    async fn conversation_for(&self, user: &User, conversation_id: Option<u64>) -> AssistantResult<Conversation> {
        match conversation_id {
            Some(id) => self.owned_conversation(&user.email, id).await,
            None => {
                let persona = self.persona_for(user).await?;
                Ok(self.start_conversation(&user.email, &persona).await)
            }
        }
    }

    async fn start_conversation(&self, owner: &str, persona: &Persona) -> Conversation {
        let conversation = self.store.create_conversation(owner, persona.id).await;
        debug!("Started conversation {} with persona {}", conversation.id, persona.name);
        conversation
    }

    async fn owned_conversation(&self, owner: &str, id: u64) -> AssistantResult<Conversation> {
        self.store
            .get_conversation(id)
            .await
            .filter(|c| c.user_email == owner)
            .ok_or_else(|| AssistantError::not_found("Conversation", id))
    }

    pub async fn list_personas(&self) -> Vec<Persona> {
        self.store.list_personas().await
    }

    pub async fn select_persona(&self, owner: &str, persona_id: u64) -> AssistantResult<User> {
        self.store.select_persona(owner, persona_id).await
    }

    pub async fn list_conversations(&self, owner: &str) -> Vec<Conversation> {
        self.store.list_conversations(owner).await
    }

    pub async fn conversation_messages(&self, owner: &str, conversation_id: u64) -> AssistantResult<Vec<ChatMessage>> {
        let conversation = self.owned_conversation(owner, conversation_id).await?;
        Ok(self.store.messages(conversation.id).await)
    }

    /// Generates a subject and body for `prompt` in the persona's voice and
    /// stores them as a draft. Recipients named in the prompt are looked up
    /// in the mailbox and returned as suggestions.
    pub async fn draft_email(&self, owner: &str, prompt: &str, conversation_id: Option<u64>) -> AssistantResult<DraftOutcome> {
        if prompt.trim().is_empty() {
            return Err(AssistantError::InvalidInput("The email prompt is empty".to_string()));
        }

        let user = self.user(owner).await?;
        // A new conversation is only started once the draft text exists.
        let existing = match conversation_id {
            Some(id) => Some(self.owned_conversation(&user.email, id).await?),
            None => None,
        };
        let persona = match &existing {
            Some(conversation) => self.persona(conversation.persona_id).await?,
            None => self.persona_for(&user).await?,
        };

        let system = format!(
            "{}\n{}",
            persona.system_message(),
            draft_instructions(user.display_name(), &user.email, Local::now().date_naive())
        );
        let request = CompletionRequest::new(system, prompt)
            .with_temperature(DRAFT_TEMPERATURE)
            .with_max_tokens(DRAFT_MAX_TOKENS);
        let text = self.generator.complete(&request).await?;
        let (subject, body) = split_subject_and_body(&text);
        let conversation = match existing {
            Some(conversation) => conversation,
            None => self.start_conversation(&user.email, &persona).await,
        };

        let names = extract_names(prompt);
        let suggested_recipients = if names.is_empty() {
            Vec::new()
        } else {
            match self.resolver.resolve_contacts(owner, &names).await {
                Ok(response) => response.suggested_recipients,
                Err(e) => {
                    warn!("Could not suggest recipients for {:?}: {}", names, e);
                    Vec::new()
                }
            }
        };

        let draft = self
            .store
            .create_draft(NewEmailDraft {
                conversation_id: conversation.id,
                recipient_name: names.join(", "),
                user_prompt: prompt.to_string(),
                subject,
                body,
            })
            .await?;

        info!(
            "Drafted email {} in conversation {} ({} suggested recipients)",
            draft.id,
            conversation.id,
            suggested_recipients.len()
        );

        Ok(DraftOutcome {
            draft,
            suggested_recipients,
        })
    }

    /// Sends the final text of a draft through the user's Gmail account.
    pub async fn send_email(
        &self,
        owner: &str,
        draft_id: u64,
        to: &str,
        subject: &str,
        body: &str,
        conversation_id: Option<u64>,
    ) -> AssistantResult<SentEmail> {
        let draft = self
            .store
            .get_draft(draft_id)
            .await
            .ok_or_else(|| AssistantError::not_found("Email draft", draft_id))?;
        let conversation = self
            .owned_conversation(owner, conversation_id.unwrap_or(draft.conversation_id))
            .await?;

        let to = to.trim();
        if !to.contains('@') {
            return Err(AssistantError::InvalidInput(format!(
                "'{}' is not an email address",
                to
            )));
        }

        let mailbox = self.access.mailbox_for(owner).await?;
        let message = build_html_message(owner, to, subject, body);
        let gmail_message_id = mailbox.send_raw(&encode_base64_url_safe(message.as_bytes())).await?;

        let sent = self
            .store
            .record_sent(NewSentEmail {
                email_draft_id: draft.id,
                conversation_id: conversation.id,
                recipient_email: to.to_string(),
                gmail_message_id: Some(gmail_message_id),
            })
            .await?;

        info!("Sent draft {} to {}", draft.id, to);
        Ok(sent)
    }

    /// Answers `prompt` as the conversation's persona, with earlier turns as context.
    pub async fn chat(&self, owner: &str, prompt: &str, conversation_id: Option<u64>) -> AssistantResult<ChatReply> {
        if prompt.trim().is_empty() {
            return Err(AssistantError::InvalidInput("The message is empty".to_string()));
        }

        let user = self.user(owner).await?;
        let conversation = self.conversation_for(&user, conversation_id).await?;
        let persona = self.persona(conversation.persona_id).await?;
        let history = self.store.messages(conversation.id).await;

        let mut request = CompletionRequest::new(persona.system_message(), prompt)
            .with_temperature(CHAT_TEMPERATURE)
            .with_max_tokens(CHAT_MAX_TOKENS);
        if let Some(context) = conversation_context(&history) {
            request = request.with_context(context);
        }

        self.store.add_message(conversation.id, Role::User, prompt).await?;
        let reply = self.generator.complete(&request).await?;
        self.store.add_message(conversation.id, Role::Assistant, &reply).await?;

        Ok(ChatReply {
            conversation_id: conversation.id,
            reply,
        })
    }

    /// Turns each attendee into exactly one address. Names go through the
    /// contact resolver and must match a single contact.
    async fn resolve_attendees(&self, owner: &str, attendees: &[String]) -> AssistantResult<Vec<String>> {
        let lookups = attendees.iter().map(|attendee| async move {
            let attendee = attendee.trim();
            if attendee.contains('@') {
                return Ok(attendee.to_string());
            }

            let found = self.resolver.resolve_contacts(owner, &[attendee]).await?;
            match found.suggested_recipients.as_slice() {
                [only] => Ok(only.email.clone()),
                [] => Err(AssistantError::InvalidInput(format!(
                    "No contact found for attendee '{}'",
                    attendee
                ))),
                several => Err(AssistantError::InvalidInput(format!(
                    "Attendee '{}' is ambiguous: {}",
                    attendee,
                    several.iter().map(|r| r.email.as_str()).collect::<Vec<_>>().join(", ")
                ))),
            }
        });

        let mut emails: Vec<String> = Vec::new();
        for email in join_all(lookups).await {
            let email = email?;
            if !emails.iter().any(|e| e.eq_ignore_ascii_case(&email)) {
                emails.push(email);
            }
        }
        Ok(emails)
    }

    pub async fn schedule_event(&self, owner: &str, request: EventRequest) -> AssistantResult<ScheduledEvent> {
        let attendees = self.resolve_attendees(owner, &request.attendees).await?;
        let details = EventDetails {
            summary: request.summary,
            location: request.location,
            description: request.description,
            start: request.start,
            end: request.end,
            attendees,
            create_meet_link: request.create_meet_link,
        };
        details.validate()?;

        let calendar = self.access.calendar_for(owner).await?;
        let created = calendar.create_event(&details).await?;

        let event = self
            .store
            .save_event(NewScheduledEvent {
                user_email: owner.to_string(),
                event_id: created.id,
                summary: details.summary,
                location: details.location,
                description: details.description,
                start: details.start,
                end: details.end,
                hangout_link: created.hangout_link,
                attendees: details.attendees,
            })
            .await;

        info!("Scheduled event {} for {}", event.event_id, owner);
        Ok(event)
    }

    /// Upcoming events straight from the user's calendar.
    pub async fn upcoming_events(&self, owner: &str, max_results: u32) -> AssistantResult<Vec<CalendarEvent>> {
        let calendar = self.access.calendar_for(owner).await?;
        Ok(calendar.list_events(max_results, Some(Utc::now())).await?)
    }

    /// Events this assistant scheduled for the user.
    pub async fn scheduled_events(&self, owner: &str) -> Vec<ScheduledEvent> {
        self.store.list_events(owner).await
    }

    pub async fn delete_event(&self, owner: &str, event_id: &str) -> AssistantResult<()> {
        let calendar = self.access.calendar_for(owner).await?;
        calendar.delete_event(event_id).await?;
        if !self.store.delete_event(owner, event_id).await {
            debug!("Event {} was not scheduled through the assistant", event_id);
        }
        Ok(())
    }
}

fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ").trim().to_string()
}

/// RFC 2047 encoded-word for non-ASCII header text.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", base64::encode(value.as_bytes()))
    }
}

/// An RFC 822 message with a single `text/html` part.
pub fn build_html_message(from: &str, to: &str, subject: &str, body: &str) -> String {
    format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/html; charset=\"UTF-8\"\r\n\r\n{}",
        header_value(from),
        header_value(to),
        encode_header(&header_value(subject)),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_headers() {
        let message = build_html_message("me@x.com", "bob@y.com", "Lunch\r\nBcc: evil@z.com", "<p>Hi</p>");
        let (headers, body) = message.split_once("\r\n\r\n").unwrap();
        assert!(headers.contains("To: bob@y.com\r\n"));
        assert!(headers.contains("Subject: Lunch  Bcc: evil@z.com\r\n"));
        assert!(!headers.contains("\r\nBcc:"));
        assert_eq!(body, "<p>Hi</p>");
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        let message = build_html_message("me@x.com", "bob@y.com", "Café", "");
        assert!(message.contains("Subject: =?UTF-8?B?Q2Fmw6k=?=\r\n"));
    }
}
