//! Hand-written fakes for the mailbox, calendar and completion collaborators.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gmail_assistant::accounts::MailboxAccess;
use gmail_assistant::calendar_api::{CalendarEvent, CalendarProvider, EventDateTime, EventDetails};
use gmail_assistant::completion::{CompletionRequest, TextGenerator};
use gmail_assistant::errors::{
    AssistantError, AssistantResult, CalendarApiError, CalendarResult, CompletionError, GmailApiError, GmailResult,
};
use gmail_assistant::gmail_api::{MailboxProvider, MessageHeaders, MessagePage, MessageRef};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn message(id: &str, from: &str, to: &str) -> MessageHeaders {
    MessageHeaders::new(id).with_header("From", from).with_header("To", to)
}

/// An in-memory mailbox. Page tokens are offsets into the message list.
#[derive(Default)]
pub struct FakeMailbox {
    pub messages: Vec<MessageHeaders>,
    /// Batch calls to answer with a rate limit before behaving normally.
    pub rate_limited_batches: AtomicUsize,
    /// Batch calls to fail outright (after any rate limits).
    pub failing_batches: AtomicUsize,
    pub fail_listing: bool,
    /// Listed messages whose batch item fails with a server error.
    pub failing_messages: Vec<String>,
    /// Listed messages whose batch item reports them deleted.
    pub deleted_messages: Vec<String>,
    pub list_delay: Option<Duration>,
    pub list_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub queries: Mutex<Vec<Option<String>>>,
    pub sent: Mutex<Vec<String>>,
}

impl FakeMailbox {
    pub fn with_messages(messages: Vec<MessageHeaders>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn matches_query(message: &MessageHeaders, query: Option<&str>) -> bool {
        let term = match query.and_then(|q| q.rsplit("from:").next()) {
            Some(term) => term.trim_matches('"').to_lowercase(),
            None => return true,
        };
        message
            .values("From")
            .chain(message.values("To"))
            .any(|v| v.to_lowercase().contains(&term))
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MailboxProvider for FakeMailbox {
    async fn list_messages(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
        max_results: u32,
    ) -> GmailResult<MessagePage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .unwrap()
            .push(query.map(str::to_string));
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listing {
            return Err(GmailApiError::ApiError("HTTP 500: backend error".to_string()));
        }

        let matching: Vec<&MessageHeaders> = self
            .messages
            .iter()
            .filter(|m| Self::matches_query(m, query))
            .collect();
        let offset: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (offset + max_results as usize).min(matching.len());

        Ok(MessagePage {
            messages: matching[offset..end]
                .iter()
                .map(|m| MessageRef {
                    id: m.id.clone(),
                    thread_id: None,
                })
                .collect(),
            next_page_token: (end < matching.len()).then(|| end.to_string()),
            result_size_estimate: Some(matching.len() as u32),
        })
    }

    async fn batch_get(&self, ids: &[String]) -> GmailResult<Vec<GmailResult<MessageHeaders>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.rate_limited_batches) {
            return Err(GmailApiError::RateLimitError("HTTP 429".to_string()));
        }
        if Self::take(&self.failing_batches) {
            return Err(GmailApiError::ApiError("HTTP 500: batch failed".to_string()));
        }

        Ok(ids
            .iter()
            .map(|id| {
                if self.failing_messages.contains(id) {
                    return Err(GmailApiError::MessageRetrievalError(format!("HTTP 500 for message {}", id)));
                }
                if self.deleted_messages.contains(id) {
                    return Err(GmailApiError::MessageNotFound(id.clone()));
                }
                self.messages
                    .iter()
                    .find(|m| &m.id == id)
                    .cloned()
                    .ok_or_else(|| GmailApiError::MessageRetrievalError(format!("no message {}", id)))
            })
            .collect())
    }

    async fn send_raw(&self, raw: &str) -> GmailResult<String> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(raw.to_string());
        Ok(format!("sent-{}", sent.len()))
    }
}

#[derive(Default)]
pub struct FakeCalendar {
    pub created: Mutex<Vec<EventDetails>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl CalendarProvider for FakeCalendar {
    async fn create_event(&self, details: &EventDetails) -> CalendarResult<CalendarEvent> {
        let mut created = self.created.lock().unwrap();
        created.push(details.clone());
        Ok(CalendarEvent {
            id: format!("evt-{}", created.len()),
            summary: Some(details.summary.clone()),
            status: Some("confirmed".to_string()),
            html_link: None,
            hangout_link: details
                .create_meet_link
                .then(|| "https://meet.google.com/abc-defg-hij".to_string()),
            start: EventDateTime {
                date_time: Some(details.start.to_rfc3339()),
                ..Default::default()
            },
            end: EventDateTime {
                date_time: Some(details.end.to_rfc3339()),
                ..Default::default()
            },
            attendees: Vec::new(),
        })
    }

    async fn list_events(&self, max_results: u32, _time_min: Option<DateTime<Utc>>) -> CalendarResult<Vec<CalendarEvent>> {
        let created = self.created.lock().unwrap().len();
        Ok((1..=created.min(max_results as usize))
            .map(|i| CalendarEvent {
                id: format!("evt-{}", i),
                summary: None,
                status: None,
                html_link: None,
                hangout_link: None,
                start: EventDateTime::default(),
                end: EventDateTime::default(),
                attendees: Vec::new(),
            })
            .collect())
    }

    async fn delete_event(&self, event_id: &str) -> CalendarResult<()> {
        if !event_id.starts_with("evt-") {
            return Err(CalendarApiError::ApiError("Event not found (HTTP 404)".to_string()));
        }
        self.deleted.lock().unwrap().push(event_id.to_string());
        Ok(())
    }
}

/// Access to one user's fake mailbox and calendar; anyone else is unlinked.
pub struct FakeAccess {
    pub owner: String,
    pub mailbox: Arc<FakeMailbox>,
    pub calendar: Arc<FakeCalendar>,
}

impl FakeAccess {
    pub fn new(owner: &str, mailbox: FakeMailbox) -> Self {
        Self {
            owner: owner.to_string(),
            mailbox: Arc::new(mailbox),
            calendar: Arc::new(FakeCalendar::default()),
        }
    }
}

#[async_trait]
impl MailboxAccess for FakeAccess {
    async fn mailbox_for(&self, owner: &str) -> AssistantResult<Arc<dyn MailboxProvider>> {
        if owner != self.owner {
            return Err(AssistantError::CredentialsMissing(owner.to_string()));
        }
        let mailbox: Arc<dyn MailboxProvider> = self.mailbox.clone();
        Ok(mailbox)
    }

    async fn calendar_for(&self, owner: &str) -> AssistantResult<Arc<dyn CalendarProvider>> {
        if owner != self.owner {
            return Err(AssistantError::CredentialsMissing(owner.to_string()));
        }
        let calendar: Arc<dyn CalendarProvider> = self.calendar.clone();
        Ok(calendar)
    }
}

/// Returns a canned reply and remembers every request.
pub struct FakeGenerator {
    pub reply: String,
    pub requests: Mutex<Vec<CompletionRequest>>,
    /// Makes every completion fail as if the backend were down.
    pub unavailable: AtomicBool,
}

impl FakeGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn last_request(&self) -> CompletionRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CompletionError::NetworkError("connection refused".to_string()));
        }
        Ok(self.reply.clone())
    }
}
