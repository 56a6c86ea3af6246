use crate::auth::TokenManager;
use crate::config::CALENDAR_API_BASE_URL;
use crate::errors::{CalendarApiError, CalendarResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, info};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;

type Result<T> = CalendarResult<T>;

/// What the user asked to schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    pub summary: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub create_meet_link: bool,
}

impl EventDetails {
    pub fn validate(&self) -> Result<()> {
        if self.summary.trim().is_empty() {
            return Err(CalendarApiError::EventFormatError(
                "Event summary cannot be empty".to_string(),
            ));
        }
        if self.end <= self.start {
            return Err(CalendarApiError::EventFormatError(format!(
                "Event end ({}) must be after its start ({})",
                self.end, self.start
            )));
        }
        if let Some(bad) = self.attendees.iter().find(|a| !a.contains('@')) {
            return Err(CalendarApiError::EventFormatError(format!(
                "Attendee '{}' is not an email address",
                bad
            )));
        }
        Ok(())
    }

    /// The `events.insert` request body.
    pub fn to_api_body(&self, request_id: &str) -> Value {
        let mut body = json!({
            "summary": self.summary,
            "location": self.location,
            "description": self.description,
            "start": {
                "dateTime": self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
                "timeZone": "UTC",
            },
            "end": {
                "dateTime": self.end.to_rfc3339_opts(SecondsFormat::Secs, true),
                "timeZone": "UTC",
            },
            "attendees": self.attendees.iter().map(|email| json!({ "email": email })).collect::<Vec<_>>(),
        });

        if self.create_meet_link {
            body["conferenceData"] = json!({
                "createRequest": {
                    "requestId": request_id,
                    "conferenceSolutionKey": { "type": "hangoutsMeet" }
                }
            });
        }

        body
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(default)]
    pub date_time: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAttendee {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub response_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub html_link: Option<String>,
    #[serde(default)]
    pub hangout_link: Option<String>,
    #[serde(default)]
    pub start: EventDateTime,
    #[serde(default)]
    pub end: EventDateTime,
    #[serde(default)]
    pub attendees: Vec<EventAttendee>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

/// The calendar operations the assistant schedules through.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn create_event(&self, details: &EventDetails) -> Result<CalendarEvent>;
    async fn list_events(&self, max_results: u32, time_min: Option<DateTime<Utc>>) -> Result<Vec<CalendarEvent>>;
    async fn delete_event(&self, event_id: &str) -> Result<()>;
}

pub struct CalendarClient {
    client: Client,
    token_manager: Mutex<TokenManager>,
    api_base: String,
}

impl CalendarClient {
    pub fn new(token_manager: TokenManager) -> Self {
        Self {
            client: Client::new(),
            token_manager: Mutex::new(token_manager),
            api_base: CALENDAR_API_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn token(&self) -> Result<String> {
        let mut manager = self.token_manager.lock().await;
        manager
            .get_token(&self.client)
            .await
            .map_err(|e| CalendarApiError::AuthError(e.to_string()))
    }
}

#[async_trait]
impl CalendarProvider for CalendarClient {
    /// Inserts the event into the primary calendar and notifies attendees.
    async fn create_event(&self, details: &EventDetails) -> Result<CalendarEvent> {
        details.validate()?;
        let token = self.token().await?;
        let url = format!("{}/calendars/primary/events", self.api_base);
        let request_id = uuid::Uuid::new_v4().to_string();

        debug!(
            "Creating event '{}' with {} attendees (meet link: {})",
            details.summary,
            details.attendees.len(),
            details.create_meet_link
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .query(&[("conferenceDataVersion", "1"), ("sendUpdates", "all")])
            .json(&details.to_api_body(&request_id))
            .send()
            .await
            .map_err(|e| CalendarApiError::NetworkError(e.to_string()))?;

        let event: CalendarEvent = read_json(response).await?;
        info!("Created calendar event {}", event.id);
        Ok(event)
    }

    /// Upcoming single events from the primary calendar, ordered by start time.
    async fn list_events(&self, max_results: u32, time_min: Option<DateTime<Utc>>) -> Result<Vec<CalendarEvent>> {
        let token = self.token().await?;
        let url = format!("{}/calendars/primary/events", self.api_base);

        let mut params = vec![
            ("maxResults", max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(min) = time_min {
            params.push(("timeMin", min.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&params)
            .send()
            .await
            .map_err(|e| CalendarApiError::NetworkError(e.to_string()))?;

        let list: EventList = read_json(response).await?;
        Ok(list.items)
    }

    async fn delete_event(&self, event_id: &str) -> Result<()> {
        let token = self.token().await?;
        let url = format!(
            "{}/calendars/primary/events/{}",
            self.api_base,
            urlencoding::encode(event_id)
        );

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&token)
            .query(&[("sendUpdates", "all")])
            .send()
            .await
            .map_err(|e| CalendarApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!("Deleted calendar event {}", event_id);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| CalendarApiError::NetworkError(e.to_string()))?;

    if !status.is_success() {
        error!("Calendar API request failed with status {}: {}", status, body);
        return Err(status_error(status, &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| CalendarApiError::EventFormatError(format!("Invalid Calendar API response: {}", e)))
}

fn status_error(status: StatusCode, body: &str) -> CalendarApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CalendarApiError::AuthError(format!("HTTP {}: {}", status.as_u16(), body))
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            CalendarApiError::ApiError(format!("Event not found (HTTP {})", status.as_u16()))
        }
        _ => CalendarApiError::ApiError(format!("HTTP {}: {}", status.as_u16(), body)),
    }
}
