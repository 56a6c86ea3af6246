/// Calendar API Tests Module
///
/// Tests for creating, listing and deleting events on the primary calendar
/// against a mock Calendar API.
use chrono::{TimeZone, Utc};
use gmail_assistant::auth::TokenManager;
use gmail_assistant::calendar_api::{CalendarClient, CalendarProvider, EventDetails};
use gmail_assistant::config::Config;
use gmail_assistant::credentials::GoogleCredentials;
use gmail_assistant::errors::CalendarApiError;
use mockito::Matcher;
use serde_json::json;

fn client_for(server: &mockito::Server) -> CalendarClient {
    let credentials = GoogleCredentials::new("test_refresh_token").with_access_token("test_access_token");
    let token_manager = TokenManager::new(&Config::new("test_client_id", "test_client_secret"), &credentials)
        .with_token_url(format!("{}/token", server.url()));
    CalendarClient::new(token_manager).with_base_url(format!("{}/calendar/v3", server.url()))
}

fn standup(create_meet_link: bool) -> EventDetails {
    EventDetails {
        summary: "Standup".to_string(),
        location: Some("Room 4".to_string()),
        description: None,
        start: Utc.with_ymd_and_hms(2025, 4, 16, 9, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2025, 4, 16, 9, 15, 0).unwrap(),
        attendees: vec!["bob@y.com".to_string(), "alice@z.com".to_string()],
        create_meet_link,
    }
}

#[cfg(test)]
mod calendar_api_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_event_with_meet_link() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/calendar/v3/calendars/primary/events")
            .match_header("authorization", "Bearer test_access_token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("conferenceDataVersion".into(), "1".into()),
                Matcher::UrlEncoded("sendUpdates".into(), "all".into()),
            ]))
            .match_body(Matcher::PartialJson(json!({
                "summary": "Standup",
                "start": { "dateTime": "2025-04-16T09:00:00Z", "timeZone": "UTC" },
                "attendees": [{ "email": "bob@y.com" }, { "email": "alice@z.com" }],
                "conferenceData": { "createRequest": { "conferenceSolutionKey": { "type": "hangoutsMeet" } } }
            })))
            .with_status(200)
            .with_body(
                json!({
                    "id": "evt123",
                    "status": "confirmed",
                    "summary": "Standup",
                    "htmlLink": "https://calendar.google.com/event?eid=evt123",
                    "hangoutLink": "https://meet.google.com/abc-defg-hij",
                    "start": { "dateTime": "2025-04-16T09:00:00Z" },
                    "end": { "dateTime": "2025-04-16T09:15:00Z" },
                    "attendees": [{ "email": "bob@y.com", "responseStatus": "needsAction" }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let event = client_for(&server).create_event(&standup(true)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(event.id, "evt123");
        assert_eq!(event.hangout_link.as_deref(), Some("https://meet.google.com/abc-defg-hij"));
        assert_eq!(event.attendees[0].response_status.as_deref(), Some("needsAction"));
    }

    #[tokio::test]
    async fn test_invalid_event_is_rejected_before_any_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let mut details = standup(false);
        details.attendees.push("Bob".to_string());
        let err = client_for(&server).create_event(&details).await.unwrap_err();

        assert!(matches!(err, CalendarApiError::EventFormatError(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_events_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/calendar/v3/calendars/primary/events")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("maxResults".into(), "5".into()),
                Matcher::UrlEncoded("singleEvents".into(), "true".into()),
                Matcher::UrlEncoded("orderBy".into(), "startTime".into()),
                Matcher::UrlEncoded("timeMin".into(), "2025-04-15T00:00:00Z".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "kind": "calendar#events",
                    "items": [
                        { "id": "a", "summary": "One", "start": { "date": "2025-04-16" }, "end": { "date": "2025-04-17" } },
                        { "id": "b" }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let events = client_for(&server)
            .list_events(5, Some(Utc.with_ymd_and_hms(2025, 4, 15, 0, 0, 0).unwrap()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start.date.as_deref(), Some("2025-04-16"));
        assert!(events[1].summary.is_none());
    }

    #[tokio::test]
    async fn test_delete_event() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/calendar/v3/calendars/primary/events/evt123")
            .match_query(Matcher::UrlEncoded("sendUpdates".into(), "all".into()))
            .with_status(204)
            .create_async()
            .await;

        client_for(&server).delete_event("evt123").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_missing_event() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/calendar/v3/calendars/primary/events/gone")
            .match_query(Matcher::Any)
            .with_status(410)
            .with_body(r#"{"error":{"code":410,"message":"Resource has been deleted"}}"#)
            .create_async()
            .await;

        match client_for(&server).delete_event("gone").await {
            Err(CalendarApiError::ApiError(msg)) => assert!(msg.contains("not found")),
            other => panic!("expected ApiError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forbidden_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/calendar/v3/calendars/primary/events")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("insufficient scopes")
            .create_async()
            .await;

        let err = client_for(&server).list_events(10, None).await.unwrap_err();
        assert!(matches!(err, CalendarApiError::AuthError(_)));
    }
}
