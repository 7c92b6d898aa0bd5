use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::GoogleCalendarEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use url::Url;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";
pub const PRIMARY_CALENDAR_ID: &str = "primary";

#[async_trait]
pub trait GoogleCalendarClient: Send + Sync {
    /// Returns the created event as echoed by the API (with its id).
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<GoogleCalendarEvent, InfraError>;

    /// Next `limit` events from `time_min`, recurring series expanded, ordered by start.
    async fn list_upcoming_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestGoogleCalendarClient {
    client: Client,
}

#[derive(Debug, serde::Deserialize)]
struct EventsPageResponse {
    items: Option<Vec<GoogleCalendarEvent>>,
}

impl ReqwestGoogleCalendarClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::OAuth(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn api_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("google calendar api error: http {}", status.as_u16())
        } else {
            format!("google calendar api error: http {}; body={body}", status.as_u16())
        };
        InfraError::OAuth(message)
    }

    fn events_endpoint(calendar_id: &str) -> Result<Url, InfraError> {
        let mut url = Url::parse(CALENDAR_API_BASE)
            .map_err(|error| InfraError::OAuth(format!("invalid calendar api base url: {error}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::OAuth("calendar api base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("calendars");
            segments.push(calendar_id);
            segments.push("events");
        }
        Ok(url)
    }

    fn upcoming_request(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        limit: u32,
    ) -> Result<reqwest::Request, InfraError> {
        let endpoint = Self::events_endpoint(calendar_id)?;
        self.client
            .get(endpoint)
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("maxResults", limit.max(1).to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("showDeleted", "false".to_string()),
            ])
            .build()
            .map_err(|error| InfraError::OAuth(format!("invalid events list request: {error}")))
    }

    async fn read_body(
        response: reqwest::Response,
        context: &str,
    ) -> Result<String, InfraError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::OAuth(format!("failed reading {context} response: {error}")))?;
        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl GoogleCalendarClient for ReqwestGoogleCalendarClient {
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<GoogleCalendarEvent, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let endpoint = Self::events_endpoint(calendar_id)?;
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|error| InfraError::OAuth(format!("network error while creating event: {error}")))?;
        let body = Self::read_body(response, "event create").await?;

        let created: GoogleCalendarEvent = serde_json::from_str(&body).map_err(|error| {
            InfraError::OAuth(format!("invalid event create payload: {error}; body={body}"))
        })?;
        if created
            .id
            .as_deref()
            .map(str::trim)
            .is_none_or(str::is_empty)
        {
            return Err(InfraError::OAuth(
                "event create response did not include id".to_string(),
            ));
        }
        Ok(created)
    }

    async fn list_upcoming_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let request = self.upcoming_request(access_token, calendar_id, time_min, limit)?;
        let response = self.client.execute(request).await.map_err(|error| {
            InfraError::OAuth(format!("network error while listing calendar events: {error}"))
        })?;
        let body = Self::read_body(response, "events list").await?;

        let parsed: EventsPageResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::OAuth(format!("invalid events list payload: {error}; body={body}"))
        })?;
        Ok(parsed.items.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn events_endpoint_escapes_calendar_id() {
        let url = ReqwestGoogleCalendarClient::events_endpoint("team@group.calendar.google.com")
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team@group.calendar.google.com/events"
        );

        let url = ReqwestGoogleCalendarClient::events_endpoint("a/b").expect("endpoint");
        assert!(url.as_str().ends_with("/calendars/a%2Fb/events"));
    }

    #[test]
    fn upcoming_request_orders_by_start_and_expands_series() {
        let client = ReqwestGoogleCalendarClient::new();
        let time_min = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).single().expect("valid");
        let request = client
            .upcoming_request("token", PRIMARY_CALENDAR_ID, time_min, 10)
            .expect("request");

        let query = request
            .url()
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect::<std::collections::HashMap<_, _>>();
        assert_eq!(query.get("orderBy").map(String::as_str), Some("startTime"));
        assert_eq!(query.get("singleEvents").map(String::as_str), Some("true"));
        assert_eq!(query.get("maxResults").map(String::as_str), Some("10"));
        assert_eq!(
            query.get("timeMin").map(String::as_str),
            Some("2026-03-10T08:00:00+00:00")
        );
        assert!(request.headers().contains_key(reqwest::header::AUTHORIZATION));
    }

    #[tokio::test]
    async fn empty_access_token_is_rejected_before_network() {
        let client = ReqwestGoogleCalendarClient::new();
        let result = client
            .list_upcoming_events("  ", PRIMARY_CALENDAR_ID, Utc::now(), 5)
            .await;
        assert!(matches!(result, Err(InfraError::OAuth(_))));
    }
}
