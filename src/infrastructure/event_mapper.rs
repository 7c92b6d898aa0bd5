use crate::domain::models::{parse_date, DailyEvent, Task};
use crate::infrastructure::error::InfraError;
use chrono::{Duration, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use std::collections::HashMap;

const KEY_SOURCE: &str = "lifesync_source";
const KEY_SOURCE_ID: &str = "lifesync_source_id";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    /// All-day events carry a plain `YYYY-MM-DD` date instead of `dateTime`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventExtendedProperties {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub private: HashMap<String, String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleCalendarEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "htmlLink", default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(default)]
    pub start: CalendarEventDateTime,
    #[serde(default)]
    pub end: CalendarEventDateTime,
    #[serde(rename = "extendedProperties", default, skip_serializing_if = "Option::is_none")]
    pub extended_properties: Option<CalendarEventExtendedProperties>,
}

/// Event as shown in the upcoming list.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingEvent {
    pub id: String,
    pub summary: String,
    pub start: String,
    pub end: Option<String>,
    pub all_day: bool,
    pub location: Option<String>,
    pub html_link: Option<String>,
}

/// Tasks become all-day events on their due date. Tasks without one are not pushed.
pub fn encode_task_event(task: &Task) -> Result<Option<GoogleCalendarEvent>, InfraError> {
    let Some(raw_due) = task.due_date.as_deref() else {
        return Ok(None);
    };
    let due = parse_date(raw_due)
        .ok_or_else(|| InfraError::Validation(format!("task.due_date must be YYYY-MM-DD: {raw_due}")))?;
    let next_day = due + Duration::days(1);

    Ok(Some(GoogleCalendarEvent {
        id: None,
        summary: Some(task.title.clone()),
        description: task.description.clone(),
        location: None,
        status: None,
        html_link: None,
        start: CalendarEventDateTime {
            date: Some(due.format("%Y-%m-%d").to_string()),
            ..CalendarEventDateTime::default()
        },
        end: CalendarEventDateTime {
            date: Some(next_day.format("%Y-%m-%d").to_string()),
            ..CalendarEventDateTime::default()
        },
        extended_properties: Some(source_properties("task", &task.id)),
    }))
}

pub fn encode_daily_event(event: &DailyEvent, timezone: Tz) -> Result<GoogleCalendarEvent, InfraError> {
    let date = parse_date(&event.date)
        .ok_or_else(|| InfraError::Validation(format!("event.date must be YYYY-MM-DD: {}", event.date)))?;
    let time = NaiveTime::parse_from_str(&event.start_time, "%H:%M").map_err(|error| {
        InfraError::Validation(format!("event.start_time must be HH:MM: {error}"))
    })?;
    let local_start = NaiveDateTime::new(date, time);
    let start = timezone
        .from_local_datetime(&local_start)
        .earliest()
        .ok_or_else(|| {
            InfraError::Validation(format!(
                "{} {} does not exist in {}",
                event.date,
                event.start_time,
                timezone.name()
            ))
        })?;
    let end = start + Duration::minutes(i64::from(event.duration_minutes));

    Ok(GoogleCalendarEvent {
        id: None,
        summary: Some(event.title.clone()),
        description: event.description.clone(),
        location: event.location.clone(),
        status: None,
        html_link: None,
        start: CalendarEventDateTime {
            date_time: Some(start.to_rfc3339()),
            date: None,
            time_zone: Some(timezone.name().to_string()),
        },
        end: CalendarEventDateTime {
            date_time: Some(end.to_rfc3339()),
            date: None,
            time_zone: Some(timezone.name().to_string()),
        },
        extended_properties: Some(source_properties("daily_event", &event.id)),
    })
}

/// Cancelled or id-less events are dropped.
pub fn decode_upcoming_event(event: &GoogleCalendarEvent) -> Option<UpcomingEvent> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }
    let id = event.id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;
    let (start, all_day) = match (&event.start.date_time, &event.start.date) {
        (Some(date_time), _) => (date_time.clone(), false),
        (None, Some(date)) => (date.clone(), true),
        (None, None) => return None,
    };
    let end = event.end.date_time.clone().or_else(|| event.end.date.clone());

    Some(UpcomingEvent {
        id: id.to_string(),
        summary: event
            .summary
            .clone()
            .filter(|summary| !summary.trim().is_empty())
            .unwrap_or_else(|| "(no title)".to_string()),
        start,
        end,
        all_day,
        location: event.location.clone(),
        html_link: event.html_link.clone(),
    })
}

fn source_properties(source: &str, source_id: &str) -> CalendarEventExtendedProperties {
    let mut private = HashMap::new();
    private.insert(KEY_SOURCE.to_string(), source.to_string());
    private.insert(KEY_SOURCE_ID.to_string(), source_id.to_string());
    CalendarEventExtendedProperties { private }
}
