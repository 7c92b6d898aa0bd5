use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unsupported priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Status after one user toggle; completed wraps back to pending.
    pub fn next(self) -> Self {
        match self {
            Self::Pending => Self::InProgress,
            Self::InProgress => Self::Completed,
            Self::Completed => Self::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in-progress" | "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unsupported task status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub due_date: Option<String>,
    pub calendar_event_id: Option<String>,
    pub assigned_to_email: Option<String>,
    pub assigned_to_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.user_id, "task.user_id")?;
        validate_non_empty(&self.title, "task.title")?;
        if let Some(due_date) = self.due_date.as_deref() {
            validate_date(due_date, "task.due_date")?;
        }
        if let Some(email) = self.assigned_to_email.as_deref() {
            validate_email(email, "task.assigned_to_email")?;
        }
        if self.updated_at < self.created_at {
            return Err("task.updated_at must be >= task.created_at".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Meeting,
    Task,
    Personal,
    Break,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meeting => "meeting",
            Self::Task => "task",
            Self::Personal => "personal",
            Self::Break => "break",
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "meeting" => Ok(Self::Meeting),
            "task" => Ok(Self::Task),
            "personal" => Ok(Self::Personal),
            "break" => Ok(Self::Break),
            other => Err(format!("unsupported event type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventStatus {
    Todo,
    InProgress,
    Done,
}

impl EventStatus {
    pub fn next(self) -> Self {
        match self {
            Self::Todo => Self::InProgress,
            Self::InProgress => Self::Done,
            Self::Done => Self::Todo,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Done => "done",
        }
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "in-progress" | "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(format!("unsupported event status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyEvent {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: String,
    pub duration_minutes: u32,
    pub location: Option<String>,
    pub event_type: EventType,
    pub date: String,
    pub calendar_event_id: Option<String>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

impl DailyEvent {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "event.id")?;
        validate_non_empty(&self.user_id, "event.user_id")?;
        validate_non_empty(&self.title, "event.title")?;
        validate_hhmm(&self.start_time, "event.start_time")?;
        validate_date(&self.date, "event.date")?;
        if self.duration_minutes == 0 {
            return Err("event.duration_minutes must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FocusSession {
    pub id: String,
    pub user_id: String,
    pub duration_minutes: u32,
    pub date: String,
    pub created_at: DateTime<Utc>,
}

impl FocusSession {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "focus_session.id")?;
        validate_non_empty(&self.user_id, "focus_session.user_id")?;
        validate_date(&self.date, "focus_session.date")?;
        if self.duration_minutes == 0 {
            return Err("focus_session.duration_minutes must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Great,
    Good,
    Okay,
    Low,
    Awful,
}

impl Mood {
    pub const ALL: [Mood; 5] = [Mood::Great, Mood::Good, Mood::Okay, Mood::Low, Mood::Awful];

    /// Score on a 1..=5 scale used by the mood trend chart.
    pub fn score(self) -> f64 {
        match self {
            Self::Great => 5.0,
            Self::Good => 4.0,
            Self::Okay => 3.0,
            Self::Low => 2.0,
            Self::Awful => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Great => "great",
            Self::Good => "good",
            Self::Okay => "okay",
            Self::Low => "low",
            Self::Awful => "awful",
        }
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "great" => Ok(Self::Great),
            "good" => Ok(Self::Good),
            "okay" | "ok" => Ok(Self::Okay),
            "low" => Ok(Self::Low),
            "awful" => Ok(Self::Awful),
            other => Err(format!("unsupported mood: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoodCheckIn {
    pub id: String,
    pub user_id: String,
    pub mood: Mood,
    pub note: Option<String>,
    pub date: String,
    pub created_at: DateTime<Utc>,
}

impl MoodCheckIn {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "mood.id")?;
        validate_non_empty(&self.user_id, "mood.user_id")?;
        validate_date(&self.date, "mood.date")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub description: Option<String>,
    pub category: Option<String>,
    pub date: String,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "expense.id")?;
        validate_non_empty(&self.user_id, "expense.user_id")?;
        validate_date(&self.date, "expense.date")?;
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err("expense.amount must be a positive number".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    General,
    Date,
    Special,
    Holiday,
}

impl ReminderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Date => "date",
            Self::Special => "special",
            Self::Holiday => "holiday",
        }
    }
}

impl FromStr for ReminderType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(Self::General),
            "date" => Ok(Self::Date),
            "special" => Ok(Self::Special),
            "holiday" => Ok(Self::Holiday),
            other => Err(format!("unsupported reminder type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationshipReminder {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub target_date: String,
    #[serde(rename = "type")]
    pub reminder_type: ReminderType,
    pub created_at: DateTime<Utc>,
}

impl RelationshipReminder {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "reminder.id")?;
        validate_non_empty(&self.user_id, "reminder.user_id")?;
        validate_non_empty(&self.title, "reminder.title")?;
        validate_date(&self.target_date, "reminder.target_date")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweetMessage {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub ai_generated: bool,
    pub created_at: DateTime<Utc>,
}

impl SweetMessage {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "message.id")?;
        validate_non_empty(&self.user_id, "message.user_id")?;
        validate_non_empty(&self.content, "message.content")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPreference {
    pub user_id: String,
    pub task_reminders_enabled: bool,
    pub remind_days_before: u32,
    pub remind_hours_before: u32,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreference {
    pub fn defaults_for(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            task_reminders_enabled: true,
            remind_days_before: 1,
            remind_hours_before: 0,
            updated_at: now,
        }
    }

    pub fn apply_patch(&self, patch: &NotificationPreferencePatch, now: DateTime<Utc>) -> Self {
        Self {
            user_id: self.user_id.clone(),
            task_reminders_enabled: patch
                .task_reminders_enabled
                .unwrap_or(self.task_reminders_enabled),
            remind_days_before: patch.remind_days_before.unwrap_or(self.remind_days_before),
            remind_hours_before: patch.remind_hours_before.unwrap_or(self.remind_hours_before),
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.user_id, "preference.user_id")?;
        if self.remind_hours_before > 23 {
            return Err("preference.remind_hours_before must be <= 23".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPreferencePatch {
    pub task_reminders_enabled: Option<bool>,
    pub remind_days_before: Option<u32>,
    pub remind_hours_before: Option<u32>,
}

/// Calendar OAuth token kept in the OS keyring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.access_token.trim().is_empty()
    }
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    let mut split = value.split(':');
    let Some(hour_str) = split.next() else {
        return Err(format!("{field_name} must be HH:MM"));
    };
    let Some(minute_str) = split.next() else {
        return Err(format!("{field_name} must be HH:MM"));
    };
    if split.next().is_some() {
        return Err(format!("{field_name} must be HH:MM"));
    }

    let hour = hour_str
        .parse::<u8>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    let minute = minute_str
        .parse::<u8>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    if hour > 23 || minute > 59 {
        return Err(format!("{field_name} must be HH:MM"));
    }
    Ok(())
}

pub(crate) fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    parse_date(value).ok_or_else(|| format!("{field_name} must be YYYY-MM-DD"))?;
    Ok(())
}

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn validate_email(value: &str, field_name: &str) -> Result<(), String> {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return Err(format!("{field_name} must be an email address"));
    };
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.')
    {
        return Err(format!("{field_name} must be an email address"));
    }
    Ok(())
}
