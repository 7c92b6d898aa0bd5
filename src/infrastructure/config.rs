use crate::domain::pomodoro::{PomodoroSettings, MAX_PHASE_MINUTES};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const POMODORO_JSON: &str = "pomodoro.json";
const INTEGRATIONS_JSON: &str = "integrations.json";
const DEFAULT_SESSION_KEY_PREFIX: &str = "sb-";
const DEFAULT_UPCOMING_EVENTS_LIMIT: u64 = 10;
const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8080/oauth2/callback";
const DEFAULT_CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub app_name: String,
    pub timezone: Tz,
    pub session_key_prefix: String,
    pub pomodoro: PomodoroSettings,
    pub integrations: IntegrationSettings,
}

impl AppSettings {
    /// Calendar date in the configured timezone; every `date` column uses it.
    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationSettings {
    pub auth_base_url: Option<String>,
    pub functions_base_url: Option<String>,
    pub upcoming_events_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleOAuthSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "LifeSync AI",
                "timezone": "UTC",
                "sessionKeyPrefix": DEFAULT_SESSION_KEY_PREFIX
            }),
        ),
        (
            POMODORO_JSON,
            serde_json::json!({
                "schema": 1,
                "focusMinutes": 25,
                "shortBreakMinutes": 5,
                "longBreakMinutes": 15,
                "longBreakInterval": 4,
                "requireTaskToStart": false
            }),
        ),
        (
            INTEGRATIONS_JSON,
            serde_json::json!({
                "schema": 1,
                "authBaseUrl": null,
                "functionsBaseUrl": null,
                "upcomingEventsLimit": DEFAULT_UPCOMING_EVENTS_LIMIT
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_string(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn read_u32(value: &serde_json::Value, key: &str, default: u32) -> Result<u32, InfraError> {
    match value.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(raw) => raw
            .as_u64()
            .and_then(|number| u32::try_from(number).ok())
            .ok_or_else(|| InfraError::InvalidConfig(format!("{key} must be a non-negative integer"))),
    }
}

pub fn load_settings(config_dir: &Path) -> Result<AppSettings, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let pomodoro = read_config(&config_dir.join(POMODORO_JSON))?;
    let integrations = read_config(&config_dir.join(INTEGRATIONS_JSON))?;

    let timezone_name = read_string(&app, "timezone").unwrap_or_else(|| "UTC".to_string());
    let timezone = timezone_name.parse::<Tz>().map_err(|error| {
        InfraError::InvalidConfig(format!("invalid timezone '{timezone_name}': {error}"))
    })?;

    let defaults = PomodoroSettings::default();
    let pomodoro = PomodoroSettings {
        focus_minutes: read_u32(&pomodoro, "focusMinutes", defaults.focus_minutes)?,
        short_break_minutes: read_u32(&pomodoro, "shortBreakMinutes", defaults.short_break_minutes)?,
        long_break_minutes: read_u32(&pomodoro, "longBreakMinutes", defaults.long_break_minutes)?,
        long_break_interval: read_u32(&pomodoro, "longBreakInterval", defaults.long_break_interval)?,
        require_task_to_start: pomodoro
            .get("requireTaskToStart")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(defaults.require_task_to_start),
    };
    pomodoro.validate().map_err(InfraError::InvalidConfig)?;

    Ok(AppSettings {
        app_name: read_string(&app, "appName").unwrap_or_else(|| "LifeSync AI".to_string()),
        timezone,
        session_key_prefix: read_string(&app, "sessionKeyPrefix")
            .unwrap_or_else(|| DEFAULT_SESSION_KEY_PREFIX.to_string()),
        pomodoro,
        integrations: IntegrationSettings {
            auth_base_url: read_string(&integrations, "authBaseUrl"),
            functions_base_url: read_string(&integrations, "functionsBaseUrl"),
            upcoming_events_limit: read_u32(
                &integrations,
                "upcomingEventsLimit",
                DEFAULT_UPCOMING_EVENTS_LIMIT as u32,
            )?
            .max(1),
        },
    })
}

pub fn save_focus_minutes(config_dir: &Path, minutes: u32) -> Result<(), InfraError> {
    if minutes == 0 || minutes > MAX_PHASE_MINUTES {
        return Err(InfraError::InvalidConfig(format!(
            "focusMinutes must be between 1 and {MAX_PHASE_MINUTES}"
        )));
    }

    let path = config_dir.join(POMODORO_JSON);
    let mut pomodoro = read_config(&path)?;
    let object = pomodoro.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    object.insert("focusMinutes".to_string(), serde_json::Value::from(minutes));

    let formatted = serde_json::to_string_pretty(&pomodoro)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

pub fn load_anon_key_from_env() -> Option<String> {
    optional_lookup_value(
        &|key| std::env::var(key).ok(),
        &["LIFESYNC_ANON_KEY", "SUPABASE_ANON_KEY"],
    )
}

pub fn load_google_oauth_from_env() -> Result<GoogleOAuthSecrets, InfraError> {
    load_google_oauth_from_lookup(|key| std::env::var(key).ok())
}

pub(crate) fn load_google_oauth_from_lookup<F>(lookup: F) -> Result<GoogleOAuthSecrets, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let client_id = required_lookup_value(
        &lookup,
        &["LIFESYNC_GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_ID"],
        "google client id",
    )?;
    let client_secret = required_lookup_value(
        &lookup,
        &["LIFESYNC_GOOGLE_CLIENT_SECRET", "GOOGLE_CLIENT_SECRET"],
        "google client secret",
    )?;
    let redirect_uri = optional_lookup_value(
        &lookup,
        &["LIFESYNC_GOOGLE_REDIRECT_URI", "GOOGLE_REDIRECT_URI"],
    )
    .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
    let scopes = optional_lookup_value(&lookup, &["LIFESYNC_GOOGLE_SCOPES", "GOOGLE_SCOPES"])
        .map(|raw| parse_scope_list(&raw))
        .filter(|scopes| !scopes.is_empty())
        .unwrap_or_else(|| vec![DEFAULT_CALENDAR_SCOPE.to_string()]);

    Ok(GoogleOAuthSecrets {
        client_id,
        client_secret,
        redirect_uri,
        scopes,
    })
}

/// Secrets served by the credentials endpoint, with redirect and scopes from the
/// environment or their defaults.
pub fn google_oauth_from_credentials(client_id: &str, client_secret: &str) -> GoogleOAuthSecrets {
    let lookup = |key: &str| std::env::var(key).ok();
    GoogleOAuthSecrets {
        client_id: client_id.trim().to_string(),
        client_secret: client_secret.trim().to_string(),
        redirect_uri: optional_lookup_value(
            &lookup,
            &["LIFESYNC_GOOGLE_REDIRECT_URI", "GOOGLE_REDIRECT_URI"],
        )
        .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
        scopes: vec![DEFAULT_CALENDAR_SCOPE.to_string()],
    }
}

fn required_lookup_value<F>(
    lookup: &F,
    keys: &[&str],
    field_name: &str,
) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, keys).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "missing {} (set one of: {})",
            field_name,
            keys.join(", ")
        ))
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}

fn parse_scope_list(raw: &str) -> Vec<String> {
    raw.split([',', ' ', '\n', '\t'])
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
