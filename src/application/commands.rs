use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::calendar::{CalendarAvailability, CalendarService};
use crate::application::focus_timer::{FocusTimer, TerminalBellNotifier, TimerNotifier};
use crate::application::session::SessionManager;
use crate::domain::aggregation::{build_dashboard, DashboardSummary, DateWindow};
use crate::domain::models::{
    parse_date, DailyEvent, EventStatus, EventType, Expense, FocusSession, MoodCheckIn, Mood,
    NotificationPreference, NotificationPreferencePatch, Priority, RelationshipReminder,
    ReminderType, SweetMessage, Task, TaskStatus,
};
use crate::domain::pomodoro::PomodoroSnapshot;
use crate::domain::reminders::due_task_reminders;
use crate::domain::splitter::{classify_bulk_entry, BulkEntry};
use crate::infrastructure::auth_client::{
    AuthProvider, AuthSession, AuthUser, ReqwestAuthProvider, SignUpOutcome,
};
use crate::infrastructure::config::{
    load_anon_key_from_env, load_google_oauth_from_env, save_focus_minutes, AppSettings,
};
use crate::infrastructure::credential_store::KeyringCredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::UpcomingEvent;
use crate::infrastructure::functions_client::{
    CredentialsSource, EmailNotifier, MessageContext, MessageGenerator, MessageKind,
    ReqwestFunctionsClient, TaskAssignmentEmail, TaskReminderEmail,
};
use crate::infrastructure::google_calendar_client::ReqwestGoogleCalendarClient;
use crate::infrastructure::oauth_client::ReqwestOAuthClient;
use crate::infrastructure::session_storage::{JsonFileSessionStorage, SessionStorage};
use crate::infrastructure::store::SqliteLifeStore;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const DEFAULT_EVENT_DURATION_MINUTES: u32 = 60;
const DEFAULT_SWEET_MESSAGE_LIMIT: u32 = 20;
const FUNCTIONS_NOT_CONFIGURED: &str = "functionsBaseUrl is not configured";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

/// Collaborators behind the command layer. Production wiring comes from
/// `from_environment`; tests swap in fakes.
pub struct AppServices {
    pub auth_provider: Option<Arc<dyn AuthProvider>>,
    pub session_storage: Arc<dyn SessionStorage>,
    pub message_generator: Option<Arc<dyn MessageGenerator>>,
    pub email_notifier: Option<Arc<dyn EmailNotifier>>,
    pub calendar: CalendarService,
    pub timer_notifier: Arc<dyn TimerNotifier>,
}

impl AppServices {
    /// Missing integration settings disable the matching feature; they never
    /// fail startup.
    pub fn from_environment(bootstrap: &BootstrapResult) -> Result<Self, InfraError> {
        let settings = &bootstrap.settings;
        let anon_key = load_anon_key_from_env();

        let auth_provider: Option<Arc<dyn AuthProvider>> =
            match (settings.integrations.auth_base_url.as_deref(), anon_key.clone()) {
                (Some(base_url), Some(anon_key)) => {
                    Some(Arc::new(ReqwestAuthProvider::new(base_url, anon_key)?) as Arc<dyn AuthProvider>)
                }
                (Some(_), None) => {
                    tracing::warn!("authBaseUrl is set but no anon key was found, sign-in disabled");
                    None
                }
                (None, _) => None,
            };

        let functions = match settings.integrations.functions_base_url.as_deref() {
            Some(base_url) => Some(Arc::new(ReqwestFunctionsClient::new(base_url, anon_key)?)),
            None => None,
        };

        let env_secrets = match load_google_oauth_from_env() {
            Ok(secrets) => Some(secrets),
            Err(error) => {
                tracing::debug!(%error, "google oauth secrets not in environment");
                None
            }
        };

        let calendar = CalendarService::new(
            env_secrets,
            functions
                .clone()
                .map(|client| client as Arc<dyn CredentialsSource>),
            Arc::new(KeyringCredentialStore::default()),
            Arc::new(ReqwestOAuthClient::new()),
            Arc::new(ReqwestGoogleCalendarClient::new()),
            settings.timezone,
        );

        Ok(Self {
            auth_provider,
            session_storage: Arc::new(JsonFileSessionStorage::new(&bootstrap.session_path)),
            message_generator: functions
                .clone()
                .map(|client| client as Arc<dyn MessageGenerator>),
            email_notifier: functions.map(|client| client as Arc<dyn EmailNotifier>),
            calendar,
            timer_notifier: Arc::new(TerminalBellNotifier),
        })
    }
}

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    settings: AppSettings,
    store: Arc<SqliteLifeStore>,
    session: SessionManager,
    focus_timer: Arc<FocusTimer>,
    message_generator: Option<Arc<dyn MessageGenerator>>,
    email_notifier: Option<Arc<dyn EmailNotifier>>,
    calendar: CalendarService,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let services = AppServices::from_environment(&bootstrap)?;
        Self::with_services(bootstrap, services)
    }

    pub fn with_services(bootstrap: BootstrapResult, services: AppServices) -> Result<Self, InfraError> {
        let settings = bootstrap.settings;
        let store = Arc::new(SqliteLifeStore::new(&bootstrap.database_path));
        let session = SessionManager::new(
            services.auth_provider,
            services.session_storage,
            settings.session_key_prefix.clone(),
        );
        let focus_timer = Arc::new(FocusTimer::new(
            settings.pomodoro.clone(),
            store.clone(),
            services.timer_notifier,
            settings.timezone,
        ));
        if let Some(user) = session.current_user()? {
            focus_timer.attach_user(Some(&user.id))?;
        }

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            settings,
            store,
            session,
            focus_timer,
            message_generator: services.message_generator,
            email_notifier: services.email_notifier,
            calendar: services.calendar,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn focus_timer(&self) -> &Arc<FocusTimer> {
        &self.focus_timer
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        tracing::info!(command, "{message}");
    }

    pub fn log_error(&self, command: &str, message: &str) {
        tracing::error!(command, "{message}");
    }

    fn require_session(&self) -> Result<AuthSession, InfraError> {
        self.session.require_session(Utc::now())
    }

    fn today(&self) -> NaiveDate {
        self.settings.today()
    }

    fn message_generator(&self) -> Result<&Arc<dyn MessageGenerator>, InfraError> {
        self.message_generator
            .as_ref()
            .ok_or_else(|| InfraError::InvalidConfig(FUNCTIONS_NOT_CONFIGURED.to_string()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTaskInput {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub assigned_to_email: Option<String>,
    pub assigned_to_name: Option<String>,
}

/// `Some("")` clears an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub due_date: Option<String>,
    pub assigned_to_email: Option<String>,
    pub assigned_to_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEventInput {
    pub title: String,
    pub description: Option<String>,
    pub start_time: String,
    pub duration_minutes: Option<u32>,
    pub location: Option<String>,
    pub event_type: Option<String>,
    pub date: Option<String>,
    #[serde(default)]
    pub sync_to_calendar: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpenseInput {
    pub amount: f64,
    pub description: Option<String>,
    pub category: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminderInput {
    pub title: String,
    pub target_date: String,
    pub reminder_type: Option<String>,
}

/// Pre-filled form values for a relationship reminder.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderDraft {
    pub title: String,
    pub target_date: String,
    pub reminder_type: ReminderType,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRunReport {
    pub sent: Vec<String>,
    pub failed: Vec<String>,
}

// ---- session ----

pub async fn sign_in_impl(state: &AppState, email: String, password: String) -> Result<AuthUser, InfraError> {
    let session = state.session.sign_in(&email, &password).await?;
    state.focus_timer.attach_user(Some(&session.user.id))?;
    state.log_info("sign_in", &format!("user_id={}", session.user.id));
    Ok(session.user)
}

pub async fn sign_up_impl(
    state: &AppState,
    email: String,
    password: String,
    display_name: Option<String>,
) -> Result<SignUpOutcome, InfraError> {
    let outcome = state
        .session
        .sign_up(&email, &password, display_name.as_deref())
        .await?;
    match &outcome {
        SignUpOutcome::SignedIn(session) => {
            state.focus_timer.attach_user(Some(&session.user.id))?;
            state.log_info("sign_up", &format!("user_id={}", session.user.id));
        }
        SignUpOutcome::ConfirmationRequired { email } => {
            state.log_info("sign_up", &format!("confirmation sent to {email}"));
        }
    }
    Ok(outcome)
}

pub async fn sign_out_impl(state: &AppState) -> Result<(), InfraError> {
    state.session.sign_out().await?;
    state.focus_timer.attach_user(None)?;
    state.log_info("sign_out", "session cleared");
    Ok(())
}

pub fn current_user_impl(state: &AppState) -> Result<Option<AuthUser>, InfraError> {
    state.session.current_user()
}

// ---- tasks ----

/// Creates one task per bulk-entry fragment, all sharing the form metadata.
pub async fn create_tasks_impl(state: &AppState, input: NewTaskInput) -> Result<Vec<Task>, InfraError> {
    let session = state.require_session()?;
    let titles = bulk_titles(&input.title, "title")?;
    let priority = parse_choice(input.priority.as_deref(), Priority::Medium)?;
    let due_date = optional_date(input.due_date.as_deref(), "due_date")?;
    let description = non_empty(input.description);
    let assigned_to_email = non_empty(input.assigned_to_email);
    let assigned_to_name = non_empty(input.assigned_to_name);
    let now = Utc::now();

    let mut created = Vec::with_capacity(titles.len());
    for title in titles {
        let task = Task {
            id: next_id("tsk"),
            user_id: session.user.id.clone(),
            title,
            description: description.clone(),
            priority,
            status: TaskStatus::Pending,
            due_date: due_date.clone(),
            calendar_event_id: None,
            assigned_to_email: assigned_to_email.clone(),
            assigned_to_name: assigned_to_name.clone(),
            created_at: now,
            updated_at: now,
        };
        state.store.insert_task(&task)?;
        created.push(task);
    }

    if due_date.is_some() && calendar_connected(state, &session).await {
        for task in created.iter_mut() {
            push_task_to_calendar(state, &session, task).await;
        }
    }
    for task in &created {
        notify_assignee(state, &session, task);
    }

    state.log_info("create_tasks", &format!("created {} task(s)", created.len()));
    Ok(created)
}

pub fn list_tasks_impl(state: &AppState) -> Result<Vec<Task>, InfraError> {
    let session = state.require_session()?;
    state.store.list_tasks(&session.user.id)
}

pub fn toggle_task_status_impl(state: &AppState, task_id: String) -> Result<Task, InfraError> {
    let session = state.require_session()?;
    let mut task = required_task(state, &session, &task_id)?;
    task.status = task.status.next();
    task.updated_at = Utc::now();
    state.store.update_task(&task)?;
    state.log_info(
        "toggle_task_status",
        &format!("task_id={} status={}", task.id, task.status.as_str()),
    );
    Ok(task)
}

pub fn update_task_impl(state: &AppState, task_id: String, patch: TaskPatch) -> Result<Task, InfraError> {
    let session = state.require_session()?;
    let mut task = required_task(state, &session, &task_id)?;

    if let Some(title) = patch.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(InfraError::Validation("title must not be empty".to_string()));
        }
        task.title = title.to_string();
    }
    if let Some(description) = patch.description {
        task.description = non_empty(Some(description));
    }
    if let Some(priority) = patch.priority {
        task.priority = priority.parse::<Priority>()?;
    }
    if let Some(status) = patch.status {
        task.status = status.parse::<TaskStatus>()?;
    }
    if let Some(due_date) = patch.due_date {
        task.due_date = optional_date(Some(&due_date), "due_date")?;
    }
    if let Some(email) = patch.assigned_to_email {
        task.assigned_to_email = non_empty(Some(email));
    }
    if let Some(name) = patch.assigned_to_name {
        task.assigned_to_name = non_empty(Some(name));
    }
    task.updated_at = Utc::now();

    state.store.update_task(&task)?;
    state.log_info("update_task", &format!("updated task_id={}", task.id));
    Ok(task)
}

pub fn delete_task_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    let session = state.require_session()?;
    let task_id = required_id(&task_id, "task_id")?;
    let removed = state.store.delete_task(&session.user.id, task_id)?;
    if removed {
        state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    }
    Ok(removed)
}

// ---- daily events ----

pub async fn create_events_impl(
    state: &AppState,
    input: NewEventInput,
) -> Result<Vec<DailyEvent>, InfraError> {
    let session = state.require_session()?;
    let titles = bulk_titles(&input.title, "title")?;
    let event_type = parse_choice(input.event_type.as_deref(), EventType::Personal)?;
    let date = date_or_today(state, input.date.as_deref(), "date")?;
    let description = non_empty(input.description);
    let location = non_empty(input.location);
    let start_time = input.start_time.trim().to_string();
    let duration_minutes = input.duration_minutes.unwrap_or(DEFAULT_EVENT_DURATION_MINUTES);
    let now = Utc::now();

    let mut created = Vec::with_capacity(titles.len());
    for title in titles {
        let event = DailyEvent {
            id: next_id("evt"),
            user_id: session.user.id.clone(),
            title,
            description: description.clone(),
            start_time: start_time.clone(),
            duration_minutes,
            location: location.clone(),
            event_type,
            date: date.clone(),
            calendar_event_id: None,
            status: EventStatus::Todo,
            created_at: now,
        };
        state.store.insert_event(&event)?;
        created.push(event);
    }

    if input.sync_to_calendar {
        if calendar_connected(state, &session).await {
            for event in created.iter_mut() {
                push_event_to_calendar(state, &session, event).await;
            }
        } else {
            tracing::warn!("calendar sync requested but the calendar is not connected");
        }
    }

    state.log_info("create_events", &format!("created {} event(s) on {date}", created.len()));
    Ok(created)
}

pub fn list_events_impl(state: &AppState, date: Option<String>) -> Result<Vec<DailyEvent>, InfraError> {
    let session = state.require_session()?;
    let date = date_or_today(state, date.as_deref(), "date")?;
    state.store.list_events_on(&session.user.id, &date)
}

pub fn toggle_event_status_impl(state: &AppState, event_id: String) -> Result<DailyEvent, InfraError> {
    let session = state.require_session()?;
    let event_id = required_id(&event_id, "event_id")?;
    let mut event = state
        .store
        .get_event(&session.user.id, event_id)?
        .ok_or_else(|| InfraError::NotFound(format!("event {event_id}")))?;
    event.status = event.status.next();
    state.store.update_event(&event)?;
    state.log_info(
        "toggle_event_status",
        &format!("event_id={} status={}", event.id, event.status.as_str()),
    );
    Ok(event)
}

pub fn delete_event_impl(state: &AppState, event_id: String) -> Result<bool, InfraError> {
    let session = state.require_session()?;
    let event_id = required_id(&event_id, "event_id")?;
    let removed = state.store.delete_event(&session.user.id, event_id)?;
    if removed {
        state.log_info("delete_event", &format!("deleted event_id={event_id}"));
    }
    Ok(removed)
}

// ---- journal and expenses ----

pub fn record_mood_impl(
    state: &AppState,
    mood: String,
    note: Option<String>,
    date: Option<String>,
) -> Result<MoodCheckIn, InfraError> {
    let session = state.require_session()?;
    let check_in = MoodCheckIn {
        id: next_id("mood"),
        user_id: session.user.id.clone(),
        mood: mood.parse::<Mood>()?,
        note: non_empty(note),
        date: date_or_today(state, date.as_deref(), "date")?,
        created_at: Utc::now(),
    };
    state.store.insert_mood(&check_in)?;
    state.log_info("record_mood", &format!("mood={} date={}", check_in.mood.as_str(), check_in.date));
    Ok(check_in)
}

pub fn list_moods_impl(state: &AppState, window: String) -> Result<Vec<MoodCheckIn>, InfraError> {
    let session = state.require_session()?;
    let (from, to) = window_bounds(state, &window)?;
    state.store.list_moods(&session.user.id, &from, &to)
}

pub fn record_expense_impl(state: &AppState, input: NewExpenseInput) -> Result<Expense, InfraError> {
    let session = state.require_session()?;
    let expense = Expense {
        id: next_id("exp"),
        user_id: session.user.id.clone(),
        amount: input.amount,
        description: non_empty(input.description),
        category: non_empty(input.category),
        date: date_or_today(state, input.date.as_deref(), "date")?,
        created_at: Utc::now(),
    };
    state.store.insert_expense(&expense)?;
    state.log_info("record_expense", &format!("expense_id={} amount={}", expense.id, expense.amount));
    Ok(expense)
}

pub fn list_expenses_impl(state: &AppState, window: String) -> Result<Vec<Expense>, InfraError> {
    let session = state.require_session()?;
    let (from, to) = window_bounds(state, &window)?;
    state.store.list_expenses(&session.user.id, &from, &to)
}

pub fn list_focus_sessions_impl(state: &AppState, window: String) -> Result<Vec<FocusSession>, InfraError> {
    let session = state.require_session()?;
    let (from, to) = window_bounds(state, &window)?;
    state.store.list_focus_sessions(&session.user.id, &from, &to)
}

pub fn dashboard_summary_impl(state: &AppState, window: String) -> Result<DashboardSummary, InfraError> {
    let session = state.require_session()?;
    let window = window.parse::<DateWindow>()?;
    let today = state.today();
    let (from, to) = window.range(today);
    let (from, to) = (from.to_string(), to.to_string());
    let user_id = session.user.id.as_str();

    let summary = build_dashboard(
        window,
        today,
        &state.store.list_focus_sessions(user_id, &from, &to)?,
        &state.store.list_moods(user_id, &from, &to)?,
        &state.store.list_tasks(user_id)?,
        &state.store.list_expenses(user_id, &from, &to)?,
    );
    state.log_info("dashboard_summary", &format!("window={from}..{to}"));
    Ok(summary)
}

// ---- relationship care ----

pub fn create_relationship_reminder_impl(
    state: &AppState,
    input: NewReminderInput,
) -> Result<RelationshipReminder, InfraError> {
    let session = state.require_session()?;
    let reminder = RelationshipReminder {
        id: next_id("rem"),
        user_id: session.user.id.clone(),
        title: input.title.trim().to_string(),
        target_date: normalized_date(&input.target_date, "target_date")?,
        reminder_type: parse_choice(input.reminder_type.as_deref(), ReminderType::General)?,
        created_at: Utc::now(),
    };
    state.store.insert_relationship_reminder(&reminder)?;
    state.log_info(
        "create_relationship_reminder",
        &format!("reminder_id={} target_date={}", reminder.id, reminder.target_date),
    );
    Ok(reminder)
}

pub fn list_relationship_reminders_impl(state: &AppState) -> Result<Vec<RelationshipReminder>, InfraError> {
    let session = state.require_session()?;
    state.store.list_relationship_reminders(&session.user.id)
}

pub fn delete_relationship_reminder_impl(state: &AppState, reminder_id: String) -> Result<bool, InfraError> {
    let session = state.require_session()?;
    let reminder_id = required_id(&reminder_id, "reminder_id")?;
    let removed = state
        .store
        .delete_relationship_reminder(&session.user.id, reminder_id)?;
    if removed {
        state.log_info(
            "delete_relationship_reminder",
            &format!("deleted reminder_id={reminder_id}"),
        );
    }
    Ok(removed)
}

/// Asks the generator for a reminder idea and returns it as form defaults.
/// Nothing is stored until `create_relationship_reminder_impl` is called.
pub async fn suggest_relationship_reminder_impl(
    state: &AppState,
    context: MessageContext,
) -> Result<ReminderDraft, InfraError> {
    let session = state.require_session()?;
    let suggestion = state
        .message_generator()?
        .generate(&session.access_token, MessageKind::ReminderSuggestion, &context)
        .await?;
    let title = suggestion
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string();
    if title.is_empty() {
        return Err(InfraError::Integration("reminder suggestion was empty".to_string()));
    }

    state.log_info("suggest_relationship_reminder", "suggestion generated");
    Ok(ReminderDraft {
        title,
        target_date: state.today().to_string(),
        reminder_type: ReminderType::General,
    })
}

pub async fn generate_sweet_message_impl(
    state: &AppState,
    context: MessageContext,
) -> Result<SweetMessage, InfraError> {
    let session = state.require_session()?;
    let content = state
        .message_generator()?
        .generate(&session.access_token, MessageKind::SweetMessage, &context)
        .await?;
    let message = SweetMessage {
        id: next_id("msg"),
        user_id: session.user.id.clone(),
        content: content.trim().to_string(),
        ai_generated: true,
        created_at: Utc::now(),
    };
    state.store.insert_sweet_message(&message)?;
    state.log_info("generate_sweet_message", &format!("message_id={}", message.id));
    Ok(message)
}

pub fn save_sweet_message_impl(state: &AppState, content: String) -> Result<SweetMessage, InfraError> {
    let session = state.require_session()?;
    let message = SweetMessage {
        id: next_id("msg"),
        user_id: session.user.id.clone(),
        content: content.trim().to_string(),
        ai_generated: false,
        created_at: Utc::now(),
    };
    state.store.insert_sweet_message(&message)?;
    state.log_info("save_sweet_message", &format!("message_id={}", message.id));
    Ok(message)
}

pub fn list_sweet_messages_impl(state: &AppState, limit: Option<u32>) -> Result<Vec<SweetMessage>, InfraError> {
    let session = state.require_session()?;
    state
        .store
        .list_sweet_messages(&session.user.id, limit.unwrap_or(DEFAULT_SWEET_MESSAGE_LIMIT))
}

/// Suggestion for the current mood. The latest check-in of the past week is
/// sent along as `recentMood`.
pub async fn suggest_mood_activity_impl(state: &AppState, mood: Option<String>) -> Result<String, InfraError> {
    let session = state.require_session()?;
    let mood = mood.map(|value| value.parse::<Mood>()).transpose()?;
    let (from, to) = DateWindow::Last7Days.range(state.today());
    let recent = state
        .store
        .list_moods(&session.user.id, &from.to_string(), &to.to_string())?
        .into_iter()
        .max_by(|left, right| left.created_at.cmp(&right.created_at));

    let context = MessageContext {
        mood: mood.map(|mood| mood.as_str().to_string()),
        recent_mood: recent.map(|check_in| check_in.mood.as_str().to_string()),
        ..MessageContext::default()
    };
    let suggestion = state
        .message_generator()?
        .generate(&session.access_token, MessageKind::MoodSuggestion, &context)
        .await?;
    state.log_info("suggest_mood_activity", "suggestion generated");
    Ok(suggestion)
}

// ---- notifications ----

pub fn get_notification_preference_impl(state: &AppState) -> Result<NotificationPreference, InfraError> {
    let session = state.require_session()?;
    state.store.notification_preference(&session.user.id, Utc::now())
}

pub fn update_notification_preference_impl(
    state: &AppState,
    patch: NotificationPreferencePatch,
) -> Result<NotificationPreference, InfraError> {
    let session = state.require_session()?;
    let now = Utc::now();
    let current = state.store.notification_preference(&session.user.id, now)?;
    let updated = current.apply_patch(&patch, now);
    state.store.save_notification_preference(&updated)?;
    state.log_info(
        "update_notification_preference",
        &format!(
            "enabled={} days_before={}",
            updated.task_reminders_enabled, updated.remind_days_before
        ),
    );
    Ok(updated)
}

/// Sends one reminder email per due task and records each successful send so
/// the task is not reminded twice. A failed send is logged and skipped.
pub async fn send_due_task_reminders_impl(state: &AppState) -> Result<ReminderRunReport, InfraError> {
    let session = state.require_session()?;
    let notifier = state
        .email_notifier
        .as_ref()
        .ok_or_else(|| InfraError::InvalidConfig(FUNCTIONS_NOT_CONFIGURED.to_string()))?;
    let user_id = session.user.id.as_str();
    let now = Utc::now();

    let preference = state.store.notification_preference(user_id, now)?;
    let tasks = state.store.list_tasks(user_id)?;
    let already_sent = state.store.reminded_task_ids(user_id)?;
    let due = due_task_reminders(&tasks, &preference, state.today(), &already_sent);

    let mut report = ReminderRunReport::default();
    for reminder in due {
        let Some(due_date) = reminder.task.due_date.clone() else {
            continue;
        };
        let email = TaskReminderEmail {
            task_id: reminder.task.id.clone(),
            user_id: user_id.to_string(),
            task_title: reminder.task.title.clone(),
            due_date,
            assigned_to_email: reminder.task.assigned_to_email.clone(),
            days_until_due: reminder.days_until_due,
        };
        match notifier.send_task_reminder(&session.access_token, &email).await {
            Ok(()) => {
                state
                    .store
                    .record_task_reminder(user_id, &email.task_id, email.days_until_due, Utc::now())?;
                report.sent.push(email.task_id);
            }
            Err(error) => {
                tracing::warn!(task_id = %email.task_id, %error, "task reminder email failed");
                report.failed.push(email.task_id);
            }
        }
    }

    state.log_info(
        "send_due_task_reminders",
        &format!("sent={} failed={}", report.sent.len(), report.failed.len()),
    );
    Ok(report)
}

// ---- calendar ----

pub async fn calendar_availability_impl(state: &AppState) -> Result<CalendarAvailability, InfraError> {
    let session = state.require_session()?;
    state.calendar.availability(&session).await
}

pub async fn calendar_authorization_url_impl(state: &AppState) -> Result<String, InfraError> {
    let session = state.require_session()?;
    state.calendar.authorization_url(&session).await
}

pub async fn connect_calendar_impl(
    state: &AppState,
    authorization_code: String,
) -> Result<CalendarAvailability, InfraError> {
    let session = state.require_session()?;
    let token = state.calendar.connect(&session, &authorization_code).await?;
    state.log_info(
        "connect_calendar",
        &format!("token expires_at={}", token.expires_at.to_rfc3339()),
    );
    Ok(CalendarAvailability::Ready { connected: true })
}

pub async fn disconnect_calendar_impl(state: &AppState) -> Result<CalendarAvailability, InfraError> {
    let session = state.require_session()?;
    state.calendar.disconnect(&session).await?;
    state.log_info("disconnect_calendar", "calendar token removed");
    state.calendar.availability(&session).await
}

pub async fn list_upcoming_events_impl(
    state: &AppState,
    limit: Option<u32>,
) -> Result<Vec<UpcomingEvent>, InfraError> {
    let session = state.require_session()?;
    let limit = limit
        .unwrap_or(state.settings.integrations.upcoming_events_limit)
        .max(1);
    state.calendar.list_upcoming_events(&session, limit).await
}

// ---- focus timer ----

pub fn get_timer_state_impl(state: &AppState) -> Result<PomodoroSnapshot, InfraError> {
    state.focus_timer.snapshot()
}

pub fn start_timer_impl(state: &AppState, task_id: Option<String>) -> Result<PomodoroSnapshot, InfraError> {
    let snapshot = state.focus_timer.start(task_id.as_deref())?;
    state.log_info("start_timer", &format!("phase={:?}", snapshot.phase));
    Ok(snapshot)
}

pub fn pause_timer_impl(state: &AppState) -> Result<PomodoroSnapshot, InfraError> {
    state.focus_timer.pause()
}

pub fn resume_timer_impl(state: &AppState) -> Result<PomodoroSnapshot, InfraError> {
    state.focus_timer.resume()
}

pub fn toggle_timer_pause_impl(state: &AppState) -> Result<PomodoroSnapshot, InfraError> {
    state.focus_timer.toggle_pause()
}

pub fn stop_timer_impl(state: &AppState) -> Result<PomodoroSnapshot, InfraError> {
    let snapshot = state.focus_timer.stop()?;
    state.log_info("stop_timer", &format!("phase={:?}", snapshot.phase));
    Ok(snapshot)
}

pub fn reset_timer_impl(state: &AppState) -> Result<PomodoroSnapshot, InfraError> {
    let snapshot = state.focus_timer.reset()?;
    state.log_info("reset_timer", "timer reset");
    Ok(snapshot)
}

/// Changes the focus length and keeps it in `pomodoro.json` for the next start.
/// The timer keeps its old length if the file cannot be written.
pub fn set_focus_duration_impl(state: &AppState, minutes: u32) -> Result<PomodoroSnapshot, InfraError> {
    let previous = state.focus_timer.snapshot()?.focus_duration_minutes;
    let snapshot = state.focus_timer.set_focus_duration_minutes(minutes)?;
    if let Err(error) = save_focus_minutes(&state.config_dir, minutes) {
        if let Err(rollback) = state.focus_timer.set_focus_duration_minutes(previous) {
            state.log_error("set_focus_duration", &format!("rollback failed: {rollback}"));
        }
        return Err(error);
    }
    state.log_info("set_focus_duration", &format!("focus_minutes={minutes}"));
    Ok(snapshot)
}

// ---- helpers ----

fn required_id<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::Validation(format!("{field_name} must not be empty")));
    }
    Ok(value)
}

fn required_task(state: &AppState, session: &AuthSession, task_id: &str) -> Result<Task, InfraError> {
    let task_id = required_id(task_id, "task_id")?;
    state
        .store
        .get_task(&session.user.id, task_id)?
        .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_choice<T>(value: Option<&str>, default: T) -> Result<T, InfraError>
where
    T: FromStr<Err = String>,
{
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(raw) => Ok(raw.parse::<T>()?),
        None => Ok(default),
    }
}

fn normalized_date(value: &str, field_name: &str) -> Result<String, InfraError> {
    parse_date(value)
        .map(|date| date.to_string())
        .ok_or_else(|| InfraError::Validation(format!("{field_name} must be YYYY-MM-DD")))
}

fn optional_date(value: Option<&str>, field_name: &str) -> Result<Option<String>, InfraError> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(raw) => normalized_date(raw, field_name).map(Some),
        None => Ok(None),
    }
}

fn date_or_today(state: &AppState, value: Option<&str>, field_name: &str) -> Result<String, InfraError> {
    Ok(optional_date(value, field_name)?.unwrap_or_else(|| state.today().to_string()))
}

fn window_bounds(state: &AppState, window: &str) -> Result<(String, String), InfraError> {
    let (from, to) = window.parse::<DateWindow>()?.range(state.today());
    Ok((from.to_string(), to.to_string()))
}

/// Titles for one form submission. A single fragment (or none) keeps the
/// title as typed.
fn bulk_titles(input: &str, field_name: &str) -> Result<Vec<String>, InfraError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InfraError::Validation(format!("{field_name} must not be empty")));
    }
    Ok(match classify_bulk_entry(trimmed) {
        BulkEntry::Multiple(titles) => titles,
        BulkEntry::Single(_) | BulkEntry::Empty => vec![trimmed.to_string()],
    })
}

async fn calendar_connected(state: &AppState, session: &AuthSession) -> bool {
    match state.calendar.availability(session).await {
        Ok(CalendarAvailability::Ready { connected }) => connected,
        Ok(CalendarAvailability::SetupRequired) => false,
        Err(error) => {
            tracing::warn!(%error, "calendar availability check failed");
            false
        }
    }
}

async fn push_task_to_calendar(state: &AppState, session: &AuthSession, task: &mut Task) {
    match state.calendar.push_task(session, task).await {
        Ok(Some(event_id)) => {
            task.calendar_event_id = Some(event_id);
            if let Err(error) = state.store.update_task(task) {
                tracing::warn!(task_id = %task.id, %error, "failed to store calendar event id");
            }
        }
        Ok(None) => {}
        Err(error) => tracing::warn!(task_id = %task.id, %error, "calendar push failed"),
    }
}

async fn push_event_to_calendar(state: &AppState, session: &AuthSession, event: &mut DailyEvent) {
    match state.calendar.push_daily_event(session, event).await {
        Ok(Some(event_id)) => {
            event.calendar_event_id = Some(event_id);
            if let Err(error) = state.store.update_event(event) {
                tracing::warn!(event_id = %event.id, %error, "failed to store calendar event id");
            }
        }
        Ok(None) => {}
        Err(error) => tracing::warn!(event_id = %event.id, %error, "calendar push failed"),
    }
}

/// Fire-and-forget; the task is already stored when this runs.
fn notify_assignee(state: &AppState, session: &AuthSession, task: &Task) {
    let (Some(notifier), Some(assigned_to_email)) =
        (state.email_notifier.clone(), task.assigned_to_email.clone())
    else {
        return;
    };

    let email = TaskAssignmentEmail {
        task_title: task.title.clone(),
        task_description: task.description.clone(),
        assigned_to_email,
        assigned_to_name: task.assigned_to_name.clone(),
        assigned_by_email: session.user.email.clone().unwrap_or_default(),
        due_date: task.due_date.clone(),
        priority: task.priority.as_str().to_string(),
    };
    let access_token = session.access_token.clone();
    let task_id = task.id.clone();
    tokio::spawn(async move {
        match notifier.send_task_assignment(&access_token, &email).await {
            Ok(()) => tracing::info!(%task_id, "assignment email sent"),
            Err(error) => tracing::warn!(%task_id, %error, "assignment email failed"),
        }
    });
}
