use crate::domain::models::{
    DailyEvent, Expense, FocusSession, MoodCheckIn, NotificationPreference, RelationshipReminder,
    SweetMessage, Task,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{format_timestamp, open_connection, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Persistence seam for the shared focus timer.
pub trait FocusSessionRepository: Send + Sync {
    fn record_focus_session(&self, session: &FocusSession) -> Result<(), InfraError>;
    fn focus_minutes_on(&self, user_id: &str, date: &str) -> Result<u32, InfraError>;
}

/// Row store for every entity. Each statement filters on `user_id`; updates
/// overwrite the whole row (last write wins).
#[derive(Debug, Clone)]
pub struct SqliteLifeStore {
    db_path: PathBuf,
}

const TASK_COLUMNS: &str = "id, user_id, title, description, priority, status, due_date, \
    calendar_event_id, assigned_to_email, assigned_to_name, created_at, updated_at";
const EVENT_COLUMNS: &str = "id, user_id, title, description, start_time, duration_minutes, \
    location, event_type, date, calendar_event_id, status, created_at";

impl SqliteLifeStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }

    pub fn insert_task(&self, task: &Task) -> Result<(), InfraError> {
        task.validate()?;
        self.connect()?.execute(
            &format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
            params![
                task.id,
                task.user_id,
                task.title,
                task.description,
                task.priority.as_str(),
                task.status.as_str(),
                task.due_date,
                task.calendar_event_id,
                task.assigned_to_email,
                task.assigned_to_name,
                format_timestamp(task.created_at),
                format_timestamp(task.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_tasks(&self, user_id: &str) -> Result<Vec<Task>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let tasks = statement
            .query_map(params![user_id], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn get_task(&self, user_id: &str, task_id: &str) -> Result<Option<Task>, InfraError> {
        let task = self
            .connect()?
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 AND id = ?2"),
                params![user_id, task_id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    pub fn update_task(&self, task: &Task) -> Result<(), InfraError> {
        task.validate()?;
        let changed = self.connect()?.execute(
            "UPDATE tasks SET title = ?3, description = ?4, priority = ?5, status = ?6, due_date = ?7,
               calendar_event_id = ?8, assigned_to_email = ?9, assigned_to_name = ?10, updated_at = ?11
             WHERE user_id = ?1 AND id = ?2",
            params![
                task.user_id,
                task.id,
                task.title,
                task.description,
                task.priority.as_str(),
                task.status.as_str(),
                task.due_date,
                task.calendar_event_id,
                task.assigned_to_email,
                task.assigned_to_name,
                format_timestamp(task.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(InfraError::NotFound(format!("task {}", task.id)));
        }
        Ok(())
    }

    pub fn delete_task(&self, user_id: &str, task_id: &str) -> Result<bool, InfraError> {
        let removed = self.connect()?.execute(
            "DELETE FROM tasks WHERE user_id = ?1 AND id = ?2",
            params![user_id, task_id],
        )?;
        Ok(removed > 0)
    }

    pub fn insert_event(&self, event: &DailyEvent) -> Result<(), InfraError> {
        event.validate()?;
        self.connect()?.execute(
            &format!("INSERT INTO daily_events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
            params![
                event.id,
                event.user_id,
                event.title,
                event.description,
                event.start_time,
                event.duration_minutes,
                event.location,
                event.event_type.as_str(),
                event.date,
                event.calendar_event_id,
                event.status.as_str(),
                format_timestamp(event.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_events_on(&self, user_id: &str, date: &str) -> Result<Vec<DailyEvent>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM daily_events WHERE user_id = ?1 AND date = ?2
             ORDER BY start_time ASC, created_at ASC"
        ))?;
        let events = statement
            .query_map(params![user_id, date], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn get_event(&self, user_id: &str, event_id: &str) -> Result<Option<DailyEvent>, InfraError> {
        let event = self
            .connect()?
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM daily_events WHERE user_id = ?1 AND id = ?2"),
                params![user_id, event_id],
                event_from_row,
            )
            .optional()?;
        Ok(event)
    }

    pub fn update_event(&self, event: &DailyEvent) -> Result<(), InfraError> {
        event.validate()?;
        let changed = self.connect()?.execute(
            "UPDATE daily_events SET title = ?3, description = ?4, start_time = ?5, duration_minutes = ?6,
               location = ?7, event_type = ?8, date = ?9, calendar_event_id = ?10, status = ?11
             WHERE user_id = ?1 AND id = ?2",
            params![
                event.user_id,
                event.id,
                event.title,
                event.description,
                event.start_time,
                event.duration_minutes,
                event.location,
                event.event_type.as_str(),
                event.date,
                event.calendar_event_id,
                event.status.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(InfraError::NotFound(format!("event {}", event.id)));
        }
        Ok(())
    }

    pub fn delete_event(&self, user_id: &str, event_id: &str) -> Result<bool, InfraError> {
        let removed = self.connect()?.execute(
            "DELETE FROM daily_events WHERE user_id = ?1 AND id = ?2",
            params![user_id, event_id],
        )?;
        Ok(removed > 0)
    }

    pub fn insert_focus_session(&self, session: &FocusSession) -> Result<(), InfraError> {
        session.validate()?;
        self.connect()?.execute(
            "INSERT INTO focus_sessions (id, user_id, duration_minutes, date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.user_id,
                session.duration_minutes,
                session.date,
                format_timestamp(session.created_at),
            ],
        )?;
        Ok(())
    }

    /// Sessions with `from <= date <= to`, oldest first.
    pub fn list_focus_sessions(
        &self,
        user_id: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<FocusSession>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, user_id, duration_minutes, date, created_at FROM focus_sessions
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC, created_at ASC",
        )?;
        let sessions = statement
            .query_map(params![user_id, from, to], |row| {
                Ok(FocusSession {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    duration_minutes: row.get(2)?,
                    date: row.get(3)?,
                    created_at: timestamp_column(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    pub fn insert_mood(&self, check_in: &MoodCheckIn) -> Result<(), InfraError> {
        check_in.validate()?;
        self.connect()?.execute(
            "INSERT INTO mood_checkins (id, user_id, mood, note, date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                check_in.id,
                check_in.user_id,
                check_in.mood.as_str(),
                check_in.note,
                check_in.date,
                format_timestamp(check_in.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_moods(&self, user_id: &str, from: &str, to: &str) -> Result<Vec<MoodCheckIn>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, user_id, mood, note, date, created_at FROM mood_checkins
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC, created_at ASC",
        )?;
        let moods = statement
            .query_map(params![user_id, from, to], |row| {
                Ok(MoodCheckIn {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    mood: parsed_column(row, 2)?,
                    note: row.get(3)?,
                    date: row.get(4)?,
                    created_at: timestamp_column(row, 5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(moods)
    }

    pub fn insert_expense(&self, expense: &Expense) -> Result<(), InfraError> {
        expense.validate()?;
        self.connect()?.execute(
            "INSERT INTO expenses (id, user_id, amount, description, category, date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                expense.id,
                expense.user_id,
                expense.amount,
                expense.description,
                expense.category,
                expense.date,
                format_timestamp(expense.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_expenses(&self, user_id: &str, from: &str, to: &str) -> Result<Vec<Expense>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, user_id, amount, description, category, date, created_at FROM expenses
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC, created_at ASC",
        )?;
        let expenses = statement
            .query_map(params![user_id, from, to], |row| {
                Ok(Expense {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    amount: row.get(2)?,
                    description: row.get(3)?,
                    category: row.get(4)?,
                    date: row.get(5)?,
                    created_at: timestamp_column(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(expenses)
    }

    pub fn insert_relationship_reminder(&self, reminder: &RelationshipReminder) -> Result<(), InfraError> {
        reminder.validate()?;
        self.connect()?.execute(
            "INSERT INTO relationship_reminders (id, user_id, title, target_date, reminder_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                reminder.id,
                reminder.user_id,
                reminder.title,
                reminder.target_date,
                reminder.reminder_type.as_str(),
                format_timestamp(reminder.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_relationship_reminders(&self, user_id: &str) -> Result<Vec<RelationshipReminder>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, user_id, title, target_date, reminder_type, created_at
             FROM relationship_reminders WHERE user_id = ?1
             ORDER BY target_date ASC, created_at ASC",
        )?;
        let reminders = statement
            .query_map(params![user_id], |row| {
                Ok(RelationshipReminder {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    target_date: row.get(3)?,
                    reminder_type: parsed_column(row, 4)?,
                    created_at: timestamp_column(row, 5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reminders)
    }

    pub fn delete_relationship_reminder(&self, user_id: &str, reminder_id: &str) -> Result<bool, InfraError> {
        let removed = self.connect()?.execute(
            "DELETE FROM relationship_reminders WHERE user_id = ?1 AND id = ?2",
            params![user_id, reminder_id],
        )?;
        Ok(removed > 0)
    }

    pub fn insert_sweet_message(&self, message: &SweetMessage) -> Result<(), InfraError> {
        message.validate()?;
        self.connect()?.execute(
            "INSERT INTO sweet_messages (id, user_id, content, ai_generated, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id,
                message.user_id,
                message.content,
                message.ai_generated,
                format_timestamp(message.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_sweet_messages(&self, user_id: &str, limit: u32) -> Result<Vec<SweetMessage>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, user_id, content, ai_generated, created_at FROM sweet_messages
             WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let messages = statement
            .query_map(params![user_id, limit], |row| {
                Ok(SweetMessage {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    content: row.get(2)?,
                    ai_generated: row.get(3)?,
                    created_at: timestamp_column(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    /// Loads the preference row, inserting the defaults on first access.
    pub fn notification_preference(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<NotificationPreference, InfraError> {
        let connection = self.connect()?;
        let existing = connection
            .query_row(
                "SELECT user_id, task_reminders_enabled, remind_days_before, remind_hours_before, updated_at
                 FROM notification_preferences WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(NotificationPreference {
                        user_id: row.get(0)?,
                        task_reminders_enabled: row.get(1)?,
                        remind_days_before: row.get(2)?,
                        remind_hours_before: row.get(3)?,
                        updated_at: timestamp_column(row, 4)?,
                    })
                },
            )
            .optional()?;
        if let Some(preference) = existing {
            return Ok(preference);
        }

        let defaults = NotificationPreference::defaults_for(user_id, now);
        write_preference(&connection, &defaults)?;
        Ok(defaults)
    }

    pub fn save_notification_preference(&self, preference: &NotificationPreference) -> Result<(), InfraError> {
        preference.validate()?;
        write_preference(&self.connect()?, preference)
    }

    pub fn record_task_reminder(
        &self,
        user_id: &str,
        task_id: &str,
        days_until_due: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        self.connect()?.execute(
            "INSERT INTO task_reminder_log (user_id, task_id, days_until_due, sent_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, task_id, days_until_due, format_timestamp(sent_at)],
        )?;
        Ok(())
    }

    pub fn reminded_task_ids(&self, user_id: &str) -> Result<HashSet<String>, InfraError> {
        let connection = self.connect()?;
        let mut statement =
            connection.prepare("SELECT DISTINCT task_id FROM task_reminder_log WHERE user_id = ?1")?;
        let ids = statement
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }
}

impl FocusSessionRepository for SqliteLifeStore {
    fn record_focus_session(&self, session: &FocusSession) -> Result<(), InfraError> {
        self.insert_focus_session(session)
    }

    fn focus_minutes_on(&self, user_id: &str, date: &str) -> Result<u32, InfraError> {
        let total: i64 = self.connect()?.query_row(
            "SELECT COALESCE(SUM(duration_minutes), 0) FROM focus_sessions WHERE user_id = ?1 AND date = ?2",
            params![user_id, date],
            |row| row.get(0),
        )?;
        Ok(u32::try_from(total).unwrap_or(u32::MAX))
    }
}

fn write_preference(connection: &Connection, preference: &NotificationPreference) -> Result<(), InfraError> {
    connection.execute(
        "INSERT INTO notification_preferences
           (user_id, task_reminders_enabled, remind_days_before, remind_hours_before, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
           task_reminders_enabled = excluded.task_reminders_enabled,
           remind_days_before = excluded.remind_days_before,
           remind_hours_before = excluded.remind_hours_before,
           updated_at = excluded.updated_at",
        params![
            preference.user_id,
            preference.task_reminders_enabled,
            preference.remind_days_before,
            preference.remind_hours_before,
            format_timestamp(preference.updated_at),
        ],
    )?;
    Ok(())
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: parsed_column(row, 4)?,
        status: parsed_column(row, 5)?,
        due_date: row.get(6)?,
        calendar_event_id: row.get(7)?,
        assigned_to_email: row.get(8)?,
        assigned_to_name: row.get(9)?,
        created_at: timestamp_column(row, 10)?,
        updated_at: timestamp_column(row, 11)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<DailyEvent> {
    Ok(DailyEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        start_time: row.get(4)?,
        duration_minutes: row.get(5)?,
        location: row.get(6)?,
        event_type: parsed_column(row, 7)?,
        date: row.get(8)?,
        calendar_event_id: row.get(9)?,
        status: parsed_column(row, 10)?,
        created_at: timestamp_column(row, 11)?,
    })
}

fn parsed_column<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(index)?;
    raw.parse::<T>().map_err(|error| invalid_column(index, error))
}

fn timestamp_column(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    parse_timestamp(&raw).map_err(|error| invalid_column(index, error))
}

fn invalid_column(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}
