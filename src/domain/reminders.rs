use crate::domain::models::{parse_date, NotificationPreference, Task, TaskStatus};
use chrono::NaiveDate;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    pub task: Task,
    pub days_until_due: i64,
}

/// Open tasks due within the reminder horizon that have not been reminded yet.
/// Overdue tasks are skipped; nearest due date first.
pub fn due_task_reminders(
    tasks: &[Task],
    preference: &NotificationPreference,
    today: NaiveDate,
    already_sent: &HashSet<String>,
) -> Vec<DueReminder> {
    if !preference.task_reminders_enabled {
        return Vec::new();
    }

    let horizon = i64::from(preference.remind_days_before);
    let mut due = tasks
        .iter()
        .filter(|task| task.status != TaskStatus::Completed)
        .filter(|task| !already_sent.contains(&task.id))
        .filter_map(|task| {
            let due_date = task.due_date.as_deref().and_then(parse_date)?;
            let days_until_due = (due_date - today).num_days();
            (0..=horizon).contains(&days_until_due).then(|| DueReminder {
                task: task.clone(),
                days_until_due,
            })
        })
        .collect::<Vec<_>>();
    due.sort_by(|left, right| {
        left.days_until_due
            .cmp(&right.days_until_due)
            .then_with(|| left.task.created_at.cmp(&right.task.created_at))
    });
    due
}
