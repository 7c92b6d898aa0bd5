use crate::domain::models::{parse_date, Expense, FocusSession, Mood, MoodCheckIn, Task, TaskStatus};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DateWindow {
    Today,
    Last7Days,
    Last30Days,
    Last90Days,
}

impl DateWindow {
    fn days(self) -> i64 {
        match self {
            Self::Today => 1,
            Self::Last7Days => 7,
            Self::Last30Days => 30,
            Self::Last90Days => 90,
        }
    }

    /// Inclusive date range ending today.
    pub fn range(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (today - Duration::days(self.days() - 1), today)
    }
}

impl FromStr for DateWindow {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(Self::Today),
            "7d" | "week" | "last_7_days" => Ok(Self::Last7Days),
            "30d" | "month" | "last_30_days" => Ok(Self::Last30Days),
            "90d" | "quarter" | "last_90_days" => Ok(Self::Last90Days),
            other => Err(format!("unsupported date window: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyFocus {
    pub total_minutes: u32,
    pub sessions: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyFocusPoint {
    pub date: String,
    pub total_minutes: u32,
    pub sessions: u32,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSummary {
    pub total_minutes: u32,
    pub session_count: u32,
    pub active_days: u32,
    pub average_minutes_per_session: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyMood {
    pub date: String,
    pub average_score: f64,
    pub check_ins: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoodCount {
    pub mood: Mood,
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletion {
    pub total: u32,
    pub completed: u32,
    pub in_progress: u32,
    pub pending: u32,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyExpense {
    pub date: String,
    pub total: f64,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseSummary {
    pub total: f64,
    pub count: u32,
    pub average_per_expense: f64,
    pub average_per_day: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub window: DateWindow,
    pub start_date: String,
    pub end_date: String,
    pub focus: FocusSummary,
    pub focus_by_day: Vec<DailyFocusPoint>,
    pub mood_trend: Vec<DailyMood>,
    pub mood_distribution: Vec<MoodCount>,
    pub tasks: TaskCompletion,
    pub expenses: ExpenseSummary,
    pub expense_by_day: Vec<DailyExpense>,
    pub expense_by_category: Vec<CategoryTotal>,
}

/// `sum / count`, or 0 when there is nothing to average.
pub fn average(sum: f64, count: u32) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn percentage(part: u32, total: u32) -> f64 {
    average(part as f64 * 100.0, total)
}

pub fn group_focus_by_day(sessions: &[FocusSession]) -> BTreeMap<String, DailyFocus> {
    let mut by_day: BTreeMap<String, DailyFocus> = BTreeMap::new();
    for session in sessions {
        let day = by_day.entry(session.date.clone()).or_default();
        day.total_minutes = day.total_minutes.saturating_add(session.duration_minutes);
        day.sessions += 1;
    }
    by_day
}

pub fn focus_chart(sessions: &[FocusSession]) -> Vec<DailyFocusPoint> {
    group_focus_by_day(sessions)
        .into_iter()
        .map(|(date, day)| DailyFocusPoint {
            date,
            total_minutes: day.total_minutes,
            sessions: day.sessions,
        })
        .collect()
}

pub fn focus_summary(sessions: &[FocusSession]) -> FocusSummary {
    let by_day = group_focus_by_day(sessions);
    let total_minutes = by_day.values().map(|day| day.total_minutes).sum::<u32>();
    let session_count = sessions.len() as u32;
    FocusSummary {
        total_minutes,
        session_count,
        active_days: by_day.len() as u32,
        average_minutes_per_session: average(total_minutes as f64, session_count),
    }
}

pub fn mood_trend(check_ins: &[MoodCheckIn]) -> Vec<DailyMood> {
    let mut by_day: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for check_in in check_ins {
        let (average_score, count) = by_day.entry(check_in.date.clone()).or_insert((0.0, 0));
        *average_score =
            (*average_score * *count as f64 + check_in.mood.score()) / (*count + 1) as f64;
        *count += 1;
    }

    by_day
        .into_iter()
        .map(|(date, (average_score, check_ins))| DailyMood {
            date,
            average_score,
            check_ins,
        })
        .collect()
}

pub fn mood_distribution(check_ins: &[MoodCheckIn]) -> Vec<MoodCount> {
    Mood::ALL
        .into_iter()
        .map(|mood| MoodCount {
            mood,
            count: check_ins
                .iter()
                .filter(|check_in| check_in.mood == mood)
                .count() as u32,
        })
        .collect()
}

pub fn task_completion(tasks: &[Task]) -> TaskCompletion {
    let count = |status: TaskStatus| tasks.iter().filter(|task| task.status == status).count() as u32;
    let total = tasks.len() as u32;
    let completed = count(TaskStatus::Completed);
    TaskCompletion {
        total,
        completed,
        in_progress: count(TaskStatus::InProgress),
        pending: count(TaskStatus::Pending),
        completion_rate: percentage(completed, total),
    }
}

pub fn expense_by_day(expenses: &[Expense]) -> Vec<DailyExpense> {
    let mut by_day: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for expense in expenses {
        let (total, count) = by_day.entry(expense.date.clone()).or_insert((0.0, 0));
        *total += expense.amount;
        *count += 1;
    }
    by_day
        .into_iter()
        .map(|(date, (total, count))| DailyExpense { date, total, count })
        .collect()
}

/// Totals per category, largest first.
pub fn expense_by_category(expenses: &[Expense]) -> Vec<CategoryTotal> {
    let mut by_category: HashMap<String, f64> = HashMap::new();
    for expense in expenses {
        let category = expense
            .category
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        *by_category.entry(category).or_insert(0.0) += expense.amount;
    }

    let mut totals = by_category
        .into_iter()
        .map(|(category, total)| CategoryTotal { category, total })
        .collect::<Vec<_>>();
    totals.sort_by(|left, right| {
        right
            .total
            .total_cmp(&left.total)
            .then_with(|| left.category.cmp(&right.category))
    });
    totals
}

pub fn expense_summary(expenses: &[Expense]) -> ExpenseSummary {
    let total = expenses.iter().map(|expense| expense.amount).sum::<f64>();
    let count = expenses.len() as u32;
    let active_days = expense_by_day(expenses).len() as u32;
    ExpenseSummary {
        total,
        count,
        average_per_expense: average(total, count),
        average_per_day: average(total, active_days),
    }
}

/// Rows whose date falls outside `[start, end]` or does not parse are ignored.
pub fn build_dashboard(
    window: DateWindow,
    today: NaiveDate,
    focus_sessions: &[FocusSession],
    check_ins: &[MoodCheckIn],
    tasks: &[Task],
    expenses: &[Expense],
) -> DashboardSummary {
    let (start, end) = window.range(today);
    let in_window = |date: &str| {
        parse_date(date)
            .map(|date| date >= start && date <= end)
            .unwrap_or(false)
    };

    let focus_sessions = focus_sessions
        .iter()
        .filter(|session| in_window(&session.date))
        .cloned()
        .collect::<Vec<_>>();
    let check_ins = check_ins
        .iter()
        .filter(|check_in| in_window(&check_in.date))
        .cloned()
        .collect::<Vec<_>>();
    let expenses = expenses
        .iter()
        .filter(|expense| in_window(&expense.date))
        .cloned()
        .collect::<Vec<_>>();

    DashboardSummary {
        window,
        start_date: start.to_string(),
        end_date: end.to_string(),
        focus: focus_summary(&focus_sessions),
        focus_by_day: focus_chart(&focus_sessions),
        mood_trend: mood_trend(&check_ins),
        mood_distribution: mood_distribution(&check_ins),
        tasks: task_completion(tasks),
        expenses: expense_summary(&expenses),
        expense_by_day: expense_by_day(&expenses),
        expense_by_category: expense_by_category(&expenses),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Priority;
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-02T12:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn session(date: &str, duration_minutes: u32) -> FocusSession {
        FocusSession {
            id: format!("fs-{date}-{duration_minutes}"),
            user_id: "user-1".to_string(),
            duration_minutes,
            date: date.to_string(),
            created_at: fixed_time(),
        }
    }

    fn check_in(date: &str, mood: Mood) -> MoodCheckIn {
        MoodCheckIn {
            id: format!("mood-{date}-{}", mood.as_str()),
            user_id: "user-1".to_string(),
            mood,
            note: None,
            date: date.to_string(),
            created_at: fixed_time(),
        }
    }

    fn expense(date: &str, amount: f64, category: Option<&str>) -> Expense {
        Expense {
            id: format!("exp-{date}-{amount}"),
            user_id: "user-1".to_string(),
            amount,
            description: None,
            category: category.map(ToOwned::to_owned),
            date: date.to_string(),
            created_at: fixed_time(),
        }
    }

    fn task(status: TaskStatus) -> Task {
        Task {
            id: format!("tsk-{}", status.as_str()),
            user_id: "user-1".to_string(),
            title: "Something".to_string(),
            description: None,
            priority: Priority::Medium,
            status,
            due_date: None,
            calendar_event_id: None,
            assigned_to_email: None,
            assigned_to_name: None,
            created_at: fixed_time(),
            updated_at: fixed_time(),
        }
    }

    #[test]
    fn groups_focus_sessions_by_day() {
        let sessions = vec![
            session("2024-01-01", 25),
            session("2024-01-01", 30),
            session("2024-01-02", 10),
        ];
        let grouped = group_focus_by_day(&sessions);

        assert_eq!(grouped.len(), 2);
        assert_eq!(
            grouped["2024-01-01"],
            DailyFocus {
                total_minutes: 55,
                sessions: 2
            }
        );
        assert_eq!(
            grouped["2024-01-02"],
            DailyFocus {
                total_minutes: 10,
                sessions: 1
            }
        );

        let json = serde_json::to_value(&grouped).expect("serialize grouping");
        assert_eq!(
            json,
            serde_json::json!({
                "2024-01-01": {"totalMinutes": 55, "sessions": 2},
                "2024-01-02": {"totalMinutes": 10, "sessions": 1}
            })
        );
    }

    #[test]
    fn focus_chart_is_sorted_ascending() {
        let sessions = vec![session("2024-01-03", 25), session("2024-01-01", 25)];
        let chart = focus_chart(&sessions);
        assert_eq!(chart[0].date, "2024-01-01");
        assert_eq!(chart[1].date, "2024-01-03");
    }

    #[test]
    fn averages_default_to_zero() {
        assert_eq!(average(0.0, 0), 0.0);
        assert_eq!(focus_summary(&[]).average_minutes_per_session, 0.0);
        assert_eq!(task_completion(&[]).completion_rate, 0.0);
        assert_eq!(expense_summary(&[]), ExpenseSummary::default());
    }

    #[test]
    fn mood_trend_uses_running_mean_per_day() {
        let check_ins = vec![
            check_in("2024-01-01", Mood::Great),
            check_in("2024-01-01", Mood::Low),
            check_in("2024-01-01", Mood::Okay),
            check_in("2024-01-02", Mood::Good),
        ];
        let trend = mood_trend(&check_ins);

        assert_eq!(trend.len(), 2);
        assert!((trend[0].average_score - 10.0 / 3.0).abs() < 1e-9);
        assert_eq!(trend[0].check_ins, 3);
        assert_eq!(trend[1].average_score, 4.0);

        let distribution = mood_distribution(&check_ins);
        assert_eq!(distribution.len(), Mood::ALL.len());
        assert_eq!(distribution[0], MoodCount { mood: Mood::Great, count: 1 });
        assert_eq!(distribution[4], MoodCount { mood: Mood::Awful, count: 0 });
    }

    #[test]
    fn completion_rate_counts_completed_over_total() {
        let tasks = vec![
            task(TaskStatus::Completed),
            task(TaskStatus::Pending),
            task(TaskStatus::InProgress),
            task(TaskStatus::Completed),
        ];
        let completion = task_completion(&tasks);
        assert_eq!(completion.total, 4);
        assert_eq!(completion.completed, 2);
        assert_eq!(completion.in_progress, 1);
        assert_eq!(completion.pending, 1);
        assert_eq!(completion.completion_rate, 50.0);
    }

    #[test]
    fn expenses_group_by_day_and_category() {
        let expenses = vec![
            expense("2024-01-01", 10.0, Some("Food")),
            expense("2024-01-01", 5.5, Some("food")),
            expense("2024-01-02", 40.0, Some("Travel")),
            expense("2024-01-02", 2.0, None),
        ];

        let by_day = expense_by_day(&expenses);
        assert_eq!(by_day.len(), 2);
        assert_eq!(by_day[0].total, 15.5);
        assert_eq!(by_day[0].count, 2);

        let by_category = expense_by_category(&expenses);
        assert_eq!(by_category[0].category, "travel");
        assert_eq!(by_category[1].category, "food");
        assert_eq!(by_category[1].total, 15.5);
        assert_eq!(by_category[2].category, "uncategorized");

        let summary = expense_summary(&expenses);
        assert_eq!(summary.count, 4);
        assert_eq!(summary.total, 57.5);
        assert_eq!(summary.average_per_day, 28.75);
    }

    #[test]
    fn date_windows_are_inclusive_of_today() {
        let today = date("2024-01-10");
        assert_eq!(DateWindow::Today.range(today), (today, today));
        assert_eq!(DateWindow::Last7Days.range(today), (date("2024-01-04"), today));
        assert_eq!("30d".parse::<DateWindow>(), Ok(DateWindow::Last30Days));
        assert!("forever".parse::<DateWindow>().is_err());
    }

    #[test]
    fn dashboard_ignores_rows_outside_window() {
        let today = date("2024-01-10");
        let sessions = vec![session("2024-01-10", 25), session("2024-01-01", 50)];
        let moods = vec![check_in("2024-01-09", Mood::Good)];
        let expenses = vec![expense("2023-12-31", 99.0, None), expense("2024-01-08", 1.0, None)];

        let summary = build_dashboard(
            DateWindow::Last7Days,
            today,
            &sessions,
            &moods,
            &[task(TaskStatus::Completed)],
            &expenses,
        );

        assert_eq!(summary.start_date, "2024-01-04");
        assert_eq!(summary.focus.total_minutes, 25);
        assert_eq!(summary.mood_trend.len(), 1);
        assert_eq!(summary.expenses.total, 1.0);
        assert_eq!(summary.tasks.completion_rate, 100.0);
    }

    proptest! {
        #[test]
        fn grouped_totals_match_raw_sum(
            rows in prop::collection::vec((1u32..28, 1u32..120), 0..40)
        ) {
            let sessions = rows
                .iter()
                .map(|(day, minutes)| session(&format!("2024-02-{day:02}"), *minutes))
                .collect::<Vec<_>>();
            let grouped = group_focus_by_day(&sessions);

            let grouped_minutes = grouped.values().map(|day| day.total_minutes).sum::<u32>();
            let grouped_sessions = grouped.values().map(|day| day.sessions).sum::<u32>();
            prop_assert_eq!(grouped_minutes, rows.iter().map(|(_, minutes)| minutes).sum::<u32>());
            prop_assert_eq!(grouped_sessions as usize, rows.len());
        }
    }
}
