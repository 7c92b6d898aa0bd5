pub mod aggregation;
pub mod models;
pub mod pomodoro;
pub mod reminders;
pub mod splitter;
