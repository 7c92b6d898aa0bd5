use serde::{Deserialize, Serialize};

pub const DEFAULT_FOCUS_MINUTES: u32 = 25;
pub const DEFAULT_SHORT_BREAK_MINUTES: u32 = 5;
pub const DEFAULT_LONG_BREAK_MINUTES: u32 = 15;
pub const DEFAULT_LONG_BREAK_INTERVAL: u32 = 4;
/// Longest allowed phase: one day.
pub const MAX_PHASE_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroSettings {
    pub focus_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub long_break_interval: u32,
    /// When set, `start` is rejected unless a task is selected.
    pub require_task_to_start: bool,
}

impl Default for PomodoroSettings {
    fn default() -> Self {
        Self {
            focus_minutes: DEFAULT_FOCUS_MINUTES,
            short_break_minutes: DEFAULT_SHORT_BREAK_MINUTES,
            long_break_minutes: DEFAULT_LONG_BREAK_MINUTES,
            long_break_interval: DEFAULT_LONG_BREAK_INTERVAL,
            require_task_to_start: false,
        }
    }
}

impl PomodoroSettings {
    pub fn validate(&self) -> Result<(), String> {
        check_phase_minutes("pomodoro.focusMinutes", self.focus_minutes)?;
        check_phase_minutes("pomodoro.shortBreakMinutes", self.short_break_minutes)?;
        check_phase_minutes("pomodoro.longBreakMinutes", self.long_break_minutes)?;
        if self.long_break_interval == 0 {
            return Err("pomodoro.longBreakInterval must be > 0".to_string());
        }
        Ok(())
    }
}

fn check_phase_minutes(field: &str, minutes: u32) -> Result<(), String> {
    if minutes == 0 {
        return Err(format!("{field} must be > 0"));
    }
    if minutes > MAX_PHASE_MINUTES {
        return Err(format!("{field} must be <= {MAX_PHASE_MINUTES}"));
    }
    Ok(())
}

/// Phase length in seconds, clamped to `1..=MAX_PHASE_MINUTES` minutes.
fn phase_seconds(minutes: u32) -> u32 {
    minutes.clamp(1, MAX_PHASE_MINUTES) * 60
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Focus,
    Break,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimerNotice {
    FocusComplete {
        long_break: bool,
        sessions_completed: u32,
    },
    BreakOver,
}

impl TimerNotice {
    pub fn title(&self) -> &'static str {
        match self {
            Self::FocusComplete { .. } => "Focus session complete",
            Self::BreakOver => "Break is over",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::FocusComplete {
                long_break: true,
                sessions_completed,
            } => format!(
                "{sessions_completed} sessions done. Time for a long break."
            ),
            Self::FocusComplete {
                long_break: false, ..
            } => "Nice work. Take a short break.".to_string(),
            Self::BreakOver => "Ready for the next focus session?".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalCompletion {
    pub finished: TimerPhase,
    /// Minutes to persist as a focus session; zero when a break finished.
    pub focus_minutes: u32,
    pub notice: TimerNotice,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PomodoroSnapshot {
    pub running: bool,
    pub paused: bool,
    pub remaining_seconds: u32,
    pub phase: TimerPhase,
    pub sessions_completed: u32,
    pub focus_duration_minutes: u32,
    pub accumulated_focus_minutes_today: u32,
    pub progress_percent: f64,
}

#[derive(Debug, Clone)]
pub struct PomodoroTimer {
    settings: PomodoroSettings,
    running: bool,
    paused: bool,
    remaining_seconds: u32,
    phase: TimerPhase,
    sessions_completed: u32,
    accumulated_focus_minutes_today: u32,
}

impl PomodoroTimer {
    pub fn new(settings: PomodoroSettings, accumulated_focus_minutes_today: u32) -> Self {
        let remaining_seconds = phase_seconds(settings.focus_minutes);
        Self {
            settings,
            running: false,
            paused: false,
            remaining_seconds,
            phase: TimerPhase::Focus,
            sessions_completed: 0,
            accumulated_focus_minutes_today,
        }
    }

    pub fn settings(&self) -> &PomodoroSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn sessions_completed(&self) -> u32 {
        self.sessions_completed
    }

    pub fn accumulated_focus_minutes_today(&self) -> u32 {
        self.accumulated_focus_minutes_today
    }

    /// Replaces the daily total after it was reloaded from persisted sessions.
    pub fn set_accumulated_focus_minutes_today(&mut self, minutes: u32) {
        self.accumulated_focus_minutes_today = minutes;
    }

    pub fn start(&mut self, selected_task_id: Option<&str>) -> Result<(), String> {
        if self.running {
            return Err("timer is already running".to_string());
        }
        let has_task = selected_task_id
            .map(str::trim)
            .is_some_and(|task_id| !task_id.is_empty());
        if self.settings.require_task_to_start && !has_task {
            return Err("select a task before starting the timer".to_string());
        }

        self.running = true;
        self.paused = false;
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.running {
            self.paused = true;
        }
    }

    pub fn resume(&mut self) {
        if self.running {
            self.paused = false;
        }
    }

    /// Returns the paused flag after toggling.
    pub fn toggle_pause(&mut self) -> bool {
        if self.running {
            self.paused = !self.paused;
        }
        self.paused
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.paused = false;
        self.remaining_seconds = match self.phase {
            TimerPhase::Focus => self.focus_seconds(),
            TimerPhase::Break => self.short_break_seconds(),
        };
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.paused = false;
        self.phase = TimerPhase::Focus;
        self.remaining_seconds = self.focus_seconds();
        self.sessions_completed = 0;
    }

    pub fn set_focus_duration_minutes(&mut self, minutes: u32) -> Result<(), String> {
        if self.running {
            return Err("focus duration cannot change while the timer is running".to_string());
        }
        check_phase_minutes("focus duration", minutes)?;

        self.settings.focus_minutes = minutes;
        if self.phase == TimerPhase::Focus {
            self.remaining_seconds = self.focus_seconds();
        }
        Ok(())
    }

    /// Advances one second. Does nothing unless running and not paused.
    pub fn tick(&mut self) -> Option<IntervalCompletion> {
        if !self.running || self.paused {
            return None;
        }
        if self.remaining_seconds <= 1 {
            return Some(self.complete_interval());
        }
        self.remaining_seconds -= 1;
        None
    }

    /// Elapsed share of the current phase, in percent.
    ///
    /// Break progress is always measured against the short break length. A
    /// long break would start below zero on that scale (-200% with the
    /// defaults); the result is clamped to `0..=100`, so the first part of a
    /// long break reads as 0% instead.
    pub fn progress_percent(&self) -> f64 {
        let total = match self.phase {
            TimerPhase::Focus => self.focus_seconds(),
            TimerPhase::Break => self.short_break_seconds(),
        } as f64;
        let elapsed = total - self.remaining_seconds as f64;
        (elapsed / total * 100.0).clamp(0.0, 100.0)
    }

    pub fn snapshot(&self) -> PomodoroSnapshot {
        PomodoroSnapshot {
            running: self.running,
            paused: self.paused,
            remaining_seconds: self.remaining_seconds,
            phase: self.phase,
            sessions_completed: self.sessions_completed,
            focus_duration_minutes: self.settings.focus_minutes,
            accumulated_focus_minutes_today: self.accumulated_focus_minutes_today,
            progress_percent: self.progress_percent(),
        }
    }

    fn complete_interval(&mut self) -> IntervalCompletion {
        self.running = false;
        self.paused = false;

        match self.phase {
            TimerPhase::Focus => {
                let focus_minutes = self.settings.focus_minutes;
                self.sessions_completed = self.sessions_completed.saturating_add(1);
                self.accumulated_focus_minutes_today = self
                    .accumulated_focus_minutes_today
                    .saturating_add(focus_minutes);

                let long_break =
                    self.sessions_completed % self.settings.long_break_interval.max(1) == 0;
                self.phase = TimerPhase::Break;
                self.remaining_seconds = if long_break {
                    phase_seconds(self.settings.long_break_minutes)
                } else {
                    self.short_break_seconds()
                };

                IntervalCompletion {
                    finished: TimerPhase::Focus,
                    focus_minutes,
                    notice: TimerNotice::FocusComplete {
                        long_break,
                        sessions_completed: self.sessions_completed,
                    },
                }
            }
            TimerPhase::Break => {
                self.phase = TimerPhase::Focus;
                self.remaining_seconds = self.focus_seconds();
                IntervalCompletion {
                    finished: TimerPhase::Break,
                    focus_minutes: 0,
                    notice: TimerNotice::BreakOver,
                }
            }
        }
    }

    fn focus_seconds(&self) -> u32 {
        phase_seconds(self.settings.focus_minutes)
    }

    fn short_break_seconds(&self) -> u32 {
        phase_seconds(self.settings.short_break_minutes)
    }
}
