use crate::application::commands::next_id;
use crate::domain::models::FocusSession;
use crate::domain::pomodoro::{
    IntervalCompletion, PomodoroSettings, PomodoroSnapshot, PomodoroTimer, TimerNotice,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::store::FocusSessionRepository;
use chrono::Utc;
use chrono_tz::Tz;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

const NOTICE_CHANNEL_CAPACITY: usize = 16;

/// Audible/visual cue on interval completion. Failures are swallowed by the caller.
pub trait TimerNotifier: Send + Sync {
    fn notify(&self, notice: &TimerNotice) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct TerminalBellNotifier;

impl TimerNotifier for TerminalBellNotifier {
    fn notify(&self, notice: &TimerNotice) -> Result<(), InfraError> {
        tracing::info!(title = notice.title(), message = %notice.message(), "timer notice");
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// The one shared pomodoro. Every surface subscribes to the same snapshot
/// channel; only the single ticker task advances time.
pub struct FocusTimer {
    timer: Arc<Mutex<PomodoroTimer>>,
    owner: Mutex<Option<String>>,
    repository: Arc<dyn FocusSessionRepository>,
    notifier: Arc<dyn TimerNotifier>,
    timezone: Tz,
    snapshots: watch::Sender<PomodoroSnapshot>,
    notices: broadcast::Sender<TimerNotice>,
    ticker_started: AtomicBool,
}

impl FocusTimer {
    pub fn new(
        settings: PomodoroSettings,
        repository: Arc<dyn FocusSessionRepository>,
        notifier: Arc<dyn TimerNotifier>,
        timezone: Tz,
    ) -> Self {
        let timer = PomodoroTimer::new(settings, 0);
        let (snapshots, _) = watch::channel(timer.snapshot());
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            timer: Arc::new(Mutex::new(timer)),
            owner: Mutex::new(None),
            repository,
            notifier,
            timezone,
            snapshots,
            notices,
            ticker_started: AtomicBool::new(false),
        }
    }

    fn lock_timer(&self) -> Result<MutexGuard<'_, PomodoroTimer>, InfraError> {
        self.timer
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("timer: {error}")))
    }

    fn lock_owner(&self) -> Result<MutexGuard<'_, Option<String>>, InfraError> {
        self.owner
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("timer owner: {error}")))
    }

    /// Binds completed sessions to `user_id` and reloads today's focus total.
    pub fn attach_user(&self, user_id: Option<&str>) -> Result<PomodoroSnapshot, InfraError> {
        let accumulated = match user_id {
            Some(user_id) => {
                let today = Utc::now().with_timezone(&self.timezone).date_naive();
                self.repository
                    .focus_minutes_on(user_id, &today.format("%Y-%m-%d").to_string())?
            }
            None => 0,
        };
        *self.lock_owner()? = user_id.map(ToOwned::to_owned);
        self.update(|timer| {
            timer.set_accumulated_focus_minutes_today(accumulated);
            Ok(())
        })
        .map(|((), snapshot)| snapshot)
    }

    pub fn subscribe(&self) -> watch::Receiver<PomodoroSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<TimerNotice> {
        self.notices.subscribe()
    }

    pub fn snapshot(&self) -> Result<PomodoroSnapshot, InfraError> {
        Ok(self.lock_timer()?.snapshot())
    }

    pub fn start(&self, selected_task_id: Option<&str>) -> Result<PomodoroSnapshot, InfraError> {
        self.update(|timer| timer.start(selected_task_id).map_err(InfraError::Validation))
            .map(|((), snapshot)| snapshot)
    }

    pub fn pause(&self) -> Result<PomodoroSnapshot, InfraError> {
        self.apply(PomodoroTimer::pause)
    }

    pub fn resume(&self) -> Result<PomodoroSnapshot, InfraError> {
        self.apply(PomodoroTimer::resume)
    }

    pub fn toggle_pause(&self) -> Result<PomodoroSnapshot, InfraError> {
        self.apply(|timer| {
            timer.toggle_pause();
        })
    }

    pub fn stop(&self) -> Result<PomodoroSnapshot, InfraError> {
        self.apply(PomodoroTimer::stop)
    }

    pub fn reset(&self) -> Result<PomodoroSnapshot, InfraError> {
        self.apply(PomodoroTimer::reset)
    }

    pub fn set_focus_duration_minutes(&self, minutes: u32) -> Result<PomodoroSnapshot, InfraError> {
        self.update(|timer| {
            timer
                .set_focus_duration_minutes(minutes)
                .map_err(InfraError::Validation)
        })
        .map(|((), snapshot)| snapshot)
    }

    /// Advances one second and handles a finished interval. Driven by the ticker.
    pub fn tick(&self) -> Result<Option<IntervalCompletion>, InfraError> {
        let (completion, _) = self.update(|timer| Ok(timer.tick()))?;
        if let Some(completion) = completion.as_ref() {
            self.finish_interval(completion);
        }
        Ok(completion)
    }

    /// Starts the once-per-second ticker. Later calls return `None`, so the
    /// countdown can never run twice.
    pub fn spawn_ticker(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.ticker_started.swap(true, Ordering::SeqCst) {
            tracing::debug!("focus timer ticker already running");
            return None;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(focus_timer) = weak.upgrade() else {
                    break;
                };
                // A finished focus interval writes to SQLite.
                match tokio::task::spawn_blocking(move || focus_timer.tick()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(error)) => tracing::error!(%error, "focus timer tick failed"),
                    Err(error) => tracing::error!(%error, "focus timer tick task failed"),
                }
            }
        }))
    }

    fn apply<F>(&self, change: F) -> Result<PomodoroSnapshot, InfraError>
    where
        F: FnOnce(&mut PomodoroTimer),
    {
        self.update(|timer| {
            change(timer);
            Ok(())
        })
        .map(|((), snapshot)| snapshot)
    }

    fn update<F, T>(&self, change: F) -> Result<(T, PomodoroSnapshot), InfraError>
    where
        F: FnOnce(&mut PomodoroTimer) -> Result<T, InfraError>,
    {
        let (value, snapshot) = {
            let mut timer = self.lock_timer()?;
            let value = change(&mut timer)?;
            (value, timer.snapshot())
        };
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot.clone();
            true
        });
        Ok((value, snapshot))
    }

    fn finish_interval(&self, completion: &IntervalCompletion) {
        if completion.focus_minutes > 0 {
            self.persist_focus_session(completion.focus_minutes);
        }

        // No subscribers is fine.
        let _ = self.notices.send(completion.notice.clone());
        if let Err(error) = self.notifier.notify(&completion.notice) {
            tracing::debug!(%error, "timer chime failed");
        }
    }

    fn persist_focus_session(&self, minutes: u32) {
        let owner = match self.lock_owner() {
            Ok(owner) => owner.clone(),
            Err(error) => {
                tracing::error!(%error, "focus session not saved");
                return;
            }
        };
        let Some(user_id) = owner else {
            tracing::warn!(minutes, "focus session finished without a signed-in user, not saved");
            return;
        };

        let now = Utc::now();
        let session = FocusSession {
            id: next_id("focus"),
            user_id,
            duration_minutes: minutes,
            date: now
                .with_timezone(&self.timezone)
                .date_naive()
                .format("%Y-%m-%d")
                .to_string(),
            created_at: now,
        };
        match self.repository.record_focus_session(&session) {
            Ok(()) => tracing::info!(session_id = %session.id, minutes, "focus session saved"),
            Err(error) => tracing::error!(%error, "failed to save focus session"),
        }
    }
}
