pub mod application;
pub mod domain;
pub mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{AppServices, AppState};
use infrastructure::error::InfraError;
use infrastructure::logging::init_tracing;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

/// Headless host: bootstraps `workspace_root`, owns the one focus timer and
/// runs its ticker until Ctrl-C.
pub async fn run(workspace_root: PathBuf) -> Result<(), InfraError> {
    let bootstrap = bootstrap_workspace(&workspace_root)?;
    init_tracing(Some(&bootstrap.logs_dir))?;
    let services = AppServices::from_environment(&bootstrap)?;
    let state = AppState::with_services(bootstrap, services)?;

    let focus_timer = state.focus_timer().clone();
    let ticker = focus_timer.spawn_ticker();
    let mut notices = focus_timer.subscribe_notices();
    tracing::info!(
        app = %state.settings().app_name,
        root = %workspace_root.display(),
        database = %state.database_path().display(),
        "host started"
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            notice = notices.recv() => match notice {
                Ok(_) => {
                    let snapshot = focus_timer.snapshot()?;
                    tracing::info!(
                        phase = ?snapshot.phase,
                        sessions_completed = snapshot.sessions_completed,
                        focus_minutes_today = snapshot.accumulated_focus_minutes_today,
                        "interval finished"
                    );
                }
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "timer notices dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Some(handle) = ticker {
        handle.abort();
    }
    tracing::info!("host stopped");
    Ok(())
}
