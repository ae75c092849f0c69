use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use focusroom_core::{
    CommitOutcome, Config, Event, NewSession, RecoveryOutcome, SessionController, TimerMode,
    Visibility,
};
use futures::stream::StreamExt;
use serde::Serialize;
use signal_hook::consts::{SIGCONT, SIGINT, SIGSTOP, SIGTERM, SIGTSTP};
use signal_hook_tokio::Signals;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;

use super::{controller, print_events, CmdResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Recover the active session or start one, then run it in the foreground
    Run {
        /// Work minutes (defaults to timer.work_minutes)
        #[arg(long)]
        work: Option<u32>,
        /// Break minutes (defaults to timer.break_minutes)
        #[arg(long = "break")]
        break_minutes: Option<u32>,
        /// Task to attach the session to
        #[arg(long)]
        task_id: Option<String>,
        /// Session title
        #[arg(long)]
        title: Option<String>,
        /// Abandon a recovered session and start a new one
        #[arg(long)]
        replace: bool,
    },
    /// Print the current session state as JSON
    Status,
    /// Complete the active session and wait for the store's answer
    Complete,
    /// Abandon the active session
    Abandon,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView<'a> {
    session_id: Option<&'a str>,
    task_id: Option<&'a str>,
    title: Option<&'a str>,
    mode: TimerMode,
    time_remaining: u64,
    is_running: bool,
    target_end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

fn status_view(controller: &SessionController) -> StatusView<'_> {
    let state = controller.state();
    let session = state.session.as_ref();
    StatusView {
        session_id: session.map(|s| s.id.as_str()),
        task_id: session.and_then(|s| s.task_id.as_deref()),
        title: session.and_then(|s| s.title.as_deref()),
        mode: state.mode,
        time_remaining: state.time_remaining,
        is_running: state.is_running,
        target_end_time: controller.target_end_time(),
        error: state.error.as_deref(),
    }
}

pub async fn run(action: TimerAction) -> CmdResult {
    let config = Config::load()?;
    let (mut controller, mut events) = controller(&config)?;

    match action {
        TimerAction::Run {
            work,
            break_minutes,
            task_id,
            title,
            replace,
        } => {
            let mut request = NewSession::new(
                work.unwrap_or(config.timer.work_minutes),
                break_minutes.unwrap_or(config.timer.break_minutes),
            );
            if let Some(task_id) = task_id {
                request = request.with_task(task_id);
            }
            if let Some(title) = title {
                request = request.with_title(title);
            }
            run_foreground(&config, &mut controller, &mut events, request, replace).await?;
        }
        TimerAction::Status => {
            controller.recover().await?;
            println!("{}", serde_json::to_string_pretty(&status_view(&controller))?);
        }
        TimerAction::Complete => {
            controller.recover().await?;
            finish(&mut controller, &mut events).await?;
        }
        TimerAction::Abandon => {
            controller.recover().await?;
            let result = controller.abandon().await;
            print_events(&mut events)?;
            result?;
        }
    }
    Ok(())
}

/// Complete and print the reward, then whatever the store answered.
async fn finish(
    controller: &mut SessionController,
    events: &mut UnboundedReceiver<Event>,
) -> CmdResult {
    let handle = controller.complete()?;
    print_events(events)?;
    if let CommitOutcome::Failed(message) = handle.outcome().await {
        eprintln!("warning: completion not confirmed by the store: {message}");
    }
    print_events(events)
}

/// A stop from outside (`kill -STOP`) is never seen, so every continue is
/// treated as a return from the background.
fn reconcile_after_continue(controller: &mut SessionController) -> Option<Event> {
    controller.on_visibility_change(Visibility::Background);
    controller.on_visibility_change(Visibility::Foreground)
}

async fn run_foreground(
    config: &Config,
    controller: &mut SessionController,
    events: &mut UnboundedReceiver<Event>,
    request: NewSession,
    replace: bool,
) -> CmdResult {
    match controller.recover().await? {
        RecoveryOutcome::NoActiveSession => {
            controller.start(request, false).await?;
        }
        _ if replace => {
            controller.start(request, true).await?;
        }
        outcome => tracing::info!(?outcome, "continuing recovered session"),
    }
    print_events(events)?;

    let mut signals = Signals::new([SIGCONT, SIGINT, SIGTERM, SIGTSTP])?;
    let mut ticker =
        tokio::time::interval(Duration::from_millis(config.timer.tick_interval_ms.max(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if controller.mode() == TimerMode::Completed {
            return finish(controller, events).await;
        }

        tokio::select! {
            _ = ticker.tick() => {
                controller.tick();
            }
            Some(signal) = signals.next() => match signal {
                SIGTSTP => {
                    // Catching SIGTSTP suppresses the default stop; do it ourselves.
                    controller.on_visibility_change(Visibility::Background);
                    signal_hook::low_level::raise(SIGSTOP)?;
                }
                SIGCONT => {
                    reconcile_after_continue(controller);
                }
                _ => {
                    tracing::info!(signal, "interrupted; pausing");
                    controller.pause();
                    print_events(events)?;
                    println!("{}", serde_json::to_string(&controller.snapshot())?);
                    return Ok(());
                }
            },
        }
        print_events(events)?;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use focusroom_core::{ManualClock, MemorySessionStore};

    use super::*;

    #[tokio::test]
    async fn continue_reconciles_without_a_seen_stop() {
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(MemorySessionStore::new(Arc::new(clock.clone())));
        let mut controller = SessionController::new(store, Arc::new(clock.clone()));
        controller.start(NewSession::new(25, 5), false).await.unwrap();

        // Stopped from outside: no background signal ever arrived.
        clock.advance_secs(1600);
        assert_eq!(controller.visibility(), Visibility::Foreground);

        let event = reconcile_after_continue(&mut controller);
        assert!(matches!(
            event,
            Some(Event::PhaseChanged { to: TimerMode::Break, .. })
        ));
        assert_eq!(controller.state().time_remaining, 200);
        assert_eq!(controller.visibility(), Visibility::Foreground);
    }
}
