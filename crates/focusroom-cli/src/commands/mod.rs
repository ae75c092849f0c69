pub mod config;
pub mod profile;
pub mod timer;

use std::sync::Arc;

use focusroom_core::timer::LinearReward;
use focusroom_core::{
    Backend, Clock, Config, Event, EventSink, HttpSessionStore, LocalSessionStore,
    SessionController, SessionStore, SystemClock,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Open the session store selected by `remote.backend`.
pub fn open_store(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn SessionStore>, Box<dyn std::error::Error>> {
    let store: Arc<dyn SessionStore> = match config.remote.backend {
        Backend::Http => Arc::new(HttpSessionStore::from_config(&config.remote)?),
        // The remote server credits XP by its own rule.
        Backend::Local => Arc::new(
            LocalSessionStore::open(clock)?
                .with_reward_formula(Arc::new(LinearReward::from(&config.reward))),
        ),
    };
    tracing::debug!(backend = ?config.remote.backend, "session store opened");
    Ok(store)
}

/// Controller wired to the configured store, with its event stream.
pub fn controller(
    config: &Config,
) -> Result<(SessionController, UnboundedReceiver<Event>), Box<dyn std::error::Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(config, clock.clone())?;
    let (sink, events) = EventSink::channel();
    let controller = SessionController::new(store, clock)
        .with_events(sink)
        .with_reward_formula(Arc::new(LinearReward::from(&config.reward)))
        .with_recovery_limit(config.timer.recovery_limit);
    Ok((controller, events))
}

/// Print every queued event as one JSON line.
pub fn print_events(events: &mut UnboundedReceiver<Event>) -> CmdResult {
    while let Ok(event) = events.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}
