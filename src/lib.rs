pub mod alerts;
pub mod calendar_sync;
pub mod db;
mod error;
pub mod gaps;
pub mod google_api;
pub mod grouping;
pub mod notify;
pub mod o3;
pub mod popup;
pub mod provider;
pub mod scheduler;
pub mod state;
pub mod types;
pub mod weekly;

use std::sync::Arc;

pub use error::EngineError;

use calendar_sync::SyncCache;
use notify::{CommandNotifier, Notifier};
use provider::{CalendarProvider, GoogleCalendarProvider};
use scheduler::Engine;

/// Build and run the engine until a termination signal.
///
/// Startup is the only fatal zone: config parse failures and missing
/// calendar authorization abort with a non-zero exit; everything after
/// this point degrades per-cycle instead of dying.
pub async fn run() -> Result<(), EngineError> {
    let config = state::load_config()?;
    state::require_calendar_auth()?;

    let db = db::SessionDb::open().map_err(|e| EngineError::Db(e.to_string()))?;
    let cache = SyncCache::open_default()?;
    let provider: Arc<dyn CalendarProvider> = Arc::new(GoogleCalendarProvider);
    let notifier: Arc<dyn Notifier> = Arc::new(CommandNotifier::new(&config.notifier));

    Engine::new(config, provider, notifier, db, cache).run().await;

    Ok(())
}
