//! Calendar sync with a fallback snapshot cache.
//!
//! Every sync fetches the 24-hour lookahead window, filters out events that
//! can never alert (all-day, self-declined), and persists the survivors to
//! `~/.vigil/calendar_cache.json`. When the provider fails, the last
//! snapshot is served as long as it is fresh enough; after that the engine
//! runs on an empty list until the next poll succeeds.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::CalendarProvider;
use crate::types::{CalendarEvent, TimeSpan};

/// How far ahead each sync looks.
pub const LOOKAHEAD_HOURS: i64 = 24;

/// How long a fallback snapshot stays servable after a provider failure.
pub const CACHE_FRESHNESS_MINUTES: i64 = 30;

/// On-disk snapshot of the last successful fetch
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    fetched_at: DateTime<Utc>,
    events: Vec<CalendarEvent>,
}

/// The snapshot file handle. Tests point it at a tempdir.
pub struct SyncCache {
    path: PathBuf,
}

impl SyncCache {
    pub fn open_default() -> Result<Self, crate::error::EngineError> {
        Ok(Self {
            path: crate::state::state_dir()?.join("calendar_cache.json"),
        })
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    fn store(&self, events: &[CalendarEvent], fetched_at: DateTime<Utc>) {
        let snapshot = Snapshot {
            fetched_at,
            events: events.to_vec(),
        };
        match serde_json::to_string_pretty(&snapshot) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&self.path, content) {
                    log::warn!("Failed to write calendar cache: {}", e);
                }
            }
            Err(e) => log::warn!("Failed to serialize calendar cache: {}", e),
        }
    }

    /// Load the snapshot if it was fetched within the freshness horizon.
    fn load_fresh(&self, now: DateTime<Utc>) -> Option<Vec<CalendarEvent>> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let snapshot: Snapshot = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Calendar cache unreadable, ignoring: {}", e);
                return None;
            }
        };

        let age = now - snapshot.fetched_at;
        if age > Duration::minutes(CACHE_FRESHNESS_MINUTES) {
            log::warn!(
                "Calendar cache is stale ({} min old), not serving it",
                age.num_minutes()
            );
            return None;
        }

        Some(snapshot.events)
    }
}

/// Fetch the lookahead window, falling back to the cache on failure.
///
/// Never fatal: a failed cycle logs and returns whatever is servable.
pub async fn sync_events(
    provider: &dyn CalendarProvider,
    cache: &SyncCache,
    now: DateTime<Utc>,
) -> Vec<CalendarEvent> {
    let window = TimeSpan::new(now, now + Duration::hours(LOOKAHEAD_HOURS));

    match provider.upcoming_events(&window).await {
        Ok(events) => {
            let events = filter_alertable(events);
            log::info!("Calendar sync: {} alertable event(s) in window", events.len());
            cache.store(&events, now);
            events
        }
        Err(e) => {
            log::warn!("Calendar sync failed, trying fallback cache: {}", e);
            match cache.load_fresh(now) {
                Some(events) => {
                    log::info!("Serving {} event(s) from fallback cache", events.len());
                    events
                }
                None => {
                    log::error!("Calendar sync failed and no fresh cache; serving empty list");
                    Vec::new()
                }
            }
        }
    }
}

/// Drop events that should never alert: all-day blocks and meetings the
/// user declined.
fn filter_alertable(events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
    events
        .into_iter()
        .filter(|e| !e.all_day && !e.declined_by_self())
        .collect()
}
