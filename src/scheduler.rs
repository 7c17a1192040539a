//! The engine loop: timer-driven, cooperative, single logical thread.
//!
//! Three cadences: calendar sync every 2 minutes, alert-threshold checks
//! every 15 seconds, and the O3/weekly checks riding the sync tick. Every
//! handler runs to completion inside its tick; the only mutable state
//! shared outside this task is the popup handle map, owned by the popup
//! controller. A failure in one branch (alerts vs. O3 vs. weekly) never
//! blocks the others within the same cycle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::alerts::{AlertLadder, ALERT_CHECK_INTERVAL_SECS};
use crate::calendar_sync::{sync_events, SyncCache};
use crate::db::SessionDb;
use crate::notify::Notifier;
use crate::o3::{run_checks, O3Context};
use crate::popup::PopupController;
use crate::provider::CalendarProvider;
use crate::types::{CalendarEvent, Config};
use crate::weekly::check_weekly_summary;

/// Poll interval for calendar sync (2 minutes)
pub const SYNC_INTERVAL_SECS: u64 = 120;

/// Time jump threshold to detect sleep/wake (5 minutes)
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// The meeting alert engine. One instance per process, constructed at
/// startup and torn down at shutdown — no hidden singletons.
pub struct Engine {
    config: Config,
    provider: Arc<dyn CalendarProvider>,
    popups: PopupController,
    notifier: Arc<dyn Notifier>,
    db: SessionDb,
    cache: SyncCache,
    ladder: AlertLadder,
    events: Vec<CalendarEvent>,
    last_sync_check: DateTime<Utc>,
}

impl Engine {
    pub fn new(
        config: Config,
        provider: Arc<dyn CalendarProvider>,
        notifier: Arc<dyn Notifier>,
        db: SessionDb,
        cache: SyncCache,
    ) -> Self {
        let popups = PopupController::new(&config.popup);
        Self {
            config,
            provider,
            popups,
            notifier,
            db,
            cache,
            ladder: AlertLadder::new(),
            events: Vec::new(),
            last_sync_check: Utc::now(),
        }
    }

    /// Run until a termination signal arrives, then kill every popup and
    /// return.
    pub async fn run(mut self) {
        let mut sync_tick = tokio::time::interval(Duration::from_secs(SYNC_INTERVAL_SECS));
        let mut alert_tick =
            tokio::time::interval(Duration::from_secs(ALERT_CHECK_INTERVAL_SECS));

        log::info!(
            "Engine running: sync every {}s, alert checks every {}s, {} report(s) configured",
            SYNC_INTERVAL_SECS,
            ALERT_CHECK_INTERVAL_SECS,
            self.config.reports.len()
        );

        loop {
            tokio::select! {
                _ = sync_tick.tick() => {
                    self.on_sync_tick(Utc::now()).await;
                }
                _ = alert_tick.tick() => {
                    self.on_alert_tick(Utc::now()).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Termination signal received, shutting down popups");
                    self.popups.shutdown().await;
                    break;
                }
            }
        }
    }

    /// Sync tick: refresh the event cache, then run the O3 and weekly
    /// branches against it.
    async fn on_sync_tick(&mut self, now: DateTime<Utc>) {
        // Detect sleep: wall clock jumped well past the timer cadence
        let jump = (now - self.last_sync_check).num_seconds();
        if jump > SYNC_INTERVAL_SECS as i64 + TIME_JUMP_THRESHOLD_SECS {
            log::info!(
                "Detected system wake (time jumped {} seconds); catching up",
                jump
            );
        }
        self.last_sync_check = now;

        self.events = sync_events(self.provider.as_ref(), &self.cache, now).await;

        let live_ids: HashSet<String> = self.events.iter().map(|e| e.id.clone()).collect();
        self.ladder.purge(&live_ids);

        let ctx = O3Context {
            provider: self.provider.as_ref(),
            db: &self.db,
            notifier: self.notifier.as_ref(),
            config: &self.config,
        };
        run_checks(&ctx, &self.events, now).await;

        check_weekly_summary(&self.db, self.notifier.as_ref(), &self.config, now);
    }

    /// Alert tick: walk the threshold ladder over the cached events.
    async fn on_alert_tick(&mut self, now: DateTime<Utc>) {
        let due = self.ladder.check(now, &self.events);
        for (event, level) in due {
            log::info!(
                "Alert threshold {} crossed for event {} ({})",
                level,
                event.id,
                event.title
            );
            self.popups.trigger_alert(&self.events, &event, level).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::GROUP_START_TOLERANCE_SECS;

    #[test]
    fn test_alert_cadence_within_sync_cadence() {
        assert!(ALERT_CHECK_INTERVAL_SECS < SYNC_INTERVAL_SECS);
    }

    #[test]
    fn test_group_tolerance_covers_check_interval() {
        // Tuning one without the other desynchronizes grouping from the
        // threshold checks; keep the invariant pinned here too.
        assert!(GROUP_START_TOLERANCE_SECS >= ALERT_CHECK_INTERVAL_SECS as i64);
    }
}
