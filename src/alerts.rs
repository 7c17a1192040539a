//! Per-event alert threshold state machine.
//!
//! Ladder: none → T-10min → T-5min → T-1min → start, crossed by wall-clock
//! comparison of time-to-start against each threshold. Each (event, level)
//! pair fires at most once; the fired set lives in memory only, so a
//! restart inside the ladder can re-show one alert the user already saw.
//! That trade was made deliberately: the popup re-appears minimized and
//! costs one glance, which is not worth a persisted TTL store.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::types::{AlertLevel, CalendarEvent};

/// Cadence of the alert-threshold check.
pub const ALERT_CHECK_INTERVAL_SECS: u64 = 15;

/// Start-time proximity for overlap grouping. Must cover at least one
/// check interval, otherwise two meetings crossing a threshold on
/// adjacent ticks could land in different groups.
pub const GROUP_START_TOLERANCE_SECS: i64 = 60;

/// Events that started more than this long ago never alert.
pub const ALERT_GRACE_PERIOD_SECS: i64 = 300;

pub fn group_tolerance() -> Duration {
    Duration::seconds(GROUP_START_TOLERANCE_SECS)
}

/// Tracks which (event, level) pairs have fired.
#[derive(Debug, Default)]
pub struct AlertLadder {
    fired: HashSet<(String, AlertLevel)>,
}

impl AlertLadder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The level due for an event at `now`, ignoring fired state.
    ///
    /// None when the event is still beyond the earliest threshold, or
    /// started more than the grace period ago (no retroactive alerts).
    fn due_level(now: DateTime<Utc>, event: &CalendarEvent) -> Option<AlertLevel> {
        let seconds_to_start = (event.start - now).num_seconds();

        if seconds_to_start < -ALERT_GRACE_PERIOD_SECS {
            return None;
        }

        // Most urgent threshold already crossed
        AlertLevel::ladder()
            .into_iter()
            .rev()
            .find(|level| seconds_to_start <= level.lead_minutes() * 60)
    }

    /// One check tick: returns the alerts to raise now.
    ///
    /// When the first observation of an event lands mid-ladder (engine
    /// started at T-3, say), earlier levels are consumed without firing so
    /// exactly one alert surfaces per crossing.
    pub fn check(
        &mut self,
        now: DateTime<Utc>,
        events: &[CalendarEvent],
    ) -> Vec<(CalendarEvent, AlertLevel)> {
        let mut due = Vec::new();

        for event in events {
            let Some(level) = Self::due_level(now, event) else {
                continue;
            };

            if self.fired.contains(&(event.id.clone(), level)) {
                continue;
            }

            // Consume this level and everything earlier on the ladder
            for earlier in AlertLevel::ladder() {
                if earlier <= level {
                    self.fired.insert((event.id.clone(), earlier));
                }
            }

            due.push((event.clone(), level));
        }

        due
    }

    /// Drop fired entries for events no longer in the lookahead window.
    /// Called once per sync cycle to keep the set bounded.
    pub fn purge(&mut self, live_event_ids: &HashSet<String>) {
        self.fired.retain(|(id, _)| live_event_ids.contains(id));
    }

    #[cfg(test)]
    fn fired_count(&self) -> usize {
        self.fired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 10, 12, 0, 0).unwrap()
    }

    fn event_starting_in(id: &str, minutes: i64) -> CalendarEvent {
        let start = now() + Duration::minutes(minutes);
        CalendarEvent {
            id: id.to_string(),
            title: id.to_string(),
            start,
            end: start + Duration::minutes(30),
            attendees: vec![],
            location: None,
            description: None,
            conference: vec![],
            all_day: false,
        }
    }

    #[test]
    fn test_tolerance_covers_check_interval() {
        assert!(GROUP_START_TOLERANCE_SECS >= ALERT_CHECK_INTERVAL_SECS as i64);
    }

    #[test]
    fn test_each_level_fires_at_most_once() {
        let mut ladder = AlertLadder::new();
        let events = vec![event_starting_in("e1", 9)];

        let first = ladder.check(now(), &events);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].1, AlertLevel::TenMinutes);

        // Same tick conditions: nothing new
        assert!(ladder.check(now(), &events).is_empty());
        assert!(ladder.check(now() + Duration::seconds(15), &events).is_empty());
    }

    #[test]
    fn test_ladder_progression() {
        let mut ladder = AlertLadder::new();
        let events = vec![event_starting_in("e1", 9)];

        assert_eq!(ladder.check(now(), &events)[0].1, AlertLevel::TenMinutes);
        assert_eq!(
            ladder.check(now() + Duration::minutes(5), &events)[0].1,
            AlertLevel::FiveMinutes
        );
        assert_eq!(
            ladder.check(now() + Duration::minutes(8) + Duration::seconds(15), &events)[0].1,
            AlertLevel::OneMinute
        );
        assert_eq!(
            ladder.check(now() + Duration::minutes(9), &events)[0].1,
            AlertLevel::Start
        );
        // Ladder exhausted
        assert!(ladder
            .check(now() + Duration::minutes(10), &events)
            .is_empty());
    }

    #[test]
    fn test_no_alert_past_grace_period() {
        let mut ladder = AlertLadder::new();
        let events = vec![event_starting_in("old", -6)];
        assert!(ladder.check(now(), &events).is_empty());
    }

    #[test]
    fn test_within_grace_period_fires_start() {
        let mut ladder = AlertLadder::new();
        let events = vec![event_starting_in("recent", -4)];
        let due = ladder.check(now(), &events);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, AlertLevel::Start);
    }

    #[test]
    fn test_mid_ladder_start_consumes_earlier_levels() {
        let mut ladder = AlertLadder::new();
        let events = vec![event_starting_in("e1", 3)];

        // First sight at T-3: only the 5-minute level fires...
        let due = ladder.check(now(), &events);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, AlertLevel::FiveMinutes);
        // ...but the 10-minute level is consumed too
        assert_eq!(ladder.fired_count(), 2);

        // T-10 never fires retroactively
        let due = ladder.check(now() + Duration::seconds(30), &events);
        assert!(due.is_empty());
    }

    #[test]
    fn test_purge_drops_stale_entries() {
        let mut ladder = AlertLadder::new();
        ladder.check(now(), &[event_starting_in("e1", 9), event_starting_in("e2", 8)]);
        assert!(ladder.fired_count() > 0);

        let live: HashSet<String> = ["e2".to_string()].into_iter().collect();
        ladder.purge(&live);
        assert_eq!(ladder.fired_count(), 1);

        ladder.purge(&HashSet::new());
        assert_eq!(ladder.fired_count(), 0);
    }

    #[test]
    fn test_independent_events_independent_ladders() {
        let mut ladder = AlertLadder::new();
        let events = vec![event_starting_in("a", 9), event_starting_in("b", 4)];
        let due = ladder.check(now(), &events);
        assert_eq!(due.len(), 2);
        let levels: Vec<AlertLevel> = due.iter().map(|(_, l)| *l).collect();
        assert!(levels.contains(&AlertLevel::TenMinutes));
        assert!(levels.contains(&AlertLevel::FiveMinutes));
    }
}
