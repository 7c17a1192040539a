//! Overlapping-meeting grouping.
//!
//! Events whose starts land within the grouping tolerance of a cluster's
//! earliest start are presented as one notification unit. Groups are
//! recomputed from the full cached event set on every alert — never cached —
//! so a meeting discovered after its group was already displayed still
//! joins it on the next escalation.

use chrono::{DateTime, Duration, Utc};

use crate::types::CalendarEvent;

/// A transient cluster of near-simultaneous events, keyed by earliest start
#[derive(Debug, Clone)]
pub struct MeetingGroup {
    pub key: DateTime<Utc>,
    pub events: Vec<CalendarEvent>,
}

/// Cluster events by start-time proximity.
///
/// An event joins the current cluster when its start is within `tolerance`
/// of the cluster's *earliest* start (not the previous event's), so the
/// tolerance bounds total cluster spread.
pub fn group_events(events: &[CalendarEvent], tolerance: Duration) -> Vec<MeetingGroup> {
    let mut sorted: Vec<&CalendarEvent> = events.iter().collect();
    sorted.sort_by_key(|e| (e.start, e.id.clone()));

    let mut groups: Vec<MeetingGroup> = Vec::new();

    for event in sorted {
        match groups.last_mut() {
            Some(group) if event.start - group.key <= tolerance => {
                group.events.push(event.clone());
            }
            _ => groups.push(MeetingGroup {
                key: event.start,
                events: vec![event.clone()],
            }),
        }
    }

    groups
}

/// The group containing `event_id`, recomputed fresh from `events`.
///
/// Falls back to a singleton group when the event is no longer in the
/// cached set (it can have been cancelled between check and trigger).
pub fn group_for_event(
    events: &[CalendarEvent],
    event: &CalendarEvent,
    tolerance: Duration,
) -> MeetingGroup {
    group_events(events, tolerance)
        .into_iter()
        .find(|g| g.events.iter().any(|e| e.id == event.id))
        .unwrap_or_else(|| MeetingGroup {
            key: event.start,
            events: vec![event.clone()],
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_at(id: &str, hour: u32, min: u32, sec: u32) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: id.to_string(),
            start: Utc.with_ymd_and_hms(2026, 8, 10, hour, min, sec).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 8, 10, hour + 1, min, sec).unwrap(),
            attendees: vec![],
            location: None,
            description: None,
            conference: vec![],
            all_day: false,
        }
    }

    #[test]
    fn test_events_within_tolerance_share_group() {
        let a = event_at("a", 10, 0, 0);
        let b = event_at("b", 10, 0, 45);
        let tolerance = Duration::seconds(60);

        // Same group regardless of input order
        let groups = group_events(&[a.clone(), b.clone()], tolerance);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].events.len(), 2);

        let groups = group_events(&[b, a], tolerance);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].events.len(), 2);
    }

    #[test]
    fn test_events_outside_tolerance_split() {
        let a = event_at("a", 10, 0, 0);
        let b = event_at("b", 10, 5, 0);
        let groups = group_events(&[a, b], Duration::seconds(60));
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_group_key_is_earliest_start() {
        let a = event_at("a", 10, 0, 0);
        let b = event_at("b", 10, 0, 30);
        let groups = group_events(&[b, a.clone()], Duration::seconds(60));
        assert_eq!(groups[0].key, a.start);
    }

    #[test]
    fn test_tolerance_anchored_to_earliest() {
        // a=0s, b=50s, c=100s with 60s tolerance: c is within 60s of b but
        // not of the cluster anchor a, so it opens a new group.
        let a = event_at("a", 10, 0, 0);
        let b = event_at("b", 10, 0, 50);
        let c = event_at("c", 10, 1, 40);
        let groups = group_events(&[a, b, c], Duration::seconds(60));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].events.len(), 2);
        assert_eq!(groups[1].events.len(), 1);
    }

    #[test]
    fn test_group_for_event_fallback_singleton() {
        let cached = vec![event_at("a", 10, 0, 0)];
        let gone = event_at("gone", 11, 0, 0);
        let group = group_for_event(&cached, &gone, Duration::seconds(60));
        assert_eq!(group.events.len(), 1);
        assert_eq!(group.events[0].id, "gone");
        assert_eq!(group.key, gone.start);
    }

    #[test]
    fn test_late_discovered_meeting_joins_existing_group() {
        let a = event_at("a", 10, 0, 0);
        let b = event_at("b", 10, 0, 30);
        // First computation sees only a; the next one (fresh, full set)
        // places b alongside it.
        let first = group_for_event(&[a.clone()], &a, Duration::seconds(60));
        assert_eq!(first.events.len(), 1);
        let second = group_for_event(&[a.clone(), b], &a, Duration::seconds(60));
        assert_eq!(second.events.len(), 2);
        assert_eq!(second.key, a.start);
    }
}
