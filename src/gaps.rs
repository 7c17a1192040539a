//! Free/busy gap computation.
//!
//! Gaps are the complement of the busy-interval aggregate inside a window:
//! sort the intervals, walk a cursor across them, and keep every free span
//! at least `min_minutes` long, including leading and trailing ones. Gaps
//! are computed on demand and never persisted.

use chrono::{DateTime, Utc};

use crate::provider::CalendarProvider;
use crate::types::TimeSpan;

/// Which end of the window a "best" gap should hug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapPreference {
    /// Closest to the window end — the latest gap. Used before a meeting,
    /// when the freshest context wins.
    Before,
    /// Closest to the window start — the earliest gap. Used after a
    /// meeting, while memory is still warm.
    After,
}

/// Compute the free complement of `busy` inside the window.
///
/// Busy intervals may arrive unsorted and overlapping; spans outside the
/// window are clamped to it.
pub fn complement_gaps(
    busy: &[TimeSpan],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    min_minutes: i64,
) -> Vec<TimeSpan> {
    if window_end <= window_start {
        return Vec::new();
    }

    let mut intervals: Vec<TimeSpan> = busy
        .iter()
        .filter(|b| b.end > window_start && b.start < window_end)
        .map(|b| TimeSpan::new(b.start.max(window_start), b.end.min(window_end)))
        .collect();
    intervals.sort_by_key(|i| i.start);

    let mut gaps = Vec::new();
    let mut cursor = window_start;

    for interval in &intervals {
        if interval.start > cursor {
            let gap = TimeSpan::new(cursor, interval.start);
            if gap.duration_minutes() >= min_minutes {
                gaps.push(gap);
            }
        }
        cursor = cursor.max(interval.end);
    }

    // Gap after the last busy interval
    if cursor < window_end {
        let gap = TimeSpan::new(cursor, window_end);
        if gap.duration_minutes() >= min_minutes {
            gaps.push(gap);
        }
    }

    gaps
}

/// Query the provider and compute gaps for the window.
///
/// A free/busy failure yields an empty list (logged); callers simply retry
/// on their next poll, subject to their own deadline rules.
pub async fn find_gaps(
    provider: &dyn CalendarProvider,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    min_minutes: i64,
) -> Vec<TimeSpan> {
    let window = TimeSpan::new(window_start, window_end);
    match provider.busy_intervals(&window).await {
        Ok(busy) => complement_gaps(&busy, window_start, window_end, min_minutes),
        Err(e) => {
            log::warn!(
                "Free/busy query failed for {} .. {}: {}",
                window_start,
                window_end,
                e
            );
            Vec::new()
        }
    }
}

/// The single gap best matching the preference, if any qualifies.
pub async fn find_best_gap(
    provider: &dyn CalendarProvider,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    min_minutes: i64,
    preference: GapPreference,
) -> Option<TimeSpan> {
    let gaps = find_gaps(provider, window_start, window_end, min_minutes).await;
    pick_gap(&gaps, preference)
}

/// Gaps come out of the cursor walk ordered by start, so the pick is an
/// endpoint selection.
fn pick_gap(gaps: &[TimeSpan], preference: GapPreference) -> Option<TimeSpan> {
    match preference {
        GapPreference::Before => gaps.last().copied(),
        GapPreference::After => gaps.first().copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 10, hour, min, 0).unwrap()
    }

    fn span(start_h: u32, start_m: u32, end_h: u32, end_m: u32) -> TimeSpan {
        TimeSpan::new(at(start_h, start_m), at(end_h, end_m))
    }

    #[test]
    fn test_complement_worked_example() {
        // Busy [[10:00,10:30],[11:00,11:15]] in [9:00,12:00], min 15
        // => exactly [9:00-10:00], [10:30-11:00], [11:15-12:00]
        let busy = vec![span(10, 0, 10, 30), span(11, 0, 11, 15)];
        let gaps = complement_gaps(&busy, at(9, 0), at(12, 0), 15);

        assert_eq!(
            gaps,
            vec![span(9, 0, 10, 0), span(10, 30, 11, 0), span(11, 15, 12, 0)]
        );
    }

    #[test]
    fn test_complement_empty_busy_is_full_window() {
        let gaps = complement_gaps(&[], at(9, 0), at(12, 0), 15);
        assert_eq!(gaps, vec![span(9, 0, 12, 0)]);
    }

    #[test]
    fn test_complement_filters_short_gaps() {
        // 10-minute hole between meetings is below the 15-minute floor
        let busy = vec![span(9, 0, 9, 40), span(9, 50, 12, 0)];
        let gaps = complement_gaps(&busy, at(9, 0), at(12, 0), 15);
        assert!(gaps.is_empty());
    }

    #[test]
    fn test_complement_unsorted_overlapping_busy() {
        let busy = vec![span(10, 30, 11, 0), span(10, 0, 10, 45), span(9, 55, 10, 15)];
        let gaps = complement_gaps(&busy, at(9, 0), at(12, 0), 15);
        assert_eq!(gaps, vec![span(9, 0, 9, 55), span(11, 0, 12, 0)]);
    }

    #[test]
    fn test_complement_clamps_to_window() {
        let busy = vec![span(8, 0, 9, 30), span(11, 30, 13, 0)];
        let gaps = complement_gaps(&busy, at(9, 0), at(12, 0), 15);
        assert_eq!(gaps, vec![span(9, 30, 11, 30)]);
    }

    #[test]
    fn test_complement_inverted_window() {
        assert!(complement_gaps(&[], at(12, 0), at(9, 0), 15).is_empty());
    }

    #[test]
    fn test_pick_gap_preferences() {
        let gaps = vec![span(9, 0, 10, 0), span(10, 30, 11, 0), span(11, 15, 12, 0)];
        // "before" wants the latest gap, "after" the earliest
        assert_eq!(
            pick_gap(&gaps, GapPreference::Before),
            Some(span(11, 15, 12, 0))
        );
        assert_eq!(
            pick_gap(&gaps, GapPreference::After),
            Some(span(9, 0, 10, 0))
        );
    }

    #[test]
    fn test_pick_gap_empty() {
        assert_eq!(pick_gap(&[], GapPreference::Before), None);
        assert_eq!(pick_gap(&[], GapPreference::After), None);
    }

    mod provider_backed {
        use super::*;
        use crate::provider::{CalendarProvider, ProviderError};
        use crate::types::CalendarEvent;
        use async_trait::async_trait;

        struct StubBusy {
            busy: Vec<TimeSpan>,
            fail: bool,
        }

        #[async_trait]
        impl CalendarProvider for StubBusy {
            async fn upcoming_events(
                &self,
                _window: &TimeSpan,
            ) -> Result<Vec<CalendarEvent>, ProviderError> {
                Ok(vec![])
            }

            async fn busy_intervals(
                &self,
                _window: &TimeSpan,
            ) -> Result<Vec<TimeSpan>, ProviderError> {
                if self.fail {
                    Err(ProviderError::Transport("boom".into()))
                } else {
                    Ok(self.busy.clone())
                }
            }
        }

        #[tokio::test]
        async fn test_find_gaps_query_failure_is_empty() {
            let provider = StubBusy {
                busy: vec![],
                fail: true,
            };
            let gaps = find_gaps(&provider, at(9, 0), at(12, 0), 15).await;
            assert!(gaps.is_empty());
        }

        #[tokio::test]
        async fn test_find_best_gap_before() {
            let provider = StubBusy {
                busy: vec![span(10, 0, 10, 30)],
                fail: false,
            };
            let best = find_best_gap(&provider, at(9, 0), at(12, 0), 15, GapPreference::Before)
                .await;
            assert_eq!(best, Some(span(10, 30, 12, 0)));
        }
    }
}
