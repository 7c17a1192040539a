use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{DbError, SessionDb};
use crate::types::NotificationKind;

/// A persisted one-on-one session, keyed by calendar event id.
///
/// The three sent flags and `lattice_logged` are set-once: the upsert never
/// touches them, and `mark_notification_sent` only flips 0 → 1.
#[derive(Debug, Clone)]
pub struct O3Session {
    pub event_id: String,
    pub report_email: String,
    pub report_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub afternoon_prep_sent: bool,
    pub pre_meeting_sent: bool,
    pub post_meeting_sent: bool,
    pub lattice_logged: bool,
}

impl O3Session {
    pub fn notification_sent(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::AfternoonPrep => self.afternoon_prep_sent,
            NotificationKind::PreMeetingPrep => self.pre_meeting_sent,
            NotificationKind::PostMeetingNudge => self.post_meeting_sent,
        }
    }
}

/// One report's O3 counts for a Monday–Sunday window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportWeekSummary {
    pub report_email: String,
    pub held: i64,
    pub logged: i64,
}

fn flag_column(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::AfternoonPrep => "afternoon_prep_sent",
        NotificationKind::PreMeetingPrep => "pre_meeting_sent",
        NotificationKind::PostMeetingNudge => "post_meeting_sent",
    }
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

impl SessionDb {
    // =========================================================================
    // O3 sessions
    // =========================================================================

    /// Create or refresh a session for a detected one-on-one.
    ///
    /// Idempotent: re-detection updates the scheduled times (the event may
    /// have been dragged) and never clears a sent flag.
    pub fn upsert_session(
        &self,
        event_id: &str,
        report_email: &str,
        report_name: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO o3_sessions
                (event_id, report_email, report_name, start_time, end_time,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(event_id) DO UPDATE SET
                report_email = excluded.report_email,
                report_name  = excluded.report_name,
                start_time   = excluded.start_time,
                end_time     = excluded.end_time,
                updated_at   = excluded.updated_at",
            params![
                event_id,
                report_email.to_lowercase(),
                report_name,
                start_time.to_rfc3339(),
                end_time.to_rfc3339(),
                now,
            ],
        )?;
        Ok(())
    }

    /// Look up a session by calendar event id.
    pub fn get_session(&self, event_id: &str) -> Result<Option<O3Session>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, report_email, report_name, start_time, end_time,
                    afternoon_prep_sent, pre_meeting_sent, post_meeting_sent,
                    lattice_logged
             FROM o3_sessions
             WHERE event_id = ?1",
        )?;

        let mut rows = stmt.query_map(params![event_id], map_session_row)?;
        match rows.next() {
            Some(Ok(session)) => Ok(Some(session)),
            Some(Err(e)) => Err(DbError::Sqlite(e)),
            None => Ok(None),
        }
    }

    /// The most recent session with a report that started before `before`.
    /// Used to reference "last time" in prep messages.
    pub fn latest_prior_session(
        &self,
        report_email: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<O3Session>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, report_email, report_name, start_time, end_time,
                    afternoon_prep_sent, pre_meeting_sent, post_meeting_sent,
                    lattice_logged
             FROM o3_sessions
             WHERE report_email = ?1 AND start_time < ?2
             ORDER BY start_time DESC
             LIMIT 1",
        )?;

        let mut rows = stmt.query_map(
            params![report_email.to_lowercase(), before.to_rfc3339()],
            map_session_row,
        )?;
        match rows.next() {
            Some(Ok(session)) => Ok(Some(session)),
            Some(Err(e)) => Err(DbError::Sqlite(e)),
            None => Ok(None),
        }
    }

    /// Flip one of the three sent flags 0 → 1.
    ///
    /// Returns true when this call set the flag, false when it was already
    /// set — the caller only sends the notification on true, which is what
    /// makes re-scans safe no-ops.
    pub fn mark_notification_sent(
        &self,
        event_id: &str,
        kind: NotificationKind,
    ) -> Result<bool, DbError> {
        let column = flag_column(kind);
        let changed = self.conn.execute(
            &format!(
                "UPDATE o3_sessions
                 SET {column} = 1, updated_at = ?1
                 WHERE event_id = ?2 AND {column} = 0"
            ),
            params![Utc::now().to_rfc3339(), event_id],
        )?;
        Ok(changed > 0)
    }

    /// Record that the manager logged notes for this session externally.
    pub fn set_lattice_logged(&self, event_id: &str, logged: bool) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE o3_sessions
             SET lattice_logged = ?1, updated_at = ?2
             WHERE event_id = ?3",
            params![logged as i64, Utc::now().to_rfc3339(), event_id],
        )?;
        Ok(())
    }

    /// Per-report counts of sessions held (and lattice-logged) in a window.
    pub fn weekly_summary(
        &self,
        week_start: DateTime<Utc>,
        week_end: DateTime<Utc>,
    ) -> Result<Vec<ReportWeekSummary>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT report_email,
                    COUNT(*),
                    COALESCE(SUM(lattice_logged), 0)
             FROM o3_sessions
             WHERE start_time >= ?1 AND start_time < ?2
             GROUP BY report_email
             ORDER BY report_email",
        )?;

        let rows = stmt.query_map(
            params![week_start.to_rfc3339(), week_end.to_rfc3339()],
            |row| {
                Ok(ReportWeekSummary {
                    report_email: row.get(0)?,
                    held: row.get(1)?,
                    logged: row.get(2)?,
                })
            },
        )?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }
}

fn map_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<O3Session> {
    Ok(O3Session {
        event_id: row.get(0)?,
        report_email: row.get(1)?,
        report_name: row.get(2)?,
        start_time: parse_time(&row.get::<_, String>(3)?),
        end_time: parse_time(&row.get::<_, String>(4)?),
        afternoon_prep_sent: row.get::<_, i64>(5)? != 0,
        pre_meeting_sent: row.get::<_, i64>(6)? != 0,
        post_meeting_sent: row.get::<_, i64>(7)? != 0,
        lattice_logged: row.get::<_, i64>(8)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn open_test_db() -> (tempfile::TempDir, SessionDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = SessionDb::open_at(dir.path().join("vigil.db")).unwrap();
        (dir, db)
    }

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_upsert_preserves_flags() {
        let (_dir, db) = open_test_db();
        db.upsert_session("ev1", "Alice@Acme.com", "Alice", t(10, 14), t(10, 15))
            .unwrap();
        assert!(db.mark_notification_sent("ev1", NotificationKind::PreMeetingPrep).unwrap());

        // Re-detection with a moved start time
        db.upsert_session("ev1", "alice@acme.com", "Alice", t(10, 16), t(10, 17))
            .unwrap();

        let session = db.get_session("ev1").unwrap().unwrap();
        assert_eq!(session.start_time, t(10, 16));
        assert!(session.pre_meeting_sent, "upsert must not clear sent flags");
        assert_eq!(session.report_email, "alice@acme.com");
    }

    #[test]
    fn test_mark_notification_sent_is_set_once() {
        let (_dir, db) = open_test_db();
        db.upsert_session("ev1", "alice@acme.com", "Alice", t(10, 14), t(10, 15))
            .unwrap();

        assert!(db.mark_notification_sent("ev1", NotificationKind::AfternoonPrep).unwrap());
        // Second attempt reports "already sent"
        assert!(!db.mark_notification_sent("ev1", NotificationKind::AfternoonPrep).unwrap());

        // Other flags unaffected
        let session = db.get_session("ev1").unwrap().unwrap();
        assert!(session.afternoon_prep_sent);
        assert!(!session.pre_meeting_sent);
        assert!(!session.post_meeting_sent);
    }

    #[test]
    fn test_latest_prior_session() {
        let (_dir, db) = open_test_db();
        db.upsert_session("ev1", "alice@acme.com", "Alice", t(3, 14), t(3, 15))
            .unwrap();
        db.upsert_session("ev2", "alice@acme.com", "Alice", t(10, 14), t(10, 15))
            .unwrap();
        db.upsert_session("ev3", "bob@acme.com", "Bob", t(9, 14), t(9, 15))
            .unwrap();

        let prior = db
            .latest_prior_session("alice@acme.com", t(10, 0))
            .unwrap()
            .unwrap();
        assert_eq!(prior.event_id, "ev1");

        assert!(db
            .latest_prior_session("alice@acme.com", t(3, 0))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_weekly_summary_aggregates_per_report() {
        let (_dir, db) = open_test_db();
        // Week window: Aug 10 (Monday) .. Aug 17
        db.upsert_session("ev1", "alice@acme.com", "Alice", t(11, 14), t(11, 15))
            .unwrap();
        db.upsert_session("ev2", "alice@acme.com", "Alice", t(13, 14), t(13, 15))
            .unwrap();
        db.upsert_session("ev3", "bob@acme.com", "Bob", t(12, 10), t(12, 11))
            .unwrap();
        // Outside the window
        db.upsert_session("ev4", "alice@acme.com", "Alice", t(4, 14), t(4, 15))
            .unwrap();

        db.set_lattice_logged("ev1", true).unwrap();

        let summary = db.weekly_summary(t(10, 0), t(17, 0)).unwrap();
        assert_eq!(
            summary,
            vec![
                ReportWeekSummary {
                    report_email: "alice@acme.com".into(),
                    held: 2,
                    logged: 1,
                },
                ReportWeekSummary {
                    report_email: "bob@acme.com".into(),
                    held: 1,
                    logged: 0,
                },
            ]
        );
    }

    #[test]
    fn test_mark_on_unknown_event_is_noop() {
        let (_dir, db) = open_test_db();
        assert!(!db
            .mark_notification_sent("ghost", NotificationKind::PostMeetingNudge)
            .unwrap());
    }
}
