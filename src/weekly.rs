//! Weekly O3 accountability rollup.
//!
//! Fires once per calendar week at a configured cron slot, guarded by a
//! persisted last-sent date marker so every check inside the firing hour
//! after the first is a no-op. The rollup covers the Monday–Sunday window
//! containing the firing time.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::db::{ReportWeekSummary, SessionDb};
use crate::error::EngineError;
use crate::notify::{send_best_effort, Notifier};
use crate::types::{Config, ReportConfig, ScheduleEntry};

/// Marker key for the last-sent local date.
pub const WEEKLY_SUMMARY_MARKER: &str = "weekly_summary_last_sent";

/// Parse a 5-field cron expression.
///
/// The cron crate expects 6 fields (with seconds); we prepend "0".
pub fn parse_cron(expr: &str) -> Result<Schedule, EngineError> {
    let full_expr = format!("0 {}", expr);
    full_expr.parse::<Schedule>().map_err(|e| {
        EngineError::Configuration(format!("Invalid cron expression '{}': {}", expr, e))
    })
}

/// True when a scheduled occurrence landed within the hour before `now`.
fn is_due(schedule: &Schedule, tz: Tz, now: DateTime<Utc>) -> bool {
    let now_local = now.with_timezone(&tz);
    schedule
        .after(&(now_local - Duration::hours(1)))
        .take_while(|t| *t <= now_local)
        .last()
        .is_some()
}

/// The Monday 00:00 – next-Monday 00:00 local window containing `now`.
fn week_window(now: DateTime<Utc>, tz: Tz) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let local = now.with_timezone(&tz);
    let days_from_monday = local.weekday().num_days_from_monday() as i64;
    let monday = local.date_naive() - Duration::days(days_from_monday);
    let start_naive = monday.and_time(NaiveTime::MIN);

    let start = tz.from_local_datetime(&start_naive).earliest()?;
    let start = start.with_timezone(&Utc);
    Some((start, start + Duration::days(7)))
}

/// One status line per configured report.
fn render_lines(reports: &[ReportConfig], summaries: &[ReportWeekSummary]) -> String {
    reports
        .iter()
        .map(|report| {
            let summary = summaries
                .iter()
                .find(|s| s.report_email.eq_ignore_ascii_case(&report.email));
            match summary {
                None | Some(ReportWeekSummary { held: 0, .. }) => {
                    format!("{}: no one-on-ones held this week", report.name)
                }
                Some(s) if s.logged == s.held => {
                    format!("{}: {} held, all logged", report.name, s.held)
                }
                Some(s) => format!(
                    "{}: {} held, {} of {} logged",
                    report.name, s.held, s.logged, s.held
                ),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run the weekly check at `now`. Safe to call every sync cycle.
pub fn check_weekly_summary(
    db: &SessionDb,
    notifier: &dyn Notifier,
    config: &Config,
    now: DateTime<Utc>,
) {
    let entry: &ScheduleEntry = &config.schedules.weekly_summary;
    if !entry.enabled || config.reports.is_empty() {
        return;
    }

    let schedule = match parse_cron(&entry.cron) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("Weekly summary schedule unusable: {}", e);
            return;
        }
    };
    let tz: Tz = match entry.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            log::warn!("Invalid weekly summary timezone: {}", entry.timezone);
            return;
        }
    };

    if !is_due(&schedule, tz, now) {
        return;
    }

    // Once per week: the marker holds the local date of the last send
    let today = now.with_timezone(&tz).date_naive().to_string();
    match db.get_marker(WEEKLY_SUMMARY_MARKER) {
        Ok(Some(last)) if last == today => return,
        Ok(_) => {}
        Err(e) => {
            log::warn!("Weekly summary marker unreadable: {}", e);
            return;
        }
    }

    let Some((week_start, week_end)) = week_window(now, tz) else {
        log::warn!("Could not resolve week window for weekly summary");
        return;
    };

    let summaries = match db.weekly_summary(week_start, week_end) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("Weekly summary query failed: {}", e);
            return;
        }
    };

    let body = render_lines(&config.reports, &summaries);
    log::info!(
        "Sending weekly O3 summary for week starting {}",
        week_start
    );
    send_best_effort(notifier, "Weekly O3 summary", &body);

    if let Err(e) = db.set_marker(WEEKLY_SUMMARY_MARKER, &today) {
        log::warn!("Failed to persist weekly summary marker: {}", e);
    }
}
