//! One-on-one ("O3") reminder scheduling.
//!
//! Every sync cycle re-scans the cached events. A qualifying one-on-one
//! gets a persisted session with three independently-gated, monotonic
//! notifications: afternoon-before prep, pre-meeting prep, and a
//! post-meeting logging nudge. Each gate is a set-once flag on the
//! session, so re-running over identical state is a no-op, and a failure
//! in one notification never blocks the other two.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::db::{DbError, O3Session, SessionDb};
use crate::gaps::{find_best_gap, find_gaps, GapPreference};
use crate::notify::{send_best_effort, Notifier};
use crate::provider::CalendarProvider;
use crate::types::{CalendarEvent, Config, NotificationKind, ReportConfig, ResponseStatus};

/// Pre-meeting prep may fire this long before start.
pub const PRE_MEETING_LEAD_HOURS: i64 = 3;

/// Post-meeting nudge defers for a gap at most this long; past the
/// deadline it fires unconditionally.
pub const POST_MEETING_DEFER_HOURS: i64 = 4;

/// Classify an event as an O3 with one of the configured reports.
///
/// Qualifies iff: exactly two attendees, the non-self attendee's email
/// matches a configured report, and neither party declined.
pub fn detect_o3<'a>(
    event: &CalendarEvent,
    reports: &'a [ReportConfig],
) -> Option<&'a ReportConfig> {
    if event.attendees.len() != 2 {
        return None;
    }

    let this_user = event.attendees.iter().find(|a| a.is_self)?;
    let other = event.attendees.iter().find(|a| !a.is_self)?;

    if this_user.response == ResponseStatus::Declined
        || other.response == ResponseStatus::Declined
    {
        return None;
    }

    reports
        .iter()
        .find(|r| r.email.eq_ignore_ascii_case(&other.email))
}

/// Everything the checks need, borrowed from the engine for one cycle.
pub struct O3Context<'a> {
    pub provider: &'a dyn CalendarProvider,
    pub db: &'a SessionDb,
    pub notifier: &'a dyn Notifier,
    pub config: &'a Config,
}

/// Scan the cached events and fire whatever is due at `now`.
pub async fn run_checks(ctx: &O3Context<'_>, events: &[CalendarEvent], now: DateTime<Utc>) {
    if ctx.config.reports.is_empty() {
        return;
    }

    let tz: Tz = ctx.config.timezone.parse().unwrap_or_else(|_| {
        log::warn!(
            "Invalid timezone '{}', falling back to UTC",
            ctx.config.timezone
        );
        chrono_tz::UTC
    });

    for event in events {
        let Some(report) = detect_o3(event, &ctx.config.reports) else {
            continue;
        };

        if let Err(e) = run_event_checks(ctx, event, report, now, tz).await {
            log::warn!(
                "O3 checks failed for event {} ({}): {}",
                event.id,
                report.email,
                e
            );
        }
    }
}

async fn run_event_checks(
    ctx: &O3Context<'_>,
    event: &CalendarEvent,
    report: &ReportConfig,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<(), DbError> {
    ctx.db
        .upsert_session(&event.id, &report.email, &report.name, event.start, event.end)?;

    let Some(session) = ctx.db.get_session(&event.id)? else {
        return Ok(());
    };

    // The three notifications are independent; one failing its store
    // write must not starve the others.
    if let Err(e) = check_afternoon_prep(ctx, event, report, &session, now, tz).await {
        log::warn!("Afternoon prep check failed for event {}: {}", event.id, e);
    }
    if let Err(e) = check_pre_meeting_prep(ctx, event, report, &session, now, tz).await {
        log::warn!("Pre-meeting prep check failed for event {}: {}", event.id, e);
    }
    if let Err(e) = check_post_meeting_nudge(ctx, event, report, &session, now).await {
        log::warn!("Post-meeting nudge check failed for event {}: {}", event.id, e);
    }

    Ok(())
}

/// Afternoon-before prep: once, the day before, inside the configured
/// afternoon window, and only when a trailing gap after now exists.
async fn check_afternoon_prep(
    ctx: &O3Context<'_>,
    event: &CalendarEvent,
    report: &ReportConfig,
    session: &O3Session,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<(), DbError> {
    if session.notification_sent(NotificationKind::AfternoonPrep) {
        return Ok(());
    }

    let local_now = now.with_timezone(&tz);
    let event_local_date = event.start.with_timezone(&tz).date_naive();

    if event_local_date != local_now.date_naive() + Duration::days(1) {
        return Ok(());
    }

    let o3_cfg = &ctx.config.o3;
    let hour = chrono::Timelike::hour(&local_now);
    if hour < o3_cfg.afternoon_start_hour || hour >= o3_cfg.afternoon_end_hour {
        return Ok(());
    }

    // Trailing bound: the end of today's afternoon window
    let Some(end_time) = NaiveTime::from_hms_opt(o3_cfg.afternoon_end_hour, 0, 0) else {
        return Ok(());
    };
    let window_end_naive = local_now.date_naive().and_time(end_time);
    let Some(window_end) = tz.from_local_datetime(&window_end_naive).single() else {
        return Ok(());
    };
    let window_end = window_end.with_timezone(&Utc);

    let gaps = find_gaps(ctx.provider, now, window_end, o3_cfg.min_gap_minutes).await;
    if gaps.is_empty() {
        return Ok(());
    }

    if ctx
        .db
        .mark_notification_sent(&event.id, NotificationKind::AfternoonPrep)?
    {
        let prior = ctx.db.latest_prior_session(&report.email, event.start)?;
        let start_local = event.start.with_timezone(&tz);
        let mut body = format!(
            "Tomorrow at {}: one-on-one with {}. You have a free window now — a good time to prep.",
            start_local.format("%H:%M"),
            report.name
        );
        if let Some(prior) = prior {
            body.push_str(&format!(
                " Last session was {}.",
                prior.start_time.with_timezone(&tz).format("%Y-%m-%d")
            ));
        }
        log::info!(
            "O3 afternoon prep for {} (event {})",
            report.email,
            event.id
        );
        send_best_effort(ctx.notifier, &format!("O3 tomorrow: {}", report.name), &body);
    }

    Ok(())
}

/// Pre-meeting prep: once, within the lead window before start, in the gap
/// closest to the meeting (freshest context).
async fn check_pre_meeting_prep(
    ctx: &O3Context<'_>,
    event: &CalendarEvent,
    report: &ReportConfig,
    session: &O3Session,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<(), DbError> {
    if session.notification_sent(NotificationKind::PreMeetingPrep) {
        return Ok(());
    }

    let lead = event.start - now;
    if lead <= Duration::zero() || lead > Duration::hours(PRE_MEETING_LEAD_HOURS) {
        return Ok(());
    }

    let gap = find_best_gap(
        ctx.provider,
        now,
        event.start,
        ctx.config.o3.min_gap_minutes,
        GapPreference::Before,
    )
    .await;
    if gap.is_none() {
        return Ok(());
    }

    if ctx
        .db
        .mark_notification_sent(&event.id, NotificationKind::PreMeetingPrep)?
    {
        let start_local = event.start.with_timezone(&tz);
        log::info!(
            "O3 pre-meeting prep for {} (event {})",
            report.email,
            event.id
        );
        send_best_effort(
            ctx.notifier,
            &format!("O3 soon: {}", report.name),
            &format!(
                "One-on-one with {} at {}. Skim your notes before you head in.",
                report.name,
                start_local.format("%H:%M")
            ),
        );
    }

    Ok(())
}

/// Post-meeting nudge: once, after end, in the earliest gap while memory is
/// warm; past the defer deadline it fires regardless of the calendar.
async fn check_post_meeting_nudge(
    ctx: &O3Context<'_>,
    event: &CalendarEvent,
    report: &ReportConfig,
    session: &O3Session,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    if session.notification_sent(NotificationKind::PostMeetingNudge) {
        return Ok(());
    }

    if now <= event.end {
        return Ok(());
    }

    let deadline = event.end + Duration::hours(POST_MEETING_DEFER_HOURS);
    let due = if now >= deadline {
        // Deadline overrides the gap requirement
        true
    } else {
        find_best_gap(
            ctx.provider,
            now,
            deadline,
            ctx.config.o3.min_gap_minutes,
            GapPreference::After,
        )
        .await
        .is_some()
    };

    if !due {
        return Ok(());
    }

    if ctx
        .db
        .mark_notification_sent(&event.id, NotificationKind::PostMeetingNudge)?
    {
        log::info!(
            "O3 post-meeting nudge for {} (event {})",
            report.email,
            event.id
        );
        send_best_effort(
            ctx.notifier,
            &format!("Log your O3 with {}", report.name),
            &format!(
                "Your one-on-one with {} wrapped up. Capture notes and log the session while it's fresh.",
                report.name
            ),
        );
    }

    Ok(())
}
