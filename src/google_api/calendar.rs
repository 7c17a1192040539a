//! Google Calendar API v3 — event fetching and free/busy queries.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{send_with_retry, GoogleApiError, RetryPolicy};
use crate::types::{Attendee, CalendarEvent, ConferenceEntryPoint, ResponseStatus, TimeSpan};

// ============================================================================
// API response types (deserialized from Google Calendar JSON)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<RawEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: Option<String>,
    start: Option<RawEventTime>,
    end: Option<RawEventTime>,
    #[serde(default)]
    attendees: Vec<RawAttendee>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    conference_data: Option<RawConferenceData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEventTime {
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAttendee {
    #[serde(default)]
    email: String,
    #[serde(default)]
    response_status: Option<String>,
    #[serde(default)]
    resource: Option<bool>,
    #[serde(rename = "self", default)]
    is_self: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConferenceData {
    #[serde(default)]
    entry_points: Vec<RawEntryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntryPoint {
    #[serde(default)]
    entry_point_type: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<RawBusySpan>,
}

#[derive(Debug, Deserialize)]
struct RawBusySpan {
    start: String,
    end: String,
}

// ============================================================================
// Calendar API
// ============================================================================

/// Fetch events from the primary calendar inside a time window.
///
/// Recurring instances are expanded (singleEvents), ordered by start, and
/// paginated (maxResults=250, pageToken). Cancelled events and resource-room
/// attendees are dropped here; events with unparseable times are skipped
/// with a warning rather than surfaced to business logic.
pub async fn fetch_events(
    access_token: &str,
    time_min: DateTime<Utc>,
    time_max: DateTime<Utc>,
) -> Result<Vec<CalendarEvent>, GoogleApiError> {
    let client = reqwest::Client::new();
    let time_min = time_min.to_rfc3339();
    let time_max = time_max.to_rfc3339();

    let mut all_events = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut request = client
            .get("https://www.googleapis.com/calendar/v3/calendars/primary/events")
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", "250"),
            ]);

        if let Some(ref token) = page_token {
            request = request.query(&[("pageToken", token.as_str())]);
        }

        let resp = send_with_retry(request, &RetryPolicy::default()).await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GoogleApiError::AuthExpired);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GoogleApiError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: EventListResponse = resp.json().await?;

        for item in body.items {
            if item.status.as_deref() == Some("cancelled") {
                continue;
            }
            if let Some(event) = normalize_event(item) {
                all_events.push(event);
            }
        }

        page_token = body.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    Ok(all_events)
}

/// Query the free/busy aggregate for the primary calendar.
///
/// Returns busy intervals inside the window, unsorted and possibly
/// overlapping — the gap finder owns sorting and coalescing.
pub async fn query_free_busy(
    access_token: &str,
    window: &TimeSpan,
) -> Result<Vec<TimeSpan>, GoogleApiError> {
    let client = reqwest::Client::new();

    let request = client
        .post("https://www.googleapis.com/calendar/v3/freeBusy")
        .bearer_auth(access_token)
        .json(&serde_json::json!({
            "timeMin": window.start.to_rfc3339(),
            "timeMax": window.end.to_rfc3339(),
            "items": [{ "id": "primary" }],
        }));

    let resp = send_with_retry(request, &RetryPolicy::default()).await?;

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }

    let body: FreeBusyResponse = resp.json().await?;
    let mut busy = Vec::new();

    for calendar in body.calendars.values() {
        for span in &calendar.busy {
            match (
                parse_event_datetime(&span.start),
                parse_event_datetime(&span.end),
            ) {
                (Some(start), Some(end)) if start < end => {
                    busy.push(TimeSpan::new(start, end));
                }
                _ => {
                    log::warn!(
                        "Skipping malformed busy span {} .. {}",
                        span.start,
                        span.end
                    );
                }
            }
        }
    }

    Ok(busy)
}

/// Normalize a raw provider item into a CalendarEvent.
///
/// Returns None (with a warning) for items missing an id or parseable
/// start/end — malformed events are filtered at this boundary.
fn normalize_event(item: RawEvent) -> Option<CalendarEvent> {
    if item.id.is_empty() {
        log::warn!("Skipping calendar item with no id");
        return None;
    }

    let all_day = item
        .start
        .as_ref()
        .map(|s| s.date_time.is_none() && s.date.is_some())
        .unwrap_or(false);

    let start_str = item
        .start
        .as_ref()
        .and_then(|s| s.date_time.as_deref().or(s.date.as_deref()))
        .unwrap_or("");
    let end_str = item
        .end
        .as_ref()
        .and_then(|s| s.date_time.as_deref().or(s.date.as_deref()))
        .unwrap_or("");

    let (start, end) = match (parse_event_datetime(start_str), parse_event_datetime(end_str)) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            log::warn!("Skipping event {} with unparseable times", item.id);
            return None;
        }
    };

    let attendees: Vec<Attendee> = item
        .attendees
        .iter()
        .filter(|a| a.resource != Some(true) && !a.email.is_empty())
        .map(|a| Attendee {
            email: a.email.to_lowercase(),
            is_self: a.is_self == Some(true),
            response: parse_response_status(a.response_status.as_deref()),
        })
        .collect();

    let conference = item
        .conference_data
        .map(|c| {
            c.entry_points
                .into_iter()
                .filter_map(|ep| {
                    let uri = ep.uri?;
                    Some(ConferenceEntryPoint {
                        kind: ep.entry_point_type.unwrap_or_else(|| "video".to_string()),
                        uri,
                        label: ep.label,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(CalendarEvent {
        id: item.id,
        title: item.summary.unwrap_or_else(|| "(No title)".to_string()),
        start,
        end,
        attendees,
        location: item.location.filter(|l| !l.is_empty()),
        description: item.description.filter(|d| !d.is_empty()),
        conference,
        all_day,
    })
}

fn parse_response_status(s: Option<&str>) -> ResponseStatus {
    match s {
        Some("accepted") => ResponseStatus::Accepted,
        Some("tentative") => ResponseStatus::Tentative,
        Some("declined") => ResponseStatus::Declined,
        _ => ResponseStatus::NeedsAction,
    }
}

/// Parse an ISO datetime string to a chrono DateTime<Utc>.
pub fn parse_event_datetime(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if s.contains('T') {
        DateTime::parse_from_rfc3339(&s.replace('Z', "+00:00"))
            .or_else(|_| DateTime::parse_from_rfc3339(s))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    } else {
        // Date-only (all-day event) — treat as midnight UTC
        chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
    }
}
