//! IPC message types for the popup UI process.
//!
//! Wire format is newline-delimited JSON over the child's stdin/stdout.
//! The downstream union is tagged on `type` so new message kinds are
//! additive; a popup build that predates a tag ignores it instead of
//! crashing its parser, and the controller does the same for upstream
//! lines it does not recognize.
//!
//! UI-side contract (owned by the popup, stated here for completeness):
//! a notification starts minimized for the earliest threshold, expands
//! only on an explicit `escalate`, never auto-re-expands once the user
//! collapses it, and force-closes a fixed delay after the group's earliest
//! meeting start regardless of interaction.

use serde::{Deserialize, Serialize};

use crate::grouping::MeetingGroup;
use crate::types::{AlertLevel, CalendarEvent};

/// Controller → popup messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PopupMessage {
    /// Initial payload carried by a fresh spawn.
    Show {
        alert_level: AlertLevel,
        meetings: Vec<MeetingSummary>,
    },
    /// A later threshold crossed for an already-displayed group.
    Escalate {
        alert_level: AlertLevel,
        meetings: Vec<MeetingSummary>,
    },
    /// Forward-compat: tags this build does not know.
    #[serde(other)]
    Unknown,
}

/// What the popup needs to render one meeting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSummary {
    pub id: String,
    pub title: String,
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conference_uri: Option<String>,
}

impl MeetingSummary {
    pub fn from_event(event: &CalendarEvent) -> Self {
        // Prefer a video entry point, fall back to whatever is first
        let conference_uri = event
            .conference
            .iter()
            .find(|c| c.kind == "video")
            .or_else(|| event.conference.first())
            .map(|c| c.uri.clone());

        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            start: event.start,
            end: event.end,
            location: event.location.clone(),
            conference_uri,
        }
    }

    pub fn from_group(group: &MeetingGroup) -> Vec<Self> {
        group.events.iter().map(Self::from_event).collect()
    }
}

/// Encode a message as one wire line (newline included).
pub fn encode_line(msg: &PopupMessage) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

/// Popup → controller lifecycle event, best-effort parsed.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleEvent {
    pub action: String,
}

/// Parse an upstream line. Malformed JSON or lines without an `action`
/// yield None and are dropped by the caller.
pub fn parse_lifecycle(line: &str) -> Option<LifecycleEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn summary() -> MeetingSummary {
        MeetingSummary {
            id: "e1".into(),
            title: "Standup".into(),
            start: chrono::Utc.with_ymd_and_hms(2026, 8, 10, 14, 0, 0).unwrap(),
            end: chrono::Utc.with_ymd_and_hms(2026, 8, 10, 14, 30, 0).unwrap(),
            location: None,
            conference_uri: Some("https://meet.example.com/abc".into()),
        }
    }

    #[test]
    fn test_escalate_round_trip() {
        let msg = PopupMessage::Escalate {
            alert_level: AlertLevel::FiveMinutes,
            meetings: vec![summary()],
        };
        let line = encode_line(&msg).unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"type\":\"escalate\""));
        assert!(line.contains("\"alertLevel\":\"fiveMinutes\""));

        let back: PopupMessage = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_unknown_type_is_ignored_not_fatal() {
        let back: PopupMessage =
            serde_json::from_str(r#"{"type":"dismissAll","alertLevel":"start"}"#).unwrap();
        assert_eq!(back, PopupMessage::Unknown);
    }

    #[test]
    fn test_parse_lifecycle_valid() {
        let event = parse_lifecycle(r#"{"action":"collapsed","at":"2026-08-10T14:02:00Z"}"#);
        assert_eq!(event.unwrap().action, "collapsed");
    }

    #[test]
    fn test_parse_lifecycle_malformed_dropped() {
        assert!(parse_lifecycle("not json at all").is_none());
        assert!(parse_lifecycle("").is_none());
        assert!(parse_lifecycle(r#"{"noAction":true}"#).is_none());
    }
}
