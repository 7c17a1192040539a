use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration stored in ~/.vigil/config.json
///
/// All sections have serde defaults so a partial config parses; a bare
/// `{}` yields a runnable (if reportless) engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// IANA timezone used for the O3 afternoon window and week boundaries.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Direct reports tracked for one-on-one accountability.
    #[serde(default)]
    pub reports: Vec<ReportConfig>,
    #[serde(default)]
    pub popup: PopupConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub o3: O3Config,
    #[serde(default)]
    pub schedules: Schedules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            reports: Vec::new(),
            popup: PopupConfig::default(),
            notifier: NotifierConfig::default(),
            o3: O3Config::default(),
            schedules: Schedules::default(),
        }
    }
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

/// A direct report tracked for O3 meetings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
    pub name: String,
    /// Matched case-insensitively against the non-self attendee.
    pub email: String,
}

/// Popup UI process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupConfig {
    /// Command spawned per meeting group; spoken to over stdin/stdout.
    #[serde(default = "default_popup_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            command: default_popup_command(),
            args: Vec::new(),
        }
    }
}

fn default_popup_command() -> String {
    "vigil-popup".to_string()
}

/// Notification sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierConfig {
    /// Command invoked as `<command> [args..] <title> <body>`.
    #[serde(default = "default_notifier_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            command: default_notifier_command(),
            args: Vec::new(),
        }
    }
}

fn default_notifier_command() -> String {
    "notify-send".to_string()
}

/// O3 reminder tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct O3Config {
    /// Local hour the afternoon-before prep window opens.
    #[serde(default = "default_afternoon_start_hour")]
    pub afternoon_start_hour: u32,
    /// Local hour the afternoon-before prep window closes.
    #[serde(default = "default_afternoon_end_hour")]
    pub afternoon_end_hour: u32,
    /// Minimum free-gap length required to interrupt the user.
    #[serde(default = "default_min_gap_minutes")]
    pub min_gap_minutes: i64,
}

impl Default for O3Config {
    fn default() -> Self {
        Self {
            afternoon_start_hour: default_afternoon_start_hour(),
            afternoon_end_hour: default_afternoon_end_hour(),
            min_gap_minutes: default_min_gap_minutes(),
        }
    }
}

fn default_afternoon_start_hour() -> u32 {
    14
}

fn default_afternoon_end_hour() -> u32 {
    17
}

fn default_min_gap_minutes() -> i64 {
    15
}

/// Schedule configuration for recurring reports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedules {
    #[serde(default = "ScheduleEntry::default_weekly_summary")]
    pub weekly_summary: ScheduleEntry,
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            weekly_summary: ScheduleEntry::default_weekly_summary(),
        }
    }
}

/// A single schedule entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub enabled: bool,
    pub cron: String,
    pub timezone: String,
}

impl ScheduleEntry {
    /// Default schedule for the weekly summary: Friday 4 PM
    pub fn default_weekly_summary() -> Self {
        Self {
            enabled: true,
            cron: "0 16 * * FRI".to_string(), // Friday 4 PM
            timezone: "America/New_York".to_string(),
        }
    }
}

impl Default for ScheduleEntry {
    fn default() -> Self {
        Self::default_weekly_summary()
    }
}

// =============================================================================
// Calendar event model
// =============================================================================

/// A normalized calendar event.
///
/// Immutable snapshot, replaced wholesale on every sync. Malformed provider
/// items (missing id or unparseable times) are skipped at the provider
/// boundary and never reach this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub conference: Vec<ConferenceEntryPoint>,
    /// Date-only events; excluded from alerting at sync time.
    #[serde(default)]
    pub all_day: bool,
}

impl CalendarEvent {
    /// The attendee record for the calendar owner, if present.
    pub fn self_attendee(&self) -> Option<&Attendee> {
        self.attendees.iter().find(|a| a.is_self)
    }

    /// True when the calendar owner declined this event.
    pub fn declined_by_self(&self) -> bool {
        self.self_attendee()
            .map(|a| a.response == ResponseStatus::Declined)
            .unwrap_or(false)
    }
}

/// An event attendee (resource rooms are filtered at the provider boundary)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    /// Lowercased at normalization.
    pub email: String,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub response: ResponseStatus,
}

/// RSVP status as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ResponseStatus {
    #[default]
    NeedsAction,
    Accepted,
    Tentative,
    Declined,
}

/// A way to join the meeting remotely
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceEntryPoint {
    /// Provider's entry point type ("video", "phone", ...).
    pub kind: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A half-open time span. Used for busy intervals and computed free gaps;
/// gaps are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSpan {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

// =============================================================================
// Alert thresholds
// =============================================================================

/// Alert threshold ladder, earliest to most urgent.
///
/// Declaration order matters: derived `Ord` makes `Start` the greatest, so
/// "this level and everything earlier" is a simple `<=` sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertLevel {
    TenMinutes,
    FiveMinutes,
    OneMinute,
    Start,
}

impl AlertLevel {
    /// Lead time before meeting start at which this level fires.
    pub fn lead_minutes(&self) -> i64 {
        match self {
            AlertLevel::TenMinutes => 10,
            AlertLevel::FiveMinutes => 5,
            AlertLevel::OneMinute => 1,
            AlertLevel::Start => 0,
        }
    }

    /// All levels, earliest first.
    pub fn ladder() -> [AlertLevel; 4] {
        [
            AlertLevel::TenMinutes,
            AlertLevel::FiveMinutes,
            AlertLevel::OneMinute,
            AlertLevel::Start,
        ]
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::TenMinutes => write!(f, "T-10min"),
            AlertLevel::FiveMinutes => write!(f, "T-5min"),
            AlertLevel::OneMinute => write!(f, "T-1min"),
            AlertLevel::Start => write!(f, "start"),
        }
    }
}

/// The three independently-gated O3 notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    AfternoonPrep,
    PreMeetingPrep,
    PostMeetingNudge,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::AfternoonPrep => write!(f, "afternoon_prep"),
            NotificationKind::PreMeetingPrep => write!(f, "pre_meeting_prep"),
            NotificationKind::PostMeetingNudge => write!(f, "post_meeting_nudge"),
        }
    }
}
