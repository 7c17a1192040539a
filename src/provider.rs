//! Calendar provider seam.
//!
//! The sync layer and gap finder speak to this trait, not to Google
//! directly, so both run against a stub in tests and a different provider
//! can slot in without touching the engine.

use async_trait::async_trait;

use crate::google_api::{self, GoogleApiError};
use crate::types::{CalendarEvent, TimeSpan};

/// Errors surfaced by a calendar provider
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider authorization expired")]
    AuthExpired,
    #[error("provider API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl From<GoogleApiError> for ProviderError {
    fn from(err: GoogleApiError) -> Self {
        match err {
            GoogleApiError::AuthExpired => ProviderError::AuthExpired,
            GoogleApiError::ApiError { status, message } => {
                ProviderError::Api { status, message }
            }
            other => ProviderError::Transport(other.to_string()),
        }
    }
}

/// Read-only calendar access: time-bounded events and the busy aggregate.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Events in the window, recurring instances expanded, ordered by start.
    async fn upcoming_events(&self, window: &TimeSpan)
        -> Result<Vec<CalendarEvent>, ProviderError>;

    /// Busy intervals in the window. Unsorted, possibly overlapping.
    async fn busy_intervals(&self, window: &TimeSpan) -> Result<Vec<TimeSpan>, ProviderError>;
}

/// The production provider: Google Calendar v3 with token refresh.
pub struct GoogleCalendarProvider;

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    async fn upcoming_events(
        &self,
        window: &TimeSpan,
    ) -> Result<Vec<CalendarEvent>, ProviderError> {
        let access_token = google_api::get_valid_access_token().await?;
        Ok(google_api::calendar::fetch_events(&access_token, window.start, window.end).await?)
    }

    async fn busy_intervals(&self, window: &TimeSpan) -> Result<Vec<TimeSpan>, ProviderError> {
        let access_token = google_api::get_valid_access_token().await?;
        Ok(google_api::calendar::query_free_busy(&access_token, window).await?)
    }
}
