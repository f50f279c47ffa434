//! Collaborator interfaces used by the release sync.
//!
//! The tracker and calendar transports live in the CLI crate; the
//! reconciliation only sees these traits and wire-neutral types.

use serde::{Deserialize, Serialize};

use crate::error::TrackerResult;

/// An event already on the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Opaque handle the calendar uses to delete this event
    pub handle: String,
    pub title: String,
}

/// An all-day event to create on the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    /// First day of the event, `YYYY-MM-DD`
    pub start_day: String,
    /// Day after the last day of the event, `YYYY-MM-DD`
    pub end_day: String,
    pub body: String,
}

/// Outcome of one item in a batch request, as reported by the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemStatus {
    pub id: String,
    pub code: u16,
    pub reason: String,
}

impl BatchItemStatus {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Somewhere release stories come from.
#[allow(async_fn_in_trait)]
pub trait ReleaseSource {
    /// One XML fragment per story of type release.
    async fn release_stories(&self) -> TrackerResult<Vec<String>>;
}

/// The calendar that release events are written to.
#[allow(async_fn_in_trait)]
pub trait CalendarRemote {
    async fn list_events(&self) -> TrackerResult<Vec<CalendarEvent>>;

    async fn delete_event(&self, event: &CalendarEvent) -> TrackerResult<()>;

    /// Submit all inserts as a single batch. Returns one status per item.
    async fn insert_batch(&self, events: &[NewEvent]) -> TrackerResult<Vec<BatchItemStatus>>;
}
