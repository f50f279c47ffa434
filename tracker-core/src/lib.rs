//! Core types for tracker2gcal.
//!
//! This crate provides the pieces the CLI composes into a sync run:
//! - `date` for the tracker's datetime and calendar-day text formats
//! - `story` for the tracker story model and its XML wire format
//! - `release_sync` for reconciling release stories with calendar events
//! - `remote` for the collaborator interfaces the reconciliation talks to

pub mod date;
pub mod error;
pub mod release_sync;
pub mod remote;
pub mod story;

pub use error::{TrackerError, TrackerResult};
pub use release_sync::{ReleaseSync, ReleaseSyncPlan, SyncReport};
pub use remote::{BatchItemStatus, CalendarEvent, CalendarRemote, NewEvent, ReleaseSource};
pub use story::{Iteration, Story};
