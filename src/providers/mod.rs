//! HTTP clients for the tracker and calendar services.

pub mod gcal;
pub mod tracker;

use tracker_core::TrackerError;

fn http_error(e: reqwest::Error) -> TrackerError {
    TrackerError::Http(e.to_string())
}

fn status_error(item: &str, status: reqwest::StatusCode) -> TrackerError {
    TrackerError::RemoteOperation {
        item: item.to_string(),
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
    }
}
