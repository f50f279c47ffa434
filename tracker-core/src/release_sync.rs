//! Reconciles tracker release stories with calendar events.
//!
//! Every run replaces the calendar's release events wholesale: each event
//! whose title carries the release marker is deleted, then one fresh event is
//! created per release story. Events are never patched in place.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::date::{SECONDS_PER_DAY, add_one_day, day_to_seconds, timestamp_to_day};
use crate::error::{TrackerError, TrackerResult};
use crate::remote::{CalendarEvent, CalendarRemote, NewEvent, ReleaseSource};
use crate::story::Story;

/// Titles containing this were created by a previous sync.
pub const RELEASE_MARKER: &str = "[release";

const FLOATING_SUFFIX: &str = "[release, floating]";
const HARD_SUFFIX: &str = "[release, hard]";
const ATTRIBUTION: &str = "[This event was automatically created based on data from Tracker]";

/// Something that could not be synced, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub reason: String,
}

/// What a sync run will do to the calendar.
#[derive(Debug, Default, Serialize)]
pub struct ReleaseSyncPlan {
    pub to_delete: Vec<CalendarEvent>,
    pub to_insert: Vec<NewEvent>,
    /// Stories that could not be turned into events
    pub failures: Vec<ItemFailure>,
}

impl ReleaseSyncPlan {
    /// Deletions for `events` that carry the release marker.
    pub fn deletions(events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
        events.into_iter().filter(is_release_event).collect()
    }

    /// Project each story fragment onto a new event, collecting failures per story.
    pub fn projections(fragments: &[String]) -> (Vec<NewEvent>, Vec<ItemFailure>) {
        let mut to_insert = Vec::new();
        let mut failures = Vec::new();

        for (index, fragment) in fragments.iter().enumerate() {
            let story = match Story::from_xml(fragment) {
                Ok(story) => story,
                Err(e) => {
                    failures.push(ItemFailure {
                        item: format!("story #{}", index + 1),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match project_release(&story) {
                Ok(event) => {
                    info!(
                        "{}: {} / {}",
                        story.url().unwrap_or_default(),
                        event.title,
                        event.start_day
                    );
                    to_insert.push(event);
                }
                Err(e) => failures.push(ItemFailure {
                    item: story_label(&story, index),
                    reason: e.to_string(),
                }),
            }
        }

        (to_insert, failures)
    }

    pub fn compute(events: Vec<CalendarEvent>, fragments: &[String]) -> Self {
        let to_delete = Self::deletions(events);
        let (to_insert, failures) = Self::projections(fragments);

        ReleaseSyncPlan {
            to_delete,
            to_insert,
            failures,
        }
    }
}

/// Outcome of a committed sync run.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub deleted: usize,
    pub inserted: usize,
    pub delete_failures: Vec<ItemFailure>,
    pub insert_failures: Vec<ItemFailure>,
    pub story_failures: Vec<ItemFailure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.delete_failures.is_empty()
            && self.insert_failures.is_empty()
            && self.story_failures.is_empty()
    }
}

/// Syncs release stories from `source` into `calendar`.
pub struct ReleaseSync<S, C> {
    source: S,
    calendar: C,
}

impl<S: ReleaseSource, C: CalendarRemote> ReleaseSync<S, C> {
    pub fn new(source: S, calendar: C) -> Self {
        ReleaseSync { source, calendar }
    }

    /// Compute the plan without touching the calendar.
    pub async fn plan(&self) -> TrackerResult<ReleaseSyncPlan> {
        let events = self.calendar.list_events().await?;
        let fragments = self.source.release_stories().await?;
        info!("found {} releases", fragments.len());

        Ok(ReleaseSyncPlan::compute(events, &fragments))
    }

    /// Delete the old release events, then batch-insert fresh ones.
    ///
    /// Failed deletions and failed batch items are logged and reported; the
    /// run carries on with the remaining items.
    pub async fn run(&self) -> TrackerResult<SyncReport> {
        let mut report = SyncReport::default();

        let events = self.calendar.list_events().await?;
        for event in ReleaseSyncPlan::deletions(events) {
            info!("deleting {}", event.title);
            match self.calendar.delete_event(&event).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    error!("failed to delete {}: {}", event.title, e);
                    report.delete_failures.push(ItemFailure {
                        item: event.title,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let fragments = self.source.release_stories().await?;
        info!("found {} releases", fragments.len());

        let (to_insert, story_failures) = ReleaseSyncPlan::projections(&fragments);
        for failure in &story_failures {
            error!("cannot sync {}: {}", failure.item, failure.reason);
        }
        report.story_failures = story_failures;

        if to_insert.is_empty() {
            warn!("no release events to insert");
            return Ok(report);
        }

        let statuses = match self.calendar.insert_batch(&to_insert).await {
            Ok(statuses) => statuses,
            Err(e) => {
                error!("batch insert of {} events failed: {}", to_insert.len(), e);
                report.insert_failures.push(ItemFailure {
                    item: "batch insert".to_string(),
                    reason: e.to_string(),
                });
                return Ok(report);
            }
        };

        if statuses.len() < to_insert.len() {
            error!(
                "batch insert returned {} statuses for {} events",
                statuses.len(),
                to_insert.len()
            );
            report.insert_failures.push(ItemFailure {
                item: "batch insert".to_string(),
                reason: format!(
                    "expected {} statuses, got {}",
                    to_insert.len(),
                    statuses.len()
                ),
            });
        }

        for status in statuses {
            info!(
                "id {} / status {} / reason {}",
                status.id, status.code, status.reason
            );
            if status.is_success() {
                report.inserted += 1;
            } else {
                report.insert_failures.push(ItemFailure {
                    reason: TrackerError::RemoteOperation {
                        item: status.id.clone(),
                        status: status.code,
                        reason: status.reason,
                    }
                    .to_string(),
                    item: status.id,
                });
            }
        }

        Ok(report)
    }
}

pub fn is_release_event(event: &CalendarEvent) -> bool {
    event.title.contains(RELEASE_MARKER)
}

/// Map a release story onto the all-day calendar event that represents it.
///
/// Stories with a deadline land on the deadline day, prefixed with
/// "SLIPPING" when the iteration finishes after it. Stories without one
/// float on their iteration's finish day.
pub fn project_release(story: &Story) -> TrackerResult<NewEvent> {
    let url = story.url().unwrap_or_default();
    let name = story.name().unwrap_or_default();

    let release_day = story
        .iteration_finish()
        .map(timestamp_to_day)
        .transpose()?;

    let (title, event_day) = match (story.deadline(), release_day) {
        (Some(deadline), release_day) => {
            let scheduled_day = timestamp_to_day(deadline)?;
            let mut title = name.to_string();

            if let Some(release_day) = release_day {
                let delta = day_to_seconds(&release_day)? - day_to_seconds(&scheduled_day)?;
                if delta > 0 {
                    title = format!(
                        "SLIPPING {:.1} days: {}",
                        delta as f64 / SECONDS_PER_DAY as f64,
                        title
                    );
                }
            }

            (format!("{} {}", title, HARD_SUFFIX), scheduled_day)
        }
        (None, Some(release_day)) => (format!("{} {}", name, FLOATING_SUFFIX), release_day),
        (None, None) => {
            return Err(TrackerError::Scheduling(story_label(story, 0)));
        }
    };

    let end_day = add_one_day(&event_day)?;

    Ok(NewEvent {
        title,
        start_day: event_day,
        end_day,
        body: format!("{}\n\n\n\n{}", url, ATTRIBUTION),
    })
}

fn story_label(story: &Story, index: usize) -> String {
    story
        .url()
        .or(story.name())
        .map(String::from)
        .unwrap_or_else(|| format!("story #{}", index + 1))
}
