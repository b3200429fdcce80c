//! Pure derivations over a [`Snapshot`]: sensor values and lesson slots.
//! No I/O happens here.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{ClassEvent, Snapshot};

/// Number of next-lesson slots exposed.
pub const MAX_LESSON_SLOTS: usize = 4;

/// Fixed attribute record for one next-lesson slot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LessonView {
    pub index: usize,
    #[schema(value_type = String, format = "date-time")]
    pub start: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub end: DateTime<Utc>,
    pub workout: String,
    pub description: Option<String>,
    pub occupancy: Option<String>,
    pub participants_count: Option<u32>,
    pub credits_remaining: Option<i64>,
    pub class_type_id: Uuid,
    pub event_id: String,
    pub schedule_registration_id: Option<Uuid>,
}

pub fn subscribed_events(snapshot: &Snapshot) -> impl Iterator<Item = &ClassEvent> {
    snapshot.events.iter().filter(|event| event.subscribed)
}

/// Number of lessons the user is enrolled in.
pub fn enrolled_count(snapshot: &Snapshot) -> usize {
    subscribed_events(snapshot).count()
}

/// Highest credits value across enrolled lessons, falling back to the
/// snapshot's carried value. Never invents a default.
pub fn remaining_credits(snapshot: &Snapshot) -> Option<i64> {
    subscribed_events(snapshot)
        .filter_map(|event| event.credits_remaining)
        .max()
        .or(snapshot.last_known_credits)
}

/// The `index`-th (1-based) enrolled lesson by ascending start time, or
/// `None` when the slot is out of range or fewer lessons are booked.
pub fn lesson(snapshot: &Snapshot, index: usize) -> Option<LessonView> {
    if index == 0 || index > MAX_LESSON_SLOTS {
        return None;
    }
    // Snapshot events are already sorted by start time.
    let event = subscribed_events(snapshot).nth(index - 1)?;
    Some(LessonView {
        index,
        start: event.start,
        end: event.end,
        workout: event.workout.clone(),
        description: event.description.clone(),
        occupancy: event.occupancy.map(|occupancy| occupancy.render()),
        participants_count: event.participants,
        credits_remaining: event.credits_remaining,
        class_type_id: event.class_type_id,
        event_id: event.event_id.clone(),
        schedule_registration_id: event.schedule_registration_id,
    })
}
