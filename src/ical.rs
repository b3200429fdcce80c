use icalendar::{Calendar, Component, Event, EventLike};

use crate::models::Snapshot;
use crate::views::subscribed_events;

/// Renders the enrolled lessons of a snapshot as an iCal document.
/// Non-enrolled classes are never exported.
#[derive(Clone)]
pub struct CalendarExporter {
    calendar_name: String,
}

impl CalendarExporter {
    pub fn new(calendar_name: impl Into<String>) -> Self {
        Self {
            calendar_name: calendar_name.into(),
        }
    }

    pub fn generate(&self, snapshot: &Snapshot) -> Vec<u8> {
        let lessons: Vec<_> = subscribed_events(snapshot).collect();
        if lessons.is_empty() {
            return Vec::new();
        }

        let mut calendar = Calendar::new();
        calendar.name(&self.calendar_name);

        for item in lessons {
            let mut event = Event::new();
            event.summary(&item.workout);
            event.starts(item.start);
            event.ends(item.end);
            event.location(&self.calendar_name);
            if let Some(description) = &item.description {
                event.description(description);
            }
            event.uid(&format!(
                "{}-{}-fitblocks-connect",
                item.start.format("%Y%m%dT%H%M%SZ"),
                item.event_id
            ));
            calendar.push(event);
        }

        calendar.to_string().into_bytes()
    }
}
