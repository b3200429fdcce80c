use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::client::{ClassDetail, RawScheduleEvent, parse_remote_datetime};

/// Occupancy counters for a lesson, taken from the class detail endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Occupancy {
    pub booked: u32,
    pub capacity: u32,
    pub waiting_list: u32,
}

impl Occupancy {
    /// Human-readable form, e.g. `12/14 (+2 waiting list)`.
    pub fn render(&self) -> String {
        if self.waiting_list > 0 {
            format!(
                "{}/{} (+{} waiting list)",
                self.booked, self.capacity, self.waiting_list
            )
        } else {
            format!("{}/{}", self.booked, self.capacity)
        }
    }
}

/// One lesson in the schedule window.
///
/// The enrichment fields (`occupancy`, `participants`,
/// `schedule_registration_id`, `credits_remaining`) are only ever filled for
/// lessons the user is enrolled in, and stay `None` when the detail call for
/// that lesson fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClassEvent {
    pub event_id: String,
    pub class_type_id: Uuid,
    #[schema(value_type = String, format = "date-time")]
    pub start: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub end: DateTime<Utc>,
    pub workout: String,
    pub description: Option<String>,
    pub subscribed: bool,
    pub occupancy: Option<Occupancy>,
    pub participants: Option<u32>,
    pub schedule_registration_id: Option<Uuid>,
    pub credits_remaining: Option<i64>,
}

impl ClassEvent {
    /// Normalize a raw schedule entry. Returns `None` for entries that are
    /// unusable (missing ids or timestamps, inverted time range) or that
    /// start before the window.
    pub fn from_raw(
        raw: &RawScheduleEvent,
        timezone: Tz,
        window_start: DateTime<Utc>,
    ) -> Option<Self> {
        let event_id = raw
            .event_id
            .clone()
            .or_else(|| raw.id.clone())
            .filter(|id| !id.is_empty())?;
        let class_type_id = raw.class_type_id?;
        let start = parse_remote_datetime(raw.start.as_deref()?, timezone)?;
        let end = parse_remote_datetime(raw.end.as_deref()?, timezone)?;
        if start >= end || start < window_start {
            return None;
        }

        let workout = [&raw.title, &raw.name, &raw.description]
            .into_iter()
            .find_map(|field| field.clone().filter(|value| !value.is_empty()))
            .unwrap_or_else(|| "Lesson".to_string());

        Some(Self {
            event_id,
            class_type_id,
            start,
            end,
            workout,
            description: raw.description.clone().filter(|value| !value.is_empty()),
            subscribed: raw.subscribed,
            occupancy: None,
            participants: None,
            schedule_registration_id: None,
            credits_remaining: None,
        })
    }

    /// Merge the enrichment fields from a class detail response.
    pub fn apply_detail(&mut self, detail: &ClassDetail) {
        if let Some(description) = detail.description.clone().filter(|value| !value.is_empty()) {
            self.description = Some(description);
        }
        if let (Some(booked), Some(capacity)) = (
            detail.total_registrations,
            detail.total_possible_registrations,
        ) {
            self.occupancy = Some(Occupancy {
                booked,
                capacity,
                waiting_list: detail.total_users_on_waiting_list.unwrap_or(0),
            });
        }
        let participants = detail
            .signed_up_users
            .iter()
            .filter(|user| user.full_name().is_some())
            .count();
        if participants > 0 {
            self.participants = Some(participants as u32);
        }
        if detail.schedule_registration_id.is_some() {
            self.schedule_registration_id = detail.schedule_registration_id;
        }
        if detail.credits_remaining.is_some() {
            self.credits_remaining = detail.credits_remaining;
        }
    }
}

/// Immutable merged view of one poll cycle.
///
/// Events are sorted ascending by start time; ties keep the order the remote
/// schedule returned them in. Replaced wholesale on every successful cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub events: Vec<ClassEvent>,
    pub fetched_at: DateTime<Utc>,
    /// Carried forward from the previous snapshot when a cycle observes no
    /// credits value of its own.
    pub last_known_credits: Option<i64>,
}

impl Snapshot {
    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            events: Vec::new(),
            fetched_at,
            last_known_credits: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Tz;

    use super::*;

    fn raw_event(start: &str, end: &str) -> RawScheduleEvent {
        RawScheduleEvent {
            id: Some("17".to_string()),
            event_id: None,
            class_type_id: Some(Uuid::nil()),
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            title: Some("WOD".to_string()),
            name: None,
            description: None,
            subscribed: false,
        }
    }

    fn window_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_from_raw_basic() {
        let raw = raw_event("2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z");
        let event = ClassEvent::from_raw(&raw, Tz::UTC, window_start()).unwrap();
        assert_eq!(event.event_id, "17");
        assert_eq!(event.workout, "WOD");
        assert!(!event.subscribed);
        assert!(event.start < event.end);
        assert!(event.credits_remaining.is_none());
    }

    #[test]
    fn test_from_raw_drops_inverted_range() {
        let raw = raw_event("2026-03-02T11:00:00Z", "2026-03-02T10:00:00Z");
        assert!(ClassEvent::from_raw(&raw, Tz::UTC, window_start()).is_none());
    }

    #[test]
    fn test_from_raw_drops_past_events() {
        let raw = raw_event("2026-02-27T10:00:00Z", "2026-02-27T11:00:00Z");
        assert!(ClassEvent::from_raw(&raw, Tz::UTC, window_start()).is_none());
    }

    #[test]
    fn test_from_raw_missing_class_type() {
        let mut raw = raw_event("2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z");
        raw.class_type_id = None;
        assert!(ClassEvent::from_raw(&raw, Tz::UTC, window_start()).is_none());
    }

    #[test]
    fn test_apply_detail() {
        let raw = raw_event("2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z");
        let mut event = ClassEvent::from_raw(&raw, Tz::UTC, window_start()).unwrap();

        let registration = Uuid::new_v4();
        let detail = ClassDetail {
            description: Some("Strength & conditioning".to_string()),
            credits_remaining: Some(9),
            total_possible_registrations: Some(14),
            total_registrations: Some(12),
            total_users_on_waiting_list: Some(2),
            schedule_registration_id: Some(registration),
            ..ClassDetail::default()
        };
        event.apply_detail(&detail);

        assert_eq!(event.description.as_deref(), Some("Strength & conditioning"));
        assert_eq!(event.credits_remaining, Some(9));
        assert_eq!(event.schedule_registration_id, Some(registration));
        let occupancy = event.occupancy.unwrap();
        assert_eq!(occupancy.render(), "12/14 (+2 waiting list)");
    }

    #[test]
    fn test_apply_empty_detail_keeps_base_fields() {
        let raw = raw_event("2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z");
        let mut event = ClassEvent::from_raw(&raw, Tz::UTC, window_start()).unwrap();
        event.apply_detail(&ClassDetail::default());
        assert_eq!(event.workout, "WOD");
        assert!(event.occupancy.is_none());
        assert!(event.schedule_registration_id.is_none());
    }

    #[test]
    fn test_occupancy_render_without_waiting_list() {
        let occupancy = Occupancy {
            booked: 5,
            capacity: 10,
            waiting_list: 0,
        };
        assert_eq!(occupancy.render(), "5/10");
    }
}
