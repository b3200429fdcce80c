use chrono::{DateTime, Utc};

use crate::error::ApiError;

pub fn validate_lesson_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ApiError> {
    if end > start {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "end time must be after start time".into(),
        ))
    }
}
