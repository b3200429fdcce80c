//! Enrollment actions: thin pass-through to the client, plus a refresh nudge
//! so views reflect the change before the next timer tick.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::client::{ClientError, FitblocksClient};
use crate::coordinator::CoordinatorHandle;

/// Enroll in a lesson. Errors propagate unchanged and trigger no refresh.
pub async fn enroll(
    client: &FitblocksClient,
    coordinator: &CoordinatorHandle,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    class_type_id: Uuid,
) -> Result<String, ClientError> {
    let status = client.enroll(start, end, class_type_id).await?;
    info!(%class_type_id, status = %status, "enrolled");
    coordinator.request_refresh();
    Ok(status)
}

/// Cancel a registration. Errors propagate unchanged and trigger no refresh.
pub async fn unenroll(
    client: &FitblocksClient,
    coordinator: &CoordinatorHandle,
    schedule_registration_id: Uuid,
    class_type_id: Uuid,
) -> Result<(), ClientError> {
    client
        .unenroll(schedule_registration_id, class_type_id)
        .await?;
    info!(%schedule_registration_id, "unenrolled");
    coordinator.request_refresh();
    Ok(())
}
