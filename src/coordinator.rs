use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::client::{ClassDetail, ClientError, FitblocksClient};
use crate::models::{ClassEvent, Snapshot};

/// Forward window fetched each cycle.
pub const SCHEDULE_WINDOW_DAYS: i64 = 7;

const MAX_CONCURRENT_DETAIL_REQUESTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorStatus {
    /// No cycle has completed yet.
    Starting,
    Ok,
    /// The stored credentials were rejected; the user has to fix them.
    /// Retried every tick, since they may be corrected externally.
    AuthRequired,
    /// The remote service could not be reached or answered garbage; the
    /// previous snapshot stays in place until the next tick.
    Unreachable,
}

#[derive(Debug, Clone, Copy)]
pub struct StatusInfo {
    pub status: CoordinatorStatus,
    pub last_attempt: Option<DateTime<Utc>>,
}

struct Shared {
    snapshot: watch::Sender<Arc<Snapshot>>,
    status: watch::Sender<StatusInfo>,
    refresh: Notify,
    in_flight: AtomicBool,
}

/// Read/notify side of the coordinator, cheap to clone into handlers.
#[derive(Clone)]
pub struct CoordinatorHandle {
    shared: Arc<Shared>,
}

impl CoordinatorHandle {
    /// The latest published snapshot. Replaced atomically per cycle;
    /// callers never observe a partially merged one.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.shared.snapshot.subscribe()
    }

    pub fn status(&self) -> StatusInfo {
        *self.shared.status.borrow()
    }

    /// Ask for an out-of-cycle refresh. A request arriving while a cycle is
    /// already running is merged into that cycle instead of queueing.
    pub fn request_refresh(&self) {
        if self.shared.in_flight.load(Ordering::SeqCst) {
            debug!("refresh already in flight; merging request");
            return;
        }
        self.shared.refresh.notify_one();
    }
}

/// Polling coordinator: fetches the schedule window, enriches enrolled
/// lessons, and publishes immutable snapshots.
///
/// The run loop is the only producer, so at most one fetch cycle is ever in
/// flight; timer ticks and manual refresh requests share that single flight.
pub struct Coordinator {
    client: Arc<FitblocksClient>,
    interval: Duration,
    shared: Arc<Shared>,
}

impl Coordinator {
    pub fn new(client: Arc<FitblocksClient>, interval: Duration) -> (Self, CoordinatorHandle) {
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::empty(Utc::now())));
        let (status, _) = watch::channel(StatusInfo {
            status: CoordinatorStatus::Starting,
            last_attempt: None,
        });
        let shared = Arc::new(Shared {
            snapshot,
            status,
            refresh: Notify::new(),
            in_flight: AtomicBool::new(false),
        });
        let handle = CoordinatorHandle {
            shared: Arc::clone(&shared),
        };
        (
            Self {
                client,
                interval,
                shared,
            },
            handle,
        )
    }

    /// Drive the polling loop forever. The timer re-arms regardless of the
    /// cycle outcome.
    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shared.refresh.notified() => {
                    debug!("manual refresh requested");
                }
            }
            self.refresh_once().await;
        }
    }

    /// Execute one fetch cycle and publish the outcome. Used by the run
    /// loop, and directly for the first refresh at startup.
    pub async fn refresh_once(&self) {
        self.shared.in_flight.store(true, Ordering::SeqCst);
        let outcome = self.run_cycle().await;
        self.shared.in_flight.store(false, Ordering::SeqCst);

        let status = match outcome {
            Ok(()) => CoordinatorStatus::Ok,
            Err(ClientError::InvalidCredentials) => {
                warn!("credentials rejected; reauthentication required");
                CoordinatorStatus::AuthRequired
            }
            Err(err) => {
                warn!(error = %err, "schedule refresh failed; keeping previous snapshot");
                CoordinatorStatus::Unreachable
            }
        };
        self.shared.status.send_replace(StatusInfo {
            status,
            last_attempt: Some(Utc::now()),
        });
    }

    async fn run_cycle(&self) -> Result<(), ClientError> {
        let window_start = Utc::now();
        let window_end = window_start + ChronoDuration::days(SCHEDULE_WINDOW_DAYS);
        debug!(%window_start, %window_end, "starting fetch cycle");

        let raw = match self.client.list_schedule(window_start, window_end).await {
            Ok(events) => events,
            Err(ClientError::AuthExpired) => {
                info!("session expired; re-authenticating");
                self.client.login().await?;
                self.client.list_schedule(window_start, window_end).await?
            }
            Err(err) => return Err(err),
        };

        let timezone = self.client.timezone();
        let mut events: Vec<ClassEvent> = raw
            .iter()
            .filter_map(|item| ClassEvent::from_raw(item, timezone, window_start))
            .collect();

        let credits = self.enrich_subscribed(&mut events).await;

        // Stable sort: remote list order is the tie-break for equal starts.
        events.sort_by_key(|event| event.start);

        let last_known_credits =
            credits.or_else(|| self.shared.snapshot.borrow().last_known_credits);
        self.shared.snapshot.send_replace(Arc::new(Snapshot {
            events,
            fetched_at: window_start,
            last_known_credits,
        }));
        Ok(())
    }

    /// Fan out detail calls for enrolled lessons with bounded concurrency.
    /// A failed call only loses that one lesson's enrichment fields.
    /// Returns the highest credits value observed this cycle.
    async fn enrich_subscribed(&self, events: &mut [ClassEvent]) -> Option<i64> {
        type DetailCall = (usize, Uuid, String, DateTime<Utc>, DateTime<Utc>);
        let calls: Vec<DetailCall> = events
            .iter()
            .enumerate()
            .filter(|(_, event)| event.subscribed)
            .map(|(index, event)| {
                (
                    index,
                    event.class_type_id,
                    event.event_id.clone(),
                    event.start,
                    event.end,
                )
            })
            .collect();
        if calls.is_empty() {
            return None;
        }
        debug!(count = calls.len(), "fetching details for enrolled lessons");

        let results: Vec<(usize, Result<ClassDetail, ClientError>)> = stream::iter(calls)
            .map(|(index, class_type_id, event_id, start, end)| {
                let client = Arc::clone(&self.client);
                async move {
                    let result = client
                        .class_detail(class_type_id, &event_id, start, end)
                        .await;
                    (index, result)
                }
            })
            .buffer_unordered(MAX_CONCURRENT_DETAIL_REQUESTS)
            .collect()
            .await;

        let mut credits: Option<i64> = None;
        for (index, result) in results {
            match result {
                Ok(detail) => {
                    if let Some(value) = detail.credits_remaining {
                        credits = Some(credits.map_or(value, |current| current.max(value)));
                    }
                    events[index].apply_detail(&detail);
                }
                Err(err) => {
                    warn!(
                        event_id = %events[index].event_id,
                        error = %err,
                        "class detail fetch failed; keeping base fields"
                    );
                }
            }
        }
        credits
    }
}
