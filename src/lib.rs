pub mod actions;
pub mod auth;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod ical;
pub mod models;
pub mod openapi;
pub mod settings;
pub mod validation;
pub mod views;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use handlers::{
    get_calendar, get_lesson, get_schedule, get_sensors, healthz_live, healthz_ready, post_enroll,
    post_unenroll, root,
};
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::client::FitblocksClient;
use crate::coordinator::{Coordinator, CoordinatorHandle};
use crate::ical::CalendarExporter;
use crate::openapi::ApiDoc;
use crate::settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub client: Arc<FitblocksClient>,
    pub coordinator: CoordinatorHandle,
    pub exporter: Arc<CalendarExporter>,
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    let env_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .without_time()
        .init();

    let timezone: chrono_tz::Tz = settings
        .timezone
        .parse()
        .map_err(|_| format!("unknown timezone: {}", settings.timezone))?;
    let client = Arc::new(FitblocksClient::new(
        settings.base_url.clone(),
        settings.box_slug.clone(),
        settings.username.clone(),
        settings.password.clone(),
        timezone,
    )?);

    let (coordinator, handle) = Coordinator::new(
        Arc::clone(&client),
        Duration::from_secs(settings.poll_interval_secs),
    );

    // First refresh before serving, so consumers start with real data when
    // the remote is reachable. Failures only mark the status; the loop
    // keeps retrying.
    coordinator.refresh_once().await;

    let gym_name = client
        .fetch_branding()
        .await
        .or_else(|| settings.display_name.clone())
        .unwrap_or_else(|| format!("{} @ {}", settings.box_slug, settings.base_url));
    info!(gym = %gym_name, "connected to FitBlocks box");

    let state = AppState {
        settings: settings.clone(),
        client,
        coordinator: handle,
        exporter: Arc::new(CalendarExporter::new(gym_name)),
    };
    tokio::spawn(coordinator.run());

    let app = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    info!("Starting FitBlocks Connect on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let mut router = Router::new()
        .route("/", get(root))
        .route("/healthz/live", get(healthz_live))
        .route("/healthz/ready", get(healthz_ready))
        .route("/schedule", get(get_schedule))
        .route("/calendar.ical", get(get_calendar))
        .route("/sensors", get(get_sensors))
        .route("/lessons/{index}", get(get_lesson))
        .route("/enroll", post(post_enroll))
        .route("/unenroll", post(post_unenroll))
        .with_state(state.clone());

    if state.settings.enable_swagger {
        let openapi = ApiDoc::openapi();
        let swagger = SwaggerUi::new("/docs").url("/openapi.json", openapi);
        router = router.merge(swagger);
    }

    router.layer(trace_layer)
}
