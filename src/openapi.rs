use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers::{EnrollRequest, EnrollResponse, SensorsView, UnenrollRequest};
use crate::models::{ClassEvent, Occupancy};
use crate::views::LessonView;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "query_token",
            SecurityScheme::ApiKey(ApiKey::Query(ApiKeyValue::new("token"))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz_live,
        crate::handlers::healthz_ready,
        crate::handlers::get_schedule,
        crate::handlers::get_calendar,
        crate::handlers::get_sensors,
        crate::handlers::get_lesson,
        crate::handlers::post_enroll,
        crate::handlers::post_unenroll
    ),
    components(schemas(
        ClassEvent,
        Occupancy,
        LessonView,
        SensorsView,
        EnrollRequest,
        EnrollResponse,
        UnenrollRequest
    )),
    tags(
        (name = "fitblocks", description = "FitBlocks schedule, sensors and enrollment operations")
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;
