use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;
use uuid::Uuid;

// Python-style title() puts "BAR'S GYM" through as "Bar'S Gym"; fix the
// possessive back to lowercase, including the "BAR 'S" spelling.
static APOS_FIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*'s\b").expect("regex compiles"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("regex compiles"));

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("session is no longer valid")]
    AuthExpired,
    #[error("error communicating with the FitBlocks server: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("rejected by the FitBlocks server: {0}")]
    Rejected(String),
    #[error("registration not found")]
    NotFound,
    #[error("unexpected response from the FitBlocks server: {0}")]
    Unexpected(String),
}

/// Schedule entry as returned by `/{box}/schedule/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawScheduleEvent {
    pub id: Option<String>,
    pub event_id: Option<String>,
    pub class_type_id: Option<Uuid>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub subscribed: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SchedulePayload {
    events: Vec<RawScheduleEvent>,
}

/// Enrollment detail as returned by `/{box}/classTypeDetails`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassDetail {
    pub description: Option<String>,
    pub credits_remaining: Option<i64>,
    pub total_possible_registrations: Option<u32>,
    pub total_registrations: Option<u32>,
    pub total_users_on_waiting_list: Option<u32>,
    pub is_full: Option<bool>,
    pub schedule_registration_id: Option<Uuid>,
    pub signed_up_users: Vec<SignedUpUser>,
}

// This endpoint uses snake_case for user records, unlike its own top level.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignedUpUser {
    pub first_name: Option<String>,
    pub surname: Option<String>,
}

impl SignedUpUser {
    pub fn full_name(&self) -> Option<String> {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.surname.as_deref().unwrap_or("").trim();
        let full = format!("{first} {last}").trim().to_string();
        if full.is_empty() { None } else { Some(full) }
    }
}

#[derive(Debug, Default)]
struct Session {
    csrf_token: Option<String>,
    logged_in: bool,
}

/// HTTP client for one FitBlocks account.
///
/// Session state (cookie jar, CSRF token) is owned by the instance, so
/// multiple configured accounts never share tokens. The session mutex also
/// guarantees at most one login attempt runs at a time.
pub struct FitblocksClient {
    http: reqwest::Client,
    base_url: Url,
    box_slug: String,
    username: String,
    password: String,
    timezone: Tz,
    session: Mutex<Session>,
}

impl FitblocksClient {
    pub fn new(
        base_url: Url,
        box_slug: String,
        username: String,
        password: String,
        timezone: Tz,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url,
            box_slug,
            username,
            password,
            timezone,
            session: Mutex::new(Session::default()),
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Build a URL like `https://fitblocks.nl/physicsperformance/<endpoint>`.
    fn build_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            self.box_slug.trim_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Perform the login flow: fetch the login page, extract the CSRF token
    /// from the meta tag, post the login form, then refresh the token from
    /// the schedule page (it serves one tied to the fresh session cookie).
    pub async fn login(&self) -> Result<(), ClientError> {
        let mut session = self.session.lock().await;
        self.login_locked(&mut session).await
    }

    async fn login_locked(&self, session: &mut Session) -> Result<(), ClientError> {
        session.logged_in = false;

        let login_url = self.build_url("login");
        debug!(url = %login_url, "fetching login page");
        let response = self.http.get(&login_url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(ClientError::Unexpected(format!(
                "login page returned status {}",
                response.status()
            )));
        }
        let html = response.text().await?;
        let csrf = extract_csrf_token(&html).ok_or_else(|| {
            ClientError::Unexpected("CSRF token not found on login page".to_string())
        })?;

        debug!("posting login form");
        let form = [
            ("_token", csrf.as_str()),
            ("email", self.username.as_str()),
            ("password", self.password.as_str()),
            ("remember", "1"),
        ];
        let response = self.http.post(&login_url).form(&form).send().await?;
        match response.status() {
            StatusCode::OK | StatusCode::FOUND => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ClientError::InvalidCredentials);
            }
            status => {
                return Err(ClientError::Unexpected(format!(
                    "login failed with status {status}"
                )));
            }
        }
        session.csrf_token = Some(csrf);

        if let Err(err) = self.refresh_csrf(session).await {
            debug!(error = %err, "could not refresh CSRF token from schedule page");
        }

        session.logged_in = true;
        debug!("login successful");
        Ok(())
    }

    async fn refresh_csrf(&self, session: &mut Session) -> Result<(), ClientError> {
        let url = self.build_url("schedule");
        let response = self.http.get(&url).send().await?;
        if response.status() != StatusCode::OK {
            debug!(status = %response.status(), "schedule page unavailable; keeping existing CSRF token");
            return Ok(());
        }
        let html = response.text().await?;
        if let Some(csrf) = extract_csrf_token(&html) {
            session.csrf_token = Some(csrf);
        }
        Ok(())
    }

    /// Log in if there is no live session, and return the CSRF token to use.
    async fn ensure_logged_in(&self) -> Result<String, ClientError> {
        let mut session = self.session.lock().await;
        if !session.logged_in || session.csrf_token.is_none() {
            self.login_locked(&mut session).await?;
        }
        session
            .csrf_token
            .clone()
            .ok_or_else(|| ClientError::Unexpected("CSRF token not available".to_string()))
    }

    /// Drop the session so the next call re-authenticates.
    async fn expire_session(&self) {
        let mut session = self.session.lock().await;
        session.logged_in = false;
    }

    /// Fetch all classes in `[start, end)` via `/{box}/schedule/json`.
    pub async fn list_schedule(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawScheduleEvent>, ClientError> {
        let csrf = self.ensure_logged_in().await?;
        let url = self.build_url("schedule/json");
        debug!(url = %url, %start, %end, "fetching schedule");
        let response = self
            .http
            .get(&url)
            .query(&[
                ("start", format_utc_millis(start)),
                ("end", format_utc_millis(end)),
            ])
            .header("X-CSRF-TOKEN", &csrf)
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => {
                self.expire_session().await;
                Err(ClientError::AuthExpired)
            }
            StatusCode::OK => {
                let payload: SchedulePayload = response.json().await?;
                Ok(payload.events)
            }
            status => Err(ClientError::Unexpected(format!(
                "unexpected status from schedule/json: {status}"
            ))),
        }
    }

    /// Fetch enrollment detail for one class via `/{box}/classTypeDetails`.
    pub async fn class_detail(
        &self,
        class_type_id: Uuid,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ClassDetail, ClientError> {
        let csrf = self.ensure_logged_in().await?;
        let url = self.build_url("classTypeDetails");
        debug!(url = %url, %class_type_id, event_id, "fetching class detail");
        let response = self
            .http
            .get(&url)
            .query(&[
                ("classTypeId", class_type_id.to_string()),
                ("eventId", event_id.to_string()),
                ("eventDate", self.format_local_naive(start)),
                ("eventEndDate", self.format_local_naive(end)),
            ])
            .header("X-CSRF-TOKEN", &csrf)
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => {
                self.expire_session().await;
                Err(ClientError::AuthExpired)
            }
            StatusCode::OK => Ok(response.json().await?),
            status => Err(ClientError::Unexpected(format!(
                "unexpected status from classTypeDetails: {status}"
            ))),
        }
    }

    /// Enroll in a lesson via `/{box}/subscribeToScheduleItem`. Returns the
    /// remote status string; a 200 without one counts as `success`.
    pub async fn enroll(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        class_type_id: Uuid,
    ) -> Result<String, ClientError> {
        let csrf = self.ensure_logged_in().await?;
        let url = self.build_url("subscribeToScheduleItem");
        debug!(url = %url, %class_type_id, "enrolling");
        let payload = serde_json::json!({
            "startDate": self.format_local_naive(start),
            "endDate": self.format_local_naive(end),
            "classTypeId": class_type_id,
        });
        let response = self
            .http
            .post(&url)
            .header("X-CSRF-TOKEN", &csrf)
            .header("X-Requested-With", "XMLHttpRequest")
            .json(&payload)
            .send()
            .await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => {
                self.expire_session().await;
                Err(ClientError::AuthExpired)
            }
            StatusCode::OK => {
                let text = response.text().await?;
                let status = serde_json::from_str::<serde_json::Value>(&text)
                    .ok()
                    .and_then(|value| value.get("status").cloned())
                    .and_then(|status| status.as_str().map(str::to_string));
                Ok(status.unwrap_or_else(|| "success".to_string()))
            }
            status => Err(ClientError::Rejected(rejection_message(
                status,
                response.text().await.unwrap_or_default(),
            ))),
        }
    }

    /// Cancel a registration via `/{box}/unsubscribeFromScheduleItem`.
    pub async fn unenroll(
        &self,
        schedule_registration_id: Uuid,
        class_type_id: Uuid,
    ) -> Result<(), ClientError> {
        let csrf = self.ensure_logged_in().await?;
        let url = self.build_url("unsubscribeFromScheduleItem");
        debug!(url = %url, %schedule_registration_id, "unenrolling");
        let payload = serde_json::json!({
            "scheduleRegistrationId": schedule_registration_id,
            "classTypeId": class_type_id,
        });
        let response = self
            .http
            .post(&url)
            .header("X-CSRF-TOKEN", &csrf)
            .header("X-Requested-With", "XMLHttpRequest")
            .json(&payload)
            .send()
            .await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => {
                self.expire_session().await;
                Err(ClientError::AuthExpired)
            }
            StatusCode::NOT_FOUND => Err(ClientError::NotFound),
            StatusCode::OK => Ok(()),
            status => Err(ClientError::Rejected(rejection_message(
                status,
                response.text().await.unwrap_or_default(),
            ))),
        }
    }

    /// Scrape the gym display name from the dashboard page. Best-effort.
    pub async fn fetch_branding(&self) -> Option<String> {
        let url = self.build_url("");
        debug!(url = %url, "fetching branding page");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| debug!(error = %err, "branding page fetch failed"))
            .ok()?;
        if response.status() != StatusCode::OK {
            debug!(status = %response.status(), "branding page unavailable");
            return None;
        }
        let html = response.text().await.ok()?;
        extract_brand_name(&html)
    }

    /// Local naive datetime, second precision, as `classTypeDetails` and the
    /// enroll endpoints expect: `2025-12-16T18:45:00`.
    fn format_local_naive(&self, value: DateTime<Utc>) -> String {
        value
            .with_timezone(&self.timezone)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }
}

/// ISO 8601 with millisecond precision and `Z` suffix, as `schedule/json`
/// expects for its window parameters.
fn format_utc_millis(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn rejection_message(status: StatusCode, body: String) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("status {status}")
    } else {
        body.to_string()
    }
}

fn extract_csrf_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"meta[name="csrf-token"]"#).ok()?;
    document
        .select(&selector)
        .next()?
        .value()
        .attr("content")
        .map(str::to_string)
}

fn extract_brand_name(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("span.header-visual-title").ok()?;
    let raw = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>();
    let name = normalize_brand_name(&raw);
    if name.is_empty() { None } else { Some(name) }
}

/// Normalize a gym name, e.g. `BAR'S GYM` / `BAR 'S GYM` -> `Bar's Gym`.
fn normalize_brand_name(raw: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(raw.trim(), " ");
    let titled = title_case(&collapsed.to_lowercase());
    APOS_FIX_RE.replace_all(&titled, "'s").into_owned()
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut boundary = true;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if boundary {
                out.extend(ch.to_uppercase());
            } else {
                out.push(ch);
            }
            boundary = false;
        } else {
            out.push(ch);
            boundary = true;
        }
    }
    out
}

/// Parse the datetime shapes the API emits: RFC 3339, or naive
/// `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS` interpreted in the gym's
/// timezone. Returns UTC.
pub fn parse_remote_datetime(value: &str, timezone: Tz) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()?;
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}
