use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::analytics::{self, TimeRange};
use crate::auth::{Actor, Authenticator};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::downloader;
use crate::error::{DashboardError, Result};
use crate::models::{DailyReport, Permissions, ReportMetrics};
use crate::reports::{HistoryFilter, ReportFilter, ReportService};
use crate::store::{FallbackStore, open_store};
use crate::users::{NewUser, UserService, ensure_default_admin};

const SESSION_COOKIE: &str = "session";
const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Everything a request handler touches, behind one lock
struct Dashboard {
    store: FallbackStore,
    clock: Box<dyn Clock>,

    /// Session token -> logged-in caller
    sessions: HashMap<String, Actor>,
}

impl Dashboard {
    fn actor(&self, jar: &CookieJar) -> Result<Actor> {
        jar.get(SESSION_COOKIE)
            .and_then(|cookie| self.sessions.get(cookie.value()))
            .cloned()
            .ok_or(DashboardError::Auth)
    }

    fn reports(&self) -> ReportService<'_> {
        ReportService::new(&self.store, self.clock.as_ref())
    }

    fn users(&self) -> UserService<'_> {
        UserService::new(&self.store, self.clock.as_ref())
    }

    /// Reports the caller may see, for the analytics views
    fn visible_reports(&self, actor: &Actor) -> Result<Vec<DailyReport>> {
        actor.require(actor.can_view_analytics(), "view analytics")?;
        self.reports().list_reports(actor, &ReportFilter::default())
    }
}

pub struct AppState {
    dashboard: Mutex<Dashboard>,
}

impl AppState {
    pub fn new(store: FallbackStore, clock: Box<dyn Clock>) -> Self {
        AppState {
            dashboard: Mutex::new(Dashboard {
                store,
                clock,
                sessions: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Dashboard> {
        // Each write is a single store call, so a poisoned guard is still usable
        self.dashboard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `work` against the locked dashboard on the blocking thread pool
    ///
    /// Store calls may wait on the network for the configured timeout.
    async fn with_dashboard<T, F>(self: &Arc<Self>, work: F) -> Result<T>
    where
        F: FnOnce(&mut Dashboard) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let mut dashboard = state.lock();
            work(&mut *dashboard)
        })
        .await
        .map_err(|err| DashboardError::StorageFatal(format!("Request worker failed: {}", err)))?
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = match &self {
            DashboardError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            DashboardError::Validation(_) => StatusCode::BAD_REQUEST,
            DashboardError::Auth => StatusCode::UNAUTHORIZED,
            DashboardError::NotFound(_) => StatusCode::NOT_FOUND,
            DashboardError::StorageFatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DashboardError::AlreadyExists(_) => StatusCode::CONFLICT,
            DashboardError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else if matches!(self, DashboardError::PermissionDenied(_)) {
            warn!("{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Start the web server
///
/// Opens the store, seeds the admin account if needed, and serves until the
/// process is stopped.
pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&config)?;
    let clock = SystemClock;
    ensure_default_admin(&store, &clock, &config.admin_password)?;

    let app = router(Arc::new(AppState::new(store, Box::new(clock))));

    let listener = TcpListener::bind(config.bind_addr.as_str()).await?;
    info!("Listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// JSON API routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/status", get(status))
        .route("/api/reports", get(list_reports).post(submit_report))
        .route("/api/history", get(edit_history))
        .route("/api/analytics/stats", get(stats))
        .route("/api/analytics/telecallers", get(telecallers))
        .route("/api/analytics/countries", get(countries))
        .route("/api/analytics/daily", get(daily))
        .route("/api/analytics/videos", get(videos))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/:name/deactivate", post(deactivate_user))
        .route("/api/users/:name/password", post(change_password))
        .route("/api/users/:name/permissions", put(update_permissions))
        .route("/api/export/reports.csv", get(export_reports_csv))
        .route("/api/export/reports.xlsx", get(export_reports_xlsx))
        .route("/api/export/history.csv", get(export_history_csv))
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct SubmitRequest {
    /// Defaults to the caller's own telecaller name
    #[serde(default)]
    telecaller: Option<String>,
    date: chrono::NaiveDate,
    #[serde(flatten)]
    metrics: ReportMetrics,
}

#[derive(Deserialize)]
struct PasswordRequest {
    password: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct StatsQuery {
    range: TimeRange,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WindowQuery {
    days: Option<i64>,
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(credentials): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Actor>)> {
    let (token, actor) = state
        .with_dashboard(move |dashboard| {
            let actor = Authenticator::new(&dashboard.store)
                .authenticate(&credentials.username, &credentials.password)?
                .into_actor()?;
            let token = Uuid::new_v4().to_string();
            dashboard.sessions.insert(token.clone(), actor.clone());
            Ok((token, actor))
        })
        .await?;

    let cookie = Cookie::build((SESSION_COOKIE, token)).path("/").http_only(true);
    Ok((jar.add(cookie), Json(actor)))
}

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<impl IntoResponse> {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string()) {
        state
            .with_dashboard(move |dashboard| {
                dashboard.sessions.remove(&token);
                Ok(())
            })
            .await?;
    }
    Ok((
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        StatusCode::NO_CONTENT,
    ))
}

async fn status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let status = state.with_dashboard(|dashboard| Ok(dashboard.store.status())).await?;
    Ok(Json(status))
}

async fn list_reports(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(filter): Query<ReportFilter>,
) -> Result<impl IntoResponse> {
    let reports = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            dashboard.reports().list_reports(&actor, &filter)
        })
        .await?;
    Ok(Json(reports))
}

async fn submit_report(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SubmitRequest>,
) -> Result<impl IntoResponse> {
    let outcome = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            let telecaller = request
                .telecaller
                .or_else(|| actor.telecaller_name.clone())
                .unwrap_or_default();
            dashboard
                .reports()
                .submit_report(&actor, &telecaller, request.date, request.metrics)
        })
        .await?;
    Ok(Json(json!({ "outcome": outcome })))
}

async fn edit_history(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(filter): Query<HistoryFilter>,
) -> Result<impl IntoResponse> {
    let entries = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            dashboard.reports().edit_history(&actor, &filter)
        })
        .await?;
    Ok(Json(entries))
}

async fn stats(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse> {
    let stats = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            let reports = dashboard.visible_reports(&actor)?;
            Ok(analytics::dashboard_stats(&reports, query.range, dashboard.clock.today()))
        })
        .await?;
    Ok(Json(stats))
}

async fn telecallers(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<impl IntoResponse> {
    let summary = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            Ok(analytics::per_telecaller(&dashboard.visible_reports(&actor)?))
        })
        .await?;
    Ok(Json(summary))
}

async fn countries(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<impl IntoResponse> {
    let counts = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            Ok(analytics::per_country(&dashboard.visible_reports(&actor)?))
        })
        .await?;
    Ok(Json(counts))
}

/// Whole history per day, or the recent trend when `days` is given
async fn daily(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<WindowQuery>,
) -> Result<impl IntoResponse> {
    let series = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            let reports = dashboard.visible_reports(&actor)?;
            Ok(match query.days {
                Some(days) => analytics::trend(&reports, days, dashboard.clock.today()),
                None => analytics::per_day(&reports),
            })
        })
        .await?;
    Ok(Json(series))
}

async fn videos(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<WindowQuery>,
) -> Result<impl IntoResponse> {
    let days = query.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    let videos = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            let reports = dashboard.visible_reports(&actor)?;
            Ok(analytics::video_activities(&reports, days, dashboard.clock.today()))
        })
        .await?;
    Ok(Json(videos))
}

async fn list_users(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<impl IntoResponse> {
    let users = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            dashboard.users().list_users(&actor)
        })
        .await?;
    Ok(Json(users))
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(new_user): Json<NewUser>,
) -> Result<impl IntoResponse> {
    let user = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            dashboard.users().create_user(&actor, new_user)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            dashboard.users().deactivate_user(&actor, &name)?;
            // Signed-in sessions of the account end with it
            dashboard.sessions.retain(|_, session| session.username != name);
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(name): Path<String>,
    Json(request): Json<PasswordRequest>,
) -> Result<impl IntoResponse> {
    state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            dashboard.users().change_password(&actor, &name, &request.password)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_permissions(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(name): Path<String>,
    Json(permissions): Json<Permissions>,
) -> Result<impl IntoResponse> {
    let user = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            let user = dashboard.users().update_permissions(&actor, &name, permissions)?;
            for session in dashboard.sessions.values_mut() {
                if session.username == name {
                    session.permissions = permissions;
                }
            }
            Ok(user)
        })
        .await?;
    Ok(Json(user))
}

fn attachment(content_type: &'static str, file_name: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

async fn export_reports_csv(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(filter): Query<ReportFilter>,
) -> Result<Response> {
    let csv = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            downloader::check_export(&actor)?;
            let reports = dashboard.reports().list_reports(&actor, &filter)?;
            Ok(downloader::reports_to_csv(&reports))
        })
        .await?;
    Ok(attachment("text/csv", "reports.csv", csv.into_bytes()))
}

async fn export_reports_xlsx(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(filter): Query<ReportFilter>,
) -> Result<Response> {
    let xlsx = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            downloader::check_export(&actor)?;
            let reports = dashboard.reports().list_reports(&actor, &filter)?;
            downloader::reports_to_xlsx(&reports)
        })
        .await?;
    Ok(attachment(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "reports.xlsx",
        xlsx,
    ))
}

async fn export_history_csv(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(filter): Query<HistoryFilter>,
) -> Result<Response> {
    let csv = state
        .with_dashboard(move |dashboard| {
            let actor = dashboard.actor(&jar)?;
            downloader::check_export(&actor)?;
            let entries = dashboard.reports().edit_history(&actor, &filter)?;
            Ok(downloader::history_to_csv(&entries))
        })
        .await?;
    Ok(attachment("text/csv", "edit_history.csv", csv.into_bytes()))
}
