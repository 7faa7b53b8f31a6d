// REST API with Axum
//
// Thin mapping between HTTP and the store/resolver. Every response is
// wrapped in the same envelope; failures carry a human-readable message
// in `error` and `data: null`.

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, State,
    },
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::auth::{self, AccessToken, TokenService};
use crate::db;
use crate::entities::{Group, Member, NewGroup, NewRound, NewUser, Round, User};
use crate::error::{Error, Result};
use crate::rotation::RotationResolver;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    tokens: Arc<TokenService>,
}

impl AppState {
    pub fn new(conn: Connection, tokens: TokenService) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            tokens: Arc::new(tokens),
        }
    }

    // Open transactions roll back on drop, so a poisoned lock is still usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// API Response wrapper
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>>;

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::NoMembers | Error::Conflict(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Auth(_) | Error::Database(_) | Error::Csv(_) | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let mut response = (status, Json(ApiResponse::err(self.to_string()))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

// ============================================================================
// Extractors
// ============================================================================

// Same as axum's, but a rejected request still answers with the envelope.

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
struct ApiJson<T>(T);

#[derive(FromRequest)]
#[from_request(via(axum::Form), rejection(Error))]
struct ApiForm<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Error))]
struct ApiPath<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(Error))]
struct ApiQuery<T>(T);

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<FormRejection> for Error {
    fn from(rejection: FormRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Deserialize)]
pub struct TokenForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub struct NextRoundResponse {
    pub next_user: Member,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/token - Exchange email + password for a bearer token
async fn login(State(state): State<AppState>, ApiForm(form): ApiForm<TokenForm>) -> ApiResult<AccessToken> {
    let conn = state.conn();
    let user = auth::authenticate(&conn, &form.username, &form.password)?;
    let token = state.tokens.issue(&user.email)?;
    Ok(Json(ApiResponse::ok(token)))
}

/// POST /api/users - Register a user
async fn create_user(State(state): State<AppState>, ApiJson(new_user): ApiJson<NewUser>) -> ApiResult<User> {
    let conn = state.conn();
    let new_user = NewUser::new(&new_user.email, &new_user.username, &new_user.password);
    let user = auth::register(&conn, &new_user)?;
    Ok(Json(ApiResponse::ok(user)))
}

/// GET /api/users/me - User behind the bearer token
async fn current_user(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<User> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| Error::Unauthorized("Not authenticated".to_string()))?;

    let conn = state.conn();
    let user = state.tokens.current_user(&conn, token.trim())?;
    Ok(Json(ApiResponse::ok(user)))
}

/// POST /api/groups - Create a group
async fn create_group(State(state): State<AppState>, ApiJson(new_group): ApiJson<NewGroup>) -> ApiResult<Group> {
    let conn = state.conn();
    let group = db::insert_group(&conn, &NewGroup::new(&new_group.name, new_group.created_by_id))?;
    Ok(Json(ApiResponse::ok(group)))
}

/// GET /api/groups?skip=&limit= - List groups with their members
async fn list_groups(State(state): State<AppState>, ApiQuery(page): ApiQuery<Pagination>) -> ApiResult<Vec<Group>> {
    let conn = state.conn();
    let groups = db::list_groups(&conn, page.skip, page.limit)?;
    Ok(Json(ApiResponse::ok(groups)))
}

/// GET /api/groups/:group_id
async fn get_group(State(state): State<AppState>, ApiPath(group_id): ApiPath<i64>) -> ApiResult<Group> {
    let conn = state.conn();
    let group = db::get_group(&conn, group_id)?.ok_or_else(|| Error::not_found("Group"))?;
    Ok(Json(ApiResponse::ok(group)))
}

/// POST /api/groups/:group_id/members/:user_id - Append a member to the rotation
async fn add_member(
    State(state): State<AppState>,
    ApiPath((group_id, user_id)): ApiPath<(i64, i64)>,
) -> ApiResult<MessageResponse> {
    let conn = state.conn();
    db::add_member(&conn, group_id, user_id)?;
    Ok(Json(ApiResponse::ok(MessageResponse {
        message: "Member added successfully".to_string(),
    })))
}

/// GET /api/groups/:group_id/next-round - Whose turn it is
async fn next_round(State(state): State<AppState>, ApiPath(group_id): ApiPath<i64>) -> ApiResult<NextRoundResponse> {
    let conn = state.conn();
    let next_user = RotationResolver::resolve(&conn, group_id)?;
    Ok(Json(ApiResponse::ok(NextRoundResponse { next_user })))
}

/// GET /api/groups/:group_id/rounds - Round history, newest first
async fn group_rounds(State(state): State<AppState>, ApiPath(group_id): ApiPath<i64>) -> ApiResult<Vec<Round>> {
    let conn = state.conn();
    if !db::group_exists(&conn, group_id)? {
        return Err(Error::not_found("Group"));
    }
    let rounds = db::get_rounds_for_group(&conn, group_id)?;
    Ok(Json(ApiResponse::ok(rounds)))
}

/// POST /api/rounds - Record that someone paid
async fn create_round(State(state): State<AppState>, ApiJson(new_round): ApiJson<NewRound>) -> ApiResult<Round> {
    let conn = state.conn();
    let new_round = NewRound::new(new_round.group_id, new_round.paid_by_id, new_round.amount, new_round.notes);
    let round = db::insert_round(&conn, &new_round)?;
    Ok(Json(ApiResponse::ok(round)))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/token", post(login))
        .route("/users", post(create_user))
        .route("/users/", post(create_user))
        .route("/users/me", get(current_user))
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/", get(list_groups).post(create_group))
        .route("/groups/:group_id", get(get_group))
        .route("/groups/:group_id/members/:user_id", post(add_member))
        .route("/groups/:group_id/next-round", get(next_round))
        .route("/groups/:group_id/rounds", get(group_rounds))
        .route("/rounds", post(create_round))
        .route("/rounds/", post(create_round))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
