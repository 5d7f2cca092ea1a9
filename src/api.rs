//! Management REST API.
//!
//! Channel administration, message history, device registration, and
//! notification history live here; real-time traffic stays on the
//! WebSocket gateway. Every request carries the same proxy-forwarded
//! identity the gateway trusts.

use crate::auth::{AuthError, Credentials, IdentityProvider};
use crate::db::{ChannelMessagePage, ChannelRecord, Database, DbError, NotificationRecord};
use crate::proto::{ChannelId, PeerMessageRecord, UserId};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router as AxumRouter};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub auth: Arc<dyn IdentityProvider>,
}

/// API-level error, mapped onto an HTTP status and JSON body.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Db(DbError),
    BadRequest(String),
    Forbidden(String),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        ApiError::Db(e)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Auth(AuthError::MissingCredentials) => {
                (StatusCode::UNAUTHORIZED, "missing credentials".to_string())
            }
            ApiError::Auth(e) => (StatusCode::FORBIDDEN, e.to_string()),
            ApiError::Db(DbError::ChannelNotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("channel not found: {id}"))
            }
            ApiError::Db(e @ DbError::AlreadyAdmin(..)) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Db(e @ DbError::NotAnAdmin(..)) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Db(e) => {
                error!(error = %e, "Storage error serving API request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Resolve the caller's identity from request headers.
fn caller(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let forwarded = headers
        .get("x-authenticated-user")
        .and_then(|v| v.to_str().ok());
    Ok(state.auth.authenticate(&Credentials {
        forwarded_user: forwarded,
        declared: None,
    })?)
}

#[derive(Deserialize)]
struct CreateChannelRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct AdminRequest {
    user_id: UserId,
}

#[derive(Deserialize)]
struct RegisterDeviceRequest {
    token: String,
}

#[derive(Serialize)]
struct MembersResponse {
    members: Vec<UserId>,
}

#[derive(Serialize)]
struct AdminsResponse {
    admins: Vec<UserId>,
}

#[derive(Serialize)]
struct ConversationResponse {
    messages: Vec<PeerMessageRecord>,
}

#[derive(Serialize)]
struct NotificationsResponse {
    notifications: Vec<NotificationRecord>,
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: Option<i64>,
}

async fn create_channel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<ChannelRecord>), ApiError> {
    let user_id = caller(&state, &headers)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("channel name cannot be empty".into()));
    }

    let channel = state
        .db
        .channels()
        .create(name, req.description.as_deref(), user_id)
        .await?;
    info!(channel_id = channel.id, creator = user_id, "Channel created");
    Ok((StatusCode::CREATED, Json(channel)))
}

async fn list_channels(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChannelRecord>>, ApiError> {
    caller(&state, &headers)?;
    Ok(Json(state.db.channels().list_all().await?))
}

async fn get_channel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(channel_id): Path<ChannelId>,
) -> Result<Json<ChannelRecord>, ApiError> {
    caller(&state, &headers)?;
    let channel = state
        .db
        .channels()
        .find_by_id(channel_id)
        .await?
        .ok_or(DbError::ChannelNotFound(channel_id))?;
    Ok(Json(channel))
}

async fn join_channel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(channel_id): Path<ChannelId>,
) -> Result<Json<MembersResponse>, ApiError> {
    let user_id = caller(&state, &headers)?;
    state.db.channels().add_member(channel_id, user_id).await?;
    info!(channel_id, user_id, "User joined channel");
    let members = state.db.channels().members(channel_id).await?;
    Ok(Json(MembersResponse { members }))
}

async fn channel_members(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(channel_id): Path<ChannelId>,
) -> Result<Json<MembersResponse>, ApiError> {
    caller(&state, &headers)?;
    ensure_channel_exists(&state, channel_id).await?;
    let members = state.db.channels().members(channel_id).await?;
    Ok(Json(MembersResponse { members }))
}

async fn channel_admins(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(channel_id): Path<ChannelId>,
) -> Result<Json<AdminsResponse>, ApiError> {
    caller(&state, &headers)?;
    ensure_channel_exists(&state, channel_id).await?;
    let admins = state.db.channels().admins(channel_id).await?;
    Ok(Json(AdminsResponse { admins }))
}

async fn add_channel_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(channel_id): Path<ChannelId>,
    Json(req): Json<AdminRequest>,
) -> Result<Json<AdminsResponse>, ApiError> {
    let user_id = caller(&state, &headers)?;
    if !state.db.channels().is_admin(channel_id, user_id).await? {
        warn!(channel_id, user_id, "Non-admin attempted admin grant");
        return Err(ApiError::Forbidden(
            "only channel admins can grant admin".into(),
        ));
    }
    state.db.channels().add_admin(channel_id, req.user_id).await?;
    info!(channel_id, granted_to = req.user_id, granted_by = user_id, "Admin granted");
    let admins = state.db.channels().admins(channel_id).await?;
    Ok(Json(AdminsResponse { admins }))
}

async fn remove_channel_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((channel_id, target)): Path<(ChannelId, UserId)>,
) -> Result<Json<AdminsResponse>, ApiError> {
    let user_id = caller(&state, &headers)?;
    if !state.db.channels().is_admin(channel_id, user_id).await? {
        warn!(channel_id, user_id, "Non-admin attempted admin revoke");
        return Err(ApiError::Forbidden(
            "only channel admins can revoke admin".into(),
        ));
    }
    state.db.channels().remove_admin(channel_id, target).await?;
    info!(channel_id, revoked_from = target, revoked_by = user_id, "Admin revoked");
    let admins = state.db.channels().admins(channel_id).await?;
    Ok(Json(AdminsResponse { admins }))
}

async fn channel_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(channel_id): Path<ChannelId>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ChannelMessagePage>, ApiError> {
    caller(&state, &headers)?;
    ensure_channel_exists(&state, channel_id).await?;
    let page = state
        .db
        .messages()
        .channel_page(channel_id, query.page.unwrap_or(1))
        .await?;
    Ok(Json(page))
}

async fn peer_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(other): Path<UserId>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let user_id = caller(&state, &headers)?;
    let messages = state.db.messages().peer_conversation(user_id, other).await?;
    Ok(Json(ConversationResponse { messages }))
}

async fn register_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<StatusCode, ApiError> {
    let user_id = caller(&state, &headers)?;
    if req.token.trim().is_empty() {
        return Err(ApiError::BadRequest("device token cannot be empty".into()));
    }
    state.db.devices().register(user_id, req.token.trim()).await?;
    info!(user_id, "Device token registered");
    Ok(StatusCode::NO_CONTENT)
}

async fn notification_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<NotificationsResponse>, ApiError> {
    let user_id = caller(&state, &headers)?;
    let notifications = state.db.devices().history_for_user(user_id).await?;
    Ok(Json(NotificationsResponse { notifications }))
}

async fn ensure_channel_exists(state: &AppState, channel_id: ChannelId) -> Result<(), ApiError> {
    state
        .db
        .channels()
        .find_by_id(channel_id)
        .await?
        .ok_or(DbError::ChannelNotFound(channel_id))?;
    Ok(())
}

/// Build the API router.
pub fn router(state: AppState) -> AxumRouter {
    AxumRouter::new()
        .route("/channels", post(create_channel).get(list_channels))
        .route("/channels/:id", get(get_channel))
        .route("/channels/:id/join", post(join_channel))
        .route("/channels/:id/members", get(channel_members))
        .route("/channels/:id/admins", get(channel_admins).post(add_channel_admin))
        .route("/channels/:id/admins/:user_id", delete(remove_channel_admin))
        .route("/channels/:id/messages", get(channel_messages))
        .route("/messages/peer/:user_id", get(peer_messages))
        .route("/devices", post(register_device))
        .route("/notifications", get(notification_history))
        .with_state(state)
}

/// Serve the API on the given address. Long-running; spawn it.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "API listener bound");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
