use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use causerie_shared::auth::AccessToken;
use causerie_shared::constants::HISTORY_REPLAY_LIMIT;
use causerie_shared::types::{
    Actor, Group, GroupId, GroupSettings, Message, PinnedEntry, Role, UserId, UserProfile,
};
use causerie_shared::ChatError;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::hub::Hub;
use crate::media::MediaStore;
use crate::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub media: Arc<MediaStore>,
    pub signing_key: Arc<SigningKey>,
    pub verifying_key: VerifyingKey,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/api/auth", post(login))
        .route("/api/users", post(create_user))
        .route("/api/groups", get(list_groups).post(create_group))
        .route("/api/groups/:id/members", post(add_member))
        .route("/api/groups/:id/admins", post(promote_admin))
        .route("/api/groups/:id/messages", get(group_messages))
        .route("/api/groups/:id/pinned", get(group_pinned))
        .route("/api/media", post(media_upload))
        .route("/media/:id", get(media_download))
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(state.config.max_media_size + 64 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolve the `Authorization: Bearer <token>` header into a live actor.
///
/// The token only proves identity; the role is re-read from the identity
/// store so demotions and deletions take effect before the token expires.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Actor, ApiError> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Chat(ChatError::AuthRequired))?;

    let token = AccessToken::decode(raw)?;
    let claims = token.verify(&state.verifying_key)?;
    Ok(state.hub.refresh_actor(claims).await?)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    max_media_size: usize,
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: UserProfile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    id: String,
    display_name: String,
    password: String,
    #[serde(default)]
    role: Option<Role>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupRequest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    settings: Option<GroupSettings>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberRequest {
    user_id: String,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct MediaUploadResponse {
    id: Uuid,
    url: String,
    kind: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        max_media_size: state.config.max_media_size,
    })
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user_id = UserId::new(&req.username);
    let profile = state.hub.login(&user_id, &req.password).await?;

    let expires_at = Utc::now() + Duration::hours(state.config.token_ttl_hours);
    let token = AccessToken::issue(
        profile.id.clone(),
        profile.role,
        expires_at,
        &state.signing_key,
    );

    Ok(Json(LoginResponse {
        token: token.encode(),
        user: profile,
    }))
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let actor = authenticate(&state, &headers).await?;
    let profile = state
        .hub
        .create_user(
            &actor,
            UserId::new(&req.id),
            req.display_name,
            req.password,
            req.role.unwrap_or(Role::Member),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn list_groups(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Group>>, ApiError> {
    let actor = authenticate(&state, &headers).await?;
    Ok(Json(state.hub.groups_for(&actor.id).await))
}

async fn create_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let actor = authenticate(&state, &headers).await?;
    let group = state
        .hub
        .create_group(
            &actor,
            &req.name,
            &req.description,
            req.settings.unwrap_or_default(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn add_member(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MemberRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = authenticate(&state, &headers).await?;
    state
        .hub
        .add_member(&actor, &GroupId(group_id), &UserId::new(&req.user_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn promote_admin(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MemberRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = authenticate(&state, &headers).await?;
    state
        .hub
        .promote_to_admin(&actor, &GroupId(group_id), &UserId::new(&req.user_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn group_messages(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Message>>, ApiError> {
    let actor = authenticate(&state, &headers).await?;
    let limit = query.limit.unwrap_or(HISTORY_REPLAY_LIMIT);
    let messages = state
        .hub
        .recent_messages(&actor, &GroupId(group_id), limit)
        .await?;
    Ok(Json(messages))
}

async fn group_pinned(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<PinnedEntry>>, ApiError> {
    let actor = authenticate(&state, &headers).await?;
    let pins = state.hub.active_pins(&actor, &GroupId(group_id)).await?;
    Ok(Json(pins))
}

async fn media_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MediaUploadResponse>), ApiError> {
    authenticate(&state, &headers).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .ok_or_else(|| ApiError::BadRequest("missing content type".to_string()))?
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;

        let media = state.media.store(&data, &content_type).await?;
        return Ok((
            StatusCode::CREATED,
            Json(MediaUploadResponse {
                id: media.id,
                url: media.url,
                kind: media.kind.as_str(),
            }),
        ));
    }

    Err(ApiError::BadRequest("missing 'file' field".to_string()))
}

async fn media_download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (data, content_type) = state.media.get(id).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], data))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    tracing::info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
