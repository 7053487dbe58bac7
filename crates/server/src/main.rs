use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use server_api::{current_profile, list_profiles, update_current_profile, ApiContext, AuthedUser};
use shared::{
    domain::{ProfileRecord, ProfileUpdate},
    error::{ApiError, ErrorCode},
    protocol::{
        HealthResponse, ListUsersQuery, ListUsersResponse, CURRENT_USER_ROUTE, HEALTH_ROUTE,
        USERS_ROUTE,
    },
};
use storage::Storage;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod auth;
mod config;

use app_state::AppState;
use auth::{AuthError, JwtVerifier};
use config::load_settings;

const MAX_BODY_BYTES: usize = 64 * 1024;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings()?;
    let storage = Storage::new(&settings.database_url).await.map_err(|error| {
        error!(
            database_url = %settings.database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    if settings.jwt_secret.is_some() {
        info!("verifying bearer tokens with shared secret");
    } else {
        info!(jwks_url = %settings.jwks_url, "verifying bearer tokens with JWKS");
    }

    let state = AppState {
        api: ApiContext { storage },
        verifier: Arc::new(JwtVerifier::from_settings(&settings)),
    };
    let mut app = build_router(Arc::new(state));
    if let Some(cors) = cors_layer(&settings.allowed_origins) {
        app = app.layer(cors);
    }

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(HEALTH_ROUTE, get(health))
        .route(CURRENT_USER_ROUTE, get(get_me).put(update_me))
        .route(USERS_ROUTE, get(http_list_users))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request()),
    )
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn get_me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<ProfileRecord> {
    let user = authenticate(&state, &headers).await?;
    let profile = current_profile(&state.api, &user).await.map_err(api_failure)?;
    Ok(Json(profile))
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<ProfileRecord> {
    let user = authenticate(&state, &headers).await?;
    let profile = update_current_profile(&state.api, &user, &update)
        .await
        .map_err(api_failure)?;
    info!(user_id = %user.user_id, "profile updated");
    Ok(Json(profile))
}

async fn http_list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<ListUsersResponse> {
    authenticate(&state, &headers).await?;
    let page = list_profiles(&state.api, &query)
        .await
        .map_err(api_failure)?;
    Ok(Json(page))
}

async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthedUser, (StatusCode, Json<ApiError>)> {
    state.verifier.authenticate(headers).await.map_err(|err| {
        if !matches!(err, AuthError::MissingBearer) {
            warn!(error = %err, "rejected bearer token");
        }
        (
            StatusCode::UNAUTHORIZED,
            Json(ApiError::new(ErrorCode::Unauthorized, err.to_string())),
        )
    })
}

fn api_failure(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => {
            error!(message = %err.message, "profile request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(err))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
