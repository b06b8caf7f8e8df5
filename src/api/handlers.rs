//! API Handlers
//!
//! HTTP request handlers exposing the write-back cache for `users`.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::cache::WriteBackCache;
use crate::error::{CacheError, Result};
use crate::models::{
    FlushResponse, GetParams, HealthResponse, InvalidateResponse, SetParams, SetResponse,
    SetUserRequest, StatsResponse, User, USERS,
};

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub cache: WriteBackCache,
}

impl AppState {
    pub fn new(cache: WriteBackCache) -> Self {
        Self { cache }
    }
}

/// Handler for GET /users/:id
///
/// Reads through the cache; `?evict=N` sets the eviction timeout.
pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<GetParams>,
) -> Result<Json<User>> {
    let user = state.cache.get::<User>(USERS, id, params.evict).await?;
    Ok(Json(user))
}

/// Handler for PUT /users/:id
///
/// Caches the user now and schedules its write; `?flush=N` sets the delay.
pub async fn set_user_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<SetParams>,
    Json(req): Json<SetUserRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let user = req.into_user(id);
    state.cache.set(&user, USERS, id, params.flush).await?;

    Ok(Json(SetResponse::new(id)))
}

/// Handler for POST /users/:id/flush
///
/// Writes the cached user to the durable store immediately.
pub async fn flush_user_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FlushResponse>> {
    let user = state
        .cache
        .peek::<User>(USERS, id)
        .await?
        .ok_or_else(|| CacheError::NotFound(format!("user {} is not cached", id)))?;
    state.cache.flush(&user, USERS, id).await?;

    Ok(Json(FlushResponse::new(id)))
}

/// Handler for DELETE /users/:id
///
/// Drops the cached copy and any pending write.
pub async fn invalidate_user_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<InvalidateResponse>> {
    state.cache.invalidate(USERS, id).await?;
    Ok(Json(InvalidateResponse::new(id)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.stats();
    Json(StatsResponse::new(stats, state.cache.failed_flushes()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
