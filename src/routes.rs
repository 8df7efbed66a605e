use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::article::Article;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::feed::{ArticleFeedController, FeedState};
use crate::store::SavedArticlesStore;

pub struct AppState {
    pub feed: Arc<ArticleFeedController>,
    pub store: Arc<SavedArticlesStore>,
    pub monitor: ConnectivityMonitor,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/feed", get(feed))
        .route("/feed/refresh", post(refresh))
        .route("/connectivity", post(connectivity))
        .route("/saved", get(list_saved).post(add_saved).delete(remove_saved))
        .route("/health", get(health))
        .with_state(state)
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

pub async fn feed(State(state): State<Arc<AppState>>) -> Json<FeedState> {
    Json(state.feed.state())
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub query: Option<String>,
}

/// Runs a fetch and returns the resulting state. Fetch failures are part of
/// the state, not an HTTP error.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RefreshRequest>>,
) -> Json<FeedState> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let _ = state.feed.fetch(request.query.as_deref()).await;
    Json(state.feed.state())
}

pub async fn connectivity(
    State(state): State<Arc<AppState>>,
    Json(event): Json<ConnectivityEvent>,
) -> StatusCode {
    state.monitor.notify(event);
    StatusCode::NO_CONTENT
}

pub async fn list_saved(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Article>>, AppError> {
    Ok(Json(state.store.articles().await?))
}

pub async fn add_saved(
    State(state): State<Arc<AppState>>,
    Json(article): Json<Article>,
) -> Result<Json<Vec<Article>>, AppError> {
    state.store.add(article).await?;
    Ok(Json(state.store.articles().await?))
}

#[derive(Debug, Deserialize)]
pub struct RemoveQuery {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

pub async fn remove_saved(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RemoveQuery>,
) -> Result<Response, AppError> {
    let removed = match (query.url, query.title) {
        (Some(url), _) => state.store.remove_by_url(&url).await?,
        (None, Some(title)) => state.store.remove(&title).await?,
        (None, None) => {
            return Ok((StatusCode::BAD_REQUEST, "Missing 'title' or 'url'").into_response())
        }
    };
    Ok(Json(json!({ "removed": removed })).into_response())
}

pub async fn health() -> &'static str {
    "OK"
}
