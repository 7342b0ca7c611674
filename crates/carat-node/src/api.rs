//! Read-only HTTP status API.

use crate::node::NodeState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use carat_lifecycle::{
    ArchiveEntry, LifecycleError, SessionNumber, SessionResources, SessionState,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<NodeState>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .route("/api/v1/sessions", get(list_sessions))
        .route("/api/v1/sessions/:game", get(get_session))
        .route("/api/v1/archive", get(get_archive))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

// --- Sessions ---

#[derive(Debug, Serialize)]
struct SessionView {
    game: SessionNumber,
    state: SessionState,
    generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    resources: Option<SessionResources>,
}

async fn list_sessions(State(state): State<AppState>) -> Result<Json<Vec<SessionView>>, StatusCode> {
    let locator = state.lifecycle.locator();
    locator
        .refresh()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    let mut views = Vec::new();
    for game in locator.sessions().await {
        // Games missing their kibitz channel or roles are skipped.
        if let Ok(view) = session_view(&state, game).await {
            views.push(view);
        }
    }
    Ok(Json(views))
}

async fn get_session(
    State(state): State<AppState>,
    Path(game): Path<String>,
) -> Result<Json<SessionView>, StatusCode> {
    let game = SessionNumber::parse(&game).map_err(|_| StatusCode::BAD_REQUEST)?;
    session_view(&state, game).await.map(Json)
}

async fn session_view(state: &NodeState, game: SessionNumber) -> Result<SessionView, StatusCode> {
    let record = match state.lifecycle.session_state(&game).await {
        Ok(record) => record,
        Err(LifecycleError::ResourceNotFound { .. }) => return Err(StatusCode::NOT_FOUND),
        Err(LifecycleError::ResourceAmbiguous { .. }) => return Err(StatusCode::CONFLICT),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };
    let resources = state.lifecycle.locator().resolve(&game).await.ok();
    Ok(SessionView {
        game,
        state: record.state,
        generation: record.generation,
        resources,
    })
}

// --- Archive ---

#[derive(Debug, Serialize)]
struct ArchiveView {
    capacity: usize,
    len: usize,
    entries: Vec<ArchiveEntry>,
}

async fn get_archive(State(state): State<AppState>) -> Json<ArchiveView> {
    let entries = state.lifecycle.archive_entries().await;
    Json(ArchiveView {
        capacity: state.lifecycle.config().archive_capacity,
        len: entries.len(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_node;

    #[tokio::test]
    async fn health_is_ok() {
        assert_eq!(health().await, "OK");
    }

    #[tokio::test]
    async fn known_session_has_state_and_resources() {
        let node = test_node().await;
        let Json(view) = get_session(State(Arc::clone(&node.state)), Path("12".into()))
            .await
            .unwrap();
        assert_eq!(view.state, SessionState::Running);
        assert!(view.resources.is_some());
    }

    #[tokio::test]
    async fn unknown_and_malformed_sessions() {
        let node = test_node().await;
        let missing = get_session(State(Arc::clone(&node.state)), Path("99".into())).await;
        assert_eq!(missing.unwrap_err(), StatusCode::NOT_FOUND);

        let malformed = get_session(State(Arc::clone(&node.state)), Path("1 2".into())).await;
        assert_eq!(malformed.unwrap_err(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn lists_sessions_and_empty_archive() {
        let node = test_node().await;
        let Json(sessions) = list_sessions(State(Arc::clone(&node.state))).await.unwrap();
        assert_eq!(sessions.len(), 1);

        let Json(archive) = get_archive(State(Arc::clone(&node.state))).await;
        assert_eq!(archive.capacity, 50);
        assert_eq!(archive.len, 0);
    }
}
