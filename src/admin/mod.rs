//! Operator console: a small authenticated JSON API for managing users,
//! subscriptions and broadcasts.

pub mod auth;
pub mod routes;

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use secrecy::SecretString;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::channels::ChannelManager;
use crate::entitlement::Entitlements;
use crate::error::{CoachError, DatabaseError};
use crate::store::Database;

pub use auth::Operator;

/// State shared by the console handlers.
#[derive(Clone)]
pub struct AdminState {
    pub db: Arc<dyn Database>,
    pub entitlements: Arc<Entitlements>,
    pub channels: Arc<ChannelManager>,
    pub token: Arc<SecretString>,
}

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal error")]
    Internal(String),
}

impl From<DatabaseError> for AdminError {
    fn from(e: DatabaseError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<CoachError> for AdminError {
    fn from(e: CoachError) -> Self {
        match e {
            CoachError::Validation(message) => Self::BadRequest(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(detail) => {
                tracing::error!("Console request failed: {detail}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the console router with tracing and CORS layers.
pub fn admin_router(state: AdminState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve the console until the task is dropped.
pub async fn serve(router: Router, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "Operator console listening");
    axum::serve(listener, router).await
}
