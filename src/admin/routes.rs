//! Console endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::channels::OutgoingResponse;
use crate::profile::SubscriptionSource;

use super::{AdminError, AdminState, Operator};

pub fn router() -> Router<AdminState> {
    Router::new()
        .route("/health", get(health))
        .route("/admin/stats", get(stats))
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}", get(get_user).delete(delete_user))
        .route(
            "/admin/users/{id}/subscription",
            post(grant_subscription).delete(revoke_subscription),
        )
        .route("/admin/broadcast", post(broadcast))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "fit-coach-admin"
    }))
}

// ── Users ───────────────────────────────────────────────────────────────

async fn stats(_: Operator, State(state): State<AdminState>) -> Result<Json<Value>, AdminError> {
    let users = state.db.count_users().await?;
    let subscribers = state.db.count_active_subscriptions(Utc::now()).await?;
    Ok(Json(json!({
        "users": users,
        "active_subscriptions": subscribers,
    })))
}

async fn list_users(
    _: Operator,
    State(state): State<AdminState>,
) -> Result<Json<Value>, AdminError> {
    let users = state.db.list_users().await?;
    Ok(Json(json!({ "users": users })))
}

async fn get_user(
    _: Operator,
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AdminError> {
    let user = state
        .db
        .get_user(&id)
        .await?
        .ok_or_else(|| AdminError::NotFound(format!("User {id} not found")))?;
    let subscription = state.db.get_subscription(&id).await?;
    let weights = state.db.list_weights(&id).await?;
    let achievements = state.db.list_achievements(&id).await?;
    let trainings = state.db.list_trainings(&id).await?;

    Ok(Json(json!({
        "user": user,
        "subscription": subscription,
        "weights": weights,
        "achievements": achievements,
        "trainings": trainings,
    })))
}

async fn delete_user(
    _: Operator,
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AdminError> {
    if !state.db.delete_user(&id).await? {
        return Err(AdminError::NotFound(format!("User {id} not found")));
    }
    tracing::info!(user_id = %id, "User deleted by operator");
    Ok(StatusCode::NO_CONTENT)
}

// ── Subscriptions ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GrantBody {
    days: i64,
}

async fn grant_subscription(
    _: Operator,
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(body): Json<GrantBody>,
) -> Result<Json<Value>, AdminError> {
    let sub = state
        .entitlements
        .grant_subscription(&id, body.days, SubscriptionSource::Operator)
        .await?;
    Ok(Json(json!(sub)))
}

async fn revoke_subscription(
    _: Operator,
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AdminError> {
    if !state.entitlements.revoke(&id).await? {
        return Err(AdminError::NotFound(format!("User {id} has no subscription")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ── Broadcast ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BroadcastBody {
    message: String,
}

async fn broadcast(
    _: Operator,
    State(state): State<AdminState>,
    Json(body): Json<BroadcastBody>,
) -> Result<Json<Value>, AdminError> {
    let message = body.message.trim();
    if message.is_empty() {
        return Err(AdminError::BadRequest("Message must not be empty".into()));
    }

    let mut sent = 0usize;
    let mut failed = 0usize;
    for user_id in state.db.list_user_ids().await? {
        match state
            .channels
            .notify(&user_id, OutgoingResponse::text(message))
            .await
        {
            Ok(_) => sent += 1,
            Err(e) => {
                tracing::warn!(user_id = %user_id, "Broadcast not delivered: {e}");
                failed += 1;
            }
        }
    }

    tracing::info!(sent, failed, "Broadcast finished");
    Ok(Json(json!({ "sent": sent, "failed": failed })))
}
