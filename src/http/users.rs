//! Users service routes (the entity owner).

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::domain::{User, UserInput};
use crate::events::{routing_keys, EventEmitter};
use crate::http::response::ApiError;
use crate::store::Store;

#[derive(Clone)]
pub struct UsersState {
    pub store: Arc<dyn Store<User>>,
    pub events: Arc<EventEmitter>,
}

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/health", get(health))
        .route("/{id}", get(get_user).put(update_user))
        .with_state(state)
}

async fn health(State(state): State<UsersState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "service": "users",
        "brokerConnected": state.events.is_attached(),
    }))
}

async fn list_users(State(state): State<UsersState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.store.find_all().await?))
}

async fn get_user(State(state): State<UsersState>, Path(id): Path<String>) -> Result<Json<User>, ApiError> {
    Ok(Json(state.store.find_by_id(&id).await?))
}

async fn create_user(
    State(state): State<UsersState>,
    body: Result<Json<UserInput>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(input) = body?;
    let user = state.store.create(User::new(input.validate()?)).await?;
    tracing::info!(id = %user.id, "User created");

    state.events.emit(routing_keys::USER_CREATED, &user).await;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<UsersState>,
    Path(id): Path<String>,
    body: Result<Json<UserInput>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Json(input) = body?;
    let user = state.store.update(&id, input.validate()?).await?;
    tracing::info!(id = %user.id, "User updated");

    state.events.emit(routing_keys::USER_UPDATED, &user).await;
    Ok(Json(user))
}
