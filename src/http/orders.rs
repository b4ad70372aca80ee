//! Orders service routes (the dependent).
//!
//! `POST /` checks the referenced user through the validator before the
//! order is stored; the order is only emitted after it is committed.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::consistency::{ConsistencyCache, EntityValidator};
use crate::domain::{Order, OrderInput, OrderStatus, Snapshot};
use crate::events::{routing_keys, EventEmitter};
use crate::http::response::ApiError;
use crate::store::Store;

#[derive(Clone)]
pub struct OrdersState {
    pub store: Arc<dyn Store<Order>>,
    pub events: Arc<EventEmitter>,
    pub validator: Arc<dyn EntityValidator>,
    pub users: ConsistencyCache<Snapshot>,
}

pub fn router(state: OrdersState) -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/health", get(health))
        .route("/{id}", get(get_order))
        .route("/{id}/cancel", patch(cancel_order))
        .with_state(state)
}

async fn health(State(state): State<OrdersState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "service": "orders",
        "breaker": state.validator.breaker().state,
        "cachedEntities": state.users.len(),
        "brokerConnected": state.events.is_attached(),
    }))
}

async fn list_orders(State(state): State<OrdersState>) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.store.find_all().await?))
}

async fn get_order(State(state): State<OrdersState>, Path(id): Path<String>) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.store.find_by_id(&id).await?))
}

async fn create_order(
    State(state): State<OrdersState>,
    body: Result<Json<OrderInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(input) = body?;
    let new_order = input.validate()?;

    state.validator.validate(&new_order.user_id).await?;

    let order = state.store.create(Order::new(new_order)).await?;
    tracing::info!(id = %order.id, user_id = %order.user_id, "Order created");

    state.events.emit(routing_keys::ORDER_CREATED, &order).await;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn cancel_order(State(state): State<OrdersState>, Path(id): Path<String>) -> Result<Json<Order>, ApiError> {
    let order = state.store.update(&id, OrderStatus::Cancelled).await?;
    tracing::info!(id = %order.id, "Order cancelled");

    state.events.emit(routing_keys::ORDER_CANCELLED, &order).await;
    Ok(Json(order))
}
