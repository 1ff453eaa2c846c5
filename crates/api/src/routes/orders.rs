//! Order placement, lookup and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Order, OrderId, OrderStatus};
use domain::{LifecycleEvent, OrderDetails, PlaceOrder, Principal};
use serde::Deserialize;
use store::ShopStore;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;
use crate::routes::parse_id;

/// POST /orders: place an order for the calling customer.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<PlaceOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.orders.create_order(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)]
pub struct MineParams {
    pub status: Option<OrderStatus>,
}

/// GET /orders/mine: the caller's orders, newest first, optionally in one
/// status.
#[tracing::instrument(skip(state))]
pub async fn mine<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Query(params): Query<MineParams>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = match params.status {
        Some(status) => state.orders.orders_by_status(&principal, status).await?,
        None => state.orders.customer_orders(&principal).await?,
    };
    Ok(Json(orders))
}

/// GET /orders/{id}: the order with its lines resolved against the catalog.
#[tracing::instrument(skip(state))]
pub async fn get<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderDetails>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    Ok(Json(
        state.orders.get_order_details(&principal, order_id).await?,
    ))
}

async fn apply<S: ShopStore + Clone + 'static>(
    state: &AppState<S>,
    principal: &Principal,
    id: &str,
    event: LifecycleEvent,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(id)?;
    let order = match event {
        LifecycleEvent::Pay => state.orders.pay_order(principal, order_id).await?,
        LifecycleEvent::Ship => state.orders.ship_order(principal, order_id).await?,
        LifecycleEvent::Complete => state.orders.complete_order(principal, order_id).await?,
        LifecycleEvent::Cancel => state.orders.cancel_order(principal, order_id).await?,
    };
    Ok(Json(order))
}

/// POST /orders/{id}/pay
#[tracing::instrument(skip(state))]
pub async fn pay<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    apply(&state, &principal, &id, LifecycleEvent::Pay).await
}

/// POST /orders/{id}/ship: only a merchant selling goods on the order.
#[tracing::instrument(skip(state))]
pub async fn ship<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    apply(&state, &principal, &id, LifecycleEvent::Ship).await
}

/// POST /orders/{id}/complete
#[tracing::instrument(skip(state))]
pub async fn complete<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    apply(&state, &principal, &id, LifecycleEvent::Complete).await
}

/// POST /orders/{id}/cancel: restores stock; sales counters stay.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    apply(&state, &principal, &id, LifecycleEvent::Cancel).await
}
