//! Merchant back-office endpoints: incoming orders and reports.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use common::{Order, OrderStatus};
use domain::StatusCount;
use reports::{GoodsSales, MerchantGoodsStats, RankedGoods, SalesReport};
use serde::Deserialize;
use store::ShopStore;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;
use crate::routes::DEFAULT_LIMIT;
use crate::routes::goods::LimitParams;

#[derive(Debug, Deserialize)]
pub struct OrdersParams {
    pub status: Option<OrderStatus>,
}

/// Ranking key of `GET /merchant/rankings`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingKey {
    /// Units sold.
    #[default]
    Sales,
    /// Units sold times price.
    Value,
}

#[derive(Debug, Deserialize)]
pub struct RankingParams {
    #[serde(default)]
    pub by: RankingKey,
}

#[derive(Debug, Deserialize)]
pub struct WindowParams {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// GET /merchant/orders: orders containing the caller's goods.
#[tracing::instrument(skip(state))]
pub async fn orders<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Query(params): Query<OrdersParams>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(
        state
            .orders
            .merchant_orders(&principal, params.status)
            .await?,
    ))
}

/// GET /merchant/orders/counts: the caller's orders per status.
#[tracing::instrument(skip(state))]
pub async fn order_counts<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<Vec<StatusCount>>, ApiError> {
    Ok(Json(
        state
            .orders
            .merchant_order_count_by_status(&principal)
            .await?,
    ))
}

/// GET /merchant/stats
#[tracing::instrument(skip(state))]
pub async fn stats<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<MerchantGoodsStats>, ApiError> {
    Ok(Json(state.reports.merchant_goods_stats(&principal).await?))
}

/// GET /merchant/rankings?by=sales|value
#[tracing::instrument(skip(state))]
pub async fn rankings<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Query(params): Query<RankingParams>,
) -> Result<Json<Vec<RankedGoods>>, ApiError> {
    let ranking = match params.by {
        RankingKey::Sales => state.reports.sales_ranking(&principal).await?,
        RankingKey::Value => state.reports.sales_value_ranking(&principal).await?,
    };
    Ok(Json(ranking))
}

/// GET /merchant/best-sellers: the caller's goods by units ordered.
#[tracing::instrument(skip(state))]
pub async fn best_sellers<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<GoodsSales>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    Ok(Json(
        state
            .reports
            .best_selling_goods(Some(&principal), limit)
            .await?,
    ))
}

/// GET /merchant/sales-report?from=..&to=.. (RFC 3339 timestamps)
#[tracing::instrument(skip(state))]
pub async fn sales_report<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Query(window): Query<WindowParams>,
) -> Result<Json<SalesReport>, ApiError> {
    Ok(Json(
        state
            .reports
            .merchant_sales_report(&principal, window.from, window.to)
            .await?,
    ))
}
