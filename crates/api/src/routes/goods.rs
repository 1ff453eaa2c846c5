//! Catalog endpoints: storefront queries and merchant administration.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Goods, GoodsId, Money, UserId};
use domain::{GoodsUpdate, NewGoods};
use reports::GoodsSales;
use serde::Deserialize;
use store::ShopStore;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;
use crate::routes::{DEFAULT_LIMIT, parse_id};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub merchant_id: Option<UserId>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub merchant_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StockRequest {
    pub remaining: u32,
}

/// GET /goods: purchasable goods, optionally narrowed to one merchant and a
/// price range. Inactive goods are listed only to their own merchant.
#[tracing::instrument(skip(state))]
pub async fn list<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Option<CurrentUser>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Goods>>, ApiError> {
    let viewer = caller.as_ref().map(|CurrentUser(principal)| principal);
    let bounds = price_bounds(&params);
    let catalog = &state.catalog;

    let goods = match (params.merchant_id, bounds) {
        (Some(merchant_id), Some((min, max))) => {
            catalog
                .merchant_goods_in_price_range(viewer, merchant_id, min, max)
                .await?
        }
        (Some(merchant_id), None) => catalog.merchant_goods(viewer, merchant_id).await?,
        (None, Some((min, max))) => catalog.goods_in_price_range(min, max).await?,
        (None, None) => catalog.available_goods().await?,
    };
    Ok(Json(goods))
}

fn price_bounds(params: &ListParams) -> Option<(Money, Money)> {
    if params.min_price.is_none() && params.max_price.is_none() {
        return None;
    }
    Some((
        Money::from_cents(params.min_price.unwrap_or(0)),
        Money::from_cents(params.max_price.unwrap_or(i64::MAX)),
    ))
}

/// GET /goods/search: case-insensitive name search.
#[tracing::instrument(skip(state))]
pub async fn search<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Option<CurrentUser>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Goods>>, ApiError> {
    let viewer = caller.as_ref().map(|CurrentUser(principal)| principal);
    let goods = match params.merchant_id {
        Some(merchant_id) => {
            state
                .catalog
                .search_merchant_goods(viewer, merchant_id, &params.q)
                .await?
        }
        None => state.catalog.search_goods(&params.q).await?,
    };
    Ok(Json(goods))
}

/// GET /goods/best-sellers: shop-wide units ordered per goods.
#[tracing::instrument(skip(state))]
pub async fn best_sellers<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<GoodsSales>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    Ok(Json(state.reports.best_selling_goods(None, limit).await?))
}

/// GET /goods/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Goods>, ApiError> {
    let goods_id: GoodsId = parse_id(&id)?;
    Ok(Json(state.catalog.get_goods(goods_id).await?))
}

/// POST /goods: list new goods for the calling merchant.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<NewGoods>,
) -> Result<(StatusCode, Json<Goods>), ApiError> {
    let goods = state.catalog.add_goods(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(goods)))
}

/// PUT /goods/{id}: partial edit.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<GoodsUpdate>,
) -> Result<Json<Goods>, ApiError> {
    let goods_id: GoodsId = parse_id(&id)?;
    Ok(Json(
        state.catalog.update_goods(&principal, goods_id, req).await?,
    ))
}

/// PUT /goods/{id}/stock
#[tracing::instrument(skip(state))]
pub async fn set_stock<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<StockRequest>,
) -> Result<Json<Goods>, ApiError> {
    let goods_id: GoodsId = parse_id(&id)?;
    Ok(Json(
        state
            .catalog
            .set_stock(&principal, goods_id, req.remaining)
            .await?,
    ))
}

/// POST /goods/{id}/activate
#[tracing::instrument(skip(state))]
pub async fn activate<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Goods>, ApiError> {
    let goods_id: GoodsId = parse_id(&id)?;
    Ok(Json(state.catalog.activate(&principal, goods_id).await?))
}

/// POST /goods/{id}/deactivate
#[tracing::instrument(skip(state))]
pub async fn deactivate<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Goods>, ApiError> {
    let goods_id: GoodsId = parse_id(&id)?;
    Ok(Json(state.catalog.deactivate(&principal, goods_id).await?))
}

/// POST /goods/{id}/reset-sales
#[tracing::instrument(skip(state))]
pub async fn reset_sales<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Goods>, ApiError> {
    let goods_id: GoodsId = parse_id(&id)?;
    Ok(Json(state.catalog.reset_sales(&principal, goods_id).await?))
}

/// DELETE /goods/{id}: refused with 409 once any order references the goods.
#[tracing::instrument(skip(state))]
pub async fn delete<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let goods_id: GoodsId = parse_id(&id)?;
    state.catalog.delete_goods(&principal, goods_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
