//! HTTP API server with observability for the shop core.
//!
//! Exposes the catalog, order lifecycle and merchant reports over REST. The
//! caller is identified by the `X-User-Id`/`X-User-Role` headers set by the
//! upstream identity layer. Structured logging goes through `tracing` and
//! counters are scraped from `/metrics`.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::{CatalogService, OrderNotifier, OrderService, UserService};
use metrics_exporter_prometheus::PrometheusHandle;
use reports::ReportService;
use store::ShopStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: ShopStore + Clone + 'static> {
    pub catalog: CatalogService<S>,
    pub orders: OrderService<S>,
    pub users: UserService<S>,
    pub reports: ReportService<S>,
}

impl<S: ShopStore + Clone + 'static> AppState<S> {
    /// Builds every service over one store; the notifier receives
    /// post-commit order notifications.
    pub fn new(store: S, notifier: Arc<dyn OrderNotifier>) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            orders: OrderService::new(store.clone(), notifier),
            users: UserService::new(store.clone()),
            reports: ReportService::new(store),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: ShopStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{goods, merchant, ops, orders, users};

    let metrics_router = Router::new()
        .route("/metrics", get(ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(ops::health))
        .route("/users", post(users::register::<S>))
        .route("/users/{id}", get(users::get::<S>))
        .route("/goods", get(goods::list::<S>).post(goods::create::<S>))
        .route("/goods/search", get(goods::search::<S>))
        .route("/goods/best-sellers", get(goods::best_sellers::<S>))
        .route(
            "/goods/{id}",
            get(goods::get::<S>)
                .put(goods::update::<S>)
                .delete(goods::delete::<S>),
        )
        .route("/goods/{id}/stock", put(goods::set_stock::<S>))
        .route("/goods/{id}/activate", post(goods::activate::<S>))
        .route("/goods/{id}/deactivate", post(goods::deactivate::<S>))
        .route("/goods/{id}/reset-sales", post(goods::reset_sales::<S>))
        .route("/orders", post(orders::create::<S>))
        .route("/orders/mine", get(orders::mine::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/{id}/pay", post(orders::pay::<S>))
        .route("/orders/{id}/ship", post(orders::ship::<S>))
        .route("/orders/{id}/complete", post(orders::complete::<S>))
        .route("/orders/{id}/cancel", post(orders::cancel::<S>))
        .route("/merchant/orders", get(merchant::orders::<S>))
        .route("/merchant/orders/counts", get(merchant::order_counts::<S>))
        .route("/merchant/stats", get(merchant::stats::<S>))
        .route("/merchant/rankings", get(merchant::rankings::<S>))
        .route("/merchant/best-sellers", get(merchant::best_sellers::<S>))
        .route("/merchant/sales-report", get(merchant::sales_report::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
