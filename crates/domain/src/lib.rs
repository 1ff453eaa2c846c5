//! Domain layer for the shop core.
//!
//! This crate provides the rules that keep goods stock, sales counters and
//! order status consistent:
//! - Catalog administration and storefront queries
//! - Inventory ledger operations run inside store transactions
//! - Order lifecycle state machine and the order service
//! - Post-commit notification hook
//! - The authorization predicate every service call goes through

pub mod auth;
pub mod catalog;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod order;
pub mod users;

pub use auth::{Action, Principal, Resource, authorize};
pub use catalog::{CatalogService, GoodsUpdate, NewGoods, reserve_check};
pub use error::{DomainError, Result};
pub use notify::{
    InMemoryNotifier, LogNotifier, NotificationKind, NotifyError, OrderNotifier, SentNotification,
};
pub use order::{
    LifecycleEvent, OrderDetails, OrderError, OrderLineDetail, OrderService, PlaceOrder,
    PlaceOrderLine, StatusCount, apply_event,
};
pub use users::UserService;
