//! Read-only reporting over the shop store.
//!
//! Reports are computed on demand from goods and order snapshots; nothing
//! here writes to the store.

pub mod error;
pub mod service;
pub mod stats;

pub use error::{ReportError, Result};
pub use service::ReportService;
pub use stats::{GoodsSales, MerchantGoodsStats, RankedGoods, SalesReport};
