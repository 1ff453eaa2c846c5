use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Goods, GoodsId, GoodsStatus, Money, Order, OrderId, OrderStatus, User, UserId};

use crate::Result;

/// Criteria for catalog listings. Empty criteria match every goods entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoodsFilter {
    pub merchant_id: Option<UserId>,
    pub status: Option<GoodsStatus>,
    /// Case-insensitive substring of the name.
    pub name_contains: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    /// Only goods with `remaining > 0`.
    pub in_stock: bool,
}

impl GoodsFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Active goods with stock left.
    pub fn available() -> Self {
        Self::new().with_status(GoodsStatus::Active).in_stock()
    }

    pub fn for_merchant(mut self, merchant_id: UserId) -> Self {
        self.merchant_id = Some(merchant_id);
        self
    }

    pub fn with_status(mut self, status: GoodsStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into());
        self
    }

    pub fn price_between(mut self, min: Money, max: Money) -> Self {
        self.min_price = Some(min);
        self.max_price = Some(max);
        self
    }

    pub fn in_stock(mut self) -> Self {
        self.in_stock = true;
        self
    }

    /// Returns true if the goods satisfies every criterion.
    pub fn matches(&self, goods: &Goods) -> bool {
        if let Some(merchant_id) = self.merchant_id
            && goods.merchant_id != merchant_id
        {
            return false;
        }
        if let Some(status) = self.status
            && goods.status != status
        {
            return false;
        }
        if let Some(ref needle) = self.name_contains
            && !goods.name.to_lowercase().contains(&needle.to_lowercase())
        {
            return false;
        }
        if let Some(min) = self.min_price
            && goods.price < min
        {
            return false;
        }
        if let Some(max) = self.max_price
            && goods.price > max
        {
            return false;
        }
        !(self.in_stock && goods.remaining == 0)
    }
}

/// Criteria for order listings. Results are ordered newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub customer_id: Option<UserId>,
    /// Orders with at least one line of this merchant's goods.
    pub merchant_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    /// Inclusive lower bound on the creation time.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the creation time.
    pub created_to: Option<DateTime<Utc>>,
}

impl OrderQuery {
    /// Creates a query matching every order.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_customer(mut self, customer_id: UserId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn for_merchant(mut self, merchant_id: UserId) -> Self {
        self.merchant_id = Some(merchant_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self.created_to = Some(to);
        self
    }

    /// Checks every criterion except `merchant_id`, which needs goods lookups.
    pub fn matches_order(&self, order: &Order) -> bool {
        if let Some(customer_id) = self.customer_id
            && order.customer_id != customer_id
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(from) = self.created_from
            && order.created_at < from
        {
            return false;
        }
        if let Some(to) = self.created_to
            && order.created_at > to
        {
            return false;
        }
        true
    }
}

/// A unit of work against the store.
///
/// Reads made through a transaction lock the rows they return until the
/// transaction ends. Dropping a transaction without calling
/// [`StoreTx::commit`] rolls back every write made through it.
#[async_trait]
pub trait StoreTx: Send {
    /// Locks and returns the goods rows with the given ids.
    ///
    /// Rows are locked in ascending id order so concurrent transactions over
    /// overlapping goods cannot deadlock. Unknown ids are skipped; the result
    /// is sorted by id and holds each id at most once.
    async fn lock_goods(&mut self, ids: &[GoodsId]) -> Result<Vec<Goods>>;

    /// Inserts a new goods row.
    async fn insert_goods(&mut self, goods: &Goods) -> Result<()>;

    /// Overwrites every mutable column of an existing goods row.
    async fn update_goods(&mut self, goods: &Goods) -> Result<()>;

    /// Writes only the inventory columns of a goods row.
    async fn set_goods_inventory(&mut self, id: GoodsId, remaining: u32, sales: u32)
    -> Result<()>;

    /// Returns true if any order line references the goods.
    async fn goods_referenced(&mut self, id: GoodsId) -> Result<bool>;

    /// Deletes a goods row. Returns false if it did not exist.
    async fn delete_goods(&mut self, id: GoodsId) -> Result<bool>;

    /// Inserts an order together with all of its lines.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Locks and returns an order with its lines.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Writes the status and lifecycle timestamps of an order.
    async fn update_order_progress(&mut self, order: &Order) -> Result<()>;

    /// Commits every write made through this transaction.
    async fn commit(self) -> Result<()>;
}

/// Core trait for store implementations.
///
/// All implementations must be thread-safe (Send + Sync). Callers holding a
/// transaction must not issue reads through the store itself until the
/// transaction ends; use the transaction instead.
#[async_trait]
pub trait ShopStore: Send + Sync {
    /// Transaction type opened by [`ShopStore::begin`].
    type Tx: StoreTx + 'static;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Registers a user. Fails with `Conflict` on a duplicate nickname or e-mail.
    async fn insert_user(&self, user: &User) -> Result<()>;

    /// Retrieves a user by id.
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Retrieves a goods entry by id without locking it.
    async fn get_goods(&self, id: GoodsId) -> Result<Option<Goods>>;

    /// Lists goods matching the filter, ordered by name.
    async fn list_goods(&self, filter: &GoodsFilter) -> Result<Vec<Goods>>;

    /// Retrieves an order with its lines.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists orders matching the query, newest first.
    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;

    /// Returns the distinct merchants owning goods on the order's lines.
    async fn order_merchants(&self, id: OrderId) -> Result<Vec<UserId>>;
}
