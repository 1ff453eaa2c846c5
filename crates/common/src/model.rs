//! Persistent records of the shop core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{GoodsId, Money, OrderId, OrderLineId, UserId};

/// Returned when a stored enum label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares `as_str`, `Display` and `FromStr` for a fieldless enum with
/// fixed storage labels.
macro_rules! labelled_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            /// Returns the storage label of this value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Role of a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Merchant,
}

labelled_enum!(Role, "role", { Customer => "CUSTOMER", Merchant => "MERCHANT" });

/// Visibility of a goods entry. Only gates purchasability, never stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoodsStatus {
    #[default]
    Active,
    Inactive,
}

labelled_enum!(GoodsStatus, "goods status", { Active => "ACTIVE", Inactive => "INACTIVE" });

/// Status of an order in its lifecycle.
///
/// ```text
/// PendingPayment ──► Paid ──► Shipped ──► Completed
///       │             │
///       └─────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    PendingPayment,
    Paid,
    Shipped,
    Completed,
    Cancelled,
}

labelled_enum!(OrderStatus, "order status", {
    PendingPayment => "PENDING_PAYMENT",
    Paid => "PAID",
    Shipped => "SHIPPED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

impl OrderStatus {
    /// Every status in lifecycle order.
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::PendingPayment,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// A registered user. Credentials live with the identity layer, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub nickname: String,
    pub email: String,
    pub role: Role,
    pub address: String,
    pub avatar_url: Option<String>,
}

/// Registration data for a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub nickname: String,
    pub email: String,
    pub role: Role,
    pub address: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// A goods entry in the catalog, owned by a merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goods {
    pub id: GoodsId,
    pub merchant_id: UserId,
    pub name: String,
    pub description: String,
    pub price: Money,
    /// Units currently purchasable.
    pub remaining: u32,
    /// Units ever sold. Cancellation never lowers this.
    pub sales: u32,
    pub status: GoodsStatus,
    pub image_url: Option<String>,
}

impl Goods {
    /// Returns true if the goods can be put into a new order.
    pub fn is_purchasable(&self) -> bool {
        self.status == GoodsStatus::Active
    }

    /// Returns true if the goods is listed and has stock left.
    pub fn is_available(&self) -> bool {
        self.is_purchasable() && self.remaining > 0
    }

    /// Value of the remaining stock at the current price.
    pub fn stock_value(&self) -> Money {
        self.price.saturating_mul(u64::from(self.remaining))
    }

    /// Value of all units ever sold at the current price.
    pub fn sales_value(&self) -> Money {
        self.price.saturating_mul(u64::from(self.sales))
    }
}

/// One line of an order. The unit price is frozen at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub goods_id: GoodsId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    /// Returns `quantity * unit_price`, or `None` on overflow.
    pub fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// An order together with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Sum of line subtotals, or `None` on overflow.
    pub fn lines_total(&self) -> Option<Money> {
        self.lines
            .iter()
            .try_fold(Money::zero(), |acc, line| acc.checked_add(line.subtotal()?))
    }

    /// Returns true if any line references the goods.
    pub fn contains_goods(&self, goods_id: GoodsId) -> bool {
        self.lines.iter().any(|line| line.goods_id == goods_id)
    }
}
