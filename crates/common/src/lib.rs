//! Shared types for the shop core.
//!
//! Everything here is plain data: typed identifiers, [`Money`], and the
//! goods/order/user records that the store persists and the domain mutates.
//! Relations between records are expressed as id fields, never references.

pub mod model;
pub mod money;
pub mod types;

pub use model::{
    Goods, GoodsStatus, NewUser, Order, OrderLine, OrderStatus, ParseEnumError, Role, User,
};
pub use money::Money;
pub use types::{GoodsId, OrderId, OrderLineId, UserId};
