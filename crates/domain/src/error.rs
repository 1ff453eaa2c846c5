//! Domain error types.

use common::{GoodsId, UserId};
use store::StoreError;
use thiserror::Error;

use crate::auth::Action;
use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Not enough stock to fulfil a line.
    #[error("Insufficient stock for goods {goods_id}: requested {requested}, remaining {remaining}")]
    InsufficientStock {
        goods_id: GoodsId,
        requested: u32,
        remaining: u32,
    },

    /// An error occurred in the order state machine.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The request is malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The authorization predicate refused the call.
    #[error("Forbidden: user {user_id} may not {action}")]
    Forbidden { user_id: UserId, action: Action },

    /// Goods with order history cannot be deleted.
    #[error("Goods {goods_id} is referenced by existing orders")]
    GoodsReferenced { goods_id: GoodsId },

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        DomainError::Validation(reason.into())
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
