//! Order lifecycle: state machine, transitions and the order service.

mod lifecycle;
mod service;
mod state;

pub use lifecycle::apply_event;
pub use service::{
    OrderDetails, OrderLineDetail, OrderService, PlaceOrder, PlaceOrderLine, StatusCount,
};
pub use state::LifecycleEvent;

use common::OrderStatus;
use thiserror::Error;

/// Errors raised by the order state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The event is not legal from the order's current status.
    #[error("Invalid state transition: cannot {requested} from {current}")]
    InvalidStateTransition {
        current: OrderStatus,
        requested: LifecycleEvent,
    },
}
