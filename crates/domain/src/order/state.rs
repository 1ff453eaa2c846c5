//! Order state machine.

use common::OrderStatus;
use serde::{Deserialize, Serialize};

use super::OrderError;

/// An event that moves an existing order through its lifecycle.
///
/// ```text
/// PendingPayment ──pay──► Paid ──ship──► Shipped ──complete──► Completed
///       │                  │
///       └──────cancel──────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Pay,
    Ship,
    Complete,
    Cancel,
}

impl LifecycleEvent {
    /// Returns the status this event leads to from `current`, if legal.
    pub fn target(&self, current: OrderStatus) -> Option<OrderStatus> {
        use LifecycleEvent::*;
        use OrderStatus::*;

        match (current, self) {
            (PendingPayment, Pay) => Some(Paid),
            (Paid, Ship) => Some(Shipped),
            (Shipped, Complete) => Some(Completed),
            (PendingPayment | Paid, Cancel) => Some(Cancelled),
            _ => None,
        }
    }

    /// Checks the transition table, returning the next status.
    pub fn next_status(&self, current: OrderStatus) -> Result<OrderStatus, OrderError> {
        self.target(current)
            .ok_or(OrderError::InvalidStateTransition {
                current,
                requested: *self,
            })
    }

    /// Returns the event name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Pay => "pay",
            LifecycleEvent::Ship => "ship",
            LifecycleEvent::Complete => "complete",
            LifecycleEvent::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
