//! Applying lifecycle events to an order record.

use chrono::{DateTime, Utc};
use common::Order;

use super::{LifecycleEvent, OrderError};

/// Moves the order to the status `event` leads to and stamps the matching
/// timestamp. On error the order is left untouched.
pub fn apply_event(
    order: &mut Order,
    event: LifecycleEvent,
    at: DateTime<Utc>,
) -> Result<(), OrderError> {
    let next = event.next_status(order.status)?;

    match event {
        LifecycleEvent::Pay => order.paid_at = Some(at),
        LifecycleEvent::Ship => order.shipped_at = Some(at),
        LifecycleEvent::Complete => order.completed_at = Some(at),
        LifecycleEvent::Cancel => {}
    }
    order.status = next;
    Ok(())
}
