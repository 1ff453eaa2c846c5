//! Order notification hook.
//!
//! Notifications are sent after the order transaction has committed. A
//! failed send is logged and counted by the caller; it never reaches the
//! customer's request and never rolls anything back.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::{Money, Order, OrderId};
use thiserror::Error;
use tokio::sync::Notify;

/// Errors that can occur when sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The delivery channel rejected the message.
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Which lifecycle moment a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    OrderCreated,
    OrderShipped,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderCreated => "order_created",
            NotificationKind::OrderShipped => "order_shipped",
        }
    }
}

/// Trait for delivering order notifications to customers.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    /// Tells the customer their order was placed.
    async fn notify_order_created(&self, order: &Order, recipient: &str)
    -> Result<(), NotifyError>;

    /// Tells the customer their order is on its way.
    async fn notify_order_shipped(&self, order: &Order, recipient: &str)
    -> Result<(), NotifyError>;
}

/// Notifier that writes a structured log line per message.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl OrderNotifier for LogNotifier {
    async fn notify_order_created(
        &self,
        order: &Order,
        recipient: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %order.id,
            recipient,
            total = %order.total_amount,
            lines = order.lines.len(),
            "order created notification"
        );
        Ok(())
    }

    async fn notify_order_shipped(
        &self,
        order: &Order,
        recipient: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(order_id = %order.id, recipient, "order shipped notification");
        Ok(())
    }
}

/// A notification captured by [`InMemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub kind: NotificationKind,
    pub order_id: OrderId,
    pub recipient: String,
    pub total_amount: Money,
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<SentNotification>,
    attempts: usize,
    fail: bool,
}

/// Notifier that records messages, for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
    changed: Arc<Notify>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following send fail.
    pub fn set_fail(&self, fail: bool) {
        self.lock().fail = fail;
    }

    /// Returns the successfully sent notifications.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.lock().sent.clone()
    }

    /// Returns the number of sends attempted, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Waits until at least `count` sends were attempted. Returns false if
    /// that did not happen within `timeout`.
    pub async fn wait_for_attempts(&self, count: usize, timeout: std::time::Duration) -> bool {
        let wait = async {
            loop {
                let changed = self.changed.notified();
                if self.attempts() >= count {
                    return;
                }
                changed.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryNotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(
        &self,
        kind: NotificationKind,
        order: &Order,
        recipient: &str,
    ) -> Result<(), NotifyError> {
        let result = {
            let mut state = self.lock();
            state.attempts += 1;
            if state.fail {
                Err(NotifyError::Delivery(format!(
                    "mailbox {recipient} unavailable"
                )))
            } else {
                state.sent.push(SentNotification {
                    kind,
                    order_id: order.id,
                    recipient: recipient.to_string(),
                    total_amount: order.total_amount,
                });
                Ok(())
            }
        };
        self.changed.notify_waiters();
        result
    }
}

#[async_trait]
impl OrderNotifier for InMemoryNotifier {
    async fn notify_order_created(
        &self,
        order: &Order,
        recipient: &str,
    ) -> Result<(), NotifyError> {
        self.record(NotificationKind::OrderCreated, order, recipient)
    }

    async fn notify_order_shipped(
        &self,
        order: &Order,
        recipient: &str,
    ) -> Result<(), NotifyError> {
        self.record(NotificationKind::OrderShipped, order, recipient)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use common::{OrderStatus, UserId};

    use super::*;

    fn order() -> Order {
        Order {
            id: OrderId::new(),
            customer_id: UserId::new(),
            status: OrderStatus::PendingPayment,
            total_amount: Money::from_cents(3000),
            created_at: Utc::now(),
            paid_at: None,
            shipped_at: None,
            completed_at: None,
            lines: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_records_sends() {
        let notifier = InMemoryNotifier::new();
        let order = order();

        notifier
            .notify_order_created(&order, "alice@example.com")
            .await
            .unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::OrderCreated);
        assert_eq!(sent[0].recipient, "alice@example.com");
        assert_eq!(sent[0].total_amount, Money::from_cents(3000));
    }

    #[tokio::test]
    async fn test_fail_flag_counts_attempt() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail(true);

        let result = notifier
            .notify_order_shipped(&order(), "alice@example.com")
            .await;

        assert!(matches!(result, Err(NotifyError::Delivery(_))));
        assert!(notifier.sent().is_empty());
        assert_eq!(notifier.attempts(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_attempts_from_other_task() {
        let notifier = InMemoryNotifier::new();
        let sender = notifier.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sender
                .notify_order_created(&order(), "bob@example.com")
                .await
                .unwrap();
        });

        assert!(
            notifier
                .wait_for_attempts(1, Duration::from_secs(2))
                .await
        );
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let notifier = InMemoryNotifier::new();
        assert!(
            !notifier
                .wait_for_attempts(1, Duration::from_millis(20))
                .await
        );
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        assert!(
            LogNotifier
                .notify_order_created(&order(), "carol@example.com")
                .await
                .is_ok()
        );
    }
}
