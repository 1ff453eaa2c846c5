//! Order service: creation and lifecycle transitions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use common::{Goods, GoodsId, Money, Order, OrderId, OrderLine, OrderLineId, OrderStatus, UserId};
use serde::{Deserialize, Serialize};
use store::{OrderQuery, ShopStore, StoreTx};

use crate::auth::{Action, Principal, Resource, authorize};
use crate::catalog::reserve_check;
use crate::error::{DomainError, Result};
use crate::ledger;
use crate::notify::{NotificationKind, OrderNotifier};

use super::{LifecycleEvent, apply_event};

/// Current time at the microsecond resolution of the PostgreSQL store, so
/// a returned order equals the one read back later.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// One requested line of a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderLine {
    pub goods_id: GoodsId,
    pub quantity: u32,
}

/// A purchase request. Lines are kept as given, duplicates included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub lines: Vec<PlaceOrderLine>,
}

impl PlaceOrder {
    pub fn new(lines: impl IntoIterator<Item = (GoodsId, u32)>) -> Self {
        Self {
            lines: lines
                .into_iter()
                .map(|(goods_id, quantity)| PlaceOrderLine { goods_id, quantity })
                .collect(),
        }
    }
}

/// An order line joined with the goods it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineDetail {
    #[serde(flatten)]
    pub line: OrderLine,
    pub goods_name: Option<String>,
    pub merchant_id: Option<UserId>,
    pub subtotal: Money,
}

/// An order with its lines resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderLineDetail>,
}

/// Number of orders in one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: usize,
}

fn action_for(event: LifecycleEvent) -> Action {
    match event {
        LifecycleEvent::Pay => Action::PayOrder,
        LifecycleEvent::Ship => Action::ShipOrder,
        LifecycleEvent::Complete => Action::CompleteOrder,
        LifecycleEvent::Cancel => Action::CancelOrder,
    }
}

/// Service for placing orders and moving them through their lifecycle.
///
/// Every operation that touches stock runs in a single store transaction:
/// goods rows are locked, checked and written before the commit, and a
/// failure anywhere rolls the whole operation back.
#[derive(Clone)]
pub struct OrderService<S: ShopStore> {
    store: S,
    notifier: Arc<dyn OrderNotifier>,
}

impl<S> OrderService<S>
where
    S: ShopStore + Clone + 'static,
{
    /// Creates a new order service.
    pub fn new(store: S, notifier: Arc<dyn OrderNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order for the calling customer.
    ///
    /// Locks every referenced goods row, validates it, freezes unit prices,
    /// persists the order with its lines and takes the units out of stock,
    /// all or nothing. The created notification is sent after the commit.
    #[tracing::instrument(skip(self, request), fields(lines = request.lines.len()))]
    pub async fn create_order(&self, principal: &Principal, request: PlaceOrder) -> Result<Order> {
        let started = Instant::now();
        let result = self.place(principal, request).await;
        metrics::histogram!("order_create_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    total = %order.total_amount,
                    "order created"
                );
                self.spawn_notification(NotificationKind::OrderCreated, order.clone());
            }
            Err(e) => {
                metrics::counter!("orders_create_failed_total").increment(1);
                tracing::info!(error = %e, "order creation rejected");
            }
        }
        result
    }

    async fn place(&self, principal: &Principal, request: PlaceOrder) -> Result<Order> {
        authorize(principal, Action::PlaceOrder, Resource::Catalog)?;

        if request.lines.is_empty() {
            return Err(DomainError::validation("order has no lines"));
        }
        if let Some(line) = request.lines.iter().find(|line| line.quantity == 0) {
            return Err(DomainError::validation(format!(
                "quantity must be positive for goods {}",
                line.goods_id
            )));
        }

        let ids: Vec<GoodsId> = request.lines.iter().map(|line| line.goods_id).collect();
        let mut tx = self.store.begin().await?;
        let locked: HashMap<GoodsId, Goods> = tx
            .lock_goods(&ids)
            .await?
            .into_iter()
            .map(|goods| (goods.id, goods))
            .collect();

        let order_id = OrderId::new();
        let mut lines = Vec::with_capacity(request.lines.len());
        for requested in &request.lines {
            let goods = locked.get(&requested.goods_id).ok_or_else(|| {
                DomainError::validation(format!("unknown goods {}", requested.goods_id))
            })?;
            if !goods.is_purchasable() {
                return Err(DomainError::validation(format!(
                    "goods {} is not available for purchase",
                    goods.id
                )));
            }
            reserve_check(&mut tx, goods.id, requested.quantity).await?;

            lines.push(OrderLine {
                id: OrderLineId::new(),
                order_id,
                goods_id: goods.id,
                quantity: requested.quantity,
                unit_price: goods.price,
            });
        }

        let mut order = Order {
            id: order_id,
            customer_id: principal.user_id,
            status: OrderStatus::PendingPayment,
            total_amount: Money::zero(),
            created_at: now(),
            paid_at: None,
            shipped_at: None,
            completed_at: None,
            lines,
        };
        order.total_amount = order
            .lines_total()
            .ok_or_else(|| DomainError::validation("order total overflows"))?;

        tx.insert_order(&order).await?;
        for line in &order.lines {
            ledger::decrement_and_record_sale(&mut tx, line.goods_id, line.quantity).await?;
        }
        tx.commit().await?;

        Ok(order)
    }

    /// Marks a pending order as paid.
    #[tracing::instrument(skip(self))]
    pub async fn pay_order(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        self.transition(principal, order_id, LifecycleEvent::Pay)
            .await
    }

    /// Ships a paid order. Only a merchant selling goods on the order may ship.
    #[tracing::instrument(skip(self))]
    pub async fn ship_order(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        let order = self
            .transition(principal, order_id, LifecycleEvent::Ship)
            .await?;
        self.spawn_notification(NotificationKind::OrderShipped, order.clone());
        Ok(order)
    }

    /// Completes a shipped order.
    #[tracing::instrument(skip(self))]
    pub async fn complete_order(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        self.transition(principal, order_id, LifecycleEvent::Complete)
            .await
    }

    /// Cancels an order that has not shipped and puts its units back in stock.
    /// Sales counters are not reduced.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        self.transition(principal, order_id, LifecycleEvent::Cancel)
            .await
    }

    async fn transition(
        &self,
        principal: &Principal,
        order_id: OrderId,
        event: LifecycleEvent,
    ) -> Result<Order> {
        // Customer and lines never change after creation, so the check can
        // run before the order row is locked.
        let (order, merchants) = self.load_with_merchants(order_id).await?;
        authorize(
            principal,
            action_for(event),
            Resource::Order {
                order: &order,
                merchants: &merchants,
            },
        )?;

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        let from = order.status;
        apply_event(&mut order, event, now())?;

        if event == LifecycleEvent::Cancel {
            let ids: Vec<GoodsId> = order.lines.iter().map(|line| line.goods_id).collect();
            tx.lock_goods(&ids).await?;
            for line in &order.lines {
                ledger::restore_stock(&mut tx, line.goods_id, line.quantity).await?;
            }
        }

        tx.update_order_progress(&order).await?;
        tx.commit().await?;

        metrics::counter!("order_transitions_total", "event" => event.as_str()).increment(1);
        tracing::info!(%order_id, %from, to = %order.status, "order transitioned");
        Ok(order)
    }

    async fn load_with_merchants(&self, order_id: OrderId) -> Result<(Order, Vec<UserId>)> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        let merchants = self.store.order_merchants(order_id).await?;
        Ok((order, merchants))
    }

    /// Loads an order visible to the caller.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        let (order, merchants) = self.load_with_merchants(order_id).await?;
        authorize(
            principal,
            Action::ViewOrder,
            Resource::Order {
                order: &order,
                merchants: &merchants,
            },
        )?;
        Ok(order)
    }

    /// Loads an order with goods names and subtotals per line.
    #[tracing::instrument(skip(self))]
    pub async fn get_order_details(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<OrderDetails> {
        let order = self.get_order(principal, order_id).await?;

        let mut goods: HashMap<GoodsId, Option<Goods>> = HashMap::new();
        for line in &order.lines {
            if !goods.contains_key(&line.goods_id) {
                let found = self.store.get_goods(line.goods_id).await?;
                goods.insert(line.goods_id, found);
            }
        }

        let items = order
            .lines
            .iter()
            .map(|line| {
                let found = goods.get(&line.goods_id).and_then(Option::as_ref);
                OrderLineDetail {
                    line: line.clone(),
                    goods_name: found.map(|g| g.name.clone()),
                    merchant_id: found.map(|g| g.merchant_id),
                    subtotal: line.unit_price.saturating_mul(u64::from(line.quantity)),
                }
            })
            .collect();

        Ok(OrderDetails { order, items })
    }

    /// Orders placed by the caller, newest first.
    pub async fn customer_orders(&self, principal: &Principal) -> Result<Vec<Order>> {
        let query = OrderQuery::new().for_customer(principal.user_id);
        Ok(self.store.list_orders(&query).await?)
    }

    /// Orders containing the calling merchant's goods, optionally in one status.
    pub async fn merchant_orders(
        &self,
        principal: &Principal,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        authorize(
            principal,
            Action::ViewMerchantData,
            Resource::MerchantData(principal.user_id),
        )?;

        let mut query = OrderQuery::new().for_merchant(principal.user_id);
        if let Some(status) = status {
            query = query.with_status(status);
        }
        Ok(self.store.list_orders(&query).await?)
    }

    /// The caller's orders in one status, newest first.
    ///
    /// A customer gets the orders they placed; a merchant gets the orders
    /// containing their goods, through the merchant data check.
    #[tracing::instrument(skip(self))]
    pub async fn orders_by_status(
        &self,
        principal: &Principal,
        status: OrderStatus,
    ) -> Result<Vec<Order>> {
        if principal.is_merchant() {
            return self.merchant_orders(principal, Some(status)).await;
        }
        let query = OrderQuery::new()
            .for_customer(principal.user_id)
            .with_status(status);
        Ok(self.store.list_orders(&query).await?)
    }

    /// Counts the calling merchant's orders per status, in lifecycle order.
    pub async fn merchant_order_count_by_status(
        &self,
        principal: &Principal,
    ) -> Result<Vec<StatusCount>> {
        let orders = self.merchant_orders(principal, None).await?;
        Ok(OrderStatus::ALL
            .into_iter()
            .map(|status| StatusCount {
                status,
                count: orders.iter().filter(|o| o.status == status).count(),
            })
            .collect())
    }

    fn spawn_notification(&self, kind: NotificationKind, order: Order) {
        let store = self.store.clone();
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            deliver(&store, notifier.as_ref(), kind, &order).await;
        });
    }
}

/// Sends one notification to the order's customer. Failures are logged and
/// counted, never returned.
async fn deliver<S: ShopStore>(
    store: &S,
    notifier: &dyn OrderNotifier,
    kind: NotificationKind,
    order: &Order,
) {
    let label = kind.as_str();
    let recipient = match store.get_user(order.customer_id).await {
        Ok(Some(user)) => user.email,
        Ok(None) => {
            tracing::warn!(
                order_id = %order.id,
                customer_id = %order.customer_id,
                kind = label,
                "notification skipped: customer not registered"
            );
            metrics::counter!("order_notifications_failed_total", "kind" => label).increment(1);
            return;
        }
        Err(e) => {
            tracing::warn!(order_id = %order.id, kind = label, error = %e, "notification recipient lookup failed");
            metrics::counter!("order_notifications_failed_total", "kind" => label).increment(1);
            return;
        }
    };

    let result = match kind {
        NotificationKind::OrderCreated => notifier.notify_order_created(order, &recipient).await,
        NotificationKind::OrderShipped => notifier.notify_order_shipped(order, &recipient).await,
    };

    match result {
        Ok(()) => {
            metrics::counter!("order_notifications_total", "kind" => label).increment(1);
        }
        Err(e) => {
            tracing::warn!(order_id = %order.id, kind = label, error = %e, "notification failed");
            metrics::counter!("order_notifications_failed_total", "kind" => label).increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::{GoodsStatus, NewUser, Role};
    use store::InMemoryStore;

    use super::*;
    use crate::notify::InMemoryNotifier;
    use crate::order::OrderError;
    use crate::users::UserService;

    struct Fixture {
        service: OrderService<InMemoryStore>,
        notifier: InMemoryNotifier,
        customer: Principal,
        merchant: Principal,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let notifier = InMemoryNotifier::new();
        let users = UserService::new(store.clone());
        let customer = users
            .register_user(NewUser {
                nickname: "alice".to_string(),
                email: "alice@example.com".to_string(),
                role: Role::Customer,
                address: "1 Main St".to_string(),
                avatar_url: None,
            })
            .await
            .unwrap();
        Fixture {
            service: OrderService::new(store, Arc::new(notifier.clone())),
            notifier,
            customer: Principal::customer(customer.id),
            merchant: Principal::merchant(UserId::new()),
        }
    }

    async fn seed(fx: &Fixture, cents: i64, remaining: u32) -> GoodsId {
        let goods = Goods {
            id: GoodsId::new(),
            merchant_id: fx.merchant.user_id,
            name: "Lamp".to_string(),
            description: String::new(),
            price: Money::from_cents(cents),
            remaining,
            sales: 0,
            status: GoodsStatus::Active,
            image_url: None,
        };
        let mut tx = fx.service.store().begin().await.unwrap();
        tx.insert_goods(&goods).await.unwrap();
        tx.commit().await.unwrap();
        goods.id
    }

    #[tokio::test]
    async fn test_create_order_freezes_prices() {
        let fx = fixture().await;
        let lamp = seed(&fx, 1000, 5).await;

        let order = fx
            .service
            .create_order(&fx.customer, PlaceOrder::new([(lamp, 3)]))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.total_amount, Money::from_cents(3000));
        assert_eq!(order.lines[0].unit_price, Money::from_cents(1000));
        assert_eq!(order.customer_id, fx.customer.user_id);
    }

    #[tokio::test]
    async fn test_created_notification_goes_to_customer_email() {
        let fx = fixture().await;
        let lamp = seed(&fx, 1000, 5).await;

        let order = fx
            .service
            .create_order(&fx.customer, PlaceOrder::new([(lamp, 1)]))
            .await
            .unwrap();

        assert!(
            fx.notifier
                .wait_for_attempts(1, Duration::from_secs(2))
                .await
        );
        let sent = fx.notifier.sent();
        assert_eq!(sent[0].kind, NotificationKind::OrderCreated);
        assert_eq!(sent[0].order_id, order.id);
        assert_eq!(sent[0].recipient, "alice@example.com");
    }

    #[tokio::test]
    async fn test_empty_order_is_rejected() {
        let fx = fixture().await;
        let result = fx
            .service
            .create_order(&fx.customer, PlaceOrder { lines: vec![] })
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_zero_quantity_is_rejected() {
        let fx = fixture().await;
        let lamp = seed(&fx, 1000, 5).await;
        let result = fx
            .service
            .create_order(&fx.customer, PlaceOrder::new([(lamp, 0)]))
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_pay_then_complete_requires_ship() {
        let fx = fixture().await;
        let lamp = seed(&fx, 1000, 5).await;
        let order = fx
            .service
            .create_order(&fx.customer, PlaceOrder::new([(lamp, 1)]))
            .await
            .unwrap();

        fx.service.pay_order(&fx.customer, order.id).await.unwrap();
        let err = fx
            .service
            .complete_order(&fx.customer, order.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidStateTransition {
                current: OrderStatus::Paid,
                requested: LifecycleEvent::Complete,
            })
        ));
    }

    #[tokio::test]
    async fn test_stranger_cannot_pay() {
        let fx = fixture().await;
        let lamp = seed(&fx, 1000, 5).await;
        let order = fx
            .service
            .create_order(&fx.customer, PlaceOrder::new([(lamp, 1)]))
            .await
            .unwrap();

        let result = fx
            .service
            .pay_order(&Principal::customer(UserId::new()), order.id)
            .await;
        assert!(matches!(result, Err(DomainError::Forbidden { .. })));
        let stored = fx.service.store().get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let fx = fixture().await;
        let result = fx.service.pay_order(&fx.customer, OrderId::new()).await;
        assert!(matches!(result, Err(DomainError::NotFound { entity: "order", .. })));
    }

    #[tokio::test]
    async fn test_order_details_resolve_goods() {
        let fx = fixture().await;
        let lamp = seed(&fx, 1000, 5).await;
        let order = fx
            .service
            .create_order(&fx.customer, PlaceOrder::new([(lamp, 2)]))
            .await
            .unwrap();

        let details = fx
            .service
            .get_order_details(&fx.merchant, order.id)
            .await
            .unwrap();
        assert_eq!(details.items.len(), 1);
        assert_eq!(details.items[0].goods_name.as_deref(), Some("Lamp"));
        assert_eq!(details.items[0].merchant_id, Some(fx.merchant.user_id));
        assert_eq!(details.items[0].subtotal, Money::from_cents(2000));
    }

    #[tokio::test]
    async fn test_merchant_order_counts() {
        let fx = fixture().await;
        let lamp = seed(&fx, 1000, 5).await;
        let first = fx
            .service
            .create_order(&fx.customer, PlaceOrder::new([(lamp, 1)]))
            .await
            .unwrap();
        fx.service
            .create_order(&fx.customer, PlaceOrder::new([(lamp, 1)]))
            .await
            .unwrap();
        fx.service.pay_order(&fx.customer, first.id).await.unwrap();

        let counts = fx
            .service
            .merchant_order_count_by_status(&fx.merchant)
            .await
            .unwrap();
        assert_eq!(counts[0], StatusCount { status: OrderStatus::PendingPayment, count: 1 });
        assert_eq!(counts[1], StatusCount { status: OrderStatus::Paid, count: 1 });
        assert_eq!(counts.iter().map(|c| c.count).sum::<usize>(), 2);

        let customer_view = fx.service.merchant_order_count_by_status(&fx.customer).await;
        assert!(matches!(customer_view, Err(DomainError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_timestamps_have_microsecond_resolution() {
        let fx = fixture().await;
        let lamp = seed(&fx, 1000, 5).await;
        let order = fx
            .service
            .create_order(&fx.customer, PlaceOrder::new([(lamp, 1)]))
            .await
            .unwrap();
        let paid = fx.service.pay_order(&fx.customer, order.id).await.unwrap();

        assert_eq!(order.created_at.timestamp_subsec_nanos() % 1_000, 0);
        let paid_at = paid.paid_at.unwrap();
        assert_eq!(paid_at.timestamp_subsec_nanos() % 1_000, 0);
        assert_eq!(paid_at, paid_at.trunc_subsecs(6));
    }

    #[tokio::test]
    async fn test_orders_by_status_is_scoped_to_caller() {
        let fx = fixture().await;
        let lamp = seed(&fx, 1000, 10).await;
        let mut placed = Vec::new();
        for _ in 0..3 {
            let order = fx
                .service
                .create_order(&fx.customer, PlaceOrder::new([(lamp, 1)]))
                .await
                .unwrap();
            placed.push(order.id);
        }
        fx.service.pay_order(&fx.customer, placed[0]).await.unwrap();

        let pending = fx
            .service
            .orders_by_status(&fx.customer, OrderStatus::PendingPayment)
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|o| o.id != placed[0]));
        assert!(pending.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let merchant_paid = fx
            .service
            .orders_by_status(&fx.merchant, OrderStatus::Paid)
            .await
            .unwrap();
        assert_eq!(merchant_paid.len(), 1);
        assert_eq!(merchant_paid[0].id, placed[0]);

        let stranger = Principal::customer(UserId::new());
        let seen = fx
            .service
            .orders_by_status(&stranger, OrderStatus::PendingPayment)
            .await
            .unwrap();
        assert!(seen.is_empty());

        let rival = Principal::merchant(UserId::new());
        let rival_view = fx
            .service
            .orders_by_status(&rival, OrderStatus::Paid)
            .await
            .unwrap();
        assert!(rival_view.is_empty());
    }

    #[tokio::test]
    async fn test_overflowing_total_is_rejected() {
        let fx = fixture().await;
        let dear = seed(&fx, i64::MAX / 2, 5).await;
        let result = fx
            .service
            .create_order(&fx.customer, PlaceOrder::new([(dear, 3)]))
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));

        let goods = fx.service.store().get_goods(dear).await.unwrap().unwrap();
        assert_eq!(goods.remaining, 5);
        assert_eq!(goods.sales, 0);
    }
}
