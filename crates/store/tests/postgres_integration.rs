//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and truncate the tables
//! before each test, so they run serially.
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{
    Goods, GoodsId, GoodsStatus, Money, Order, OrderId, OrderLine, OrderLineId, OrderStatus, Role,
    User, UserId,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{GoodsFilter, OrderQuery, PostgresStore, ShopStore, StoreError, StoreTx};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_lines, orders, goods, users")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn goods(merchant_id: UserId, name: &str, cents: i64, remaining: u32) -> Goods {
    Goods {
        id: GoodsId::new(),
        merchant_id,
        name: name.to_string(),
        description: format!("{name} description"),
        price: Money::from_cents(cents),
        remaining,
        sales: 0,
        status: GoodsStatus::Active,
        image_url: None,
    }
}

fn order_for(customer_id: UserId, items: &[(&Goods, u32)]) -> Order {
    let id = OrderId::new();
    let lines: Vec<OrderLine> = items
        .iter()
        .map(|(goods, quantity)| OrderLine {
            id: OrderLineId::new(),
            order_id: id,
            goods_id: goods.id,
            quantity: *quantity,
            unit_price: goods.price,
        })
        .collect();
    let total_amount = lines.iter().filter_map(OrderLine::subtotal).sum();
    Order {
        id,
        customer_id,
        status: OrderStatus::PendingPayment,
        total_amount,
        created_at: Utc::now(),
        paid_at: None,
        shipped_at: None,
        completed_at: None,
        lines,
    }
}

async fn seed_goods(store: &PostgresStore, goods: &Goods) {
    let mut tx = store.begin().await.unwrap();
    tx.insert_goods(goods).await.unwrap();
    tx.commit().await.unwrap();
}

async fn seed_order(store: &PostgresStore, order: &Order) {
    let mut tx = store.begin().await.unwrap();
    tx.insert_order(order).await.unwrap();
    tx.commit().await.unwrap();
}

#[tokio::test]
#[serial]
async fn goods_roundtrip_through_transaction() {
    let store = get_test_store().await;
    let lamp = goods(UserId::new(), "Desk lamp", 1999, 5);
    seed_goods(&store, &lamp).await;

    let loaded = store.get_goods(lamp.id).await.unwrap().unwrap();
    assert_eq!(loaded, lamp);
}

#[tokio::test]
#[serial]
async fn rolled_back_transaction_leaves_no_trace() {
    let store = get_test_store().await;
    let lamp = goods(UserId::new(), "Desk lamp", 1999, 5);
    seed_goods(&store, &lamp).await;

    {
        let mut tx = store.begin().await.unwrap();
        tx.set_goods_inventory(lamp.id, 0, 5).await.unwrap();
        // dropped without commit
    }

    let loaded = store.get_goods(lamp.id).await.unwrap().unwrap();
    assert_eq!(loaded.remaining, 5);
    assert_eq!(loaded.sales, 0);
}

#[tokio::test]
#[serial]
async fn lock_goods_returns_rows_in_id_order() {
    let store = get_test_store().await;
    let merchant = UserId::new();
    let a = goods(merchant, "a", 100, 1);
    let b = goods(merchant, "b", 100, 1);
    seed_goods(&store, &a).await;
    seed_goods(&store, &b).await;

    let mut tx = store.begin().await.unwrap();
    let locked = tx
        .lock_goods(&[b.id, a.id, b.id, GoodsId::new()])
        .await
        .unwrap();
    let ids: Vec<GoodsId> = locked.iter().map(|g| g.id).collect();

    let mut expected = vec![a.id, b.id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
#[serial]
async fn negative_stock_is_rejected_by_check_constraint() {
    let store = get_test_store().await;
    let lamp = goods(UserId::new(), "Desk lamp", 1999, 5);
    seed_goods(&store, &lamp).await;

    let result = sqlx::query("UPDATE goods SET remaining = -1 WHERE id = $1")
        .bind(lamp.id.as_uuid())
        .execute(store.pool())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
#[serial]
async fn order_with_lines_roundtrip() {
    let store = get_test_store().await;
    let merchant = UserId::new();
    let lamp = goods(merchant, "Desk lamp", 1000, 5);
    let chair = goods(merchant, "Chair", 2500, 5);
    seed_goods(&store, &lamp).await;
    seed_goods(&store, &chair).await;

    let order = order_for(UserId::new(), &[(&lamp, 2), (&chair, 1), (&lamp, 1)]);
    seed_order(&store, &order).await;

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.lines, order.lines);
    assert_eq!(loaded.total_amount, Money::from_cents(5500));
    assert_eq!(loaded.status, OrderStatus::PendingPayment);
}

#[tokio::test]
#[serial]
async fn order_progress_is_persisted() {
    let store = get_test_store().await;
    let lamp = goods(UserId::new(), "Desk lamp", 1000, 5);
    seed_goods(&store, &lamp).await;
    let order = order_for(UserId::new(), &[(&lamp, 1)]);
    seed_order(&store, &order).await;

    let mut tx = store.begin().await.unwrap();
    let mut locked = tx.lock_order(order.id).await.unwrap().unwrap();
    locked.status = OrderStatus::Paid;
    locked.paid_at = Some(Utc::now());
    tx.update_order_progress(&locked).await.unwrap();
    tx.commit().await.unwrap();

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Paid);
    assert!(loaded.paid_at.is_some());
    assert_eq!(loaded.lines.len(), 1);
}

#[tokio::test]
#[serial]
async fn delete_referenced_goods_is_restricted() {
    let store = get_test_store().await;
    let lamp = goods(UserId::new(), "Desk lamp", 1000, 5);
    seed_goods(&store, &lamp).await;
    seed_order(&store, &order_for(UserId::new(), &[(&lamp, 1)])).await;

    let mut tx = store.begin().await.unwrap();
    assert!(tx.goods_referenced(lamp.id).await.unwrap());
    let result = tx.delete_goods(lamp.id).await;
    assert!(matches!(
        result,
        Err(StoreError::Conflict { ref constraint }) if constraint == "order_lines_goods_id_fkey"
    ));
}

#[tokio::test]
#[serial]
async fn duplicate_nickname_conflicts() {
    let store = get_test_store().await;
    let user = User {
        id: UserId::new(),
        nickname: "alice".to_string(),
        email: "alice@example.com".to_string(),
        role: Role::Customer,
        address: "1 Main St".to_string(),
        avatar_url: None,
    };
    store.insert_user(&user).await.unwrap();

    let clash = User {
        id: UserId::new(),
        email: "other@example.com".to_string(),
        ..user.clone()
    };
    let result = store.insert_user(&clash).await;
    assert!(matches!(
        result,
        Err(StoreError::Conflict { ref constraint }) if constraint == "users_nickname_key"
    ));

    assert_eq!(store.get_user(user.id).await.unwrap(), Some(user));
}

#[tokio::test]
#[serial]
async fn list_goods_applies_filter() {
    let store = get_test_store().await;
    let merchant = UserId::new();
    let lamp = goods(merchant, "Desk lamp", 1000, 5);
    let sold_out = goods(merchant, "Floor lamp", 3000, 0);
    let mut hidden = goods(merchant, "Lamp shade", 500, 3);
    hidden.status = GoodsStatus::Inactive;
    let other = goods(UserId::new(), "Chair", 2000, 2);
    for g in [&lamp, &sold_out, &hidden, &other] {
        seed_goods(&store, g).await;
    }

    let available = store
        .list_goods(&GoodsFilter::available().name_contains("LAMP"))
        .await
        .unwrap();
    assert_eq!(available, vec![lamp.clone()]);

    let mine = store
        .list_goods(&GoodsFilter::new().for_merchant(merchant))
        .await
        .unwrap();
    let names: Vec<&str> = mine.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["Desk lamp", "Floor lamp", "Lamp shade"]);

    let priced = store
        .list_goods(&GoodsFilter::new().price_between(Money::from_cents(1000), Money::from_cents(2000)))
        .await
        .unwrap();
    assert_eq!(priced.len(), 2);
}

#[tokio::test]
#[serial]
async fn list_orders_by_merchant_and_status() {
    let store = get_test_store().await;
    let merchant = UserId::new();
    let customer = UserId::new();
    let lamp = goods(merchant, "Desk lamp", 1000, 5);
    let chair = goods(UserId::new(), "Chair", 2500, 5);
    seed_goods(&store, &lamp).await;
    seed_goods(&store, &chair).await;

    let first = order_for(customer, &[(&lamp, 1)]);
    seed_order(&store, &first).await;
    let mut second = order_for(customer, &[(&chair, 1), (&lamp, 1)]);
    second.created_at = first.created_at + chrono::Duration::seconds(1);
    seed_order(&store, &second).await;
    seed_order(&store, &order_for(customer, &[(&chair, 2)])).await;

    let merchant_orders = store
        .list_orders(&OrderQuery::new().for_merchant(merchant))
        .await
        .unwrap();
    let ids: Vec<OrderId> = merchant_orders.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
    assert_eq!(merchant_orders[0].lines.len(), 2);

    let pending = store
        .list_orders(&OrderQuery::new().for_customer(customer).with_status(OrderStatus::PendingPayment))
        .await
        .unwrap();
    assert_eq!(pending.len(), 3);

    let merchants = store.order_merchants(second.id).await.unwrap();
    let mut expected = vec![merchant, chair.merchant_id];
    expected.sort();
    assert_eq!(merchants, expected);
}

/// Locks one goods row, checks stock and takes `quantity` units, the way order
/// creation does. Returns whether the units were taken.
async fn take_units(store: PostgresStore, id: GoodsId, quantity: u32) -> bool {
    let mut tx = store.begin().await.unwrap();
    let locked = tx.lock_goods(&[id]).await.unwrap();
    let row = &locked[0];
    if row.remaining < quantity {
        return false;
    }
    tx.set_goods_inventory(id, row.remaining - quantity, row.sales + quantity)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    true
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn locked_row_blocks_second_transaction_until_commit() {
    let store = get_test_store().await;
    let lamp = goods(UserId::new(), "Desk lamp", 1000, 5);
    seed_goods(&store, &lamp).await;

    let mut first = store.begin().await.unwrap();
    let held = first.lock_goods(&[lamp.id]).await.unwrap();
    assert_eq!(held[0].remaining, 5);

    let contender = store.clone();
    let id = lamp.id;
    let second = tokio::spawn(async move {
        let mut tx = contender.begin().await.unwrap();
        let seen = tx.lock_goods(&[id]).await.unwrap();
        tx.commit().await.unwrap();
        seen[0].remaining
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!second.is_finished(), "second lock must wait for the first transaction");

    first.set_goods_inventory(lamp.id, 2, 3).await.unwrap();
    first.commit().await.unwrap();

    let remaining_seen = tokio::time::timeout(Duration::from_secs(5), second)
        .await
        .expect("second transaction should proceed after commit")
        .unwrap();
    assert_eq!(remaining_seen, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn concurrent_takes_never_oversell() {
    let store = get_test_store().await;
    let lamp = goods(UserId::new(), "Desk lamp", 1000, 5);
    seed_goods(&store, &lamp).await;

    let (a, b) = tokio::join!(
        tokio::spawn(take_units(store.clone(), lamp.id, 3)),
        tokio::spawn(take_units(store.clone(), lamp.id, 3)),
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(outcomes.iter().filter(|taken| **taken).count(), 1);

    let loaded = store.get_goods(lamp.id).await.unwrap().unwrap();
    assert_eq!(loaded.remaining, 2);
    assert_eq!(loaded.sales, 3);
}
