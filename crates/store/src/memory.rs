use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::{Goods, GoodsId, Order, OrderId, User, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Result, StoreError,
    store::{GoodsFilter, OrderQuery, ShopStore, StoreTx},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    goods: BTreeMap<GoodsId, Goods>,
    /// Orders with their insertion sequence, used to break creation-time ties.
    orders: HashMap<OrderId, (u64, Order)>,
    next_seq: u64,
}

impl Tables {
    fn merchants_of(&self, order: &Order) -> Vec<UserId> {
        let mut merchants: Vec<UserId> = order
            .lines
            .iter()
            .filter_map(|line| self.goods.get(&line.goods_id).map(|g| g.merchant_id))
            .collect();
        merchants.sort();
        merchants.dedup();
        merchants
    }
}

/// In-memory store for tests and local runs.
///
/// Transactions are fully serialised: [`ShopStore::begin`] takes an owned
/// lock on all tables and works on a copy that replaces the tables only on
/// commit. Plain reads wait for any open transaction to finish.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }
}

/// Transaction over an [`InMemoryStore`].
#[derive(Debug)]
pub struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn lock_goods(&mut self, ids: &[GoodsId]) -> Result<Vec<Goods>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .iter()
            .filter_map(|id| self.working.goods.get(id).cloned())
            .collect())
    }

    async fn insert_goods(&mut self, goods: &Goods) -> Result<()> {
        if self.working.goods.contains_key(&goods.id) {
            return Err(StoreError::Conflict {
                constraint: "goods_pkey".to_string(),
            });
        }
        self.working.goods.insert(goods.id, goods.clone());
        Ok(())
    }

    async fn update_goods(&mut self, goods: &Goods) -> Result<()> {
        match self.working.goods.get_mut(&goods.id) {
            Some(existing) => {
                *existing = goods.clone();
                Ok(())
            }
            None => Err(StoreError::RowNotFound {
                entity: "goods",
                id: goods.id.to_string(),
            }),
        }
    }

    async fn set_goods_inventory(
        &mut self,
        id: GoodsId,
        remaining: u32,
        sales: u32,
    ) -> Result<()> {
        let goods = self
            .working
            .goods
            .get_mut(&id)
            .ok_or_else(|| StoreError::RowNotFound {
                entity: "goods",
                id: id.to_string(),
            })?;
        goods.remaining = remaining;
        goods.sales = sales;
        Ok(())
    }

    async fn goods_referenced(&mut self, id: GoodsId) -> Result<bool> {
        Ok(self
            .working
            .orders
            .values()
            .any(|(_, order)| order.contains_goods(id)))
    }

    async fn delete_goods(&mut self, id: GoodsId) -> Result<bool> {
        if self.goods_referenced(id).await? {
            return Err(StoreError::Conflict {
                constraint: "order_lines_goods_id_fkey".to_string(),
            });
        }
        Ok(self.working.goods.remove(&id).is_some())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.working.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict {
                constraint: "orders_pkey".to_string(),
            });
        }
        if let Some(line) = order
            .lines
            .iter()
            .find(|line| !self.working.goods.contains_key(&line.goods_id))
        {
            return Err(StoreError::Conflict {
                constraint: format!("order_lines_goods_id_fkey ({})", line.goods_id),
            });
        }
        let seq = self.working.next_seq;
        self.working.next_seq += 1;
        self.working.orders.insert(order.id, (seq, order.clone()));
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&id).map(|(_, order)| order.clone()))
    }

    async fn update_order_progress(&mut self, order: &Order) -> Result<()> {
        let (_, existing) =
            self.working
                .orders
                .get_mut(&order.id)
                .ok_or_else(|| StoreError::RowNotFound {
                    entity: "order",
                    id: order.id.to_string(),
                })?;
        existing.status = order.status;
        existing.paid_at = order.paid_at;
        existing.shipped_at = order.shipped_at;
        existing.completed_at = order.completed_at;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl ShopStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTx { guard, working })
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.lock().await;
        for existing in tables.users.values() {
            if existing.id == user.id {
                return Err(StoreError::Conflict {
                    constraint: "users_pkey".to_string(),
                });
            }
            if existing.nickname == user.nickname {
                return Err(StoreError::Conflict {
                    constraint: "users_nickname_key".to_string(),
                });
            }
            if existing.email == user.email {
                return Err(StoreError::Conflict {
                    constraint: "users_email_key".to_string(),
                });
            }
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn get_goods(&self, id: GoodsId) -> Result<Option<Goods>> {
        Ok(self.tables.lock().await.goods.get(&id).cloned())
    }

    async fn list_goods(&self, filter: &GoodsFilter) -> Result<Vec<Goods>> {
        let tables = self.tables.lock().await;
        let mut goods: Vec<Goods> = tables
            .goods
            .values()
            .filter(|g| filter.matches(g))
            .cloned()
            .collect();
        goods.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(goods)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self
            .tables
            .lock()
            .await
            .orders
            .get(&id)
            .map(|(_, order)| order.clone()))
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<&(u64, Order)> = tables
            .orders
            .values()
            .filter(|(_, order)| query.matches_order(order))
            .filter(|(_, order)| match query.merchant_id {
                Some(merchant_id) => tables.merchants_of(order).contains(&merchant_id),
                None => true,
            })
            .collect();
        orders.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        Ok(orders.into_iter().map(|(_, order)| order.clone()).collect())
    }

    async fn order_merchants(&self, id: OrderId) -> Result<Vec<UserId>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .get(&id)
            .map(|(_, order)| tables.merchants_of(order))
            .unwrap_or_default())
    }
}
