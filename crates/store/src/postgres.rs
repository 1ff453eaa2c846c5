use std::collections::HashMap;

use async_trait::async_trait;
use common::{
    Goods, GoodsId, GoodsStatus, Money, Order, OrderId, OrderLine, OrderLineId, OrderStatus, Role,
    User, UserId,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{GoodsFilter, OrderQuery, ShopStore, StoreTx},
};

const GOODS_COLUMNS: &str =
    "id, merchant_id, name, description, price_cents, remaining, sales, status, image_url";

const ORDER_COLUMNS: &str =
    "id, customer_id, status, total_cents, created_at, paid_at, shipped_at, completed_at";

const LINE_COLUMNS: &str = "id, order_id, goods_id, quantity, unit_price_cents";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Transaction over a [`PostgresStore`]. Rolls back when dropped uncommitted.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

fn count_from_db(table: &'static str, column: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidRow {
        table,
        reason: format!("{column} out of range: {value}"),
    })
}

fn enum_from_db<T>(table: &'static str, value: String) -> Result<T>
where
    T: std::str::FromStr<Err = common::ParseEnumError>,
{
    value.parse().map_err(|e: common::ParseEnumError| StoreError::InvalidRow {
        table,
        reason: e.to_string(),
    })
}

/// Maps constraint violations onto [`StoreError::Conflict`].
fn write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && (db_err.is_unique_violation()
            || db_err.is_foreign_key_violation()
            || db_err.is_check_violation())
    {
        return StoreError::Conflict {
            constraint: db_err.constraint().unwrap_or("unknown").to_string(),
        };
    }
    StoreError::Database(e)
}

fn row_to_user(row: PgRow) -> Result<User> {
    Ok(User {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
        nickname: row.try_get("nickname")?,
        email: row.try_get("email")?,
        role: enum_from_db::<Role>("users", row.try_get("role")?)?,
        address: row.try_get("address")?,
        avatar_url: row.try_get("avatar_url")?,
    })
}

fn row_to_goods(row: PgRow) -> Result<Goods> {
    Ok(Goods {
        id: GoodsId::from_uuid(row.try_get::<Uuid, _>("id")?),
        merchant_id: UserId::from_uuid(row.try_get::<Uuid, _>("merchant_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        remaining: count_from_db("goods", "remaining", row.try_get("remaining")?)?,
        sales: count_from_db("goods", "sales", row.try_get("sales")?)?,
        status: enum_from_db::<GoodsStatus>("goods", row.try_get("status")?)?,
        image_url: row.try_get("image_url")?,
    })
}

fn row_to_line(row: PgRow) -> Result<OrderLine> {
    Ok(OrderLine {
        id: OrderLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        goods_id: GoodsId::from_uuid(row.try_get::<Uuid, _>("goods_id")?),
        quantity: count_from_db("order_lines", "quantity", row.try_get("quantity")?)?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

/// Maps an order row; lines are attached by the caller.
fn row_to_order(row: PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        customer_id: UserId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        status: enum_from_db::<OrderStatus>("orders", row.try_get("status")?)?,
        total_amount: Money::from_cents(row.try_get("total_cents")?),
        created_at: row.try_get("created_at")?,
        paid_at: row.try_get("paid_at")?,
        shipped_at: row.try_get("shipped_at")?,
        completed_at: row.try_get("completed_at")?,
        lines: Vec::new(),
    })
}

/// Loads the lines of the given orders and attaches them in position order.
async fn attach_lines<'e, E>(executor: E, orders: &mut [Order]) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    if orders.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
    let rows = sqlx::query(&format!(
        "SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = ANY($1) ORDER BY order_id, position"
    ))
    .bind(ids)
    .fetch_all(executor)
    .await?;

    let mut by_order: HashMap<OrderId, Vec<OrderLine>> = HashMap::new();
    for row in rows {
        let line = row_to_line(row)?;
        by_order.entry(line.order_id).or_default().push(line);
    }
    for order in orders.iter_mut() {
        order.lines = by_order.remove(&order.id).unwrap_or_default();
    }
    Ok(())
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn lock_goods(&mut self, ids: &[GoodsId]) -> Result<Vec<Goods>> {
        let mut ids: Vec<Uuid> = ids.iter().map(GoodsId::as_uuid).collect();
        ids.sort();
        ids.dedup();

        let rows = sqlx::query(&format!(
            "SELECT {GOODS_COLUMNS} FROM goods WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        tracing::debug!(count = rows.len(), "locked goods rows");
        rows.into_iter().map(row_to_goods).collect()
    }

    async fn insert_goods(&mut self, goods: &Goods) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO goods (id, merchant_id, name, description, price_cents, remaining, sales, status, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(goods.id.as_uuid())
        .bind(goods.merchant_id.as_uuid())
        .bind(&goods.name)
        .bind(&goods.description)
        .bind(goods.price.cents())
        .bind(i64::from(goods.remaining))
        .bind(i64::from(goods.sales))
        .bind(goods.status.as_str())
        .bind(&goods.image_url)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_goods(&mut self, goods: &Goods) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE goods
            SET name = $2, description = $3, price_cents = $4, remaining = $5,
                sales = $6, status = $7, image_url = $8
            WHERE id = $1
            "#,
        )
        .bind(goods.id.as_uuid())
        .bind(&goods.name)
        .bind(&goods.description)
        .bind(goods.price.cents())
        .bind(i64::from(goods.remaining))
        .bind(i64::from(goods.sales))
        .bind(goods.status.as_str())
        .bind(&goods.image_url)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                entity: "goods",
                id: goods.id.to_string(),
            });
        }
        Ok(())
    }

    async fn set_goods_inventory(
        &mut self,
        id: GoodsId,
        remaining: u32,
        sales: u32,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE goods SET remaining = $2, sales = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(i64::from(remaining))
            .bind(i64::from(sales))
            .execute(&mut *self.tx)
            .await
            .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                entity: "goods",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn goods_referenced(&mut self, id: GoodsId) -> Result<bool> {
        let referenced: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM order_lines WHERE goods_id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(referenced)
    }

    async fn delete_goods(&mut self, id: GoodsId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM goods WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, status, total_cents, created_at, paid_at, shipped_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total_amount.cents())
        .bind(order.created_at)
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;

        for (position, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (id, order_id, goods_id, position, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(line.order_id.as_uuid())
            .bind(line.goods_id.as_uuid())
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.cents())
            .execute(&mut *self.tx)
            .await
            .map_err(write_error)?;
        }

        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut orders = [row_to_order(row)?];
        attach_lines(&mut *self.tx, &mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn update_order_progress(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, paid_at = $3, shipped_at = $4, completed_at = $5
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                entity: "order",
                id: order.id.to_string(),
            });
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ShopStore for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTx { tx })
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, nickname, email, role, address, avatar_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.nickname)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.address)
        .bind(&user.avatar_url)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, nickname, email, role, address, avatar_url FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_user).transpose()
    }

    async fn get_goods(&self, id: GoodsId) -> Result<Option<Goods>> {
        let row = sqlx::query(&format!("SELECT {GOODS_COLUMNS} FROM goods WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_goods).transpose()
    }

    async fn list_goods(&self, filter: &GoodsFilter) -> Result<Vec<Goods>> {
        let mut sql = format!("SELECT {GOODS_COLUMNS} FROM goods WHERE 1=1");
        let mut param_count = 0;

        if filter.merchant_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND merchant_id = ${param_count}"));
        }
        if filter.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        if filter.name_contains.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND name ILIKE '%' || ${param_count} || '%'"));
        }
        if filter.min_price.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND price_cents >= ${param_count}"));
        }
        if filter.max_price.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND price_cents <= ${param_count}"));
        }
        if filter.in_stock {
            sql.push_str(" AND remaining > 0");
        }

        sql.push_str(" ORDER BY name ASC, id ASC");

        let mut query = sqlx::query(&sql);
        if let Some(merchant_id) = filter.merchant_id {
            query = query.bind(merchant_id.as_uuid());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(ref needle) = filter.name_contains {
            query = query.bind(escape_like(needle));
        }
        if let Some(min) = filter.min_price {
            query = query.bind(min.cents());
        }
        if let Some(max) = filter.max_price {
            query = query.bind(max.cents());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_goods).collect()
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut orders = [row_to_order(row)?];
        attach_lines(&self.pool, &mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE 1=1");
        let mut param_count = 0;

        if query.customer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.customer_id = ${param_count}"));
        }
        if query.merchant_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM order_lines l JOIN goods g ON g.id = l.goods_id \
                 WHERE l.order_id = o.id AND g.merchant_id = ${param_count})"
            ));
        }
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.status = ${param_count}"));
        }
        if query.created_from.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.created_at >= ${param_count}"));
        }
        if query.created_to.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.created_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY o.created_at DESC, o.id DESC");

        let mut sqlx_query = sqlx::query(&sql);
        if let Some(customer_id) = query.customer_id {
            sqlx_query = sqlx_query.bind(customer_id.as_uuid());
        }
        if let Some(merchant_id) = query.merchant_id {
            sqlx_query = sqlx_query.bind(merchant_id.as_uuid());
        }
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(from) = query.created_from {
            sqlx_query = sqlx_query.bind(from);
        }
        if let Some(to) = query.created_to {
            sqlx_query = sqlx_query.bind(to);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let mut orders = rows
            .into_iter()
            .map(row_to_order)
            .collect::<Result<Vec<_>>>()?;
        attach_lines(&self.pool, &mut orders).await?;
        Ok(orders)
    }

    async fn order_merchants(&self, id: OrderId) -> Result<Vec<UserId>> {
        let merchants: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT g.merchant_id
            FROM order_lines l
            JOIN goods g ON g.id = l.goods_id
            WHERE l.order_id = $1
            ORDER BY g.merchant_id
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(merchants.into_iter().map(UserId::from_uuid).collect())
    }
}

/// Escapes LIKE wildcards so user input matches literally.
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
