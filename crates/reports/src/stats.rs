//! Pure aggregations over goods and order snapshots.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{Goods, GoodsId, GoodsStatus, Money, Order, OrderLine, OrderStatus, UserId};
use serde::{Deserialize, Serialize};

/// Inventory and sales totals over a merchant's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantGoodsStats {
    pub merchant_id: UserId,
    pub goods_count: usize,
    pub active_goods: usize,
    /// Σ remaining.
    pub total_stock: u64,
    /// Σ remaining × price.
    pub inventory_value: Money,
    /// Σ sales.
    pub total_sales: u64,
    /// Σ sales × price.
    pub sales_value: Money,
}

/// One row of a catalog ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedGoods {
    pub rank: usize,
    pub goods_id: GoodsId,
    pub name: String,
    pub price: Money,
    pub sales: u32,
    pub sales_value: Money,
}

/// Units and revenue of one goods entry taken from order lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsSales {
    pub goods_id: GoodsId,
    pub name: Option<String>,
    pub quantity: u64,
    pub revenue: Money,
}

/// Sales over a time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReport {
    /// Set when the report covers one merchant's lines only.
    pub merchant_id: Option<UserId>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Orders contributing at least one counted line.
    pub order_count: usize,
    pub units_sold: u64,
    pub revenue: Money,
    /// Per-goods figures, best selling first.
    pub goods: Vec<GoodsSales>,
}

impl SalesReport {
    /// The `limit` best selling goods of the window.
    pub fn best_sellers(&self, limit: usize) -> &[GoodsSales] {
        &self.goods[..self.goods.len().min(limit)]
    }
}

pub fn merchant_goods_stats(merchant_id: UserId, goods: &[Goods]) -> MerchantGoodsStats {
    let owned = move || goods.iter().filter(move |g| g.merchant_id == merchant_id);

    MerchantGoodsStats {
        merchant_id,
        goods_count: owned().count(),
        active_goods: owned().filter(|g| g.status == GoodsStatus::Active).count(),
        total_stock: owned().map(|g| u64::from(g.remaining)).sum(),
        inventory_value: owned().map(Goods::stock_value).sum(),
        total_sales: owned().map(|g| u64::from(g.sales)).sum(),
        sales_value: owned().map(Goods::sales_value).sum(),
    }
}

fn rank<K: Ord>(mut goods: Vec<&Goods>, key: impl Fn(&Goods) -> K) -> Vec<RankedGoods> {
    goods.sort_by(|a, b| key(b).cmp(&key(a)).then_with(|| a.name.cmp(&b.name)));
    goods
        .into_iter()
        .enumerate()
        .map(|(i, g)| RankedGoods {
            rank: i + 1,
            goods_id: g.id,
            name: g.name.clone(),
            price: g.price,
            sales: g.sales,
            sales_value: g.sales_value(),
        })
        .collect()
}

/// Ranks goods by units sold, highest first. Ties are broken by name.
pub fn sales_ranking(goods: &[Goods]) -> Vec<RankedGoods> {
    rank(goods.iter().collect(), |g| g.sales)
}

/// Ranks goods by `sales × price`, highest first. Ties are broken by name.
pub fn sales_value_ranking(goods: &[Goods]) -> Vec<RankedGoods> {
    rank(goods.iter().collect(), Goods::sales_value)
}

/// Sums quantity and revenue per goods over the lines accepted by `include`,
/// best selling first. Revenue uses the frozen unit prices.
pub fn goods_sales<'a, I, F>(
    orders: I,
    names: &HashMap<GoodsId, String>,
    include: F,
) -> Vec<GoodsSales>
where
    I: IntoIterator<Item = &'a Order>,
    F: Fn(&Order, &OrderLine) -> bool,
{
    let mut totals: HashMap<GoodsId, (u64, Money)> = HashMap::new();
    for order in orders {
        for line in order.lines.iter().filter(|line| include(order, line)) {
            let entry = totals.entry(line.goods_id).or_insert((0, Money::zero()));
            entry.0 += u64::from(line.quantity);
            entry.1 += line.unit_price.saturating_mul(u64::from(line.quantity));
        }
    }

    let mut sales: Vec<GoodsSales> = totals
        .into_iter()
        .map(|(goods_id, (quantity, revenue))| GoodsSales {
            goods_id,
            name: names.get(&goods_id).cloned(),
            quantity,
            revenue,
        })
        .collect();
    sales.sort_by(|a, b| {
        b.quantity
            .cmp(&a.quantity)
            .then_with(|| b.revenue.cmp(&a.revenue))
            .then_with(|| a.goods_id.cmp(&b.goods_id))
    });
    sales
}

/// Builds a sales report over `orders`. Cancelled orders are left out;
/// `include` picks the lines that count.
pub fn sales_report<F>(
    orders: &[Order],
    names: &HashMap<GoodsId, String>,
    merchant_id: Option<UserId>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    include: F,
) -> SalesReport
where
    F: Fn(&OrderLine) -> bool,
{
    let counted = |order: &Order, line: &OrderLine| {
        order.status != OrderStatus::Cancelled
            && order.created_at >= from
            && order.created_at <= to
            && include(line)
    };

    let order_count = orders
        .iter()
        .filter(|order| order.lines.iter().any(|line| counted(order, line)))
        .count();
    let goods = goods_sales(orders, names, counted);

    SalesReport {
        merchant_id,
        from,
        to,
        order_count,
        units_sold: goods.iter().map(|g| g.quantity).sum(),
        revenue: goods.iter().map(|g| g.revenue).sum(),
        goods,
    }
}
