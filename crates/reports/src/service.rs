//! Report service.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{Goods, GoodsId};
use domain::{Action, Principal, Resource, authorize};
use store::{GoodsFilter, OrderQuery, ShopStore};

use crate::error::{ReportError, Result};
use crate::stats::{self, GoodsSales, MerchantGoodsStats, RankedGoods, SalesReport};

fn names_of(goods: &[Goods]) -> HashMap<GoodsId, String> {
    goods.iter().map(|g| (g.id, g.name.clone())).collect()
}

fn check_window(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<()> {
    if from > to {
        return Err(ReportError::InvalidRange { from, to });
    }
    Ok(())
}

/// Read-only statistics over goods and orders.
///
/// Merchant reports only ever cover the calling merchant's own goods.
#[derive(Clone)]
pub struct ReportService<S: ShopStore> {
    store: S,
}

impl<S: ShopStore> ReportService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn own_goods(&self, principal: &Principal) -> Result<Vec<Goods>> {
        authorize(
            principal,
            Action::ViewMerchantData,
            Resource::MerchantData(principal.user_id),
        )?;
        Ok(self
            .store
            .list_goods(&GoodsFilter::new().for_merchant(principal.user_id))
            .await?)
    }

    /// Stock and sales totals over the caller's catalog.
    #[tracing::instrument(skip(self))]
    pub async fn merchant_goods_stats(&self, principal: &Principal) -> Result<MerchantGoodsStats> {
        let goods = self.own_goods(principal).await?;
        Ok(stats::merchant_goods_stats(principal.user_id, &goods))
    }

    /// The caller's goods by units sold.
    #[tracing::instrument(skip(self))]
    pub async fn sales_ranking(&self, principal: &Principal) -> Result<Vec<RankedGoods>> {
        let goods = self.own_goods(principal).await?;
        Ok(stats::sales_ranking(&goods))
    }

    /// The caller's goods by sales value.
    #[tracing::instrument(skip(self))]
    pub async fn sales_value_ranking(&self, principal: &Principal) -> Result<Vec<RankedGoods>> {
        let goods = self.own_goods(principal).await?;
        Ok(stats::sales_value_ranking(&goods))
    }

    /// Goods by units ordered over all time, cancelled orders included.
    ///
    /// With a merchant principal only that merchant's goods are ranked;
    /// without one the whole shop is.
    #[tracing::instrument(skip(self))]
    pub async fn best_selling_goods(
        &self,
        merchant: Option<&Principal>,
        limit: usize,
    ) -> Result<Vec<GoodsSales>> {
        let (goods, query) = match merchant {
            Some(principal) => (
                self.own_goods(principal).await?,
                OrderQuery::new().for_merchant(principal.user_id),
            ),
            None => (
                self.store.list_goods(&GoodsFilter::new()).await?,
                OrderQuery::new(),
            ),
        };
        let orders = self.store.list_orders(&query).await?;
        let names = names_of(&goods);

        let mut sales = match merchant {
            Some(_) => stats::goods_sales(&orders, &names, |_, line| {
                names.contains_key(&line.goods_id)
            }),
            None => stats::goods_sales(&orders, &names, |_, _| true),
        };
        sales.truncate(limit);
        Ok(sales)
    }

    /// Shop-wide sales of non-cancelled orders created within `[from, to]`.
    #[tracing::instrument(skip(self))]
    pub async fn sales_report(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<SalesReport> {
        check_window(from, to)?;
        let goods = self.store.list_goods(&GoodsFilter::new()).await?;
        let orders = self
            .store
            .list_orders(&OrderQuery::new().created_between(from, to))
            .await?;

        let report = stats::sales_report(&orders, &names_of(&goods), None, from, to, |_| true);
        tracing::debug!(orders = report.order_count, revenue = %report.revenue, "sales report built");
        Ok(report)
    }

    /// Sales of the caller's goods within `[from, to]`.
    #[tracing::instrument(skip(self))]
    pub async fn merchant_sales_report(
        &self,
        principal: &Principal,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<SalesReport> {
        check_window(from, to)?;
        let goods = self.own_goods(principal).await?;
        let orders = self
            .store
            .list_orders(
                &OrderQuery::new()
                    .for_merchant(principal.user_id)
                    .created_between(from, to),
            )
            .await?;
        let names = names_of(&goods);

        Ok(stats::sales_report(
            &orders,
            &names,
            Some(principal.user_id),
            from,
            to,
            |line| names.contains_key(&line.goods_id),
        ))
    }
}
