//! Goods catalog: merchant administration and storefront queries.

use common::{Goods, GoodsId, GoodsStatus, Money, UserId};
use serde::{Deserialize, Serialize};
use store::{GoodsFilter, ShopStore, StoreError, StoreTx};

use crate::auth::{Action, Principal, Resource, authorize};
use crate::error::{DomainError, Result};
use crate::ledger::locked_goods;

/// Data for a new goods entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGoods {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    pub remaining: u32,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Partial edit of a goods entry. Absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoodsUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub remaining: Option<u32>,
    pub image_url: Option<String>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("goods name must not be blank"));
    }
    Ok(())
}

fn validate_price(price: Money) -> Result<()> {
    if price.is_negative() {
        return Err(DomainError::validation(format!(
            "price must not be negative: {price}"
        )));
    }
    Ok(())
}

/// Checks that `quantity` units of the goods are in stock.
///
/// Reads the row through the caller's transaction, locking it, and never
/// writes.
pub async fn reserve_check<T>(tx: &mut T, goods_id: GoodsId, quantity: u32) -> Result<Goods>
where
    T: StoreTx + ?Sized,
{
    let goods = locked_goods(tx, goods_id).await?;
    if goods.remaining < quantity {
        return Err(DomainError::InsufficientStock {
            goods_id,
            requested: quantity,
            remaining: goods.remaining,
        });
    }
    Ok(goods)
}

/// Service for the goods catalog.
#[derive(Clone)]
pub struct CatalogService<S: ShopStore> {
    store: S,
}

impl<S: ShopStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads a goods entry by ID.
    pub async fn get_goods(&self, goods_id: GoodsId) -> Result<Goods> {
        self.store
            .get_goods(goods_id)
            .await?
            .ok_or_else(|| DomainError::not_found("goods", goods_id))
    }

    /// Adds a goods entry owned by the calling merchant. New goods start
    /// active with no sales.
    #[tracing::instrument(skip(self, new), fields(name = %new.name))]
    pub async fn add_goods(&self, principal: &Principal, new: NewGoods) -> Result<Goods> {
        authorize(principal, Action::CreateGoods, Resource::Catalog)?;
        validate_name(&new.name)?;
        validate_price(new.price)?;

        let goods = Goods {
            id: GoodsId::new(),
            merchant_id: principal.user_id,
            name: new.name,
            description: new.description,
            price: new.price,
            remaining: new.remaining,
            sales: 0,
            status: GoodsStatus::Active,
            image_url: new.image_url,
        };

        let mut tx = self.store.begin().await?;
        tx.insert_goods(&goods).await?;
        tx.commit().await?;

        tracing::info!(goods_id = %goods.id, "goods added");
        Ok(goods)
    }

    /// Applies a partial edit to goods owned by the caller.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_goods(
        &self,
        principal: &Principal,
        goods_id: GoodsId,
        update: GoodsUpdate,
    ) -> Result<Goods> {
        self.modify(principal, goods_id, |goods| {
            if let Some(name) = update.name {
                validate_name(&name)?;
                goods.name = name;
            }
            if let Some(description) = update.description {
                goods.description = description;
            }
            if let Some(price) = update.price {
                validate_price(price)?;
                goods.price = price;
            }
            if let Some(remaining) = update.remaining {
                goods.remaining = remaining;
            }
            if let Some(image_url) = update.image_url {
                goods.image_url = Some(image_url);
            }
            Ok(())
        })
        .await
    }

    /// Overwrites the stock level.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(
        &self,
        principal: &Principal,
        goods_id: GoodsId,
        remaining: u32,
    ) -> Result<Goods> {
        self.modify(principal, goods_id, |goods| {
            goods.remaining = remaining;
            Ok(())
        })
        .await
    }

    /// Makes the goods purchasable again.
    #[tracing::instrument(skip(self))]
    pub async fn activate(&self, principal: &Principal, goods_id: GoodsId) -> Result<Goods> {
        self.set_status(principal, goods_id, GoodsStatus::Active)
            .await
    }

    /// Hides the goods from new orders. Stock is left as is.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, principal: &Principal, goods_id: GoodsId) -> Result<Goods> {
        self.set_status(principal, goods_id, GoodsStatus::Inactive)
            .await
    }

    /// Resets the sales counter to zero. This is the only way sales go down.
    #[tracing::instrument(skip(self))]
    pub async fn reset_sales(&self, principal: &Principal, goods_id: GoodsId) -> Result<Goods> {
        self.modify(principal, goods_id, |goods| {
            goods.sales = 0;
            Ok(())
        })
        .await
    }

    /// Deletes goods that no order line references.
    ///
    /// Goods with order history fail with `GoodsReferenced`; deactivate
    /// them instead.
    #[tracing::instrument(skip(self))]
    pub async fn delete_goods(&self, principal: &Principal, goods_id: GoodsId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let goods = locked_goods(&mut tx, goods_id).await?;
        authorize(principal, Action::ManageGoods, Resource::Goods(&goods))?;

        if tx.goods_referenced(goods_id).await? {
            return Err(DomainError::GoodsReferenced { goods_id });
        }
        match tx.delete_goods(goods_id).await {
            Ok(_) => {}
            Err(StoreError::Conflict { .. }) => {
                return Err(DomainError::GoodsReferenced { goods_id });
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;

        tracing::info!(%goods_id, "goods deleted");
        Ok(())
    }

    async fn set_status(
        &self,
        principal: &Principal,
        goods_id: GoodsId,
        status: GoodsStatus,
    ) -> Result<Goods> {
        self.modify(principal, goods_id, |goods| {
            goods.status = status;
            Ok(())
        })
        .await
    }

    /// Locks the goods, checks ownership, applies `edit` and writes it back.
    async fn modify<F>(&self, principal: &Principal, goods_id: GoodsId, edit: F) -> Result<Goods>
    where
        F: FnOnce(&mut Goods) -> Result<()>,
    {
        let mut tx = self.store.begin().await?;
        let mut goods = locked_goods(&mut tx, goods_id).await?;
        authorize(principal, Action::ManageGoods, Resource::Goods(&goods))?;

        edit(&mut goods)?;
        tx.update_goods(&goods).await?;
        tx.commit().await?;

        tracing::info!(%goods_id, status = %goods.status, remaining = goods.remaining, "goods updated");
        Ok(goods)
    }

    /// Active goods with stock left, by name.
    pub async fn available_goods(&self) -> Result<Vec<Goods>> {
        Ok(self.store.list_goods(&GoodsFilter::available()).await?)
    }

    /// Active goods whose name contains `name`, case-insensitively.
    pub async fn search_goods(&self, name: &str) -> Result<Vec<Goods>> {
        let filter = GoodsFilter::new()
            .with_status(GoodsStatus::Active)
            .name_contains(name);
        Ok(self.store.list_goods(&filter).await?)
    }

    /// Active goods priced within `[min, max]`.
    pub async fn goods_in_price_range(&self, min: Money, max: Money) -> Result<Vec<Goods>> {
        check_price_range(min, max)?;
        let filter = GoodsFilter::new()
            .with_status(GoodsStatus::Active)
            .price_between(min, max);
        Ok(self.store.list_goods(&filter).await?)
    }

    /// A merchant's goods. Inactive entries are listed only when the viewer is
    /// that merchant.
    pub async fn merchant_goods(
        &self,
        viewer: Option<&Principal>,
        merchant_id: UserId,
    ) -> Result<Vec<Goods>> {
        let filter = merchant_filter(viewer, merchant_id);
        Ok(self.store.list_goods(&filter).await?)
    }

    /// A merchant's goods priced within `[min, max]`, with the same visibility
    /// as [`CatalogService::merchant_goods`].
    pub async fn merchant_goods_in_price_range(
        &self,
        viewer: Option<&Principal>,
        merchant_id: UserId,
        min: Money,
        max: Money,
    ) -> Result<Vec<Goods>> {
        check_price_range(min, max)?;
        let filter = merchant_filter(viewer, merchant_id).price_between(min, max);
        Ok(self.store.list_goods(&filter).await?)
    }

    /// A merchant's goods whose name contains `name`.
    pub async fn search_merchant_goods(
        &self,
        viewer: Option<&Principal>,
        merchant_id: UserId,
        name: &str,
    ) -> Result<Vec<Goods>> {
        let filter = merchant_filter(viewer, merchant_id).name_contains(name);
        Ok(self.store.list_goods(&filter).await?)
    }
}

fn check_price_range(min: Money, max: Money) -> Result<()> {
    if min > max {
        return Err(DomainError::validation(format!(
            "price range is empty: {min} > {max}"
        )));
    }
    Ok(())
}

fn merchant_filter(viewer: Option<&Principal>, merchant_id: UserId) -> GoodsFilter {
    let filter = GoodsFilter::new().for_merchant(merchant_id);
    let owner = viewer.is_some_and(|principal| {
        authorize(principal, Action::ViewMerchantData, Resource::MerchantData(merchant_id)).is_ok()
    });
    if owner {
        filter
    } else {
        filter.with_status(GoodsStatus::Active)
    }
}
