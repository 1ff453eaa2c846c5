//! Inventory ledger operations.
//!
//! These are the only writers of `remaining` and `sales` apart from merchant
//! edits. Both run inside the caller's transaction and re-read the locked
//! row, so several lines for the same goods apply one after another.

use common::{Goods, GoodsId};
use store::StoreTx;

use crate::error::{DomainError, Result};

/// Reads a goods row through the transaction, locking it.
pub(crate) async fn locked_goods<T>(tx: &mut T, goods_id: GoodsId) -> Result<Goods>
where
    T: StoreTx + ?Sized,
{
    tx.lock_goods(&[goods_id])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| DomainError::not_found("goods", goods_id))
}

/// Takes `quantity` units out of stock and records them as sold.
///
/// Fails with `InsufficientStock` when fewer than `quantity` units remain;
/// nothing is written in that case.
pub async fn decrement_and_record_sale<T>(
    tx: &mut T,
    goods_id: GoodsId,
    quantity: u32,
) -> Result<Goods>
where
    T: StoreTx + ?Sized,
{
    let mut goods = locked_goods(tx, goods_id).await?;

    let Some(remaining) = goods.remaining.checked_sub(quantity) else {
        return Err(DomainError::InsufficientStock {
            goods_id,
            requested: quantity,
            remaining: goods.remaining,
        });
    };
    let sales = goods
        .sales
        .checked_add(quantity)
        .ok_or_else(|| DomainError::validation(format!("sales counter of {goods_id} overflows")))?;

    tx.set_goods_inventory(goods_id, remaining, sales).await?;
    tracing::debug!(%goods_id, quantity, remaining, sales, "stock decremented");

    goods.remaining = remaining;
    goods.sales = sales;
    Ok(goods)
}

/// Puts `quantity` units back into stock. Sales are left untouched.
pub async fn restore_stock<T>(tx: &mut T, goods_id: GoodsId, quantity: u32) -> Result<Goods>
where
    T: StoreTx + ?Sized,
{
    let mut goods = locked_goods(tx, goods_id).await?;

    let remaining = goods
        .remaining
        .checked_add(quantity)
        .ok_or_else(|| DomainError::validation(format!("stock of {goods_id} overflows")))?;

    tx.set_goods_inventory(goods_id, remaining, goods.sales).await?;
    tracing::debug!(%goods_id, quantity, remaining, "stock restored");

    goods.remaining = remaining;
    Ok(goods)
}
