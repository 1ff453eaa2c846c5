//! Authorization predicate.
//!
//! Every service call names the [`Action`] it performs and the [`Resource`]
//! it touches; [`authorize`] is evaluated once before anything is written.

use common::{Goods, Order, Role, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// The authenticated caller, supplied by the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn customer(user_id: UserId) -> Self {
        Self::new(user_id, Role::Customer)
    }

    pub fn merchant(user_id: UserId) -> Self {
        Self::new(user_id, Role::Merchant)
    }

    pub fn is_merchant(&self) -> bool {
        self.role == Role::Merchant
    }
}

/// Operations subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateGoods,
    /// Edit, stock update, activate/deactivate, delete, sales reset.
    ManageGoods,
    PlaceOrder,
    PayOrder,
    ShipOrder,
    CompleteOrder,
    CancelOrder,
    ViewOrder,
    ViewMerchantData,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateGoods => "create goods",
            Action::ManageGoods => "manage goods",
            Action::PlaceOrder => "place order",
            Action::PayOrder => "pay order",
            Action::ShipOrder => "ship order",
            Action::CompleteOrder => "complete order",
            Action::CancelOrder => "cancel order",
            Action::ViewOrder => "view order",
            Action::ViewMerchantData => "view merchant data",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The target of an action.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    /// The catalog as a whole, for creating goods.
    Catalog,
    Goods(&'a Goods),
    /// An order with the distinct merchants owning its line goods.
    Order {
        order: &'a Order,
        merchants: &'a [UserId],
    },
    /// Reports and order listings belonging to a merchant.
    MerchantData(UserId),
}

/// Returns `Ok(())` if the principal may perform the action on the resource.
pub fn authorize(principal: &Principal, action: Action, resource: Resource<'_>) -> Result<()> {
    let allowed = match (action, resource) {
        (Action::CreateGoods, Resource::Catalog) => principal.is_merchant(),
        (Action::ManageGoods, Resource::Goods(goods)) => {
            principal.is_merchant() && goods.merchant_id == principal.user_id
        }
        (Action::PlaceOrder, _) => true,
        (
            Action::PayOrder | Action::CompleteOrder | Action::CancelOrder,
            Resource::Order { order, .. },
        ) => order.customer_id == principal.user_id,
        (Action::ShipOrder, Resource::Order { merchants, .. }) => {
            principal.is_merchant() && merchants.contains(&principal.user_id)
        }
        (Action::ViewOrder, Resource::Order { order, merchants }) => {
            order.customer_id == principal.user_id
                || (principal.is_merchant() && merchants.contains(&principal.user_id))
        }
        (Action::ViewMerchantData, Resource::MerchantData(merchant_id)) => {
            principal.is_merchant() && merchant_id == principal.user_id
        }
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        tracing::debug!(user_id = %principal.user_id, %action, "authorization refused");
        Err(DomainError::Forbidden {
            user_id: principal.user_id,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::{GoodsId, GoodsStatus, Money, OrderId, OrderStatus};

    use super::*;

    fn goods_of(merchant_id: UserId) -> Goods {
        Goods {
            id: GoodsId::new(),
            merchant_id,
            name: "Lamp".to_string(),
            description: String::new(),
            price: Money::from_cents(1000),
            remaining: 1,
            sales: 0,
            status: GoodsStatus::Active,
            image_url: None,
        }
    }

    fn order_of(customer_id: UserId) -> Order {
        Order {
            id: OrderId::new(),
            customer_id,
            status: OrderStatus::PendingPayment,
            total_amount: Money::zero(),
            created_at: Utc::now(),
            paid_at: None,
            shipped_at: None,
            completed_at: None,
            lines: Vec::new(),
        }
    }

    #[test]
    fn test_only_merchants_create_goods() {
        let merchant = Principal::merchant(UserId::new());
        let customer = Principal::customer(UserId::new());
        assert!(authorize(&merchant, Action::CreateGoods, Resource::Catalog).is_ok());
        assert!(authorize(&customer, Action::CreateGoods, Resource::Catalog).is_err());
    }

    #[test]
    fn test_manage_goods_requires_ownership() {
        let owner = Principal::merchant(UserId::new());
        let rival = Principal::merchant(UserId::new());
        let goods = goods_of(owner.user_id);
        assert!(authorize(&owner, Action::ManageGoods, Resource::Goods(&goods)).is_ok());
        assert!(authorize(&rival, Action::ManageGoods, Resource::Goods(&goods)).is_err());
    }

    #[test]
    fn test_customer_actions_require_order_owner() {
        let customer = Principal::customer(UserId::new());
        let stranger = Principal::customer(UserId::new());
        let order = order_of(customer.user_id);
        let resource = Resource::Order {
            order: &order,
            merchants: &[],
        };
        for action in [Action::PayOrder, Action::CompleteOrder, Action::CancelOrder] {
            assert!(authorize(&customer, action, resource).is_ok());
            assert!(authorize(&stranger, action, resource).is_err());
        }
    }

    #[test]
    fn test_ship_requires_line_merchant() {
        let seller = Principal::merchant(UserId::new());
        let other = Principal::merchant(UserId::new());
        let order = order_of(UserId::new());
        let merchants = [seller.user_id];
        let resource = Resource::Order {
            order: &order,
            merchants: &merchants,
        };
        assert!(authorize(&seller, Action::ShipOrder, resource).is_ok());
        assert!(authorize(&other, Action::ShipOrder, resource).is_err());

        // a customer principal is refused even with a matching id
        let customer = Principal::customer(seller.user_id);
        assert!(authorize(&customer, Action::ShipOrder, resource).is_err());
    }

    #[test]
    fn test_view_order_by_customer_or_seller() {
        let customer = Principal::customer(UserId::new());
        let seller = Principal::merchant(UserId::new());
        let order = order_of(customer.user_id);
        let merchants = [seller.user_id];
        let resource = Resource::Order {
            order: &order,
            merchants: &merchants,
        };
        assert!(authorize(&customer, Action::ViewOrder, resource).is_ok());
        assert!(authorize(&seller, Action::ViewOrder, resource).is_ok());
        assert!(
            authorize(&Principal::merchant(UserId::new()), Action::ViewOrder, resource).is_err()
        );
    }

    #[test]
    fn test_mismatched_resource_is_refused() {
        let merchant = Principal::merchant(UserId::new());
        let err = authorize(&merchant, Action::ManageGoods, Resource::Catalog).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Forbidden {
                action: Action::ManageGoods,
                ..
            }
        ));
    }

    #[test]
    fn test_merchant_data_is_private() {
        let merchant = Principal::merchant(UserId::new());
        assert!(
            authorize(
                &merchant,
                Action::ViewMerchantData,
                Resource::MerchantData(merchant.user_id)
            )
            .is_ok()
        );
        assert!(
            authorize(
                &merchant,
                Action::ViewMerchantData,
                Resource::MerchantData(UserId::new())
            )
            .is_err()
        );
    }
}
