use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub text: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: Uuid,
    pub name: String,
    pub price: i64,
    pub quantity: u32,
}

/// One line of an incoming cart, before grouping per shop.
#[derive(Debug, Clone, Deserialize)]
pub struct CartLine {
    pub item_id: Uuid,
    pub shop_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub price: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShopOrderStatus {
    Pending,
    Preparing,
    OutForDelivery,
    Delivered,
}

/// The slice of a multi-shop cart belonging to one shop; the unit of
/// delivery assignment.
///
/// `assigned_courier` is only ever set while `assignment` points at a
/// claimed (assigned or completed) assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopOrder {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub owner_id: Uuid,
    pub subtotal: i64,
    pub items: Vec<OrderLine>,
    pub status: ShopOrderStatus,
    pub assignment: Option<Uuid>,
    pub assigned_courier: Option<Uuid>,
    pub delivery_otp: Option<String>,
    pub otp_expires: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub earnings: Option<i64>,
}

impl ShopOrder {
    /// A supplied code is good iff it matches the stored one and the
    /// clock has not reached the expiry instant.
    pub fn otp_valid(&self, supplied: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        match (&self.delivery_otp, self.otp_expires) {
            (Some(code), Some(expires)) if code == supplied => {
                if now < expires {
                    Ok(())
                } else {
                    Err(AppError::OtpExpired)
                }
            }
            _ => Err(AppError::InvalidOtp),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer_email: String,
    pub payment_settled: bool,
    pub delivery_address: DeliveryAddress,
    pub total_amount: i64,
    pub shop_orders: Vec<ShopOrder>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Groups cart lines per shop into shop orders. Shops keep the order
    /// in which they first appear in the cart.
    pub fn from_cart(
        customer_id: Uuid,
        customer_email: String,
        delivery_address: DeliveryAddress,
        lines: Vec<CartLine>,
    ) -> Self {
        let mut shop_orders: Vec<ShopOrder> = Vec::new();

        for line in lines {
            let order_line = OrderLine {
                item_id: line.item_id,
                name: line.name,
                price: line.price,
                quantity: line.quantity,
            };
            let amount = order_line.price * i64::from(order_line.quantity);

            match shop_orders.iter_mut().find(|so| so.shop_id == line.shop_id) {
                Some(existing) => {
                    existing.items.push(order_line);
                    existing.subtotal += amount;
                }
                None => shop_orders.push(ShopOrder {
                    id: Uuid::new_v4(),
                    shop_id: line.shop_id,
                    owner_id: line.owner_id,
                    subtotal: amount,
                    items: vec![order_line],
                    status: ShopOrderStatus::Pending,
                    assignment: None,
                    assigned_courier: None,
                    delivery_otp: None,
                    otp_expires: None,
                    delivered_at: None,
                    earnings: None,
                }),
            }
        }

        let total_amount = shop_orders.iter().map(|so| so.subtotal).sum();

        Self {
            id: Uuid::new_v4(),
            customer_id,
            customer_email,
            payment_settled: true,
            delivery_address,
            total_amount,
            shop_orders,
            created_at: Utc::now(),
        }
    }

    pub fn shop_order(&self, shop_order_id: Uuid) -> Option<&ShopOrder> {
        self.shop_orders.iter().find(|so| so.id == shop_order_id)
    }

    pub fn shop_order_mut(&mut self, shop_order_id: Uuid) -> Option<&mut ShopOrder> {
        self.shop_orders.iter_mut().find(|so| so.id == shop_order_id)
    }

    pub fn shop_order_for_shop(&self, shop_id: Uuid) -> Option<&ShopOrder> {
        self.shop_orders.iter().find(|so| so.shop_id == shop_id)
    }

    pub fn shop_order_for_shop_mut(&mut self, shop_id: Uuid) -> Option<&mut ShopOrder> {
        self.shop_orders.iter_mut().find(|so| so.shop_id == shop_id)
    }
}
