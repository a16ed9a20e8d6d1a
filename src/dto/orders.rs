use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Order, OrderItem};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1))]
    pub street: String,
    #[validate(length(min = 1))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1))]
    pub zip_code: String,
    #[validate(length(min = 1))]
    pub country: String,
    pub phone: Option<String>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub shipping_price: i64,
}

fn default_payment_method() -> String {
    "card".to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PayOrderRequest {
    pub transaction_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
