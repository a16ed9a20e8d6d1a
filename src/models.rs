use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    businesses::Model as BusinessModel, categories::Model as CategoryModel,
    order_items::Model as OrderItemModel, orders::Model as OrderModel,
    products::Model as ProductModel, skus::Model as SkuModel, users::Model as UserModel,
};

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {}: {other}", stringify!($name))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    Role {
        User => "user",
        Seller => "seller",
        Admin => "admin",
    }
);

string_enum!(
    BusinessStatus {
        Active => "active",
        Suspended => "suspended",
        UnderReview => "under_review",
    }
);

string_enum!(
    PaymentStatus {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
        Refunded => "refunded",
    }
);

string_enum!(
    /// Lifecycle of an order; see [`OrderStatus::can_transition_to`].
    OrderStatus {
        Pending => "pending",
        Processing => "processing",
        Confirmed => "confirmed",
        Shipped => "shipped",
        Delivered => "delivered",
        Cancelled => "cancelled",
        Returned => "returned",
    }
);

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Confirmed)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Confirmed, Shipped)
                | (Confirmed, Cancelled)
                | (Shipped, Delivered)
                | (Delivered, Returned)
        )
    }

    /// Orders in these states block their sellers from leaving the platform.
    pub fn is_active_fulfilment(self) -> bool {
        matches!(self, OrderStatus::Processing | OrderStatus::Shipped)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

/// Public view of a user; never carries the password hash or refresh token.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub contact_number: Option<String>,
    pub address: Address,
    pub profile_picture: Option<String>,
    pub role: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserModel> for User {
    fn from(model: UserModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            contact_number: model.contact_number,
            address: Address {
                street: model.street,
                city: model.city,
                state: model.state,
                zip_code: model.zip_code,
                country: model.country,
            },
            profile_picture: model.profile_picture,
            role: model.role,
            is_verified: model.is_verified,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default)]
pub struct BankDetails {
    pub account_holder_name: Option<String>,
    pub account_number: Option<String>,
    pub routing_number: Option<String>,
    pub bank_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct BusinessAnalytics {
    pub total_sales: i64,
    pub total_orders: i64,
    pub total_visitors: i64,
    pub marketing_spend: i64,
    pub conversion_rate: f64,
}

impl BusinessAnalytics {
    pub fn new(total_sales: i64, total_orders: i64, total_visitors: i64, marketing_spend: i64) -> Self {
        Self {
            total_sales,
            total_orders,
            total_visitors,
            marketing_spend,
            conversion_rate: conversion_rate(total_orders, total_visitors),
        }
    }
}

/// Orders per visitor as a percentage; zero visitors count as one.
pub fn conversion_rate(total_orders: i64, total_visitors: i64) -> f64 {
    (total_orders as f64 / total_visitors.max(1) as f64) * 100.0
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Business {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub business_name: String,
    pub legal_entity_name: String,
    pub tax_id: String,
    pub address: Address,
    pub bank_details: BankDetails,
    pub analytics: BusinessAnalytics,
    pub status: String,
    pub is_verified: bool,
    pub logo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BusinessModel> for Business {
    fn from(model: BusinessModel) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            business_name: model.business_name,
            legal_entity_name: model.legal_entity_name,
            tax_id: model.tax_id,
            address: Address {
                street: model.street,
                city: model.city,
                state: model.state,
                zip_code: model.zip_code,
                country: model.country,
            },
            bank_details: BankDetails {
                account_holder_name: model.account_holder_name,
                account_number: model.account_number,
                routing_number: model.routing_number,
                bank_name: model.bank_name,
            },
            analytics: BusinessAnalytics::new(
                model.total_sales,
                model.total_orders,
                model.total_visitors,
                model.marketing_spend,
            ),
            status: model.status,
            is_verified: model.is_verified,
            logo_url: model.logo_url,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Storefront view of a business: no tax id, bank details or analytics.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublicBusiness {
    pub id: Uuid,
    pub business_name: String,
    pub address: Address,
    pub status: String,
    pub is_verified: bool,
    pub logo_url: Option<String>,
    pub owner_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub image: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CategoryModel> for Category {
    fn from(model: CategoryModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            slug: model.slug,
            description: model.description,
            parent_id: model.parent_id,
            image: model.image,
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub business_id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub discount: i64,
    pub tax: i64,
    pub images: Vec<String>,
    pub stock: i32,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductModel> for Product {
    fn from(model: ProductModel) -> Self {
        Self {
            id: model.id,
            business_id: model.business_id,
            category_id: model.category_id,
            name: model.name,
            description: model.description,
            price: model.price,
            discount: model.discount,
            tax: model.tax,
            images: model.images,
            stock: model.stock,
            is_published: model.is_published,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Sku {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku_code: String,
    pub price: i64,
    pub sale_price: Option<i64>,
    #[schema(value_type = Object)]
    pub attributes: Value,
    pub image: Option<String>,
    pub stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<SkuModel> for Sku {
    fn from(model: SkuModel) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            sku_code: model.sku_code,
            price: model.price,
            sale_price: model.sale_price,
            attributes: model.attributes,
            image: model.image,
            stock: model.stock,
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub zip_code: String,
    pub country: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub transaction_id: Option<String>,
    pub payment_status: String,
    pub total_items_price: i64,
    pub shipping_price: i64,
    pub tax_price: i64,
    pub total_amount: i64,
    pub order_status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderModel> for Order {
    fn from(model: OrderModel) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            shipping_address: ShippingAddress {
                street: model.street,
                city: model.city,
                state: model.state,
                zip_code: model.zip_code,
                country: model.country,
                phone: model.phone,
            },
            payment_method: model.payment_method,
            transaction_id: model.transaction_id,
            payment_status: model.payment_status,
            total_items_price: model.total_items_price,
            shipping_price: model.shipping_price,
            tax_price: model.tax_price,
            total_amount: model.total_amount,
            order_status: model.order_status,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub sku_id: Option<Uuid>,
    pub business_id: Uuid,
    pub product_name: String,
    pub product_image: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub sku_attributes: Option<Value>,
    pub quantity: i32,
    pub price_at_purchase: i64,
    pub discount_applied: i64,
    pub created_at: DateTime<Utc>,
}

impl From<OrderItemModel> for OrderItem {
    fn from(model: OrderItemModel) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            sku_id: model.sku_id,
            business_id: model.business_id,
            product_name: model.product_name,
            product_image: model.product_image,
            sku_attributes: model.sku_attributes,
            quantity: model.quantity,
            price_at_purchase: model.price_at_purchase,
            discount_applied: model.discount_applied,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_round_trips_through_its_text_form() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(*status));
        }
        assert!("paid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn order_status_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Cancelled));

        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Returned.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn only_processing_and_shipped_block_seller_exit() {
        let blocking: Vec<_> = OrderStatus::ALL
            .iter()
            .filter(|s| s.is_active_fulfilment())
            .collect();
        assert_eq!(blocking, vec![&OrderStatus::Processing, &OrderStatus::Shipped]);
    }

    #[test]
    fn conversion_rate_treats_zero_visitors_as_one() {
        assert_eq!(conversion_rate(3, 0), 300.0);
        assert_eq!(conversion_rate(5, 50), 10.0);
        assert_eq!(conversion_rate(0, 10), 0.0);
    }
}
