use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Product, Sku};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub category_id: Uuid,
    #[validate(range(min = 1))]
    pub price: i64,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub discount: i64,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub tax: i64,
    #[serde(default)]
    pub images: Vec<String>,
    #[validate(range(min = 0))]
    pub stock: i32,
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Debug, Deserialize, ToSchema, Validate, Default)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub price: Option<i64>,
    #[validate(range(min = 0))]
    pub discount: Option<i64>,
    #[validate(range(min = 0))]
    pub tax: Option<i64>,
    pub images: Option<Vec<String>>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSkuRequest {
    #[validate(length(min = 1, max = 64))]
    pub sku_code: String,
    #[validate(range(min = 1))]
    pub price: i64,
    #[validate(range(min = 1))]
    pub sale_price: Option<i64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub image: Option<String>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub stock: i32,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

#[derive(Serialize, ToSchema)]
pub struct ProductDetail {
    pub product: Product,
    pub skus: Vec<Sku>,
}

/// Signed stock change; the result may not go below zero.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryAdjustRequest {
    pub delta: i32,
}
