use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Default)]
pub struct RevenueSummary {
    pub total_revenue: i64,
    pub total_orders: i64,
    pub pending_orders: i64,
    pub delivered_orders: i64,
}

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub name: Option<String>,
    pub image: Option<String>,
    /// Number of line items; the ranking metric.
    pub total_sold: i64,
    pub units_sold: i64,
    pub revenue: i64,
}

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq)]
pub struct StockAlert {
    pub product_id: Uuid,
    pub name: String,
    pub stock: i32,
    pub price: i64,
}

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq)]
pub struct TopCustomer {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub total_spent: i64,
    pub order_count: i64,
    pub last_purchase: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SellerDashboard {
    pub summary: RevenueSummary,
    pub top_products: Vec<TopProduct>,
    pub stock_alerts: Vec<StockAlert>,
    pub top_customers: Vec<TopCustomer>,
}
