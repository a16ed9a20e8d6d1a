use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use uuid::Uuid;

use crate::{
    dto::dashboard::{RevenueSummary, SellerDashboard, StockAlert, TopCustomer, TopProduct},
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{Column as OrderCol, Entity as Orders},
        products::{Column as ProdCol, Entity as Products},
        users::{Column as UserCol, Entity as Users},
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{OrderStatus, PaymentStatus},
    response::{ApiResponse, Meta},
    services::business_service::find_owned_business,
    state::AppState,
};

pub const TOP_LIMIT: usize = 5;
pub const LOW_STOCK_THRESHOLD: i32 = 10;

/// One of the seller's line items together with the order fields the
/// dashboard needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SellerLine {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_at_purchase: i64,
    pub payment_status: String,
    pub order_status: String,
    pub order_created_at: DateTime<Utc>,
}

impl SellerLine {
    fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid.as_str()
    }
}

pub fn summarize_revenue(lines: &[SellerLine]) -> RevenueSummary {
    let mut orders = HashSet::new();
    let mut pending = HashSet::new();
    let mut delivered = HashSet::new();
    let mut total_revenue = 0;

    for line in lines {
        orders.insert(line.order_id);
        if line.is_paid() {
            total_revenue += line.price_at_purchase;
        }
        if line.order_status == OrderStatus::Pending.as_str() {
            pending.insert(line.order_id);
        } else if line.order_status == OrderStatus::Delivered.as_str() {
            delivered.insert(line.order_id);
        }
    }

    RevenueSummary {
        total_revenue,
        total_orders: orders.len() as i64,
        pending_orders: pending.len() as i64,
        delivered_orders: delivered.len() as i64,
    }
}

/// Products ranked by how many line items reference them. Equal counts keep
/// the order in which the products first appear in `lines`.
pub fn rank_top_products(lines: &[SellerLine], limit: usize) -> Vec<TopProduct> {
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut ranked: Vec<TopProduct> = Vec::new();

    for line in lines {
        let slot = *index.entry(line.product_id).or_insert_with(|| {
            ranked.push(TopProduct {
                product_id: line.product_id,
                name: None,
                image: None,
                total_sold: 0,
                units_sold: 0,
                revenue: 0,
            });
            ranked.len() - 1
        });
        let entry = &mut ranked[slot];
        entry.total_sold += 1;
        entry.units_sold += i64::from(line.quantity);
        entry.revenue += line.price_at_purchase;
    }

    ranked.sort_by(|a, b| b.total_sold.cmp(&a.total_sold));
    ranked.truncate(limit);
    ranked
}

/// Buyers ranked by what they paid this seller. Unpaid orders do not count.
pub fn rank_top_customers(lines: &[SellerLine], limit: usize) -> Vec<TopCustomer> {
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut ranked: Vec<TopCustomer> = Vec::new();
    let mut orders: Vec<HashSet<Uuid>> = Vec::new();

    for line in lines.iter().filter(|l| l.is_paid()) {
        let slot = *index.entry(line.user_id).or_insert_with(|| {
            ranked.push(TopCustomer {
                user_id: line.user_id,
                name: None,
                email: None,
                total_spent: 0,
                order_count: 0,
                last_purchase: line.order_created_at,
            });
            orders.push(HashSet::new());
            ranked.len() - 1
        });
        let entry = &mut ranked[slot];
        entry.total_spent += line.price_at_purchase;
        if orders[slot].insert(line.order_id) {
            entry.order_count += 1;
        }
        if line.order_created_at > entry.last_purchase {
            entry.last_purchase = line.order_created_at;
        }
    }

    ranked.sort_by(|a, b| b.total_spent.cmp(&a.total_spent));
    ranked.truncate(limit);
    ranked
}

async fn load_seller_lines(state: &AppState, business_id: Uuid) -> AppResult<Vec<SellerLine>> {
    let rows = OrderItems::find()
        .find_also_related(Orders)
        .filter(OrderItemCol::BusinessId.eq(business_id))
        .order_by_asc(OrderCol::CreatedAt)
        .order_by_asc(OrderItemCol::Id)
        .all(&state.orm)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(item, order)| {
            let order = order?;
            Some(SellerLine {
                order_id: order.id,
                user_id: order.user_id,
                product_id: item.product_id,
                quantity: item.quantity,
                price_at_purchase: item.price_at_purchase,
                payment_status: order.payment_status,
                order_status: order.order_status,
                order_created_at: order.created_at.with_timezone(&Utc),
            })
        })
        .collect())
}

async fn load_stock_alerts(state: &AppState, business_id: Uuid) -> AppResult<Vec<StockAlert>> {
    let products = Products::find()
        .filter(ProdCol::BusinessId.eq(business_id))
        .filter(ProdCol::IsDeleted.eq(false))
        .filter(ProdCol::Stock.lt(LOW_STOCK_THRESHOLD))
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt)
        .limit(TOP_LIMIT as u64)
        .all(&state.orm)
        .await?;

    Ok(products
        .into_iter()
        .map(|p| StockAlert {
            product_id: p.id,
            name: p.name,
            stock: p.stock,
            price: p.price,
        })
        .collect())
}

/// Revenue summary, best sellers, low stock and best customers for one
/// seller.
pub async fn get_seller_dashboard(state: &AppState, business_id: Uuid) -> AppResult<SellerDashboard> {
    let (lines, stock_alerts) = tokio::try_join!(
        load_seller_lines(state, business_id),
        load_stock_alerts(state, business_id),
    )?;

    let summary = summarize_revenue(&lines);
    let mut top_products = rank_top_products(&lines, TOP_LIMIT);
    let mut top_customers = rank_top_customers(&lines, TOP_LIMIT);

    let product_ids: Vec<Uuid> = top_products.iter().map(|p| p.product_id).collect();
    let user_ids: Vec<Uuid> = top_customers.iter().map(|c| c.user_id).collect();
    let (products, users) = tokio::try_join!(
        async {
            if product_ids.is_empty() {
                return Ok(Vec::new());
            }
            Products::find()
                .filter(ProdCol::Id.is_in(product_ids))
                .all(&state.orm)
                .await
        },
        async {
            if user_ids.is_empty() {
                return Ok(Vec::new());
            }
            Users::find()
                .filter(UserCol::Id.is_in(user_ids))
                .all(&state.orm)
                .await
        },
    )?;

    let products: HashMap<Uuid, _> = products.into_iter().map(|p| (p.id, p)).collect();
    for entry in &mut top_products {
        if let Some(product) = products.get(&entry.product_id) {
            entry.name = Some(product.name.clone());
            entry.image = product.images.first().cloned();
        }
    }
    let users: HashMap<Uuid, _> = users.into_iter().map(|u| (u.id, u)).collect();
    for entry in &mut top_customers {
        if let Some(user) = users.get(&entry.user_id) {
            entry.name = Some(user.name.clone());
            entry.email = Some(user.email.clone());
        }
    }

    tracing::debug!(
        business_id = %business_id,
        lines = lines.len(),
        "seller dashboard computed"
    );

    Ok(SellerDashboard {
        summary,
        top_products,
        stock_alerts,
        top_customers,
    })
}

/// Dashboard for the caller's own business.
pub async fn my_dashboard(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<SellerDashboard>> {
    let business = find_owned_business(&state.orm, user.user_id).await?;
    let dashboard = get_seller_dashboard(state, business.id).await?;
    Ok(ApiResponse::success(
        "Dashboard data fetched",
        dashboard,
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
    }

    fn line(
        order_id: Uuid,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        price: i64,
        payment: &str,
        status: &str,
        minute: u32,
    ) -> SellerLine {
        SellerLine {
            order_id,
            user_id,
            product_id,
            quantity,
            price_at_purchase: price,
            payment_status: payment.to_string(),
            order_status: status.to_string(),
            order_created_at: at(minute),
        }
    }

    #[test]
    fn seller_without_orders_reports_zeros() {
        assert_eq!(summarize_revenue(&[]), RevenueSummary::default());
        assert!(rank_top_products(&[], TOP_LIMIT).is_empty());
        assert!(rank_top_customers(&[], TOP_LIMIT).is_empty());
    }

    #[test]
    fn revenue_counts_paid_lines_and_distinct_orders() {
        let (o1, o2, o3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let buyer = Uuid::new_v4();
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        let lines = vec![
            line(o1, buyer, p1, 1, 1_000, "paid", "delivered", 1),
            line(o1, buyer, p2, 2, 500, "paid", "delivered", 1),
            line(o2, buyer, p1, 1, 1_000, "pending", "pending", 2),
            line(o3, buyer, p2, 1, 250, "refunded", "cancelled", 3),
        ];

        let summary = summarize_revenue(&lines);

        assert_eq!(summary.total_revenue, 1_500);
        assert_eq!(summary.total_orders, 3);
        assert_eq!(summary.pending_orders, 1);
        assert_eq!(summary.delivered_orders, 1);
    }

    #[test]
    fn top_products_rank_by_line_count_and_cap_at_five() {
        let buyer = Uuid::new_v4();
        let products: Vec<Uuid> = (0..7).map(|_| Uuid::new_v4()).collect();
        let mut lines = Vec::new();
        for (rank, product) in products.iter().enumerate() {
            for _ in 0..=rank {
                lines.push(line(Uuid::new_v4(), buyer, *product, 2, 100, "paid", "delivered", 0));
            }
        }

        let top = rank_top_products(&lines, TOP_LIMIT);

        assert_eq!(top.len(), 5);
        assert_eq!(top[0].product_id, products[6]);
        assert_eq!(top[0].total_sold, 7);
        assert_eq!(top[0].units_sold, 14);
        assert_eq!(top[0].revenue, 700);
        assert!(top.windows(2).all(|w| w[0].total_sold >= w[1].total_sold));
    }

    #[test]
    fn ties_keep_first_appearance_order() {
        let buyer = Uuid::new_v4();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let order = Uuid::new_v4();
        let lines = vec![
            line(order, buyer, b, 1, 100, "paid", "pending", 0),
            line(order, buyer, a, 1, 100, "paid", "pending", 0),
            line(order, buyer, c, 1, 100, "paid", "pending", 0),
        ];

        let ids: Vec<Uuid> = rank_top_products(&lines, TOP_LIMIT)
            .into_iter()
            .map(|p| p.product_id)
            .collect();

        assert_eq!(ids, vec![b, a, c]);
    }

    #[test]
    fn top_customers_sum_paid_spend_only() {
        let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let product = Uuid::new_v4();
        let alice_first = Uuid::new_v4();
        let alice_second = Uuid::new_v4();
        let lines = vec![
            line(alice_first, alice, product, 1, 300, "paid", "delivered", 1),
            line(alice_first, alice, product, 1, 200, "paid", "delivered", 1),
            line(Uuid::new_v4(), bob, product, 1, 900, "paid", "processing", 2),
            line(alice_second, alice, product, 1, 100, "paid", "shipped", 5),
            line(Uuid::new_v4(), carol, product, 1, 5_000, "pending", "pending", 6),
        ];

        let top = rank_top_customers(&lines, TOP_LIMIT);

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].user_id, bob);
        assert_eq!(top[0].total_spent, 900);
        assert_eq!(top[1].user_id, alice);
        assert_eq!(top[1].total_spent, 600);
        assert_eq!(top[1].order_count, 2);
        assert_eq!(top[1].last_purchase, at(5));
    }

    #[test]
    fn top_customers_cap_at_five_sorted_descending() {
        let product = Uuid::new_v4();
        let lines: Vec<SellerLine> = (1..=8)
            .map(|i| line(Uuid::new_v4(), Uuid::new_v4(), product, 1, i * 100, "paid", "delivered", 0))
            .collect();

        let top = rank_top_customers(&lines, TOP_LIMIT);

        assert_eq!(top.len(), 5);
        assert_eq!(top[0].total_spent, 800);
        assert!(top.windows(2).all(|w| w[0].total_spent >= w[1].total_spent));
    }
}
