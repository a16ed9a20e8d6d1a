use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, QueryTrait, Set, TransactionTrait,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::orders::{CheckoutRequest, OrderList, OrderWithItems, PayOrderRequest, UpdateOrderStatusRequest},
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products},
        skus::{Column as SkuCol, Entity as Skus},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus, PaymentStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::business_service::find_owned_business,
    state::AppState,
};

pub fn parse_order_status(status: &str) -> AppResult<OrderStatus> {
    status
        .trim()
        .to_lowercase()
        .parse::<OrderStatus>()
        .map_err(|_| AppError::BadRequest("Invalid order status".into()))
}

/// Line total after discount: `(unit_price - discount) * quantity`, with
/// the discount capped at the unit price. Returns `(price, discount)`.
pub fn line_price(unit_price: i64, discount: i64, quantity: i32) -> (i64, i64) {
    let discount = discount.clamp(0, unit_price.max(0));
    let quantity = i64::from(quantity);
    ((unit_price - discount) * quantity, discount * quantity)
}

/// Apply a status change on `conn`. Cancelling puts the stock back and
/// refunds a paid order.
pub async fn apply_status_change<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    next: OrderStatus,
) -> AppResult<OrderModel> {
    let current = parse_order_status(&order.order_status)?;
    if !current.can_transition_to(next) {
        return Err(AppError::BadRequest(format!(
            "Cannot change order status from {current} to {next}"
        )));
    }

    if next == OrderStatus::Cancelled {
        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order.id))
            .all(conn)
            .await?;
        for item in &items {
            match item.sku_id {
                Some(sku_id) => {
                    Skus::update_many()
                        .col_expr(SkuCol::Stock, Expr::col(SkuCol::Stock).add(item.quantity))
                        .filter(SkuCol::Id.eq(sku_id))
                        .exec(conn)
                        .await?;
                }
                None => {
                    Products::update_many()
                        .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(item.quantity))
                        .filter(ProdCol::Id.eq(item.product_id))
                        .exec(conn)
                        .await?;
                }
            }
        }
    }

    let refund = next == OrderStatus::Cancelled && order.payment_status == PaymentStatus::Paid.as_str();
    let mut active: OrderActive = order.into();
    active.order_status = Set(next.as_str().to_string());
    if refund {
        active.payment_status = Set(PaymentStatus::Refunded.as_str().to_string());
    }
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(conn).await?)
}

async fn order_with_items<C: ConnectionTrait>(conn: &C, order: OrderModel) -> AppResult<OrderWithItems> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();
    Ok(OrderWithItems {
        order: Order::from(order),
        items,
    })
}

/// Paginated order listing shared by buyers, sellers and admins; `scope`
/// narrows which orders are visible.
pub async fn paginate_orders(
    state: &AppState,
    scope: Condition,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = scope;
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status = parse_order_status(status)?;
        condition = condition.add(OrderCol::OrderStatus.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    paginate_orders(
        state,
        Condition::all().add(OrderCol::UserId.eq(user.user_id)),
        query,
    )
    .await
}

/// Orders that contain at least one of the caller's products.
pub async fn seller_list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let business = find_owned_business(&state.orm, user.user_id).await?;
    let seller_orders = OrderItems::find()
        .select_only()
        .column(OrderItemCol::OrderId)
        .filter(OrderItemCol::BusinessId.eq(business.id))
        .into_query();
    paginate_orders(
        state,
        Condition::all().add(OrderCol::Id.in_subquery(seller_orders)),
        query,
    )
    .await
}

struct PendingLine {
    product_id: Uuid,
    sku_id: Option<Uuid>,
    business_id: Uuid,
    name: String,
    image: Option<String>,
    attributes: Option<serde_json::Value>,
    quantity: i32,
    price: i64,
    discount: i64,
}

/// Turn the caller's cart into a pending order. Products and SKUs are
/// locked for the duration so concurrent checkouts cannot oversell.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    payload.validate()?;
    let txn = state.orm.begin().await?;

    let cart = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::CreatedAt)
        .all(&txn)
        .await?;
    if cart.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let product_ids: Vec<Uuid> = cart.iter().map(|c| c.product_id).collect();
    let sku_ids: Vec<Uuid> = cart.iter().filter_map(|c| c.sku_id).collect();
    let products: HashMap<Uuid, _> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let skus: HashMap<Uuid, _> = if sku_ids.is_empty() {
        HashMap::new()
    } else {
        Skus::find()
            .filter(SkuCol::Id.is_in(sku_ids))
            .lock(LockType::Update)
            .all(&txn)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect()
    };

    let mut remaining: HashMap<Uuid, i32> = HashMap::new();
    let mut lines = Vec::with_capacity(cart.len());
    let mut tax_price: i64 = 0;
    for entry in &cart {
        let product = products
            .get(&entry.product_id)
            .filter(|p| p.is_published && !p.is_deleted)
            .ok_or_else(|| {
                AppError::BadRequest(format!("Product {} is no longer available", entry.product_id))
            })?;

        let (stock_key, stock, unit_price, discount, attributes) = match entry.sku_id {
            Some(sku_id) => {
                let sku = skus
                    .get(&sku_id)
                    .filter(|s| s.is_active && s.product_id == product.id)
                    .ok_or_else(|| {
                        AppError::BadRequest(format!("SKU {sku_id} is no longer available"))
                    })?;
                let discount = sku.sale_price.map_or(0, |sale| sku.price - sale);
                (sku.id, sku.stock, sku.price, discount, Some(sku.attributes.clone()))
            }
            None => (product.id, product.stock, product.price, product.discount, None),
        };

        let left = remaining.entry(stock_key).or_insert(stock);
        if *left < entry.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                product.name
            )));
        }
        *left -= entry.quantity;

        let (price, discount) = line_price(unit_price, discount, entry.quantity);
        tax_price += product.tax * i64::from(entry.quantity);
        lines.push(PendingLine {
            product_id: product.id,
            sku_id: entry.sku_id,
            business_id: product.business_id,
            name: product.name.clone(),
            image: product.images.first().cloned(),
            attributes,
            quantity: entry.quantity,
            price,
            discount,
        });
    }

    let total_items_price: i64 = lines.iter().map(|l| l.price).sum();
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        street: Set(payload.street),
        city: Set(payload.city),
        state: Set(payload.state),
        zip_code: Set(payload.zip_code),
        country: Set(payload.country),
        phone: Set(payload.phone),
        payment_method: Set(payload.payment_method),
        transaction_id: Set(None),
        payment_status: Set(PaymentStatus::Pending.as_str().to_string()),
        total_items_price: Set(total_items_price),
        shipping_price: Set(payload.shipping_price),
        tax_price: Set(tax_price),
        total_amount: Set(total_items_price + payload.shipping_price + tax_price),
        order_status: Set(OrderStatus::Pending.as_str().to_string()),
        paid_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut order_items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for line in lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            sku_id: Set(line.sku_id),
            business_id: Set(line.business_id),
            product_name: Set(line.name),
            product_image: Set(line.image),
            sku_attributes: Set(line.attributes),
            quantity: Set(line.quantity),
            price_at_purchase: Set(line.price),
            discount_applied: Set(line.discount),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        order_items.push(OrderItem::from(item));

        match line.sku_id {
            Some(sku_id) => {
                Skus::update_many()
                    .col_expr(SkuCol::Stock, Expr::col(SkuCol::Stock).sub(line.quantity))
                    .filter(SkuCol::Id.eq(sku_id))
                    .exec(&txn)
                    .await?;
            }
            None => {
                Products::update_many()
                    .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(line.quantity))
                    .filter(ProdCol::Id.eq(line.product_id))
                    .exec(&txn)
                    .await?;
            }
        }
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "checkout",
        "orders",
        serde_json::json!({ "order_id": order.id, "total_amount": order.total_amount }),
    )
    .await;
    tracing::info!(order_id = %order.id, items = order_items.len(), "order placed");

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems {
            order: Order::from(order),
            items: order_items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn pay_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: PayOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.transaction_id.trim().is_empty() {
        return Err(AppError::Validation("transaction_id is required".into()));
    }
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;

    if order.payment_status != PaymentStatus::Pending.as_str() {
        return Err(AppError::BadRequest("Order already paid".into()));
    }
    if order.order_status != OrderStatus::Pending.as_str() {
        return Err(AppError::BadRequest(format!(
            "Cannot pay an order that is {}",
            order.order_status
        )));
    }

    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.payment_status = Set(PaymentStatus::Paid.as_str().to_string());
    active.order_status = Set(OrderStatus::Processing.as_str().to_string());
    active.transaction_id = Set(Some(payload.transaction_id.trim().to_string()));
    active.paid_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;

    let data = order_with_items(&txn, order).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "order_paid",
        "orders",
        serde_json::json!({ "order_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payment recorded",
        data,
        Some(Meta::empty()),
    ))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;

    let order = apply_status_change(&txn, order, OrderStatus::Cancelled).await?;
    let data = order_with_items(&txn, order).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "order_cancel",
        "orders",
        serde_json::json!({ "order_id": id, "payment_status": data.order.payment_status }),
    )
    .await;
    tracing::info!(order_id = %id, "order cancelled by buyer");

    Ok(ApiResponse::success(
        "Order cancelled",
        data,
        Some(Meta::empty()),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;

    Ok(ApiResponse::success(
        "OK",
        order_with_items(&state.orm, order).await?,
        Some(Meta::empty()),
    ))
}

/// Move an order to a new status. With `seller` set, every line item must
/// belong to that business.
pub async fn transition_order(
    state: &AppState,
    actor: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
    seller: Option<Uuid>,
) -> AppResult<ApiResponse<Order>> {
    let next = parse_order_status(&payload.status)?;
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;

    if let Some(business_id) = seller {
        let foreign = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(id))
            .filter(OrderItemCol::BusinessId.ne(business_id))
            .count(&txn)
            .await?;
        let own = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(id))
            .filter(OrderItemCol::BusinessId.eq(business_id))
            .count(&txn)
            .await?;
        if own == 0 {
            return Err(AppError::not_found("Order"));
        }
        if foreign > 0 {
            return Err(AppError::Forbidden);
        }
    }

    let previous = order.order_status.clone();
    let order = apply_status_change(&txn, order, next).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(actor.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "from": previous, "to": order.order_status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        Order::from(order),
        Some(Meta::empty()),
    ))
}

pub async fn update_order_status_as_seller(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    let business = find_owned_business(&state.orm, user.user_id).await?;
    transition_order(state, user, id, payload, Some(business.id)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_price_subtracts_discount_per_unit() {
        assert_eq!(line_price(1_000, 100, 3), (2_700, 300));
        assert_eq!(line_price(1_000, 0, 1), (1_000, 0));
    }

    #[test]
    fn line_price_caps_discount_at_unit_price() {
        assert_eq!(line_price(500, 800, 2), (0, 1_000));
        assert_eq!(line_price(500, -50, 2), (1_000, 0));
    }

    #[test]
    fn parse_order_status_is_case_insensitive() {
        assert_eq!(parse_order_status(" Shipped ").unwrap(), OrderStatus::Shipped);
        assert!(parse_order_status("completed").is_err());
    }
}
