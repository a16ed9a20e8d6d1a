mod common;

use marketplace_api::{
    dto::{
        business::{CreateBusinessRequest, UpdateBusinessStatusRequest},
        cart::AddToCartRequest,
        categories::CreateCategoryRequest,
        orders::{CheckoutRequest, PayOrderRequest, UpdateOrderStatusRequest},
        products::CreateProductRequest,
    },
    entity::{Products, Users},
    error::AppError,
    middleware::auth::AuthUser,
    models::{Product, Role},
    routes::params::{LowStockQuery, Pagination, ProductQuery},
    services::{
        admin_service, business_service, cart_service, category_service, dashboard_service,
        order_service, product_service,
    },
    state::AppState,
};
use sea_orm::EntityTrait;
use uuid::Uuid;

fn checkout_request() -> CheckoutRequest {
    CheckoutRequest {
        street: "1 Crab Lane".into(),
        city: "Portland".into(),
        state: Some("OR".into()),
        zip_code: "97201".into(),
        country: "US".into(),
        phone: None,
        payment_method: "card".into(),
        shipping_price: 0,
    }
}

async fn place_order(
    state: &AppState,
    buyer: &AuthUser,
    product_id: Uuid,
    quantity: i32,
) -> anyhow::Result<Uuid> {
    cart_service::add_to_cart(
        state,
        buyer,
        AddToCartRequest {
            product_id,
            sku_id: None,
            quantity,
        },
    )
    .await?;
    let resp = order_service::checkout(state, buyer, checkout_request()).await?;
    Ok(resp.data.unwrap().order.id)
}

async fn open_business(
    state: &AppState,
    admin: &AuthUser,
    owner: &AuthUser,
    name: &str,
) -> anyhow::Result<Uuid> {
    let business = business_service::create_business(
        state,
        owner,
        CreateBusinessRequest {
            business_name: name.into(),
            legal_entity_name: format!("{name} LLC"),
            tax_id: format!("TAX-{}", Uuid::new_v4()),
            ..Default::default()
        },
    )
    .await?
    .data
    .unwrap();
    business_service::update_business_status(
        state,
        admin,
        business.id,
        UpdateBusinessStatusRequest {
            status: "active".into(),
        },
    )
    .await?;
    Ok(business.id)
}

async fn stocked_product(
    state: &AppState,
    seller: &AuthUser,
    category_id: Uuid,
    name: &str,
    stock: i32,
) -> anyhow::Result<Product> {
    let product = product_service::create_product(
        state,
        seller,
        CreateProductRequest {
            name: name.into(),
            description: format!("{name} for the kitchen"),
            category_id,
            price: 500,
            discount: 0,
            tax: 0,
            images: Vec::new(),
            stock,
            is_published: true,
        },
    )
    .await?
    .data
    .unwrap();
    Ok(product)
}

fn status(to: &str) -> UpdateOrderStatusRequest {
    UpdateOrderStatusRequest { status: to.into() }
}

// Integration flow: seller onboarding -> checkout -> pay/cancel -> fulfilment;
// dashboard figures and business deletion rules along the way.
#[tokio::test]
async fn checkout_dashboard_and_business_deletion_flow() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = common::setup_state(&database_url).await?;

    let admin = common::create_user(&state, Role::Admin, "Admin").await?;
    let buyer = common::create_user(&state, Role::User, "Buyer").await?;
    let mut seller = common::create_user(&state, Role::User, "Seller").await?;

    // Seller onboarding; products need an active business.
    let business_id = open_business(&state, &admin, &seller, "Crab Shack").await?;
    seller.role = Role::Seller;

    let category = category_service::create_category(
        &state,
        &admin,
        CreateCategoryRequest {
            name: "Kitchen".into(),
            description: None,
            parent_id: None,
            image: None,
        },
    )
    .await?
    .data
    .unwrap();

    let product = product_service::create_product(
        &state,
        &seller,
        CreateProductRequest {
            name: "Cast Iron Pan".into(),
            description: "Seasoned".into(),
            category_id: category.id,
            price: 1_000,
            discount: 100,
            tax: 0,
            images: vec!["https://img.example.com/upload/v1/pan.jpg".into()],
            stock: 10,
            is_published: true,
        },
    )
    .await?
    .data
    .unwrap();

    // First order: 2 units at 900 each, paid and shipped.
    let first = place_order(&state, &buyer, product.id, 2).await?;
    let paid = order_service::pay_order(
        &state,
        &buyer,
        first,
        PayOrderRequest {
            transaction_id: "txn-1".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(paid.order.order_status, "processing");
    assert_eq!(paid.order.payment_status, "paid");
    assert_eq!(paid.items[0].price_at_purchase, 1_800);

    // Second order: paid then cancelled; stock comes back and payment is refunded.
    let second = place_order(&state, &buyer, product.id, 1).await?;
    order_service::pay_order(
        &state,
        &buyer,
        second,
        PayOrderRequest {
            transaction_id: "txn-2".into(),
        },
    )
    .await?;
    let cancelled = order_service::cancel_order(&state, &buyer, second).await?.data.unwrap();
    assert_eq!(cancelled.order.order_status, "cancelled");
    assert_eq!(cancelled.order.payment_status, "refunded");

    let stock = Products::find_by_id(product.id).one(&state.orm).await?.unwrap().stock;
    assert_eq!(stock, 8);

    order_service::update_order_status_as_seller(&state, &seller, first, status("shipped")).await?;

    // Illegal transition.
    let err = admin_service::update_order_status(&state, &admin, first, status("pending"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let dashboard = dashboard_service::get_seller_dashboard(&state, business_id).await?;
    assert_eq!(dashboard.summary.total_revenue, 1_800);
    assert_eq!(dashboard.summary.total_orders, 2);
    assert_eq!(dashboard.summary.pending_orders, 0);
    assert_eq!(dashboard.top_products.len(), 1);
    assert_eq!(dashboard.top_products[0].total_sold, 2);
    assert_eq!(dashboard.top_products[0].units_sold, 3);
    assert_eq!(dashboard.top_products[0].name.as_deref(), Some("Cast Iron Pan"));
    assert_eq!(dashboard.stock_alerts.len(), 1);
    assert_eq!(dashboard.stock_alerts[0].stock, 8);
    assert_eq!(dashboard.top_customers.len(), 1);
    assert_eq!(dashboard.top_customers[0].user_id, buyer.user_id);
    assert_eq!(dashboard.top_customers[0].total_spent, 1_800);
    assert_eq!(dashboard.top_customers[0].order_count, 1);

    // Wildcards in search text and category filters match literally.
    let by_category = |category: &str| ProductQuery {
        category: Some(category.into()),
        ..Default::default()
    };
    let listed = product_service::list_products(&state, by_category("kitchen")).await?;
    assert_eq!(listed.data.unwrap().items.len(), 1);
    let listed = product_service::list_products(&state, by_category("%")).await?;
    assert!(listed.data.unwrap().items.is_empty());
    let listed = product_service::list_products(
        &state,
        ProductQuery {
            q: Some("%".into()),
            ..Default::default()
        },
    )
    .await?;
    assert!(listed.data.unwrap().items.is_empty());

    // Stock alerts: only this seller's live products under 10, lowest first, at most 5.
    let rival = common::create_user(&state, Role::User, "Rival").await?;
    open_business(&state, &admin, &rival, "Rival Goods").await?;
    stocked_product(&state, &rival, category.id, "Rival Skillet", 1).await?;
    stocked_product(&state, &seller, category.id, "Full Shelf", 10).await?;
    let retired_lid = stocked_product(&state, &seller, category.id, "Retired Lid", 0).await?;
    product_service::delete_product(&state, &seller, retired_lid.id).await?;
    for (name, stock) in [("Wok", 6), ("Ladle", 2), ("Whisk", 9), ("Tongs", 4), ("Sieve", 3)] {
        stocked_product(&state, &seller, category.id, name, stock).await?;
    }

    let alerts = dashboard_service::get_seller_dashboard(&state, business_id)
        .await?
        .stock_alerts;
    let names: Vec<&str> = alerts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Ladle", "Sieve", "Tongs", "Wok", "Cast Iron Pan"]);
    let stocks: Vec<i32> = alerts.iter().map(|a| a.stock).collect();
    assert_eq!(stocks, vec![2, 3, 4, 6, 8]);

    // A shipped order blocks deletion.
    let err = business_service::delete_business(&state, &seller).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let low = admin_service::list_low_stock(
        &state,
        &admin,
        LowStockQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(20),
            },
            threshold: Some(10),
        },
    )
    .await?;
    assert!(
        low.data.unwrap().items.iter().any(|p| p.id == product.id),
        "expected product to appear in low-stock list"
    );

    // Once delivered the seller may leave; history stays.
    admin_service::update_order_status(&state, &admin, first, status("delivered")).await?;
    business_service::delete_business(&state, &seller).await?;

    let retired = Products::find_by_id(product.id).one(&state.orm).await?.unwrap();
    assert!(!retired.is_published);
    assert!(retired.is_deleted);

    let owner = Users::find_by_id(seller.user_id).one(&state.orm).await?.unwrap();
    assert_eq!(owner.role, Role::User.as_str());

    let history = admin_service::get_order_admin(&state, &admin, first).await?.data.unwrap();
    assert_eq!(history.items.len(), 1);
    assert_eq!(history.items[0].product_name, "Cast Iron Pan");

    Ok(())
}
