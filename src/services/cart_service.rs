use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartItemDto, CartList},
    entity::{
        cart_items::{ActiveModel as CartActive, Column as CartCol, Entity as CartItems},
        products::Entity as Products,
        skus::Entity as Skus,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub async fn list_cart(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_desc(CartCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let rows = finder
        .find_also_related(Products)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let items = rows
        .into_iter()
        .filter_map(|(item, product)| {
            product.map(|product| CartItemDto {
                id: item.id,
                product: Product::from(product),
                sku_id: item.sku_id,
                quantity: item.quantity,
            })
        })
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("OK", CartList { items }, Some(meta)))
}

/// Add a product (optionally a specific SKU) to the cart. Adding the same
/// product and SKU again increases the quantity of the existing line.
pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItemDto>> {
    payload.validate()?;

    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .filter(|p| p.is_published && !p.is_deleted)
        .ok_or_else(|| AppError::BadRequest("product not found".to_string()))?;

    let available = match payload.sku_id {
        Some(sku_id) => {
            Skus::find_by_id(sku_id)
                .one(&state.orm)
                .await?
                .filter(|s| s.product_id == product.id && s.is_active)
                .ok_or_else(|| AppError::BadRequest("sku not found".to_string()))?
                .stock
        }
        None => product.stock,
    };

    let mut finder = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::ProductId.eq(payload.product_id));
    finder = match payload.sku_id {
        Some(sku_id) => finder.filter(CartCol::SkuId.eq(sku_id)),
        None => finder.filter(CartCol::SkuId.is_null()),
    };
    let exist = finder.one(&state.orm).await?;

    let quantity = exist.as_ref().map_or(0, |item| item.quantity) + payload.quantity;
    if quantity > available {
        return Err(AppError::BadRequest(format!(
            "Only {available} items in stock"
        )));
    }

    let cart_item = match exist {
        Some(item) => {
            let mut active: CartActive = item.into();
            active.quantity = Set(quantity);
            active.update(&state.orm).await?
        }
        None => {
            CartActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                product_id: Set(payload.product_id),
                sku_id: Set(payload.sku_id),
                quantity: Set(quantity),
                created_at: NotSet,
            }
            .insert(&state.orm)
            .await?
        }
    };

    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "product_id": payload.product_id, "sku_id": payload.sku_id, "quantity": quantity }),
    )
    .await;

    Ok(ApiResponse::success(
        "OK",
        CartItemDto {
            id: cart_item.id,
            product: Product::from(product),
            sku_id: cart_item.sku_id,
            quantity: cart_item.quantity,
        },
        Some(Meta::empty()),
    ))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(CartCol::ProductId.eq(product_id))
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found("Cart item"));
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_remove",
        "cart_items",
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
