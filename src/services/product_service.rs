use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::products::{CreateProductRequest, CreateSkuRequest, ProductDetail, ProductList, UpdateProductRequest},
    entity::{
        businesses::Model as BusinessModel,
        cart_items::{Column as CartCol, Entity as CartItems},
        categories::{Column as CategoryCol, Entity as Categories},
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
        skus::{ActiveModel as SkuActive, Column as SkuCol, Entity as Skus},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{BusinessStatus, Product, Role, Sku},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder, escape_like},
    services::business_service::find_owned_business,
    state::AppState,
};

/// The caller's business, which must be active to sell.
async fn selling_business<C: ConnectionTrait>(conn: &C, user: &AuthUser) -> AppResult<BusinessModel> {
    let business = find_owned_business(conn, user.user_id).await?;
    if business.status != BusinessStatus::Active.as_str() {
        return Err(AppError::Forbidden);
    }
    Ok(business)
}

/// A live product the caller may edit: their own, or any for admins.
async fn editable_product(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ProductModel> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .filter(|p| !p.is_deleted)
        .ok_or_else(|| AppError::not_found("Product"))?;
    if user.role == Role::Admin {
        return Ok(product);
    }
    let business = selling_business(&state.orm, user).await?;
    if product.business_id != business.id {
        return Err(AppError::Forbidden);
    }
    Ok(product)
}

async fn ensure_category<C: ConnectionTrait>(conn: &C, category_id: Uuid) -> AppResult<()> {
    Categories::find_by_id(category_id)
        .one(conn)
        .await?
        .filter(|c| c.is_active)
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("Category"))
}

/// Ids of the category with this slug and of all its descendants.
async fn category_subtree_ids<C: ConnectionTrait>(conn: &C, slug: &str) -> AppResult<Vec<Uuid>> {
    let slug = slug.trim_matches('/').to_lowercase();
    let ids = Categories::find()
        .select_only()
        .column(CategoryCol::Id)
        .filter(
            Condition::any()
                .add(CategoryCol::Slug.eq(slug.as_str()))
                .add(CategoryCol::Slug.like(format!("{}/%", escape_like(&slug)))),
        )
        .into_tuple::<Uuid>()
        .all(conn)
        .await?;
    Ok(ids)
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all()
        .add(Column::IsPublished.eq(true))
        .add(Column::IsDeleted.eq(false));

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    if let Some(slug) = query.category.as_ref().filter(|s| !s.is_empty()) {
        let ids = category_subtree_ids(&state.orm, slug).await?;
        if ids.is_empty() {
            return Ok(ApiResponse::success(
                "Products",
                ProductList { items: Vec::new() },
                Some(Meta::new(page, limit, 0)),
            ));
        }
        condition = condition.add(Column::CategoryId.is_in(ids));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    let data = ProductList { items };
    Ok(ApiResponse::success("Products", data, Some(meta)))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ProductDetail>> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .filter(|p| p.is_published && !p.is_deleted)
        .ok_or_else(|| AppError::not_found("Product"))?;
    let skus = Skus::find()
        .filter(SkuCol::ProductId.eq(id))
        .filter(SkuCol::IsActive.eq(true))
        .order_by_asc(SkuCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Sku::from)
        .collect();
    Ok(ApiResponse::success(
        "Product",
        ProductDetail {
            product: Product::from(product),
            skus,
        },
        Some(Meta::empty()),
    ))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    payload.validate()?;
    let business = selling_business(&state.orm, user).await?;
    ensure_category(&state.orm, payload.category_id).await?;
    if payload.discount > payload.price {
        return Err(AppError::Validation("Discount cannot exceed price".into()));
    }

    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        business_id: Set(business.id),
        category_id: Set(payload.category_id),
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description),
        price: Set(payload.price),
        discount: Set(payload.discount),
        tax: Set(payload.tax),
        images: Set(payload.images),
        stock: Set(payload.stock),
        is_published: Set(payload.is_published),
        is_deleted: Set(false),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let product = active.insert(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id, "business_id": business.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    payload.validate()?;
    let existing = editable_product(state, user, id).await?;

    let price = payload.price.unwrap_or(existing.price);
    let discount = payload.discount.unwrap_or(existing.discount);
    if discount > price {
        return Err(AppError::Validation("Discount cannot exceed price".into()));
    }
    if let Some(category_id) = payload.category_id {
        ensure_category(&state.orm, category_id).await?;
    }

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(category_id) = payload.category_id {
        active.category_id = Set(category_id);
    }
    active.price = Set(price);
    active.discount = Set(discount);
    if let Some(tax) = payload.tax {
        active.tax = Set(tax);
    }
    if let Some(images) = payload.images {
        active.images = Set(images);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(published) = payload.is_published {
        active.is_published = Set(published);
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

/// Soft delete; order line items keep pointing at the row.
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = editable_product(state, user, id).await?;

    let mut active: ActiveModel = existing.into();
    active.is_deleted = Set(true);
    active.is_published = Set(false);
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    CartItems::delete_many()
        .filter(CartCol::ProductId.eq(id))
        .exec(&state.orm)
        .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_skus(state: &AppState, product_id: Uuid) -> AppResult<ApiResponse<Vec<Sku>>> {
    Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .filter(|p| p.is_published && !p.is_deleted)
        .ok_or_else(|| AppError::not_found("Product"))?;
    let skus = Skus::find()
        .filter(SkuCol::ProductId.eq(product_id))
        .filter(SkuCol::IsActive.eq(true))
        .order_by_asc(SkuCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Sku::from)
        .collect();
    Ok(ApiResponse::success("SKUs", skus, Some(Meta::empty())))
}

pub async fn create_sku(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: CreateSkuRequest,
) -> AppResult<ApiResponse<Sku>> {
    payload.validate()?;
    let product = editable_product(state, user, product_id).await?;
    if payload.sale_price.is_some_and(|sale| sale > payload.price) {
        return Err(AppError::Validation(
            "Sale price cannot exceed price".into(),
        ));
    }

    let code = payload.sku_code.trim().to_uppercase();
    let taken = Skus::find()
        .filter(SkuCol::SkuCode.eq(code.as_str()))
        .count(&state.orm)
        .await?;
    if taken > 0 {
        return Err(AppError::Conflict(format!("SKU code '{code}' already exists")));
    }

    let attributes = serde_json::to_value(&payload.attributes)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    let sku = SkuActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product.id),
        business_id: Set(product.business_id),
        sku_code: Set(code),
        price: Set(payload.price),
        sale_price: Set(payload.sale_price),
        attributes: Set(attributes),
        image: Set(payload.image),
        stock: Set(payload.stock),
        is_active: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "sku_create",
        "skus",
        serde_json::json!({ "sku_id": sku.id, "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success("SKU created", Sku::from(sku), Some(Meta::empty())))
}
