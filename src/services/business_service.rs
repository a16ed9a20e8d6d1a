use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::business::{BusinessProfile, CreateBusinessRequest, UpdateBusinessRequest, UpdateBusinessStatusRequest},
    entity::{
        businesses::{ActiveModel as BusinessActive, Column as BusinessCol, Entity as Businesses, Model as BusinessModel},
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{Column as OrderCol, Entity as Orders},
        products::{Column as ProdCol, Entity as Products},
        users::{ActiveModel as UserActive, Entity as Users},
    },
    error::{AppError, AppResult},
    media,
    middleware::auth::{AuthUser, ensure_admin},
    models::{Address, Business, BusinessStatus, OrderStatus, Product, PublicBusiness, Role},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

/// The caller's non-deleted business.
pub async fn find_owned_business<C: ConnectionTrait>(
    conn: &C,
    owner_id: Uuid,
) -> AppResult<BusinessModel> {
    Businesses::find()
        .filter(BusinessCol::OwnerId.eq(owner_id))
        .filter(BusinessCol::IsDeleted.eq(false))
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Business"))
}

/// Does any order holding this seller's items still need fulfilment?
pub async fn has_active_orders<C: ConnectionTrait>(conn: &C, business_id: Uuid) -> AppResult<bool> {
    let blocking: Vec<&str> = OrderStatus::ALL
        .iter()
        .filter(|s| s.is_active_fulfilment())
        .map(|s| s.as_str())
        .collect();

    let found = OrderItems::find()
        .inner_join(Orders)
        .filter(OrderItemCol::BusinessId.eq(business_id))
        .filter(OrderCol::OrderStatus.is_in(blocking))
        .one(conn)
        .await?;
    Ok(found.is_some())
}

/// Soft-delete a business and take its catalog off sale. Order history is
/// left untouched. Must run inside the caller's transaction.
pub async fn retire_business<C: ConnectionTrait>(conn: &C, business: BusinessModel) -> AppResult<()> {
    if has_active_orders(conn, business.id).await? {
        return Err(AppError::BadRequest(
            "Cannot delete business with active orders. Please fulfill or cancel them first.".into(),
        ));
    }

    let business_id = business.id;
    let mut active: BusinessActive = business.into();
    active.is_deleted = Set(true);
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;

    let unpublished = Products::update_many()
        .col_expr(ProdCol::IsPublished, Expr::value(false))
        .col_expr(ProdCol::IsDeleted, Expr::value(true))
        .col_expr(ProdCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(ProdCol::BusinessId.eq(business_id))
        .exec(conn)
        .await?;

    tracing::info!(
        business_id = %business_id,
        products = unpublished.rows_affected,
        "business retired"
    );
    Ok(())
}

async fn set_role<C: ConnectionTrait>(conn: &C, user_id: Uuid, role: Role) -> AppResult<()> {
    let user = Users::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    let mut active: UserActive = user.into();
    active.role = Set(role.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

pub async fn create_business(
    state: &AppState,
    user: &AuthUser,
    payload: CreateBusinessRequest,
) -> AppResult<ApiResponse<Business>> {
    payload.validate()?;
    let tax_id = payload.tax_id.trim().to_string();

    let txn = state.orm.begin().await?;

    let existing = Businesses::find()
        .filter(
            Condition::any()
                .add(
                    Condition::all()
                        .add(BusinessCol::OwnerId.eq(user.user_id))
                        .add(BusinessCol::IsDeleted.eq(false)),
                )
                .add(BusinessCol::TaxId.eq(tax_id.as_str())),
        )
        .one(&txn)
        .await?;
    if let Some(existing) = existing {
        let message = if existing.tax_id == tax_id {
            "Tax ID already registered."
        } else {
            "You already own a business account."
        };
        return Err(AppError::Conflict(message.into()));
    }

    let business = BusinessActive {
        id: Set(Uuid::new_v4()),
        owner_id: Set(user.user_id),
        business_name: Set(payload.business_name.trim().to_string()),
        legal_entity_name: Set(payload.legal_entity_name.trim().to_string()),
        tax_id: Set(tax_id),
        street: Set(payload.street),
        city: Set(payload.city),
        state: Set(payload.state),
        zip_code: Set(payload.zip_code),
        country: Set(payload.country),
        account_holder_name: Set(payload.account_holder_name),
        account_number: Set(payload.account_number),
        routing_number: Set(payload.routing_number),
        bank_name: Set(payload.bank_name),
        total_sales: Set(0),
        total_orders: Set(0),
        total_visitors: Set(0),
        marketing_spend: Set(0),
        status: Set(BusinessStatus::UnderReview.as_str().to_string()),
        is_verified: Set(false),
        logo_url: Set(payload.logo_url),
        is_deleted: Set(false),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    // Admins keep their role; everyone else becomes a seller.
    if user.role != Role::Admin {
        set_role(&txn, user.user_id, Role::Seller).await?;
    }

    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "business_create",
        "businesses",
        serde_json::json!({ "business_id": business.id }),
    )
    .await;
    tracing::info!(business_id = %business.id, owner_id = %user.user_id, "business created");

    Ok(ApiResponse::success(
        "Business created and undergoing review.",
        Business::from(business),
        Some(Meta::empty()),
    ))
}

pub async fn update_business(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateBusinessRequest,
) -> AppResult<ApiResponse<Business>> {
    payload.validate()?;
    let business = find_owned_business(&state.orm, user.user_id).await?;

    if let Some(tax_id) = payload.tax_id.as_deref().map(str::trim) {
        if tax_id != business.tax_id {
            let conflict = Businesses::find()
                .filter(BusinessCol::TaxId.eq(tax_id))
                .one(&state.orm)
                .await?;
            if conflict.is_some() {
                return Err(AppError::Conflict("Tax ID already in use.".into()));
            }
        }
    }

    let old_logo = business.logo_url.clone();
    let mut active: BusinessActive = business.into();
    if let Some(v) = payload.business_name {
        active.business_name = Set(v.trim().to_string());
    }
    if let Some(v) = payload.legal_entity_name {
        active.legal_entity_name = Set(v.trim().to_string());
    }
    if let Some(v) = payload.tax_id {
        active.tax_id = Set(v.trim().to_string());
    }
    if let Some(v) = payload.street {
        active.street = Set(Some(v));
    }
    if let Some(v) = payload.city {
        active.city = Set(Some(v));
    }
    if let Some(v) = payload.state {
        active.state = Set(Some(v));
    }
    if let Some(v) = payload.zip_code {
        active.zip_code = Set(Some(v));
    }
    if let Some(v) = payload.country {
        active.country = Set(Some(v));
    }
    if let Some(v) = payload.account_holder_name {
        active.account_holder_name = Set(Some(v));
    }
    if let Some(v) = payload.account_number {
        active.account_number = Set(Some(v));
    }
    if let Some(v) = payload.routing_number {
        active.routing_number = Set(Some(v));
    }
    if let Some(v) = payload.bank_name {
        active.bank_name = Set(Some(v));
    }
    let replaced_logo = match payload.logo_url {
        Some(url) => {
            let replaced = old_logo.filter(|old| *old != url);
            active.logo_url = Set(Some(url));
            replaced
        }
        None => None,
    };
    active.updated_at = Set(Utc::now().into());
    let business = active.update(&state.orm).await?;

    if let Some(old) = replaced_logo {
        media::delete_images(state.images.as_ref(), [old]).await;
    }

    Ok(ApiResponse::success(
        "Business updated successfully.",
        Business::from(business),
        Some(Meta::empty()),
    ))
}

pub async fn get_business(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Business>> {
    let business = find_owned_business(&state.orm, user.user_id).await?;
    Ok(ApiResponse::success(
        "Business",
        Business::from(business),
        Some(Meta::empty()),
    ))
}

pub async fn delete_business(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;

    let business = Businesses::find()
        .filter(BusinessCol::OwnerId.eq(user.user_id))
        .filter(BusinessCol::IsDeleted.eq(false))
        .lock(sea_orm::sea_query::LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Business"))?;
    let business_id = business.id;
    let logo = business.logo_url.clone();

    retire_business(&txn, business).await?;
    if user.role != Role::Admin {
        set_role(&txn, user.user_id, Role::User).await?;
    }

    txn.commit().await?;

    // Outside the transaction: the hosted logo is not part of the database.
    media::delete_images(state.images.as_ref(), logo).await;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "business_delete",
        "businesses",
        serde_json::json!({ "business_id": business_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Business deleted successfully. Products have been unpublished.",
        serde_json::json!({ "business_id": business_id }),
        Some(Meta::empty()),
    ))
}

pub async fn get_public_profile(
    state: &AppState,
    id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<BusinessProfile>> {
    let (page, limit, offset) = pagination.normalize_with(12);

    let business = Businesses::find_by_id(id)
        .filter(BusinessCol::Status.eq(BusinessStatus::Active.as_str()))
        .filter(BusinessCol::IsDeleted.eq(false))
        .one(&state.orm);

    let products = Products::find()
        .filter(ProdCol::BusinessId.eq(id))
        .filter(ProdCol::IsPublished.eq(true))
        .filter(ProdCol::IsDeleted.eq(false))
        .order_by_desc(ProdCol::CreatedAt);

    let (business, total, items) = tokio::try_join!(
        business,
        products.clone().count(&state.orm),
        products.limit(limit as u64).offset(offset as u64).all(&state.orm),
    )?;

    let business = business
        .ok_or_else(|| AppError::not_found("Business"))?;
    let owner_name = Users::find_by_id(business.owner_id)
        .one(&state.orm)
        .await?
        .map(|u| u.name);

    let profile = PublicBusiness {
        id: business.id,
        business_name: business.business_name,
        address: Address {
            street: business.street,
            city: business.city,
            state: business.state,
            zip_code: business.zip_code,
            country: business.country,
        },
        status: business.status,
        is_verified: business.is_verified,
        logo_url: business.logo_url,
        owner_name,
        created_at: business.created_at.with_timezone(&Utc),
    };

    Ok(ApiResponse::success(
        "Business profile",
        BusinessProfile {
            profile,
            products: items.into_iter().map(Product::from).collect(),
        },
        Some(Meta::new(page, limit, total as i64)),
    ))
}

pub async fn update_business_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateBusinessStatusRequest,
) -> AppResult<ApiResponse<Business>> {
    ensure_admin(user)?;
    let status = payload
        .status
        .parse::<BusinessStatus>()
        .map_err(|_| AppError::BadRequest("Invalid status type.".into()))?;

    let business = Businesses::find_by_id(id)
        .filter(BusinessCol::IsDeleted.eq(false))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Business"))?;

    let mut active: BusinessActive = business.into();
    active.status = Set(status.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let business = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "business_status_update",
        "businesses",
        serde_json::json!({ "business_id": business.id, "status": business.status }),
    )
    .await;

    Ok(ApiResponse::success(
        format!("Business status updated to {status}"),
        Business::from(business),
        Some(Meta::empty()),
    ))
}
