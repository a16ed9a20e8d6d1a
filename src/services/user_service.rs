use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::users::{
        AdminUpdateUserRequest, ChangePasswordRequest, DeletedUser, UpdateProfileRequest, UserList,
        UserListQuery,
    },
    entity::{
        businesses::{Column as BusinessCol, Entity as Businesses},
        cart_items::{Column as CartCol, Entity as CartItems},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    media,
    middleware::auth::{AuthUser, ensure_admin},
    models::{Role, User},
    response::{ApiResponse, Meta},
    routes::params::escape_like,
    services::{
        auth_service::{hash_password, verify_password},
        business_service::retire_business,
    },
    state::AppState,
};

pub async fn get_me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .filter(|u| !u.is_deleted)
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(ApiResponse::success("User", User::from(model), Some(Meta::empty())))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    if payload.is_empty() {
        return Err(AppError::BadRequest(
            "No valid fields provided for update".into(),
        ));
    }
    payload.validate()?;

    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    let old_picture = model.profile_picture.clone();

    // Role, email and password are not reachable from here.
    let mut active: UserActive = model.into();
    if let Some(v) = payload.name {
        active.name = Set(v.trim().to_string());
    }
    if let Some(v) = payload.contact_number {
        active.contact_number = Set(Some(v));
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
    let replaced_picture = match payload.profile_picture {
        Some(url) => {
            let replaced = old_picture.filter(|old| *old != url);
            active.profile_picture = Set(Some(url));
            replaced
        }
        None => None,
    };
    active.updated_at = Set(Utc::now().into());
    let model = active.update(&state.orm).await?;

    media::delete_images(state.images.as_ref(), replaced_picture).await;

    Ok(ApiResponse::success(
        "Profile updated successfully",
        User::from(model),
        Some(Meta::empty()),
    ))
}

pub async fn change_password(
    state: &AppState,
    user: &AuthUser,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    payload.validate()?;
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    if !verify_password(&payload.current_password, &model.password_hash)? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    let mut active: UserActive = model.into();
    active.password_hash = Set(hash_password(&payload.new_password)?);
    // Existing sessions must log in again.
    active.refresh_token = Set(None);
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "password_change",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Password updated successfully. Please login.",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    query: UserListQuery,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all().add(UserCol::IsDeleted.eq(false));
    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        condition = condition.add(
            Condition::any()
                .add(Expr::col(UserCol::Name).ilike(pattern.clone()))
                .add(Expr::col(UserCol::Email).ilike(pattern)),
        );
    }
    if let Some(role) = query.role.as_ref().filter(|s| !s.is_empty()) {
        let role = role
            .parse::<Role>()
            .map_err(|_| AppError::BadRequest("Invalid role".into()))?;
        condition = condition.add(UserCol::Role.eq(role.as_str()));
    }

    let finder = Users::find()
        .filter(condition)
        .order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(User::from)
        .collect();

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AdminUpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    let model = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .filter(|u| !u.is_deleted)
        .ok_or_else(|| AppError::not_found("User"))?;

    let mut active: UserActive = model.into();
    if let Some(role) = payload.role {
        let role = role
            .parse::<Role>()
            .map_err(|_| AppError::BadRequest("Invalid role".into()))?;
        active.role = Set(role.as_str().to_string());
    }
    if let Some(verified) = payload.is_verified {
        active.is_verified = Set(verified);
    }
    if let Some(name) = payload.name.filter(|n| !n.trim().is_empty()) {
        active.name = Set(name.trim().to_string());
    }
    active.updated_at = Set(Utc::now().into());
    let model = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "user_update",
        "users",
        serde_json::json!({ "user_id": model.id, "role": model.role }),
    )
    .await;

    Ok(ApiResponse::success(
        "User updated",
        User::from(model),
        Some(Meta::empty()),
    ))
}

/// Soft-delete a user. A business they own is retired in the same
/// transaction, which fails while it still has orders in fulfilment.
pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<DeletedUser>> {
    ensure_admin(user)?;
    if id == user.user_id {
        return Err(AppError::BadRequest("Admins cannot delete themselves".into()));
    }

    let txn = state.orm.begin().await?;

    let model = Users::find_by_id(id)
        .lock(sea_orm::sea_query::LockType::Update)
        .one(&txn)
        .await?
        .filter(|u| !u.is_deleted)
        .ok_or_else(|| AppError::not_found("User"))?;

    let business = Businesses::find()
        .filter(BusinessCol::OwnerId.eq(id))
        .filter(BusinessCol::IsDeleted.eq(false))
        .one(&txn)
        .await?;
    let business_id = business.as_ref().map(|b| b.id);
    let mut images: Vec<String> = Vec::new();
    if let Some(business) = business {
        images.extend(business.logo_url.clone());
        retire_business(&txn, business).await?;
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(id))
        .exec(&txn)
        .await?;

    images.extend(model.profile_picture.clone());
    let mut active: UserActive = model.into();
    active.is_deleted = Set(true);
    active.refresh_token = Set(None);
    active.profile_picture = Set(None);
    active.role = Set(Role::User.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;

    txn.commit().await?;

    media::delete_images(state.images.as_ref(), images).await;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "user_delete",
        "users",
        serde_json::json!({ "user_id": id, "business_id": business_id }),
    )
    .await;
    tracing::info!(user_id = %id, "user deleted");

    Ok(ApiResponse::success(
        "User deleted",
        DeletedUser {
            user_id: id,
            business_id,
        },
        Some(Meta::empty()),
    ))
}
