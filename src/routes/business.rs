use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::{
        business::{BusinessProfile, CreateBusinessRequest, UpdateBusinessRequest},
        dashboard::SellerDashboard,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Business,
    response::ApiResponse,
    routes::params::Pagination,
    services::{business_service, dashboard_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(get_business)
                .post(create_business)
                .patch(update_business)
                .delete(delete_business),
        )
        .route("/dashboard", get(dashboard))
        .route("/profile/{id}", get(public_profile))
}

#[utoipa::path(
    post,
    path = "/api/business",
    request_body = CreateBusinessRequest,
    responses(
        (status = 201, description = "Business created; the caller becomes a seller", body = ApiResponse<Business>),
        (status = 409, description = "Caller already owns a business or tax id is taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Business"
)]
pub async fn create_business(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateBusinessRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Business>>)> {
    let resp = business_service::create_business(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    patch,
    path = "/api/business",
    request_body = UpdateBusinessRequest,
    responses(
        (status = 200, description = "Business updated", body = ApiResponse<Business>),
        (status = 404, description = "Caller has no business"),
        (status = 409, description = "Tax id is taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Business"
)]
pub async fn update_business(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateBusinessRequest>,
) -> AppResult<Json<ApiResponse<Business>>> {
    let resp = business_service::update_business(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/business",
    responses(
        (status = 200, description = "Caller's business", body = ApiResponse<Business>),
        (status = 404, description = "Caller has no business")
    ),
    security(("bearer_auth" = [])),
    tag = "Business"
)]
pub async fn get_business(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Business>>> {
    let resp = business_service::get_business(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/business",
    responses(
        (status = 200, description = "Business deleted, products unpublished, owner demoted"),
        (status = 400, description = "Orders are still processing or shipped"),
        (status = 404, description = "Caller has no business")
    ),
    security(("bearer_auth" = [])),
    tag = "Business"
)]
pub async fn delete_business(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = business_service::delete_business(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/business/dashboard",
    responses(
        (status = 200, description = "Revenue, top products, stock alerts and top customers", body = ApiResponse<SellerDashboard>),
        (status = 404, description = "Caller has no business")
    ),
    security(("bearer_auth" = [])),
    tag = "Business"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<SellerDashboard>>> {
    let resp = dashboard_service::my_dashboard(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/business/profile/{id}",
    params(
        ("id" = Uuid, Path, description = "Business ID"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Products per page, default 12")
    ),
    responses(
        (status = 200, description = "Public business profile with published products", body = ApiResponse<BusinessProfile>),
        (status = 404, description = "Business not found or not active")
    ),
    tag = "Business"
)]
pub async fn public_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<BusinessProfile>>> {
    let resp = business_service::get_public_profile(&state, id, pagination).await?;
    Ok(Json(resp))
}
