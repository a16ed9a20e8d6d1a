use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::categories::{CategoryList, CategoryTree},
    error::AppResult,
    models::Category,
    response::ApiResponse,
    services::category_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories))
        .route("/tree", get(category_tree))
        .route("/{*slug}", get(get_category))
}

#[utoipa::path(
    get,
    path = "/api/categories",
    responses(
        (status = 200, description = "Active categories ordered by slug", body = ApiResponse<CategoryList>)
    ),
    tag = "Categories"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<CategoryList>>> {
    let resp = category_service::list_categories(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/categories/tree",
    responses(
        (status = 200, description = "Active categories nested under their parents", body = ApiResponse<Vec<CategoryTree>>)
    ),
    tag = "Categories"
)]
pub async fn category_tree(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<CategoryTree>>>> {
    let resp = category_service::category_tree(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/categories/{slug}",
    params(
        ("slug" = String, Path, description = "Full category slug, e.g. electronics/laptops")
    ),
    responses(
        (status = 200, description = "Category", body = ApiResponse<Category>),
        (status = 404, description = "Category not found")
    ),
    tag = "Categories"
)]
pub async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<ApiResponse<Category>>> {
    let resp = category_service::get_category_by_slug(&state, &slug).await?;
    Ok(Json(resp))
}
