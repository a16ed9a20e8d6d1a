mod common;

use marketplace_api::{
    dto::categories::{CreateCategoryRequest, UpdateCategoryRequest},
    error::AppError,
    middleware::auth::AuthUser,
    models::{Category, Role},
    services::category_service,
    state::AppState,
};
use uuid::Uuid;

async fn create(
    state: &AppState,
    admin: &AuthUser,
    name: &str,
    parent_id: Option<Uuid>,
) -> anyhow::Result<Category> {
    let resp = category_service::create_category(
        state,
        admin,
        CreateCategoryRequest {
            name: name.into(),
            description: None,
            parent_id,
            image: None,
        },
    )
    .await?;
    Ok(resp.data.unwrap())
}

#[tokio::test]
async fn rename_and_reparent_cascade_through_subtree() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = common::setup_state(&database_url).await?;
    let admin = common::create_user(&state, Role::Admin, "Admin").await?;

    let electronics = create(&state, &admin, "Electronics", None).await?;
    let laptops = create(&state, &admin, "Laptops", Some(electronics.id)).await?;
    let gaming = create(&state, &admin, "Gaming", Some(laptops.id)).await?;
    let phones = create(&state, &admin, "Phones", Some(electronics.id)).await?;
    assert_eq!(gaming.slug, "electronics/laptops/gaming");

    // Non-admins cannot touch the catalog tree.
    let buyer = common::create_user(&state, Role::User, "Buyer").await?;
    let err = category_service::update_category(
        &state,
        &buyer,
        electronics.id,
        UpdateCategoryRequest {
            name: Some("Nope".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let renamed = category_service::update_category(
        &state,
        &admin,
        electronics.id,
        UpdateCategoryRequest {
            name: Some("Tech".into()),
            ..Default::default()
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(renamed.category.slug, "tech");
    assert_eq!(renamed.cascaded, 3);

    let deep = category_service::get_category_by_slug(&state, "tech/laptops/gaming")
        .await?
        .data
        .unwrap();
    assert_eq!(deep.id, gaming.id);
    let err = category_service::get_category_by_slug(&state, "electronics/laptops")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Moving a category under its own descendant is refused and nothing changes.
    let err = category_service::update_category(
        &state,
        &admin,
        laptops.id,
        UpdateCategoryRequest {
            parent_id: Some(Some(gaming.id)),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    let still = category_service::get_category_by_slug(&state, "tech/laptops")
        .await?
        .data
        .unwrap();
    assert_eq!(still.id, laptops.id);

    // Re-parenting to the root carries the subtree along.
    let moved = category_service::update_category(
        &state,
        &admin,
        laptops.id,
        UpdateCategoryRequest {
            parent_id: Some(None),
            ..Default::default()
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(moved.category.slug, "laptops");
    assert_eq!(moved.cascaded, 1);
    let deep = category_service::get_category_by_slug(&state, "laptops/gaming")
        .await?
        .data
        .unwrap();
    assert_eq!(deep.id, gaming.id);

    // A sibling rename onto an existing slug conflicts.
    let tablets = create(&state, &admin, "Tablets", Some(renamed.category.id)).await?;
    let err = category_service::update_category(
        &state,
        &admin,
        tablets.id,
        UpdateCategoryRequest {
            name: Some("Phones".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let phones_now = category_service::get_category_by_slug(&state, "tech/phones")
        .await?
        .data
        .unwrap();
    assert_eq!(phones_now.id, phones.id);

    // Parents with children cannot be deleted; leaves can.
    let err = category_service::delete_category(&state, &admin, renamed.category.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    category_service::delete_category(&state, &admin, tablets.id).await?;

    let tree = category_service::category_tree(&state).await?.data.unwrap();
    let roots: Vec<&str> = tree.iter().map(|n| n.category.slug.as_str()).collect();
    assert!(roots.contains(&"tech"));
    assert!(roots.contains(&"laptops"));

    // Two admins racing for the same slug: one wins, the other gets a conflict.
    let (a, b) = tokio::join!(
        create(&state, &admin, "Garden", None),
        create(&state, &admin, "Garden", None),
    );
    let conflicts = [&a, &b]
        .iter()
        .filter(|r| {
            r.as_ref()
                .err()
                .and_then(|e| e.downcast_ref::<AppError>())
                .is_some_and(|e| matches!(e, AppError::Conflict(_)))
        })
        .count();
    assert_eq!(conflicts, 1);
    assert_eq!(a.is_ok() as usize + b.is_ok() as usize, 1);

    let transliterated = create(&state, &admin, "Café & Décor", None).await?;
    assert_eq!(transliterated.slug, "cafe-and-decor");

    Ok(())
}
