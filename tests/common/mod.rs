use std::sync::Arc;

use marketplace_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::users::ActiveModel as UserActive,
    media::DisabledImageStore,
    middleware::auth::AuthUser,
    models::Role,
    state::AppState,
};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

/// Database URL for flow tests, or `None` to skip them.
pub fn database_url() -> Option<String> {
    match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            None
        }
    }
}

pub async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, cart_items, skus, products, categories, businesses, audit_logs, users CASCADE",
    ))
    .await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "test-access-secret".into(),
        refresh_token_secret: "test-refresh-secret".into(),
        access_token_ttl_hours: 1,
        refresh_token_ttl_days: 1,
        cors_origin: "http://localhost:3000".into(),
        image_host_url: None,
        image_host_api_key: None,
    };

    Ok(AppState {
        orm,
        config: Arc::new(config),
        images: Arc::new(DisabledImageStore),
    })
}

pub async fn create_user(state: &AppState, role: Role, name: &str) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        email: Set(format!("{}-{}@example.com", name.to_lowercase(), Uuid::new_v4())),
        password_hash: Set("dummy".into()),
        role: Set(role.as_str().to_string()),
        ..Default::default()
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role,
    })
}
