use marketplace_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{
        businesses::{self, Entity as Businesses},
        categories::{self, Entity as Categories},
        products::{self, Entity as Products},
        users::{self, Entity as Users},
    },
    models::{BusinessStatus, Role},
    services::{auth_service::hash_password, category_service::{compose_slug, slugify}},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "Admin", "admin@example.com", "admin123", Role::Admin).await?;
    let seller_id = ensure_user(&orm, "Ferris Seller", "seller@example.com", "seller123", Role::Seller).await?;
    let user_id = ensure_user(&orm, "Buyer", "user@example.com", "user123", Role::User).await?;
    let business_id = ensure_business(&orm, seller_id).await?;

    let electronics = ensure_category(&orm, "Electronics", None).await?;
    let laptops = ensure_category(&orm, "Laptops", Some(&electronics)).await?;
    ensure_category(&orm, "Gaming", Some(&laptops)).await?;
    ensure_category(&orm, "Phones", Some(&electronics)).await?;
    let merch = ensure_category(&orm, "Merch", None).await?;

    seed_products(&orm, business_id, laptops.id, merch.id).await?;

    println!("Seed completed. Admin ID: {admin_id}, Seller ID: {seller_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    orm: &DatabaseConnection,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find()
        .filter(users::Column::Email.eq(email))
        .one(orm)
        .await?
    {
        println!("User {email} already exists");
        return Ok(existing.id);
    }

    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password(password)?),
        role: Set(role.as_str().to_string()),
        is_verified: Set(true),
        ..Default::default()
    }
    .insert(orm)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user.id)
}

async fn ensure_business(orm: &DatabaseConnection, owner_id: Uuid) -> anyhow::Result<Uuid> {
    if let Some(existing) = Businesses::find()
        .filter(businesses::Column::OwnerId.eq(owner_id))
        .filter(businesses::Column::IsDeleted.eq(false))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }

    let business = businesses::ActiveModel {
        id: Set(Uuid::new_v4()),
        owner_id: Set(owner_id),
        business_name: Set("Ferris Goods".to_string()),
        legal_entity_name: Set("Ferris Goods LLC".to_string()),
        tax_id: Set("TAX-FERRIS-0001".to_string()),
        status: Set(BusinessStatus::Active.as_str().to_string()),
        is_verified: Set(true),
        ..Default::default()
    }
    .insert(orm)
    .await?;

    println!("Seeded business {}", business.business_name);
    Ok(business.id)
}

async fn ensure_category(
    orm: &DatabaseConnection,
    name: &str,
    parent: Option<&categories::Model>,
) -> anyhow::Result<categories::Model> {
    let slug = compose_slug(parent.map(|p| p.slug.as_str()), &slugify(name));
    if let Some(existing) = Categories::find()
        .filter(categories::Column::Slug.eq(slug.as_str()))
        .one(orm)
        .await?
    {
        return Ok(existing);
    }

    let category = categories::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        slug: Set(slug),
        parent_id: Set(parent.map(|p| p.id)),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(orm)
    .await?;

    println!("Seeded category {}", category.slug);
    Ok(category)
}

async fn seed_products(
    orm: &DatabaseConnection,
    business_id: Uuid,
    laptops: Uuid,
    merch: Uuid,
) -> anyhow::Result<()> {
    let products = vec![
        ("Rustacean Laptop 14", "Compiles while you sleep", laptops, 15_000_000, 8),
        ("Axum Hoodie", "Warm hoodie for Rustaceans", merch, 550_000, 50),
        ("Ferris Mug", "Coffee tastes better with Ferris", merch, 120_000, 100),
        ("Rust Sticker Pack", "Decorate your laptop", merch, 50_000, 3),
    ];

    for (name, desc, category_id, price, stock) in products {
        let exists = Products::find()
            .filter(products::Column::BusinessId.eq(business_id))
            .filter(products::Column::Name.eq(name))
            .one(orm)
            .await?;
        if exists.is_some() {
            continue;
        }

        products::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business_id),
            category_id: Set(category_id),
            name: Set(name.to_string()),
            description: Set(desc.to_string()),
            price: Set(price),
            stock: Set(stock),
            is_published: Set(true),
            ..Default::default()
        }
        .insert(orm)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
