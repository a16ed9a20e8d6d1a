use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::categories::{CategoryList, CategoryTree, CategoryUpdate, CreateCategoryRequest, UpdateCategoryRequest},
    entity::{
        categories::{ActiveModel as CategoryActive, Column as CategoryCol, Entity as Categories, Model as CategoryModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    media,
    middleware::auth::{AuthUser, ensure_admin},
    models::Category,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Spelled-out forms of symbols that would otherwise vanish from a slug.
const SYMBOL_WORDS: &[(char, &str)] = &[
    ('&', "and"),
    ('$', "dollar"),
    ('%', "percent"),
    ('<', "less"),
    ('>', "greater"),
    ('|', "or"),
];

/// Lowercase ASCII slug. Non-ASCII letters are transliterated (`é` -> `e`,
/// `ß` -> `ss`), a few symbols are spelled out (`&` -> `and`), runs of
/// whitespace, `-` or `_` become one `-`, everything else is dropped.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        let expanded = match SYMBOL_WORDS.iter().find(|(symbol, _)| *symbol == ch) {
            Some((_, word)) => *word,
            None if ch.is_ascii() => "",
            None => deunicode::deunicode_char(ch).unwrap_or(""),
        };
        let mut push = |c: char| {
            if c.is_ascii_alphanumeric() {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c.to_ascii_lowercase());
            } else if c.is_whitespace() || c == '-' || c == '_' {
                pending_dash = true;
            }
        };
        if expanded.is_empty() {
            push(ch);
        } else {
            expanded.chars().for_each(&mut push);
        }
    }
    slug
}

pub fn compose_slug(parent_slug: Option<&str>, own: &str) -> String {
    match parent_slug {
        Some(parent) => format!("{parent}/{own}"),
        None => own.to_string(),
    }
}

/// The fields of a category the slug rule depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryNode {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
}

impl From<&CategoryModel> for CategoryNode {
    fn from(model: &CategoryModel) -> Self {
        Self {
            id: model.id,
            parent_id: model.parent_id,
            name: model.name.clone(),
            slug: model.slug.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlugChange {
    pub id: Uuid,
    pub old_slug: String,
    pub new_slug: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CascadeError {
    NotFound(Uuid),
    MissingParent(Uuid),
    Cycle,
    EmptySlug(Uuid),
    Duplicate(String),
}

impl From<CascadeError> for AppError {
    fn from(err: CascadeError) -> Self {
        match err {
            CascadeError::NotFound(_) => AppError::not_found("Category"),
            CascadeError::MissingParent(_) => AppError::not_found("Parent category"),
            CascadeError::Cycle => AppError::BadRequest(
                "A category cannot be moved under itself or its own descendant".into(),
            ),
            CascadeError::EmptySlug(_) => AppError::Validation(
                "Category name must contain at least one letter or digit".into(),
            ),
            CascadeError::Duplicate(slug) => {
                AppError::Conflict(format!("Category slug '{slug}' already exists"))
            }
        }
    }
}

/// A write that trips the unique slug index lost a race for that slug.
fn slug_taken(err: DbErr, slug: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => CascadeError::Duplicate(slug.to_string()).into(),
        _ => err.into(),
    }
}

/// Recompute the slug of `root` and of every descendant from the current
/// names and parent links in `nodes`.
///
/// Returns one entry per node in the subtree, breadth first starting with
/// `root`, including nodes whose slug does not change. Fails without
/// producing changes when the parent is missing, the parent lies inside the
/// subtree, a name slugifies to nothing, or a new slug is already taken by a
/// category outside the subtree.
pub fn plan_slug_cascade(nodes: &[CategoryNode], root: Uuid) -> Result<Vec<SlugChange>, CascadeError> {
    let by_id: HashMap<Uuid, &CategoryNode> = nodes.iter().map(|n| (n.id, n)).collect();
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for node in nodes {
        if let Some(parent) = node.parent_id {
            children.entry(parent).or_default().push(node.id);
        }
    }

    let root_node = *by_id.get(&root).ok_or(CascadeError::NotFound(root))?;

    let mut order = vec![root];
    let mut subtree: HashSet<Uuid> = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        for child in children.get(&id).into_iter().flatten() {
            if subtree.insert(*child) {
                order.push(*child);
                queue.push_back(*child);
            }
        }
    }

    let parent_slug = match root_node.parent_id {
        Some(parent) if subtree.contains(&parent) => return Err(CascadeError::Cycle),
        Some(parent) => Some(
            by_id
                .get(&parent)
                .ok_or(CascadeError::MissingParent(parent))?
                .slug
                .as_str(),
        ),
        None => None,
    };

    let mut new_slugs: HashMap<Uuid, String> = HashMap::with_capacity(order.len());
    let mut changes = Vec::with_capacity(order.len());
    for id in order {
        let node = by_id[&id];
        let own = slugify(&node.name);
        if own.is_empty() {
            return Err(CascadeError::EmptySlug(id));
        }
        let prefix = if id == root {
            parent_slug
        } else {
            node.parent_id.and_then(|p| new_slugs.get(&p)).map(String::as_str)
        };
        let new_slug = compose_slug(prefix, &own);
        new_slugs.insert(id, new_slug.clone());
        changes.push(SlugChange {
            id,
            old_slug: node.slug.clone(),
            new_slug,
        });
    }

    let taken: HashSet<&str> = nodes
        .iter()
        .filter(|n| !subtree.contains(&n.id))
        .map(|n| n.slug.as_str())
        .collect();
    let mut seen: HashSet<&str> = HashSet::new();
    for change in &changes {
        if taken.contains(change.new_slug.as_str()) || !seen.insert(change.new_slug.as_str()) {
            return Err(CascadeError::Duplicate(change.new_slug.clone()));
        }
    }

    Ok(changes)
}

/// Recompute `category_id`'s slug and cascade it through its descendants on
/// `conn`. Returns how many descendants changed. Callers pass a transaction
/// so a failure leaves the tree as it was.
pub async fn cascade_slugs<C: ConnectionTrait>(conn: &C, category_id: Uuid) -> AppResult<usize> {
    let models = Categories::find()
        .lock(sea_orm::sea_query::LockType::Update)
        .all(conn)
        .await?;
    let nodes: Vec<CategoryNode> = models.iter().map(CategoryNode::from).collect();
    let changes = plan_slug_cascade(&nodes, category_id)?;

    let mut by_id: HashMap<Uuid, CategoryModel> = models.into_iter().map(|m| (m.id, m)).collect();
    let mut descendants_changed = 0;
    let now = Utc::now();
    for change in changes {
        if change.old_slug == change.new_slug {
            continue;
        }
        let Some(model) = by_id.remove(&change.id) else {
            continue;
        };
        let mut active: CategoryActive = model.into();
        active.slug = Set(change.new_slug.clone());
        active.updated_at = Set(now.into());
        active
            .update(conn)
            .await
            .map_err(|err| slug_taken(err, &change.new_slug))?;
        if change.id != category_id {
            descendants_changed += 1;
        }
        tracing::debug!(
            category_id = %change.id,
            old = %change.old_slug,
            new = %change.new_slug,
            "category slug updated"
        );
    }
    Ok(descendants_changed)
}

/// Recompute a category's slug from its parent and name, cascading to all
/// descendants, in one transaction.
pub async fn recompute_category_slug(state: &AppState, category_id: Uuid) -> AppResult<usize> {
    let txn = state.orm.begin().await?;
    let changed = cascade_slugs(&txn, category_id).await?;
    txn.commit().await?;
    Ok(changed)
}

pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryTree> {
    let ids: HashSet<Uuid> = categories.iter().map(|c| c.id).collect();
    let mut children: HashMap<Uuid, Vec<Category>> = HashMap::new();
    let mut roots = Vec::new();
    for category in categories {
        match category.parent_id.filter(|p| ids.contains(p)) {
            Some(parent) => children.entry(parent).or_default().push(category),
            None => roots.push(category),
        }
    }

    fn attach(category: Category, children: &mut HashMap<Uuid, Vec<Category>>) -> CategoryTree {
        let kids = children.remove(&category.id).unwrap_or_default();
        CategoryTree {
            category,
            children: kids.into_iter().map(|c| attach(c, children)).collect(),
        }
    }

    roots
        .into_iter()
        .map(|c| attach(c, &mut children))
        .collect()
}

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let items: Vec<Category> = Categories::find()
        .filter(CategoryCol::IsActive.eq(true))
        .order_by_asc(CategoryCol::Slug)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Category::from)
        .collect();
    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::new(1, total.max(1), total)),
    ))
}

/// Active categories nested under their parents. A category whose parent is
/// inactive is listed as a root.
pub async fn category_tree(state: &AppState) -> AppResult<ApiResponse<Vec<CategoryTree>>> {
    let categories = Categories::find()
        .filter(CategoryCol::IsActive.eq(true))
        .order_by_asc(CategoryCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Category::from)
        .collect();
    Ok(ApiResponse::success(
        "Category tree",
        build_tree(categories),
        Some(Meta::empty()),
    ))
}

pub async fn get_category_by_slug(state: &AppState, slug: &str) -> AppResult<ApiResponse<Category>> {
    let category = Categories::find()
        .filter(CategoryCol::Slug.eq(slug.trim_matches('/').to_lowercase()))
        .filter(CategoryCol::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;
    Ok(ApiResponse::success(
        "Category",
        Category::from(category),
        Some(Meta::empty()),
    ))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    payload.validate()?;

    let own = slugify(&payload.name);
    if own.is_empty() {
        return Err(CascadeError::EmptySlug(Uuid::nil()).into());
    }

    let parent_slug = match payload.parent_id {
        Some(parent_id) => Some(
            Categories::find_by_id(parent_id)
                .one(&state.orm)
                .await?
                .ok_or_else(|| AppError::not_found("Parent category"))?
                .slug,
        ),
        None => None,
    };
    let slug = compose_slug(parent_slug.as_deref(), &own);

    let taken = Categories::find()
        .filter(CategoryCol::Slug.eq(slug.as_str()))
        .count(&state.orm)
        .await?;
    if taken > 0 {
        return Err(CascadeError::Duplicate(slug).into());
    }

    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        slug: Set(slug.clone()),
        description: Set(payload.description),
        parent_id: Set(payload.parent_id),
        image: Set(payload.image),
        is_active: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| slug_taken(err, &slug))?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "category_create",
        "categories",
        serde_json::json!({ "category_id": category.id, "slug": category.slug }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category created",
        Category::from(category),
        Some(Meta::empty()),
    ))
}

/// Update a category. A rename or re-parent recomputes the slug of the
/// category and all its descendants in the same transaction as the write.
pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<CategoryUpdate>> {
    ensure_admin(user)?;
    payload.validate()?;

    let txn = state.orm.begin().await?;

    let existing = Categories::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;

    let mut reslug = false;
    let mut active: CategoryActive = existing.clone().into();
    if let Some(name) = payload.name.map(|n| n.trim().to_string()) {
        if name != existing.name {
            reslug = true;
        }
        active.name = Set(name);
    }
    if let Some(parent_id) = payload.parent_id {
        if parent_id == Some(id) {
            return Err(CascadeError::Cycle.into());
        }
        if parent_id != existing.parent_id {
            reslug = true;
        }
        active.parent_id = Set(parent_id);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    let replaced_image = match payload.image {
        Some(image) => {
            let replaced = existing.image.clone().filter(|old| *old != image);
            active.image = Set(Some(image));
            replaced
        }
        None => None,
    };
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;

    let cascaded = if reslug {
        cascade_slugs(&txn, id).await?
    } else {
        0
    };

    let category = Categories::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;

    txn.commit().await?;

    media::delete_images(state.images.as_ref(), replaced_image).await;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "category_update",
        "categories",
        serde_json::json!({ "category_id": id, "slug": category.slug, "cascaded": cascaded }),
    )
    .await;
    tracing::info!(category_id = %id, slug = %category.slug, cascaded, "category updated");

    Ok(ApiResponse::success(
        "Category updated",
        CategoryUpdate {
            category: Category::from(category),
            cascaded,
        },
        Some(Meta::empty()),
    ))
}

pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let category = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;

    let children = Categories::find()
        .filter(CategoryCol::ParentId.eq(id))
        .count(&state.orm)
        .await?;
    if children > 0 {
        return Err(AppError::Conflict(
            "Category still has subcategories".into(),
        ));
    }
    let products = Products::find()
        .filter(ProdCol::CategoryId.eq(id))
        .count(&state.orm)
        .await?;
    if products > 0 {
        return Err(AppError::Conflict(
            "Category is still assigned to products".into(),
        ));
    }

    let image = category.image.clone();
    Categories::delete_by_id(id).exec(&state.orm).await?;
    media::delete_images(state.images.as_ref(), image).await;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "category_delete",
        "categories",
        serde_json::json!({ "category_id": id, "slug": category.slug }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: Uuid, parent: Option<Uuid>, name: &str, slug: &str) -> CategoryNode {
        CategoryNode {
            id,
            parent_id: parent,
            name: name.to_string(),
            slug: slug.to_string(),
        }
    }

    struct Tree {
        electronics: Uuid,
        laptops: Uuid,
        gaming: Uuid,
        phones: Uuid,
        fashion: Uuid,
        nodes: Vec<CategoryNode>,
    }

    fn tree() -> Tree {
        let electronics = Uuid::new_v4();
        let laptops = Uuid::new_v4();
        let gaming = Uuid::new_v4();
        let phones = Uuid::new_v4();
        let fashion = Uuid::new_v4();
        let nodes = vec![
            node(electronics, None, "Electronics", "electronics"),
            node(laptops, Some(electronics), "Laptops", "electronics/laptops"),
            node(gaming, Some(laptops), "Gaming", "electronics/laptops/gaming"),
            node(phones, Some(electronics), "Phones", "electronics/phones"),
            node(fashion, None, "Fashion", "fashion"),
        ];
        Tree {
            electronics,
            laptops,
            gaming,
            phones,
            fashion,
            nodes,
        }
    }

    fn rename(nodes: &mut [CategoryNode], id: Uuid, name: &str) {
        nodes.iter_mut().find(|n| n.id == id).unwrap().name = name.to_string();
    }

    fn reparent(nodes: &mut [CategoryNode], id: Uuid, parent: Option<Uuid>) {
        nodes.iter_mut().find(|n| n.id == id).unwrap().parent_id = parent;
    }

    fn slug_of(changes: &[SlugChange], id: Uuid) -> &str {
        &changes.iter().find(|c| c.id == id).unwrap().new_slug
    }

    #[test]
    fn only_unique_violations_become_slug_conflicts() {
        let err = slug_taken(DbErr::Custom("connection reset".into()), "tech");
        assert!(matches!(err, AppError::OrmError(_)));
    }

    #[test]
    fn slugify_normalises_names() {
        assert_eq!(slugify("Electronics"), "electronics");
        assert_eq!(slugify("  Men's  Shoes "), "mens-shoes");
        assert_eq!(slugify("Home & Garden"), "home-and-garden");
        assert_eq!(slugify("Café Décor"), "cafe-decor");
        assert_eq!(slugify("Über Größe"), "uber-grosse");
        assert_eq!(slugify("R&D"), "randd");
        assert_eq!(slugify("kids_toys--2024"), "kids-toys-2024");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn renaming_root_rewrites_every_descendant_prefix() {
        let mut t = tree();
        rename(&mut t.nodes, t.electronics, "Tech");

        let changes = plan_slug_cascade(&t.nodes, t.electronics).unwrap();

        assert_eq!(changes.len(), 4);
        assert_eq!(changes[0].id, t.electronics);
        assert_eq!(slug_of(&changes, t.electronics), "tech");
        assert_eq!(slug_of(&changes, t.laptops), "tech/laptops");
        assert_eq!(slug_of(&changes, t.gaming), "tech/laptops/gaming");
        assert_eq!(slug_of(&changes, t.phones), "tech/phones");
        assert!(changes.iter().all(|c| c.id != t.fashion));
    }

    #[test]
    fn renaming_leaf_changes_only_the_leaf() {
        let mut t = tree();
        rename(&mut t.nodes, t.gaming, "Gaming Rigs");

        let changes = plan_slug_cascade(&t.nodes, t.gaming).unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_slug, "electronics/laptops/gaming");
        assert_eq!(changes[0].new_slug, "electronics/laptops/gaming-rigs");
    }

    #[test]
    fn reparenting_moves_the_whole_subtree() {
        let mut t = tree();
        reparent(&mut t.nodes, t.laptops, Some(t.fashion));

        let changes = plan_slug_cascade(&t.nodes, t.laptops).unwrap();

        assert_eq!(slug_of(&changes, t.laptops), "fashion/laptops");
        assert_eq!(slug_of(&changes, t.gaming), "fashion/laptops/gaming");
    }

    #[test]
    fn moving_to_root_drops_the_prefix() {
        let mut t = tree();
        reparent(&mut t.nodes, t.laptops, None);

        let changes = plan_slug_cascade(&t.nodes, t.laptops).unwrap();

        assert_eq!(slug_of(&changes, t.laptops), "laptops");
        assert_eq!(slug_of(&changes, t.gaming), "laptops/gaming");
    }

    #[test]
    fn unchanged_names_produce_identical_slugs() {
        let t = tree();
        let changes = plan_slug_cascade(&t.nodes, t.electronics).unwrap();
        assert!(changes.iter().all(|c| c.old_slug == c.new_slug));
    }

    #[test]
    fn reparenting_under_a_descendant_is_a_cycle() {
        let mut t = tree();
        reparent(&mut t.nodes, t.electronics, Some(t.gaming));
        assert_eq!(
            plan_slug_cascade(&t.nodes, t.electronics),
            Err(CascadeError::Cycle)
        );
    }

    #[test]
    fn missing_parent_aborts_the_cascade() {
        let mut t = tree();
        let ghost = Uuid::new_v4();
        reparent(&mut t.nodes, t.laptops, Some(ghost));
        assert_eq!(
            plan_slug_cascade(&t.nodes, t.laptops),
            Err(CascadeError::MissingParent(ghost))
        );
    }

    #[test]
    fn slug_taken_outside_the_subtree_is_a_conflict() {
        let mut t = tree();
        rename(&mut t.nodes, t.electronics, "Fashion");
        assert_eq!(
            plan_slug_cascade(&t.nodes, t.electronics),
            Err(CascadeError::Duplicate("fashion".into()))
        );
    }

    #[test]
    fn sibling_collision_after_rename_is_a_conflict() {
        let mut t = tree();
        rename(&mut t.nodes, t.phones, "Laptops");
        assert_eq!(
            plan_slug_cascade(&t.nodes, t.phones),
            Err(CascadeError::Duplicate("electronics/laptops".into()))
        );
    }

    #[test]
    fn unknown_root_is_not_found() {
        let t = tree();
        let missing = Uuid::new_v4();
        assert_eq!(
            plan_slug_cascade(&t.nodes, missing),
            Err(CascadeError::NotFound(missing))
        );
    }

    #[test]
    fn build_tree_nests_children_and_promotes_orphans() {
        let now = Utc::now();
        let make = |id: Uuid, parent: Option<Uuid>, slug: &str| Category {
            id,
            name: slug.to_string(),
            slug: slug.to_string(),
            description: None,
            parent_id: parent,
            image: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let root = Uuid::new_v4();
        let child = Uuid::new_v4();
        let orphan = Uuid::new_v4();
        let tree = build_tree(vec![
            make(root, None, "a"),
            make(child, Some(root), "a/b"),
            make(orphan, Some(Uuid::new_v4()), "x/y"),
        ]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].category.id, root);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].category.id, child);
        assert_eq!(tree[1].category.id, orphan);
    }
}
