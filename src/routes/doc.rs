use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, TokenPair},
        business::{BusinessProfile, CreateBusinessRequest, UpdateBusinessRequest, UpdateBusinessStatusRequest},
        cart::{AddToCartRequest, CartItemDto, CartList},
        categories::{CategoryList, CategoryTree, CategoryUpdate, CreateCategoryRequest, UpdateCategoryRequest},
        dashboard::{RevenueSummary, SellerDashboard, StockAlert, TopCustomer, TopProduct},
        orders::{CheckoutRequest, OrderList, OrderWithItems, PayOrderRequest, UpdateOrderStatusRequest},
        products::{CreateProductRequest, CreateSkuRequest, InventoryAdjustRequest, ProductDetail, ProductList, UpdateProductRequest},
        users::{AdminUpdateUserRequest, ChangePasswordRequest, DeletedUser, UpdateProfileRequest, UserList},
    },
    models::{
        Address, BankDetails, Business, BusinessAnalytics, BusinessStatus, Category, Order,
        OrderItem, OrderStatus, PaymentStatus, Product, PublicBusiness, Role, ShippingAddress,
        Sku, User,
    },
    response::{ApiResponse, Meta},
    routes::{admin, auth, business, cart, categories, health, orders, params, products, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        users::get_me,
        users::update_me,
        users::change_password,
        business::create_business,
        business::update_business,
        business::get_business,
        business::delete_business,
        business::dashboard,
        business::public_profile,
        categories::list_categories,
        categories::category_tree,
        categories::get_category,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::list_skus,
        products::create_sku,
        cart::cart_list,
        cart::add_to_cart,
        cart::remove_from_cart,
        orders::list_order,
        orders::checkout,
        orders::seller_orders,
        orders::get_order,
        orders::pay_order,
        orders::cancel_order,
        orders::update_status,
        admin::list_users,
        admin::update_user,
        admin::delete_user,
        admin::update_business_status,
        admin::create_category,
        admin::update_category,
        admin::delete_category,
        admin::recompute_category_slug,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory
    ),
    components(
        schemas(
            Role,
            OrderStatus,
            PaymentStatus,
            BusinessStatus,
            Address,
            ShippingAddress,
            BankDetails,
            BusinessAnalytics,
            User,
            Business,
            PublicBusiness,
            Category,
            Product,
            Sku,
            Order,
            OrderItem,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            TokenPair,
            AuthResponse,
            UpdateProfileRequest,
            ChangePasswordRequest,
            AdminUpdateUserRequest,
            UserList,
            DeletedUser,
            CreateBusinessRequest,
            UpdateBusinessRequest,
            UpdateBusinessStatusRequest,
            BusinessProfile,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            CategoryTree,
            CategoryUpdate,
            CreateProductRequest,
            UpdateProductRequest,
            CreateSkuRequest,
            InventoryAdjustRequest,
            ProductList,
            ProductDetail,
            AddToCartRequest,
            CartItemDto,
            CartList,
            CheckoutRequest,
            PayOrderRequest,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            RevenueSummary,
            TopProduct,
            StockAlert,
            TopCustomer,
            SellerDashboard,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::LowStockQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<SellerDashboard>,
            ApiResponse<CategoryUpdate>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Users", description = "Profile endpoints"),
        (name = "Business", description = "Seller onboarding and dashboard"),
        (name = "Categories", description = "Category tree endpoints"),
        (name = "Products", description = "Product endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
