pub mod admin_service;
pub mod auth_service;
pub mod business_service;
pub mod cart_service;
pub mod category_service;
pub mod dashboard_service;
pub mod order_service;
pub mod product_service;
pub mod user_service;
