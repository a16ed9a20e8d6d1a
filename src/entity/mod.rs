pub mod audit_logs;
pub mod businesses;
pub mod cart_items;
pub mod categories;
pub mod order_items;
pub mod orders;
pub mod products;
pub mod skus;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use businesses::Entity as Businesses;
pub use cart_items::Entity as CartItems;
pub use categories::Entity as Categories;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
pub use skus::Entity as Skus;
pub use users::Entity as Users;
