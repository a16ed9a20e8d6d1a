pub mod auth;
pub mod business;
pub mod cart;
pub mod categories;
pub mod dashboard;
pub mod orders;
pub mod products;
pub mod users;
