pub mod analytics;
pub mod auth;
pub mod health;
pub mod messages;
pub mod products;
pub mod users;
