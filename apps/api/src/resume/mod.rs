pub mod handlers;
pub mod models;
pub mod repository;
pub mod schema;
