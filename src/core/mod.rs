//! Configuration, data model and shared stores

pub mod config;
pub mod models;
pub mod store;
