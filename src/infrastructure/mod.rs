pub mod config;
pub mod database;
pub mod in_memory_store;
pub mod logging;
pub mod redis_store;
pub mod subscription_client;
pub mod subscription_registry;
