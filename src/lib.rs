pub mod allocator;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod pagination;
pub mod util;
