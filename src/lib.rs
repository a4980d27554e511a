pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod insights;
pub mod models;
pub mod performance;
pub mod report;
pub mod store;
