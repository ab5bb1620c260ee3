pub mod api;
pub mod blockchain;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod state;
pub mod store;
pub mod supervisor;

#[cfg(test)]
pub mod tests;

// Re-export specific items for convenience
pub use api::error::ApiError;
pub use api::response::ApiResponse;
pub use api::route::create_router;
pub use blockchain::{FeedListener, LedgerClient};
pub use db::connection;
pub use db::materialize::{bulk_upsert, upsert_transaction};
pub use models::TxRecord;
pub use store::{merge, MasterStore, StagingLog};
pub use supervisor::Supervisor;
