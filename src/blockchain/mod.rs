pub mod client;
pub mod listener;
pub mod models;
pub mod reconciler;

// Re-exports for convenience
pub use client::LedgerClient;
pub use listener::FeedListener;
pub use reconciler::reconcile;
