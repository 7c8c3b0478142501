//! Common utilities shared across stages

pub mod retry;

pub use retry::{fetch_with_retry, RetryConfig};
