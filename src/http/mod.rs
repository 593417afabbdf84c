//! HTTP access to remote feeds.

mod client;
mod retry;

pub use client::HttpClient;
pub use retry::{FeedHttpError, RetryPolicy};
