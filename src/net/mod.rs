//! Shared outbound HTTP client construction.

pub mod client;

pub use client::{HttpClient, HttpClientBuilder};
