//! HTTP client module for the remote quiz source.
//!
//! This module provides the `ApiClient` for fetching the raw quiz payload
//! and the `ApiError` taxonomy every refresh failure is classified into.
//! The client never parses the payload; that is [`crate::decode`]'s job.

pub mod client;
pub mod error;

pub use client::{ApiClient, FetchTimeouts, QuizFetcher};
pub use error::ApiError;
