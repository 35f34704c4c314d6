//! Local caching module for offline data access.
//!
//! This module provides the `CacheManager` for storing and retrieving the
//! last successfully decoded quiz collection. The file holds the same JSON
//! shape the remote source serves, so loading goes through the tolerant
//! decoder and older cache files keep working.

pub mod manager;

pub use manager::{CacheManager, QuizStore};
