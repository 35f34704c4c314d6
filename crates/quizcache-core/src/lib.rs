//! Quiz data acquisition with offline resilience.
//!
//! Fetches a quiz collection from a remote JSON source, decodes it
//! tolerantly, keeps the last good copy on disk and falls back to the cache
//! or compiled-in seed quizzes whenever the network or server fails.
//!
//! - [`api`]: HTTP fetcher and the classified [`ApiError`]
//! - [`decode`]: schema-tolerant payload decoder
//! - [`cache`]: atomic on-disk cache of the last good collection
//! - [`repository`]: the authoritative collection and its refresh cycle
//! - [`scheduler`]: periodic, foreground and manual refresh triggers
//! - [`config`]: persisted source URL and refresh interval

pub mod api;
pub mod cache;
pub mod config;
pub mod decode;
pub mod models;
pub mod repository;
pub mod scheduler;
pub mod seed;

pub use api::{ApiClient, ApiError, FetchTimeouts, QuizFetcher};
pub use cache::{CacheManager, QuizStore};
pub use config::{Config, Settings};
pub use decode::{decode, DecodeError};
pub use models::{DataSource, Question, Quiz, QuizCollection};
pub use repository::{QuizEvent, QuizRepository, RefreshOutcome, Snapshot};
pub use scheduler::{RefreshScheduler, RefreshTrigger};
