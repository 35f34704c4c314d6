//! Data models for the quiz collection.
//!
//! - `Quiz`, `Question`: immutable quiz content in canonical form
//! - `QuizCollection`: the ordered list held by the repository and the cache
//! - `DataSource`: provenance tag for the collection currently held

pub mod quiz;

pub use quiz::{DataSource, Question, Quiz, QuizCollection, DEFAULT_ICON};
