use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::decode;
use crate::models::{Quiz, QuizCollection};

/// Cache file name inside the cache directory
const CACHE_FILE: &str = "quizzes.json";

/// Durable storage for the last good quiz collection.
///
/// Implementations never surface errors: a failed save reports `false`, a
/// failed load behaves like an empty cache.
pub trait QuizStore: Send + Sync {
    fn save(&self, quizzes: &[Quiz]) -> bool;
    fn load(&self) -> Option<QuizCollection>;
}

pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory: {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Read and decode the cache file. `Ok(None)` when there is no file.
    pub fn load_quizzes(&self) -> Result<Option<QuizCollection>> {
        let path = self.cache_path();
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read(&path)
            .with_context(|| format!("Failed to read cache file: {}", path.display()))?;

        let quizzes = decode::decode(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", path.display()))?;

        Ok(Some(quizzes))
    }

    /// Write the collection atomically.
    ///
    /// The data goes to a temporary file in the same directory, is synced,
    /// and is then renamed over the cache file, so readers only ever see the
    /// old file or the complete new one.
    pub fn save_quizzes(&self, quizzes: &[Quiz]) -> Result<()> {
        let contents = serde_json::to_vec_pretty(quizzes)?;

        let mut tmp = NamedTempFile::new_in(&self.cache_dir)
            .context("Failed to create temporary cache file")?;
        tmp.write_all(&contents)
            .context("Failed to write temporary cache file")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to sync temporary cache file")?;
        tmp.persist(self.cache_path())
            .context("Failed to move cache file into place")?;

        debug!(count = quizzes.len(), bytes = contents.len(), "Quiz cache written");
        Ok(())
    }

    /// Remove the cache file if present
    pub fn clear(&self) -> Result<()> {
        let path = self.cache_path();
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove cache file: {}", path.display()))?;
            info!("Quiz cache cleared");
        }
        Ok(())
    }

    /// When the cache file was last written
    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        let modified = std::fs::metadata(self.cache_path())
            .and_then(|m| m.modified())
            .ok()?;
        Some(DateTime::<Utc>::from(modified))
    }

    /// Human readable cache age, "never" when nothing is cached
    pub fn age_display(&self) -> String {
        match self.cached_at() {
            Some(cached_at) => age_display_since(cached_at, Utc::now()),
            None => "never".to_string(),
        }
    }
}

impl QuizStore for CacheManager {
    fn save(&self, quizzes: &[Quiz]) -> bool {
        match self.save_quizzes(quizzes) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Error saving quizzes to local storage");
                false
            }
        }
    }

    fn load(&self) -> Option<QuizCollection> {
        match self.load_quizzes() {
            Ok(quizzes) => quizzes,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Error loading quizzes from local storage");
                None
            }
        }
    }
}

fn age_display_since(cached_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - cached_at).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        let remaining_mins = minutes % 60;
        if remaining_mins >= 30 {
            // Round up: 1h 30m+ becomes 2h
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        let remaining_hours = (minutes % 1440) / 60;
        if remaining_hours >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
