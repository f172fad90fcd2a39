//! Location of the fundamentals cache.

use fundamenta::data::{DataError, StatementCache};
use std::path::PathBuf;

/// Default cache directory.
///
/// Uses platform-specific cache directories:
/// - Linux: `~/.cache/fundamenta/`
/// - macOS: `~/Library/Caches/fundamenta/`
/// - Windows: `%LOCALAPPDATA%\fundamenta\cache\`
pub(crate) fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fundamenta")
}

/// Cache database path, honoring an explicit override.
pub(crate) fn cache_path(override_path: Option<&PathBuf>) -> PathBuf {
    override_path
        .cloned()
        .unwrap_or_else(|| default_cache_dir().join("fundamentals.db"))
}

/// Open the cache, creating the directory if needed.
pub(crate) fn open_cache(override_path: Option<&PathBuf>) -> Result<StatementCache, DataError> {
    let path = cache_path(override_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    StatementCache::new(&path)
}
