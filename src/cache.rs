//! Incremental output cache for batch runs.
//!
//! An entry maps a source path to the hash of its bytes, the mode and the
//! output-shaping options, plus the formatted text produced for it. A stale or unreadable entry is a miss.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::FormatOptions;
use crate::error::{FormatError, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub output: String,
}

pub struct OutputCache {
    cache_dir: PathBuf,
}

impl OutputCache {
    pub fn open(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).map_err(|e| FormatError::io(&cache_dir, e))?;
        Ok(OutputCache { cache_dir })
    }

    pub fn compute_hash(source: &[u8], mode: &str, options: &FormatOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source);
        hasher.update([0u8]);
        hasher.update(mode.as_bytes());
        hasher.update([0u8]);
        hasher.update(options.output_fingerprint().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, src: &Path) -> PathBuf {
        let safe_name: String = src
            .to_string_lossy()
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.cache_dir.join(format!("{safe_name}.json"))
    }

    pub fn get(&self, src: &Path, hash: &str) -> Option<String> {
        let path = self.entry_path(src);
        let data = fs::read_to_string(&path).ok()?;

        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), "dropping corrupt cache entry: {e}");
                fs::remove_file(&path).ok();
                return None;
            }
        };

        if entry.hash == hash {
            debug!(src = %src.display(), "cache hit");
            Some(entry.output)
        } else {
            None
        }
    }

    pub fn set(&self, src: &Path, hash: String, output: String) -> Result<()> {
        let path = self.entry_path(src);
        let data = serde_json::to_string(&CacheEntry { hash, output })?;
        fs::write(&path, data).map_err(|e| FormatError::io(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hash_depends_on_mode() {
        let options = FormatOptions::default();
        let a = OutputCache::compute_hash(b"return 1", "deobfuscate", &options);
        let b = OutputCache::compute_hash(b"return 1", "obfuscate", &options);
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(a, OutputCache::compute_hash(b"return 1", "deobfuscate", &options));
    }

    #[test]
    fn test_hash_depends_on_output_options() {
        let options = FormatOptions::default();
        let base = OutputCache::compute_hash(b"return 1", "deobfuscate", &options);

        let wider = FormatOptions { indent: 4, ..options.clone() };
        let fewer_rounds = FormatOptions { max_rounds: 1, ..options.clone() };
        let threshold = FormatOptions { round_threshold: 1, ..options.clone() };
        for other in [wider, fewer_rounds, threshold] {
            assert_ne!(OutputCache::compute_hash(b"return 1", "deobfuscate", &other), base);
        }

        // Logging and tool locations do not change the output.
        let noisy = FormatOptions { debug: true, ..options.clone() };
        assert_eq!(OutputCache::compute_hash(b"return 1", "deobfuscate", &noisy), base);
    }

    #[test]
    fn test_get_after_set() {
        let dir = tempfile::tempdir().unwrap();
        let cache = OutputCache::open(dir.path().join("cache")).unwrap();
        let src = Path::new("scripts/main.lua");
        let hash = OutputCache::compute_hash(b"x", "deobfuscate", &FormatOptions::default());

        assert_eq!(cache.get(src, &hash), None);
        cache.set(src, hash.clone(), "return 1".to_string()).unwrap();
        assert_eq!(cache.get(src, &hash), Some("return 1".to_string()));
        assert_eq!(cache.get(src, "stale"), None);
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = OutputCache::open(dir.path()).unwrap();
        let src = Path::new("main.lua");
        fs::write(cache.entry_path(src), "{ not json").unwrap();

        assert_eq!(cache.get(src, "anything"), None);
        assert!(!cache.entry_path(src).exists());
    }
}
