use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::core::config::CacheConfig;
use crate::core::errors::{CacheError, CacheResult};
use crate::utils::Metrics;

const CACHE_FILENAME: &str = "translations.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    source_text: String,
    translated_text: String,
    target_language: String,
}

/// LRU translation cache keyed by (target language, source text), with
/// debounced JSON persistence.
///
/// Only real translations go in here. Fallbacks are never cached, so a
/// transient backend failure is not remembered.
#[derive(Clone)]
pub struct TranslationCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    cache: RwLock<LruCache<String, CacheEntry>>,
    cache_file: Option<PathBuf>,
    dirty: AtomicBool,
    metrics: Option<Metrics>,
}

impl TranslationCache {
    /// Open (or create) the cache under `cache_dir`, loading any saved entries.
    ///
    /// A `save_interval` of zero disables the background save task.
    pub async fn open(
        cache_dir: impl AsRef<Path>,
        max_entries: usize,
        save_interval: Duration,
        metrics: Option<Metrics>,
    ) -> CacheResult<Self> {
        let capacity = NonZeroUsize::new(max_entries).ok_or(CacheError::ZeroCapacity)?;
        let cache_path = cache_dir.as_ref();
        if !cache_path.exists() {
            tokio::fs::create_dir_all(cache_path)
                .await
                .map_err(CacheError::DirectoryCreationFailed)?;
        }

        let cache_file = cache_path.join(CACHE_FILENAME);
        let saved = if cache_file.exists() {
            let data = tokio::fs::read_to_string(&cache_file)
                .await
                .map_err(|source| CacheError::LoadFailed {
                    path: cache_file.display().to_string(),
                    source,
                })?;
            // A corrupt file only costs the warm start
            serde_json::from_str::<HashMap<String, CacheEntry>>(&data).unwrap_or_else(|e| {
                warn!("Ignoring unreadable translation cache {}: {}", cache_file.display(), e);
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        let mut lru = LruCache::new(capacity);
        for (k, v) in saved {
            lru.put(k, v);
        }
        debug!(entries = lru.len(), file = %cache_file.display(), "Translation cache loaded");

        let cache = Self::from_parts(lru, Some(cache_file), metrics);
        if !save_interval.is_zero() {
            cache.start_persistence_task(save_interval);
        }
        Ok(cache)
    }

    pub async fn from_config(config: &CacheConfig, metrics: Option<Metrics>) -> CacheResult<Self> {
        Self::open(&config.cache_dir, config.max_entries, config.save_interval, metrics).await
    }

    /// A cache with no backing file.
    pub fn in_memory(max_entries: usize, metrics: Option<Metrics>) -> CacheResult<Self> {
        let capacity = NonZeroUsize::new(max_entries).ok_or(CacheError::ZeroCapacity)?;
        Ok(Self::from_parts(LruCache::new(capacity), None, metrics))
    }

    fn from_parts(lru: LruCache<String, CacheEntry>, cache_file: Option<PathBuf>, metrics: Option<Metrics>) -> Self {
        if let Some(ref m) = metrics {
            m.update_cache_size(lru.len());
        }
        Self {
            inner: Arc::new(CacheInner {
                cache: RwLock::new(lru),
                cache_file,
                dirty: AtomicBool::new(false),
                metrics,
            }),
        }
    }

    /// xxh3 over the target language and the text, as 16 hex digits.
    pub fn generate_key(text: &str, target_language: &str) -> String {
        let mut hash_input = Vec::with_capacity(target_language.len() + 1 + text.len());
        hash_input.extend_from_slice(target_language.as_bytes());
        hash_input.push(0);
        hash_input.extend_from_slice(text.as_bytes());
        format!("{:016x}", xxh3_64(&hash_input))
    }

    /// Look up a translation, recording a hit or miss.
    pub fn get(&self, text: &str, target_language: &str) -> Option<String> {
        let key = Self::generate_key(text, target_language);
        let found = {
            let mut cache = self.inner.cache.write();
            cache
                .get(&key)
                // guard against hash collisions
                .filter(|e| e.source_text == text && e.target_language == target_language)
                .map(|e| e.translated_text.clone())
        };

        if let Some(ref m) = self.inner.metrics {
            match found {
                Some(_) => m.record_cache_hit(),
                None => m.record_cache_miss(),
            }
        }
        found
    }

    pub fn put(&self, text: &str, target_language: &str, translated: &str) {
        let entry = CacheEntry {
            source_text: text.to_string(),
            translated_text: translated.to_string(),
            target_language: target_language.to_string(),
        };

        {
            let mut cache = self.inner.cache.write();
            cache.put(Self::generate_key(text, target_language), entry);
            if let Some(ref m) = self.inner.metrics {
                m.update_cache_size(cache.len());
            }
        }
        self.inner.dirty.store(true, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.inner.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the cache file now. No-op for in-memory caches.
    pub async fn save(&self) -> CacheResult<()> {
        self.inner.save().await
    }

    fn start_persistence_task(&self, interval: Duration) {
        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let mut last_save = Instant::now();
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;

                // Stop once every handle to the cache is gone
                let Some(inner) = weak.upgrade() else { break };
                if inner.dirty.load(Ordering::Acquire) && last_save.elapsed() >= interval {
                    if let Err(e) = inner.save().await {
                        warn!("Background cache save failed: {}", e);
                    }
                    last_save = Instant::now();
                }
            }
        });
    }

    pub fn clear(&self) {
        self.inner.cache.write().clear();
        self.inner.dirty.store(true, Ordering::Release);
        if let Some(ref m) = self.inner.metrics {
            m.update_cache_size(0);
        }
    }
}

impl CacheInner {
    async fn save(&self) -> CacheResult<()> {
        let Some(ref cache_file) = self.cache_file else {
            return Ok(());
        };

        let json = {
            let cache = self.cache.read();
            let map: HashMap<&String, &CacheEntry> = cache.iter().collect();
            serde_json::to_string_pretty(&map)?
        };

        // Clear before writing so puts racing the write mark it dirty again
        self.dirty.store(false, Ordering::Release);
        tokio::fs::write(cache_file, json)
            .await
            .map_err(|source| {
                self.dirty.store(true, Ordering::Release);
                CacheError::SaveFailed {
                    path: cache_file.display().to_string(),
                    source,
                }
            })
    }
}
