//! Persistent block cache for remote URL reads.
//!
//! Each URL gets a directory named by the SHA-256 of the URL, holding a
//! `meta.json` sidecar (original URL + total length) and fixed-size block
//! files fetched on demand. Cached blocks survive process restarts and are
//! only removed by [`RemoteCache::clear`].
//!
//! # Directory Structure
//! ```text
//! cache_dir/
//! ├── 6b86b273…/            # sha256(url)
//! │   ├── meta.json         # {"url": …, "length": …}
//! │   ├── 00000000.blk
//! │   └── 00000001.blk
//! └── …
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use annexfs_common::DEFAULT_BLOCK_SIZE;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::error::CacheError;
use super::fetcher::RemoteFetcher;

/// Options for the remote block cache.
#[derive(Debug, Clone)]
pub struct RemoteCacheOptions {
    /// Directory for cached blocks.
    pub cache_dir: PathBuf,
    /// Block granularity for range fetches, in bytes.
    pub block_size: u64,
}

impl Default for RemoteCacheOptions {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/tmp/annexfs-cache"),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl RemoteCacheOptions {
    /// Create options with a custom cache directory.
    ///
    /// # Arguments
    /// * `cache_dir` - Directory for cached blocks
    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            ..Default::default()
        }
    }
}

/// Sidecar metadata for one cached URL.
#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    /// Original URL, kept for inspection (directory names are opaque).
    url: String,
    /// Total object length in bytes.
    length: u64,
}

struct CacheShared {
    cache_dir: PathBuf,
    block_size: u64,
    fetcher: Arc<dyn RemoteFetcher>,
    /// Single-flight guards per (url, block index).
    inflight: DashMap<(String, u64), Arc<Mutex<()>>>,
}

/// Read-through block cache shared by all readers of a dataset.
///
/// Cloning is cheap; clones share the same cache directory and fetcher.
#[derive(Clone)]
pub struct RemoteCache {
    shared: Arc<CacheShared>,
}

impl RemoteCache {
    /// Create a cache, creating the directory if needed.
    ///
    /// # Arguments
    /// * `options` - Cache configuration
    /// * `fetcher` - Remote transfer mechanism for misses
    pub fn new(
        options: RemoteCacheOptions,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&options.cache_dir)
            .map_err(|e| CacheError::io(options.cache_dir.display().to_string(), e))?;

        Ok(Self {
            shared: Arc::new(CacheShared {
                cache_dir: options.cache_dir,
                block_size: options.block_size,
                fetcher,
                inflight: DashMap::new(),
            }),
        })
    }

    /// The cache directory path.
    pub fn cache_dir(&self) -> &Path {
        &self.shared.cache_dir
    }

    /// Open a URL for cached random-access reads.
    ///
    /// If the URL's metadata is already cached no network I/O happens;
    /// otherwise one probe records the object length.
    ///
    /// # Arguments
    /// * `url` - Object URL
    pub async fn open(&self, url: &str) -> Result<CachedReader, CacheError> {
        let dir: PathBuf = self.shared.cache_dir.join(url_digest(url));
        let meta_path: PathBuf = dir.join("meta.json");

        if let Some(meta) = read_meta(&meta_path) {
            tracing::debug!(url, length = meta.length, "cache meta hit, no probe");
            return Ok(CachedReader {
                shared: Arc::clone(&self.shared),
                url: url.to_string(),
                dir,
                length: meta.length,
            });
        }

        let length: u64 = self.shared.fetcher.probe(url).await.map_err(CacheError::Fetch)?;

        std::fs::create_dir_all(&dir).map_err(|e| CacheError::io(dir.display().to_string(), e))?;
        let meta: CacheMeta = CacheMeta {
            url: url.to_string(),
            length,
        };
        write_atomic(
            &meta_path,
            serde_json::to_vec(&meta)
                .map_err(|e| CacheError::io(meta_path.display().to_string(), std::io::Error::other(e)))?
                .as_slice(),
        )?;

        tracing::debug!(url, length, "probed remote object, meta cached");

        Ok(CachedReader {
            shared: Arc::clone(&self.shared),
            url: url.to_string(),
            dir,
            length,
        })
    }

    /// Drop all cached bytes for this cache directory unconditionally.
    ///
    /// Cache contents are recomputable, so a concurrent writer racing this
    /// clear is last-writer-wins, not corruption. Must not be called while
    /// handles from this cache are open.
    pub fn clear(&self) -> Result<(), CacheError> {
        match std::fs::remove_dir_all(&self.shared.cache_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CacheError::io(
                    self.shared.cache_dir.display().to_string(),
                    e,
                ))
            }
        }
        std::fs::create_dir_all(&self.shared.cache_dir)
            .map_err(|e| CacheError::io(self.shared.cache_dir.display().to_string(), e))?;
        tracing::debug!(dir = %self.shared.cache_dir.display(), "remote cache cleared");
        Ok(())
    }
}

/// Random-access reader over one cached URL.
pub struct CachedReader {
    shared: Arc<CacheShared>,
    url: String,
    dir: PathBuf,
    length: u64,
}

impl CachedReader {
    /// Total object length in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the object is empty.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The URL this reader serves.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Read up to `len` bytes at `offset`, fetching missing blocks.
    ///
    /// Reads past the end of the object are clamped; a read entirely past
    /// the end returns an empty buffer.
    ///
    /// # Arguments
    /// * `offset` - Start offset in bytes
    /// * `len` - Number of bytes requested
    pub async fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, CacheError> {
        if offset >= self.length || len == 0 {
            return Ok(Vec::new());
        }
        let end: u64 = (offset + len).min(self.length);
        let block_size: u64 = self.shared.block_size;

        let first: u64 = offset / block_size;
        let last: u64 = (end - 1) / block_size;

        let mut out: Vec<u8> = Vec::with_capacity((end - offset) as usize);
        for index in first..=last {
            let block: Vec<u8> = self.block(index).await?;
            let block_start: u64 = index * block_size;
            let from: usize = offset.saturating_sub(block_start).min(block.len() as u64) as usize;
            let to: usize = (end - block_start).min(block.len() as u64) as usize;
            out.extend_from_slice(&block[from..to]);
        }

        Ok(out)
    }

    /// Load one block, fetching and persisting it when absent.
    async fn block(&self, index: u64) -> Result<Vec<u8>, CacheError> {
        let path: PathBuf = self.dir.join(format!("{:08}.blk", index));

        if let Ok(data) = std::fs::read(&path) {
            return Ok(data);
        }

        // Single-flight per (url, block): concurrent readers of the same
        // missing block wait for one fetch instead of racing the remote.
        let flight_key: (String, u64) = (self.url.clone(), index);
        let gate: Arc<Mutex<()>> = self
            .shared
            .inflight
            .entry(flight_key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // A concurrent fetch may have landed while we waited.
        if let Ok(data) = std::fs::read(&path) {
            self.shared.inflight.remove(&flight_key);
            return Ok(data);
        }

        let start: u64 = index * self.shared.block_size;
        let want: u64 = self.shared.block_size.min(self.length - start);
        let data: Vec<u8> = self
            .shared
            .fetcher
            .fetch_range(&self.url, start, want)
            .await
            .map_err(CacheError::Fetch)?;

        write_atomic(&path, &data)?;
        self.shared.inflight.remove(&flight_key);

        tracing::debug!(url = %self.url, index, bytes = data.len(), "block fetched and cached");
        Ok(data)
    }
}

/// Stable directory name for a URL.
fn url_digest(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}

fn read_meta(path: &Path) -> Option<CacheMeta> {
    let data: Vec<u8> = std::fs::read(path).ok()?;
    match serde_json::from_slice(&data) {
        Ok(meta) => Some(meta),
        Err(e) => {
            // Unreadable sidecar: treat as a miss and re-probe.
            tracing::warn!(path = %path.display(), error = %e, "discarding corrupt cache meta");
            None
        }
    }
}

/// Write a file atomically (temp file + rename).
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let tmp: PathBuf = path.with_extension("tmp");
    if let Some(parent) = tmp.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CacheError::io(parent.display().to_string(), e))?;
    }
    std::fs::write(&tmp, data).map_err(|e| CacheError::io(tmp.display().to_string(), e))?;
    std::fs::rename(&tmp, path).map_err(|e| CacheError::io(path.display().to_string(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::super::error::FetchError;

    /// Fetcher stub with call counting, for cache-behavior assertions.
    #[derive(Default)]
    struct CountingFetcher {
        content: HashMap<String, Vec<u8>>,
        probes: AtomicU64,
        fetches: AtomicU64,
    }

    impl CountingFetcher {
        fn with(url: &str, data: &[u8]) -> Self {
            let mut fetcher: CountingFetcher = CountingFetcher::default();
            fetcher.content.insert(url.to_string(), data.to_vec());
            fetcher
        }
    }

    #[async_trait]
    impl RemoteFetcher for CountingFetcher {
        async fn probe(&self, url: &str) -> Result<u64, FetchError> {
            self.probes.fetch_add(1, Ordering::Relaxed);
            self.content
                .get(url)
                .map(|d: &Vec<u8>| d.len() as u64)
                .ok_or_else(|| FetchError::NotFound {
                    url: url.to_string(),
                })
        }

        async fn fetch_range(
            &self,
            url: &str,
            offset: u64,
            len: u64,
        ) -> Result<Vec<u8>, FetchError> {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            let data: &Vec<u8> = self.content.get(url).ok_or_else(|| FetchError::NotFound {
                url: url.to_string(),
            })?;
            let start: usize = offset as usize;
            let stop: usize = (offset + len).min(data.len() as u64) as usize;
            Ok(data[start..stop].to_vec())
        }
    }

    fn make_cache(fetcher: Arc<CountingFetcher>, block_size: u64) -> (RemoteCache, TempDir) {
        let temp: TempDir = TempDir::new().unwrap();
        let options: RemoteCacheOptions = RemoteCacheOptions {
            cache_dir: temp.path().join("cache"),
            block_size,
        };
        (RemoteCache::new(options, fetcher).unwrap(), temp)
    }

    const URL: &str = "https://example.org/ds/annex/objects/aa/bb/KEY/KEY";

    #[tokio::test]
    async fn test_read_through_and_no_refetch() {
        let fetcher: Arc<CountingFetcher> =
            Arc::new(CountingFetcher::with(URL, b"0123456789"));
        let (cache, _temp) = make_cache(Arc::clone(&fetcher), 4);

        let reader: CachedReader = cache.open(URL).await.unwrap();
        assert_eq!(reader.len(), 10);

        let data: Vec<u8> = reader.read_at(2, 6).await.unwrap();
        assert_eq!(data, b"234567");
        // Blocks 0 and 1 were fetched.
        assert_eq!(fetcher.fetches.load(Ordering::Relaxed), 2);

        // Identical range again: served from disk.
        let again: Vec<u8> = reader.read_at(2, 6).await.unwrap();
        assert_eq!(again, b"234567");
        assert_eq!(fetcher.fetches.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_reopen_uses_cached_meta() {
        let fetcher: Arc<CountingFetcher> =
            Arc::new(CountingFetcher::with(URL, b"0123456789"));
        let (cache, _temp) = make_cache(Arc::clone(&fetcher), 4);

        let _first: CachedReader = cache.open(URL).await.unwrap();
        assert_eq!(fetcher.probes.load(Ordering::Relaxed), 1);

        let second: CachedReader = cache.open(URL).await.unwrap();
        assert_eq!(fetcher.probes.load(Ordering::Relaxed), 1);
        assert_eq!(second.len(), 10);
    }

    #[tokio::test]
    async fn test_open_missing_url_is_not_found() {
        let fetcher: Arc<CountingFetcher> = Arc::new(CountingFetcher::default());
        let (cache, _temp) = make_cache(fetcher, 4);

        let result = cache.open(URL).await;
        assert!(matches!(
            result,
            Err(CacheError::Fetch(FetchError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_read_past_end_clamps() {
        let fetcher: Arc<CountingFetcher> = Arc::new(CountingFetcher::with(URL, b"abcdef"));
        let (cache, _temp) = make_cache(fetcher, 4);

        let reader: CachedReader = cache.open(URL).await.unwrap();
        assert_eq!(reader.read_at(4, 100).await.unwrap(), b"ef");
        assert!(reader.read_at(6, 1).await.unwrap().is_empty());
        assert!(reader.read_at(100, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_forces_refetch() {
        let fetcher: Arc<CountingFetcher> =
            Arc::new(CountingFetcher::with(URL, b"0123456789"));
        let (cache, _temp) = make_cache(Arc::clone(&fetcher), 4);

        let reader: CachedReader = cache.open(URL).await.unwrap();
        reader.read_at(0, 4).await.unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::Relaxed), 1);

        cache.clear().unwrap();

        let reader: CachedReader = cache.open(URL).await.unwrap();
        reader.read_at(0, 4).await.unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let fetcher: Arc<CountingFetcher> = Arc::new(CountingFetcher::default());
        let (cache, _temp) = make_cache(fetcher, 4);
        cache.clear().unwrap();
        cache.clear().unwrap();
    }

    #[tokio::test]
    async fn test_whole_object_read() {
        let fetcher: Arc<CountingFetcher> =
            Arc::new(CountingFetcher::with(URL, b"hello world"));
        let (cache, _temp) = make_cache(fetcher, 1024);

        let reader: CachedReader = cache.open(URL).await.unwrap();
        let data: Vec<u8> = reader.read_at(0, reader.len()).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn test_url_digest_is_stable_hex() {
        let a: String = url_digest("https://example.org/x");
        let b: String = url_digest("https://example.org/x");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c: char| c.is_ascii_hexdigit()));
        assert_ne!(url_digest("https://example.org/y"), a);
    }
}
