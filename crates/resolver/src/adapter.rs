//! The open dispatcher: the public entry point of the resolver.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use annexfs_common::{
    lexical_join, to_posix_path, CACHE_SUBDIR, DEFAULT_BLOCK_SIZE, DEFAULT_FETCH_TIMEOUT_SECS,
    DEFAULT_LOCATION_CACHE_CAPACITY, DEFAULT_PLACEHOLDER_THRESHOLD, DEFAULT_QUERY_TIMEOUT_SECS,
    DEFAULT_STATE_CACHE_CAPACITY, DEFAULT_STATE_CACHE_TTL_SECS,
};
use annexfs_registry::{AnnexQuery, GitAnnexRegistry};
use dashmap::DashMap;
use lru::LruCache;

use crate::error::ResolveError;
use crate::handle::{EncodingOptions, FileHandle, OpenMode};
use crate::locate::find_dataset_root;
use crate::remote::{CacheError, HttpFetcher, RemoteCache, RemoteCacheOptions, RemoteFetcher};
use crate::state::{classify, FileState};
use crate::urls::UrlCandidates;

/// Constructs a registry handle for a dataset root.
pub type RegistryFactory = Arc<dyn Fn(&Path) -> Arc<dyn AnnexQuery> + Send + Sync>;

/// Tuning options for [`FsAdapter`].
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Size bound for the placeholder heuristic (see [`classify`]).
    pub placeholder_threshold: u64,
    /// Capacity of the path -> dataset-root memoization table.
    pub location_cache_capacity: usize,
    /// Capacity of the classification memoization table.
    pub state_cache_capacity: usize,
    /// Staleness window for memoized classifications; `None` never expires.
    pub state_cache_ttl: Option<Duration>,
    /// Bound on each registry batch query.
    pub query_timeout: Duration,
    /// Bound on each remote probe or range request.
    pub fetch_timeout: Duration,
    /// Block granularity of the remote cache.
    pub block_size: u64,
    /// Cache directory override; defaults to a reserved subdirectory of
    /// the adapter root.
    pub cache_dir: Option<PathBuf>,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            placeholder_threshold: DEFAULT_PLACEHOLDER_THRESHOLD,
            location_cache_capacity: DEFAULT_LOCATION_CACHE_CAPACITY,
            state_cache_capacity: DEFAULT_STATE_CACHE_CAPACITY,
            state_cache_ttl: Some(Duration::from_secs(DEFAULT_STATE_CACHE_TTL_SECS)),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            block_size: DEFAULT_BLOCK_SIZE,
            cache_dir: None,
        }
    }
}

/// Transparent content resolver over a tree of annexed datasets.
///
/// Given a path, decides where the bytes live (local disk, or a remote
/// holding the content of a tracked-but-absent file) and returns a
/// uniform [`FileHandle`] either way. Registry handles are created lazily,
/// one per dataset root, and live until [`FsAdapter::shutdown`]. Remote
/// bytes are served through a persistent on-disk cache shared by every
/// reader of the tree.
///
/// All methods take `&self` and may be called concurrently; a slow query
/// or fetch for one file does not serialize opens of unrelated files.
pub struct FsAdapter {
    root: PathBuf,
    options: AdapterOptions,
    registry_factory: RegistryFactory,
    registries: DashMap<PathBuf, Arc<dyn AnnexQuery>>,
    location_cache: Mutex<LruCache<PathBuf, PathBuf>>,
    state_cache: Mutex<LruCache<(PathBuf, String), (FileState, Instant)>>,
    cache: RemoteCache,
}

impl FsAdapter {
    /// Create an adapter for a top-level root with default options.
    ///
    /// # Arguments
    /// * `root` - Absolute top-level root all datasets must live under
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ResolveError> {
        Self::with_options(root, AdapterOptions::default())
    }

    /// Create an adapter with explicit options.
    ///
    /// # Arguments
    /// * `root` - Absolute top-level root
    /// * `options` - Tuning options
    pub fn with_options(
        root: impl Into<PathBuf>,
        options: AdapterOptions,
    ) -> Result<Self, ResolveError> {
        let fetcher: Arc<dyn RemoteFetcher> = Arc::new(
            HttpFetcher::new(options.fetch_timeout)
                .map_err(|e| ResolveError::Cache(CacheError::Fetch(e)))?,
        );
        let query_timeout: Duration = options.query_timeout;
        let factory: RegistryFactory = Arc::new(move |root: &Path| {
            Arc::new(GitAnnexRegistry::new(root, query_timeout)) as Arc<dyn AnnexQuery>
        });
        Self::with_backends(root, options, factory, fetcher)
    }

    /// Create an adapter with caller-supplied backends.
    ///
    /// The seam for tests and embedders: any [`AnnexQuery`] source and any
    /// [`RemoteFetcher`] can stand in for the real subprocess and HTTP
    /// implementations.
    ///
    /// # Arguments
    /// * `root` - Absolute top-level root
    /// * `options` - Tuning options
    /// * `registry_factory` - Builds the registry handle per dataset root
    /// * `fetcher` - Remote transfer mechanism
    pub fn with_backends(
        root: impl Into<PathBuf>,
        options: AdapterOptions,
        registry_factory: RegistryFactory,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Result<Self, ResolveError> {
        let root: PathBuf = root.into();
        let cache_dir: PathBuf = options
            .cache_dir
            .clone()
            .unwrap_or_else(|| root.join(CACHE_SUBDIR));
        let cache: RemoteCache = RemoteCache::new(
            RemoteCacheOptions {
                cache_dir,
                block_size: options.block_size,
            },
            fetcher,
        )?;

        let location_capacity: NonZeroUsize = non_zero(options.location_cache_capacity);
        let state_capacity: NonZeroUsize = non_zero(options.state_cache_capacity);

        Ok(Self {
            root,
            options,
            registry_factory,
            registries: DashMap::new(),
            location_cache: Mutex::new(LruCache::new(location_capacity)),
            state_cache: Mutex::new(LruCache::new(state_capacity)),
            cache,
        })
    }

    /// The configured top-level root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open a file for reading, wherever its bytes live.
    ///
    /// Untracked and locally-present files open straight from disk.
    /// Tracked-absent files are resolved to candidate URLs and served
    /// through the shared remote cache; the first candidate that opens
    /// wins, and per-candidate failures are logged and swallowed.
    ///
    /// # Arguments
    /// * `path` - Path, absolute or relative to the adapter root
    /// * `mode` - `"r"`, `"rb"`, or `"rt"`
    /// * `encoding` - Text decoding options; defaults to strict UTF-8
    ///
    /// # Errors
    /// `UnsupportedMode`, `UnsupportedEncoding`, `OutsideRoot`,
    /// `NoUsableSource`, or a propagated registry/IO failure.
    pub async fn open(
        &self,
        path: impl AsRef<Path>,
        mode: &str,
        encoding: Option<EncodingOptions>,
    ) -> Result<FileHandle, ResolveError> {
        let mode: OpenMode = OpenMode::parse(mode)?;
        let encoding: EncodingOptions = encoding.unwrap_or_default();
        if mode == OpenMode::Text && !encoding.is_supported() {
            return Err(ResolveError::UnsupportedEncoding {
                encoding: encoding.encoding,
            });
        }

        let abs: PathBuf = lexical_join(&self.root, path.as_ref());
        let path_str: String = abs.display().to_string();

        match self.locate(&abs) {
            Ok(dataset_root) => {
                let relpath: String = self.relpath(&dataset_root, &abs)?;
                let registry: Arc<dyn AnnexQuery> = self.registry_for(&dataset_root);
                let state: FileState = self
                    .classify_cached(registry.as_ref(), &dataset_root, &relpath)
                    .await?;

                match state {
                    FileState::TrackedAbsent { key } => {
                        return self
                            .open_remote(&abs, &key, registry.as_ref(), mode, encoding)
                            .await;
                    }
                    FileState::TrackedPresent { .. } => {
                        tracing::debug!(path = %path_str, "under annex, has content, opening directly");
                    }
                    FileState::NotTracked => {
                        tracing::debug!(path = %path_str, "not under annex, opening directly");
                    }
                }
            }
            // No enclosing dataset: the file is ordinary local data.
            Err(ResolveError::NotTracked { .. }) => {
                tracing::debug!(path = %path_str, "no enclosing dataset, opening directly");
            }
            Err(e) => return Err(e),
        }

        FileHandle::local(&abs, mode, encoding)
    }

    /// Whether a path is under content tracking.
    ///
    /// # Arguments
    /// * `path` - Path, absolute or relative to the adapter root
    pub async fn is_tracked(&self, path: impl AsRef<Path>) -> Result<bool, ResolveError> {
        let abs: PathBuf = lexical_join(&self.root, path.as_ref());

        match self.locate(&abs) {
            Ok(dataset_root) => {
                let relpath: String = self.relpath(&dataset_root, &abs)?;
                let registry: Arc<dyn AnnexQuery> = self.registry_for(&dataset_root);
                let state: FileState = self
                    .classify_cached(registry.as_ref(), &dataset_root, &relpath)
                    .await?;
                Ok(state.is_tracked())
            }
            Err(ResolveError::NotTracked { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Drop all cached remote bytes for this adapter.
    pub fn clear_cache(&self) -> Result<(), ResolveError> {
        Ok(self.cache.clear()?)
    }

    /// Release every per-dataset registry handle. Safe to call repeatedly;
    /// handles recreate lazily if the adapter is used again afterwards.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<dyn AnnexQuery>> = self
            .registries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.registries.clear();

        for handle in handles {
            handle.shutdown().await;
        }
    }

    /// Locate the dataset root owning `abs`, memoized.
    fn locate(&self, abs: &Path) -> Result<PathBuf, ResolveError> {
        {
            let mut cache = self.location_cache.lock().unwrap();
            if let Some(root) = cache.get(abs) {
                return Ok(root.clone());
            }
        }

        let root: PathBuf = find_dataset_root(&self.root, abs)?;
        self.location_cache
            .lock()
            .unwrap()
            .put(abs.to_path_buf(), root.clone());
        Ok(root)
    }

    fn relpath(&self, dataset_root: &Path, abs: &Path) -> Result<String, ResolveError> {
        let rel = abs
            .strip_prefix(dataset_root)
            .map_err(|_| ResolveError::OutsideRoot {
                path: abs.display().to_string(),
                root: dataset_root.display().to_string(),
            })?;
        Ok(to_posix_path(rel))
    }

    /// Get or create the registry handle for a dataset root.
    ///
    /// `DashMap::entry` guarantees at most one handle is constructed per
    /// root even under racing first access.
    fn registry_for(&self, dataset_root: &Path) -> Arc<dyn AnnexQuery> {
        self.registries
            .entry(dataset_root.to_path_buf())
            .or_insert_with(|| (self.registry_factory)(dataset_root))
            .clone()
    }

    /// Classify with bounded, TTL'd memoization.
    async fn classify_cached(
        &self,
        registry: &dyn AnnexQuery,
        dataset_root: &Path,
        relpath: &str,
    ) -> Result<FileState, ResolveError> {
        let cache_key: (PathBuf, String) = (dataset_root.to_path_buf(), relpath.to_string());

        {
            let mut cache = self.state_cache.lock().unwrap();
            if let Some((state, cached_at)) = cache.get(&cache_key) {
                let fresh: bool = self
                    .options
                    .state_cache_ttl
                    .map(|ttl: Duration| cached_at.elapsed() <= ttl)
                    .unwrap_or(true);
                if fresh {
                    return Ok(state.clone());
                }
            }
        }

        let state: FileState = classify(
            registry,
            dataset_root,
            relpath,
            self.options.placeholder_threshold,
        )
        .await?;

        self.state_cache
            .lock()
            .unwrap()
            .put(cache_key, (state.clone(), Instant::now()));
        Ok(state)
    }

    /// Try every candidate URL through the shared cache.
    async fn open_remote(
        &self,
        abs: &Path,
        key: &str,
        registry: &dyn AnnexQuery,
        mode: OpenMode,
        encoding: EncodingOptions,
    ) -> Result<FileHandle, ResolveError> {
        let path_str: String = abs.display().to_string();
        let candidates: UrlCandidates = UrlCandidates::collect(registry, key).await?;
        tracing::debug!(
            path = %path_str,
            candidates = candidates.len(),
            "under annex, no content, resolving remotely"
        );

        for url in candidates.iter() {
            match self.cache.open(url).await {
                Ok(reader) => {
                    tracing::debug!(path = %path_str, url, "opened via remote candidate");
                    return Ok(FileHandle::remote(reader, mode, encoding, path_str));
                }
                Err(err) => {
                    tracing::debug!(path = %path_str, url, error = %err, "candidate failed");
                }
            }
        }

        Err(ResolveError::NoUsableSource {
            path: path_str,
            attempted: candidates.into_vec(),
        })
    }
}

fn non_zero(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}
