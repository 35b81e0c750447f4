//! Transparent content resolver for annexed datasets.
//!
//! Exposes files tracked by content-addressed datasets through uniform
//! read handles, whether the bytes are on local disk or only on a remote.
//! The surrounding filesystem-interface layer calls [`FsAdapter::open`]
//! per file and reads ranges off the returned handle; everything else
//! (dataset location, state classification, candidate URL discovery,
//! cached remote fetching) happens behind that call.
//!
//! # Architecture
//!
//! ```text
//! FsAdapter (open dispatcher)
//! ├── locate      path -> nearest enclosing dataset root
//! ├── registry    per-root batched annex queries (annexfs-registry)
//! ├── state       NotTracked / TrackedAbsent / TrackedPresent + key
//! ├── urls        ordered candidate URLs for absent content
//! └── remote      persistent block cache over a RemoteFetcher
//! ```

mod adapter;
mod error;
mod handle;
mod locate;
mod remote;
mod state;
mod urls;

pub use adapter::{AdapterOptions, FsAdapter, RegistryFactory};
pub use error::ResolveError;
pub use handle::{DecodeErrors, EncodingOptions, FileHandle, OpenMode};
pub use locate::find_dataset_root;
pub use remote::{
    CacheError, CachedReader, FetchError, HttpFetcher, RemoteCache, RemoteCacheOptions,
    RemoteFetcher,
};
pub use state::{classify, FileState};
pub use urls::UrlCandidates;

// Re-export the registry seam so embedders can supply their own backend.
pub use annexfs_registry::{AnnexQuery, GitAnnexRegistry, MemoryRegistry, RegistryError};
