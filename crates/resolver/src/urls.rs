//! Candidate URL generation for tracked-absent content.

use std::collections::HashSet;

use annexfs_registry::{AnnexQuery, HashPaths, RegistryError, WhereisEntry};

/// Ordered, deduplicated candidate URLs for one content key.
///
/// The registry round trips happen once, in [`UrlCandidates::collect`];
/// iteration afterwards is pure and restartable, so the dispatcher can
/// retry candidates and tests can enumerate the full set.
///
/// Ordering encodes preference, not correctness: explicitly recorded
/// source URLs first (in the registry's reported order), then synthesized
/// object paths per remote, bare-repository layout before working-tree
/// layout, lower bucketing before mixed. Any candidate that succeeds is
/// acceptable; an empty set is valid and signals total resolution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlCandidates {
    urls: Vec<String>,
}

impl UrlCandidates {
    /// Gather candidates for a key from the registry.
    ///
    /// # Arguments
    /// * `registry` - Registry handle for the dataset
    /// * `key` - Content key to locate
    pub async fn collect(
        registry: &dyn AnnexQuery,
        key: &str,
    ) -> Result<Self, RegistryError> {
        let mut urls: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for entry in registry.whereis(key).await? {
            let WhereisEntry { urls: entry_urls, .. } = entry;
            for url in entry_urls {
                if is_http_url(&url) {
                    push_unique(&mut urls, &mut seen, url);
                }
            }
        }

        // Hash paths are only needed if some remote has an HTTP base URL;
        // fetch them at most once.
        let mut hash_paths: Option<HashPaths> = None;

        for name in registry.remotes().await? {
            let base: String = match registry.remote_url(&name).await? {
                Some(base) if is_http_url(&base) => base,
                _ => continue,
            };

            if hash_paths.is_none() {
                hash_paths = Some(registry.hash_paths(key).await?);
            }
            let Some(paths) = hash_paths.as_ref() else {
                continue;
            };

            let base: &str = base.trim_end_matches('/');
            push_unique(&mut urls, &mut seen, format!("{}/{}", base, paths.lower));
            push_unique(&mut urls, &mut seen, format!("{}/{}", base, paths.mixed));
            if !is_bare_repo_url(base) {
                push_unique(
                    &mut urls,
                    &mut seen,
                    format!("{}/.git/{}", base, paths.lower),
                );
                push_unique(
                    &mut urls,
                    &mut seen,
                    format!("{}/.git/{}", base, paths.mixed),
                );
            }
        }

        Ok(Self { urls })
    }

    /// Iterate candidates in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Whether no candidate exists.
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Consume into the ordered URL list.
    pub fn into_vec(self) -> Vec<String> {
        self.urls
    }
}

fn push_unique(urls: &mut Vec<String>, seen: &mut HashSet<String>, url: String) {
    if seen.insert(url.clone()) {
        urls.push(url);
    }
}

/// Whether a string is an HTTP(S) URL.
pub(crate) fn is_http_url(s: &str) -> bool {
    let lower: String = s.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Whether a base URL names a bare repository endpoint.
fn is_bare_repo_url(base: &str) -> bool {
    base.to_ascii_lowercase().ends_with("/.git")
}
