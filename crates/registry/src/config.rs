//! Parsed git configuration snapshot for one dataset.
//!
//! Holds the remote list, per-remote URLs, and `url.<base>.insteadOf`
//! rewrite rules. Loaded once per registry handle; remote configuration is
//! not expected to change while a dataset is mounted.

use std::collections::HashMap;
use std::path::Path;

use tokio::process::Command;

use crate::error::RegistryError;

/// Remote and URL-rewriting configuration for a dataset.
#[derive(Debug, Default)]
pub struct GitConfig {
    /// Remote names in configuration order.
    remotes: Vec<String>,
    /// Raw (un-rewritten) URL per remote name.
    urls: HashMap<String, String>,
    /// `(matched_prefix, replacement_base)` rewrite rules.
    rewrites: Vec<(String, String)>,
}

impl GitConfig {
    /// Load the configuration for a repository root.
    ///
    /// # Arguments
    /// * `root` - Repository root to read configuration from
    pub async fn load(root: &Path) -> Result<Self, RegistryError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(root)
            .args(["config", "--list", "-z"])
            .output()
            .await
            .map_err(|source| RegistryError::Spawn {
                command: "git config --list".to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(RegistryError::CommandFailed {
                command: "git config --list".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text: String = String::from_utf8_lossy(&output.stdout).to_string();
        Ok(Self::from_entries(Self::split_entries(&text)))
    }

    /// Build a config from `(key, value)` pairs, preserving order.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut config: GitConfig = GitConfig::default();

        for (key, value) in entries {
            if let Some(rest) = key.strip_prefix("remote.") {
                if let Some(name) = rest.strip_suffix(".url") {
                    if !config.urls.contains_key(name) {
                        config.remotes.push(name.to_string());
                    }
                    config.urls.insert(name.to_string(), value);
                }
            } else if let Some(rest) = key.strip_prefix("url.") {
                // `git config --list` lowercases section and key but keeps
                // the subsection (the replacement base) verbatim.
                if let Some(base) = rest.strip_suffix(".insteadof") {
                    config.rewrites.push((value, base.to_string()));
                }
            }
        }

        // Longest prefix wins, matching git's insteadOf resolution.
        config
            .rewrites
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        config
    }

    /// Split `git config --list -z` output into `(key, value)` pairs.
    ///
    /// Entries are NUL-separated; key and value are separated by the first
    /// newline within an entry.
    fn split_entries(text: &str) -> Vec<(String, String)> {
        text.split('\0')
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once('\n') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (entry.to_string(), String::new()),
            })
            .collect()
    }

    /// Configured remote names, in configuration order.
    pub fn remotes(&self) -> &[String] {
        &self.remotes
    }

    /// The rewritten URL for a remote, if one is configured.
    ///
    /// # Arguments
    /// * `name` - Remote name
    pub fn remote_url(&self, name: &str) -> Option<String> {
        self.urls.get(name).map(|url: &String| self.rewrite_url(url))
    }

    /// Apply `url.<base>.insteadOf` rules to a URL.
    ///
    /// The longest matching prefix is replaced; a URL matching no rule is
    /// returned unchanged.
    ///
    /// # Arguments
    /// * `url` - URL to rewrite
    pub fn rewrite_url(&self, url: &str) -> String {
        for (prefix, base) in &self.rewrites {
            if let Some(rest) = url.strip_prefix(prefix.as_str()) {
                return format!("{}{}", base, rest);
            }
        }
        url.to_string()
    }
}
