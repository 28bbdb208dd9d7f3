//! Process configuration for the serving core.

use serde::Deserialize;
use std::path::PathBuf;

/// Configuration knobs consumed by the serving core.
///
/// Built once at startup and shared read-only afterwards; none of these are
/// safe to change while requests are in flight.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Document root. No request may resolve outside of it.
    pub docroot: PathBuf,

    /// Resolve paths through the filesystem instead of trusting symlinks.
    ///
    /// When set, canonicalization uses the authoritative filesystem
    /// resolution and fails for paths whose components do not exist. When
    /// unset, a faster purely lexical normalization is used.
    pub no_symlinks: bool,

    /// Serve an HTML listing for directories without an index file.
    pub dirlist: bool,

    /// URL retried through the whole dispatch pipeline when the requested
    /// one fails to resolve.
    pub error_handler: Option<String>,

    /// Candidate index file names tried, in order, for directory requests.
    pub index_files: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docroot: PathBuf::from("/www"),
            no_symlinks: false,
            dirlist: true,
            error_handler: None,
            index_files: vec!["index.html".to_string()],
        }
    }
}

impl Config {
    /// Configuration with the given document root and default knobs.
    pub fn new(docroot: impl Into<PathBuf>) -> Self {
        Self { docroot: docroot.into(), ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new("/srv/www");
        assert_eq!(config.docroot, PathBuf::from("/srv/www"));
        assert!(!config.no_symlinks);
        assert!(config.dirlist);
        assert_eq!(config.index_files, vec!["index.html".to_string()]);
    }
}
