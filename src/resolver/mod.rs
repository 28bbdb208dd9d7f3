//! Mapping request URLs to filesystem entities.
//!
//! The resolver turns an attacker-controlled URL into a canonical,
//! containment-checked physical path plus an optional trailing path-info
//! remainder. Every failure mode (malformed encoding, escape attempt,
//! missing entity) degrades uniformly to `None`, which callers turn into a
//! 404 -- a deliberate choice so the containment check never leaks.

mod canon;

pub use canon::canonicalize;

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

use http::StatusCode;
use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::config::Config;
use crate::transport::Transport;

/// Longest decoded path accepted, matching PATH_MAX on common systems.
const MAX_PATH: usize = 4096;

/// A resolved request target. Lives for one request.
#[derive(Debug)]
pub struct PathInfo {
    /// Canonical absolute path of the target; always within the docroot.
    pub phys: PathBuf,
    /// The docroot-relative, URL-visible portion of `phys`.
    pub name: String,
    /// Residual path beyond the resolved entity, for CGI-style handlers.
    pub path_info: Option<String>,
    /// Raw query string, everything after the first `?`.
    pub query: Option<String>,
    /// Metadata of the resolved entity (after index substitution, if any).
    pub meta: Metadata,
    /// Set when the resolver already emitted a redirect; callers must stop.
    pub redirected: bool,
    /// Credential extracted from the Authorization header, if any.
    pub auth: Option<String>,
}

pub struct Resolver<'a> {
    config: &'a Config,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Resolve `url` against the document root.
    ///
    /// The transport is only touched for one case: a directory requested
    /// without a trailing slash gets an immediate 302 to the slashed URL,
    /// and the returned `PathInfo` has `redirected` set.
    pub fn resolve(&self, transport: &mut dyn Transport, url: &str) -> Option<PathInfo> {
        let (path_part, query) = match url.split_once('?') {
            Some((path, query)) => (path, (!query.is_empty()).then(|| query.to_string())),
            None => (url, None),
        };

        let decoded = percent_decode_str(path_part).decode_utf8().ok()?.into_owned();
        if decoded.len() > MAX_PATH || decoded.contains('\0') {
            return None;
        }

        let root = self.config.docroot.as_path();

        // Walk the '/' boundaries backward from the end of the decoded
        // path; the longest prefix resolving to an existing entity wins and
        // the suffix becomes path-info.
        let mut found: Option<(PathBuf, Metadata, &str)> = None;
        for cut in boundaries(&decoded) {
            let candidate = format!("{}{}", root.display(), &decoded[..cut]);
            let phys = match canonicalize(&candidate, self.config.no_symlinks) {
                Ok(phys) => phys,
                Err(_) => continue,
            };

            if let Ok(meta) = fs::metadata(&phys) {
                found = Some((phys, meta, &decoded[cut..]));
                break;
            }
        }
        let (phys, meta, remainder) = found?;

        if !phys.starts_with(root) {
            debug!(phys = %phys.display(), "resolved path escapes document root");
            return None;
        }

        let path_info = (!remainder.is_empty()).then(|| remainder.to_string());

        if meta.is_file() {
            let name = visible_name(root, &phys);
            return Some(PathInfo { phys, name, path_info, query, meta, redirected: false, auth: None });
        }

        if !meta.is_dir() || path_info.is_some() {
            return None;
        }

        let mut name = visible_name(root, &phys);
        if !name.ends_with('/') {
            name.push('/');
        }

        // Directory requested without a trailing slash: redirect to the
        // slashed URL, preserving the query string.
        if !decoded.ends_with('/') {
            transport.send_status(StatusCode::FOUND);
            let location = match &query {
                Some(query) => format!("{name}?{query}"),
                None => name.clone(),
            };
            transport.send_header("Location", &location);
            transport.end_headers();
            transport.request_done();
            return Some(PathInfo { phys, name, path_info: None, query, meta, redirected: true, auth: None });
        }

        // First index file that exists as a regular file wins.
        let mut phys = phys;
        let mut meta = meta;
        for index in &self.config.index_files {
            let candidate = phys.join(index);
            match fs::metadata(&candidate) {
                Ok(index_meta) if index_meta.is_file() => {
                    name.push_str(index);
                    phys = candidate;
                    meta = index_meta;
                    break;
                }
                _ => {}
            }
        }

        Some(PathInfo { phys, name, path_info: None, query, meta, redirected: false, auth: None })
    }
}

/// Cut positions to try, longest prefix first: the full path, then every
/// `/` boundary from the end.
fn boundaries(decoded: &str) -> impl Iterator<Item = usize> + '_ {
    std::iter::once(decoded.len()).chain(decoded.rmatch_indices('/').map(|(i, _)| i))
}

fn visible_name(root: &Path, phys: &Path) -> String {
    match phys.strip_prefix(root) {
        Ok(rest) if rest.as_os_str().is_empty() => "/".to_string(),
        Ok(rest) => format!("/{}", rest.display()),
        Err(_) => "/".to_string(),
    }
}
