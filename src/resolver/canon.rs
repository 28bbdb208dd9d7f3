//! Path canonicalization.

use std::fs;
use std::io;
use std::path::PathBuf;

/// Canonicalize an absolute path string.
///
/// With `no_symlinks` set, the filesystem's authoritative resolution is
/// used: every component must exist and symlink loops fail. Otherwise the
/// path is normalized purely lexically, which never touches the filesystem
/// and never follows symlinks. The lexical form is the faster,
/// symlink-trusting variant.
pub fn canonicalize(path: &str, no_symlinks: bool) -> io::Result<PathBuf> {
    if no_symlinks {
        return fs::canonicalize(path);
    }

    Ok(PathBuf::from(normalize(path)))
}

/// Collapse repeated `/`, drop `/./` segments, resolve `/x/../` without
/// backing past root. The result keeps a single leading `/` and no trailing
/// `/` unless the whole path is `/`. Output never exceeds the input length.
fn normalize(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}
