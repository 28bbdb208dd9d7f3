//! Extension-based MIME lookup.

/// MIME type for a file name, `application/octet-stream` when no extension
/// matches.
pub fn lookup(path: &str) -> &'static str {
    mime_guess::from_path(path).first_raw().unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::lookup;

    #[test]
    fn known_extensions() {
        assert_eq!(lookup("/index.html"), "text/html");
        assert_eq!(lookup("/img/logo.png"), "image/png");
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(lookup("/data.zzz"), "application/octet-stream");
        assert_eq!(lookup("/noext"), "application/octet-stream");
    }
}
