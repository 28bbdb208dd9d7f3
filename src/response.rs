//! Response primitives: entity tags, HTTP dates, validator headers and
//! error pages.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::StatusCode;

use crate::transport::Transport;

/// Entity tag derived from inode, size and modification time.
///
/// Opaque and comparison-only; not stable across filesystem migrations.
pub fn entity_tag(meta: &Metadata) -> String {
    format!("\"{:x}-{:x}-{:x}\"", meta.ino(), meta.len(), meta.mtime().max(0))
}

/// Modification time truncated to whole seconds, the granularity both the
/// entity tag and the RFC-1123 date headers carry.
pub fn modified_time(meta: &Metadata) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(meta.mtime().max(0) as u64)
}

/// RFC-1123 formatting, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// Parse an RFC-1123 date, falling back to the epoch when malformed.
///
/// The epoch fallback reproduces the daemon's precondition arithmetic: a
/// malformed If-Modified-Since can never prove non-modification, while a
/// malformed If-Unmodified-Since always fails the precondition.
pub fn date_or_epoch(value: &str) -> SystemTime {
    httpdate::parse_http_date(value).unwrap_or(UNIX_EPOCH)
}

/// Status line plus the cache-validation headers shared by 200 and 304.
pub fn send_ok_headers(transport: &mut dyn Transport, status: StatusCode, meta: Option<&Metadata>) {
    transport.send_status(status);
    if let Some(meta) = meta {
        transport.send_header("ETag", &entity_tag(meta));
        transport.send_header("Last-Modified", &http_date(modified_time(meta)));
    }
    transport.send_header("Date", &http_date(SystemTime::now()));
}

/// Emit a complete HTML error page and finalize the response.
pub fn client_error(transport: &mut dyn Transport, status: StatusCode, message: &str) {
    let reason = status.canonical_reason().unwrap_or("Error");

    transport.send_status(status);
    transport.send_header("Content-Type", "text/html");
    transport.send_header("Date", &http_date(SystemTime::now()));
    transport.end_headers();

    let body = format!(
        "<html><head><title>{code} {reason}</title></head>\
         <body><h1>{reason}</h1><p>{message}</p></body></html>",
        code = status.as_u16(),
    );
    transport.send_chunk(body.as_bytes());
    transport.request_done();
}
