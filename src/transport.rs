//! The transport seam between the serving core and the event loop.
//!
//! The core never talks to a socket directly. Everything it produces goes
//! through the [`Transport`] trait: a status line, header lines, body
//! segments, and a final "request done" signal. The transport owns the
//! output buffer and reports how many bytes it has accepted but not yet
//! written to the peer, which is what drives the streaming pump's
//! backpressure loop.

use http::StatusCode;

/// Narrow interface to the connection's output side.
///
/// Implementations must tolerate `request_done` being called at most once
/// per response; the core guarantees it never calls it twice.
pub trait Transport {
    /// Emit the status line and open the header section.
    fn send_status(&mut self, status: StatusCode);

    /// Emit one response header line.
    fn send_header(&mut self, name: &str, value: &str);

    /// Terminate the header section; body segments may follow.
    fn end_headers(&mut self);

    /// Append one body segment to the output buffer.
    fn send_chunk(&mut self, data: &[u8]);

    /// Bytes accepted but not yet written out to the peer.
    fn pending_bytes(&self) -> usize;

    /// Finalize the response, closing any body framing.
    fn request_done(&mut self);
}

/// An in-memory [`Transport`] that records the response structurally.
///
/// Useful for embedding the core into a custom event loop and for tests:
/// the status, headers and body are kept separate, and the unsent-byte
/// count only shrinks when the caller explicitly [`drain`](Self::drain)s,
/// which makes backpressure observable.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    status: Option<StatusCode>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    done: bool,
    drained: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// First value recorded for `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Mark everything accepted so far as written to the peer.
    pub fn drain(&mut self) {
        self.drained = self.body.len();
    }
}

impl Transport for MemoryTransport {
    fn send_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn send_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn end_headers(&mut self) {}

    fn send_chunk(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    fn pending_bytes(&self) -> usize {
        self.body.len() - self.drained
    }

    fn request_done(&mut self) {
        self.done = true;
    }
}
