//! The static-content serving core of a tiny HTTP daemon.
//!
//! Given a decoded request URL, this crate resolves a filesystem path
//! safely within a configured document root, evaluates conditional-request
//! preconditions, and streams the resulting file (or a directory listing)
//! back through a transport abstraction without ever blocking on the
//! network. An ordered dispatch registry lets other request types claim a
//! request before or instead of static file handling.
//!
//! # Architecture
//!
//! - [`resolver`]: URL to canonical, containment-checked path, with
//!   index-file substitution and path-info splitting
//! - [`conditional`]: ETag / If-* precondition evaluation
//! - [`dispatch`]: ordered handler registry and the built-in static handler
//! - [`listing`]: streamed HTML directory indexes
//! - [`pump`]: the backpressure-driven file streaming loop
//! - [`transport`]: the narrow seam to the connection's output side
//!
//! The core is synchronous and runs on one logical thread of control,
//! re-entered only through [`FileServer::handle_request`] and the pump's
//! write-readiness signal. All registries are immutable after
//! [`FileServer`] construction and safe to share.
//!
//! # Example
//!
//! ```no_run
//! use http::{HeaderMap, Method};
//! use micro_static::{Config, FileServer, MemoryTransport, RequestContext};
//!
//! let server = FileServer::builder(Config::new("/var/www")).build().unwrap();
//!
//! let headers = HeaderMap::new();
//! let ctx = RequestContext { method: Method::GET, url: "/index.html", headers: &headers };
//! let mut transport = MemoryTransport::new();
//! server.handle_request(&ctx, &mut transport);
//! ```

pub mod conditional;
pub mod config;
pub mod dispatch;
pub mod listing;
pub mod mime;
pub mod pump;
pub mod resolver;
pub mod response;
pub mod transport;

pub use config::Config;
pub use dispatch::{Authorizer, BuildError, DispatchHandler, FileServer, Predicate, RequestContext, Served};
pub use pump::{FilePump, PumpState};
pub use resolver::PathInfo;
pub use transport::{MemoryTransport, Transport};
