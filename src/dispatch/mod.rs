//! Ordered request dispatch and the built-in static file handler.
//!
//! A request is owned by exactly one handler. URL-keyed handlers get a
//! chance before any filesystem work; once a path resolves, path-keyed
//! handlers are tried in registration order; the static file handler is the
//! fallback. When nothing resolves at all, the whole pipeline is retried
//! once against the configured error-handler URL before the generic 404.

use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;

use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::conditional::{self, ConditionalHeaders, Evaluation};
use crate::config::Config;
use crate::listing;
use crate::mime;
use crate::pump::{FilePump, PumpState};
use crate::resolver::{PathInfo, Resolver};
use crate::response::{client_error, entity_tag, http_date, modified_time, send_ok_headers};
use crate::transport::Transport;

const OTHERS_READ: u32 = 0o004;

/// One request as seen by the dispatch layer.
pub struct RequestContext<'a> {
    pub method: Method,
    /// Raw request URL, still percent-encoded, query included.
    pub url: &'a str,
    /// The parsed request-header table.
    pub headers: &'a HeaderMap,
}

/// Outcome of handling one request.
pub enum Served {
    /// The response was fully handed to the transport.
    Done,
    /// A file body remains; drive the pump on write-readiness signals.
    Streaming(FilePump),
    /// The response was aborted mid-body; tear the connection down.
    Aborted,
}

/// How a handler claims requests. Each handler declares exactly one kind:
/// by raw URL, before any path resolution, or by resolved path.
pub enum Predicate {
    Url(Box<dyn Fn(&str) -> bool + Send + Sync>),
    Path(Box<dyn Fn(&PathInfo, &str) -> bool + Send + Sync>),
}

type HandlerFn = Box<dyn Fn(&RequestContext, &mut dyn Transport, Option<&PathInfo>) -> Served + Send + Sync>;

/// A registered (predicate, handler) pair.
pub struct DispatchHandler {
    predicate: Predicate,
    handler: HandlerFn,
}

impl DispatchHandler {
    /// Handler matched on the raw URL; it intercepts the request before any
    /// filesystem work, so it receives no `PathInfo`.
    pub fn by_url<P, H>(predicate: P, handler: H) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
        H: Fn(&RequestContext, &mut dyn Transport, Option<&PathInfo>) -> Served + Send + Sync + 'static,
    {
        Self { predicate: Predicate::Url(Box::new(predicate)), handler: Box::new(handler) }
    }

    /// Handler matched on the resolved path; only tried after resolution
    /// and authorization succeed.
    pub fn by_path<P, H>(predicate: P, handler: H) -> Self
    where
        P: Fn(&PathInfo, &str) -> bool + Send + Sync + 'static,
        H: Fn(&RequestContext, &mut dyn Transport, Option<&PathInfo>) -> Served + Send + Sync + 'static,
    {
        Self { predicate: Predicate::Path(Box::new(predicate)), handler: Box::new(handler) }
    }
}

/// Authorization collaborator consulted after resolution, before the target
/// handler runs. A deny means the collaborator has already written the
/// 401/403 response itself.
pub trait Authorizer: Send + Sync {
    fn check(&self, ctx: &RequestContext, transport: &mut dyn Transport, info: &PathInfo) -> bool;
}

struct AllowAll;

impl Authorizer for AllowAll {
    fn check(&self, _ctx: &RequestContext, _transport: &mut dyn Transport, _info: &PathInfo) -> bool {
        true
    }
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("document root {path:?} is not usable: {source}")]
    InvalidDocroot { path: PathBuf, source: std::io::Error },
}

/// The serving core: configuration, handler registry, authorizer.
///
/// Built once at startup; everything inside is read-only afterwards and
/// safe to share across any number of request-processing contexts.
pub struct FileServer {
    config: Config,
    handlers: Vec<DispatchHandler>,
    authorizer: Box<dyn Authorizer>,
}

pub struct FileServerBuilder {
    config: Config,
    handlers: Vec<DispatchHandler>,
    authorizer: Box<dyn Authorizer>,
}

impl FileServerBuilder {
    fn new(config: Config) -> Self {
        Self { config, handlers: Vec::new(), authorizer: Box::new(AllowAll) }
    }

    /// Append a candidate index file name, tried after those already
    /// registered.
    pub fn index_file(mut self, name: impl Into<String>) -> Self {
        self.config.index_files.push(name.into());
        self
    }

    /// Append a dispatch handler; handlers are tried in registration order.
    pub fn handler(mut self, handler: DispatchHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Box::new(authorizer);
        self
    }

    pub fn build(mut self) -> Result<FileServer, BuildError> {
        self.config.docroot = std::fs::canonicalize(&self.config.docroot)
            .map_err(|source| BuildError::InvalidDocroot { path: self.config.docroot.clone(), source })?;

        Ok(FileServer { config: self.config, handlers: self.handlers, authorizer: self.authorizer })
    }
}

impl FileServer {
    pub fn builder(config: Config) -> FileServerBuilder {
        FileServerBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Single entry point, invoked once per parsed request.
    ///
    /// Always terminates by emitting a response before returning, except
    /// for the streaming case where termination is deferred to later
    /// write-readiness signals on the returned pump.
    pub fn handle_request(&self, ctx: &RequestContext, transport: &mut dyn Transport) -> Served {
        if let Some(dispatch) = self.find_handler(ctx.url, None) {
            debug!(url = ctx.url, "url handler owns the request");
            return (dispatch.handler)(ctx, transport, None);
        }

        if let Some(served) = self.file_request(ctx, transport, ctx.url) {
            return served;
        }

        if let Some(error_url) = self.config.error_handler.as_deref() {
            if let Some(served) = self.file_request(ctx, transport, error_url) {
                return served;
            }
        }

        client_error(
            transport,
            StatusCode::NOT_FOUND,
            &format!("The requested URL {} was not found on this server.", ctx.url),
        );
        Served::Done
    }

    /// First registered handler whose predicate kind fits the current
    /// phase and matches.
    fn find_handler(&self, url: &str, info: Option<&PathInfo>) -> Option<&DispatchHandler> {
        self.handlers.iter().find(|dispatch| match (&dispatch.predicate, info) {
            (Predicate::Url(check), None) => check(url),
            (Predicate::Path(check), Some(info)) => check(info, url),
            _ => false,
        })
    }

    /// The static-file pipeline for one URL. `None` means the URL did not
    /// resolve and the caller may retry with the error-handler URL.
    fn file_request(&self, ctx: &RequestContext, transport: &mut dyn Transport, url: &str) -> Option<Served> {
        let resolver = Resolver::new(&self.config);
        let mut info = resolver.resolve(transport, url)?;
        if info.redirected {
            return Some(Served::Done);
        }

        let cond = ConditionalHeaders::from_headers(ctx.headers);
        info.auth = cond.authorization.map(str::to_owned);

        if !self.authorizer.check(ctx, transport, &info) {
            return Some(Served::Done);
        }

        if let Some(dispatch) = self.find_handler(url, Some(&info)) {
            debug!(url, name = %info.name, "path handler owns the request");
            return Some((dispatch.handler)(ctx, transport, Some(&info)));
        }

        Some(self.serve_entity(ctx, transport, url, &info, &cond))
    }

    fn serve_entity(
        &self,
        ctx: &RequestContext,
        transport: &mut dyn Transport,
        url: &str,
        info: &PathInfo,
        cond: &ConditionalHeaders,
    ) -> Served {
        if info.meta.mode() & OTHERS_READ == 0 {
            return forbidden(transport, url);
        }

        if info.meta.is_file() {
            return self.serve_file(ctx, transport, url, info, cond);
        }

        if info.meta.is_dir() {
            if !self.config.dirlist {
                return forbidden(transport, url);
            }
            listing::list(transport, info);
            return Served::Done;
        }

        forbidden(transport, url)
    }

    fn serve_file(
        &self,
        ctx: &RequestContext,
        transport: &mut dyn Transport,
        url: &str,
        info: &PathInfo,
        cond: &ConditionalHeaders,
    ) -> Served {
        let file = match File::open(&info.phys) {
            Ok(file) => file,
            Err(e) => {
                debug!(phys = %info.phys.display(), cause = %e, "open failed");
                return forbidden(transport, url);
            }
        };

        let etag = entity_tag(&info.meta);
        match conditional::evaluate(&ctx.method, cond, modified_time(&info.meta), &etag) {
            Evaluation::Proceed => {}
            Evaluation::NotModified => {
                send_ok_headers(transport, StatusCode::NOT_MODIFIED, Some(&info.meta));
                transport.end_headers();
                transport.request_done();
                return Served::Done;
            }
            Evaluation::PreconditionFailed => {
                transport.send_status(StatusCode::PRECONDITION_FAILED);
                transport.send_header("Date", &http_date(std::time::SystemTime::now()));
                transport.end_headers();
                transport.request_done();
                return Served::Done;
            }
        }

        send_ok_headers(transport, StatusCode::OK, Some(&info.meta));
        transport.send_header("Content-Type", mime::lookup(&info.name));
        transport.send_header("Content-Length", &info.meta.len().to_string());
        transport.end_headers();

        if ctx.method == Method::HEAD {
            transport.request_done();
            return Served::Done;
        }

        let mut pump = FilePump::new(file);
        match pump.on_writable(transport) {
            PumpState::Blocked => Served::Streaming(pump),
            PumpState::Complete => Served::Done,
            PumpState::Failed => Served::Aborted,
        }
    }
}

fn forbidden(transport: &mut dyn Transport, url: &str) -> Served {
    client_error(
        transport,
        StatusCode::FORBIDDEN,
        &format!("You don't have permission to access {url} on this server."),
    );
    Served::Done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    fn ok_handler(_ctx: &RequestContext, transport: &mut dyn Transport, _info: Option<&PathInfo>) -> Served {
        transport.send_status(StatusCode::OK);
        transport.end_headers();
        transport.request_done();
        Served::Done
    }

    fn server_with_handlers(docroot: &std::path::Path) -> FileServer {
        FileServer::builder(Config::new(docroot))
            .handler(DispatchHandler::by_url(|url| url.starts_with("/virtual"), ok_handler))
            .handler(DispatchHandler::by_path(|info, _url| info.path_info.is_some(), ok_handler))
            .build()
            .unwrap()
    }

    #[test]
    fn url_handler_intercepts_before_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with_handlers(dir.path());

        // nothing named "virtual" exists on disk
        let headers = HeaderMap::new();
        let ctx = RequestContext { method: Method::GET, url: "/virtual/endpoint", headers: &headers };
        let mut transport = MemoryTransport::new();
        server.handle_request(&ctx, &mut transport);

        assert_eq!(transport.status(), Some(StatusCode::OK));
    }

    #[test]
    fn path_handler_requires_a_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("script.txt"), b"x").unwrap();
        let server = server_with_handlers(dir.path());

        let headers = HeaderMap::new();
        let ctx = RequestContext { method: Method::GET, url: "/script.txt/trailing", headers: &headers };
        let mut transport = MemoryTransport::new();
        server.handle_request(&ctx, &mut transport);
        assert_eq!(transport.status(), Some(StatusCode::OK));

        // without a resolvable path the same predicate never fires
        let ctx = RequestContext { method: Method::GET, url: "/gone/trailing", headers: &headers };
        let mut transport = MemoryTransport::new();
        server.handle_request(&ctx, &mut transport);
        assert_eq!(transport.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn invalid_docroot_fails_to_build() {
        let result = FileServer::builder(Config::new("/definitely/not/here")).build();
        assert!(matches!(result, Err(BuildError::InvalidDocroot { .. })));
    }

    #[test]
    fn denying_authorizer_reports_handled() {
        struct DenyAll;
        impl Authorizer for DenyAll {
            fn check(&self, _ctx: &RequestContext, transport: &mut dyn Transport, info: &PathInfo) -> bool {
                client_error(
                    transport,
                    StatusCode::UNAUTHORIZED,
                    &format!("Authorization required for {}.", info.name),
                );
                false
            }
        }

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), b"x").unwrap();
        let server = FileServer::builder(Config::new(dir.path())).authorizer(DenyAll).build().unwrap();

        let headers = HeaderMap::new();
        let ctx = RequestContext { method: Method::GET, url: "/file.txt", headers: &headers };
        let mut transport = MemoryTransport::new();
        let served = server.handle_request(&ctx, &mut transport);

        assert!(matches!(served, Served::Done));
        assert_eq!(transport.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn authorization_header_reaches_path_info() {
        struct Capture;
        impl Authorizer for Capture {
            fn check(&self, _ctx: &RequestContext, _transport: &mut dyn Transport, info: &PathInfo) -> bool {
                assert_eq!(info.auth.as_deref(), Some("Basic dXNlcjpwdw=="));
                true
            }
        }

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), b"x").unwrap();
        let server = FileServer::builder(Config::new(dir.path())).authorizer(Capture).build().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, "Basic dXNlcjpwdw==".parse().unwrap());
        let ctx = RequestContext { method: Method::GET, url: "/file.txt", headers: &headers };
        let mut transport = MemoryTransport::new();
        server.handle_request(&ctx, &mut transport);
        assert_eq!(transport.status(), Some(StatusCode::OK));
    }
}
