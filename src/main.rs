//! Daemon glue: a tokio accept loop, a minimal request reader and a
//! wire-format transport over the serving core.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use micro_static::response::client_error;
use micro_static::{Config, FileServer, PumpState, RequestContext, Served, Transport};

const MAX_HEAD_SIZE: usize = 8192;
const MAX_HEADERS: usize = 64;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let docroot = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());
    let addr = std::env::args().nth(2).unwrap_or_else(|| "0.0.0.0:8080".to_string());

    let server = match FileServer::builder(Config::new(&docroot)).build() {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!(cause = %e, "invalid configuration");
            return;
        }
    };

    info!(%addr, docroot, "start listening");
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    loop {
        let (stream, _remote_addr) = match listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, server).await {
                debug!(cause = %e, "connection closed");
            }
        });
    }
}

struct ParsedRequest {
    method: Method,
    url: String,
    headers: HeaderMap,
    http11: bool,
    head_len: usize,
}

async fn handle_connection(mut stream: TcpStream, server: Arc<FileServer>) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        let head_len = loop {
            if let Some(len) = head_end(&buf) {
                break len;
            }
            if buf.len() > MAX_HEAD_SIZE {
                return Ok(());
            }
            if stream.read_buf(&mut buf).await? == 0 {
                return Ok(());
            }
        };

        let request = match parse_head(&buf[..head_len]) {
            Some(request) => request,
            None => return Ok(()),
        };
        buf.advance(request.head_len);

        let keep_alive = request.http11 && !wants_close(&request.headers);

        let mut transport = WireTransport::new(request.http11);
        let served = if request.method == Method::GET || request.method == Method::HEAD {
            let ctx = RequestContext { method: request.method.clone(), url: &request.url, headers: &request.headers };
            server.handle_request(&ctx, &mut transport)
        } else {
            client_error(&mut transport, StatusCode::METHOD_NOT_ALLOWED, "The request method is not supported.");
            Served::Done
        };

        stream.write_all(&transport.take_output()).await?;

        match served {
            Served::Done => {}
            Served::Aborted => {
                stream.flush().await?;
                return Ok(());
            }
            Served::Streaming(mut pump) => loop {
                // flushing empties the transport, which is the
                // write-readiness signal the pump waits for
                match pump.on_writable(&mut transport) {
                    PumpState::Blocked => stream.write_all(&transport.take_output()).await?,
                    PumpState::Complete => {
                        stream.write_all(&transport.take_output()).await?;
                        break;
                    }
                    PumpState::Failed => {
                        let _ = stream.write_all(&transport.take_output()).await;
                        let _ = stream.flush().await;
                        return Ok(());
                    }
                }
            },
        }
        stream.flush().await?;

        if !keep_alive {
            return Ok(());
        }
    }
}

fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n").map(|pos| pos + 4)
}

fn parse_head(head: &[u8]) -> Option<ParsedRequest> {
    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut header_storage);

    let head_len = match request.parse(head) {
        Ok(httparse::Status::Complete(len)) => len,
        _ => return None,
    };

    let method = request.method?.parse::<Method>().ok()?;
    let url = request.path?.to_string();
    let http11 = request.version? == 1;

    let mut headers = HeaderMap::new();
    for header in request.headers.iter() {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(header.name), HeaderValue::from_bytes(header.value)) {
            headers.append(name, value);
        }
    }

    Some(ParsedRequest { method, url, headers, http11, head_len })
}

fn wants_close(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::CONNECTION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("close"))
        .unwrap_or(false)
}

/// Wire-format [`Transport`]: serializes the status line and headers, and
/// frames the body with Content-Length when one was announced, chunked
/// otherwise (HTTP/1.1 only). Statuses that forbid content (1xx, 204, 304)
/// get no body framing at all.
struct WireTransport {
    out: BytesMut,
    http11: bool,
    has_length: bool,
    bodiless: bool,
    chunked: bool,
    done: bool,
}

impl WireTransport {
    fn new(http11: bool) -> Self {
        Self { out: BytesMut::new(), http11, has_length: false, bodiless: false, chunked: false, done: false }
    }

    /// Hand the buffered output to the socket writer.
    fn take_output(&mut self) -> BytesMut {
        self.out.split()
    }
}

impl Transport for WireTransport {
    fn send_status(&mut self, status: StatusCode) {
        self.bodiless = status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED;
        let version = if self.http11 { "HTTP/1.1" } else { "HTTP/1.0" };
        let reason = status.canonical_reason().unwrap_or("");
        self.out.extend_from_slice(format!("{version} {} {reason}\r\n", status.as_u16()).as_bytes());
    }

    fn send_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("content-length") {
            self.has_length = true;
        }
        self.out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    fn end_headers(&mut self) {
        self.chunked = self.http11 && !self.has_length && !self.bodiless;
        if self.chunked {
            self.out.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
        }
        self.out.extend_from_slice(b"\r\n");
    }

    fn send_chunk(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if self.chunked {
            self.out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
            self.out.extend_from_slice(data);
            self.out.extend_from_slice(b"\r\n");
        } else {
            self.out.extend_from_slice(data);
        }
    }

    fn pending_bytes(&self) -> usize {
        self.out.len()
    }

    fn request_done(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if self.chunked {
            self.out.extend_from_slice(b"0\r\n\r\n");
        }
    }
}
