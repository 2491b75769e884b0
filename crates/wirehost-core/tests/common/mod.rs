//! Shared test helpers for wirehost-core integration tests.
//!
//! This module provides a scriptable fake surface and a server bootstrap on
//! `127.0.0.1:0`, plus a raw HTTP client that speaks to it over plain TCP.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use wirehost_core::atoms::{Atom, RESULT_SLOT};
use wirehost_core::bridge::OwnerBridge;
use wirehost_core::driver::{Cookie, Surface, SurfaceFault};
use wirehost_core::executor::{RetryPolicy, SurfaceExecutor};
use wirehost_core::handlers::ServerState;
use wirehost_core::server::WireServer;

// ---------------------------------------------------------------------------
// Fake surface
// ---------------------------------------------------------------------------

/// Answers every evaluated script except the result read-back.
pub type Responder = Box<dyn FnMut(&str) -> Result<Option<String>, SurfaceFault> + Send>;

/// Everything the fake surface was asked to do.
#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub scripts: Vec<String>,
    pub navigations: Vec<Url>,
    pub backs: usize,
    pub forwards: usize,
}

impl SurfaceLog {
    /// Scripts that called `atom`, oldest first.
    pub fn atom_calls(&self, atom: Atom) -> Vec<&String> {
        self.scripts.iter().filter(|s| is_atom(s, atom)).collect()
    }

    /// Arguments of the most recent call to `atom`.
    pub fn last_atom_args(&self, atom: Atom) -> Option<Value> {
        self.atom_calls(atom).last().map(|script| atom_args(script, atom))
    }
}

/// A surface whose script results come from a closure.
///
/// Atom scripts store the responder's answer in the result slot, the way
/// the runtime's `respond` wrapper does in a real document.
pub struct FakeSurface {
    responder: Responder,
    slot: Option<String>,
    log: Arc<Mutex<SurfaceLog>>,
    cookies: Vec<Cookie>,
    image: Vec<u8>,
    can_back: bool,
    can_forward: bool,
}

impl FakeSurface {
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&str) -> Result<Option<String>, SurfaceFault> + Send + 'static,
    {
        Self {
            responder: Box::new(responder),
            slot: None,
            log: Arc::new(Mutex::new(SurfaceLog::default())),
            cookies: Vec::new(),
            image: Vec::new(),
            can_back: false,
            can_forward: false,
        }
    }

    /// A surface whose atoms all succeed with a null value.
    pub fn null_atoms() -> Self {
        Self::new(|_| Ok(atom_reply(0, Value::Null)))
    }

    pub fn with_cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = image;
        self
    }

    pub fn with_history(mut self, can_back: bool, can_forward: bool) -> Self {
        self.can_back = can_back;
        self.can_forward = can_forward;
        self
    }

    pub fn log(&self) -> Arc<Mutex<SurfaceLog>> {
        Arc::clone(&self.log)
    }
}

impl Surface for FakeSurface {
    fn evaluate(&mut self, script: &str) -> Result<Option<String>, SurfaceFault> {
        if script == RESULT_SLOT {
            return Ok(self.slot.clone());
        }
        self.log.lock().unwrap().scripts.push(script.to_string());
        let result = (self.responder)(script)?;
        if script.contains("window.top.__wd.respond(") {
            self.slot = result.clone();
        }
        Ok(result)
    }

    fn navigate(&mut self, uri: &Url) -> Result<(), SurfaceFault> {
        self.log.lock().unwrap().navigations.push(uri.clone());
        Ok(())
    }

    fn capture_image(&mut self) -> Result<Vec<u8>, SurfaceFault> {
        Ok(self.image.clone())
    }

    fn cookies(&mut self) -> Result<Vec<Cookie>, SurfaceFault> {
        Ok(self.cookies.clone())
    }

    fn can_go_back(&self) -> bool {
        self.can_back
    }

    fn can_go_forward(&self) -> bool {
        self.can_forward
    }

    fn go_back(&mut self) {
        self.log.lock().unwrap().backs += 1;
    }

    fn go_forward(&mut self) {
        self.log.lock().unwrap().forwards += 1;
    }
}

/// The JSON an atom leaves in the result slot.
pub fn atom_reply(status: u16, value: Value) -> Option<String> {
    Some(json!({ "status": status, "value": value }).to_string())
}

/// True if `script` is a call of `atom`.
pub fn is_atom(script: &str, atom: Atom) -> bool {
    script.contains(&format!("respond(function {}(", atom.function_name()))
}

/// Extracts the positional argument array of an atom call.
pub fn atom_args(script: &str, atom: Atom) -> Value {
    let source = atom.source().trim_end();
    let start = script.find(source).expect("atom source in script") + source.len();
    // Skip ", " before the array and ");" after it.
    let array = &script[start + 2..script.len() - 2];
    serde_json::from_str(array).expect("atom arguments are JSON")
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

/// A running server plus what is needed to inspect and stop it.
pub struct TestServer {
    pub addr: SocketAddr,
    pub log: Arc<Mutex<SurfaceLog>>,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Retry policy short enough that exhaustion tests finish quickly.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 10,
        delay: Duration::from_millis(1),
    }
}

/// Starts a server on an ephemeral port backed by `surface`.
pub async fn start_server(surface: FakeSurface) -> TestServer {
    let log = surface.log();
    let (bridge, _owner) = OwnerBridge::spawn(move || surface).unwrap();
    let executor = SurfaceExecutor::with_retry_policy(bridge, fast_retry());
    let server = WireServer::new(ServerState::new(executor));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, token).await.unwrap();
    });

    TestServer { addr, log, shutdown }
}

// ---------------------------------------------------------------------------
// Raw HTTP client
// ---------------------------------------------------------------------------

/// A parsed HTTP response.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub location: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("body is not JSON ({e}): {:?}", self.body))
    }
}

/// Writes `raw` to a new connection and reads until the server closes it.
///
/// Returns `None` if the server closed without answering.
pub async fn send_raw(addr: SocketAddr, raw: &[u8]) -> Option<RawResponse> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    stream.flush().await.unwrap();

    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    if buf.is_empty() {
        return None;
    }
    Some(parse_response(&buf))
}

/// Sends one request with an optional JSON body.
pub async fn send(addr: SocketAddr, method: &str, path: &str, body: Option<Value>) -> RawResponse {
    let body = body.map(|b| b.to_string()).unwrap_or_default();
    let raw = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    send_raw(addr, raw.as_bytes())
        .await
        .expect("server answered")
}

/// Creates a session and returns its ID.
pub async fn new_session(addr: SocketAddr) -> String {
    let response = send(addr, "POST", "/session", Some(json!({"desiredCapabilities": {}}))).await;
    assert_eq!(response.status, 303);
    let location = response.location.expect("Location header");
    location
        .strip_prefix("/session/")
        .expect("session location")
        .to_string()
}

fn parse_response(buf: &[u8]) -> RawResponse {
    let text = String::from_utf8_lossy(buf).into_owned();
    let (head, body) = text.split_once("\r\n\r\n").expect("header terminator");
    let mut lines = head.split("\r\n");
    let status_line = lines.next().expect("status line");
    let status = status_line
        .split(' ')
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status code");

    let mut location = None;
    let mut content_type = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "location" => location = Some(value.trim().to_string()),
                "content-type" => content_type = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    RawResponse {
        status,
        location,
        content_type,
        body: body.to_string(),
    }
}
