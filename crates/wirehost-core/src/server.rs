//! Connection acceptor.
//!
//! One request per connection: read it, resolve its route, dispatch the
//! command, write the response, close. Connections are served on their own
//! tasks; commands are serialized through the [`ServerState`] lock so one
//! command completes before the next touches session state.
//!
//! Nothing a single connection does can stop the acceptor. Transport errors
//! abandon that connection, unmatched routes get the unknown-command
//! answer, and a handler that panics is answered with a plain `500`.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::commands::{route_table, Command};
use crate::handlers::{unknown_command_response, ServerState};
use crate::http::{read_request, HttpRequest, HttpResponse};
use crate::router::Router;
use crate::stream::ConnectionStream;

/// The wire protocol server.
#[derive(Clone)]
pub struct WireServer {
    state: Arc<Mutex<ServerState>>,
    routes: Arc<Router<Command>>,
}

impl WireServer {
    /// Creates a server with the standard route table.
    pub fn new(state: ServerState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            routes: Arc::new(route_table()),
        }
    }

    /// Accepts connections until `shutdown` is cancelled.
    pub async fn run(&self, listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "Accepting connections");
        }
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Acceptor stopping");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };
                    let server = self.clone();
                    let span = info_span!("connection", %peer);
                    tokio::spawn(async move { server.serve(stream).await }.instrument(span));
                }
            }
        }
    }

    /// Serves exactly one request on `stream` and closes it.
    pub async fn serve<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stream = ConnectionStream::new(stream);
        let request = match read_request(&mut stream).await {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Abandoning connection");
                return;
            }
        };
        debug!(method = %request.method, path = %request.path, "Request");

        let response = self.respond(request).await;
        debug!(status = response.status, "Response");
        if let Err(e) = response.write_to(&mut stream).await {
            debug!(error = %e, "Failed to write response");
        }
        let _ = stream.shutdown().await;
    }

    async fn respond(&self, request: HttpRequest) -> HttpResponse {
        let Some(found) = self.routes.resolve(request.method, &request.path) else {
            debug!("No route matched");
            let session_id = self.state.lock().await.session_id();
            return unknown_command_response(&session_id);
        };
        debug!(route = found.pattern.as_str(), "Route matched");
        let command = *found.handler;
        let params = found.params;

        // A separate task so a panicking handler is caught here.
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            let mut state = state.lock().await;
            state.dispatch(command, &request, &params).await
        });
        match task.await {
            Ok(response) => response,
            Err(e) => {
                error!(command = command.name(), error = %e, "Command handler failed");
                HttpResponse::internal_error()
            }
        }
    }
}
