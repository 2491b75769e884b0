//! # wirehost-core
//!
//! Core library for an embedded JSON wire protocol automation server.
//!
//! The server accepts wire protocol commands over raw HTTP/1.x, one request
//! per connection, and drives a scriptable rendering surface that may only
//! be touched from the thread that owns it.
//!
//! ## Modules
//!
//! - [`stream`] - Line and byte reads over an accepted connection
//! - [`http`] - Request parsing and response serialization
//! - [`router`] - Method and path-pattern route table
//! - [`commands`] - Wire protocol commands and their routes
//! - [`handlers`] - Session state and command dispatch
//! - [`server`] - TCP connection acceptor
//! - [`protocol`] - Response envelope, status codes, fixed documents
//! - [`driver`] - The [`Surface`](driver::Surface) trait
//! - [`bridge`] - Runs work on the surface-owner thread
//! - [`executor`] - Retrying script evaluation and surface calls
//! - [`atoms`] - Predefined scripts run inside the surface
//! - [`element`] - Element and frame reference tables
//! - [`session`] - The single session
//! - [`config`] - Startup configuration and address advertisement
//!
//! ## Example
//!
//! ```no_run
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//! use wirehost_core::bridge::OwnerBridge;
//! use wirehost_core::driver::Surface;
//! use wirehost_core::executor::SurfaceExecutor;
//! use wirehost_core::handlers::ServerState;
//! use wirehost_core::server::WireServer;
//!
//! fn serve<S: Surface + 'static>(make_surface: fn() -> S) {
//!     let runtime = tokio::runtime::Builder::new_current_thread()
//!         .enable_all()
//!         .build()
//!         .unwrap();
//!     runtime.block_on(async {
//!         let (bridge, _owner) = OwnerBridge::spawn(make_surface).unwrap();
//!         let state = ServerState::new(SurfaceExecutor::new(bridge));
//!         let listener = TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!         WireServer::new(state)
//!             .run(listener, CancellationToken::new())
//!             .await
//!             .unwrap();
//!     });
//! }
//! ```

pub mod atoms;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod driver;
pub mod element;
pub mod executor;
pub mod handlers;
pub mod http;
pub mod protocol;
pub mod router;
pub mod server;
pub mod session;
pub mod stream;
