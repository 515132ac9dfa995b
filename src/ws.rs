//! Client front-end (spec.md §6): "Owns the client-facing RPC; calls
//! `Service.ProcessClientRequest(req, handlerPath, body)` and returns the
//! response over the wire." Grounded on the teacher's
//! `http/server.rs` warp wiring: a `warp::path` filter feeding a shared
//! handle, upgraded per-connection, with request/response bytes opaque to
//! the transport itself.
//!
//! The core `Server` (server.rs) only ever drives the tree-protocol
//! transport; this module is the separate, optional collaborator spec.md
//! §6 assigns the client surface to. It is entirely feature-gated since it
//! pulls in `warp`, which the library-only embedding use case has no need
//! for.

#![cfg(feature = "warp")]

use std::net::SocketAddr;
use std::sync::Arc;

use warp::Filter;

use crate::ids::service_id;
use crate::logging::{log, PrintSender};
use crate::service::ServiceManager;

/// `POST /<service name>/<handler path>` with the request body handed
/// straight to `Service::process_client_request`; matches the teacher's
/// own `warp::path::full()` pattern of keeping the path itself opaque
/// below a fixed prefix rather than declaring every route up front.
pub fn routes(
    services: Arc<ServiceManager>,
    print_tx: PrintSender,
) -> impl Filter<Extract = (warp::reply::WithStatus<Vec<u8>>,), Error = warp::Rejection> + Clone {
    warp::path!(String / String)
        .and(warp::post())
        .and(warp::body::bytes())
        .and(warp::any().map(move || services.clone()))
        .and(warp::any().map(move || print_tx.clone()))
        .and_then(handle_request)
}

async fn handle_request(
    service_name: String,
    handler_path: String,
    body: bytes::Bytes,
    services: Arc<ServiceManager>,
    print_tx: PrintSender,
) -> Result<warp::reply::WithStatus<Vec<u8>>, std::convert::Infallible> {
    let Some(service) = services.get(service_id(&service_name)) else {
        return Ok(warp::reply::with_status(Vec::new(), warp::http::StatusCode::NOT_FOUND));
    };

    match service.process_client_request(&handler_path, body.to_vec()) {
        Ok(resp) => Ok(warp::reply::with_status(resp, warp::http::StatusCode::OK)),
        Err(e) => {
            log(&print_tx, 1, format!("ws: client request {service_name}/{handler_path} failed: {e}"));
            Ok(warp::reply::with_status(Vec::new(), warp::http::StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

/// Client front-end handle: binds and serves `routes` until dropped.
/// `Server::start`/`wait_startup` (spec.md §4.9) wait on this reaching
/// listening the same way they wait on the tree-protocol transport, so the
/// caller is expected to await `listening()` after spawning `run`.
pub struct ClientFrontend {
    addr: SocketAddr,
    listening: Arc<tokio::sync::Notify>,
}

impl ClientFrontend {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            listening: Arc::new(tokio::sync::Notify::new()),
        }
    }

    pub async fn listening(&self) {
        self.listening.notified().await;
    }

    /// Runs until the returned future is dropped or aborted; there is no
    /// graceful per-connection drain, matching spec.md §4.9's "stop
    /// WebSocket" step being a best-effort signal rather than a drain.
    pub async fn run(&self, services: Arc<ServiceManager>, print_tx: PrintSender) {
        let (addr, server) = warp::serve(routes(services, print_tx)).bind_ephemeral(self.addr);
        let _ = addr;
        self.listening.notify_waiters();
        server.await;
    }
}
