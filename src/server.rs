//! HTTP server and graceful shutdown.
//!
//! The server owns everything below the callback: accepting connections,
//! speaking HTTP/1.1 and HTTP/2 through hyper, buffering request bodies,
//! and draining in-flight work on shutdown.
//!
//! Callbacks are synchronous, so each one runs on tokio's blocking pool.
//! Every request gets its own thread of execution and a callback that
//! blocks (a database driver, a file read) never stalls the accept loop.
//!
//! # Graceful shutdown
//!
//! On the shutdown signal (SIGTERM or Ctrl-C for [`Server::serve`]) the
//! server:
//! 1. stops accepting new connections;
//! 2. tells every open connection to finish its current request and close;
//! 3. returns once all of them are gone.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use http::StatusCode;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::logging::TARGET;
use crate::response::{self, HttpResponse};
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use onion::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    /// Serves `router` until SIGTERM or Ctrl-C, then drains.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Serves `router` until `signal` resolves, then drains.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        Self::serve_listener(listener, router, signal).await
    }

    /// Serves `router` on an already bound listener until `signal` resolves.
    ///
    /// Useful with port `0`: bind first, read `local_addr`, then serve.
    pub async fn serve_listener(
        listener: TcpListener,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let addr = listener.local_addr()?;
        let router = Arc::new(router);

        info!(target: TARGET, %addr, "onion listening");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting at once,
                // even with connections still queued.
                biased;

                () = &mut signal => {
                    info!(target: TARGET, in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!(target: TARGET, "accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let mut stop_rx = stop_rx.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| dispatch(Arc::clone(&router), req));

                        let builder = ConnBuilder::new(TokioExecutor::new());
                        let conn = builder.serve_connection(io, svc);
                        tokio::pin!(conn);

                        let mut stopping = false;
                        loop {
                            tokio::select! {
                                res = conn.as_mut() => {
                                    if let Err(e) = res {
                                        error!(target: TARGET, peer = %remote_addr, "connection error: {e}");
                                    }
                                    break;
                                }
                                _ = stop_rx.changed(), if !stopping => {
                                    stopping = true;
                                    conn.as_mut().graceful_shutdown();
                                }
                            }
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        let _ = stop_tx.send(true);
        while tasks.join_next().await.is_some() {}

        info!(target: TARGET, "onion stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers one request body, runs the router on the blocking pool, and
/// hands the response back to hyper. Never fails: problems become status
/// codes.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
) -> Result<HttpResponse, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(target: TARGET, method = %parts.method, path = parts.uri.path(), "failed to read request body: {e}");
            return Ok(response::text(StatusCode::BAD_REQUEST, "400 Bad Request"));
        }
    };

    let req = http::Request::from_parts(parts, body);
    let response = match tokio::task::spawn_blocking(move || router.handle(req)).await {
        Ok(response) => response,
        Err(e) => {
            error!(target: TARGET, "callback did not complete: {e}");
            response::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    };

    Ok(response)
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C only, off Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(target: TARGET, "failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(target: TARGET, "failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
