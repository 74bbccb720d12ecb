//! The listener: owns the listen socket, drives the per-connection HTTP
//! servers, and notifies readiness once accepting. Manual accept loops are
//! used for both transports rather than `hyper::Server::bind`, since a plain
//! `hyper::Server` cannot be bound to a Unix socket.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Request, Response};
use tokio::net::{TcpListener, UnixListener};

use crate::config::HookConfiguration;
use crate::endpoint::Endpoint;
use crate::error::ListenError;
use crate::handler;
use crate::proxy::UpstreamProxy;
use crate::route::RouteTable;

/// Called exactly once, right after the listen socket starts accepting
/// connections. The concrete implementation (e.g. a systemd `sd_notify`
/// call) is an external collaborator; a no-op implementation is a valid one.
#[async_trait]
pub trait ReadinessNotifier: Send + Sync {
    async fn notify_ready(&self);
}

/// The readiness notifier used when nothing else is wired up.
pub struct NoopReadiness;

#[async_trait]
impl ReadinessNotifier for NoopReadiness {
    async fn notify_ready(&self) {}
}

/// The fully-built, ready-to-serve proxy: a route table, an upstream proxy,
/// and the listen address to bind.
pub struct Listener {
    listen_address: String,
    timeout: std::time::Duration,
    routes: Arc<RouteTable>,
    upstream: Arc<UpstreamProxy>,
}

impl Listener {
    /// Build a listener from a fully-materialized configuration record. The
    /// core never loads configuration itself; this is the seam where
    /// `hookproxy-config`'s output is handed in.
    pub fn from_config(config: &HookConfiguration) -> Self {
        Self {
            listen_address: config.listen_address.clone(),
            timeout: config.timeout(),
            routes: Arc::new(RouteTable::from_config(config)),
            upstream: Arc::new(UpstreamProxy::new(&config.remote_endpoint)),
        }
    }

    /// Bind and serve until `stop` resolves. New connections stop being
    /// accepted once `stop` fires; already-accepted connections are allowed
    /// to finish on their own task.
    pub async fn serve(
        self,
        stop: impl Future<Output = ()> + Send + 'static,
        readiness: Arc<dyn ReadinessNotifier>,
    ) -> Result<(), ListenError> {
        let endpoint = Endpoint::parse(&self.listen_address)?;
        if endpoint.is_unix() {
            if endpoint.addr.starts_with('@') {
                return Err(ListenError::AbstractUnixUnsupported);
            }
            self.serve_unix(&endpoint.addr, stop, readiness).await
        } else {
            self.serve_tcp(&endpoint.addr, stop, readiness).await
        }
    }

    async fn serve_unix(
        &self,
        path: &str,
        stop: impl Future<Output = ()> + Send + 'static,
        readiness: Arc<dyn ReadinessNotifier>,
    ) -> Result<(), ListenError> {
        if Path::new(path).exists() {
            std::fs::remove_file(path).map_err(ListenError::BindFailure)?;
        }
        let listener = UnixListener::bind(path).map_err(ListenError::BindFailure)?;
        tracing::info!(path, "listening on unix socket");
        readiness.notify_ready().await;

        let routes = self.routes.clone();
        let upstream = self.upstream.clone();
        let timeout = self.timeout;
        let mut stop = Box::pin(stop);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    tracing::info!("stop signal received, no longer accepting connections");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, _) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to accept unix connection");
                            continue;
                        }
                    };
                    spawn_connection(stream, routes.clone(), upstream.clone(), timeout);
                }
            }
        }
    }

    async fn serve_tcp(
        &self,
        addr: &str,
        stop: impl Future<Output = ()> + Send + 'static,
        readiness: Arc<dyn ReadinessNotifier>,
    ) -> Result<(), ListenError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(ListenError::BindFailure)?;
        tracing::info!(addr, "listening on tcp socket");
        readiness.notify_ready().await;

        let routes = self.routes.clone();
        let upstream = self.upstream.clone();
        let timeout = self.timeout;
        let mut stop = Box::pin(stop);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    tracing::info!("stop signal received, no longer accepting connections");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, _) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to accept tcp connection");
                            continue;
                        }
                    };
                    spawn_connection(stream, routes.clone(), upstream.clone(), timeout);
                }
            }
        }
    }
}

fn spawn_connection<S>(
    stream: S,
    routes: Arc<RouteTable>,
    upstream: Arc<UpstreamProxy>,
    timeout: std::time::Duration,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    tokio::task::spawn(async move {
        let service = service_fn(move |req: Request<Body>| {
            let routes = routes.clone();
            let upstream = upstream.clone();
            async move { Ok::<_, std::convert::Infallible>(dispatch(&routes, &upstream, timeout, req).await) }
        });
        if let Err(err) = Http::new().http1_keep_alive(true).serve_connection(stream, service).await {
            tracing::debug!(error = %err, "error serving connection");
        }
    });
}

async fn dispatch(
    routes: &RouteTable,
    upstream: &UpstreamProxy,
    timeout: std::time::Duration,
    req: Request<Body>,
) -> Response<Body> {
    let method = req.method().to_string();
    let path = req.uri().path().to_owned();

    match routes.find(&method, &path) {
        Some(route) => handler::handle(route, upstream, timeout, req).await,
        None => upstream.forward(req).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "upstream request failed");
            Response::builder()
                .status(hyper::StatusCode::BAD_GATEWAY)
                .body(Body::from(e.to_string()))
                .expect("error response should be valid")
        }),
    }
}
