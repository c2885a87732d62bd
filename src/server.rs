//! HTTP(S) listener with graceful drain.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tracing::{error, info, warn};

use crate::config::TlsPaths;
use crate::error::{Error, Result};

/// How long in-flight requests get to finish once draining starts
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Load the webhook certificate and key.
///
/// Called before the run group starts so unreadable TLS material is a
/// startup failure rather than a task failure.
pub async fn load_tls(paths: &TlsPaths) -> Result<RustlsConfig> {
    RustlsConfig::from_pem_file(&paths.cert, &paths.key)
        .await
        .map_err(|e| Error::Tls(format!("{}: {}", paths.cert.display(), e)))
}

/// A router bound to an address, drained through its [`Handle`]
pub struct HttpServer {
    name: &'static str,
    addr: SocketAddr,
    router: Router,
    tls: Option<RustlsConfig>,
    handle: Handle,
    grace_period: Duration,
}

impl HttpServer {
    pub fn new(name: &'static str, addr: SocketAddr, router: Router) -> Self {
        Self {
            name,
            addr,
            router,
            tls: None,
            handle: Handle::new(),
            grace_period: SHUTDOWN_GRACE_PERIOD,
        }
    }

    /// Serve HTTPS with a loaded certificate and key
    pub fn with_tls(mut self, tls: Option<RustlsConfig>) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Handle used to stop the server from another task
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Closure that starts a graceful drain, for use as a run group interrupt
    pub fn interrupter(&self) -> impl FnOnce() + Send + 'static {
        let handle = self.handle.clone();
        let name = self.name;
        let addr = self.addr;
        let grace_period = self.grace_period;
        move || {
            info!(http_server = name, addr = %addr, "start draining connections");
            handle.graceful_shutdown(Some(grace_period));
        }
    }

    /// Serve until drained. Returns an error if binding or serving fails.
    pub async fn serve(self) -> Result<()> {
        let HttpServer {
            name,
            addr,
            router,
            tls,
            handle,
            ..
        } = self;
        let app = router.into_make_service_with_connect_info::<SocketAddr>();

        let result = match tls {
            Some(config) => {
                info!(http_server = name, addr = %addr, "https server listening...");
                axum_server::bind_rustls(addr, config)
                    .handle(handle.clone())
                    .serve(app)
                    .await
            }
            None => {
                info!(http_server = name, addr = %addr, "http server listening...");
                axum_server::bind(addr)
                    .handle(handle.clone())
                    .serve(app)
                    .await
            }
        };

        match result {
            Ok(()) => {
                let open = handle.connection_count();
                if open > 0 {
                    warn!(
                        http_server = name,
                        addr = %addr,
                        connections = open,
                        "drain deadline exceeded, forcing close"
                    );
                } else {
                    info!(http_server = name, addr = %addr, "server stopped");
                }
                Ok(())
            }
            Err(e) => {
                error!(http_server = name, addr = %addr, error = %e, "server error");
                Err(Error::Serve(e))
            }
        }
    }
}
