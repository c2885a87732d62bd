//! Command-line configuration.
//!
//! Every flag can also be supplied through the environment, which is how the
//! Deployment manifest usually sets them.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::mutation::PullPolicy;

/// Default route the API server posts admission reviews to
pub const DEFAULT_WEBHOOK_PATH: &str = "/wh/mutating/mark";
/// Path of the liveness probe on the metrics listener
pub const HEALTHZ_PATH: &str = "/healthz";
/// Prefix reserved for debug endpoints on the metrics listener
pub const DEBUG_PREFIX: &str = "/debug";

/// Kubernetes admission webhook that enforces container image pull policies
#[derive(Parser, Debug, Clone, Serialize)]
#[command(name = "pull-policy-webhook", version, about, long_about = None)]
pub struct Config {
    /// Enable debug logging
    #[arg(long, env = "WEBHOOK_DEBUG")]
    pub debug: bool,

    /// Enable development mode (human-readable logs instead of JSON)
    #[arg(long, env = "WEBHOOK_DEVELOPMENT")]
    pub development: bool,

    /// Address the webhook HTTPS server listens on
    #[arg(long, env = "WEBHOOK_LISTEN_ADDRESS", default_value = "0.0.0.0:8080")]
    pub webhook_listen_address: SocketAddr,

    /// Address the metrics, health check and debug HTTP server listens on
    #[arg(long, env = "METRICS_LISTEN_ADDRESS", default_value = "0.0.0.0:8081")]
    pub metrics_listen_address: SocketAddr,

    /// Path where Prometheus metrics are served
    #[arg(long, env = "METRICS_PATH", default_value = "/metrics")]
    pub metrics_path: String,

    /// Route the mutating webhook is served on
    #[arg(long, env = "WEBHOOK_PATH", default_value = DEFAULT_WEBHOOK_PATH)]
    pub webhook_path: String,

    /// TLS certificate file (PEM) for the webhook server
    #[arg(long, env = "TLS_CERT_FILE_PATH")]
    pub tls_cert_file_path: Option<PathBuf>,

    /// TLS private key file (PEM) for the webhook server
    #[arg(long, env = "TLS_KEY_FILE_PATH")]
    pub tls_key_file_path: Option<PathBuf>,

    /// Image pull policy enforced on every container; empty disables mutation
    #[arg(
        short = 'p',
        long,
        env = "WEBHOOK_IMAGE_PULL_POLICY",
        default_value = "IfNotPresent"
    )]
    pub webhook_image_pull_policy: String,
}

/// Certificate and key paths for the webhook listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl Config {
    /// Check cross-field constraints clap cannot express
    pub fn validate(&self) -> Result<()> {
        for (flag, path) in [
            ("--metrics-path", &self.metrics_path),
            ("--webhook-path", &self.webhook_path),
        ] {
            check_route(flag, path)?;
        }

        if is_reserved(&self.metrics_path) {
            return Err(Error::Config(format!(
                "--metrics-path {:?} collides with a reserved route",
                self.metrics_path
            )));
        }

        self.tls()?;
        self.pull_policy()?;
        Ok(())
    }

    /// TLS paths, or `None` when the webhook should serve plain HTTP
    pub fn tls(&self) -> Result<Option<TlsPaths>> {
        match (&self.tls_cert_file_path, &self.tls_key_file_path) {
            (Some(cert), Some(key)) => Ok(Some(TlsPaths {
                cert: cert.clone(),
                key: key.clone(),
            })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(Error::Config(
                "--tls-cert-file-path requires --tls-key-file-path".to_string(),
            )),
            (None, Some(_)) => Err(Error::Config(
                "--tls-key-file-path requires --tls-cert-file-path".to_string(),
            )),
        }
    }

    /// Configured pull policy, or `None` when mutation is disabled
    pub fn pull_policy(&self) -> Result<Option<PullPolicy>> {
        let raw = self.webhook_image_pull_policy.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<PullPolicy>()
            .map(Some)
            .map_err(|e| Error::Config(e.to_string()))
    }
}

/// Routes owned by the metrics listener itself
fn is_reserved(path: &str) -> bool {
    path == HEALTHZ_PATH
        || path == DEBUG_PREFIX
        || path
            .strip_prefix(DEBUG_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Reject paths the router would refuse to register.
///
/// Routes are literal: no `{param}` captures, no `:`/`*` segment prefixes.
fn check_route(flag: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(Error::Config(format!(
            "{} must start with '/' (got {:?})",
            flag, path
        )));
    }
    if path.contains(['{', '}']) {
        return Err(Error::Config(format!(
            "{} must not contain '{{' or '}}' (got {:?})",
            flag, path
        )));
    }
    if path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return Err(Error::Config(format!(
            "{} segments must not start with ':' or '*' (got {:?})",
            flag, path
        )));
    }
    Ok(())
}
