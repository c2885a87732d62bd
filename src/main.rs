//! pull-policy-webhook - Kubernetes mutating admission webhook.
//!
//! This is the main entry point that:
//! - Parses configuration and initializes structured logging
//! - Wires the marker, webhook and metrics recorders
//! - Runs the signal watcher, metrics server and webhook server as one run group

use std::sync::Arc;

use clap::Parser;
use prometheus_client::registry::Registry;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use pull_policy_webhook::health::{self, BuildInfo, MetricsState};
use pull_policy_webhook::metrics::{HttpMetrics, WebhookMetrics};
use pull_policy_webhook::{
    Config, Error, HttpServer, Result, RunGroup, build_webhook_router, lifecycle,
};
use pull_policy_webhook::server::load_tls;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config)?;

    let span = info_span!(
        "app",
        app = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION")
    );
    if let Err(e) = run(config).instrument(span).await {
        error!(error = %e, startup = e.is_startup(), "error running app");
        return Err(e.into());
    }

    info!("webhook stopped");
    Ok(())
}

fn init_tracing(config: &Config) -> Result<()> {
    let level = if config.debug { "debug" } else { "info" };
    let directive: Directive = format!("pull_policy_webhook={}", level)
        .parse()
        .map_err(|e| Error::Subscriber(format!("{}", e)))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive));

    let result = if config.development {
        builder.try_init()
    } else {
        builder.json().try_init()
    };
    result.map_err(|e| Error::Subscriber(e.to_string()))
}

async fn run(config: Config) -> Result<()> {
    config.validate()?;
    let policy = config.pull_policy()?;
    let tls = config.tls()?;

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
    let tls = match tls {
        Some(paths) => Some(load_tls(&paths).await?),
        None => {
            warn!("webhook running without TLS");
            None
        }
    };

    match policy {
        Some(policy) => info!(policy = %policy, "ImagePullPolicy webhook enabled"),
        None => warn!("ImagePullPolicy webhook disabled"),
    }

    // Metrics
    let mut registry = Registry::default();
    let http_metrics = HttpMetrics::new(&mut registry);
    let webhook_metrics = WebhookMetrics::new(&mut registry);

    let webhook_router = build_webhook_router(
        &config.webhook_path,
        policy,
        http_metrics.clone(),
        webhook_metrics,
    );
    let metrics_state = Arc::new(MetricsState {
        registry: Arc::new(registry),
        build: BuildInfo::default(),
        config: serde_json::to_value(&config).unwrap_or_default(),
    });
    let metrics_router = health::create_router(&config.metrics_path, metrics_state, http_metrics);

    let mut group = RunGroup::new();

    // OS signals
    lifecycle::add_signal_handler(&mut group);

    // Metrics HTTP server
    {
        let server = HttpServer::new("metrics", config.metrics_listen_address, metrics_router);
        let interrupt = server.interrupter();
        group.add("metrics-server", server.serve(), move |_| interrupt());
    }

    // Webhook HTTP server
    {
        let server = HttpServer::new("webhooks", config.webhook_listen_address, webhook_router)
            .with_tls(tls);
        let interrupt = server.interrupter();
        group.add("webhook-server", server.serve(), move |_| interrupt());
    }

    group.run().await?;
    Ok(())
}
