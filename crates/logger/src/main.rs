//! coriolis-logger - syslog ingestion and distribution service
//!
//! # Usage
//!
//! ```bash
//! coriolis-logger --config /etc/coriolis-logger/coriolis-logger.toml
//! ```
//!
//! Receives syslog over the configured transport, fans records out to the
//! time-series datastore, the live WebSocket hub and (optionally) stdout,
//! and serves the stored-log API. SIGINT/SIGTERM trigger a graceful
//! drain.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use coriolis_api::auth::{Authenticator, KeystoneAuthenticator};
use coriolis_api::AppState;
use coriolis_config::{
    AuthMiddleware, Config, DatastoreKind, InfluxDbConfig, DEFAULT_CONFIG_FILE,
};
use coriolis_datastore::{DataStore, InfluxDbStore};
use coriolis_hub::Hub;
use coriolis_syslog::{ListenerKind, LogFormat, SyslogServer, SyslogServerConfig};
use coriolis_writers::{AggregateWriter, LogWriter, StdoutWriter};

/// Syslog ingestion and distribution service
#[derive(Parser, Debug)]
#[command(name = "coriolis-logger")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("reading config {:?}", cli.config))?;

    if let Err(e) = run(config).await {
        error!(error = %e, "server error");
        return Err(e);
    }
    info!("shutdown complete");
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();

    // Datastore first: an unreachable backend aborts startup.
    let store = build_datastore(&config).await?;
    let store_task = store.start(cancel.clone());

    let (hub, hub_task) = Hub::spawn(cancel.clone());

    // Fan-out: datastore + hub, plus stdout echo when asked for.
    let mut sinks: Vec<Arc<dyn LogWriter>> = vec![Arc::new(store.clone()), Arc::new(hub.clone())];
    if config.syslog.log_to_stdout {
        sinks.push(Arc::new(StdoutWriter::new()));
    }
    let writer = Arc::new(AggregateWriter::new(sinks));

    let syslog_cfg = SyslogServerConfig {
        listener: map_listener(config.syslog.listener),
        address: config.syslog.address.clone(),
        format: map_format(config.syslog.format),
    };
    let syslog = SyslogServer::new(syslog_cfg, writer);
    let ingest_cancel = cancel.clone();
    let ingest_task = tokio::spawn(async move { syslog.run(ingest_cancel).await });

    let authenticator = build_authenticator(&config)?;
    let state = AppState::new(
        hub,
        Arc::new(store.clone()) as Arc<dyn DataStore>,
        authenticator,
        config.api_server.cors_origins.clone(),
    );
    let router = coriolis_api::build_router(state);
    let api_cfg = config.api_server.clone();
    let api_cancel = cancel.clone();
    let api_task =
        tokio::spawn(async move { coriolis_api::serve(&api_cfg, router, api_cancel).await });

    info!("coriolis-logger running");
    wait_for_shutdown().await;
    info!("shutting down gracefully");
    cancel.cancel();

    // Ingestion drains first so everything received makes it to the
    // sinks, then the hub and the datastore flush loop wind down.
    match ingest_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "syslog worker failed"),
        Err(e) => error!(error = %e, "syslog worker panicked"),
    }
    if tokio::time::timeout(coriolis_hub::DRAIN_TIMEOUT, hub_task)
        .await
        .is_err()
    {
        warn!("timed out waiting for hub stop");
    }
    if let Err(e) = store_task.await {
        error!(error = %e, "datastore flush loop panicked");
    }
    match api_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "api server failed"),
        Err(e) => error!(error = %e, "api server panicked"),
    }

    Ok(())
}

/// Only the InfluxDB datastore is queryable; `stdout` is a sink, not a
/// store, and is rejected here exactly like the original factory does.
async fn build_datastore(config: &Config) -> Result<InfluxDbStore> {
    match config.syslog.datastore {
        DatastoreKind::InfluxDb => {
            let Some(influx) = &config.syslog.influxdb else {
                bail!("invalid influxdb datastore config");
            };
            InfluxDbStore::connect(map_influx(influx))
                .await
                .context("connecting to influxdb")
        }
        DatastoreKind::Stdout => bail!("invalid datastore type"),
    }
}

fn build_authenticator(config: &Config) -> Result<Option<Arc<dyn Authenticator>>> {
    match config.api_server.auth_middleware {
        AuthMiddleware::Keystone => {
            let Some(keystone) = &config.api_server.keystone_auth else {
                bail!("keystone authentication enabled, but missing keystone config section");
            };
            Ok(Some(Arc::new(KeystoneAuthenticator::new(
                &keystone.auth_uri,
            ))))
        }
        AuthMiddleware::None => Ok(None),
    }
}

fn map_listener(kind: coriolis_config::ListenerKind) -> ListenerKind {
    match kind {
        coriolis_config::ListenerKind::Unixgram => ListenerKind::Unixgram,
        coriolis_config::ListenerKind::Tcp => ListenerKind::Tcp,
        coriolis_config::ListenerKind::Udp => ListenerKind::Udp,
    }
}

fn map_format(format: coriolis_config::LogFormat) -> LogFormat {
    match format {
        coriolis_config::LogFormat::Automatic => LogFormat::Automatic,
        coriolis_config::LogFormat::Rfc3164 => LogFormat::Rfc3164,
        coriolis_config::LogFormat::Rfc5424 => LogFormat::Rfc5424,
        coriolis_config::LogFormat::Rfc6587 => LogFormat::Rfc6587,
    }
}

fn map_influx(cfg: &InfluxDbConfig) -> coriolis_datastore::InfluxDbConfig {
    coriolis_datastore::InfluxDbConfig {
        url: cfg.url.clone(),
        username: cfg.username.clone(),
        password: cfg.password.clone(),
        database: cfg.database.clone(),
        verify_server: cfg.verify_server,
        ca_cert: cfg.ca_cert.clone(),
        client_crt: cfg.client_crt.clone(),
        client_key: cfg.client_key.clone(),
        write_interval: cfg.write_interval,
        log_retention_period: cfg.log_retention_period,
    }
}

/// Block until SIGINT or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
