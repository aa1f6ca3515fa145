#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Process entry point: reads configuration, loads TLS material, wires
//! the shared cache and upstream client, and spawns the IMAP and SMTP
//! accept loops. Everything here is outer-shell glue -- the protocol
//! logic lives in `imap` and `smtp`.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use xmit_gateway::cache::CacheManager;
use xmit_gateway::error::Error;
use xmit_gateway::upstream::client::RestUpstream;
use xmit_gateway::upstream::Upstream;
use xmit_gateway::{imap, smtp, tls, GatewayConfig};

#[tokio::main]
async fn main() -> xmit_gateway::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = GatewayConfig::from_env()?;

    let tls_config = if config.tls_enabled() {
        let (Some(cert), Some(key)) = (&config.tls_cert_path, &config.tls_key_path) else {
            return Err(Error::Config(
                "TLS_CERT_PATH and TLS_KEY_PATH are required outside development".to_string(),
            ));
        };
        Some(tls::load_server_config(cert, key)?)
    } else {
        None
    };

    let cache = CacheManager::open(
        &PathBuf::from(&config.cache_dir),
        (config.cache_memory_mb * 1024 * 1024) as usize,
        config.cache_persistent_mb * 1024 * 1024,
    )
    .await?;
    cache.spawn_pruner();

    let upstream: Arc<dyn Upstream> =
        Arc::new(RestUpstream::new(config.api_base.clone(), config.api_timeout));

    info!(
        imap_port = config.imap_port,
        smtp_port = config.smtp_port,
        tls = config.tls_enabled(),
        "Transmit gateway starting"
    );

    let imap_listener = TcpListener::bind(("0.0.0.0", config.imap_port)).await?;
    let smtp_listener = TcpListener::bind(("0.0.0.0", config.smtp_port)).await?;

    let imap_tls = tls_config.clone();
    let imap_upstream = upstream.clone();
    let imap_cache = cache.clone();
    let imap_idle_timeout = config.imap_idle_timeout;
    let imap_task = tokio::spawn(async move {
        run_imap(
            imap_listener,
            imap_upstream,
            imap_cache,
            imap_idle_timeout,
            imap_tls,
        )
        .await;
    });

    let smtp_tls = tls_config.map(|cfg| Arc::new(TlsAcceptor::from(cfg)));
    let smtp_upstream = upstream.clone();
    let smtp_cache = cache.clone();
    let max_message_size = config.max_message_size;
    let smtp_task = tokio::spawn(async move {
        run_smtp(smtp_listener, smtp_upstream, smtp_cache, max_message_size, smtp_tls).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, stopping listeners");
        }
        result = imap_task => {
            if let Err(e) = result {
                error!(error = %e, "IMAP accept loop panicked");
            }
        }
        result = smtp_task => {
            if let Err(e) = result {
                error!(error = %e, "SMTP accept loop panicked");
            }
        }
    }

    Ok(())
}

async fn run_imap(
    listener: TcpListener,
    upstream: Arc<dyn Upstream>,
    cache: Arc<CacheManager>,
    idle_timeout: std::time::Duration,
    tls_config: Option<Arc<rustls::ServerConfig>>,
) {
    let acceptor = tls_config.map(|cfg| TlsAcceptor::from(cfg));
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "IMAP accept failed");
                continue;
            }
        };

        let upstream = upstream.clone();
        let cache = cache.clone();
        let acceptor = acceptor.clone();

        tokio::spawn(async move {
            if let Some(acceptor) = acceptor {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        imap::server::handle_connection(tls_stream, peer, upstream, cache, idle_timeout)
                            .await;
                    }
                    Err(e) => warn!(%peer, error = %e, "IMAP TLS handshake failed"),
                }
            } else {
                imap::server::handle_connection(stream, peer, upstream, cache, idle_timeout).await;
            }
        });
    }
}

async fn run_smtp(
    listener: TcpListener,
    upstream: Arc<dyn Upstream>,
    cache: Arc<CacheManager>,
    max_message_size: u64,
    tls_acceptor: Option<Arc<TlsAcceptor>>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "SMTP accept failed");
                continue;
            }
        };

        let upstream = upstream.clone();
        let cache = cache.clone();
        let tls_acceptor = tls_acceptor.clone();

        tokio::spawn(async move {
            smtp::server::handle_connection(stream, peer, upstream, cache, max_message_size, tls_acceptor)
                .await;
        });
    }
}
