use std::{future::Future, net::SocketAddr, path::PathBuf, sync::Arc};

use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{info, warn};

use crate::{
    error::ServerError,
    events::EventLog,
    registry::Registry,
    session, wire,
};

/// Runtime knobs for the relay, filled in from the CLI.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Above this many active sessions, new connections are told the server
    /// is full and closed instead of being registered.
    pub max_clients: usize,
    /// Audit log destination; `None` disables persistence.
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: 1000,
            log_file: None,
        }
    }
}

pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
    events: EventLog,
    max_clients: usize,
}

impl Server {
    /// Binds the listening socket. This is the only fatal failure point;
    /// everything after it is handled per-connection.
    pub async fn bind(addr: SocketAddr, config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self::new(listener, config))
    }

    pub fn new(listener: TcpListener, config: ServerConfig) -> Self {
        Self {
            listener,
            registry: Arc::new(Registry::new()),
            events: EventLog::spawn(config.log_file),
            max_clients: config.max_clients,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared view of current membership, used by tests to observe
    /// registration without any wire-level acknowledgement.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accepts connections until `shutdown` resolves. Individual accept
    /// failures are logged and the loop keeps going; only the shutdown
    /// signal ends it.
    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            registry,
            events,
            max_clients,
        } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => {
                    handle_accept_result(accepted, &registry, &events, max_clients).await;
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

async fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<Registry>,
    events: &EventLog,
    max_clients: usize,
) {
    match result {
        Ok((stream, peer)) => {
            if registry.len().await >= max_clients {
                reject_when_full(stream, peer);
            } else {
                spawn_session(stream, peer, registry, events);
            }
        }
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

/// The capacity check happens before the handshake, so a connection over the
/// cap is acknowledged and closed rather than silently dropped.
fn reject_when_full(mut stream: TcpStream, peer: SocketAddr) {
    warn!(%peer, "server full, refusing connection");
    tokio::spawn(async move {
        let _ = wire::send_line(&mut stream, "server full, try again later").await;
    });
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, registry: &Arc<Registry>, events: &EventLog) {
    let registry = Arc::clone(registry);
    let events = events.clone();
    tokio::spawn(async move {
        match session::run(stream, registry, events).await {
            Ok(()) => {}
            Err(err) if err.is_disconnect() => {
                info!(%peer, "peer disconnected abruptly");
            }
            Err(err) => {
                warn!(%peer, error = %err, "session closed with error");
            }
        }
    });
}
