use std::{sync::Arc, time::Duration};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    select,
    sync::mpsc,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    broadcast,
    error::SessionError,
    events::{Event, EventLog},
    registry::{ClientId, Registry},
    wire::{self, LineReader, LOGOUT_SENTINEL, MAX_LINE_BYTES},
};

/// Per-participant send buffer depth. A peer that falls this many lines
/// behind is disconnected by the broadcaster instead of stalling it.
pub const OUTBOUND_QUEUE_DEPTH: usize = 32;

/// Upper bound on any single socket write, so a wedged peer cannot pin a
/// session forever.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives one connection through its whole lifecycle:
/// `Connecting → Registering → Active → Closing → Closed`.
///
/// Registration reads exactly one line (the display name) before any chat
/// traffic is processed. Once active, the session multiplexes inbound lines
/// from the peer with queued broadcast deliveries to it; end-of-stream, an
/// I/O error, a protocol violation, or the logout sentinel all move it to
/// closing, where the registry entry and the connection are torn down.
pub async fn run(
    stream: TcpStream,
    registry: Arc<Registry>,
    events: EventLog,
) -> Result<(), SessionError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = LineReader::new(BufReader::new(reader), MAX_LINE_BYTES);

    // A rejected registration leaves no registry entry behind and records
    // no join event.
    let name = register(&mut reader, &mut writer).await?;

    let id = registry.next_id();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    registry.add(id, name.clone(), outbound_tx).await;

    info!(client = id, %name, "client joined");
    events.record(Event::Joined { name: name.clone() });

    let result = run_active(&registry, &events, id, &name, &mut reader, &mut writer, outbound_rx).await;

    // Closing: remove before announcing, so no broadcast snapshot taken
    // after this point can still reach the departing client.
    registry.remove(id).await;
    info!(client = id, %name, "client left");
    events.record(Event::Left { name });

    if let Err(error) = writer.shutdown().await {
        debug!(client = id, ?error, "socket already gone during shutdown");
    }

    result
}

async fn register<R, W>(reader: &mut LineReader<R>, writer: &mut W) -> Result<String, SessionError>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let line = match reader.next_line().await? {
        Some(line) => line,
        None => {
            return Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before registration",
            )))
        }
    };

    match wire::validate_name(&line) {
        Ok(name) => Ok(name),
        Err(reason) => {
            // Best-effort notice; the peer may already be gone.
            let _ = wire::send_line(writer, reason).await;
            Err(SessionError::NameRejected { reason })
        }
    }
}

async fn run_active<R, W>(
    registry: &Registry,
    events: &EventLog,
    id: ClientId,
    name: &str,
    reader: &mut LineReader<R>,
    writer: &mut W,
    mut outbound_rx: mpsc::Receiver<String>,
) -> Result<(), SessionError>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        select! {
            inbound = reader.next_line() => {
                match inbound? {
                    Some(line) if line == LOGOUT_SENTINEL => {
                        debug!(client = id, "logout requested");
                        return Ok(());
                    }
                    Some(line) => {
                        if line.is_empty() {
                            continue;
                        }
                        events.record(Event::Message {
                            name: name.to_string(),
                            text: line.clone(),
                        });
                        broadcast::deliver(registry, id, &line).await;
                    }
                    None => {
                        debug!(client = id, "peer disconnected");
                        return Ok(());
                    }
                }
            }
            queued = outbound_rx.recv() => {
                match queued {
                    Some(text) => deliver_to_peer(writer, id, &text).await?,
                    // Our registry entry was dropped (slow-peer disconnect);
                    // nothing more will ever arrive.
                    None => {
                        debug!(client = id, "outbound queue closed, disconnecting");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn deliver_to_peer<W>(writer: &mut W, id: ClientId, text: &str) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    match timeout(WRITE_TIMEOUT, wire::send_line(writer, text)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            debug!(client = id, ?err, "write to peer failed");
            Err(SessionError::Io(err))
        }
        Err(_elapsed) => {
            warn!(client = id, "write to peer timed out");
            Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "peer write timed out",
            )))
        }
    }
}
