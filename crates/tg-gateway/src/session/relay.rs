//! Byte relay between a client and one backend host
//!
//! The client leaves block mode for the duration of the relay and is put
//! back into it afterwards, so the menu can be shown again whatever happened
//! on the backend side.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use tg_core::config::RelayConfig;
use tg_core::Host;
use tg_protocol::TerminalProtocol;

use crate::server::ClientTransport;

/// How a relay ended
#[derive(Debug)]
pub enum RelayOutcome {
    /// One side closed its connection
    Closed(Direction),
    /// A read or write failed mid-relay
    Aborted(Direction, io::Error),
    /// The backend could not be reached; no bytes were relayed
    ConnectFailed(io::Error),
}

impl RelayOutcome {
    /// The client is back at the menu without seeing an error
    pub fn is_ok(&self) -> bool {
        !matches!(self, RelayOutcome::ConnectFailed(_))
    }
}

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToHost,
    HostToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToHost => write!(f, "client->host"),
            Direction::HostToClient => write!(f, "host->client"),
        }
    }
}

/// First event that stops a transfer
#[derive(Debug)]
enum Stop {
    Eof(Direction),
    Failed(Direction, io::Error),
}

/// Relay `client` to `host` until either side stops.
///
/// Never closes the client. On return the client has been renegotiated into
/// block mode, or renegotiation was attempted and logged.
pub async fn relay<P, C>(
    protocol: &P,
    config: &RelayConfig,
    client: &mut C,
    host: &Host,
) -> RelayOutcome
where
    P: TerminalProtocol,
    C: ClientTransport,
{
    match timeout(
        config.unnegotiate_timeout.saturating_mul(2),
        protocol.unnegotiate(client, config.unnegotiate_timeout),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Un-negotiation before relay to {} failed: {}", host.name, e),
        Err(_) => tracing::warn!("Un-negotiation before relay to {} timed out", host.name),
    }

    let mut backend = match connect(host, config).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("Failed to connect to {} ({}): {}", host.name, host.target(), e);
            renegotiate(protocol, config, client).await;
            return RelayOutcome::ConnectFailed(e);
        }
    };
    tracing::info!("Relaying to {} ({})", host.name, host.target());

    let stop = transfer(&mut *client, &mut backend, config).await;

    if let Err(e) = backend.shutdown().await {
        tracing::debug!("Backend shutdown for {}: {}", host.name, e);
    }
    drop(backend);

    client.discard_pending();
    sleep(config.settle_delay).await;
    renegotiate(protocol, config, client).await;

    match stop {
        Some(Stop::Eof(direction)) => {
            tracing::info!("Relay to {} closed ({})", host.name, direction);
            RelayOutcome::Closed(direction)
        }
        Some(Stop::Failed(direction, e)) => {
            tracing::warn!("Relay to {} aborted ({}): {}", host.name, direction, e);
            RelayOutcome::Aborted(direction, e)
        }
        None => {
            tracing::warn!("Relay to {} ended without a reported stop", host.name);
            RelayOutcome::Closed(Direction::HostToClient)
        }
    }
}

async fn connect(host: &Host, config: &RelayConfig) -> io::Result<TcpStream> {
    match timeout(config.connect_timeout, TcpStream::connect(host.target())).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connection timed out after {:?}", config.connect_timeout),
        )),
    }
}

/// Run both directions until one stops, then wait for the other to notice
async fn transfer<C>(client: &mut C, backend: &mut TcpStream, config: &RelayConfig) -> Option<Stop>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let cancel = CancellationToken::new();
    let (stop_tx, mut stop_rx) = mpsc::channel(2);

    let (client_read, client_write) = tokio::io::split(client);
    let (backend_read, backend_write) = backend.split();

    let upstream = pump(
        Direction::ClientToHost,
        client_read,
        backend_write,
        config,
        cancel.clone(),
        stop_tx.clone(),
    );
    let downstream = pump(
        Direction::HostToClient,
        backend_read,
        client_write,
        config,
        cancel.clone(),
        stop_tx,
    );
    let first_stop = async {
        let stop = stop_rx.recv().await;
        cancel.cancel();
        stop
    };

    let (_, _, stop) = tokio::join!(upstream, downstream, first_stop);
    stop
}

/// Copy one direction until EOF, an error, or cancellation.
///
/// Reads are bounded by the poll interval so cancellation is seen promptly;
/// a read timeout just loops.
async fn pump<R, W>(
    direction: Direction,
    mut reader: R,
    mut writer: W,
    config: &RelayConfig,
    cancel: CancellationToken,
    stops: mpsc::Sender<Stop>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; config.buffer_size];
    let mut total = 0u64;

    let stop = loop {
        if cancel.is_cancelled() {
            tracing::trace!("{} cancelled after {} bytes", direction, total);
            return;
        }

        let n = match timeout(config.poll_interval, reader.read(&mut buf)).await {
            Err(_) => continue,
            Ok(Ok(0)) => break Stop::Eof(direction),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => break Stop::Failed(direction, e),
        };

        let written = timeout(config.write_timeout, async {
            writer.write_all(&buf[..n]).await?;
            writer.flush().await
        })
        .await;
        match written {
            Ok(Ok(())) => total += n as u64,
            Ok(Err(e)) => break Stop::Failed(direction, e),
            Err(_) => {
                break Stop::Failed(
                    direction,
                    io::Error::new(io::ErrorKind::TimedOut, "write timed out"),
                )
            }
        }
    };

    tracing::debug!("{} stopped after {} bytes: {:?}", direction, total, stop);
    let _ = stops.try_send(stop);
    cancel.cancel();
}

/// Put the client back into block mode, retrying a bounded number of times
async fn renegotiate<P, C>(protocol: &P, config: &RelayConfig, client: &mut C)
where
    P: TerminalProtocol,
    C: ClientTransport,
{
    let attempts = config.renegotiate_attempts.max(1);
    for attempt in 1..=attempts {
        match timeout(config.renegotiate_timeout, protocol.negotiate(client)).await {
            Ok(Ok(())) => {
                if attempt > 1 {
                    tracing::info!("Renegotiated client on attempt {}", attempt);
                }
                return;
            }
            Ok(Err(e)) => tracing::warn!("Renegotiation attempt {}/{} failed: {}", attempt, attempts, e),
            Err(_) => tracing::warn!("Renegotiation attempt {}/{} timed out", attempt, attempts),
        }
        if attempt < attempts {
            sleep(config.renegotiate_backoff).await;
        }
    }
    tracing::error!("Failed to renegotiate client after {} attempts; returning to menu anyway", attempts);
}
