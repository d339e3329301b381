//! Supervised listeners
//!
//! Each endpoint keeps accepting for the life of the process. An accept
//! cycle binds the socket and hands every connection to its own session
//! task; when a cycle fails the supervisor restarts it according to a
//! [`RestartPolicy`].

use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tokio_rustls::TlsAcceptor;

use tg_core::config::MAX_TIMEOUT;
use tg_core::ListenerEndpoint;
use tg_protocol::TerminalProtocol;

use crate::server::stream::ClientStream;
use crate::server::tls::{self, TlsError};
use crate::session::Session;
use crate::state::GatewayState;

/// Why an accept cycle ended
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Delays between accept cycles
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// A cycle that ran this long before failing is restarted at once
    pub healthy_after: Duration,
    /// Delay after a cycle that failed sooner
    pub failure_delay: Duration,
    /// Delay after a cycle that returned without an error
    pub stopped_delay: Duration,
    /// Longest single wait on accept before the loop comes round again
    pub accept_slice: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            healthy_after: Duration::from_secs(5 * 60),
            failure_delay: Duration::from_secs(30),
            stopped_delay: Duration::from_secs(10),
            accept_slice: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    /// Delay before the next cycle, given how the last one ended
    pub fn delay_after<E>(&self, result: &Result<(), E>, ran_for: Duration) -> Duration {
        match result {
            Ok(()) => self.stopped_delay,
            Err(_) if ran_for >= self.healthy_after => Duration::ZERO,
            Err(_) => self.failure_delay,
        }
    }
}

/// Run `cycle` forever, restarting it per `policy`
pub async fn supervise<F, Fut, E>(name: &str, policy: &RestartPolicy, mut cycle: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    loop {
        let started = Instant::now();
        let result = cycle().await;
        let ran_for = started.elapsed();
        let delay = policy.delay_after(&result, ran_for);

        match &result {
            Err(e) if delay.is_zero() => {
                tracing::warn!("{} failed after {:?} healthy: {}; restarting", name, ran_for, e)
            }
            Err(e) => tracing::error!("{} failed: {}; restarting in {:?}", name, e, delay),
            Ok(()) => tracing::warn!("{} stopped; restarting in {:?}", name, delay),
        }

        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

/// Accepts clients on one endpoint and runs a session for each
pub struct Listener<P> {
    endpoint: ListenerEndpoint,
    state: Arc<GatewayState<P>>,
    policy: RestartPolicy,
}

impl<P> Listener<P>
where
    P: TerminalProtocol + 'static,
{
    pub fn new(endpoint: ListenerEndpoint, state: Arc<GatewayState<P>>) -> Self {
        Self {
            endpoint,
            state,
            policy: RestartPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Supervise the endpoint.
    ///
    /// Returns only if an encrypted endpoint's certificate material cannot be
    /// loaded at startup; otherwise runs for the life of the process.
    pub async fn run(self) {
        if let Some(material) = &self.endpoint.tls {
            if let Err(e) = tls::build_acceptor(material) {
                tracing::error!("Not starting {}: {}", self.endpoint, e);
                return;
            }
            if let Some(raised) = tls::raised_minimum(material) {
                tracing::warn!(
                    "{} is not supported on {}; using {} as the minimum",
                    material.min_version,
                    self.endpoint,
                    raised
                );
            }
        }

        let name = self.endpoint.to_string();
        supervise(&name, &self.policy, || self.accept_cycle()).await
    }

    async fn accept_cycle(&self) -> Result<(), ListenerError> {
        let acceptor = match &self.endpoint.tls {
            Some(material) => Some(tls::build_acceptor(material)?),
            None => None,
        };

        let address = self.endpoint.bind_target();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ListenerError::Bind {
                address: address.clone(),
                source,
            })?;
        tracing::info!("{} accepting", self.endpoint);

        loop {
            match timeout(self.policy.accept_slice, listener.accept()).await {
                Err(_) => tracing::trace!("{} idle", self.endpoint),
                Ok(Ok((socket, peer))) => self.spawn_session(socket, peer, acceptor.clone()),
                Ok(Err(e)) => return Err(ListenerError::Accept(e)),
            }
        }
    }

    fn spawn_session(&self, socket: TcpStream, peer: SocketAddr, acceptor: Option<TlsAcceptor>) {
        tracing::info!("New connection from {} on {}", peer, self.endpoint);

        let state = Arc::clone(&self.state);
        let handshake_timeout = self.endpoint.handshake_timeout;

        tokio::spawn(async move {
            let now = Instant::now();
            let deadline = now.checked_add(handshake_timeout).unwrap_or(now + MAX_TIMEOUT);

            let stream = match acceptor {
                None => ClientStream::Plain(socket),
                Some(acceptor) => match timeout_at(deadline, acceptor.accept(socket)).await {
                    Ok(Ok(stream)) => ClientStream::Tls(Box::new(stream)),
                    Ok(Err(e)) => {
                        tracing::warn!("TLS handshake with {} failed: {}", peer, e);
                        return;
                    }
                    Err(_) => {
                        tracing::warn!("TLS handshake with {} timed out", peer);
                        return;
                    }
                },
            };

            Session::new(&state, stream, peer).run(deadline).await;
            tracing::debug!("Connection from {} closed", peer);
        });
    }
}
