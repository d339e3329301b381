//! Shared fixtures for gateway integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use tg_core::config::{GatewayConfig, RelayConfig};
use tg_core::{Host, HostCatalog};
use tg_gateway::auth::{Credential, CredentialStore};
use tg_gateway::GatewayState;
use tg_protocol::telnet::OPT_EOR;
use tg_protocol::{Aid, ProtocolError, ScreenRequest, ScreenResponse, TerminalProtocol};

/// Base port for test servers - each test gets a unique offset
static PORT_COUNTER: AtomicU16 = AtomicU16::new(0);

/// Get a unique port for this test
pub fn get_test_port() -> u16 {
    let offset = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    39300 + offset
}

/// What a screen looked like when it was presented
#[derive(Debug, Clone)]
pub struct Presented {
    /// Static text of every field, in screen order
    pub text: Vec<String>,
    pub values: HashMap<String, String>,
}

impl Presented {
    pub fn contains(&self, needle: &str) -> bool {
        self.text.iter().any(|t| t.contains(needle))
    }
}

/// Terminal protocol that answers screens from a script and touches no bytes
#[derive(Default)]
pub struct ScriptedProtocol {
    replies: Mutex<VecDeque<ScreenResponse>>,
    presented: Mutex<Vec<Presented>>,
    negotiations: AtomicUsize,
    unnegotiations: AtomicUsize,
    /// Negotiations allowed to succeed before the terminal starts refusing
    negotiate_limit: Option<usize>,
    refuse_unnegotiate: bool,
}

impl ScriptedProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply to the next screen
    pub fn reply(self, aid: Aid, values: &[(&str, &str)]) -> Self {
        let values = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.replies
            .lock()
            .unwrap()
            .push_back(ScreenResponse { aid, values });
        self
    }

    /// Refuse every negotiation after the first `successes`
    pub fn refuse_negotiation_after(mut self, successes: usize) -> Self {
        self.negotiate_limit = Some(successes);
        self
    }

    /// Refuse every un-negotiation
    pub fn refuse_unnegotiation(mut self) -> Self {
        self.refuse_unnegotiate = true;
        self
    }

    pub fn presented(&self) -> Vec<Presented> {
        self.presented.lock().unwrap().clone()
    }

    pub fn negotiations(&self) -> usize {
        self.negotiations.load(Ordering::SeqCst)
    }

    pub fn unnegotiations(&self) -> usize {
        self.unnegotiations.load(Ordering::SeqCst)
    }

    pub fn replies_left(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl TerminalProtocol for ScriptedProtocol {
    async fn negotiate<S>(&self, _conn: &mut S) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let count = self.negotiations.fetch_add(1, Ordering::SeqCst) + 1;
        match self.negotiate_limit {
            Some(limit) if count > limit => Err(ProtocolError::OptionRefused(OPT_EOR)),
            _ => Ok(()),
        }
    }

    async fn unnegotiate<S>(&self, _conn: &mut S, _timeout: Duration) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.unnegotiations.fetch_add(1, Ordering::SeqCst);
        if self.refuse_unnegotiate {
            return Err(ProtocolError::ConnectionClosed);
        }
        Ok(())
    }

    async fn present_screen<S>(
        &self,
        _conn: &mut S,
        request: ScreenRequest<'_>,
    ) -> Result<ScreenResponse, ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.presented.lock().unwrap().push(Presented {
            text: request.screen.iter().map(|f| f.content.clone()).collect(),
            values: request.values.clone(),
        });
        let reply = self.replies.lock().unwrap().pop_front();
        reply.ok_or(ProtocolError::ConnectionClosed)
    }
}

/// Relay timings short enough for tests
pub fn fast_relay_config() -> RelayConfig {
    RelayConfig {
        poll_interval: Duration::from_millis(50),
        settle_delay: Duration::from_millis(10),
        connect_timeout: Duration::from_secs(2),
        renegotiate_backoff: Duration::from_millis(10),
        ..RelayConfig::default()
    }
}

pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.relay = fast_relay_config();
    config
}

pub fn credential(username: &str, password: &str, catalog_ref: Option<PathBuf>) -> Credential {
    Credential {
        username: username.to_string(),
        password: password.to_string(),
        catalog_ref,
    }
}

pub fn default_catalog() -> HostCatalog {
    HostCatalog::new(vec![
        Host::new("PRODUCTION", "127.0.0.1", 1),
        Host::new("TEST", "127.0.0.1", 2),
    ])
}

pub fn test_state(
    protocol: ScriptedProtocol,
    credentials: Vec<Credential>,
    catalog: HostCatalog,
) -> GatewayState<ScriptedProtocol> {
    GatewayState::with_protocol(
        test_config(),
        CredentialStore::new(credentials),
        catalog,
        protocol,
    )
}

/// Address of a port nothing is listening on
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
