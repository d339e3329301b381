//! Per-connection session: handshake, login, host menu and relay

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{timeout, timeout_at, Instant};

use tg_core::{load_host_catalog, HostCatalog};
use tg_protocol::{Aid, ProtocolError, Rules, ScreenRequest, ScreenResponse, TerminalProtocol};

use crate::auth::Credential;
use crate::server::ClientTransport;
use crate::session::relay::{self, RelayOutcome};
use crate::session::screens::{self, MenuChoice};
use crate::state::GatewayState;

/// Reasons a session ends other than the user leaving
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Terminal negotiation failed: {0}")]
    Handshake(#[source] ProtocolError),

    #[error("Terminal negotiation timed out")]
    HandshakeTimeout,

    #[error("No input for {0:?}")]
    Idle(Duration),

    #[error("Screen exchange failed: {0}")]
    Screen(#[source] ProtocolError),
}

/// How the login screen ended
enum Login {
    Authenticated(AuthenticatedSession),
    Logoff,
}

/// A user who has logged in, with the catalog chosen for them
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub username: String,
    pub catalog: Arc<HostCatalog>,
}

/// Pick the host catalog for a credential, falling back to the default
pub fn resolve_catalog(credential: &Credential, default: &Arc<HostCatalog>) -> Arc<HostCatalog> {
    let Some(path) = &credential.catalog_ref else {
        return Arc::clone(default);
    };
    match load_host_catalog(path) {
        Ok(catalog) => {
            tracing::debug!(
                "Using host catalog {:?} ({} hosts) for {}",
                path,
                catalog.len(),
                credential.username
            );
            Arc::new(catalog)
        }
        Err(e) => {
            tracing::warn!(
                "Host catalog for {} unusable, using default: {}",
                credential.username,
                e
            );
            Arc::clone(default)
        }
    }
}

/// One client connection, owned for its whole life
pub struct Session<'a, P, C> {
    state: &'a GatewayState<P>,
    conn: C,
    peer: SocketAddr,
}

impl<'a, P, C> Session<'a, P, C>
where
    P: TerminalProtocol,
    C: ClientTransport,
{
    pub fn new(state: &'a GatewayState<P>, conn: C, peer: SocketAddr) -> Self {
        Self { state, conn, peer }
    }

    /// Run the session to completion; the connection is closed on return
    pub async fn run(mut self, handshake_deadline: Instant) {
        if let Err(e) = self.handshake(handshake_deadline).await {
            tracing::warn!("Handshake with {} failed: {}", self.peer, e);
            return;
        }

        let session = match self.authenticate().await {
            Ok(Login::Authenticated(session)) => session,
            Ok(Login::Logoff) => {
                tracing::info!("Client {} logged off before authenticating", self.peer);
                return;
            }
            Err(e) => {
                tracing::warn!("Login for {} ended: {}", self.peer, e);
                return;
            }
        };

        match self.menu(&session).await {
            Ok(()) => tracing::info!("User {} disconnected from {}", session.username, self.peer),
            Err(e) => tracing::warn!("Session for {} ({}) ended: {}", session.username, self.peer, e),
        }
    }

    /// Put the client into block mode before `deadline`
    pub async fn handshake(&mut self, deadline: Instant) -> Result<(), SessionError> {
        match timeout_at(deadline, self.state.protocol.negotiate(&mut self.conn)).await {
            Ok(Ok(())) => {
                tracing::debug!("Negotiated terminal with {}", self.peer);
                Ok(())
            }
            Ok(Err(e)) => Err(SessionError::Handshake(e)),
            Err(_) => Err(SessionError::HandshakeTimeout),
        }
    }

    async fn present(&mut self, request: ScreenRequest<'_>) -> Result<ScreenResponse, SessionError> {
        let idle = self.state.config.session.idle_timeout;
        bounded(idle, self.state.protocol.present_screen(&mut self.conn, request)).await
    }

    async fn authenticate(&mut self) -> Result<Login, SessionError> {
        let screen = screens::login_screen();
        let rules = screens::login_rules();
        let accept = [Aid::Enter];
        let exit = [screens::LOGOFF_KEY];
        let (row, col) = screens::LOGIN_CURSOR;
        let mut values = HashMap::new();

        loop {
            let request = ScreenRequest::new(&screen, &rules, &accept)
                .values(values)
                .exit(&exit)
                .error_field(screens::ERROR)
                .cursor(row, col);
            let mut response = self.present(request).await?;

            if response.aid == screens::LOGOFF_KEY {
                return Ok(Login::Logoff);
            }

            let username = response
                .values
                .get(screens::USERID)
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            let password = response
                .values
                .get(screens::PASSWORD)
                .map(|s| s.trim().to_string())
                .unwrap_or_default();

            if let Some(credential) = self.state.credentials.authenticate(&username, &password) {
                tracing::info!("User {} authenticated from {}", credential.username, self.peer);
                let catalog = resolve_catalog(credential, &self.state.default_catalog);
                return Ok(Login::Authenticated(AuthenticatedSession {
                    username: credential.username.clone(),
                    catalog,
                }));
            }

            tracing::warn!("Failed login for {:?} from {}", username, self.peer);
            response
                .values
                .insert(screens::ERROR.to_string(), screens::INVALID_LOGIN.to_string());
            values = response.values;
        }
    }

    /// Show the host menu until the user disconnects
    async fn menu(&mut self, session: &AuthenticatedSession) -> Result<(), SessionError> {
        let screen = screens::menu_screen(&session.username, &session.catalog);
        let rules = screens::menu_rules();
        let accept = [Aid::Enter];
        let (row, col) = screens::MENU_CURSOR;

        loop {
            let request = ScreenRequest::new(&screen, &rules, &accept).cursor(row, col);
            let response = self.present(request).await?;
            let input = response
                .values
                .get(screens::SELECTION)
                .map(String::as_str)
                .unwrap_or("");

            let number = match screens::parse_selection(input, session.catalog.len()) {
                MenuChoice::Disconnect => {
                    tracing::info!("User {} chose disconnect ({:?})", session.username, input.trim());
                    return Ok(());
                }
                MenuChoice::Invalid => {
                    tracing::debug!("User {} entered invalid selection {:?}", session.username, input);
                    continue;
                }
                MenuChoice::Host(number) => number,
            };
            let Some(host) = session.catalog.select(number) else {
                continue;
            };

            tracing::info!("User {} selected {}", session.username, host);
            let outcome =
                relay::relay(&self.state.protocol, &self.state.config.relay, &mut self.conn, host)
                    .await;

            match outcome {
                RelayOutcome::ConnectFailed(e) => {
                    let notice = screens::connect_error_screen(host, &e.to_string());
                    let no_rules = Rules::new();
                    let (row, col) = screens::NOTICE_CURSOR;
                    let request = ScreenRequest::new(&notice, &no_rules, &accept).cursor(row, col);
                    self.present(request).await?;
                }
                RelayOutcome::Aborted(direction, e) => {
                    tracing::info!(
                        "User {} back at menu after relay to {} failed ({}): {}",
                        session.username,
                        host.name,
                        direction,
                        e
                    );
                }
                RelayOutcome::Closed(_) => {
                    tracing::info!("User {} back at menu from {}", session.username, host.name);
                }
            }
        }
    }
}

/// Bound a screen exchange by the idle timeout
async fn bounded<T, F>(idle: Duration, exchange: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, ProtocolError>>,
{
    match timeout(idle, exchange).await {
        Ok(result) => result.map_err(SessionError::Screen),
        Err(_) => Err(SessionError::Idle(idle)),
    }
}
