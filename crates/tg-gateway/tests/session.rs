//! Session state machine tests driven by a scripted terminal

mod common;

use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::duplex;
use tokio::net::TcpListener;
use tokio::time::{timeout, Instant};

use tg_core::{Host, HostCatalog};
use tg_gateway::session::screens::{ERROR, INVALID_LOGIN, PASSWORD, SELECTION, USERID};
use tg_gateway::session::Session;
use tg_gateway::GatewayState;
use tg_protocol::Aid;

use common::{closed_port, credential, default_catalog, test_state, ScriptedProtocol};

fn peer() -> SocketAddr {
    "192.0.2.10:40000".parse().unwrap()
}

/// Run a session to completion over a fresh pipe
async fn run(state: &GatewayState<ScriptedProtocol>) {
    let (conn, _terminal) = duplex(1024);
    let deadline = Instant::now() + Duration::from_secs(30);
    timeout(Duration::from_secs(10), Session::new(state, conn, peer()).run(deadline))
        .await
        .expect("session did not finish");
}

fn login(protocol: ScriptedProtocol, user: &str, password: &str) -> ScriptedProtocol {
    protocol.reply(Aid::Enter, &[(USERID, user), (PASSWORD, password)])
}

fn select(protocol: ScriptedProtocol, input: &str) -> ScriptedProtocol {
    protocol.reply(Aid::Enter, &[(SELECTION, input)])
}

#[tokio::test]
async fn test_logoff_ends_session_without_menu() {
    let protocol = ScriptedProtocol::new().reply(Aid::Pf(9), &[]);
    let state = test_state(protocol, vec![credential("alice", "secret", None)], default_catalog());

    run(&state).await;

    let presented = state.protocol.presented();
    assert_eq!(presented.len(), 1);
    assert!(presented[0].contains("LOGON"));
    assert_eq!(state.protocol.negotiations(), 1);
}

#[tokio::test]
async fn test_bad_password_shows_login_again() {
    let protocol = login(ScriptedProtocol::new(), "alice", "wrong");
    let protocol = login(protocol, "alice", "secret");
    let protocol = select(protocol, "x");
    let state = test_state(protocol, vec![credential("alice", "secret", None)], default_catalog());

    run(&state).await;

    let presented = state.protocol.presented();
    assert_eq!(presented.len(), 3);
    assert!(presented[0].values.get(ERROR).is_none());
    assert_eq!(presented[1].values[ERROR], INVALID_LOGIN);
    // Typed userid is kept on the second attempt
    assert_eq!(presented[1].values[USERID], "alice");
    assert!(presented[2].contains("Welcome alice - Available Hosts"));
}

#[tokio::test]
async fn test_disconnect_tokens_close_session() {
    for token in ["99", "X", "x"] {
        let protocol = select(login(ScriptedProtocol::new(), "alice", "secret"), token);
        let state =
            test_state(protocol, vec![credential("alice", "secret", None)], default_catalog());

        run(&state).await;

        assert_eq!(state.protocol.presented().len(), 2, "token {token:?}");
        assert_eq!(state.protocol.unnegotiations(), 0);
    }
}

#[tokio::test]
async fn test_invalid_selections_redisplay_menu() {
    let mut protocol = login(ScriptedProtocol::new(), "alice", "secret");
    let invalid = ["0", "3", "-1", "abc", " ", "1.0", "100"];
    for input in invalid {
        protocol = select(protocol, input);
    }
    let protocol = select(protocol, "99");
    let state = test_state(protocol, vec![credential("alice", "secret", None)], default_catalog());

    run(&state).await;

    let presented = state.protocol.presented();
    let menus = &presented[1..];
    assert_eq!(menus.len(), invalid.len() + 1);
    // Same menu every time, no relay attempted
    assert!(menus.iter().all(|m| m.text == menus[0].text));
    assert_eq!(state.protocol.unnegotiations(), 0);
    assert_eq!(state.default_catalog.len(), 2);
}

#[tokio::test]
async fn test_broken_user_catalog_falls_back_to_default() {
    let mut broken = tempfile::NamedTempFile::new().unwrap();
    write!(broken, "[{{\"name\": \"MINE\", \"host\": ").unwrap();

    let protocol = select(login(ScriptedProtocol::new(), "bob", "hunter2"), "x");
    let state = test_state(
        protocol,
        vec![credential("bob", "hunter2", Some(broken.path().to_path_buf()))],
        default_catalog(),
    );

    run(&state).await;

    let presented = state.protocol.presented();
    assert_eq!(presented.len(), 2);
    let menu = &presented[1];
    assert!(menu.contains("Welcome bob - Available Hosts"));
    assert!(menu.contains("PRODUCTION"));
    assert!(!menu.contains("MINE"));
}

#[tokio::test]
async fn test_user_catalog_replaces_default() {
    let mut own = tempfile::NamedTempFile::new().unwrap();
    write!(own, r#"[{{"name": "MINE", "host": "10.20.30.40", "port": 23}}]"#).unwrap();

    let protocol = select(login(ScriptedProtocol::new(), "bob", "hunter2"), "x");
    let state = test_state(
        protocol,
        vec![credential("bob", "hunter2", Some(own.path().to_path_buf()))],
        default_catalog(),
    );

    run(&state).await;

    let menu = &state.protocol.presented()[1];
    assert!(menu.contains("MINE"));
    assert!(menu.contains("(10.20.30.40:23)"));
    assert!(menu.contains("Enter selection (1-1, 99, or X):"));
    assert!(!menu.contains("PRODUCTION"));
}

#[tokio::test]
async fn test_connect_failure_shows_notice_then_menu() {
    let catalog = HostCatalog::new(vec![Host::new("DOWN", "127.0.0.1", closed_port().await)]);
    let protocol = select(login(ScriptedProtocol::new(), "alice", "secret"), "1");
    let protocol = protocol.reply(Aid::Enter, &[]);
    let protocol = select(protocol, "x");
    let state = test_state(protocol, vec![credential("alice", "secret", None)], catalog);

    run(&state).await;

    let presented = state.protocol.presented();
    assert_eq!(presented.len(), 4);
    let notice = &presented[2];
    assert!(notice.contains("Connection Error"));
    assert!(notice.contains("Failed to connect to DOWN:"));
    assert!(notice.contains("Press Enter to continue"));
    assert!(presented[3].contains("Welcome alice - Available Hosts"));
    // Handshake plus the renegotiation after the failed connect
    assert_eq!(state.protocol.negotiations(), 2);
}

#[tokio::test]
async fn test_relay_returns_to_menu_without_notice() {
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = backend.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (socket, _) = backend.accept().await.unwrap();
        drop(socket);
    });

    let catalog = HostCatalog::new(vec![Host::new("BRIEF", "127.0.0.1", port)]);
    let protocol = select(login(ScriptedProtocol::new(), "alice", "secret"), "1");
    let protocol = select(protocol, "x");
    let state = test_state(protocol, vec![credential("alice", "secret", None)], catalog);

    run(&state).await;

    let presented = state.protocol.presented();
    assert_eq!(presented.len(), 3);
    assert!(presented[2].contains("Welcome alice - Available Hosts"));
    assert_eq!(state.protocol.unnegotiations(), 1);
    assert_eq!(state.protocol.negotiations(), 2);
}

#[tokio::test]
async fn test_lost_connection_on_menu_ends_session() {
    // Script runs out while the menu is shown
    let protocol = login(ScriptedProtocol::new(), "alice", "secret");
    let state = test_state(protocol, vec![credential("alice", "secret", None)], default_catalog());

    run(&state).await;

    assert_eq!(state.protocol.presented().len(), 2);
    assert_eq!(state.protocol.replies_left(), 0);
}

#[tokio::test]
async fn test_menu_shown_again_when_renegotiation_fails() {
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = backend.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (socket, _) = backend.accept().await.unwrap();
        drop(socket);
    });

    let catalog = HostCatalog::new(vec![Host::new("BRIEF", "127.0.0.1", port)]);
    let protocol = select(login(ScriptedProtocol::new(), "alice", "secret"), "1");
    let protocol = select(protocol, "x")
        .refuse_unnegotiation()
        .refuse_negotiation_after(1);
    let state = test_state(protocol, vec![credential("alice", "secret", None)], catalog);

    run(&state).await;

    let presented = state.protocol.presented();
    assert_eq!(presented.len(), 3);
    assert!(presented[2].contains("Welcome alice - Available Hosts"));
    assert!(!presented[2].contains("Connection Error"));
    // Handshake plus every failed renegotiation attempt
    let attempts = state.config.relay.renegotiate_attempts as usize;
    assert_eq!(state.protocol.negotiations(), 1 + attempts);
    assert_eq!(state.protocol.replies_left(), 0);
}
