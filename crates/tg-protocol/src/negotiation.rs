//! Switching a connection between NVT line mode and TN3270 block mode

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Encoder, Framed};

use crate::codec::TelnetCodec;
use crate::error::ProtocolError;
use crate::telnet::{
    TelnetEvent, Verb, OPT_BINARY, OPT_EOR, OPT_TERMINAL_TYPE, TTYPE_IS, TTYPE_SEND,
};

/// Options enabled in both directions for block mode
const BLOCK_MODE_OPTIONS: [u8; 2] = [OPT_EOR, OPT_BINARY];

type TelnetFramed<'a, S> = Framed<&'a mut S, TelnetCodec>;

async fn next_event<S>(framed: &mut TelnetFramed<'_, S>) -> Result<TelnetEvent, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match framed.next().await {
        Some(event) => event,
        None => Err(ProtocolError::ConnectionClosed),
    }
}

/// Refuse an option request the gateway did not ask for
async fn refuse<S>(
    framed: &mut TelnetFramed<'_, S>,
    verb: Verb,
    option: u8,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(answer) = verb.refusal() {
        tracing::trace!("Refusing unsolicited {:?} {}", verb, option);
        framed.send(TelnetEvent::negotiate(answer, option)).await?;
    }
    Ok(())
}

/// Put the client into TN3270 block mode.
///
/// Asks for the terminal type, then enables END-OF-RECORD and BINARY in both
/// directions. Returns the terminal type the client reported.
pub async fn negotiate<S>(conn: &mut S) -> Result<String, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(conn, TelnetCodec::new());

    framed
        .send(TelnetEvent::negotiate(Verb::Do, OPT_TERMINAL_TYPE))
        .await?;
    loop {
        match next_event(&mut framed).await? {
            TelnetEvent::Negotiate {
                verb: Verb::Will,
                option: OPT_TERMINAL_TYPE,
            } => break,
            TelnetEvent::Negotiate {
                verb: Verb::Wont,
                option: OPT_TERMINAL_TYPE,
            } => return Err(ProtocolError::OptionRefused(OPT_TERMINAL_TYPE)),
            TelnetEvent::Negotiate { verb, option } => refuse(&mut framed, verb, option).await?,
            _ => {}
        }
    }

    framed
        .send(TelnetEvent::Subnegotiate(Bytes::from_static(&[
            OPT_TERMINAL_TYPE,
            TTYPE_SEND,
        ])))
        .await?;
    let terminal_type = loop {
        match next_event(&mut framed).await? {
            TelnetEvent::Subnegotiate(payload)
                if payload.len() >= 2
                    && payload[0] == OPT_TERMINAL_TYPE
                    && payload[1] == TTYPE_IS =>
            {
                break String::from_utf8_lossy(&payload[2..]).into_owned();
            }
            TelnetEvent::Negotiate { verb, option } if option != OPT_TERMINAL_TYPE => {
                refuse(&mut framed, verb, option).await?
            }
            _ => {}
        }
    };
    tracing::debug!("Client terminal type: {}", terminal_type);

    // Answers we are waiting for: DO for our WILL, WILL for our DO
    let mut pending = Vec::new();
    for option in BLOCK_MODE_OPTIONS {
        framed.feed(TelnetEvent::negotiate(Verb::Will, option)).await?;
        framed.feed(TelnetEvent::negotiate(Verb::Do, option)).await?;
        pending.push((Verb::Do, option));
        pending.push((Verb::Will, option));
    }
    framed.flush().await?;

    while !pending.is_empty() {
        if let TelnetEvent::Negotiate { verb, option } = next_event(&mut framed).await? {
            if let Some(pos) = pending.iter().position(|p| *p == (verb, option)) {
                pending.remove(pos);
            } else if BLOCK_MODE_OPTIONS.contains(&option) {
                if matches!(verb, Verb::Wont | Verb::Dont) {
                    return Err(ProtocolError::OptionRefused(option));
                }
                // Repeated agreement
            } else {
                refuse(&mut framed, verb, option).await?;
            }
        }
    }

    Ok(terminal_type)
}

/// Return the client to NVT line mode.
///
/// Disables END-OF-RECORD and BINARY, then discards whatever the client sends
/// until `drain` elapses. The client's acknowledgements are not required.
pub async fn unnegotiate<S>(conn: &mut S, drain: Duration) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = TelnetCodec::new();
    let mut out = BytesMut::new();
    for option in BLOCK_MODE_OPTIONS {
        codec.encode(TelnetEvent::negotiate(Verb::Wont, option), &mut out)?;
        codec.encode(TelnetEvent::negotiate(Verb::Dont, option), &mut out)?;
    }
    conn.write_all(&out).await?;
    conn.flush().await?;

    let deadline = tokio::time::Instant::now() + drain;
    let mut buf = [0u8; 512];
    loop {
        match tokio::time::timeout_at(deadline, conn.read(&mut buf)).await {
            Err(_) => return Ok(()),
            Ok(Ok(0)) => return Err(ProtocolError::ConnectionClosed),
            Ok(Ok(n)) => tracing::trace!("Discarded {} bytes during un-negotiation", n),
            Ok(Err(e)) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::{DO, DONT, IAC, SB, SE, WILL, WONT};
    use tokio::io::duplex;

    /// Minimal well-behaved TN3270 client
    async fn scripted_client(mut client: tokio::io::DuplexStream) -> Vec<u8> {
        let mut seen = Vec::new();
        let mut buf = [0u8; 64];

        // DO TERMINAL-TYPE
        let n = client.read(&mut buf).await.unwrap();
        seen.extend_from_slice(&buf[..n]);
        client.write_all(&[IAC, WILL, OPT_TERMINAL_TYPE]).await.unwrap();

        // SB TERMINAL-TYPE SEND
        let n = client.read(&mut buf).await.unwrap();
        seen.extend_from_slice(&buf[..n]);
        let mut reply = vec![IAC, SB, OPT_TERMINAL_TYPE, TTYPE_IS];
        reply.extend_from_slice(b"IBM-3278-2");
        reply.extend_from_slice(&[IAC, SE]);
        client.write_all(&reply).await.unwrap();

        // WILL/DO EOR, WILL/DO BINARY
        let mut want = 12;
        while want > 0 {
            let n = client.read(&mut buf).await.unwrap();
            seen.extend_from_slice(&buf[..n]);
            want -= n.min(want);
        }
        client
            .write_all(&[
                IAC, DO, OPT_EOR, IAC, WILL, OPT_EOR, IAC, DO, OPT_BINARY, IAC, WILL, OPT_BINARY,
            ])
            .await
            .unwrap();
        seen
    }

    #[tokio::test]
    async fn test_negotiate_with_cooperative_client() {
        let (mut server, client) = duplex(1024);
        let client_task = tokio::spawn(scripted_client(client));

        let terminal = negotiate(&mut server).await.unwrap();
        assert_eq!(terminal, "IBM-3278-2");

        let seen = client_task.await.unwrap();
        assert_eq!(&seen[..3], &[IAC, DO, OPT_TERMINAL_TYPE]);
        assert_eq!(&seen[3..9], &[IAC, SB, OPT_TERMINAL_TYPE, TTYPE_SEND, IAC, SE]);
    }

    #[tokio::test]
    async fn test_negotiate_refused_terminal_type() {
        let (mut server, mut client) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 16];
            let _ = client.read(&mut buf).await;
            let _ = client.write_all(&[IAC, WONT, OPT_TERMINAL_TYPE]).await;
            // Keep the pipe open until the server gives up
            let _ = client.read(&mut buf).await;
        });

        let result = negotiate(&mut server).await;
        assert!(matches!(
            result,
            Err(ProtocolError::OptionRefused(OPT_TERMINAL_TYPE))
        ));
    }

    #[tokio::test]
    async fn test_negotiate_client_disconnects() {
        let (mut server, client) = duplex(1024);
        drop(client);
        assert!(negotiate(&mut server).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unnegotiate_drains_until_deadline() {
        let (mut server, mut client) = duplex(1024);
        let client_task = tokio::spawn(async move {
            let mut buf = [0u8; 12];
            client.read_exact(&mut buf).await.unwrap();
            client.write_all(&[IAC, WONT, OPT_EOR]).await.unwrap();
            // Stay connected past the drain window
            tokio::time::sleep(Duration::from_secs(10)).await;
            buf
        });

        unnegotiate(&mut server, Duration::from_secs(2)).await.unwrap();

        let sent = client_task.await.unwrap();
        assert_eq!(
            sent,
            [IAC, WONT, OPT_EOR, IAC, DONT, OPT_EOR, IAC, WONT, OPT_BINARY, IAC, DONT, OPT_BINARY]
        );
    }
}
