//! The terminal protocol seam used by the gateway's session code

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::codec::TelnetCodec;
use crate::error::ProtocolError;
use crate::negotiation;
use crate::screen::{self, Aid, Field, Rules};
use crate::telnet::TelnetEvent;

/// One screen exchange: what to show and which keys end the wait
#[derive(Debug, Clone)]
pub struct ScreenRequest<'a> {
    pub screen: &'a [Field],
    pub rules: &'a Rules,
    /// Initial values of named fields
    pub values: HashMap<String, String>,
    /// Keys that submit the screen (subject to validation)
    pub accept: &'a [Aid],
    /// Keys that end the wait immediately, skipping validation
    pub exit: &'a [Aid],
    /// Named field that receives validation messages
    pub error_field: Option<&'a str>,
    pub cursor: (usize, usize),
}

impl<'a> ScreenRequest<'a> {
    /// A screen accepting `accept` with no rules, values or exit keys
    pub fn new(screen: &'a [Field], rules: &'a Rules, accept: &'a [Aid]) -> Self {
        Self {
            screen,
            rules,
            values: HashMap::new(),
            accept,
            exit: &[],
            error_field: None,
            cursor: (0, 0),
        }
    }

    pub fn values(mut self, values: HashMap<String, String>) -> Self {
        self.values = values;
        self
    }

    pub fn exit(mut self, exit: &'a [Aid]) -> Self {
        self.exit = exit;
        self
    }

    pub fn error_field(mut self, field: &'a str) -> Self {
        self.error_field = Some(field);
        self
    }

    pub fn cursor(mut self, row: usize, col: usize) -> Self {
        self.cursor = (row, col);
        self
    }
}

/// The key the user pressed and every named field's value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenResponse {
    pub aid: Aid,
    pub values: HashMap<String, String>,
}

/// Block-mode terminal protocol operations on a client connection.
///
/// Implementations never set deadlines themselves; callers bound each call.
#[async_trait]
pub trait TerminalProtocol: Send + Sync {
    /// Switch the connection from line mode to block mode
    async fn negotiate<S>(&self, conn: &mut S) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send;

    /// Switch the connection back to line mode, draining replies for `timeout`
    async fn unnegotiate<S>(&self, conn: &mut S, timeout: Duration) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send;

    /// Show a screen and wait for an accepted or exit key
    async fn present_screen<S>(
        &self,
        conn: &mut S,
        request: ScreenRequest<'_>,
    ) -> Result<ScreenResponse, ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send;
}

/// TN3270 (RFC 1576) implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct Tn3270;

impl Tn3270 {
    pub fn new() -> Self {
        Self
    }
}

/// First failing rule, in field-name order so messages are stable
fn first_violation(rules: &Rules, values: &HashMap<String, String>) -> Option<String> {
    let mut names: Vec<&String> = rules.keys().collect();
    names.sort();
    names.into_iter().find_map(|name| {
        let validator = rules[name];
        let value = values.get(name).map(String::as_str).unwrap_or("");
        (!validator.check(value)).then(|| validator.message(name))
    })
}

#[async_trait]
impl TerminalProtocol for Tn3270 {
    async fn negotiate<S>(&self, conn: &mut S) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        negotiation::negotiate(conn).await.map(|_| ())
    }

    async fn unnegotiate<S>(&self, conn: &mut S, timeout: Duration) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        negotiation::unnegotiate(conn, timeout).await
    }

    async fn present_screen<S>(
        &self,
        conn: &mut S,
        request: ScreenRequest<'_>,
    ) -> Result<ScreenResponse, ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut framed = Framed::new(conn, TelnetCodec::new());
        let mut values = request.values;

        loop {
            let data = screen::encode_screen(request.screen, &values, request.cursor);
            framed.send(TelnetEvent::Record(data.freeze())).await?;

            let record = loop {
                match framed.next().await {
                    Some(Ok(TelnetEvent::Record(record))) => break record,
                    Some(Ok(other)) => tracing::trace!("Ignoring {:?} while awaiting input", other),
                    Some(Err(e)) => return Err(e),
                    None => return Err(ProtocolError::ConnectionClosed),
                }
            };

            let (aid, modified) = screen::decode_response(&record, request.screen)?;
            values.extend(modified);

            if request.exit.contains(&aid) {
                return Ok(ScreenResponse { aid, values });
            }
            if !request.accept.contains(&aid) {
                tracing::trace!("Key {:?} not accepted, redisplaying", aid);
                continue;
            }

            match first_violation(request.rules, &values) {
                Some(message) => {
                    if let Some(field) = request.error_field {
                        values.insert(field.to_string(), message);
                    }
                }
                None => {
                    if let Some(field) = request.error_field {
                        values.remove(field);
                    }
                    return Ok(ScreenResponse { aid, values });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebcdic;
    use crate::screen::Validator;
    use crate::telnet::{EOR, IAC};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    /// Buffer address 1877: row 23, column 37
    const SELECTION_ADDR: [u8; 2] = [0x5D, 0xD5];

    fn menu_screen() -> Vec<Field> {
        vec![
            Field::text(0, 0, "MENU"),
            Field::input(23, 36, "selection"),
            Field::output(22, 0, "error"),
        ]
    }

    async fn read_record(client: &mut tokio::io::DuplexStream) -> Vec<u8> {
        let mut record = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            client.read_exact(&mut byte).await.unwrap();
            record.push(byte[0]);
            if record.ends_with(&[IAC, EOR]) {
                return record;
            }
        }
    }

    fn enter_with(value: &str) -> Vec<u8> {
        let mut reply = vec![0x7D, 0x5D, 0x5E, 0x11];
        reply.extend_from_slice(&SELECTION_ADDR);
        reply.extend_from_slice(&ebcdic::to_ebcdic(value));
        reply.extend_from_slice(&[IAC, EOR]);
        reply
    }

    #[tokio::test]
    async fn test_present_screen_validates_then_accepts() {
        let (mut server, mut client) = duplex(8192);
        let client_task = tokio::spawn(async move {
            // Blank submission is rejected with a message
            read_record(&mut client).await;
            client.write_all(&enter_with("  ")).await.unwrap();
            let redisplay = read_record(&mut client).await;
            client.write_all(&enter_with("2")).await.unwrap();
            redisplay
        });

        let mut rules = Rules::new();
        rules.insert("selection".to_string(), Validator::NonBlank);
        let screen = menu_screen();
        let accept = [Aid::Enter];

        let response = Tn3270
            .present_screen(
                &mut server,
                ScreenRequest::new(&screen, &rules, &accept).error_field("error"),
            )
            .await
            .unwrap();

        assert_eq!(response.aid, Aid::Enter);
        assert_eq!(response.values["selection"], "2");
        assert!(!response.values.contains_key("error"));

        let redisplay = client_task.await.unwrap();
        let message = ebcdic::to_ebcdic("Please enter a value for SELECTION.");
        assert!(redisplay.windows(message.len()).any(|w| w == message.as_slice()));
    }

    #[tokio::test]
    async fn test_present_screen_exit_key_skips_validation() {
        let (mut server, mut client) = duplex(8192);
        tokio::spawn(async move {
            read_record(&mut client).await;
            // PF3 with nothing typed
            client.write_all(&[0xF3, 0x40, 0x40, IAC, EOR]).await.unwrap();
        });

        let mut rules = Rules::new();
        rules.insert("selection".to_string(), Validator::NonBlank);
        let screen = menu_screen();
        let accept = [Aid::Enter];
        let exit = [Aid::Pf(3)];

        let response = Tn3270
            .present_screen(
                &mut server,
                ScreenRequest::new(&screen, &rules, &accept).exit(&exit),
            )
            .await
            .unwrap();
        assert_eq!(response.aid, Aid::Pf(3));
    }

    #[tokio::test]
    async fn test_present_screen_connection_lost() {
        let (mut server, client) = duplex(8192);
        drop(client);

        let rules = Rules::new();
        let screen = menu_screen();
        let accept = [Aid::Enter];
        let result = Tn3270
            .present_screen(&mut server, ScreenRequest::new(&screen, &rules, &accept))
            .await;
        assert!(result.is_err());
    }
}
