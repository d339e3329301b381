//! Tokio codec for the TN3270 telnet stream
//!
//! Splits inbound bytes into negotiation commands, subnegotiations and
//! `IAC EOR` terminated records. Data bytes are unescaped (`IAC IAC` becomes
//! a single 0xFF) and accumulated across reads until the record ends.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::telnet::{TelnetEvent, Verb, EOR, IAC, MAX_RECORD_SIZE, SB, SE};

/// Codec for encoding/decoding telnet events
#[derive(Debug, Default)]
pub struct TelnetCodec {
    /// Data of the record currently being assembled
    record: BytesMut,
}

impl TelnetCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            record: BytesMut::new(),
        }
    }

    fn append(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        let size = self.record.len() + data.len();
        if size > MAX_RECORD_SIZE {
            self.record.clear();
            return Err(ProtocolError::RecordTooLarge {
                size,
                max: MAX_RECORD_SIZE,
            });
        }
        self.record.extend_from_slice(data);
        Ok(())
    }
}

/// Locate the `IAC SE` closing a subnegotiation.
///
/// `buf` starts right after `IAC SB`. Returns the unescaped payload and the
/// number of bytes consumed including the terminator.
fn find_subnegotiation_end(buf: &[u8]) -> Option<(Bytes, usize)> {
    let mut payload = BytesMut::new();
    let mut i = 0;
    while i < buf.len() {
        if buf[i] != IAC {
            payload.put_u8(buf[i]);
            i += 1;
            continue;
        }
        let next = *buf.get(i + 1)?;
        match next {
            SE => return Some((payload.freeze(), i + 2)),
            IAC => payload.put_u8(IAC),
            _ => {}
        }
        i += 2;
    }
    None
}

/// Append `data` to `dst`, doubling every 0xFF
fn put_escaped(dst: &mut BytesMut, data: &[u8]) {
    dst.reserve(data.len());
    for &b in data {
        if b == IAC {
            dst.put_u8(IAC);
        }
        dst.put_u8(b);
    }
}

impl Decoder for TelnetCodec {
    type Item = TelnetEvent;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let plain = src.iter().position(|&b| b == IAC).unwrap_or(src.len());
            if plain > 0 {
                let data = src.split_to(plain);
                self.append(&data)?;
            }

            // Need at least the command byte after IAC
            if src.len() < 2 {
                return Ok(None);
            }

            match src[1] {
                IAC => {
                    self.append(&[IAC])?;
                    src.advance(2);
                }
                EOR => {
                    src.advance(2);
                    let record = self.record.split().freeze();
                    return Ok(Some(TelnetEvent::Record(record)));
                }
                SB => match find_subnegotiation_end(&src[2..]) {
                    Some((payload, consumed)) => {
                        src.advance(2 + consumed);
                        return Ok(Some(TelnetEvent::Subnegotiate(payload)));
                    }
                    None => {
                        if src.len() > MAX_RECORD_SIZE {
                            return Err(ProtocolError::RecordTooLarge {
                                size: src.len(),
                                max: MAX_RECORD_SIZE,
                            });
                        }
                        return Ok(None);
                    }
                },
                command => match Verb::from_u8(command) {
                    Some(verb) => {
                        if src.len() < 3 {
                            return Ok(None);
                        }
                        let option = src[2];
                        src.advance(3);
                        return Ok(Some(TelnetEvent::negotiate(verb, option)));
                    }
                    None => {
                        // NOP, GA, AYT and friends
                        tracing::trace!("Ignoring telnet command {}", command);
                        src.advance(2);
                    }
                },
            }
        }
    }
}

impl Encoder<TelnetEvent> for TelnetCodec {
    type Error = ProtocolError;

    fn encode(&mut self, event: TelnetEvent, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match event {
            TelnetEvent::Negotiate { verb, option } => {
                dst.extend_from_slice(&[IAC, verb.as_u8(), option]);
            }
            TelnetEvent::Subnegotiate(payload) => {
                dst.extend_from_slice(&[IAC, SB]);
                put_escaped(dst, &payload);
                dst.extend_from_slice(&[IAC, SE]);
            }
            TelnetEvent::Record(data) => {
                if data.len() > MAX_RECORD_SIZE {
                    return Err(ProtocolError::RecordTooLarge {
                        size: data.len(),
                        max: MAX_RECORD_SIZE,
                    });
                }
                put_escaped(dst, &data);
                dst.extend_from_slice(&[IAC, EOR]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::{DO, OPT_TERMINAL_TYPE, WILL};

    #[test]
    fn test_codec_record_with_escaped_iac() {
        let mut codec = TelnetCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(TelnetEvent::Record(Bytes::from_static(&[0x7D, 0xFF, 0x40])), &mut buf)
            .unwrap();
        assert_eq!(buf.as_ref(), &[0x7D, IAC, IAC, 0x40, IAC, EOR]);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            decoded,
            TelnetEvent::Record(Bytes::from_static(&[0x7D, 0xFF, 0x40]))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_negotiation_between_records() {
        let mut codec = TelnetCodec::new();
        let mut buf = BytesMut::from(&[0x6D, IAC, WILL, OPT_TERMINAL_TYPE, 0x60, IAC, EOR][..]);

        // Command arrives first, record data either side of it is kept
        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, TelnetEvent::negotiate(Verb::Will, OPT_TERMINAL_TYPE));

        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            second,
            TelnetEvent::Record(Bytes::from_static(&[0x6D, 0x60]))
        );
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = TelnetCodec::new();
        let mut partial = BytesMut::from(&[IAC, DO][..]);

        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&[OPT_TERMINAL_TYPE]);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded, TelnetEvent::negotiate(Verb::Do, OPT_TERMINAL_TYPE));
    }

    #[test]
    fn test_codec_subnegotiation() {
        let mut codec = TelnetCodec::new();
        let mut buf = BytesMut::from(&[IAC, SB, OPT_TERMINAL_TYPE, 0][..]);
        buf.extend_from_slice(b"IBM-3278-2-E");

        // Terminator not here yet
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[IAC, SE]);
        match codec.decode(&mut buf).unwrap().unwrap() {
            TelnetEvent::Subnegotiate(payload) => {
                assert_eq!(payload[0], OPT_TERMINAL_TYPE);
                assert_eq!(&payload[2..], b"IBM-3278-2-E");
            }
            other => panic!("Expected subnegotiation, got {:?}", other),
        }
    }

    #[test]
    fn test_codec_record_too_large() {
        let mut codec = TelnetCodec::new();
        let mut buf = BytesMut::from(&vec![0x40u8; MAX_RECORD_SIZE + 1][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::RecordTooLarge { .. })
        ));
    }
}
