//! WebSocket transport for browser clients.
//!
//! A browser connection starts as an HTTP upgrade on the game port. After the
//! handshake every game frame travels inside binary WebSocket messages, with
//! no alignment between the two: one message may carry several game frames,
//! and a game frame may span messages. [`WsInbound`] turns the message stream
//! back into a plain byte stream, so the registry reads it exactly like TCP.
//!
//! Both halves wrap another transport half, which keeps the framing testable
//! over the memory transport.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{Buf, BufMut, BytesMut};
use tracing::debug;

use crate::transport::tcp::{split_tcp, TcpInbound, TcpOutbound};
use crate::transport::{Inbound, Outbound};

/// Appended to the client key before hashing, per RFC 6455.
const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Longest upgrade request we read before giving up.
const MAX_REQUEST_LEN: usize = 4096;

/// Largest message payload accepted from a client.
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

/// How long the acceptor waits for the first bytes or the upgrade request.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

const PEEK_RETRY_DELAY: Duration = Duration::from_millis(5);

const OP_CONTINUATION: u8 = 0x0;
const OP_TEXT: u8 = 0x1;
const OP_BINARY: u8 = 0x2;
const OP_CLOSE: u8 = 0x8;

const FIN: u8 = 0x80;
const MASKED: u8 = 0x80;

/// True when the first bytes of a connection start an HTTP GET.
pub fn is_upgrade_request(head: &[u8]) -> bool {
    head.len() >= 5 && head[..5].eq_ignore_ascii_case(b"GET /")
}

/// Peek at a fresh connection to tell browsers from game clients. A client
/// that sends nothing within [`HANDSHAKE_TIMEOUT`] is treated as a game
/// client.
pub fn peek_upgrade(stream: &TcpStream) -> io::Result<bool> {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    let mut head = [0u8; 5];
    let result = loop {
        match stream.peek(&mut head) {
            Ok(0) => break Ok(false),
            Ok(n) if n < head.len() && head[..n].eq_ignore_ascii_case(&b"GET /"[..n]) => {
                thread::sleep(PEEK_RETRY_DELAY);
            }
            Ok(n) => break Ok(is_upgrade_request(&head[..n])),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                break Ok(false)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => break Err(e),
        }
    };
    stream.set_read_timeout(None)?;
    result
}

/// `Sec-WebSocket-Accept` value for a client key.
pub fn accept_key(client_key: &str) -> String {
    let mut sha = sha1_smol::Sha1::new();
    sha.update(client_key.trim().as_bytes());
    sha.update(ACCEPT_GUID.as_bytes());
    STANDARD.encode(sha.digest().bytes())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub key: String,
    pub protocol: Option<String>,
}

/// Parse the header block of an upgrade request.
pub fn parse_upgrade_request(request: &[u8]) -> io::Result<UpgradeRequest> {
    let text = std::str::from_utf8(request)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "request is not UTF-8"))?;
    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    if !is_upgrade_request(request_line.as_bytes()) {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "not a GET request"));
    }

    let mut key = None;
    let mut protocol = None;
    for line in lines.take_while(|line| !line.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.trim().eq_ignore_ascii_case("sec-websocket-key") {
            key = Some(value.to_string());
        } else if name.trim().eq_ignore_ascii_case("sec-websocket-protocol") {
            protocol = value.split(',').next().map(|p| p.trim().to_string());
        }
    }

    key.filter(|k| !k.is_empty())
        .map(|key| UpgradeRequest { key, protocol })
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing Sec-WebSocket-Key"))
}

pub fn upgrade_response(request: &UpgradeRequest) -> String {
    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n",
        accept_key(&request.key)
    );
    if let Some(protocol) = &request.protocol {
        response.push_str("Sec-WebSocket-Protocol: ");
        response.push_str(protocol);
        response.push_str("\r\n");
    }
    response.push_str("\r\n");
    response
}

/// Read the upgrade request from `stream` and answer it. Refused requests
/// get a 400 before the error is returned.
pub fn upgrade<S: Read + Write>(stream: &mut S) -> io::Result<UpgradeRequest> {
    // Byte at a time: anything after the blank line already belongs to the
    // message stream.
    let mut request = Vec::with_capacity(512);
    let mut byte = [0u8; 1];
    while !request.ends_with(b"\r\n\r\n") {
        if request.len() >= MAX_REQUEST_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "upgrade request too long"));
        }
        stream.read_exact(&mut byte)?;
        request.push(byte[0]);
    }

    match parse_upgrade_request(&request) {
        Ok(parsed) => {
            stream.write_all(upgrade_response(&parsed).as_bytes())?;
            Ok(parsed)
        }
        Err(e) => {
            stream.write_all(b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n")?;
            Err(e)
        }
    }
}

/// Upgrade an accepted stream and split it like [`split_tcp`].
pub fn split_websocket(
    mut stream: TcpStream,
) -> io::Result<(WsInbound<TcpInbound>, WsOutbound<TcpOutbound>, SocketAddr)> {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    let request = upgrade(&mut stream)?;
    stream.set_read_timeout(None)?;
    debug!(protocol = ?request.protocol, "WebSocket upgrade complete");

    let (inbound, outbound, peer) = split_tcp(stream)?;
    Ok((WsInbound::new(inbound), WsOutbound::new(outbound), peer))
}

/// Read half: unwraps client messages into a contiguous byte stream.
#[derive(Debug)]
pub struct WsInbound<I> {
    raw: I,
    data: BytesMut,
}

impl<I: Inbound> WsInbound<I> {
    pub fn new(raw: I) -> Self {
        Self {
            raw,
            data: BytesMut::new(),
        }
    }

    /// Read one message whose first header byte is `head`, appending its
    /// payload to the buffered data.
    fn read_message(&mut self, head: u8) -> io::Result<()> {
        let opcode = head & 0x0F;
        let mut second = [0u8; 1];
        self.raw.read_payload(&mut second)?;
        let masked = second[0] & MASKED != 0;

        let len = match second[0] & 0x7F {
            126 => {
                let mut ext = [0u8; 2];
                self.raw.read_payload(&mut ext)?;
                usize::from(u16::from_be_bytes(ext))
            }
            127 => {
                let mut ext = [0u8; 8];
                self.raw.read_payload(&mut ext)?;
                usize::try_from(u64::from_be_bytes(ext)).unwrap_or(usize::MAX)
            }
            short => usize::from(short),
        };
        if len > MAX_MESSAGE_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "message too large"));
        }

        let mut mask = [0u8; 4];
        if masked {
            self.raw.read_payload(&mut mask)?;
        }
        let mut payload = vec![0u8; len];
        self.raw.read_payload(&mut payload)?;
        if masked {
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= mask[i % 4];
            }
        }

        match opcode {
            OP_CONTINUATION | OP_TEXT | OP_BINARY => {
                self.data.put_slice(&payload);
                Ok(())
            }
            OP_CLOSE => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "peer closed the WebSocket",
            )),
            // Ping and pong carry nothing for the game stream.
            _ => Ok(()),
        }
    }

    /// Blocking read of the next message.
    fn next_message(&mut self) -> io::Result<()> {
        let mut head = [0u8; 1];
        self.raw.read_payload(&mut head)?;
        self.read_message(head[0])
    }
}

impl<I: Inbound> Inbound for WsInbound<I> {
    fn poll_id(&mut self) -> io::Result<Option<u8>> {
        while self.data.is_empty() {
            match self.raw.poll_id()? {
                Some(head) => self.read_message(head)?,
                None => return Ok(None),
            }
        }
        Ok(Some(self.data.get_u8()))
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> io::Result<()> {
        while self.data.len() < buf.len() {
            self.next_message()?;
        }
        self.data.copy_to_slice(buf);
        Ok(())
    }
}

/// Write half: every send becomes one binary message.
#[derive(Debug)]
pub struct WsOutbound<O> {
    raw: O,
    buf: BytesMut,
}

impl<O: Outbound> WsOutbound<O> {
    pub fn new(raw: O) -> Self {
        Self {
            raw,
            buf: BytesMut::new(),
        }
    }
}

/// Write an unmasked server message header for `len` payload bytes.
pub fn put_header(buf: &mut BytesMut, opcode: u8, len: usize) {
    buf.put_u8(FIN | opcode);
    if len < 126 {
        buf.put_u8(len as u8);
    } else if let Ok(short) = u16::try_from(len) {
        buf.put_u8(126);
        buf.put_u16(short);
    } else {
        buf.put_u8(127);
        buf.put_u64(len as u64);
    }
}

impl<O: Outbound> Outbound for WsOutbound<O> {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buf.clear();
        put_header(&mut self.buf, OP_BINARY, bytes.len());
        self.buf.put_slice(bytes);
        self.raw.send(&self.buf)
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.raw.send(&[FIN | OP_CLOSE, 0]) {
            debug!(error = %e, "Close frame not delivered");
        }
        self.raw.shutdown();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::transport::memory::memory_transport;
    use std::io::Cursor;

    fn client_message(opcode: u8, payload: &[u8]) -> Vec<u8> {
        let mask = [0x12, 0x34, 0x56, 0x78];
        let mut out = vec![FIN | opcode];
        if payload.len() < 126 {
            out.push(MASKED | payload.len() as u8);
        } else {
            out.push(MASKED | 126);
            out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        }
        out.extend_from_slice(&mask);
        out.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
        out
    }

    #[test]
    fn accept_key_matches_rfc_example() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn upgrade_detection_ignores_case() {
        assert!(is_upgrade_request(b"GET / HTTP/1.1"));
        assert!(is_upgrade_request(b"get /"));
        assert!(!is_upgrade_request(&[0x00, 0x07, b'A', b'l', b'i']));
        assert!(!is_upgrade_request(b"GET"));
    }

    /// Request bytes in, response bytes out.
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn upgrade_answers_with_accept_and_protocol() {
        let request = "GET / HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\n\
                       Connection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                       Sec-WebSocket-Protocol: ClassiCube\r\n\r\n";
        let mut stream = Duplex {
            input: Cursor::new(request.as_bytes().to_vec()),
            output: Vec::new(),
        };
        let parsed = upgrade(&mut stream).unwrap();
        assert_eq!(parsed.protocol.as_deref(), Some("ClassiCube"));

        let response = String::from_utf8(stream.output).unwrap();
        assert!(response.starts_with("HTTP/1.1 101"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(response.contains("Sec-WebSocket-Protocol: ClassiCube\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }

    #[test]
    fn upgrade_without_key_is_refused() {
        let mut stream = Duplex {
            input: Cursor::new(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".to_vec()),
            output: Vec::new(),
        };
        let err = upgrade(&mut stream).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(stream.output.starts_with(b"HTTP/1.1 400"));
    }

    #[test]
    fn several_game_frames_in_one_read() {
        let (raw, _out, peer) = memory_transport();
        let mut inbound = WsInbound::new(raw);

        // Two messages in a single push: the first carries a whole 3-byte
        // frame plus the id of the next one, the second carries the rest.
        let mut wire = client_message(OP_BINARY, &[0x08, 1, 2, 0x0D]);
        wire.extend(client_message(OP_BINARY, &[7, 8, 9]));
        peer.push(&wire);

        assert_eq!(inbound.poll_id().unwrap(), Some(0x08));
        let mut first = [0u8; 2];
        inbound.read_payload(&mut first).unwrap();
        assert_eq!(first, [1, 2]);

        assert_eq!(inbound.poll_id().unwrap(), Some(0x0D));
        let mut second = [0u8; 3];
        inbound.read_payload(&mut second).unwrap();
        assert_eq!(second, [7, 8, 9]);

        assert_eq!(inbound.poll_id().unwrap(), None);
    }

    #[test]
    fn long_messages_use_extended_length() {
        let (raw, _out, peer) = memory_transport();
        let mut inbound = WsInbound::new(raw);
        let payload: Vec<u8> = (0..300u16).map(|i| i as u8).collect();
        peer.push(&client_message(OP_BINARY, &payload));

        assert_eq!(inbound.poll_id().unwrap(), Some(0));
        let mut rest = vec![0u8; 299];
        inbound.read_payload(&mut rest).unwrap();
        assert_eq!(rest[..], payload[1..]);
    }

    #[test]
    fn pings_are_skipped_and_close_ends_the_stream() {
        let (raw, _out, peer) = memory_transport();
        let mut inbound = WsInbound::new(raw);
        peer.push(&client_message(0x9, b"hi"));
        assert_eq!(inbound.poll_id().unwrap(), None);

        peer.push(&client_message(OP_CLOSE, &[]));
        let err = inbound.poll_id().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    }

    #[test]
    fn sends_are_wrapped_in_binary_messages() {
        let (_in, raw, peer) = memory_transport();
        let mut outbound = WsOutbound::new(raw);
        outbound.send(&[0x0E, 9]).unwrap();
        outbound.send(&[0x03; 1028]).unwrap();
        outbound.shutdown();

        let sent = peer.sent();
        assert_eq!(&sent[0][..], &[FIN | OP_BINARY, 2, 0x0E, 9]);
        assert_eq!(&sent[1][..4], &[FIN | OP_BINARY, 126, 0x04, 0x04]);
        assert_eq!(sent[1].len(), 4 + 1028);
        assert_eq!(&sent[2][..], &[FIN | OP_CLOSE, 0]);
        assert!(peer.is_shutdown());
    }
}
