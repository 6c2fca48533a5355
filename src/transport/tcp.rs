//! TCP transport.
//!
//! Both halves share one socket, and the blocking mode is a property of the
//! socket, not the handle. `poll_id` flips the socket to non-blocking for a
//! single-byte probe and back, so the write half must tolerate `WouldBlock`
//! from a write that races with the probe.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::transport::{Inbound, Outbound};

const WRITE_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Split an accepted stream into read and write halves.
pub fn split_tcp(stream: TcpStream) -> io::Result<(TcpInbound, TcpOutbound, SocketAddr)> {
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    let writer = stream.try_clone()?;
    Ok((TcpInbound { stream }, TcpOutbound { stream: writer }, peer))
}

#[derive(Debug)]
pub struct TcpInbound {
    stream: TcpStream,
}

impl Inbound for TcpInbound {
    fn poll_id(&mut self) -> io::Result<Option<u8>> {
        let mut id = [0u8; 1];
        self.stream.set_nonblocking(true)?;
        let result = self.stream.read(&mut id);
        self.stream.set_nonblocking(false)?;

        match result {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            )),
            Ok(_) => Ok(Some(id[0])),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.stream.read_exact(buf)
    }
}

#[derive(Debug)]
pub struct TcpOutbound {
    stream: TcpStream,
}

impl Outbound for TcpOutbound {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted no bytes",
                    ))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(WRITE_RETRY_DELAY);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Write) {
            debug!(error = %e, "Socket shutdown failed");
        }
    }
}
