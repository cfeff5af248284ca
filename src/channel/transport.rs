use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{RamDbError, Result};

/// largest message a receiver accepts unless told otherwise
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// largest public key message the server accepts during the handshake
pub const MAX_PUBLIC_KEY_SIZE: usize = 10240;

// bytes of the big-endian length prefix in front of every message
const LENGTH_PREFIX_SIZE: usize = 4;

/// A TCP stream carrying length-prefixed messages.
///
/// Every call to [`send`](FramedStream::send) writes exactly one message and every call to
/// [`receive`](FramedStream::receive) reads exactly one.
#[derive(Debug)]
pub struct FramedStream {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    peer_addr: SocketAddr,
}

impl FramedStream {
    /// wraps a connected stream
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(FramedStream {
            reader: BufReader::new(stream),
            writer,
            peer_addr,
        })
    }

    /// address of the other end of the connection
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// sends `payload` as a single message
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).map_err(|_| RamDbError::FrameTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;
        self.writer.write_all(&len.to_be_bytes())?;
        self.writer.write_all(payload)?;
        self.writer.flush()?;
        trace!(peer = %self.peer_addr, len, "sent message");
        Ok(())
    }

    /// Receives the next message.
    ///
    /// A `timeout` of `None` blocks until a message arrives. Otherwise the timeout bounds the
    /// whole message, however slowly its bytes trickle in.
    ///
    /// # Errors
    /// `FrameTooLarge` if the announced size exceeds `max_size`, `Timeout` if no message
    /// completed in time, `ConnectionClosed` if the peer went away.
    pub fn receive(&mut self, max_size: usize, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        if deadline.is_none() {
            self.reader.get_ref().set_read_timeout(None)?;
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        self.read_full(&mut prefix, deadline)?;
        let len = u32::from_be_bytes(prefix) as usize;
        if len > max_size {
            return Err(RamDbError::FrameTooLarge { size: len, max: max_size });
        }

        let mut payload = vec![0u8; len];
        self.read_full(&mut payload, deadline)?;
        trace!(peer = %self.peer_addr, len, "received message");
        Ok(payload)
    }

    /// fills `buf`, shrinking the socket timeout before every read so `deadline` holds overall
    fn read_full(&mut self, buf: &mut [u8], deadline: Option<Instant>) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            if let Some(deadline) = deadline {
                let remaining = deadline
                    .checked_duration_since(Instant::now())
                    .filter(|remaining| !remaining.is_zero())
                    .ok_or(RamDbError::Timeout)?;
                self.reader.get_ref().set_read_timeout(Some(remaining))?;
            }
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => return Err(RamDbError::ConnectionClosed),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(receive_error(e)),
            }
        }
        Ok(())
    }

    /// closes both directions of the connection, errors are ignored
    pub fn shutdown(&self) {
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
    }
}

fn receive_error(e: io::Error) -> RamDbError {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => RamDbError::Timeout,
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            RamDbError::ConnectionClosed
        }
        _ => RamDbError::Io(e),
    }
}
