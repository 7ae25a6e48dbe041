//! TCP transport and CRLF line framing.
//!
//! # Example
//!
//! ```ignore
//! use amiwire_client::transport::open_stream;
//!
//! let stream = open_stream("localhost", 5038).await?;
//! let (mut lines, write_half) = stream.into_split();
//! while let Some(line) = lines.next_line().await? {
//!     println!("{line:?}");
//! }
//! ```

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::{ManagerError, Result};
use crate::protocol::LINE_TERMINATOR;

/// Read buffer size for the line reader.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Open a TCP connection to the manager interface.
///
/// Any failure to open the socket is reported as
/// [`ManagerError::ConnectionRefused`].
pub async fn open_stream(host: &str, port: u16) -> Result<ManagerStream> {
    let addr = format!("{host}:{port}");
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| ManagerError::ConnectionRefused {
            addr: addr.clone(),
            source,
        })?;
    stream.set_nodelay(true)?;

    let local_addr = stream.local_addr()?;
    let peer_addr = stream.peer_addr()?;
    tracing::debug!(%local_addr, %peer_addr, "socket opened");

    Ok(ManagerStream {
        stream,
        local_addr,
        peer_addr,
    })
}

/// Connected manager socket.
pub struct ManagerStream {
    stream: TcpStream,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl ManagerStream {
    /// Split into a line reader and the raw write half.
    pub fn into_split(self) -> (LineReader<OwnedReadHalf>, OwnedWriteHalf) {
        let (read_half, write_half) = self.stream.into_split();
        (LineReader::new(read_half), write_half)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

/// Splits a byte stream into CRLF-terminated lines.
///
/// A bare `\n` does not end a line; it stays part of the returned text.
pub struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, reader),
            buf: Vec::with_capacity(256),
        }
    }

    /// Read the next line, terminator included.
    ///
    /// Returns `Ok(None)` on EOF. Bytes received after the last terminator are
    /// discarded at EOF.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();

        loop {
            let n = self.reader.read_until(b'\n', &mut self.buf).await?;
            if n == 0 {
                if !self.buf.is_empty() {
                    tracing::debug!(bytes = self.buf.len(), "discarding unterminated input at EOF");
                }
                return Ok(None);
            }
            if self.buf.ends_with(LINE_TERMINATOR.as_bytes()) {
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                return Ok(Some(line));
            }
        }
    }
}
