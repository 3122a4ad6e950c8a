//! Client connection framing
//!
//! A client uploads each resource as one identifier byte followed by a
//! sequence of messages:
//!
//! ```text
//! [resource:1] ([BATCH:1][count:4]([len:4][line:len])*)* [FIN:1 | ERROR:1]
//! ```
//!
//! All integers are big-endian. Results flow the other way on the same
//! socket as pre-framed result frames, so the write side only ever needs to
//! push complete byte strings.
//!
//! # Design
//!
//! - **Split halves**: [`Stream::split`] hands the read half to the ingest
//!   loop and the write half to the relay loop; neither needs a lock
//! - **Interruptible accept**: [`Listener::shutdown_read`] wakes a pending
//!   [`Listener::accept`] without dropping the socket
//! - **Bounded reads**: line lengths above `max_line_size` are rejected
//!   before anything is allocated

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use analyzer_protocol::{
    MSG_BATCH, MSG_ERROR, MSG_FIN, Message, ProtocolError, Resource,
};

use crate::error::GatewayError;

/// Read buffer per connection
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Upper bound on lines preallocated for one batch
const MAX_PREALLOCATED_LINES: usize = 4096;

/// Listening endpoint for client connections
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl Listener {
    /// Bind and listen with an explicit backlog
    pub async fn bind(host: &str, port: u16, backlog: u32) -> Result<Self, GatewayError> {
        let address = format!("{host}:{port}");
        let bind_err = |source| GatewayError::Bind {
            address: address.clone(),
            source,
        };

        let addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(bind_err)?
            .next()
            .ok_or_else(|| {
                bind_err(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "host did not resolve to any address",
                ))
            })?;

        let inner = Self::listen(addr, backlog).map_err(bind_err)?;
        let local_addr = inner.local_addr().map_err(bind_err)?;

        tracing::info!(address = %local_addr, backlog, "listening for clients");
        Ok(Self {
            inner,
            local_addr,
            shutdown: CancellationToken::new(),
        })
    }

    fn listen(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog.min(i32::MAX as u32) as i32)?;
        socket.set_nonblocking(true)?;

        let std_listener: std::net::TcpListener = socket.into();
        TcpListener::from_std(std_listener)
    }

    /// Wait for the next client
    ///
    /// Returns `Ok(None)` once [`shutdown_read`](Self::shutdown_read) was
    /// called, even if a connection is pending.
    pub async fn accept(&self) -> Result<Option<(Stream, SocketAddr)>, ProtocolError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Ok(None),
            accepted = self.inner.accept() => {
                let (stream, peer) = accepted?;
                Ok(Some((Stream::new(stream), peer)))
            }
        }
    }

    /// Stop accepting; wakes a blocked [`accept`](Self::accept)
    pub fn shutdown_read(&self) {
        self.shutdown.cancel();
    }

    /// Token that triggers [`shutdown_read`](Self::shutdown_read) when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Release the socket
    pub fn close(self) {
        self.shutdown.cancel();
        tracing::debug!(address = %self.local_addr, "listener closed");
    }
}

/// One accepted client connection
#[derive(Debug)]
pub struct Stream {
    inner: TcpStream,
}

impl Stream {
    pub fn new(inner: TcpStream) -> Self {
        Self { inner }
    }

    /// Apply socket options; failures are logged and otherwise ignored
    pub fn configure(&self, nodelay: bool, keepalive: Option<Duration>) {
        if nodelay && let Err(e) = self.inner.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }

        if let Some(idle) = keepalive {
            let keepalive = TcpKeepalive::new().with_time(idle);
            if let Err(e) = SockRef::from(&self.inner).set_tcp_keepalive(&keepalive) {
                tracing::debug!(error = %e, "failed to set TCP keepalive");
            }
        }
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    /// Split into independently owned read and write halves
    pub fn split(
        self,
        max_line_size: usize,
    ) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        let (read, write) = self.inner.into_split();
        (
            FrameReader::new(read, max_line_size),
            FrameWriter::new(write),
        )
    }
}

/// Read side: resource bytes and client messages
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: BufReader<R>,
    max_line_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_line_size: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(READ_BUFFER_SIZE, inner),
            max_line_size,
        }
    }

    /// Read the identifier byte that opens a resource
    pub async fn resource(&mut self) -> Result<Resource, ProtocolError> {
        let id = self.read_u8("resource").await?;
        Resource::from_u8(id).ok_or(ProtocolError::UnknownResource(id))
    }

    /// Read one message
    pub async fn recv(&mut self) -> Result<Message, ProtocolError> {
        match self.read_u8("message kind").await? {
            MSG_BATCH => self.read_batch().await.map(Message::Batch),
            MSG_FIN => Ok(Message::Fin),
            MSG_ERROR => Ok(Message::Error),
            kind => Err(ProtocolError::UnknownMessageKind(kind)),
        }
    }

    /// Wait for the peer to close its side once the upload is complete
    ///
    /// Nothing is expected after the last resource; stray bytes are
    /// discarded.
    pub async fn closed(&mut self) -> Result<(), ProtocolError> {
        let mut scratch = [0u8; 512];
        loop {
            match self.inner.read(&mut scratch).await? {
                0 => return Ok(()),
                n => tracing::trace!(bytes = n, "discarding bytes after upload"),
            }
        }
    }

    async fn read_batch(&mut self) -> Result<Vec<Bytes>, ProtocolError> {
        let count = self.read_u32("line count").await? as usize;
        let mut lines = Vec::with_capacity(count.min(MAX_PREALLOCATED_LINES));

        for _ in 0..count {
            let len = self.read_u32("line length").await? as usize;
            if len > self.max_line_size {
                return Err(ProtocolError::LineTooLarge {
                    size: len,
                    max: self.max_line_size,
                });
            }

            let mut line = vec![0u8; len];
            self.inner
                .read_exact(&mut line)
                .await
                .map_err(|e| ProtocolError::from_read(e, "line"))?;
            lines.push(Bytes::from(line));
        }

        Ok(lines)
    }

    async fn read_u8(&mut self, field: &'static str) -> Result<u8, ProtocolError> {
        self.inner
            .read_u8()
            .await
            .map_err(|e| ProtocolError::from_read(e, field))
    }

    async fn read_u32(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        self.inner
            .read_u32()
            .await
            .map_err(|e| ProtocolError::from_read(e, field))
    }
}

/// Write side: complete frames to the client
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write all bytes and flush before returning
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.inner
            .write_all(bytes)
            .await
            .map_err(ProtocolError::from_write)?;
        self.inner.flush().await.map_err(ProtocolError::from_write)
    }

    /// Half-close the connection
    pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.inner
            .shutdown()
            .await
            .map_err(ProtocolError::from_write)
    }
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod tests;
