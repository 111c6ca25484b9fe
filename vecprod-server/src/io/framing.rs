//! Exact-size frame transport over a byte stream.
//!
//! Wire format: no length prefix on text messages (a message is whatever a
//! single read returns, bounded by [`MAX_MESSAGE_SIZE`]); integers are
//! fixed-width in native byte order.

use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single text message (login, response hash).
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Transport that masks partial reads and treats a closed peer as fatal.
#[derive(Debug)]
pub struct FrameTransport<S> {
    stream: S,
}

impl<S> FrameTransport<S> {
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Release the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + Unpin> FrameTransport<S> {
    /// Read exactly `size` bytes, retrying on short reads.
    ///
    /// A read that returns no data means the peer closed the connection
    /// and fails with [`io::ErrorKind::UnexpectedEof`].
    pub async fn read_exact(&mut self, size: usize) -> io::Result<Bytes> {
        let mut buf = BytesMut::with_capacity(size);
        buf.resize(size, 0);

        let mut filled = 0;
        while filled < size {
            let n = self.stream.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(peer_closed(filled, size));
            }
            filled += n;
        }

        Ok(buf.freeze())
    }

    /// Read one text message: whatever a single read delivers, at most
    /// [`MAX_MESSAGE_SIZE`] bytes, with no terminator required.
    pub async fn read_message(&mut self) -> io::Result<Bytes> {
        let mut buf = BytesMut::with_capacity(MAX_MESSAGE_SIZE);
        buf.resize(MAX_MESSAGE_SIZE, 0);

        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            return Err(peer_closed(0, 1));
        }

        buf.truncate(n);
        Ok(buf.freeze())
    }

    /// Read a native-endian `u32`.
    pub async fn read_u32(&mut self) -> io::Result<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.read_exact(4).await?);
        Ok(u32::from_ne_bytes(raw))
    }

    /// Read a native-endian `u16`.
    pub async fn read_u16(&mut self) -> io::Result<u16> {
        let mut raw = [0u8; 2];
        raw.copy_from_slice(&self.read_exact(2).await?);
        Ok(u16::from_ne_bytes(raw))
    }

    /// Consume and drop `len` bytes.
    pub async fn discard(&mut self, len: u64) -> io::Result<()> {
        let mut limited = (&mut self.stream).take(len);
        let copied = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
        if copied < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("peer closed connection after {} of {} bytes", copied, len),
            ));
        }
        Ok(())
    }
}

impl<S: AsyncWrite + Unpin> FrameTransport<S> {
    /// Write the whole payload and flush.
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    /// Write a native-endian `u32`.
    pub async fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.write_all(&value.to_ne_bytes()).await
    }

    /// Best-effort close of the write side.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

fn peer_closed(received: usize, wanted: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("peer closed connection after {} of {} bytes", received, wanted),
    )
}
