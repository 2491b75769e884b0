//! Line- and byte-oriented access to an accepted connection.
//!
//! [`ConnectionStream`] wraps any duplex byte stream (a `TcpStream` in the
//! server, a `tokio::io::duplex` pipe in tests) and offers the three
//! primitives the HTTP reader needs: read one line, read an exact number of
//! bytes, and write raw bytes back.

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use crate::http::HttpError;

/// Upper bound on a single request or header line.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Buffered duplex stream over one client connection.
pub struct ConnectionStream<S> {
    inner: BufReader<S>,
}

impl<S> ConnectionStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a freshly accepted connection.
    pub fn new(stream: S) -> Self {
        Self {
            inner: BufReader::new(stream),
        }
    }

    /// Reads the next line terminated by `\n`.
    ///
    /// A `\r` directly before the terminator is stripped, so both CRLF and
    /// bare LF framing are accepted. Returns [`HttpError::ConnectionClosed`]
    /// if the peer closes before a full line arrives.
    pub async fn read_line(&mut self) -> Result<String, HttpError> {
        let mut buf = Vec::new();
        let mut limited = (&mut self.inner).take(MAX_LINE_LEN as u64);
        limited.read_until(b'\n', &mut buf).await?;

        if buf.last() != Some(&b'\n') {
            if buf.len() >= MAX_LINE_LEN {
                return Err(HttpError::LineTooLong(MAX_LINE_LEN));
            }
            return Err(HttpError::ConnectionClosed);
        }
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        String::from_utf8(buf).map_err(|_| HttpError::InvalidUtf8)
    }

    /// Reads exactly `len` bytes.
    pub async fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, HttpError> {
        let mut buf = vec![0u8; len];
        if len == 0 {
            return Ok(buf);
        }
        match self.inner.read_exact(&mut buf).await {
            Ok(_) => Ok(buf),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(HttpError::ConnectionClosed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `bytes` and flushes them to the peer.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), HttpError> {
        self.inner.write_all(bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shuts down the write half so the peer sees end-of-stream.
    pub async fn shutdown(&mut self) -> Result<(), HttpError> {
        self.inner.get_mut().shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stream_with(input: &[u8]) -> ConnectionStream<tokio::io::DuplexStream> {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        client.write_all(input).await.unwrap();
        drop(client);
        ConnectionStream::new(server)
    }

    #[tokio::test]
    async fn read_line_strips_crlf_and_lf() {
        let mut stream = stream_with(b"first\r\nsecond\nthird\r\n").await;
        assert_eq!(stream.read_line().await.unwrap(), "first");
        assert_eq!(stream.read_line().await.unwrap(), "second");
        assert_eq!(stream.read_line().await.unwrap(), "third");
    }

    #[tokio::test]
    async fn read_line_keeps_inner_carriage_return() {
        let mut stream = stream_with(b"a\rb\n").await;
        assert_eq!(stream.read_line().await.unwrap(), "a\rb");
    }

    #[tokio::test]
    async fn read_line_reports_closed_connection() {
        let mut stream = stream_with(b"partial").await;
        assert!(matches!(
            stream.read_line().await,
            Err(HttpError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn read_line_rejects_oversized_line() {
        let long = vec![b'x'; MAX_LINE_LEN + 10];
        let mut stream = stream_with(&long).await;
        assert!(matches!(
            stream.read_line().await,
            Err(HttpError::LineTooLong(_))
        ));
    }

    #[tokio::test]
    async fn read_exact_returns_requested_bytes() {
        let mut stream = stream_with(b"header\n{\"a\":1}trailing").await;
        stream.read_line().await.unwrap();
        assert_eq!(stream.read_exact(7).await.unwrap(), b"{\"a\":1}");
    }

    #[tokio::test]
    async fn read_exact_fails_on_short_input() {
        let mut stream = stream_with(b"abc").await;
        assert!(matches!(
            stream.read_exact(10).await,
            Err(HttpError::ConnectionClosed)
        ));
    }
}
