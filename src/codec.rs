//! Framing for the line protocol.
//!
//! The stream is a sequence of `\n`-terminated text lines, except that a
//! `FILE <name> <size>\n` line is followed by exactly `<size>` raw bytes.
//! Readers pick the mode explicitly: [`FrameReader::read_line`] for lines,
//! [`FrameReader::read_exact`] / [`FrameReader::copy_exact`] for payloads.
//! Content is never sniffed after the fact.

use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::utils::error::ProtocolError;

/// Bytes requested from the socket per read.
pub const RECV_BUF: usize = 4096;
/// Chunk size used when streaming a file payload.
pub const CHUNK_SIZE: usize = 4096;
/// Longest line accepted before the terminator.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Header announcing a file payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Base name of the file; may contain spaces.
    pub name: String,
    /// Exact number of payload bytes that follow the header line.
    pub size: u64,
}

impl FileHeader {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self { name: name.into(), size }
    }

    /// Parses a line as a `FILE <name> <size>` header.
    ///
    /// The name is every token between the keyword and the size, rejoined
    /// with single spaces.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidHeader` for any line that isn't a header.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 || !parts[0].eq_ignore_ascii_case("FILE") {
            return Err(ProtocolError::InvalidHeader(line.to_string()));
        }

        let size = parts[parts.len() - 1]
            .parse::<u64>()
            .map_err(|_| ProtocolError::InvalidHeader(line.to_string()))?;
        let name = parts[1..parts.len() - 1].join(" ");

        Ok(Self { name, size })
    }

    /// Returns the header line, terminator included.
    pub fn to_line(&self) -> String {
        format!("FILE {} {}\n", self.name, self.size)
    }
}

impl fmt::Display for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.name, self.size)
    }
}

/// Buffered reader with line mode and exact-byte mode over one stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(RECV_BUF),
        }
    }

    /// Pulls one read's worth of bytes into the buffer. Returns `0` on EOF.
    async fn fill(&mut self) -> Result<usize, ProtocolError> {
        let mut chunk = [0u8; RECV_BUF];
        let n = self.inner.read(&mut chunk).await?;
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Reads one line, without its terminator.
    ///
    /// Returns `Ok(None)` when the stream ends before any byte of the line
    /// arrived. A line cut short by EOF is returned as-is.
    ///
    /// # Errors
    /// Returns `ProtocolError::LineTooLong` for a line longer than
    /// [`MAX_LINE_LEN`] bytes, however it was split across reads.
    pub async fn read_line(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        self.next_line(true).await
    }

    /// Reads one complete, terminated line.
    ///
    /// Unlike [`read_line`](Self::read_line), bytes left without a `\n` when
    /// the stream ends are discarded and reported as `Ok(None)`.
    pub async fn read_complete_line(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        self.next_line(false).await
    }

    async fn next_line(&mut self, keep_partial: bool) -> Result<Option<Vec<u8>>, ProtocolError> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buf[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + pos;
                if end > MAX_LINE_LEN {
                    return Err(ProtocolError::LineTooLong(MAX_LINE_LEN));
                }
                let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                line.pop();
                return Ok(Some(line));
            }
            scanned = self.buf.len();
            if scanned > MAX_LINE_LEN {
                return Err(ProtocolError::LineTooLong(MAX_LINE_LEN));
            }

            if self.fill().await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let tail = std::mem::take(&mut self.buf);
                if !keep_partial {
                    trace!("Discarding {} unterminated bytes at EOF", tail.len());
                    return Ok(None);
                }
                return Ok(Some(tail));
            }
        }
    }

    /// Reads one line and decodes it, replacing invalid UTF-8.
    pub async fn read_text_line(&mut self) -> Result<Option<String>, ProtocolError> {
        Ok(self
            .read_line()
            .await?
            .map(|line| String::from_utf8_lossy(&line).into_owned()))
    }

    /// Reads one complete line and decodes it, replacing invalid UTF-8.
    pub async fn read_complete_text_line(&mut self) -> Result<Option<String>, ProtocolError> {
        Ok(self
            .read_complete_line()
            .await?
            .map(|line| String::from_utf8_lossy(&line).into_owned()))
    }

    /// Reads exactly `len` bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::ConnectionClosed` if the stream ends first.
    pub async fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        while self.buf.len() < len {
            if self.fill().await? == 0 {
                return Err(ProtocolError::ConnectionClosed {
                    expected: len as u64,
                    received: self.buf.len() as u64,
                });
            }
        }
        Ok(self.buf.drain(..len).collect())
    }

    /// Streams exactly `len` bytes into `sink` without holding them all in memory.
    ///
    /// # Errors
    /// Returns `ProtocolError::ConnectionClosed` if the stream ends first.
    pub async fn copy_exact<W>(&mut self, len: u64, sink: &mut W) -> Result<u64, ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut copied = 0u64;
        while copied < len {
            if self.buf.is_empty() && self.fill().await? == 0 {
                return Err(ProtocolError::ConnectionClosed {
                    expected: len,
                    received: copied,
                });
            }
            let remaining = usize::try_from(len - copied).unwrap_or(usize::MAX);
            let take = self.buf.len().min(remaining);
            sink.write_all(&self.buf[..take]).await?;
            self.buf.drain(..take);
            copied += take as u64;
        }
        sink.flush().await?;
        trace!("Copied {} payload bytes", copied);
        Ok(copied)
    }

    /// Returns whatever is buffered, or the result of one read if nothing is.
    ///
    /// Returns `Ok(None)` on EOF.
    pub async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        if self.buf.is_empty() && self.fill().await? == 0 {
            return Ok(None);
        }
        Ok(Some(std::mem::take(&mut self.buf)))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writer for text replies, file headers and payloads.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes a text reply, adding the `\n` terminator unless it is already there.
    ///
    /// The reply goes out in a single write so readers can take it as one chunk.
    pub async fn write_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Writes a `FILE` header line.
    pub async fn write_header(&mut self, header: &FileHeader) -> Result<(), ProtocolError> {
        self.inner.write_all(header.to_line().as_bytes()).await?;
        Ok(())
    }

    /// Streams exactly `header.size` bytes from `source` in [`CHUNK_SIZE`] pieces.
    ///
    /// Extra source bytes past the announced size are not sent.
    ///
    /// # Errors
    /// Returns `ProtocolError::ShortPayload` if `source` runs dry early. The
    /// receiver is out of sync at that point, so the connection must be dropped.
    pub async fn write_payload<S>(
        &mut self,
        header: &FileHeader,
        source: &mut S,
    ) -> Result<u64, ProtocolError>
    where
        S: AsyncRead + Unpin,
    {
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut sent = 0u64;
        while sent < header.size {
            let want = usize::try_from(header.size - sent)
                .unwrap_or(usize::MAX)
                .min(CHUNK_SIZE);
            let n = source.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(ProtocolError::ShortPayload {
                    name: header.name.clone(),
                    expected: header.size,
                    sent,
                });
            }
            self.inner.write_all(&chunk[..n]).await?;
            sent += n as u64;
        }
        self.inner.flush().await?;
        Ok(sent)
    }

    /// Writes a header followed by its payload.
    pub async fn write_file<S>(
        &mut self,
        header: &FileHeader,
        source: &mut S,
    ) -> Result<u64, ProtocolError>
    where
        S: AsyncRead + Unpin,
    {
        self.write_header(header).await?;
        self.write_payload(header, source).await
    }

    /// Writes raw bytes; used by clients to send command lines.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.inner.write_all(bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
