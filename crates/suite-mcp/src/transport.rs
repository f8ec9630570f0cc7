//! Transport layer
//!
//! A transport moves framed requests in and framed responses out. The only
//! framing implemented here is newline-delimited JSON:
//!
//! - one UTF-8 JSON document per line
//! - responses never contain embedded newlines
//! - stdin carries requests, stdout carries responses
//! - stderr is left to logging
//!
//! Decoding distinguishes three outcomes ([`Inbound`]): a request, a line
//! that could not be decoded, and end of stream. Malformed lines are logged
//! here and reported to the caller, which decides whether to keep reading.
//!
//! Lines longer than the transport's limit ([`DEFAULT_MAX_LINE_BYTES`] unless
//! changed) are skipped up to the next newline without being buffered and
//! reported as malformed.

use crate::server::{McpServerError, McpServerResult};
use crate::types::{McpRequest, McpResponse};
use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tracing::{debug, info, warn};

/// Default cap on the length of one request line, excluding the newline.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Result of one `receive_request` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A decoded request
    Request(McpRequest),

    /// A line that could not be decoded, with the reason
    Malformed(String),

    /// The input stream is closed
    EndOfStream,
}

/// Byte-level channel connecting callers to the server.
#[async_trait]
pub trait Transport: Send {
    /// Bind the underlying streams and mark the transport connected.
    async fn connect(&mut self) -> McpServerResult<()>;

    /// Release the underlying streams and mark the transport disconnected.
    async fn disconnect(&mut self) -> McpServerResult<()>;

    /// Whether the transport is connected.
    fn is_connected(&self) -> bool;

    /// Write one response frame.
    ///
    /// Fails with [`McpServerError::NotConnected`] while disconnected.
    async fn send_response(&mut self, response: &McpResponse) -> McpServerResult<()>;

    /// Read the next inbound frame.
    ///
    /// Fails with [`McpServerError::NotConnected`] while disconnected.
    async fn receive_request(&mut self) -> McpServerResult<Inbound>;
}

type Opener<R, W> = Box<dyn FnMut() -> io::Result<(R, W)> + Send>;

/// Newline-delimited JSON transport over any async reader/writer pair.
///
/// The streams are bound on [`connect`](Transport::connect) through an opener
/// and dropped on [`disconnect`](Transport::disconnect).
pub struct LineTransport<R, W> {
    label: &'static str,
    opener: Opener<R, W>,
    reader: Option<R>,
    writer: Option<W>,
    max_line_bytes: usize,
}

/// Transport over the process's standard input and output.
pub type StdioTransport = LineTransport<BufReader<Stdin>, Stdout>;

impl<R, W> std::fmt::Debug for LineTransport<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineTransport")
            .field("label", &self.label)
            .field("connected", &self.reader.is_some())
            .finish()
    }
}

impl LineTransport<BufReader<Stdin>, Stdout> {
    /// Creates a transport bound to stdin/stdout on connect.
    pub fn stdio() -> Self {
        Self::with_opener("stdio", || {
            Ok((BufReader::new(tokio::io::stdin()), tokio::io::stdout()))
        })
    }
}

impl Default for LineTransport<BufReader<Stdin>, Stdout> {
    fn default() -> Self {
        Self::stdio()
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a transport that opens its streams with `opener` on every connect.
    pub fn with_opener<F>(label: &'static str, opener: F) -> Self
    where
        F: FnMut() -> io::Result<(R, W)> + Send + 'static,
    {
        Self {
            label,
            opener: Box::new(opener),
            reader: None,
            writer: None,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Set the longest accepted request line in bytes, excluding the newline.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Creates a transport over an existing stream pair.
    ///
    /// The pair can be bound once; connecting again after a disconnect fails.
    pub fn from_streams(reader: R, writer: W) -> Self {
        let mut streams = Some((reader, writer));
        Self::with_opener("streams", move || {
            streams.take().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotConnected, "streams already released")
            })
        })
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn connect(&mut self) -> McpServerResult<()> {
        if self.reader.is_some() {
            debug!(transport = self.label, "Transport already connected");
            return Ok(());
        }

        let (reader, writer) = (self.opener)()?;
        self.reader = Some(reader);
        self.writer = Some(writer);

        info!(transport = self.label, "Transport connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> McpServerResult<()> {
        self.reader = None;
        if let Some(mut writer) = self.writer.take() {
            // Best effort: the peer may already be gone.
            if let Err(e) = writer.flush().await {
                warn!(transport = self.label, error = %e, "Flush on disconnect failed");
            }
        }

        info!(transport = self.label, "Transport disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    async fn send_response(&mut self, response: &McpResponse) -> McpServerResult<()> {
        let writer = self.writer.as_mut().ok_or(McpServerError::NotConnected)?;

        let mut frame = response.to_line()?;
        debug_assert!(
            !frame.contains('\n'),
            "JSON frame must not contain embedded newlines"
        );
        frame.push('\n');

        // Single write so a frame is never interleaved with another.
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;

        debug!(
            request_id = response.request_id.as_deref().unwrap_or("-"),
            is_error = response.is_error,
            "Response sent"
        );
        Ok(())
    }

    async fn receive_request(&mut self) -> McpServerResult<Inbound> {
        let reader = self.reader.as_mut().ok_or(McpServerError::NotConnected)?;

        loop {
            let mut buf = match read_capped_line(reader, self.max_line_bytes).await? {
                LineRead::Line(buf) => buf,
                LineRead::TooLong(len) => {
                    warn!(len, limit = self.max_line_bytes, "Discarding oversized request line");
                    return Ok(Inbound::Malformed(format!(
                        "line of {} bytes exceeds the {} byte limit",
                        len, self.max_line_bytes
                    )));
                }
                LineRead::Eof => {
                    debug!(transport = self.label, "End of input stream");
                    return Ok(Inbound::EndOfStream);
                }
            };

            if buf.ends_with(b"\n") {
                buf.pop();
                if buf.ends_with(b"\r") {
                    buf.pop();
                }
            }

            let line = match String::from_utf8(buf) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Discarding request line with invalid UTF-8");
                    return Ok(Inbound::Malformed(format!("invalid UTF-8: {}", e)));
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            return match McpRequest::from_line(&line) {
                Ok(request) => {
                    debug!(
                        tool = request.tool_name(),
                        request_id = request.request_id().unwrap_or("-"),
                        "Request received"
                    );
                    Ok(Inbound::Request(request))
                }
                Err(e) => {
                    warn!(error = %e, "Discarding malformed request line");
                    Ok(Inbound::Malformed(e.to_string()))
                }
            };
        }
    }
}

enum LineRead {
    Line(Vec<u8>),
    TooLong(usize),
    Eof,
}

/// Read up to and including the next newline, keeping at most `max_len`
/// content bytes. Longer lines are consumed but not kept.
async fn read_capped_line<R>(reader: &mut R, max_len: usize) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut total = 0usize;
    let mut oversized = false;

    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(match (total, oversized) {
                    (0, _) => LineRead::Eof,
                    (_, true) => LineRead::TooLong(total),
                    (_, false) => LineRead::Line(line),
                });
            }

            let (used, done) = match available.iter().position(|b| *b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };
            let content = if done { used - 1 } else { used };

            if !oversized && total + content > max_len {
                oversized = true;
                line = Vec::new();
            }
            if !oversized {
                line.extend_from_slice(&available[..used]);
            }
            (used, done)
        };

        reader.consume(used);
        total += used;

        if done {
            return Ok(if oversized {
                LineRead::TooLong(total)
            } else {
                LineRead::Line(line)
            });
        }
    }
}
