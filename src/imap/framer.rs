//! Byte-oriented command framer.
//!
//! IMAP interleaves text commands with raw binary payloads (literals).
//! Confusing byte-length with character-length on multibyte input
//! corrupts APPEND, so this framer is the only place that touches raw
//! bytes for sizing: it never decodes anything as text.
//!
//! A line ends at the first CRLF not inside a pending literal. If a
//! line ends with `{N}` (sync) or `{N+}` (non-sync), the framer emits a
//! continuation request for the sync form, then reads exactly `N` bytes
//! as the literal payload, optionally consumes a trailing CRLF, and
//! delivers the line prefix together with the literal bytes intact.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

const DEFAULT_MAX_LINE: usize = 64 * 1024;
const DEFAULT_MAX_LITERAL: usize = 50 * 1024 * 1024;
const LITERAL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// One framed unit of client input.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A plain command line, CRLF already stripped.
    Line(String),
    /// A line whose tail was a literal spec: `prefix` is the line with
    /// the `{N}` marker removed, `data` is the raw literal payload.
    Literal { prefix: String, data: Vec<u8> },
}

pub struct Framer<R, W> {
    reader: R,
    writer: W,
    buf: Vec<u8>,
    max_line: usize,
    max_literal: usize,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Framer<R, W> {
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buf: Vec::new(),
            max_line: DEFAULT_MAX_LINE,
            max_literal: DEFAULT_MAX_LITERAL,
        }
    }

    #[must_use]
    pub fn with_limits(reader: R, writer: W, max_line: usize, max_literal: usize) -> Self {
        Self {
            reader,
            writer,
            buf: Vec::new(),
            max_line,
            max_literal,
        }
    }

    /// Read the next frame. Returns `Ok(None)` at clean EOF.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(line_bytes) = self.read_line().await? else {
            return Ok(None);
        };

        if let Some((needed, sync)) = literal_marker(&line_bytes) {
            let marker_start = line_bytes.len() - marker_len(&line_bytes);
            let prefix = String::from_utf8_lossy(&line_bytes[..marker_start]).into_owned();

            if needed > self.max_literal {
                return Err(Error::Protocol(format!(
                    "literal of {needed} bytes exceeds maximum of {}",
                    self.max_literal
                )));
            }

            if sync {
                self.emit_continuation().await?;
            }

            let data = self.read_literal(needed).await?;
            self.consume_trailing_crlf().await?;

            return Ok(Some(Frame::Literal { prefix, data }));
        }

        let line = String::from_utf8_lossy(&line_bytes).into_owned();
        Ok(Some(Frame::Line(line)))
    }

    /// Write pre-rendered response bytes (see [`super::response::render_all`])
    /// to the connection and flush.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await.map_err(Error::Io)?;
        self.writer.flush().await.map_err(Error::Io)
    }

    async fn emit_continuation(&mut self) -> Result<()> {
        self.writer
            .write_all(b"+ Ready for literal data\r\n")
            .await
            .map_err(Error::Io)?;
        self.writer.flush().await.map_err(Error::Io)
    }

    async fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line = self.buf[..pos].to_vec();
                self.buf.drain(..pos + 2);
                return Ok(Some(line));
            }
            if self.buf.len() > self.max_line {
                return Err(Error::Protocol(format!(
                    "command line exceeds maximum of {} bytes",
                    self.max_line
                )));
            }
            let mut chunk = [0u8; 4096];
            let n = self
                .reader
                .read(&mut chunk)
                .await
                .map_err(Error::Io)?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(Error::Protocol("connection closed mid-line".into()));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn read_literal(&mut self, needed: usize) -> Result<Vec<u8>> {
        while self.buf.len() < needed {
            let mut chunk = [0u8; 4096];
            let read = tokio::time::timeout(LITERAL_TIMEOUT, self.reader.read(&mut chunk))
                .await
                .map_err(|_| Error::Protocol("literal data timeout".into()))?
                .map_err(Error::Io)?;
            if read == 0 {
                return Err(Error::Protocol("connection closed mid-literal".into()));
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
        let data = self.buf[..needed].to_vec();
        self.buf.drain(..needed);
        Ok(data)
    }

    async fn consume_trailing_crlf(&mut self) -> Result<()> {
        while self.buf.len() < 2 {
            let mut chunk = [0u8; 4096];
            let n = self.reader.read(&mut chunk).await.map_err(Error::Io)?;
            if n == 0 {
                return Ok(());
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
        if self.buf.starts_with(b"\r\n") {
            self.buf.drain(..2);
        }
        Ok(())
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn marker_len(line: &[u8]) -> usize {
    let s = String::from_utf8_lossy(line);
    let trimmed = s.trim_end();
    let close = trimmed.len();
    let open = trimmed.rfind('{').unwrap_or(close);
    close - open
}

/// If `line` ends with `{N}` or `{N+}`, return `(N, sync)` where `sync`
/// is false for the non-sync `+` suffix.
fn literal_marker(line: &[u8]) -> Option<(usize, bool)> {
    let s = std::str::from_utf8(line).ok()?;
    let trimmed = s.trim_end();
    let rest = trimmed.strip_suffix('}')?;
    let open = rest.rfind('{')?;
    let digits = &rest[open + 1..];
    let (digits, sync) = digits
        .strip_suffix('+')
        .map_or((digits, true), |d| (d, false));
    let n: usize = digits.parse().ok()?;
    Some((n, sync))
}
