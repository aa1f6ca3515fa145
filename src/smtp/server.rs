//! Per-connection accept loop for SMTP submission.
//!
//! Unlike the IMAP framer, SMTP has no literal/byte-length grammar --
//! every unit of input is a line, including the raw message lines
//! collected during `DATA`. The one piece of transport complexity is
//! `STARTTLS`: the socket is upgraded to TLS mid-connection, and any
//! bytes still sitting in the line reader's buffer past the `STARTTLS`
//! command itself must be discarded rather than reinterpreted, per
//! RFC 3207's command-injection guard.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::upstream::Upstream;

use super::relay::SmtpSession;

const GREETING: &str = "220 Transmit SMTP Ready";
const MAX_LINE: usize = 16 * 1024;

/// Either side of a `STARTTLS` upgrade. Both variants are `Unpin`, so
/// `Conn` can implement `AsyncRead`/`AsyncWrite` by matching on
/// `get_mut()` without pin-projection machinery.
enum Conn {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Conn {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Conn {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Drive one accepted SMTP connection to completion.
///
/// `tls_acceptor` is `None` in development (TLS disabled entirely, so
/// `STARTTLS` is never advertised and `require_tls` is false).
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    upstream: Arc<dyn Upstream>,
    cache: Arc<CacheManager>,
    max_message_size: u64,
    tls_acceptor: Option<Arc<TlsAcceptor>>,
) {
    let require_tls = tls_acceptor.is_some();
    let mut session = SmtpSession::new(upstream, cache, max_message_size, require_tls, false);
    let mut reader = BufReader::new(Conn::Plain(stream));

    if write_line(&mut reader, GREETING).await.is_err() {
        return;
    }

    loop {
        let mut raw = String::new();
        let n = match reader.read_line(&mut raw).await {
            Ok(n) => n,
            Err(e) => {
                warn!(%peer, error = %e, "smtp read error, closing connection");
                break;
            }
        };
        if n == 0 {
            debug!(%peer, "connection closed by peer");
            break;
        }
        if raw.len() > MAX_LINE {
            let _ = write_line(&mut reader, "500 5.5.2 Line too long").await;
            break;
        }

        let outcome = session.handle_line(&raw).await;
        let mut write_failed = false;
        for line in &outcome.lines {
            if write_line(&mut reader, line).await.is_err() {
                write_failed = true;
                break;
            }
        }
        if write_failed {
            break;
        }

        if outcome.start_tls {
            let Some(acceptor) = tls_acceptor.clone() else {
                warn!(%peer, "STARTTLS accepted with no configured acceptor");
                break;
            };
            let Conn::Plain(tcp) = reader.into_inner() else {
                unreachable!("STARTTLS only runs once, before any upgrade");
            };
            match acceptor.accept(tcp).await {
                Ok(tls) => {
                    reader = BufReader::new(Conn::Tls(Box::new(tls)));
                    session.mark_tls_active();
                }
                Err(e) => {
                    warn!(%peer, error = %e, "TLS handshake after STARTTLS failed");
                    break;
                }
            }
            continue;
        }

        if outcome.close {
            break;
        }
    }

    info!(%peer, "SMTP connection ended");
}

async fn write_line(reader: &mut BufReader<Conn>, line: &str) -> io::Result<()> {
    reader.get_mut().write_all(line.as_bytes()).await?;
    reader.get_mut().write_all(b"\r\n").await?;
    reader.get_mut().flush().await
}
