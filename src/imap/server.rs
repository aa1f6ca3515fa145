//! Per-connection accept loop.
//!
//! Wires the framer, parser, session state machine, dispatcher and
//! formatter together over one accepted socket. Each connection owns
//! its `Session` and its half of the framer end-to-end -- nothing here
//! is shared across connections except the `Upstream` client and the
//! `CacheManager`, both `Arc`-shared and injected from `main`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::upstream::adapter::ApiClient;
use crate::upstream::Upstream;

use super::dispatcher;
use super::formatter;
use super::framer::{Frame, Framer};
use super::parser::parse_command;
use super::response::{render_all, Response};
use super::session::{Session, SessionState};

const GREETING: &str =
    "* OK [CAPABILITY IMAP4rev1 IDLE NAMESPACE UIDPLUS MOVE SPECIAL-USE] Transmit IMAP Ready\r\n";

/// Drive one accepted IMAP connection to completion. Returns once the
/// client logs out, disconnects, or a framing error closes the socket.
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    upstream: Arc<dyn Upstream>,
    cache: Arc<CacheManager>,
    idle_timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut framer = Framer::new(reader, writer);
    let mut session = Session::new(idle_timeout.min(Duration::from_secs(28 * 60)));
    // No API key is known until LOGIN/AUTHENTICATE succeeds; an empty
    // key is never sent upstream because every pre-auth command other
    // than those two is answered without consulting the client.
    let mut client = ApiClient::new(upstream.clone(), cache.clone(), String::new());

    if framer.write_all(GREETING.as_bytes()).await.is_err() {
        return;
    }

    loop {
        let next = match tokio::time::timeout(session.idle_timeout, framer.next_frame()).await {
            Ok(result) => result,
            Err(_elapsed) if session.idling => {
                let responses = dispatcher::end_idle(&mut session, true);
                if framer.write_all(&render_all(&responses)).await.is_err() {
                    break;
                }
                continue;
            }
            Err(_elapsed) => {
                let _ = framer
                    .write_all(&bye("Connection timed out"))
                    .await;
                debug!(%peer, "connection idle timeout, closing");
                break;
            }
        };

        let frame = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(%peer, "connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(%peer, error = %e, "framing error, closing connection");
                let _ = framer
                    .write_all(&render_all(&[Response::untagged_bad(e.short_message())]))
                    .await;
                break;
            }
        };

        match frame {
            Frame::Line(line) => {
                if session.idling {
                    if line.trim().eq_ignore_ascii_case("DONE") {
                        let responses = dispatcher::end_idle(&mut session, false);
                        if framer.write_all(&render_all(&responses)).await.is_err() {
                            break;
                        }
                    } else {
                        debug!(%peer, %line, "ignoring line while idling");
                    }
                    continue;
                }

                let parsed = match parse_command(&line) {
                    Ok(p) => p,
                    Err(e) => {
                        let tag = line.split_whitespace().next().unwrap_or("*");
                        let responses = vec![formatter::to_imap_response(tag, &e)];
                        if framer.write_all(&render_all(&responses)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                if let Some((_, password)) = dispatcher::peek_credentials(&parsed) {
                    client = ApiClient::new(upstream.clone(), cache.clone(), password);
                } else if let Some(key) = session.api_key.clone() {
                    client = ApiClient::new(upstream.clone(), cache.clone(), key);
                }

                let responses = dispatcher::dispatch(&mut session, &client, &parsed).await;
                if framer.write_all(&render_all(&responses)).await.is_err() {
                    break;
                }
                if session.state == SessionState::Logout {
                    break;
                }
            }
            Frame::Literal { prefix, data } => {
                let parsed = match parse_command(&prefix) {
                    Ok(p) => p,
                    Err(e) => {
                        let tag = prefix.split_whitespace().next().unwrap_or("*");
                        let responses = vec![formatter::to_imap_response(tag, &e)];
                        if framer.write_all(&render_all(&responses)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };
                let responses = dispatcher::dispatch_append(&mut session, &client, &parsed, data).await;
                if framer.write_all(&render_all(&responses)).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(%peer, "IMAP connection ended");
}

/// Render an internal error as a closing `BYE` line, used by the
/// listener when the TLS handshake or socket setup itself fails before
/// a `Session` exists.
#[must_use]
pub fn bye(message: &str) -> Vec<u8> {
    format!("* BYE {message}\r\n").into_bytes()
}
