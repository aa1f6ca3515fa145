//! IMAP4rev1 protocol engine: the byte-accurate framer, command parser,
//! per-connection session state machine, command dispatcher, and wire
//! response formatter, plus the per-connection accept loop in
//! [`server`] that wires them together over a real socket.

pub mod commands;
pub mod dispatcher;
pub mod formatter;
pub mod framer;
pub mod parser;
pub mod response;
pub mod rfc822;
pub mod server;
pub mod session;
