#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Mail access gateway library.
//!
//! Terminates SMTP submission and IMAP4rev1 on the client side and
//! translates both into calls against a remote REST mailbox service.
//! The gateway owns no mail storage; the upstream service is the sole
//! source of truth. See [`imap::server::handle_connection`] and
//! [`smtp::server::handle_connection`] for the two accept loops, and
//! [`upstream::adapter::ApiClient`] for the cached upstream façade that
//! both protocols dispatch through.

pub mod cache;
pub mod config;
pub mod error;
pub mod flag;
pub mod folder;
pub mod imap;
pub mod smtp;
pub mod tls;
pub mod upstream;

pub use config::GatewayConfig;
pub use error::{Error, Result};
