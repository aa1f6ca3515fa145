//! SMTP submission: the external collaborator side of the gateway.
//!
//! Scope per the gateway design: AUTH + DATA, a MIME parse for logging
//! and subject extraction, then a JSON POST to the upstream. No queue,
//! no retry-on-deferral, no DSN generation -- submission is accepted or
//! rejected synchronously within the SMTP transaction.

pub mod relay;
pub mod server;
