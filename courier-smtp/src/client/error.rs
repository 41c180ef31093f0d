//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

/// Errors produced while driving an SMTP session.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection mid-session.
    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    /// The peer sent a reply that does not follow the SMTP grammar.
    #[error("malformed SMTP reply: {0}")]
    Protocol(String),

    /// TLS negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
