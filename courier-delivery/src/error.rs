//! Failure classification for delivery attempts.
//!
//! Every failed attempt falls into one of three classes, and the class
//! alone decides what the worker does next: reconnect immediately, back
//! off and retry, or drop the message.

use courier_smtp::ClientError;
use courier_spool::SpoolError;
use thiserror::Error;

/// How a failed delivery attempt is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Low-level I/O failure on an established session. A fresh
    /// connection is worth trying without delay, so this never consumes
    /// a retry tier.
    Transport,
    /// Temporary condition; the same message is retried after the
    /// tier-determined delay.
    Transient,
    /// The message will never be accepted as sent; it is dropped.
    Permanent,
}

/// An error from a single delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport died underneath an established session.
    #[error("transport failure: {0}")]
    Transport(ClientError),

    /// A temporary failure, retried on the tiered backoff schedule.
    #[error("transient failure: {0}")]
    Transient(#[from] TransientError),

    /// A failure that can never succeed for this message as sent.
    #[error("permanent failure: {0}")]
    Permanent(#[from] PermanentError),
}

/// Temporary failures.
#[derive(Debug, Error)]
pub enum TransientError {
    /// The remote rejected a command with a 4xx reply.
    #[error("{command} rejected: {code} {message}")]
    Rejected {
        command: &'static str,
        code: u16,
        message: String,
    },

    /// A protocol step did not complete within its timeout.
    #[error("{command} timed out")]
    Timeout { command: &'static str },

    /// Every candidate mail exchange for the domain failed, or none
    /// exist.
    #[error("no reachable mail exchange for {domain}")]
    NoReachableExchange { domain: String },
}

/// Failures terminal for the message (but never for the worker).
#[derive(Debug, Error)]
pub enum PermanentError {
    /// The remote rejected a command with a 5xx (or otherwise
    /// non-temporary) reply.
    #[error("{command} rejected: {code} {message}")]
    Rejected {
        command: &'static str,
        code: u16,
        message: String,
    },

    /// The peer broke the reply grammar.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The message body could not be read from storage.
    #[error("storage error: {0}")]
    Storage(#[from] SpoolError),
}

impl DeliveryError {
    /// The retry class this failure falls into.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::Transport(_) => FailureClass::Transport,
            Self::Transient(_) => FailureClass::Transient,
            Self::Permanent(_) => FailureClass::Permanent,
        }
    }
}

impl From<ClientError> for DeliveryError {
    fn from(error: ClientError) -> Self {
        match error {
            // Socket-level failures mean the transport died, not that the
            // remote party rejected anything.
            ClientError::Io(_) | ClientError::ConnectionClosed => Self::Transport(error),
            ClientError::Protocol(message) | ClientError::Tls(message) => {
                Self::Permanent(PermanentError::Protocol(message))
            }
        }
    }
}

impl From<SpoolError> for DeliveryError {
    fn from(error: SpoolError) -> Self {
        Self::Permanent(PermanentError::Storage(error))
    }
}
