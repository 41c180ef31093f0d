//! Mail-exchange selection and connection negotiation.
//!
//! The connector tries every candidate the resolver produced, in order,
//! until one accepts a session. Negotiating with a single candidate
//! (dial, greeting, EHLO, opportunistic STARTTLS) runs as its own task
//! so it can be raced against the stop signal: a hung exchange can stall
//! at any pre-transaction step, and shutdown must not wait for it.

use std::sync::Arc;

use courier_smtp::{ClientError, Response, SmtpClient};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle, time::timeout};
use tracing::{debug, warn};

use crate::{
    dns::{MailExchange, MxResolver},
    error::TransientError,
    types::{DeliveryConfig, SmtpTimeouts},
};

/// Outcome of negotiating a session for a domain.
pub(crate) enum Negotiation {
    /// A session is established: greeting and EHLO done, TLS upgraded
    /// when the exchange advertised it.
    Connected(SmtpClient),
    /// The stop signal fired before negotiation finished. Not an error.
    Cancelled,
}

/// A failure local to one candidate exchange.
#[derive(Debug, Error)]
pub(crate) enum NegotiateError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("{step} timed out")]
    Timeout { step: &'static str },

    #[error("{step} rejected: {code} {message}")]
    Rejected {
        step: &'static str,
        code: u16,
        message: String,
    },

    #[error("negotiation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Establishes sessions with the first reachable exchange of a domain.
pub(crate) struct Connector {
    resolver: Arc<dyn MxResolver>,
    timeouts: SmtpTimeouts,
    helo_name: String,
}

impl Connector {
    pub(crate) fn new(resolver: Arc<dyn MxResolver>, config: &DeliveryConfig) -> Self {
        let helo_name = config.helo_name.clone().unwrap_or_else(local_host_name);

        Self {
            resolver,
            timeouts: config.timeouts.clone(),
            helo_name,
        }
    }

    /// Try every candidate exchange in resolver order until one accepts
    /// a session. Failed candidates are logged and skipped; an exhausted
    /// (or empty) candidate list is a transient failure.
    pub(crate) async fn connect(
        &self,
        domain: &str,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Negotiation, TransientError> {
        let unreachable = || TransientError::NoReachableExchange {
            domain: domain.to_string(),
        };

        let exchanges = match self.resolver.resolve(domain).await {
            Ok(exchanges) => exchanges,
            Err(error) => {
                warn!(domain, error = %error, "mail exchange resolution failed");
                return Err(unreachable());
            }
        };

        if exchanges.is_empty() {
            warn!(domain, "resolver returned no candidate exchanges");
            return Err(unreachable());
        }

        for exchange in exchanges {
            let host = exchange.host.clone();
            match self.negotiate(exchange, stop).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) => {
                    warn!(domain, exchange = %host, error = %error, "unable to connect to mail exchange");
                }
            }
        }

        Err(unreachable())
    }

    /// Negotiate with a single candidate, racing the handshake task
    /// against the stop signal. On cancellation the task is aborted and
    /// a neutral [`Negotiation::Cancelled`] is returned.
    async fn negotiate(
        &self,
        exchange: MailExchange,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Negotiation, NegotiateError> {
        let mut handshake = spawn_handshake(exchange, self.helo_name.clone(), self.timeouts.clone());

        tokio::select! {
            outcome = &mut handshake => outcome?.map(Negotiation::Connected),
            _ = stop.wait_for(|&stopped| stopped) => {
                handshake.abort();
                Ok(Negotiation::Cancelled)
            }
        }
    }
}

fn spawn_handshake(
    exchange: MailExchange,
    helo_name: String,
    timeouts: SmtpTimeouts,
) -> JoinHandle<Result<SmtpClient, NegotiateError>> {
    tokio::spawn(async move { handshake(&exchange, &helo_name, &timeouts).await })
}

/// Dial, read the greeting, EHLO, and opportunistically upgrade to TLS.
async fn handshake(
    exchange: &MailExchange,
    helo_name: &str,
    timeouts: &SmtpTimeouts,
) -> Result<SmtpClient, NegotiateError> {
    let mut client = timeout(
        timeouts.connect(),
        SmtpClient::connect(&exchange.address(), exchange.host.clone()),
    )
    .await
    .map_err(|_| NegotiateError::Timeout { step: "connect" })??;

    let greeting = timeout(timeouts.greeting(), client.read_greeting())
        .await
        .map_err(|_| NegotiateError::Timeout { step: "greeting" })??;
    if !greeting.is_success() {
        return Err(rejected("greeting", &greeting));
    }

    let ehlo = timeout(timeouts.ehlo(), client.ehlo(helo_name))
        .await
        .map_err(|_| NegotiateError::Timeout { step: "EHLO" })??;
    if !ehlo.is_success() {
        return Err(rejected("EHLO", &ehlo));
    }

    if advertises_starttls(&ehlo) {
        let response = timeout(timeouts.starttls(), client.starttls())
            .await
            .map_err(|_| NegotiateError::Timeout { step: "STARTTLS" })??;
        if !response.is_success() {
            return Err(rejected("STARTTLS", &response));
        }

        // RFC 3207: the session state resets after the TLS handshake.
        let ehlo = timeout(timeouts.ehlo(), client.ehlo(helo_name))
            .await
            .map_err(|_| NegotiateError::Timeout {
                step: "EHLO after STARTTLS",
            })??;
        if !ehlo.is_success() {
            return Err(rejected("EHLO after STARTTLS", &ehlo));
        }

        debug!(exchange = %exchange.host, "session upgraded via STARTTLS");
    }

    Ok(client)
}

fn advertises_starttls(ehlo: &Response) -> bool {
    ehlo.lines
        .iter()
        .any(|line| line.trim().eq_ignore_ascii_case("STARTTLS"))
}

fn rejected(step: &'static str, response: &Response) -> NegotiateError {
    NegotiateError::Rejected {
        step,
        code: response.code,
        message: response.message(),
    }
}

fn local_host_name() -> String {
    gethostname::gethostname()
        .into_string()
        .unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starttls_is_detected_case_insensitively() {
        let ehlo = Response::new(
            250,
            vec!["mock.test".to_string(), "starttls".to_string()],
        );
        assert!(advertises_starttls(&ehlo));

        let ehlo = Response::new(250, vec!["mock.test".to_string(), "SIZE 100".to_string()]);
        assert!(!advertises_starttls(&ehlo));
    }

    #[test]
    fn local_host_name_is_never_empty() {
        assert!(!local_host_name().is_empty());
    }
}
