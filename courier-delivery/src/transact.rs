//! The delivery transaction: envelope, recipients, body.

use courier_smtp::{Response, SmtpClient};
use courier_spool::{Message, MessageStore};
use tokio::time::timeout;
use tracing::debug;

use crate::{
    error::{DeliveryError, PermanentError, TransientError},
    types::SmtpTimeouts,
};

/// Drives one complete mail transaction for one message over an
/// established session.
///
/// All recipients ride in a single transaction: the message is one
/// delivery unit, with no per-recipient partial success. The first
/// failing step aborts the rest, and its error decides the message's
/// fate.
pub(crate) struct DeliveryTransaction<'a> {
    store: &'a dyn MessageStore,
    timeouts: &'a SmtpTimeouts,
}

impl<'a> DeliveryTransaction<'a> {
    pub(crate) const fn new(store: &'a dyn MessageStore, timeouts: &'a SmtpTimeouts) -> Self {
        Self { store, timeouts }
    }

    pub(crate) async fn execute(
        &self,
        session: &mut SmtpClient,
        message: &Message,
    ) -> Result<(), DeliveryError> {
        let mut body = self.store.open_body(message.id()).await?;

        let sender = message.envelope().sender().to_string();
        let response = timeout(self.timeouts.mail_from(), session.mail_from(&sender))
            .await
            .map_err(|_| TransientError::Timeout {
                command: "MAIL FROM",
            })??;
        if !response.is_success() {
            return Err(rejection("MAIL FROM", &response));
        }

        let recipients = message.envelope().recipients();
        if recipients.is_empty() {
            return Err(PermanentError::Protocol("message has no recipients".to_string()).into());
        }
        for recipient in recipients.iter() {
            let response = timeout(
                self.timeouts.rcpt_to(),
                session.rcpt_to(&recipient.to_string()),
            )
            .await
            .map_err(|_| TransientError::Timeout { command: "RCPT TO" })??;
            if !response.is_success() {
                return Err(rejection("RCPT TO", &response));
            }
        }

        let response = timeout(self.timeouts.data(), session.data())
            .await
            .map_err(|_| TransientError::Timeout { command: "DATA" })??;
        if !(300..400).contains(&response.code) {
            return Err(rejection("DATA", &response));
        }

        let response = timeout(self.timeouts.data(), session.send_body(&mut body))
            .await
            .map_err(|_| TransientError::Timeout {
                command: "message body",
            })??;
        if !response.is_success() {
            return Err(rejection("message body", &response));
        }

        debug!(id = %message.id(), "transaction accepted");
        Ok(())
    }
}

/// 4xx replies are transient; any other non-success reply is permanent.
fn rejection(command: &'static str, response: &Response) -> DeliveryError {
    if response.is_temporary_error() {
        TransientError::Rejected {
            command,
            code: response.code,
            message: response.message(),
        }
        .into()
    } else {
        PermanentError::Rejected {
            command,
            code: response.code,
            message: response.message(),
        }
        .into()
    }
}
