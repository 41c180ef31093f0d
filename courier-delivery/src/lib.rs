//! The outbound delivery core.
//!
//! One long-lived [`HostWorker`] runs per destination domain. It pulls
//! queued messages off its private FIFO inbox, resolves and connects to
//! a remote mail exchange, attempts SMTP-level delivery, and routes
//! failures through a tiered retry schedule until the message is
//! delivered, permanently rejected, or the schedule gives up after
//! roughly 48 hours of retrying.
//!
//! Workers are independent of each other and expose exactly four
//! operations through [`HostHandle`]: enqueue a message, query the idle
//! duration, and a consuming, synchronous-contract stop. Storage and
//! name resolution are collaborators injected behind the
//! [`courier_spool::MessageStore`] and [`MxResolver`] traits.

mod dns;
mod error;
mod negotiate;
mod policy;
mod transact;
mod types;
mod worker;

pub use dns::{DnsConfig, DnsResolver, MailExchange, MxResolver, ResolveError};
pub use error::{DeliveryError, FailureClass, PermanentError, TransientError};
pub use policy::RetryPolicy;
pub use types::{DeliveryConfig, SmtpTimeouts};
pub use worker::{HostHandle, HostWorker};
