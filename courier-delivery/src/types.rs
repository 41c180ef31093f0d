//! Configuration types for the delivery core.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::RetryPolicy;

/// Timeouts for individual SMTP operations.
///
/// Every protocol step is bounded so a hung exchange turns into a
/// classified failure instead of a stuck worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpTimeouts {
    /// Timeout for establishing the TCP connection.
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,

    /// Timeout for the server greeting.
    #[serde(default = "default_greeting_secs")]
    pub greeting_secs: u64,

    /// Timeout for EHLO.
    #[serde(default = "default_ehlo_secs")]
    pub ehlo_secs: u64,

    /// Timeout for STARTTLS and the TLS handshake.
    #[serde(default = "default_starttls_secs")]
    pub starttls_secs: u64,

    /// Timeout for MAIL FROM.
    #[serde(default = "default_mail_from_secs")]
    pub mail_from_secs: u64,

    /// Timeout for each RCPT TO.
    #[serde(default = "default_rcpt_to_secs")]
    pub rcpt_to_secs: u64,

    /// Timeout for DATA and for streaming the message body.
    ///
    /// Longer than the others to accommodate large messages.
    #[serde(default = "default_data_secs")]
    pub data_secs: u64,

    /// Timeout for RSET.
    #[serde(default = "default_rset_secs")]
    pub rset_secs: u64,

    /// Timeout for QUIT.
    #[serde(default = "default_quit_secs")]
    pub quit_secs: u64,
}

impl SmtpTimeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn greeting(&self) -> Duration {
        Duration::from_secs(self.greeting_secs)
    }

    #[must_use]
    pub const fn ehlo(&self) -> Duration {
        Duration::from_secs(self.ehlo_secs)
    }

    #[must_use]
    pub const fn starttls(&self) -> Duration {
        Duration::from_secs(self.starttls_secs)
    }

    #[must_use]
    pub const fn mail_from(&self) -> Duration {
        Duration::from_secs(self.mail_from_secs)
    }

    #[must_use]
    pub const fn rcpt_to(&self) -> Duration {
        Duration::from_secs(self.rcpt_to_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    #[must_use]
    pub const fn rset(&self) -> Duration {
        Duration::from_secs(self.rset_secs)
    }

    #[must_use]
    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            greeting_secs: default_greeting_secs(),
            ehlo_secs: default_ehlo_secs(),
            starttls_secs: default_starttls_secs(),
            mail_from_secs: default_mail_from_secs(),
            rcpt_to_secs: default_rcpt_to_secs(),
            data_secs: default_data_secs(),
            rset_secs: default_rset_secs(),
            quit_secs: default_quit_secs(),
        }
    }
}

const fn default_connect_secs() -> u64 {
    30
}

const fn default_greeting_secs() -> u64 {
    30
}

const fn default_ehlo_secs() -> u64 {
    30
}

const fn default_starttls_secs() -> u64 {
    30
}

const fn default_mail_from_secs() -> u64 {
    30
}

const fn default_rcpt_to_secs() -> u64 {
    30
}

const fn default_data_secs() -> u64 {
    120
}

const fn default_rset_secs() -> u64 {
    30
}

const fn default_quit_secs() -> u64 {
    10
}

/// Configuration for a host worker.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Name announced in EHLO. Defaults to the local host name.
    #[serde(default)]
    pub helo_name: Option<String>,

    /// Per-operation SMTP timeouts.
    #[serde(default)]
    pub timeouts: SmtpTimeouts,

    /// The transient-failure retry schedule.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Consecutive transport failures tolerated for one message before
    /// the failure is handled like a transient rejection. Keeps a dead
    /// transport from reconnect-looping without delay.
    #[serde(default = "default_max_transport_failures")]
    pub max_transport_failures: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            helo_name: None,
            timeouts: SmtpTimeouts::default(),
            retry: RetryPolicy::default(),
            max_transport_failures: default_max_transport_failures(),
        }
    }
}

const fn default_max_transport_failures() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_defaults() {
        let timeouts = SmtpTimeouts::default();
        assert_eq!(timeouts.connect(), Duration::from_secs(30));
        assert_eq!(timeouts.data(), Duration::from_secs(120));
        assert_eq!(timeouts.quit(), Duration::from_secs(10));
    }

    #[test]
    fn config_defaults() {
        let config = DeliveryConfig::default();
        assert!(config.helo_name.is_none());
        assert_eq!(config.max_transport_failures, 3);
        assert_eq!(config.retry.max_tries, 20);
    }
}
