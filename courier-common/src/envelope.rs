use serde::{Deserialize, Serialize};

use crate::address::{Address, AddressList};

/// The envelope of a queued message: the sender and the ordered set of
/// recipients it should be delivered to.
///
/// Envelopes are immutable once built; the delivery core only reads
/// them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    sender: Address,
    recipients: AddressList,
}

impl Envelope {
    #[must_use]
    pub fn new(sender: Address, recipients: impl Into<AddressList>) -> Self {
        Self {
            sender,
            recipients: recipients.into(),
        }
    }

    /// The envelope sender for this message.
    #[must_use]
    pub const fn sender(&self) -> &Address {
        &self.sender
    }

    /// The envelope recipients for this message.
    #[must_use]
    pub const fn recipients(&self) -> &AddressList {
        &self.recipients
    }
}
