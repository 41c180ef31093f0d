use courier_common::envelope::Envelope;
use serde::{Deserialize, Serialize};

use crate::types::SpooledMessageId;

/// A queued piece of mail: its identity and envelope.
///
/// The body stays in the backing store; a `Message` is immutable once
/// enqueued and is only ever deleted from storage, never rewritten.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    id: SpooledMessageId,
    envelope: Envelope,
}

impl Message {
    #[must_use]
    pub const fn new(id: SpooledMessageId, envelope: Envelope) -> Self {
        Self { id, envelope }
    }

    /// The spooled identity of this message.
    #[must_use]
    pub const fn id(&self) -> &SpooledMessageId {
        &self.id
    }

    /// The sender and recipients this message is addressed with.
    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }
}
