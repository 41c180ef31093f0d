//! The storage collaborator interface.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::{Result, SpooledMessageId};

/// A readable stream over a spooled message body.
pub type BodyStream = Box<dyn AsyncRead + Send + Unpin>;

/// Backing storage for queued message bodies.
///
/// The delivery core treats storage as an external collaborator: a body
/// remains independently readable any number of times until the message
/// is deleted, and deletion is requested exactly once per terminal
/// delivery outcome.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Open the message body for reading.
    async fn open_body(&self, id: &SpooledMessageId) -> Result<BodyStream>;

    /// Remove the message and its body from storage.
    async fn delete(&self, id: &SpooledMessageId) -> Result<()>;
}
