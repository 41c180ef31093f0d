//! Message identity and the storage collaborator boundary.
//!
//! The delivery core never owns message bodies: it holds a
//! [`SpooledMessageId`] plus envelope data, reads the body through
//! [`MessageStore::open_body`] when a transaction needs it, and requests
//! deletion exactly once per terminal delivery outcome.

pub mod backends;
pub mod error;
pub mod message;
pub mod store;
pub mod types;

pub use backends::MemoryStore;
pub use error::{Result, SpoolError};
pub use message::Message;
pub use store::{BodyStream, MessageStore};
pub use types::SpooledMessageId;
