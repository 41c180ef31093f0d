//! SMTP client support for the courier delivery core.
//!
//! Only the client side of the protocol lives here: the delivery core
//! drives an existing command grammar, it does not redefine it.

pub mod client;

pub use client::{ClientError, Response, SmtpClient};
