//! An asynchronous SMTP client: plain TCP, upgraded to TLS via STARTTLS
//! when the caller asks for it.

mod error;
mod response;
mod session;

pub use error::{ClientError, Result};
pub use response::Response;
pub use session::SmtpClient;
