//! The SMTP client session.

use std::sync::Arc;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{ClientConfig, RootCertStore, pki_types::ServerName},
};
use tracing::warn;

use super::{
    error::{ClientError, Result},
    response::Response,
};

/// Read chunk size for replies and body streaming.
const CHUNK_SIZE: usize = 4096;

/// Upper bound on a buffered reply, so a misbehaving peer cannot grow
/// the buffer without limit.
const MAX_REPLY_BYTES: usize = 1024 * 1024;

/// The underlying byte channel: plain TCP, or TLS after STARTTLS.
enum Channel {
    Clear(TcpStream),
    Encrypted(Box<TlsStream<TcpStream>>),
}

impl Channel {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Clear(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Self::Encrypted(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
        }
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read = match self {
            Self::Clear(stream) => stream.read(buf).await?,
            Self::Encrypted(stream) => stream.read(buf).await?,
        };
        if read == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(read)
    }

    /// Wrap the plain stream in TLS, verifying against the platform's
    /// root certificates.
    async fn encrypt(self, server_name: &str) -> Result<Self> {
        let Self::Clear(stream) = self else {
            return Err(ClientError::Tls("session is already encrypted".to_string()));
        };

        let mut roots = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            roots
                .add(cert)
                .map_err(|err| ClientError::Tls(format!("failed to add root certificate: {err}")))?;
        }
        if !certs.errors.is_empty() {
            warn!(errors = ?certs.errors, "some root certificates could not be loaded");
        }

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|err| ClientError::Tls(format!("invalid server name: {err}")))?;

        let stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|err| ClientError::Tls(err.to_string()))?;

        Ok(Self::Encrypted(Box::new(stream)))
    }
}

/// A client-side SMTP session.
///
/// Commands are sent one at a time; every command reads exactly one
/// (possibly multi-line) reply. The session does no policy of its own:
/// callers inspect the returned [`Response`] codes.
pub struct SmtpClient {
    channel: Option<Channel>,
    buffer: Vec<u8>,
    server_name: String,
}

impl SmtpClient {
    /// Open a TCP connection to `addr`.
    ///
    /// `server_name` is the name presented for certificate verification
    /// if the session is later upgraded via [`starttls`](Self::starttls).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(addr: &str, server_name: impl Into<String>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self {
            channel: Some(Channel::Clear(stream)),
            buffer: Vec::new(),
            server_name: server_name.into(),
        })
    }

    /// Read the greeting the server opens the session with.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_reply().await
    }

    /// Send one command line and read its reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        let line = format!("{command}\r\n");
        self.channel_mut()?.send(line.as_bytes()).await?;
        self.read_reply().await
    }

    /// Send `EHLO` with the given client name.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, name: &str) -> Result<Response> {
        self.command(&format!("EHLO {name}")).await
    }

    /// Send `MAIL FROM` for the envelope sender.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, sender: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{sender}>")).await
    }

    /// Send `RCPT TO` for one recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, recipient: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{recipient}>")).await
    }

    /// Send `DATA`; the server answers 354 when it is ready for the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Stream the message body, terminate it with `<CRLF>.<CRLF>`, and
    /// read the server's verdict.
    ///
    /// The body is copied as-is apart from guaranteeing a trailing CRLF
    /// before the dot terminator.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the body, sending, or reading the
    /// reply fails.
    pub async fn send_body<R>(&mut self, body: &mut R) -> Result<Response>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let channel = self.channel.as_mut().ok_or(ClientError::ConnectionClosed)?;

        let mut chunk = [0u8; CHUNK_SIZE];
        let mut tail = [0u8; 2];
        loop {
            let read = body.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            channel.send(&chunk[..read]).await?;
            if read >= 2 {
                tail.copy_from_slice(&chunk[read - 2..read]);
            } else {
                tail = [tail[1], chunk[0]];
            }
        }

        if tail != *b"\r\n" {
            channel.send(b"\r\n").await?;
        }
        channel.send(b".\r\n").await?;

        self.read_reply().await
    }

    /// Send `RSET`, abandoning the current mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rset(&mut self) -> Result<Response> {
        self.command("RSET").await
    }

    /// Send `QUIT`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Send `STARTTLS` and, on a success reply, upgrade the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the command or the TLS handshake fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let channel = self.channel.take().ok_or(ClientError::ConnectionClosed)?;
            self.channel = Some(channel.encrypt(&self.server_name).await?);
        }

        Ok(response)
    }

    fn channel_mut(&mut self) -> Result<&mut Channel> {
        self.channel.as_mut().ok_or(ClientError::ConnectionClosed)
    }

    /// Read bytes until the buffer holds one complete reply.
    async fn read_reply(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) = Response::parse(&self.buffer)? {
                self.buffer.drain(..consumed);
                return Ok(response);
            }

            if self.buffer.len() > MAX_REPLY_BYTES {
                return Err(ClientError::Protocol(format!(
                    "reply exceeds {MAX_REPLY_BYTES} bytes"
                )));
            }

            let mut chunk = [0u8; CHUNK_SIZE];
            let channel = self.channel.as_mut().ok_or(ClientError::ConnectionClosed)?;
            let read = channel.recv(&mut chunk).await?;
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }
}
