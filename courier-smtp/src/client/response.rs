//! SMTP reply parsing.

use super::error::{ClientError, Result};

/// A complete (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The three-digit status code shared by every line of the reply.
    pub code: u16,
    /// The text of each line, separator and code stripped.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The reply text with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// `true` for a 2xx reply.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// `true` for a 4xx reply: the request should be retried later.
    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    /// `true` for a 5xx reply: the request will never succeed as sent.
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Attempt to parse one complete reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes consumed, or `None`
    /// when the buffer does not yet hold the reply's final line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Protocol` when the buffered bytes cannot be
    /// a valid SMTP reply.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut lines = Vec::new();
        let mut code = None;
        let mut consumed = 0;

        loop {
            let rest = &buffer[consumed..];
            let Some(end) = rest.iter().position(|&byte| byte == b'\n') else {
                return Ok(None);
            };

            let raw = std::str::from_utf8(&rest[..end])
                .map_err(|err| ClientError::Protocol(format!("reply is not UTF-8: {err}")))?;
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            let (line_code, last, text) = Self::split_line(line)?;

            let code = *code.get_or_insert(line_code);
            if code != line_code {
                return Err(ClientError::Protocol(format!(
                    "status code changed mid-reply: {code} then {line_code}"
                )));
            }

            lines.push(text.to_string());
            consumed += end + 1;

            if last {
                return Ok(Some((Self::new(code, lines), consumed)));
            }
        }
    }

    /// Split one reply line into (code, is-final-line, text).
    fn split_line(line: &str) -> Result<(u16, bool, &str)> {
        let bytes = line.as_bytes();
        if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
            return Err(ClientError::Protocol(format!(
                "reply line does not start with a status code: {line:?}"
            )));
        }

        let code = bytes[..3]
            .iter()
            .fold(0u16, |code, digit| code * 10 + u16::from(digit - b'0'));

        match bytes.get(3) {
            None => Ok((code, true, "")),
            Some(b' ') => Ok((code, true, &line[4..])),
            Some(b'-') => Ok((code, false, &line[4..])),
            Some(other) => Err(ClientError::Protocol(format!(
                "invalid separator {:?} in reply line: {line:?}",
                char::from(*other)
            ))),
        }
    }
}
