//! A scriptable mock SMTP server for worker tests.
//!
//! The server answers each command from a per-command reply script
//! (replies are consumed in order; the last one repeats), records every
//! command it sees, counts accepted connections, and can inject
//! failures: dropping early connections mid-session or withholding the
//! greeting entirely.

#![allow(dead_code)] // Test utility module; not every knob is used in every test.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
    time::timeout,
};

/// One command observed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    MessageContent(String),
    Rset,
    Quit,
    Other(String),
}

/// A scripted reply.
#[derive(Debug, Clone)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    fn line(&self) -> String {
        format!("{} {}\r\n", self.code, self.text)
    }
}

/// Replies consumed in order; the last repeats once the script runs out.
#[derive(Debug)]
struct ReplyScript {
    replies: Vec<Reply>,
    next: AtomicUsize,
}

impl ReplyScript {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies,
            next: AtomicUsize::new(0),
        }
    }

    fn single(code: u16, text: impl Into<String>) -> Self {
        Self::new(vec![Reply::new(code, text)])
    }

    fn next(&self) -> Reply {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        let index = index.min(self.replies.len() - 1);
        self.replies[index].clone()
    }
}

struct ServerScript {
    greeting: Reply,
    hold_greeting: bool,
    ehlo_capabilities: Vec<String>,
    mail_from: ReplyScript,
    rcpt_to: ReplyScript,
    data: Reply,
    data_end: ReplyScript,
    rset: Reply,
    quit: Reply,
    response_delay: Option<Duration>,
    /// The first N connections are dropped mid-session...
    drop_first_connections: usize,
    /// ...after this many commands have been answered.
    drop_after_commands: usize,
}

impl Default for ServerScript {
    fn default() -> Self {
        Self {
            greeting: Reply::new(220, "mock.test ESMTP ready"),
            hold_greeting: false,
            ehlo_capabilities: vec!["SIZE 10485760".to_string()],
            mail_from: ReplyScript::single(250, "OK"),
            rcpt_to: ReplyScript::single(250, "OK"),
            data: Reply::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end: ReplyScript::single(250, "OK: message accepted"),
            rset: Reply::new(250, "OK"),
            quit: Reply::new(221, "Bye"),
            response_delay: None,
            drop_first_connections: 0,
            drop_after_commands: 0,
        }
    }
}

/// Mock SMTP server for testing.
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<SmtpCommand>>>,
    connections: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            script: ServerScript::default(),
        }
    }

    /// Start a server that accepts everything.
    pub async fn start() -> std::io::Result<Self> {
        Self::builder().build().await
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every command received so far, across all connections.
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.lock().await.clone()
    }

    /// The number of connections accepted so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    async fn handle_client(
        stream: TcpStream,
        connection_index: usize,
        script: Arc<ServerScript>,
        commands: Arc<Mutex<Vec<SmtpCommand>>>,
    ) -> std::io::Result<()> {
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);
        let mut line = String::new();

        if script.hold_greeting {
            // Simulate an exchange that accepted the connection but
            // never speaks; the client has to be cancelled from outside.
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Ok(());
        }

        write.write_all(script.greeting.line().as_bytes()).await?;

        let dropping = connection_index < script.drop_first_connections;
        let mut answered = 0usize;

        loop {
            if dropping && answered >= script.drop_after_commands {
                // Silently close mid-session.
                return Ok(());
            }

            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let trimmed = line.trim().to_string();
            let mut parts = trimmed.splitn(2, ' ');
            let verb = parts.next().unwrap_or("").to_uppercase();
            let argument = parts.next().unwrap_or("").to_string();

            let (reply, command) = match verb.as_str() {
                "EHLO" => {
                    let mut reply = String::new();
                    reply.push_str("250-mock.test\r\n");
                    for (i, capability) in script.ehlo_capabilities.iter().enumerate() {
                        let separator = if i + 1 == script.ehlo_capabilities.len() {
                            ' '
                        } else {
                            '-'
                        };
                        reply.push_str(&format!("250{separator}{capability}\r\n"));
                    }
                    (reply, SmtpCommand::Ehlo(argument))
                }
                "MAIL" => (
                    script.mail_from.next().line(),
                    SmtpCommand::MailFrom(argument),
                ),
                "RCPT" => (script.rcpt_to.next().line(), SmtpCommand::RcptTo(argument)),
                "DATA" => (script.data.line(), SmtpCommand::Data),
                "RSET" => (script.rset.line(), SmtpCommand::Rset),
                "QUIT" => {
                    commands.lock().await.push(SmtpCommand::Quit);
                    write.write_all(script.quit.line().as_bytes()).await?;
                    return Ok(());
                }
                _ => (
                    "500 unknown command\r\n".to_string(),
                    SmtpCommand::Other(trimmed.clone()),
                ),
            };

            commands.lock().await.push(command.clone());
            answered += 1;

            if let Some(delay) = script.response_delay {
                tokio::time::sleep(delay).await;
            }
            write.write_all(reply.as_bytes()).await?;

            // After a 354 the client streams the body up to the dot.
            if matches!(command, SmtpCommand::Data) && script.data.code == 354 {
                let mut content = String::new();
                loop {
                    line.clear();
                    if reader.read_line(&mut line).await? == 0 {
                        return Ok(());
                    }
                    if line.trim_end() == "." {
                        break;
                    }
                    content.push_str(&line);
                }

                commands
                    .lock()
                    .await
                    .push(SmtpCommand::MessageContent(content));
                answered += 1;

                if let Some(delay) = script.response_delay {
                    tokio::time::sleep(delay).await;
                }
                write
                    .write_all(script.data_end.next().line().as_bytes())
                    .await?;
            }
        }
    }
}

/// Builder for configuring a [`MockSmtpServer`].
pub struct MockSmtpServerBuilder {
    script: ServerScript,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, text: impl Into<String>) -> Self {
        self.script.greeting = Reply::new(code, text);
        self
    }

    /// Accept the connection but never send the greeting.
    #[must_use]
    pub const fn with_held_greeting(mut self) -> Self {
        self.script.hold_greeting = true;
        self
    }

    #[must_use]
    pub fn with_ehlo_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.script.ehlo_capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_mail_from_replies(mut self, replies: Vec<(u16, &str)>) -> Self {
        self.script.mail_from = script_from(replies);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_replies(mut self, replies: Vec<(u16, &str)>) -> Self {
        self.script.rcpt_to = script_from(replies);
        self
    }

    #[must_use]
    pub fn with_data_end_replies(mut self, replies: Vec<(u16, &str)>) -> Self {
        self.script.data_end = script_from(replies);
        self
    }

    /// Delay every scripted reply.
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.script.response_delay = Some(delay);
        self
    }

    /// Drop the first `connections` connections after `commands`
    /// answered commands.
    #[must_use]
    pub const fn with_dropped_connections(mut self, connections: usize, commands: usize) -> Self {
        self.script.drop_first_connections = connections;
        self.script.drop_after_commands = commands;
        self
    }

    /// Bind a port and start serving.
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let script = Arc::new(self.script);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_script = Arc::clone(&script);
        let accept_commands = Arc::clone(&commands);
        let accept_connections = Arc::clone(&connections);
        let accept_shutdown = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                if accept_shutdown.load(Ordering::SeqCst) {
                    break;
                }

                // Accept with a short timeout so the shutdown flag is
                // observed.
                let accepted = timeout(Duration::from_millis(100), listener.accept()).await;
                if let Ok(Ok((stream, _peer))) = accepted {
                    let index = accept_connections.fetch_add(1, Ordering::SeqCst);
                    let script = Arc::clone(&accept_script);
                    let commands = Arc::clone(&accept_commands);

                    tokio::spawn(async move {
                        if let Err(error) =
                            MockSmtpServer::handle_client(stream, index, script, commands).await
                        {
                            tracing::debug!("mock server client error: {error}");
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands,
            connections,
            shutdown,
        })
    }
}

fn script_from(replies: Vec<(u16, &str)>) -> ReplyScript {
    ReplyScript::new(
        replies
            .into_iter()
            .map(|(code, text)| Reply::new(code, text))
            .collect(),
    )
}
