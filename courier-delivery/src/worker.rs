//! The per-domain host worker.
//!
//! One worker owns everything for a single destination domain: the FIFO
//! inbox, at most one in-flight message, at most one live SMTP session,
//! and the transient-failure counter for the current message. All of it
//! is confined to the worker's own task; the only state shared with the
//! outside is the idle timestamp, behind its own lock.
//!
//! The delivery cycle is an explicit state machine. Each state has one
//! async step method returning the successor state:
//!
//! | state        | waits on          | goes to                            |
//! |--------------|-------------------|------------------------------------|
//! | `Receiving`  | inbox or stop     | `Connecting`, `Stopped`            |
//! | `Connecting` | negotiation, stop | `Delivering`, `Backoff`, `Stopped` |
//! | `Delivering` | one transaction   | `Cleanup`, `Connecting`, `Backoff` |
//! | `Cleanup`    | storage deletion  | `Receiving`                        |
//! | `Backoff`    | tier delay, stop  | `Receiving`, `Cleanup`, `Stopped`  |
//! | `Stopped`    | —                 | exits the loop                     |
//!
//! The session is persistent: after a delivered message (or a permanent
//! rejection, which only resets the mail transaction) the connection is
//! kept for the next message, and `Connecting` becomes a no-op.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use courier_smtp::SmtpClient;
use courier_spool::{Message, MessageStore};
use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{
    dns::MxResolver,
    error::FailureClass,
    negotiate::{Connector, Negotiation},
    transact::DeliveryTransaction,
    types::DeliveryConfig,
};

/// The states of the delivery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    /// Waiting for the inbox to produce a message; the worker is idle.
    Receiving,
    /// A message is held; ensure a live session exists.
    Connecting,
    /// A message and a session are held; run one delivery transaction.
    Delivering,
    /// The current message reached a terminal outcome; delete it.
    Cleanup,
    /// Sleeping out a retry tier.
    Backoff,
    /// Stop observed; the worker exits.
    Stopped,
}

/// A delivery worker bound to one destination domain.
///
/// Created (and immediately started) with [`HostWorker::spawn`]; driven
/// from outside exclusively through the returned [`HostHandle`].
pub struct HostWorker {
    domain: Arc<str>,
    store: Arc<dyn MessageStore>,
    connector: Connector,
    config: DeliveryConfig,
    inbox: mpsc::UnboundedReceiver<Message>,
    stop: watch::Receiver<bool>,
    last_idle: Arc<Mutex<Option<Instant>>>,
    current: Option<Message>,
    session: Option<SmtpClient>,
    tries: u32,
    transport_failures: u32,
}

impl HostWorker {
    /// Create the worker for `domain` and start its run loop on the
    /// runtime. The worker lives until [`HostHandle::stop`] is awaited.
    #[must_use]
    pub fn spawn(
        domain: impl Into<Arc<str>>,
        store: Arc<dyn MessageStore>,
        resolver: Arc<dyn MxResolver>,
        config: DeliveryConfig,
    ) -> HostHandle {
        let domain = domain.into();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let last_idle = Arc::new(Mutex::new(None));

        let worker = Self {
            domain: Arc::clone(&domain),
            connector: Connector::new(resolver, &config),
            store,
            config,
            inbox: inbox_rx,
            stop: stop_rx,
            last_idle: Arc::clone(&last_idle),
            current: None,
            session: None,
            tries: 0,
            transport_failures: 0,
        };

        let span = info_span!("host", domain = %domain);
        let task = tokio::spawn(worker.run().instrument(span));

        HostHandle {
            domain,
            inbox: inbox_tx,
            last_idle,
            stop: stop_tx,
            task,
        }
    }

    async fn run(mut self) {
        let mut state = WorkerState::Receiving;
        loop {
            state = match state {
                WorkerState::Receiving => self.receive().await,
                WorkerState::Connecting => self.connect().await,
                WorkerState::Delivering => self.deliver().await,
                WorkerState::Cleanup => self.cleanup().await,
                WorkerState::Backoff => self.backoff().await,
                WorkerState::Stopped => break,
            };
        }
        self.shutdown().await;
    }

    /// Wait for the next message. Entering and leaving this wait are the
    /// only places the idle timestamp changes.
    async fn receive(&mut self) -> WorkerState {
        if self.current.is_some() {
            // A retry cycle still owns a message; go straight back into
            // the delivery flow.
            return WorkerState::Connecting;
        }

        *self.last_idle.lock() = Some(Instant::now());
        let received = tokio::select! {
            _ = self.stop.wait_for(|&stopped| stopped) => None,
            message = self.inbox.recv() => message,
        };
        *self.last_idle.lock() = None;

        match received {
            Some(message) => {
                info!(id = %message.id(), "message received in queue");
                self.current = Some(message);
                WorkerState::Connecting
            }
            // A closed inbox means the handle is gone; treat it as stop.
            None => WorkerState::Stopped,
        }
    }

    async fn connect(&mut self) -> WorkerState {
        if self.session.is_some() {
            // The session from the previous message is still live.
            return WorkerState::Delivering;
        }

        debug!("connecting to mail exchange");
        match self.connector.connect(&self.domain, &mut self.stop).await {
            Ok(Negotiation::Connected(session)) => {
                info!("connection established");
                self.session = Some(session);
                WorkerState::Delivering
            }
            Ok(Negotiation::Cancelled) => WorkerState::Stopped,
            Err(error) => {
                warn!(error = %error, "connection attempt failed");
                WorkerState::Backoff
            }
        }
    }

    async fn deliver(&mut self) -> WorkerState {
        let outcome = {
            let (Some(message), Some(session)) = (self.current.as_ref(), self.session.as_mut())
            else {
                return WorkerState::Receiving;
            };
            DeliveryTransaction::new(self.store.as_ref(), &self.config.timeouts)
                .execute(session, message)
                .await
        };

        let error = match outcome {
            Ok(()) => {
                info!("mail delivered successfully");
                self.transport_failures = 0;
                return WorkerState::Cleanup;
            }
            Err(error) => error,
        };

        warn!(error = %error, "delivery attempt failed");
        match error.class() {
            FailureClass::Transport => {
                // The transport died, not the remote party's throughput:
                // a fresh connection is worth trying without delay, and
                // the retry tier stays untouched.
                self.session = None;
                self.transport_failures += 1;
                if self.transport_failures >= self.config.max_transport_failures {
                    warn!(
                        failures = self.transport_failures,
                        "transport keeps failing, backing off"
                    );
                    WorkerState::Backoff
                } else {
                    WorkerState::Connecting
                }
            }
            FailureClass::Transient => {
                self.session = None;
                WorkerState::Backoff
            }
            FailureClass::Permanent => {
                // Only the mail transaction is reset; the session stays
                // usable for the next message.
                self.reset_session().await;
                WorkerState::Cleanup
            }
        }
    }

    /// Delete the current message from storage (unconditionally, for
    /// every terminal outcome) and clear the retry counters.
    async fn cleanup(&mut self) -> WorkerState {
        if let Some(message) = self.current.take() {
            info!(id = %message.id(), "deleting message from storage");
            if let Err(error) = self.store.delete(message.id()).await {
                error!(id = %message.id(), error = %error, "failed to delete message");
            }
        }

        self.tries = 0;
        self.transport_failures = 0;
        WorkerState::Receiving
    }

    /// Sleep out the tier-determined delay, or give up on the message
    /// once the schedule is exhausted.
    async fn backoff(&mut self) -> WorkerState {
        self.transport_failures = 0;
        self.tries += 1;

        let Some(delay) = self.config.retry.backoff(self.tries) else {
            warn!(tries = self.tries, "maximum retry count exceeded");
            return WorkerState::Cleanup;
        };

        debug!(
            tries = self.tries,
            delay_secs = delay.as_secs(),
            "waiting before next delivery attempt"
        );
        tokio::select! {
            _ = self.stop.wait_for(|&stopped| stopped) => WorkerState::Stopped,
            () = sleep(delay) => WorkerState::Receiving,
        }
    }

    /// RSET the live session after a permanent rejection, keeping the
    /// connection for the next message. A session that refuses the reset
    /// is discarded instead.
    async fn reset_session(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match timeout(self.config.timeouts.rset(), session.rset()).await {
            Ok(Ok(response)) if response.is_success() => {}
            Ok(Ok(response)) => {
                debug!(
                    code = response.code,
                    "session reset rejected, discarding connection"
                );
                self.session = None;
            }
            Ok(Err(error)) => {
                debug!(error = %error, "session reset failed, discarding connection");
                self.session = None;
            }
            Err(_) => {
                debug!("session reset timed out, discarding connection");
                self.session = None;
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("shutting down host worker");
        if let Some(mut session) = self.session.take() {
            // Best effort; the peer may already be gone.
            if let Ok(Err(error)) = timeout(self.config.timeouts.quit(), session.quit()).await {
                debug!(error = %error, "QUIT failed during shutdown");
            }
        }
    }
}

/// The owner-facing surface of a running [`HostWorker`].
pub struct HostHandle {
    domain: Arc<str>,
    inbox: mpsc::UnboundedSender<Message>,
    last_idle: Arc<Mutex<Option<Instant>>>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HostHandle {
    /// The destination domain this worker serves.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Enqueue a message for delivery. Never blocks, regardless of queue
    /// depth; messages are attempted strictly in enqueue order.
    pub fn deliver(&self, message: Message) {
        if self.inbox.send(message).is_err() {
            error!(domain = %self.domain, "worker is stopped, dropping message");
        }
    }

    /// How long the worker has been waiting for a message, or zero while
    /// it is busy.
    #[must_use]
    pub fn idle_duration(&self) -> Duration {
        self.last_idle
            .lock()
            .map_or(Duration::ZERO, |since| since.elapsed())
    }

    /// Request shutdown and wait until the worker has drained its
    /// current step and released its connection. Consuming the handle
    /// makes a second stop impossible to express.
    pub async fn stop(self) {
        if self.stop.send(true).is_err() {
            debug!(domain = %self.domain, "worker already exited before stop");
        }
        if let Err(error) = self.task.await {
            error!(domain = %self.domain, error = %error, "worker task failed");
        }
    }
}
