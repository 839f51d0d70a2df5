//! Cloneable front end to a running session task.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::SessionError;
use crate::{
    error::CloseReason,
    message::{CorrelationId, Message},
    outbound::OutboundError,
};

pub(super) type Reply = oneshot::Sender<Result<(), OutboundError>>;

/// Requests forwarded from a [`SessionHandle`] to the session task.
#[derive(Debug)]
pub(super) enum Command {
    Send {
        message: Message,
        correlation: CorrelationId,
        reply: Reply,
    },
    Abort {
        correlation: CorrelationId,
        reply: Reply,
    },
    Close,
    RequestClose,
}

/// State shared between the handles and the session task.
#[derive(Debug)]
pub(super) struct Shared {
    pub(super) admitting: AtomicBool,
    next_correlation: AtomicU64,
}

impl Shared {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self {
            admitting: AtomicBool::new(true),
            next_correlation: AtomicU64::new(1),
        })
    }
}

/// Handle used by the application to drive a session.
///
/// Handles are cheap to clone. Dropping every handle asks the session to
/// close once traffic goes quiet.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    local_path: Arc<str>,
    remote_path: Arc<str>,
    commands: mpsc::Sender<Command>,
    shared: Arc<Shared>,
    closed: watch::Receiver<Option<CloseReason>>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub(super) fn new(
        local_path: Arc<str>,
        remote_path: Arc<str>,
        commands: mpsc::Sender<Command>,
        shared: Arc<Shared>,
        closed: watch::Receiver<Option<CloseReason>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            local_path,
            remote_path,
            commands,
            shared,
            closed,
            shutdown,
        }
    }

    /// URI of this endpoint.
    #[must_use]
    pub fn local_path(&self) -> &str { &self.local_path }

    /// URI of the peer.
    #[must_use]
    pub fn remote_path(&self) -> &str { &self.remote_path }

    /// Queue `message` under a freshly allocated correlation id.
    ///
    /// # Errors
    ///
    /// See [`send_with`](Self::send_with).
    pub async fn send(&self, message: impl Into<Message>) -> Result<CorrelationId, SessionError> {
        let correlation =
            CorrelationId::new(self.shared.next_correlation.fetch_add(1, Ordering::Relaxed));
        self.send_with(message, correlation).await?;
        Ok(correlation)
    }

    /// Queue `message`, reporting its outcome under `correlation`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAdmitting`] while the queue is above its
    /// high watermark, [`SessionError::Closed`] once the session has ended,
    /// or the [`OutboundError`] raised by the state machine.
    pub async fn send_with(
        &self,
        message: impl Into<Message>,
        correlation: CorrelationId,
    ) -> Result<(), SessionError> {
        if !self.is_admitting() {
            return Err(SessionError::NotAdmitting);
        }
        let (reply, rx) = oneshot::channel();
        self.request(Command::Send {
            message: message.into(),
            correlation,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| SessionError::Closed)??)
    }

    /// Abandon the unit sent under `correlation`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] once the session has ended, or
    /// [`OutboundError::UnknownCorrelation`] for an unknown id.
    pub async fn abort(&self, correlation: CorrelationId) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Abort { correlation, reply }).await?;
        Ok(rx.await.map_err(|_| SessionError::Closed)??)
    }

    /// Close immediately with [`CloseReason::Normal`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has already ended.
    pub async fn close(&self) -> Result<(), SessionError> { self.request(Command::Close).await }

    /// Close once the session has been idle for the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has already ended.
    pub async fn request_close(&self) -> Result<(), SessionError> {
        self.request(Command::RequestClose).await
    }

    /// Whether new sends are currently admitted.
    #[must_use]
    pub fn is_admitting(&self) -> bool { self.shared.admitting.load(Ordering::Acquire) }

    /// Why the session closed, if it has.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> { self.closed.borrow().clone() }

    /// Whether the session has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.borrow().is_some() }

    /// Wait until the session closes.
    pub async fn closed(&self) -> CloseReason {
        let mut closed = self.closed.clone();
        match closed.wait_for(Option::is_some).await {
            Ok(reason) => reason
                .clone()
                .unwrap_or_else(|| CloseReason::Transport("session task ended".into())),
            Err(_) => CloseReason::Transport("session task ended".into()),
        }
    }

    /// Token cancelled when the session ends; cancelling it closes the session.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken { self.shutdown.clone() }

    async fn request(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }
}
