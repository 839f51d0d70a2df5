//! Session glue between a connection and the application.
//!
//! A session owns one connection end: it reads pieces with [`MsrpCodec`],
//! answers inbound requests, feeds `SEND` pieces to a [`PieceSink`] and
//! writes whatever the outbound state machine schedules. The application
//! talks to it through a [`SessionHandle`] and observes it through a
//! [`SessionListener`].
//!
//! [`MsrpCodec`]: crate::codec::MsrpCodec

mod actor;
mod counter;
mod handle;
mod idle;
mod listener;
mod state;


use std::{num::NonZeroUsize, sync::Arc};

use actor::{Parts, Role, SessionActor};
pub use handle::SessionHandle;
use handle::Shared;
pub use listener::{NoopListener, SessionListener};
pub use state::SessionState;
use thiserror::Error;
use tokio::{
    io::AsyncRead,
    sync::{mpsc, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, info_span};

use crate::{
    config::{ConfigError, SessionConfig},
    inbound::{PieceSink, Reassembler},
    outbound::OutboundError,
    transport::Transport,
};

/// Errors returned by [`SessionHandle`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The session task has ended.
    #[error("session is closed")]
    Closed,
    /// The outbound queue is above its high watermark.
    #[error("session is not admitting new messages")]
    NotAdmitting,
    /// The outbound state machine refused the request.
    #[error(transparent)]
    Outbound(#[from] OutboundError),
}

/// Identity of a session: its two endpoint URIs and the tracing span its
/// task runs in.
#[derive(Clone, Debug)]
pub struct SessionContext {
    local_path: Arc<str>,
    remote_path: Arc<str>,
    span: Span,
}

impl SessionContext {
    /// Describe a session between `local_path` and `remote_path`.
    #[must_use]
    pub fn new(local_path: impl Into<String>, remote_path: impl Into<String>) -> Self {
        let local_path: Arc<str> = Arc::from(local_path.into());
        let remote_path: Arc<str> = Arc::from(remote_path.into());
        let span = info_span!("session", local = %local_path, remote = %remote_path);
        Self {
            local_path,
            remote_path,
            span,
        }
    }

    /// Run the session task inside `span` instead of the default one.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// URI of this endpoint.
    #[must_use]
    pub fn local_path(&self) -> &str { &self.local_path }

    /// URI of the peer.
    #[must_use]
    pub fn remote_path(&self) -> &str { &self.remote_path }
}

/// Factory for session tasks.
///
/// ```no_run
/// use msrpframe::{
///     config::SessionConfig,
///     session::{NoopListener, Session, SessionContext},
///     transport::WriterTransport,
/// };
///
/// # async fn demo(stream: tokio::net::TcpStream) -> Result<(), msrpframe::config::ConfigError> {
/// let (reader, writer) = stream.into_split();
/// let (transport, _writer_task) = WriterTransport::spawn(writer);
/// let ctx = SessionContext::new("msrp://a.example.com/1;tcp", "msrp://b.example.com/2;tcp");
/// let handle = Session::new(SessionConfig::default())?.connect(transport, reader, ctx, NoopListener);
/// handle.request_close().await.ok();
/// # Ok(())
/// # }
/// ```
pub struct Session {
    config: SessionConfig,
    sink: Box<dyn PieceSink>,
}

impl Session {
    /// Validate `config` and prepare a session with the default reassembler.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] found by [`SessionConfig::validate`].
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let max_message_size = NonZeroUsize::new(config.max_message_size).ok_or(
            ConfigError::Zero {
                field: "max_message_size",
            },
        )?;
        let sink = Reassembler::new(max_message_size, config.reassembly_timeout);
        Ok(Self {
            config,
            sink: Box::new(sink),
        })
    }

    /// Deliver inbound `SEND` pieces to `sink` instead of the reassembler.
    #[must_use]
    pub fn with_sink(mut self, sink: impl PieceSink) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Spawn the active side: the session sends the handshake request and
    /// waits for its response before carrying traffic.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect<T, R, L>(
        self,
        transport: T,
        reader: R,
        ctx: SessionContext,
        listener: L,
    ) -> SessionHandle
    where
        T: Transport,
        R: AsyncRead + Unpin + Send + 'static,
        L: SessionListener,
    {
        self.spawn(Role::Active, Arc::new(transport), reader, ctx, Arc::new(listener))
    }

    /// Spawn the passive side: the session binds on the peer's first request.
    ///
    /// Must be called from within a tokio runtime.
    pub fn accept<T, R, L>(
        self,
        transport: T,
        reader: R,
        ctx: SessionContext,
        listener: L,
    ) -> SessionHandle
    where
        T: Transport,
        R: AsyncRead + Unpin + Send + 'static,
        L: SessionListener,
    {
        self.spawn(Role::Passive, Arc::new(transport), reader, ctx, Arc::new(listener))
    }

    fn spawn<R>(
        self,
        role: Role,
        transport: Arc<dyn Transport>,
        reader: R,
        ctx: SessionContext,
        listener: Arc<dyn SessionListener>,
    ) -> SessionHandle
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(self.config.command_capacity);
        let (closed_tx, closed_rx) = watch::channel(None);
        let shared = Shared::new();
        let shutdown = CancellationToken::new();
        let handle = SessionHandle::new(
            Arc::clone(&ctx.local_path),
            Arc::clone(&ctx.remote_path),
            command_tx,
            Arc::clone(&shared),
            closed_rx,
            shutdown.clone(),
        );
        let span = ctx.span.clone();
        let parts = Parts {
            ctx,
            config: self.config,
            role,
            transport,
            listener,
            sink: self.sink,
            commands: command_rx,
            shared,
            closed: closed_tx,
            shutdown,
        };
        tokio::spawn(SessionActor::new(parts, reader).run().instrument(span));
        handle
    }
}
