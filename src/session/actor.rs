//! The task that owns one session.
//!
//! [`SessionActor`] multiplexes the transport, the inbound frame stream,
//! handle commands and two timers with a biased `tokio::select!`. Outbound
//! decisions are delegated to [`OutboundFsm`]; the actor only performs the
//! writes it asks for and forwards its events.

use std::{
    collections::HashSet,
    future,
    io,
    sync::{Arc, atomic::Ordering},
};

use bytes::Bytes;
use futures::{StreamExt, future::BoxFuture};
use log::{debug, info, warn};
use tokio::{
    io::AsyncRead,
    sync::{mpsc, watch},
};
use tokio_util::{codec::FramedRead, sync::CancellationToken};

use super::{
    SessionContext,
    SessionListener,
    SessionState,
    counter::ActiveSession,
    handle::{Command, Shared},
    idle::Timer,
    state::Transition,
};
use crate::{
    codec::{CodecError, MsrpCodec},
    config::SessionConfig,
    error::CloseReason,
    inbound::{PieceSink, Reassembly},
    message::{
        Continuation,
        Message,
        Method,
        Report,
        Response,
        Status,
        TransactionId,
        TransactionIdGenerator,
    },
    metrics::{self, Direction},
    outbound::{
        Action,
        AdmissionGate,
        OutboundError,
        OutboundEvent,
        OutboundFsm,
        OutboundState,
        Signal,
    },
    parser::{ChunkPiece, PieceKind, StartLine},
    transport::Transport,
};

/// Which side of the connection opened the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Role {
    /// Sends the handshake.
    Active,
    /// Binds on the peer's first request.
    Passive,
}

enum Event {
    Shutdown,
    Written(io::Result<()>),
    Frame(Option<Result<ChunkPiece, CodecError>>),
    Command(Option<Command>),
    HandshakeTimeout,
    IdleTimeout,
}

/// Everything the actor needs besides the reader.
pub(super) struct Parts {
    pub(super) ctx: SessionContext,
    pub(super) config: SessionConfig,
    pub(super) role: Role,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) listener: Arc<dyn SessionListener>,
    pub(super) sink: Box<dyn PieceSink>,
    pub(super) commands: mpsc::Receiver<Command>,
    pub(super) shared: Arc<Shared>,
    pub(super) closed: watch::Sender<Option<CloseReason>>,
    pub(super) shutdown: CancellationToken,
}

pub(super) struct SessionActor<R> {
    ctx: SessionContext,
    config: SessionConfig,
    role: Role,
    state: SessionState,
    fsm: OutboundFsm,
    transport: Arc<dyn Transport>,
    reader: FramedRead<R, MsrpCodec>,
    reader_open: bool,
    commands: mpsc::Receiver<Command>,
    commands_open: bool,
    listener: Arc<dyn SessionListener>,
    sink: Box<dyn PieceSink>,
    gate: AdmissionGate,
    shared: Arc<Shared>,
    idle: Timer,
    close_requested: bool,
    handshake: Timer,
    writing: Option<BoxFuture<'static, io::Result<()>>>,
    // Inbound transactions already answered with a failure.
    answered: HashSet<TransactionId>,
    closed: watch::Sender<Option<CloseReason>>,
    shutdown: CancellationToken,
}

impl<R> SessionActor<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub(super) fn new(parts: Parts, reader: R) -> Self {
        let ids = Arc::new(TransactionIdGenerator::new(&parts.config.id_prefix));
        let fsm = OutboundFsm::new(parts.config.outbound(), ids);
        let reader = FramedRead::new(
            reader,
            MsrpCodec::with_max_header_size(parts.config.max_header_size),
        );
        Self {
            ctx: parts.ctx,
            config: parts.config,
            role: parts.role,
            state: SessionState::Init,
            fsm,
            transport: parts.transport,
            reader,
            reader_open: true,
            commands: parts.commands,
            commands_open: true,
            listener: parts.listener,
            sink: parts.sink,
            gate: AdmissionGate::default(),
            shared: parts.shared,
            idle: Timer::default(),
            close_requested: false,
            handshake: Timer::default(),
            writing: None,
            answered: HashSet::new(),
            closed: parts.closed,
            shutdown: parts.shutdown,
        }
    }

    /// Drive the session until it terminates.
    pub(super) async fn run(mut self) {
        let _active = ActiveSession::new();
        info!(
            "session started: local={}, remote={}, role={:?}",
            self.ctx.local_path(),
            self.ctx.remote_path(),
            self.role
        );
        if self.role == Role::Active {
            self.start_handshake();
        }
        while !self.state.is_terminated() {
            let event = self.next_event().await;
            self.dispatch(event);
            self.arm_idle_when_quiet();
        }
        self.transport.shutdown().await;
    }

    async fn next_event(&mut self) -> Event {
        tokio::select! {
            biased;

            () = self.shutdown.cancelled() => Event::Shutdown,
            res = poll_write(&mut self.writing), if self.writing.is_some() => Event::Written(res),
            frame = self.reader.next(), if self.reader_open => Event::Frame(frame),
            command = self.commands.recv(), if self.commands_open => Event::Command(command),
            () = self.handshake.elapsed(), if self.handshake.is_armed() => Event::HandshakeTimeout,
            () = self.idle.elapsed(), if self.idle.is_armed() => Event::IdleTimeout,
        }
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Shutdown => self.close(CloseReason::Normal),
            Event::Written(result) => self.written(result),
            Event::Frame(frame) => self.frame(frame),
            Event::Command(command) => self.command(command),
            Event::HandshakeTimeout => {
                warn!(
                    "handshake timed out: remote={}, timeout={:?}",
                    self.ctx.remote_path(),
                    self.config.handshake_timeout
                );
                self.close(CloseReason::HandshakeTimeout);
            }
            Event::IdleTimeout => self.close(CloseReason::IdleTimeout),
        }
    }

    fn transition(&mut self, transition: Transition) {
        if let Some(next) = self.state.next(transition) {
            debug!("session state: {:?} -> {next:?}", self.state);
            self.state = next;
        }
    }

    fn signal(&mut self, signal: Signal) -> Result<(), OutboundError> {
        let result = self.fsm.handle(signal);
        self.apply();
        result
    }

    fn apply(&mut self) {
        while let Some(action) = self.fsm.next_action() {
            match action {
                Action::Write(bytes) => self.start_write(bytes),
                Action::Notify(event) => self.outbound_event(event),
            }
        }
    }

    fn start_write(&mut self, bytes: Bytes) {
        metrics::inc_pieces(Direction::Outbound);
        let transport = Arc::clone(&self.transport);
        self.writing = Some(Box::pin(async move { transport.write(bytes).await }));
    }

    fn outbound_event(&mut self, event: OutboundEvent) {
        match event {
            OutboundEvent::Bound => {
                self.handshake.disarm();
                self.transition(Transition::Bind);
                info!("session bound: remote={}", self.ctx.remote_path());
                self.listener.bound();
            }
            OutboundEvent::QueueUsage(usage) => {
                self.listener.queue_usage_changed(usage);
                if let Some(admitting) = self.gate.update(usage) {
                    debug!("admission changed: admitting={admitting}, usage={usage:.2}");
                    self.shared.admitting.store(admitting, Ordering::Release);
                    self.listener.admission_changed(admitting);
                }
            }
            OutboundEvent::ResponseReceived { correlation, code } => {
                self.listener.response_received(correlation, code);
            }
            OutboundEvent::MessageAborted { correlation } => {
                self.listener.message_aborted(correlation);
            }
            OutboundEvent::Closed(reason) => self.finish(reason),
        }
    }

    fn finish(&mut self, reason: CloseReason) {
        self.transition(Transition::Terminate);
        self.idle.disarm();
        self.handshake.disarm();
        self.writing = None;
        if reason.is_error() {
            warn!(
                "session closed: local={}, remote={}, reason={reason}",
                self.ctx.local_path(),
                self.ctx.remote_path()
            );
        } else {
            info!(
                "session closed: local={}, remote={}, reason={reason}",
                self.ctx.local_path(),
                self.ctx.remote_path()
            );
        }
        metrics::inc_session_closed(&reason);
        self.listener.closed(&reason);
        self.closed.send_replace(Some(reason));
        self.shutdown.cancel();
    }

    fn close(&mut self, reason: CloseReason) {
        if let Err(e) = self.signal(Signal::Close(reason)) {
            debug!("close ignored: error={e}");
        }
    }

    fn start_handshake(&mut self) {
        self.transition(Transition::Handshake);
        self.handshake.arm(self.config.handshake_timeout);
        let signal = Signal::Handshake {
            to_path: self.ctx.remote_path().to_owned(),
            from_path: self.ctx.local_path().to_owned(),
        };
        if let Err(e) = self.signal(signal) {
            warn!("handshake not sent: error={e}");
        }
    }

    fn bind(&mut self) {
        if let Err(e) = self.signal(Signal::Bind) {
            debug!("bind ignored: error={e}");
        }
    }

    fn request_close(&mut self) {
        self.transition(Transition::RequestClose);
        debug!(
            "close requested: remote={}, idle_timeout={:?}",
            self.ctx.remote_path(),
            self.config.idle_timeout
        );
        self.close_requested = true;
    }

    /// Cancel a pending idle close; it is scheduled again once the session
    /// falls quiet.
    fn activity(&mut self) { self.idle.disarm(); }

    /// Start the idle countdown of a requested close when nothing is being
    /// sent or awaited.
    fn arm_idle_when_quiet(&mut self) {
        let quiet = self.writing.is_none()
            && matches!(self.fsm.state(), OutboundState::Init | OutboundState::Idle);
        if self.close_requested && quiet && !self.idle.is_armed() && !self.state.is_terminated() {
            self.idle.arm(self.config.idle_timeout);
        }
    }

    fn written(&mut self, result: io::Result<()>) {
        self.writing = None;
        self.activity();
        let signal = match result {
            Ok(()) => Signal::WriteCompleted,
            Err(e) => {
                warn!("write failed: remote={}, error={e}", self.ctx.remote_path());
                Signal::WriteFailed(e.to_string())
            }
        };
        if let Err(e) = self.signal(signal) {
            debug!("write completion ignored: error={e}");
        }
    }

    fn command(&mut self, command: Option<Command>) {
        let Some(command) = command else {
            self.commands_open = false;
            debug!("all handles dropped: remote={}", self.ctx.remote_path());
            self.request_close();
            return;
        };
        self.activity();
        match command {
            Command::Send {
                message,
                correlation,
                reply,
            } => {
                let result = self.signal(Signal::Send {
                    message,
                    correlation,
                });
                let _ = reply.send(result);
            }
            Command::Abort { correlation, reply } => {
                let result = self.signal(Signal::Abort(correlation));
                let _ = reply.send(result);
            }
            Command::Close => self.close(CloseReason::Normal),
            Command::RequestClose => self.request_close(),
        }
    }

    fn frame(&mut self, frame: Option<Result<ChunkPiece, CodecError>>) {
        match frame {
            None => {
                self.reader_open = false;
                info!("peer closed the connection: remote={}", self.ctx.remote_path());
                self.close(CloseReason::Normal);
            }
            Some(Err(CodecError::Parse(e))) => {
                self.reader_open = false;
                warn!("protocol error: remote={}, error={e}", self.ctx.remote_path());
                self.close(CloseReason::Protocol(e.to_string()));
            }
            Some(Err(e)) => {
                self.reader_open = false;
                self.close(CloseReason::Transport(e.to_string()));
            }
            Some(Ok(piece)) => {
                metrics::inc_pieces(Direction::Inbound);
                self.activity();
                self.piece(piece);
            }
        }
    }

    fn piece(&mut self, piece: ChunkPiece) {
        let start_line = piece.head().start_line.clone();
        match start_line {
            StartLine::Response { .. } => {
                if let Some(Message::Response(response)) = piece.into_message()
                    && let Err(e) = self.signal(Signal::ResponseReceived(response))
                {
                    debug!("response ignored: error={e}");
                }
            }
            StartLine::Request(Method::Send) => self.send_piece(&piece),
            StartLine::Request(Method::Report) => {
                if let Some(Message::Report(report)) = piece.into_message() {
                    self.report(report);
                }
            }
            StartLine::Request(Method::Extension(method)) => {
                if piece.kind().is_terminal() {
                    debug!("unsupported method: method={method}");
                    self.reply(&piece, 501);
                }
            }
        }
    }

    fn report(&mut self, report: Report) {
        debug!(
            "report received: message_id={:?}, status={:?}",
            report.headers.message_id,
            report.status()
        );
        self.listener.report_received(report);
    }

    fn send_piece(&mut self, piece: &ChunkPiece) {
        let txid = piece.transaction_id().clone();
        let headers = &piece.head().headers;
        if self.role == Role::Passive && !self.fsm.is_bound() {
            self.bind();
        }

        if headers.to_path.as_deref() != Some(self.ctx.local_path()) {
            if self.answered.insert(txid.clone()) {
                warn!(
                    "request for another session: to_path={:?}, transaction_id={txid}",
                    headers.to_path
                );
                self.reply(piece, 481);
            }
            if piece.kind().is_terminal() {
                self.answered.remove(&txid);
            }
            return;
        }

        let binding = piece.kind() == PieceKind::Complete
            && piece.body().is_empty()
            && piece.byte_range().total == Some(0);
        if !binding && !self.answered.contains(&txid) {
            match self.sink.accept(piece) {
                Ok(Reassembly::Complete(message)) => {
                    debug!(
                        "message received: message_id={}, len={}",
                        message.message_id(),
                        message.body().len()
                    );
                    self.listener.message_received(message);
                }
                Ok(Reassembly::Aborted(message_id)) => {
                    debug!("inbound message aborted: message_id={message_id}");
                }
                Ok(Reassembly::Incomplete) => {}
                Err(e) => {
                    warn!("inbound chunk rejected: transaction_id={txid}, error={e}");
                    self.answered.insert(txid.clone());
                    self.reply(piece, e.status_code());
                }
            }
        }

        if !piece.kind().is_terminal() || self.answered.remove(&txid) {
            return;
        }
        self.reply(piece, 200);
        if piece.continuation() == Continuation::Done && piece.head().headers.wants_success_report()
        {
            let received = piece.offset() + piece.body().len() as u64;
            let report =
                Report::for_message(&piece.head().headers, Status::new(200, None), received);
            if let Err(e) = self.signal(Signal::Control(report.into())) {
                debug!("success report not queued: error={e}");
            }
        }
    }

    /// Queue a transaction response unless `Failure-Report` suppresses it.
    fn reply(&mut self, piece: &ChunkPiece, code: u16) {
        let headers = &piece.head().headers;
        if !headers.wants_response((200..300).contains(&code)) {
            return;
        }
        let response = Response::to_request(piece.transaction_id(), headers, code);
        if let Err(e) = self.signal(Signal::Control(response.into())) {
            debug!("response not queued: code={code}, error={e}");
        }
    }
}

async fn poll_write(slot: &mut Option<BoxFuture<'static, io::Result<()>>>) -> io::Result<()> {
    match slot.as_mut() {
        Some(write) => write.await,
        None => future::pending().await,
    }
}
