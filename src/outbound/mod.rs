//! Outbound transmission state machine.
//!
//! [`OutboundFsm`] is a sans-IO machine: callers feed it [`Signal`]s and
//! drain the [`Action`]s it produces. It owns the two-level queue, splits
//! requests into chunks no larger than the configured maximum, issues one
//! physical write at a time in blocks of the configured size, and keeps at
//! most one request awaiting its transaction response.
//!
//! High-priority units (responses and reports) pre-empt a request whose
//! chunk is still open: the chunk is closed early with a `+` end-line, the
//! pending units go out, and the request resumes in a new chunk at the byte
//! offset where it stopped.

mod backpressure;
mod error;
mod queue;
mod signal;
mod state;
mod transmission;

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use bytes::{Bytes, BytesMut};
use log::{debug, warn};

pub use self::{
    backpressure::AdmissionGate,
    error::OutboundError,
    signal::{Action, OutboundEvent, Signal},
    state::OutboundState,
    transmission::ChunkTransmission,
};
use self::{
    queue::OutboundQueue,
    transmission::OpenChunk,
};
use crate::{
    error::CloseReason,
    marshal::{encode_end_line, encode_message, encode_piece_head},
    message::{
        Continuation,
        CorrelationId,
        Message,
        Request,
        Response,
        TransactionId,
        TransactionIdGenerator,
    },
    parser::StartLine,
};

/// Sizing knobs for [`OutboundFsm`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutboundConfig {
    /// Largest body slice carried by one chunk.
    pub max_chunk_size: usize,
    /// Largest body slice handed to the transport in one write. Values
    /// above `max_chunk_size` are clamped to it.
    pub write_block_size: usize,
    /// Queued body bytes above which the session is torn down.
    pub max_queued_bytes: usize,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 2048,
            write_block_size: 2048,
            max_queued_bytes: 1024 * 1024,
        }
    }
}

/// What finishes when the in-flight write completes.
#[derive(Debug)]
enum Pending {
    Plain {
        body: usize,
    },
    Chunk {
        logical: TransactionId,
        body: usize,
        closes: Option<Continuation>,
    },
}

/// Outbound half of a session.
#[derive(Debug)]
pub struct OutboundFsm {
    config: OutboundConfig,
    ids: Arc<TransactionIdGenerator>,
    queue: OutboundQueue,
    transmissions: HashMap<TransactionId, ChunkTransmission>,
    current: Option<TransactionId>,
    in_flight: Option<Pending>,
    awaiting: Option<(TransactionId, TransactionId)>,
    handshake: Option<TransactionId>,
    bound: bool,
    terminated: bool,
    actions: VecDeque<Action>,
}

impl OutboundFsm {
    /// Create a machine in [`OutboundState::Init`].
    #[must_use]
    pub fn new(config: OutboundConfig, ids: Arc<TransactionIdGenerator>) -> Self {
        Self {
            queue: OutboundQueue::new(config.max_queued_bytes),
            config,
            ids,
            transmissions: HashMap::new(),
            current: None,
            in_flight: None,
            awaiting: None,
            handshake: None,
            bound: false,
            terminated: false,
            actions: VecDeque::new(),
        }
    }

    /// Current phase, derived from the machine's bookkeeping.
    #[must_use]
    pub fn state(&self) -> OutboundState {
        if self.terminated {
            OutboundState::Terminated
        } else if !self.bound {
            if self.handshake.is_some() {
                OutboundState::AwaitingHandshakeResponse
            } else {
                OutboundState::Init
            }
        } else if self.in_flight.is_some() {
            OutboundState::SendingChunkAwaitingWrite
        } else if self.current.is_some() {
            OutboundState::SendingChunk
        } else if self.awaiting.is_some() {
            OutboundState::AwaitingResponse
        } else {
            OutboundState::Idle
        }
    }

    /// Whether the handshake or an explicit bind completed.
    #[must_use]
    pub fn is_bound(&self) -> bool { self.bound }

    /// Body bytes admitted but not yet written.
    #[must_use]
    pub fn queued_bytes(&self) -> usize { self.queue.queued_bytes() }

    /// Queue fill ratio.
    #[must_use]
    pub fn queue_usage(&self) -> f64 { self.queue.usage() }

    /// Progress of the request sent under `correlation`, if still tracked.
    #[must_use]
    pub fn transmission(&self, correlation: CorrelationId) -> Option<&ChunkTransmission> {
        self.transmissions
            .values()
            .find(|t| t.correlation() == correlation)
    }

    /// Pop the oldest pending action.
    pub fn next_action(&mut self) -> Option<Action> { self.actions.pop_front() }

    /// Drain every pending action in order.
    pub fn take_actions(&mut self) -> Vec<Action> { self.actions.drain(..).collect() }

    /// Apply a signal.
    ///
    /// Actions produced along the way are queued even when an error is
    /// returned; a fatal error leaves a [`OutboundEvent::Closed`] behind.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError::NotHandled`] when the signal does not apply
    /// to the current state, [`OutboundError::Terminated`] after close,
    /// [`OutboundError::UnknownCorrelation`] for an unknown abort target,
    /// and [`OutboundError::QueueOverflow`] or
    /// [`OutboundError::HandshakeMismatch`] when the machine tore itself
    /// down.
    pub fn handle(&mut self, signal: Signal) -> Result<(), OutboundError> {
        match (self.state(), signal) {
            (OutboundState::Terminated, Signal::Close(_)) => Ok(()),
            (OutboundState::Terminated, _) => Err(OutboundError::Terminated),
            (_, Signal::Close(reason)) => {
                self.terminate(reason);
                Ok(())
            }
            (_, Signal::WriteFailed(reason)) if self.in_flight.is_some() => {
                self.terminate(CloseReason::Transport(reason));
                Ok(())
            }
            (_, Signal::WriteCompleted) if self.in_flight.is_some() => {
                self.write_completed();
                Ok(())
            }
            (OutboundState::Init, Signal::Handshake { to_path, from_path }) => {
                self.start_handshake(to_path, from_path);
                Ok(())
            }
            (OutboundState::Init, Signal::Bind) => {
                self.bind();
                Ok(())
            }
            (_, Signal::Send {
                message,
                correlation,
            }) => self.admit(message, Some(correlation)),
            (_, Signal::Control(message)) => self.admit(message, None),
            (_, Signal::Abort(correlation)) => self.abort(correlation),
            (OutboundState::AwaitingHandshakeResponse, Signal::ResponseReceived(response)) => {
                self.handshake_response(response)
            }
            (state, Signal::ResponseReceived(response)) if state != OutboundState::Init => {
                self.response(response);
                Ok(())
            }
            (state, signal) => Err(OutboundError::NotHandled {
                state,
                signal: signal.name(),
            }),
        }
    }

    fn block_size(&self) -> u64 {
        let chunk = self.config.max_chunk_size.max(1);
        self.config.write_block_size.clamp(1, chunk) as u64
    }

    fn notify(&mut self, event: OutboundEvent) { self.actions.push_back(Action::Notify(event)); }

    fn write(&mut self, bytes: BytesMut, pending: Pending) {
        self.in_flight = Some(pending);
        self.actions.push_back(Action::Write(bytes.freeze()));
    }

    fn terminate(&mut self, reason: CloseReason) {
        if self.terminated {
            return;
        }
        debug!("outbound transmission closed: reason={reason}");
        self.terminated = true;
        self.queue.clear();
        self.transmissions.clear();
        self.current = None;
        self.in_flight = None;
        self.awaiting = None;
        self.notify(OutboundEvent::Closed(reason));
    }

    fn bind(&mut self) {
        self.bound = true;
        self.notify(OutboundEvent::Bound);
        self.pump();
    }

    fn start_handshake(&mut self, to_path: String, from_path: String) {
        let id = self.ids.transaction_id();
        let request = Request::send(to_path, from_path, self.ids.message_id(), None, Bytes::new())
            .with_transaction_id(id.clone());
        let mut dst = BytesMut::new();
        encode_message(&Message::Request(request), &mut dst);
        self.handshake = Some(id);
        self.write(dst, Pending::Plain { body: 0 });
    }

    fn handshake_response(&mut self, response: Response) -> Result<(), OutboundError> {
        let Some(expected) = self.handshake.clone() else {
            return Err(OutboundError::NotHandled {
                state: self.state(),
                signal: "response-received",
            });
        };
        if response.transaction_id != expected {
            self.terminate(CloseReason::HandshakeFailed);
            return Err(OutboundError::HandshakeMismatch {
                expected,
                found: response.transaction_id,
            });
        }
        if !response.is_success() {
            warn!(
                "handshake rejected: transaction_id={expected}, code={}",
                response.code
            );
            self.terminate(CloseReason::HandshakeFailed);
            return Ok(());
        }
        self.bind();
        Ok(())
    }

    fn admit(
        &mut self,
        message: Message,
        correlation: Option<CorrelationId>,
    ) -> Result<(), OutboundError> {
        if let Err(attempted) = self.queue.reserve(message.body().len()) {
            let limit = self.queue.limit();
            warn!("outbound queue overflow: attempted={attempted}, limit={limit}");
            crate::metrics::inc_queue_overflow();
            self.terminate(CloseReason::QueueOverflow);
            return Err(OutboundError::QueueOverflow { attempted, limit });
        }
        match (message, correlation) {
            (Message::Request(request), Some(correlation)) => {
                let logical = self.ids.transaction_id();
                self.transmissions
                    .insert(logical.clone(), ChunkTransmission::new(correlation, request));
                self.queue.push_back(logical);
            }
            (message, _) => self.queue.push_control(message),
        }
        self.pump();
        Ok(())
    }

    fn abort(&mut self, correlation: CorrelationId) -> Result<(), OutboundError> {
        let Some((logical, started, finished)) = self
            .transmissions
            .iter()
            .find(|(_, t)| t.correlation() == correlation && !t.rejected)
            .map(|(id, t)| (id.clone(), t.last_wire_id.is_some(), t.is_finished()))
        else {
            return Err(OutboundError::UnknownCorrelation(correlation));
        };
        if !started || finished {
            self.drop_transmission(&logical, true);
            self.pump();
            return Ok(());
        }
        if let Some(t) = self.transmissions.get_mut(&logical) {
            t.aborted = true;
        }
        self.pump();
        Ok(())
    }

    /// Forget a request and release the bytes it still held.
    fn drop_transmission(&mut self, logical: &TransactionId, notify: bool) {
        let Some(t) = self.transmissions.remove(logical) else {
            return;
        };
        self.queue
            .release(usize::try_from(t.remaining()).unwrap_or(usize::MAX));
        self.queue.remove(logical);
        if self.current.as_ref() == Some(logical) {
            self.current = None;
        }
        if self
            .awaiting
            .as_ref()
            .is_some_and(|(_, awaited)| awaited == logical)
        {
            self.awaiting = None;
        }
        if notify {
            self.notify(OutboundEvent::MessageAborted {
                correlation: t.correlation(),
            });
        }
    }

    fn write_completed(&mut self) {
        match self.in_flight.take() {
            Some(Pending::Plain { body }) => self.queue.release(body),
            Some(Pending::Chunk {
                logical,
                body,
                closes,
            }) => {
                self.queue.release(body);
                if let Some(flag) = closes {
                    self.chunk_closed(logical, flag);
                }
            }
            None => return,
        }
        self.notify(OutboundEvent::QueueUsage(self.queue.usage()));
        self.pump();
    }

    fn chunk_closed(&mut self, logical: TransactionId, flag: Continuation) {
        if self.current.as_ref() == Some(&logical) {
            self.current = None;
        }
        let Some(t) = self.transmissions.get_mut(&logical) else {
            return;
        };
        let wire_id = t
            .chunk
            .take()
            .map(|chunk| chunk.wire_id)
            .or_else(|| t.last_wire_id.clone());
        if flag == Continuation::Aborted || (t.aborted && t.is_finished()) {
            self.drop_transmission(&logical, true);
            return;
        }
        if t.rejected {
            self.drop_transmission(&logical, false);
            return;
        }
        if let Some(wire) = &wire_id {
            t.closed_chunks.push(wire.clone());
        }
        let expects = t.expects_response();
        let finished = t.is_finished();
        let early = t.early_success.take();
        if !finished {
            self.queue.push_front(logical.clone());
        }
        if expects {
            match early {
                Some(code) => self.settle(&logical, code),
                None => self.awaiting = wire_id.map(|wire| (wire, logical)),
            }
        } else if finished {
            self.transmissions.remove(&logical);
        }
    }

    fn response(&mut self, response: Response) {
        let wire_id = &response.transaction_id;
        if self
            .awaiting
            .as_ref()
            .is_some_and(|(awaited, _)| awaited == wire_id)
        {
            if let Some((_, logical)) = self.awaiting.take() {
                self.settle(&logical, response.code);
            }
            self.pump();
            return;
        }
        let Some((logical, open)) = self
            .transmissions
            .iter()
            .find(|(_, t)| !t.rejected && t.was_sent_under(wire_id))
            .map(|(logical, t)| (logical.clone(), t.chunk.is_some()))
        else {
            debug!("ignoring response to unknown transaction: transaction_id={wire_id}");
            return;
        };
        if response.is_success() {
            if let Some(t) = self.transmissions.get_mut(&logical)
                && t.is_unclosed(wire_id)
            {
                debug!(
                    "response before end-line: transaction_id={wire_id}, code={}",
                    response.code
                );
                t.early_success = Some(response.code);
            }
            return;
        }
        if open {
            // Truncate the chunk still on the wire; it is dropped once closed.
            let Some(t) = self.transmissions.get_mut(&logical) else {
                return;
            };
            t.rejected = true;
            let correlation = t.correlation();
            debug!(
                "open chunk rejected: transaction_id={wire_id}, code={}",
                response.code
            );
            self.notify(OutboundEvent::ResponseReceived {
                correlation,
                code: response.code,
            });
            self.notify(OutboundEvent::MessageAborted { correlation });
        } else {
            self.settle(&logical, response.code);
        }
        self.pump();
    }

    /// Apply the response to a closed chunk of `logical`.
    fn settle(&mut self, logical: &TransactionId, code: u16) {
        let Some(t) = self.transmissions.get(logical) else {
            return;
        };
        let correlation = t.correlation();
        if (200..300).contains(&code) {
            if t.is_finished() {
                self.transmissions.remove(logical);
                self.notify(OutboundEvent::ResponseReceived { correlation, code });
            }
            return;
        }
        self.notify(OutboundEvent::ResponseReceived { correlation, code });
        self.drop_transmission(logical, true);
    }

    /// Issue the next write if the transport is free.
    fn pump(&mut self) {
        if self.terminated || !self.bound || self.in_flight.is_some() {
            return;
        }
        if let Some(logical) = self.current.clone() {
            self.continue_chunk(logical);
            return;
        }
        if let Some(message) = self.queue.pop_control() {
            self.write_control(message);
            return;
        }
        if self.awaiting.is_some() {
            return;
        }
        while let Some(logical) = self.queue.pop_front() {
            if self.transmissions.contains_key(&logical) {
                self.start_chunk(logical);
                return;
            }
        }
    }

    fn write_control(&mut self, mut message: Message) {
        if let Message::Report(report) = &mut message {
            report.transaction_id = self.ids.transaction_id();
        }
        let body = message.body().len();
        let mut dst = BytesMut::new();
        encode_message(&message, &mut dst);
        self.write(dst, Pending::Plain { body });
    }

    fn start_chunk(&mut self, logical: TransactionId) {
        let max_chunk = self.config.max_chunk_size.max(1) as u64;
        let block = self.block_size();
        let wire_id = self.ids.transaction_id();
        let Some(t) = self.transmissions.get_mut(&logical) else {
            return;
        };
        t.last_wire_id = Some(wire_id.clone());
        let start_line = StartLine::Request(t.method().clone());
        let mut dst = BytesMut::new();

        if t.aborted {
            let headers = t.chunk_headers(Some(0));
            encode_piece_head(&wire_id, &start_line, &headers, false, &mut dst);
            encode_end_line(&wire_id, Continuation::Aborted, false, &mut dst);
            self.write(
                dst,
                Pending::Chunk {
                    logical,
                    body: 0,
                    closes: Some(Continuation::Aborted),
                },
            );
            return;
        }

        let len = t.remaining().min(max_chunk);
        if len <= block {
            let headers = t.chunk_headers(Some(len));
            let body = t.take(len);
            let flag = if t.remaining() == 0 {
                Continuation::Done
            } else {
                Continuation::More
            };
            let has_body = !body.is_empty();
            encode_piece_head(&wire_id, &start_line, &headers, has_body, &mut dst);
            dst.extend_from_slice(&body);
            encode_end_line(&wire_id, flag, has_body, &mut dst);
            self.write(
                dst,
                Pending::Chunk {
                    logical,
                    body: body.len(),
                    closes: Some(flag),
                },
            );
            return;
        }

        let headers = t.chunk_headers(None);
        let limit = t.written() + len;
        let body = t.take(block);
        t.chunk = Some(OpenChunk {
            wire_id: wire_id.clone(),
            limit,
        });
        encode_piece_head(&wire_id, &start_line, &headers, true, &mut dst);
        dst.extend_from_slice(&body);
        self.current = Some(logical.clone());
        self.write(
            dst,
            Pending::Chunk {
                logical,
                body: body.len(),
                closes: None,
            },
        );
    }

    fn continue_chunk(&mut self, logical: TransactionId) {
        let block = self.block_size();
        let interrupt = self.queue.has_control();
        let Some(t) = self.transmissions.get_mut(&logical) else {
            self.current = None;
            return;
        };
        let Some(chunk) = t.chunk.clone() else {
            self.current = None;
            return;
        };
        let mut dst = BytesMut::new();
        let (body, closes) = if t.aborted {
            encode_end_line(&chunk.wire_id, Continuation::Aborted, true, &mut dst);
            (0, Some(Continuation::Aborted))
        } else if t.rejected || interrupt {
            encode_end_line(&chunk.wire_id, Continuation::More, true, &mut dst);
            (0, Some(Continuation::More))
        } else {
            let slice = t.take((chunk.limit - t.written()).min(block));
            dst.extend_from_slice(&slice);
            if t.written() == chunk.limit {
                let flag = if t.remaining() == 0 {
                    Continuation::Done
                } else {
                    Continuation::More
                };
                encode_end_line(&chunk.wire_id, flag, true, &mut dst);
                (slice.len(), Some(flag))
            } else {
                (slice.len(), None)
            }
        };
        self.write(
            dst,
            Pending::Chunk {
                logical,
                body,
                closes,
            },
        );
    }
}

#[cfg(test)]
mod tests;
