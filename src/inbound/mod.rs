//! Consumers of inbound `SEND` pieces.
//!
//! The session hands every `SEND` piece to a [`PieceSink`] in arrival order.
//! [`Reassembler`] is the default sink; applications that stream bodies to
//! disk can supply their own.

mod error;
mod reassembler;

pub use error::ReassemblyError;
pub use reassembler::{ReassembledMessage, Reassembler, Reassembly};

use crate::parser::ChunkPiece;

/// Receives the pieces of inbound `SEND` requests.
pub trait PieceSink: Send + 'static {
    /// Accept one piece.
    ///
    /// # Errors
    ///
    /// Returning an error rejects the chunk; the session answers it with
    /// [`ReassemblyError::status_code`].
    fn accept(&mut self, piece: &ChunkPiece) -> Result<Reassembly, ReassemblyError>;
}

#[cfg(test)]
mod tests;
