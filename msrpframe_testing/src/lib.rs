//! Utilities for driving `msrpframe` sessions and codecs in tests.
//!
//! The helpers open sessions on a `tokio::io::duplex` stream with a scripted
//! [`Peer`] on the far end, record outbound writes, collect listener
//! callbacks as [`SessionEvent`]s and cut wire bytes into arbitrary
//! fragments.
//!
//! ```rust
//! use msrpframe_testing::{split_at_points, wire::send_request};
//!
//! let wire = send_request("tx01", "m1", "1-5/5", b"hello", b'$');
//! let pieces = split_at_points(&wire, &[3, 40]);
//! assert_eq!(pieces.concat(), wire);
//! ```

pub mod listener;
pub mod logging;
pub mod peer;
pub mod transport;
pub mod wire;

pub use listener::{EventStream, RecordingListener, SessionEvent};
pub use logging::{LoggerHandle, logger};
pub use peer::{LOCAL_PATH, Peer, REMOTE_PATH, SessionPair, open_session};
pub use transport::RecordingTransport;
pub use wire::{decode_fragments, split_at_points, split_every};
