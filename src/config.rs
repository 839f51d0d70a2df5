//! Session configuration.
//!
//! [`SessionConfig`] collects every tunable used by a session: chunk and
//! write sizes for the outbound state machine, the queue limit, timers, and
//! the inbound reassembly limits. Build it with [`SessionConfig::builder`]
//! or deserialize it with `serde`; durations are expressed in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{outbound::OutboundConfig, parser::DEFAULT_MAX_HEADER_SIZE};

/// Default largest body slice per chunk.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 2048;
/// Default outbound queue limit.
pub const DEFAULT_MAX_QUEUED_BYTES: usize = 1024 * 1024;
/// Default idle-close delay.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default handshake response deadline.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default cap on a reassembled inbound message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
/// Default age after which a partial inbound message is discarded.
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors raised while validating a [`SessionConfig`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A size that must be positive was zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Offending field.
        field: &'static str,
    },
    /// The write block is larger than a chunk.
    #[error("write block size {block} exceeds max chunk size {chunk}")]
    BlockExceedsChunk {
        /// Configured write block size.
        block: usize,
        /// Configured max chunk size.
        chunk: usize,
    },
    /// A timer was configured with a zero duration.
    #[error("{field} must be a non-zero duration")]
    ZeroDuration {
        /// Offending field.
        field: &'static str,
    },
    /// The transaction id prefix is empty or not alphanumeric.
    #[error("id prefix {0:?} must be 1 to 16 ASCII alphanumerics")]
    IdPrefix(String),
}

/// Tunables for one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Largest body slice per chunk.
    pub max_chunk_size: usize,
    /// Largest body slice per physical write; `None` uses `max_chunk_size`.
    pub write_block_size: Option<usize>,
    /// Queued outbound bytes above which the session closes.
    pub max_queued_bytes: usize,
    /// Delay between a close request and the actual close, reset by activity.
    #[serde(rename = "idle_timeout_ms", with = "millis")]
    pub idle_timeout: Duration,
    /// Deadline for the handshake response.
    #[serde(rename = "handshake_timeout_ms", with = "millis")]
    pub handshake_timeout: Duration,
    /// Largest accepted inbound header block.
    pub max_header_size: usize,
    /// Largest reassembled inbound message.
    pub max_message_size: usize,
    /// Age after which a partial inbound message is discarded.
    #[serde(rename = "reassembly_timeout_ms", with = "millis")]
    pub reassembly_timeout: Duration,
    /// Prefix for generated transaction and message ids.
    pub id_prefix: String,
    /// Capacity of the handle's command channel.
    pub command_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            write_block_size: None,
            max_queued_bytes: DEFAULT_MAX_QUEUED_BYTES,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            reassembly_timeout: DEFAULT_REASSEMBLY_TIMEOUT,
            id_prefix: "s".to_owned(),
            command_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Start a builder seeded with the defaults.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder { SessionConfigBuilder::default() }

    /// Effective write block size.
    #[must_use]
    pub fn write_block_size(&self) -> usize { self.write_block_size.unwrap_or(self.max_chunk_size) }

    /// Sizing for the outbound state machine.
    #[must_use]
    pub fn outbound(&self) -> OutboundConfig {
        OutboundConfig {
            max_chunk_size: self.max_chunk_size,
            write_block_size: self.write_block_size(),
            max_queued_bytes: self.max_queued_bytes,
        }
    }

    /// Check the invariants between fields.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("max_chunk_size", self.max_chunk_size),
            ("write_block_size", self.write_block_size()),
            ("max_queued_bytes", self.max_queued_bytes),
            ("max_header_size", self.max_header_size),
            ("max_message_size", self.max_message_size),
            ("command_capacity", self.command_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.write_block_size() > self.max_chunk_size {
            return Err(ConfigError::BlockExceedsChunk {
                block: self.write_block_size(),
                chunk: self.max_chunk_size,
            });
        }
        for (field, value) in [
            ("idle_timeout", self.idle_timeout),
            ("handshake_timeout", self.handshake_timeout),
            ("reassembly_timeout", self.reassembly_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { field });
            }
        }
        let prefix_ok = !self.id_prefix.is_empty()
            && self.id_prefix.len() <= 16
            && self.id_prefix.bytes().all(|b| b.is_ascii_alphanumeric());
        if !prefix_ok {
            return Err(ConfigError::IdPrefix(self.id_prefix.clone()));
        }
        Ok(())
    }
}

/// Builder for [`SessionConfig`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use msrpframe::config::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .max_chunk_size(1024)
///     .write_block_size(256)
///     .idle_timeout(Duration::from_secs(5))
///     .build()
///     .expect("valid config");
/// assert_eq!(config.outbound().write_block_size, 256);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set the largest body slice per chunk.
    #[must_use]
    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.config.max_chunk_size = size;
        self
    }

    /// Set the largest body slice per physical write.
    #[must_use]
    pub fn write_block_size(mut self, size: usize) -> Self {
        self.config.write_block_size = Some(size);
        self
    }

    /// Set the outbound queue limit.
    #[must_use]
    pub fn max_queued_bytes(mut self, bytes: usize) -> Self {
        self.config.max_queued_bytes = bytes;
        self
    }

    /// Set the idle-close delay.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the handshake response deadline.
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the largest accepted inbound header block.
    #[must_use]
    pub fn max_header_size(mut self, size: usize) -> Self {
        self.config.max_header_size = size;
        self
    }

    /// Set the reassembly limits.
    #[must_use]
    pub fn reassembly(mut self, max_message_size: usize, timeout: Duration) -> Self {
        self.config.max_message_size = max_message_size;
        self.config.reassembly_timeout = timeout;
        self
    }

    /// Set the prefix for generated ids.
    #[must_use]
    pub fn id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.id_prefix = prefix.into();
        self
    }

    /// Set the command channel capacity.
    #[must_use]
    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.config.command_capacity = capacity;
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a field is out of range.
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
