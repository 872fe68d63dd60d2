//! Configuration for the accountability service.

/// Configuration for the accountability orchestrator.
///
/// Heights are counted in blocks, durations in milliseconds.
#[derive(Debug, Clone)]
pub struct AccountabilityConfig {
    /// How far behind head the rule scan runs. Messages for a height keep
    /// arriving for a while after it is finalized; scanning too early turns
    /// late votes into spurious accusations.
    /// Default: 5.
    pub delta: u64,

    /// Extra heights kept after the scan window before messages are
    /// garbage-collected. Retention is `delta + retention_margin`.
    /// Default: 55.
    pub retention_margin: u64,

    /// How many heights beyond `head + 1` a message may be and still be
    /// buffered.
    /// Default: 10.
    pub max_future_height: u64,

    /// Cap on buffered future-height messages.
    pub max_future_messages: usize,

    /// Upper bound of the random delay before a batch is submitted.
    pub max_submit_delay_ms: u64,

    /// Interval between flushes of the pending-proof queue.
    pub flush_interval_ms: u64,

    /// Maximum proofs per submitted batch; the remainder stays queued.
    pub max_batch_size: usize,

    /// Size of the inbound event channels.
    pub channel_buffer_size: usize,
}

impl Default for AccountabilityConfig {
    fn default() -> Self {
        Self {
            delta: 5,
            retention_margin: 55,
            max_future_height: 10,
            max_future_messages: 10_000,
            max_submit_delay_ms: 3_000,
            flush_interval_ms: 1_000,
            max_batch_size: 64,
            channel_buffer_size: 1_000,
        }
    }
}

impl AccountabilityConfig {
    /// Create a config suitable for local testing: short windows, no delay.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            delta: 2,
            retention_margin: 8,
            max_future_height: 4,
            max_future_messages: 100,
            max_submit_delay_ms: 0,
            flush_interval_ms: 10,
            max_batch_size: 16,
            channel_buffer_size: 64,
        }
    }

    /// Heights kept in the message store behind head.
    pub fn retention(&self) -> u64 {
        self.delta.saturating_add(self.retention_margin)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delta == 0 {
            return Err(ConfigError::InvalidDelta);
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidFlushInterval);
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.channel_buffer_size == 0 {
            return Err(ConfigError::InvalidChannelBuffer);
        }
        Ok(())
    }
}

/// Errors in accountability configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("delta must be > 0")]
    InvalidDelta,
    #[error("flush_interval_ms must be > 0")]
    InvalidFlushInterval,
    #[error("max_batch_size must be > 0")]
    InvalidBatchSize,
    #[error("channel_buffer_size must be > 0")]
    InvalidChannelBuffer,
}
