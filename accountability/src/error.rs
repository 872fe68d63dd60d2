//! Error types for the accountability core.

use thiserror::Error;

/// Reasons an encoded proof is rejected as garbage.
#[derive(Error, Debug)]
pub enum ProofError {
    /// A message envelope failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// The buffer ended before a declared field or frame.
    #[error("truncated proof: needed {needed} bytes at offset {offset}")]
    Truncated {
        /// Offset at which the read was attempted.
        offset: usize,
        /// Bytes required to complete the read.
        needed: usize,
    },

    /// Bytes remain after the last evidence frame.
    #[error("{0} trailing bytes after proof")]
    TrailingBytes(usize),

    /// The encoded proof exceeds the size limit.
    #[error("proof too large: {size} bytes (max {max} bytes)")]
    TooLarge {
        /// Actual proof size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// More evidence entries than the decoder accepts.
    #[error("too many evidence messages: {count} (max {max})")]
    TooManyEvidence {
        /// Declared evidence count.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Rule id outside the fixed rule set.
    #[error("unknown rule id {0}")]
    UnknownRule(u8),

    /// The subject does not have the shape the declared rule requires.
    #[error("subject shape does not match rule {0}")]
    InvalidSubject(crate::proof::Rule),
}

/// Errors returned by precompile dispatch. Verifier payloads never error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrecompileError {
    /// No verifier is installed at the address.
    #[error("no precompile at address {0}")]
    UnknownAddress(solana_pubkey::Pubkey),

    /// The call's gas limit is below the verifier's fixed cost.
    #[error("out of gas: required {required}, limit {limit}")]
    OutOfGas {
        /// Fixed cost of the verifier.
        required: u64,
        /// Gas supplied by the caller.
        limit: u64,
    },
}

/// Convenience result type for proof encoding and decoding.
pub type Result<T> = std::result::Result<T, ProofError>;
