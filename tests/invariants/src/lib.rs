//! TRv1 Property-Based Invariant Tests
//!
//! Uses proptest to verify accountability invariants:
//! - Quorum arithmetic (any two quorums overlap in more than `f` power)
//! - Message store idempotence and equivocation detection
//! - Proof decoding and precompile execution on hostile input
//! - Rule scans over honest rounds

pub mod accountability_invariants;
