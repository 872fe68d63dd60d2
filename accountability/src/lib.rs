//! TRv1 BFT Accountability
//!
//! This crate turns the signed messages of the Tendermint-style consensus
//! engine into slashing evidence. It is forensic: it looks at heights that are
//! already a few blocks old and asks whether every proposal, prevote and
//! precommit was justified by what the sender had seen.
//!
//! Three kinds of proof come out of it:
//!
//! - **Misbehaviour**: a definitive violation, provable from the attached
//!   messages alone (equivocation, voting against a lock, precommitting
//!   against a prevote quorum, proposing out of turn).
//! - **Accusation**: the justification for a message is missing from the log.
//!   The accused validator must answer within a window or be slashed.
//! - **Innocence**: the answer, carrying the missing justification.
//!
//! # Architecture
//!
//! ```text
//! signed messages ──▶ MessageStore ──(equivocation)──▶ Proof
//!                          │
//!                          ▼  height = head - delta
//!                      RuleEngine ──▶ Proof ──▶ ProofCodec ──▶ OnChainProof
//!                                                    │
//!                    AccountabilityPrecompiles ◀─────┘
//!                    (accusation / misbehaviour / innocence verifiers,
//!                     committee from ChainReader at height - 1)
//! ```
//!
//! Everything here is synchronous. The event loops that feed the store and
//! submit proofs live in `trv1-accountability-service`.

pub mod chain;
pub mod committee;
pub mod error;
pub mod innocence;
pub mod message_store;
pub mod precompiles;
pub mod proof;
pub mod rules;
#[cfg(any(test, feature = "dev-context-only-utils"))]
pub mod test_utils;
pub mod types;
pub mod verifier;

// Re-exports for convenience
pub use chain::{ChainReader, Header};
pub use committee::{max_faulty_power, quorum_power, Committee, CommitteeMember};
pub use error::{PrecompileError, ProofError, Result};
pub use innocence::build_innocence;
pub use message_store::{MessageStore, SaveOutcome};
pub use precompiles::{
    AccountabilityPrecompiles, Precompile, ACCUSATION_VERIFIER_ADDRESS,
    INNOCENCE_VERIFIER_ADDRESS, MISBEHAVIOUR_VERIFIER_ADDRESS,
};
pub use proof::{OnChainProof, Proof, ProofKind, Rule};
pub use rules::{sort_and_dedup, RuleEngine};
pub use types::{MessageType, ProposedBlock, SignedMessage};
pub use verifier::{
    AccusationVerifier, InnocenceVerifier, MisbehaviourVerifier, ProofVerifier, VerifierOutput,
};
