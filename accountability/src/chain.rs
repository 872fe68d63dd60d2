//! Read-only view of the chain consumed by the accountability layer.

use {
    crate::{
        committee::Committee,
        proof::{OnChainProof, ProofKind},
    },
    solana_hash::Hash,
    std::sync::Arc,
};

/// The parts of a finalized block header the accountability layer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub height: u64,
    /// Committee that will vote on height `height + 1`.
    pub committee: Arc<Committee>,
}

/// Chain state queried by the orchestrator and the on-chain verifiers.
pub trait ChainReader: Send + Sync {
    /// Header of the finalized block at `height`, if known.
    fn header_by_number(&self, height: u64) -> Option<Header>;

    /// Accusations currently open in the on-chain registry.
    fn pending_accusations(&self) -> Vec<OnChainProof>;

    /// Whether a proof of `kind` about `msg_hash` is already recorded.
    fn proof_exists(&self, msg_hash: &Hash, kind: ProofKind) -> bool;

    /// Committee authorised to sign messages at `height`, read from the
    /// header at `height - 1`.
    fn committee_for(&self, height: u64) -> Option<Arc<Committee>> {
        let parent = height.checked_sub(1)?;
        self.header_by_number(parent).map(|header| header.committee)
    }
}
