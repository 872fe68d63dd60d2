//! On-chain proof verifiers.
//!
//! Each verifier takes encoded proof bytes and returns a fixed 96-byte
//! payload: `[sender: 32][message hash: 32][result: 32]`, where the result
//! word is the big-endian integer 1 on acceptance. Any rejection returns 96
//! zero bytes. Verifiers only consult the committee recorded at the header
//! preceding the subject's height, so every node replaying the chain reaches
//! the same verdict.

mod accusation;
mod innocence;
mod misbehaviour;

pub use {
    accusation::AccusationVerifier, innocence::InnocenceVerifier,
    misbehaviour::MisbehaviourVerifier,
};
use {
    crate::{
        chain::ChainReader,
        committee::Committee,
        proof::{Proof, ProofKind},
        types::SignedMessage,
    },
    log::*,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    std::collections::HashSet,
};

/// Length of every verifier output.
pub const VERIFIER_OUTPUT_LEN: usize = 96;

/// Decoded form of a verifier result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifierOutput {
    pub sender: Pubkey,
    pub msg_hash: Hash,
    pub accepted: bool,
}

impl VerifierOutput {
    /// The fixed failure payload.
    pub fn reject() -> Self {
        Self {
            sender: Pubkey::default(),
            msg_hash: Hash::default(),
            accepted: false,
        }
    }

    pub fn accept(proof: &Proof) -> Self {
        Self {
            sender: proof.sender(),
            msg_hash: proof.msg_hash(),
            accepted: true,
        }
    }

    pub fn to_bytes(&self) -> [u8; VERIFIER_OUTPUT_LEN] {
        let mut out = [0u8; VERIFIER_OUTPUT_LEN];
        if self.accepted {
            out[..32].copy_from_slice(self.sender.as_ref());
            out[32..64].copy_from_slice(self.msg_hash.as_ref());
            out[95] = 1;
        }
        out
    }

    /// Parse a verifier payload. Anything but a well-formed acceptance reads
    /// as a rejection.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let Ok(bytes) = <&[u8; VERIFIER_OUTPUT_LEN]>::try_from(bytes) else {
            return Self::reject();
        };
        let (head, result) = bytes.split_at(64);
        let (sender, msg_hash) = head.split_at(32);
        let accepted = result.last() == Some(&1) && result.iter().rev().skip(1).all(|b| *b == 0);
        if !accepted {
            return Self::reject();
        }
        Self {
            sender: Pubkey::try_from(sender).unwrap_or_default(),
            msg_hash: Hash::new_from_array(<[u8; 32]>::try_from(msg_hash).unwrap_or_default()),
            accepted,
        }
    }
}

/// Common decode and authentication path shared by the three verifiers.
pub trait ProofVerifier: Send + Sync {
    /// Kind of proof this verifier accepts.
    fn kind(&self) -> ProofKind;

    fn chain(&self) -> &dyn ChainReader;

    /// Rule-specific validation of an authenticated proof.
    fn check(&self, proof: &Proof, committee: &Committee) -> bool;

    /// Verify encoded proof bytes.
    fn verify(&self, input: &[u8]) -> VerifierOutput {
        let proof = match Proof::decode(self.kind(), input) {
            Ok(proof) => proof,
            Err(err) => {
                debug!("{} verifier: garbage proof: {err}", self.kind());
                return VerifierOutput::reject();
            }
        };
        let Some(committee) = self.chain().committee_for(proof.message.height) else {
            debug!(
                "{} verifier: no committee for height {}",
                self.kind(),
                proof.message.height
            );
            return VerifierOutput::reject();
        };
        if !is_signed_by_member(&proof.message, &committee) {
            debug!("{} verifier: subject {} not authenticated", self.kind(), proof.message);
            return VerifierOutput::reject();
        }
        if !self.check(&proof, &committee) {
            debug!("{} verifier: rejected {proof}", self.kind());
            return VerifierOutput::reject();
        }
        VerifierOutput::accept(&proof)
    }
}

// ── Shared checks ───────────────────────────────────────────────────────────

pub(crate) fn is_signed_by_member(msg: &SignedMessage, committee: &Committee) -> bool {
    committee.contains(&msg.sender) && msg.verify_signature()
}

/// Every evidence message is well formed, at the subject's height and signed
/// by a committee member.
pub(crate) fn evidence_authenticated(proof: &Proof, committee: &Committee) -> bool {
    proof.evidence.iter().all(|msg| {
        msg.height == proof.message.height
            && msg.is_well_formed()
            && is_signed_by_member(msg, committee)
    })
}

pub(crate) fn has_distinct_senders(msgs: &[SignedMessage]) -> bool {
    let mut senders = HashSet::new();
    msgs.iter().all(|msg| senders.insert(msg.sender))
}

/// `votes` are prevotes at `round` satisfying `value_matches`, from distinct
/// senders, whose combined power reaches quorum.
pub(crate) fn is_prevote_quorum<F>(
    committee: &Committee,
    votes: &[SignedMessage],
    round: u32,
    value_matches: F,
) -> bool
where
    F: Fn(Option<Hash>) -> bool,
{
    !votes.is_empty()
        && votes
            .iter()
            .all(|v| v.is_prevote() && v.round == round && value_matches(v.value))
        && has_distinct_senders(votes)
        && committee.power_of_senders(votes.iter().map(|v| &v.sender)) >= committee.quorum()
}

/// `proposal` proposes the subject's value at the subject's round and comes
/// from the proposer elected for that round.
pub(crate) fn is_matching_proposal(
    committee: &Committee,
    proposal: &SignedMessage,
    subject: &SignedMessage,
) -> bool {
    proposal.is_proposal()
        && proposal.round == subject.round
        && committee.is_proposer(&proposal.sender, proposal.height, proposal.round)
        && proposal.value.is_some()
        && proposal.value == subject.value
}
