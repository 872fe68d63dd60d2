//! Signed consensus messages as observed by the accountability layer.
//!
//! A [`SignedMessage`] carries its sender explicitly. The ed25519 signature
//! covers `(type, height, round, value, valid_round, sender)`; a proposal's
//! block is bound through `value == block.hash()`, so a proposal can be
//! stripped down to a light proposal without invalidating its signature.

use {
    serde::{Deserialize, Serialize},
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    solana_signature::Signature,
    solana_signer::Signer,
};

/// Domain separator prepended to every signing payload.
const SIGNING_DOMAIN: &[u8] = b"trv1-bft-msg-v1";

// ---------------------------------------------------------------------------
// Message type
// ---------------------------------------------------------------------------

/// The three message types of a Tendermint round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageType {
    Proposal,
    Prevote,
    Precommit,
}

impl MessageType {
    fn code(self) -> u8 {
        match self {
            MessageType::Proposal => 0,
            MessageType::Prevote => 1,
            MessageType::Precommit => 2,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Proposal => write!(f, "Proposal"),
            MessageType::Prevote => write!(f, "Prevote"),
            MessageType::Precommit => write!(f, "Precommit"),
        }
    }
}

// ---------------------------------------------------------------------------
// Block payload
// ---------------------------------------------------------------------------

/// A block proposed by a leader during the Propose phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedBlock {
    /// Hash of the parent (previous committed) block.
    pub parent_hash: Hash,
    /// Block height.
    pub height: u64,
    /// Unix timestamp in milliseconds when the block was proposed.
    pub timestamp: i64,
    /// Opaque serialized transactions; the runtime layer decodes these.
    pub transactions: Vec<Vec<u8>>,
    /// Merkle root of the post-execution state.
    pub state_root: Hash,
    /// Public key of the proposer.
    pub proposer: Pubkey,
}

impl ProposedBlock {
    /// Deterministic block hash. Transactions are captured via `state_root`.
    pub fn hash(&self) -> Hash {
        solana_sha256_hasher::hashv(&[
            self.parent_hash.as_ref(),
            &self.height.to_le_bytes(),
            &self.timestamp.to_le_bytes(),
            self.state_root.as_ref(),
            self.proposer.as_ref(),
        ])
    }
}

// ---------------------------------------------------------------------------
// Signed message
// ---------------------------------------------------------------------------

/// A signed proposal, prevote or precommit.
///
/// `value == None` is a nil vote. `valid_round == None` on a proposal means
/// a new value (Tendermint's `validRound = -1`); votes never carry one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub msg_type: MessageType,
    pub height: u64,
    pub round: u32,
    pub value: Option<Hash>,
    pub valid_round: Option<u32>,
    pub sender: Pubkey,
    pub signature: Signature,
    /// Full block for proposals received from the network; `None` once the
    /// proposal is embedded in a proof.
    pub block: Option<ProposedBlock>,
}

impl SignedMessage {
    /// Create and sign a proposal for `block`.
    pub fn proposal<S: Signer + ?Sized>(
        round: u32,
        block: ProposedBlock,
        valid_round: Option<u32>,
        signer: &S,
    ) -> Self {
        let height = block.height;
        let value = Some(block.hash());
        Self::new_signed(
            MessageType::Proposal,
            height,
            round,
            value,
            valid_round,
            Some(block),
            signer,
        )
    }

    /// Create and sign a prevote.
    pub fn prevote<S: Signer + ?Sized>(
        height: u64,
        round: u32,
        value: Option<Hash>,
        signer: &S,
    ) -> Self {
        Self::new_signed(MessageType::Prevote, height, round, value, None, None, signer)
    }

    /// Create and sign a precommit.
    pub fn precommit<S: Signer + ?Sized>(
        height: u64,
        round: u32,
        value: Option<Hash>,
        signer: &S,
    ) -> Self {
        Self::new_signed(MessageType::Precommit, height, round, value, None, None, signer)
    }

    fn new_signed<S: Signer + ?Sized>(
        msg_type: MessageType,
        height: u64,
        round: u32,
        value: Option<Hash>,
        valid_round: Option<u32>,
        block: Option<ProposedBlock>,
        signer: &S,
    ) -> Self {
        let mut msg = Self {
            msg_type,
            height,
            round,
            value,
            valid_round,
            sender: signer.pubkey(),
            signature: Signature::default(),
            block,
        };
        msg.signature = signer.sign_message(&msg.signing_bytes());
        msg
    }

    /// The bytes covered by the signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(96);
        buf.extend_from_slice(SIGNING_DOMAIN);
        buf.push(self.msg_type.code());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(&self.round.to_le_bytes());
        match &self.value {
            Some(value) => {
                buf.push(1);
                buf.extend_from_slice(value.as_ref());
            }
            None => buf.push(0),
        }
        match self.valid_round {
            Some(vr) => {
                buf.push(1);
                buf.extend_from_slice(&vr.to_le_bytes());
            }
            None => buf.push(0),
        }
        buf.extend_from_slice(self.sender.as_ref());
        buf
    }

    /// Message hash: `sha256(signing bytes || signature)`.
    ///
    /// Independent of whether the proposal block is attached.
    pub fn hash(&self) -> Hash {
        solana_sha256_hasher::hashv(&[&self.signing_bytes(), self.signature.as_ref()])
    }

    /// Check the signature against the declared sender.
    pub fn verify_signature(&self) -> bool {
        self.signature
            .verify(self.sender.as_ref(), &self.signing_bytes())
    }

    /// Structural sanity of the envelope, independent of any committee.
    pub fn is_well_formed(&self) -> bool {
        match self.msg_type {
            MessageType::Proposal => {
                let Some(value) = self.value else {
                    return false;
                };
                if self.valid_round.is_some_and(|vr| vr >= self.round) {
                    return false;
                }
                match &self.block {
                    Some(block) => block.height == self.height && block.hash() == value,
                    None => true,
                }
            }
            MessageType::Prevote | MessageType::Precommit => {
                self.valid_round.is_none() && self.block.is_none()
            }
        }
    }

    /// Copy of this message without the proposal block.
    pub fn to_light(&self) -> Self {
        Self {
            block: None,
            ..self.clone()
        }
    }

    pub fn is_proposal(&self) -> bool {
        self.msg_type == MessageType::Proposal
    }

    pub fn is_prevote(&self) -> bool {
        self.msg_type == MessageType::Prevote
    }

    pub fn is_precommit(&self) -> bool {
        self.msg_type == MessageType::Precommit
    }

    /// True for a vote (or proposal) on a concrete value.
    pub fn is_non_nil(&self) -> bool {
        self.value.is_some()
    }
}

impl std::fmt::Display for SignedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} h={} r={} from {}",
            self.msg_type, self.height, self.round, self.sender
        )
    }
}
