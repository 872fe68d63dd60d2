//! Accountability proofs and their canonical encoding.
//!
//! A [`Proof`] names a rule, a subject message and the evidence backing the
//! claim. It is encoded once into the flat buffer consumed by the on-chain
//! verifiers:
//!
//! ```text
//! [rule: u8]
//! [subject_len: u32-le][subject: bincode SignedMessage]
//! [evidence_count: u32-le]
//!   { [len: u32-le][bincode SignedMessage] } * evidence_count
//! ```
//!
//! Proposals are always embedded as light proposals (no block payload).
//! Decoding is bounded: oversized buffers, oversized frames, excessive
//! evidence counts, unknown rules, truncation, trailing bytes and a subject
//! whose shape does not fit the rule are all rejected as garbage.

use {
    crate::{
        error::{ProofError, Result},
        types::SignedMessage,
    },
    bincode::Options,
    num_enum::{IntoPrimitive, TryFromPrimitive},
    serde::{Deserialize, Serialize},
    solana_hash::Hash,
    solana_pubkey::Pubkey,
};

/// Maximum size of an encoded proof accepted by the decoder.
pub const MAX_PROOF_SIZE: usize = 524_288;

/// Maximum number of evidence messages in one proof.
pub const MAX_EVIDENCE: usize = 1_024;

/// Maximum size of a single encoded message envelope.
pub const MAX_MESSAGE_SIZE: usize = 65_536;

// ---------------------------------------------------------------------------
// Rule and kind identifiers
// ---------------------------------------------------------------------------

/// The fixed accountability rule set.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum Rule {
    /// New proposal by a proposer that already precommitted a value.
    Pn = 0,
    /// Old proposal inconsistent with the proposer's own precommits.
    Po = 1,
    /// Prevote for a new proposal while locked on a different value.
    Pvn = 2,
    /// Precommit contradicting a quorum of prevotes.
    C = 3,
    /// Precommit without a quorum of prevotes for its value.
    C1 = 4,
    /// Two different messages for the same protocol slot.
    Equivocation = 5,
    /// Proposal carrying an invalid block.
    InvalidProposal = 6,
    /// Proposal from a sender that is not the elected proposer.
    InvalidProposer = 7,
    /// Undecodable message.
    GarbageMessage = 8,
}

impl Rule {
    /// Whether `subject` has the structural shape this rule applies to.
    pub fn accepts_subject(self, subject: &SignedMessage) -> bool {
        if !subject.is_well_formed() {
            return false;
        }
        match self {
            Rule::Pn => subject.is_proposal() && subject.valid_round.is_none(),
            Rule::Po => subject.is_proposal() && subject.valid_round.is_some(),
            Rule::Pvn => subject.is_prevote() && subject.is_non_nil(),
            Rule::C | Rule::C1 => subject.is_precommit() && subject.is_non_nil(),
            Rule::InvalidProposal | Rule::InvalidProposer => subject.is_proposal(),
            Rule::Equivocation | Rule::GarbageMessage => true,
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rule::Pn => write!(f, "PN"),
            Rule::Po => write!(f, "PO"),
            Rule::Pvn => write!(f, "PVN"),
            Rule::C => write!(f, "C"),
            Rule::C1 => write!(f, "C1"),
            Rule::Equivocation => write!(f, "Equivocation"),
            Rule::InvalidProposal => write!(f, "InvalidProposal"),
            Rule::InvalidProposer => write!(f, "InvalidProposer"),
            Rule::GarbageMessage => write!(f, "GarbageMessage"),
        }
    }
}

/// What a proof asserts about its subject.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum ProofKind {
    /// Definitive violation.
    Misbehaviour = 0,
    /// Corroborating evidence is missing; the sender must answer.
    Accusation = 1,
    /// Rebuttal of an accusation.
    Innocence = 2,
}

impl std::fmt::Display for ProofKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProofKind::Misbehaviour => write!(f, "Misbehaviour"),
            ProofKind::Accusation => write!(f, "Accusation"),
            ProofKind::Innocence => write!(f, "Innocence"),
        }
    }
}

// ---------------------------------------------------------------------------
// Proof
// ---------------------------------------------------------------------------

/// A misbehaviour, accusation or innocence proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub kind: ProofKind,
    pub rule: Rule,
    /// The message the proof is about; its sender is the accused.
    pub message: SignedMessage,
    /// Supporting messages, in rule-specific order.
    pub evidence: Vec<SignedMessage>,
}

impl Proof {
    pub fn misbehaviour(rule: Rule, message: SignedMessage, evidence: Vec<SignedMessage>) -> Self {
        Self {
            kind: ProofKind::Misbehaviour,
            rule,
            message,
            evidence,
        }
    }

    pub fn accusation(rule: Rule, message: SignedMessage, evidence: Vec<SignedMessage>) -> Self {
        Self {
            kind: ProofKind::Accusation,
            rule,
            message,
            evidence,
        }
    }

    pub fn innocence(rule: Rule, message: SignedMessage, evidence: Vec<SignedMessage>) -> Self {
        Self {
            kind: ProofKind::Innocence,
            rule,
            message,
            evidence,
        }
    }

    /// The accused validator.
    pub fn sender(&self) -> Pubkey {
        self.message.sender
    }

    /// Hash of the subject message.
    pub fn msg_hash(&self) -> Hash {
        self.message.hash()
    }

    /// Encode into the canonical flat buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.evidence.len() > MAX_EVIDENCE {
            return Err(ProofError::TooManyEvidence {
                count: self.evidence.len(),
                max: MAX_EVIDENCE,
            });
        }

        let mut buf = Vec::with_capacity(256);
        buf.push(u8::from(self.rule));
        push_frame(&mut buf, &encode_message(&self.message)?)?;
        push_len(&mut buf, self.evidence.len())?;
        for msg in &self.evidence {
            push_frame(&mut buf, &encode_message(msg)?)?;
        }

        if buf.len() > MAX_PROOF_SIZE {
            return Err(ProofError::TooLarge {
                size: buf.len(),
                max: MAX_PROOF_SIZE,
            });
        }
        Ok(buf)
    }

    /// Decode a buffer produced by [`Proof::encode`].
    ///
    /// The kind is not part of the buffer; it is implied by the verifier or
    /// on-chain record the bytes came from.
    pub fn decode(kind: ProofKind, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_PROOF_SIZE {
            return Err(ProofError::TooLarge {
                size: bytes.len(),
                max: MAX_PROOF_SIZE,
            });
        }

        let mut reader = Reader::new(bytes);
        let rule_id = reader.read_u8()?;
        let rule = Rule::try_from(rule_id).map_err(|_| ProofError::UnknownRule(rule_id))?;
        let message = decode_message(reader.read_frame()?)?;

        let count = usize::try_from(reader.read_u32()?).unwrap_or(usize::MAX);
        if count > MAX_EVIDENCE {
            return Err(ProofError::TooManyEvidence {
                count,
                max: MAX_EVIDENCE,
            });
        }
        let mut evidence = Vec::with_capacity(count);
        for _ in 0..count {
            evidence.push(decode_message(reader.read_frame()?)?);
        }

        if reader.remaining() > 0 {
            return Err(ProofError::TrailingBytes(reader.remaining()));
        }
        if !rule.accepts_subject(&message) {
            return Err(ProofError::InvalidSubject(rule));
        }

        Ok(Self {
            kind,
            rule,
            message,
            evidence,
        })
    }

    /// Build the on-chain record for this proof.
    pub fn to_on_chain(&self) -> Result<OnChainProof> {
        Ok(OnChainProof {
            sender: self.sender(),
            msg_hash: self.msg_hash(),
            kind: self.kind,
            raw_proof: self.encode()?,
        })
    }
}

impl std::fmt::Display for Proof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({}) on {} with {} evidence",
            self.kind,
            self.rule,
            self.message,
            self.evidence.len()
        )
    }
}

/// Proof record as stored on-chain and submitted in transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainProof {
    pub sender: Pubkey,
    pub msg_hash: Hash,
    pub kind: ProofKind,
    pub raw_proof: Vec<u8>,
}

impl OnChainProof {
    /// Decode `raw_proof` under this record's kind.
    pub fn decode_proof(&self) -> Result<Proof> {
        Proof::decode(self.kind, &self.raw_proof)
    }
}

// ---------------------------------------------------------------------------
// Framing helpers
// ---------------------------------------------------------------------------

fn envelope_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_MESSAGE_SIZE as u64)
}

fn encode_message(msg: &SignedMessage) -> Result<Vec<u8>> {
    Ok(envelope_options().serialize(&msg.to_light())?)
}

fn decode_message(bytes: &[u8]) -> Result<SignedMessage> {
    Ok(envelope_options().deserialize(bytes)?)
}

fn push_len(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| ProofError::TooLarge {
        size: len,
        max: MAX_PROOF_SIZE,
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn push_frame(buf: &mut Vec<u8>, payload: &[u8]) -> Result<()> {
    push_len(buf, payload.len())?;
    buf.extend_from_slice(payload);
    Ok(())
}

/// Bounds-checked cursor over an encoded proof.
struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8]> {
        let truncated = ProofError::Truncated {
            offset: self.offset,
            needed,
        };
        let end = self
            .offset
            .checked_add(needed)
            .filter(|end| *end <= self.buf.len())
            .ok_or(truncated)?;
        let slice = self.buf.get(self.offset..end).unwrap_or_default();
        self.offset = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?.first().copied().unwrap_or_default())
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn read_frame(&mut self) -> Result<&'a [u8]> {
        let len = usize::try_from(self.read_u32()?).unwrap_or(usize::MAX);
        if len > MAX_MESSAGE_SIZE {
            return Err(ProofError::TooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        self.take(len)
    }
}
