//! Shared fixtures for tests: a signing committee and an in-memory chain.

use {
    crate::{
        chain::{ChainReader, Header},
        committee::Committee,
        proof::{OnChainProof, ProofKind},
        types::{ProposedBlock, SignedMessage},
    },
    parking_lot::RwLock,
    solana_hash::Hash,
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_signer::Signer,
    std::{
        collections::{BTreeMap, HashSet},
        sync::Arc,
    },
};

/// Install `env_logger` for tests; repeated calls are harmless.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A committee of freshly generated keypairs.
///
/// Validators are addressed by their creation index. Values are tagged by a
/// small integer so tests can say "value 1" and "value 2".
pub struct TestCommittee {
    keypairs: Vec<Keypair>,
    committee: Arc<Committee>,
}

impl TestCommittee {
    /// `n` validators with one unit of voting power each.
    pub fn new(n: usize) -> Self {
        Self::with_powers(&vec![1; n])
    }

    pub fn with_powers(powers: &[u64]) -> Self {
        let keypairs: Vec<Keypair> = powers.iter().map(|_| Keypair::new()).collect();
        let committee = Committee::new(
            keypairs
                .iter()
                .zip(powers)
                .map(|(kp, power)| (kp.pubkey(), *power))
                .collect(),
        );
        Self {
            keypairs,
            committee: Arc::new(committee),
        }
    }

    pub fn len(&self) -> usize {
        self.keypairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypairs.is_empty()
    }

    pub fn committee(&self) -> Arc<Committee> {
        self.committee.clone()
    }

    pub fn keypair(&self, index: usize) -> &Keypair {
        &self.keypairs[index]
    }

    pub fn pubkey(&self, index: usize) -> Pubkey {
        self.keypairs[index].pubkey()
    }

    /// Index of the elected proposer for `(height, round)`.
    pub fn proposer_index(&self, height: u64, round: u32) -> usize {
        let proposer = self
            .committee
            .proposer_for_round(height, round)
            .expect("non-empty committee");
        self.keypairs
            .iter()
            .position(|kp| kp.pubkey() == proposer)
            .expect("proposer is a member")
    }

    /// Block carrying value `tag` at `height`.
    pub fn block(&self, height: u64, tag: u8) -> ProposedBlock {
        ProposedBlock {
            parent_hash: Hash::default(),
            height,
            timestamp: i64::from(tag),
            transactions: vec![vec![tag; 16]],
            state_root: solana_sha256_hasher::hash(&[tag]),
            proposer: Pubkey::default(),
        }
    }

    /// The value (block hash) identified by `tag` at `height`.
    pub fn value(&self, height: u64, tag: u8) -> Hash {
        self.block(height, tag).hash()
    }

    pub fn proposal(
        &self,
        index: usize,
        height: u64,
        round: u32,
        valid_round: Option<u32>,
        tag: u8,
    ) -> SignedMessage {
        SignedMessage::proposal(round, self.block(height, tag), valid_round, self.keypair(index))
    }

    /// Prevote for value `tag`, or nil.
    pub fn prevote(&self, index: usize, height: u64, round: u32, tag: Option<u8>) -> SignedMessage {
        let value = tag.map(|tag| self.value(height, tag));
        SignedMessage::prevote(height, round, value, self.keypair(index))
    }

    /// Precommit for value `tag`, or nil.
    pub fn precommit(
        &self,
        index: usize,
        height: u64,
        round: u32,
        tag: Option<u8>,
    ) -> SignedMessage {
        let value = tag.map(|tag| self.value(height, tag));
        SignedMessage::precommit(height, round, value, self.keypair(index))
    }

    /// A chain whose headers `0..=head` all carry this committee.
    pub fn chain(&self, head: u64) -> MemoryChain {
        let chain = MemoryChain::new();
        for height in 0..=head {
            chain.insert_header(height, self.committee());
        }
        chain
    }
}

/// In-memory [`ChainReader`] with mutable accusation and proof registries.
#[derive(Default)]
pub struct MemoryChain {
    headers: RwLock<BTreeMap<u64, Header>>,
    accusations: RwLock<Vec<OnChainProof>>,
    recorded: RwLock<HashSet<(Hash, ProofKind)>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_header(&self, height: u64, committee: Arc<Committee>) {
        self.headers
            .write()
            .insert(height, Header { height, committee });
    }

    /// Open an accusation; it is also recorded as an existing proof.
    pub fn add_accusation(&self, proof: OnChainProof) {
        self.record_proof(proof.msg_hash, proof.kind);
        self.accusations.write().push(proof);
    }

    pub fn clear_accusations(&self) {
        self.accusations.write().clear();
    }

    pub fn record_proof(&self, msg_hash: Hash, kind: ProofKind) {
        self.recorded.write().insert((msg_hash, kind));
    }
}

impl ChainReader for MemoryChain {
    fn header_by_number(&self, height: u64) -> Option<Header> {
        self.headers.read().get(&height).cloned()
    }

    fn pending_accusations(&self) -> Vec<OnChainProof> {
        self.accusations.read().clone()
    }

    fn proof_exists(&self, msg_hash: &Hash, kind: ProofKind) -> bool {
        self.recorded.read().contains(&(*msg_hash, kind))
    }
}
