//! Event-driven coordinator between the consensus feeds, the message store
//! and proof submission.
//!
//! The orchestrator itself is synchronous; [`crate::service`] drives it from
//! tokio tasks. The message store has its own lock, and the orchestrator's
//! queues sit behind a separate mutex that is never held while calling into
//! the store, the rule engine or the chain.

use {
    crate::config::AccountabilityConfig,
    log::*,
    parking_lot::Mutex,
    solana_pubkey::Pubkey,
    std::{collections::BTreeMap, sync::Arc},
    trv1_accountability::{
        build_innocence, sort_and_dedup, ChainReader, MessageStore, Proof, ProofKind, Rule,
        RuleEngine, SaveOutcome, SignedMessage,
    },
};

/// A newly finalized block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEvent {
    pub height: u64,
}

/// Why an inbound message was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Sender is not in the committee at `height - 1`.
    NotCommitteeMember,
    InvalidSignature,
    /// Envelope inconsistent with its type (e.g. proposal without a block).
    MalformedShape,
    /// Below the retention window.
    TooOld,
    /// Too far ahead of head, or the future buffer is full.
    TooFarInFuture,
    /// No header is known for `height - 1`.
    UnknownCommittee,
}

/// Result of [`Orchestrator::on_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Stored,
    Duplicate,
    /// Stored, and a misbehaviour proof was queued.
    Equivocation,
    /// Held until head catches up.
    Buffered,
    Dropped(DropReason),
}

#[derive(Default)]
struct State {
    head: u64,
    /// Total voting power of the committee signing at each height.
    voting_power: BTreeMap<u64, u64>,
    future: BTreeMap<u64, Vec<SignedMessage>>,
    future_len: usize,
    pending: Vec<Proof>,
}

pub struct Orchestrator {
    config: AccountabilityConfig,
    identity: Pubkey,
    chain: Arc<dyn ChainReader>,
    store: MessageStore,
    state: Mutex<State>,
}

impl Orchestrator {
    pub fn new(config: AccountabilityConfig, identity: Pubkey, chain: Arc<dyn ChainReader>) -> Self {
        Self {
            config,
            identity,
            chain,
            store: MessageStore::new(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn identity(&self) -> &Pubkey {
        &self.identity
    }

    pub fn config(&self) -> &AccountabilityConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<dyn ChainReader> {
        &self.chain
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn head(&self) -> u64 {
        self.state.lock().head
    }

    /// Total power of the committee that signs messages at `height`, known
    /// once the block at `height - 1` has been seen.
    pub fn voting_power_at(&self, height: u64) -> Option<u64> {
        self.state.lock().voting_power.get(&height).copied()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn buffered_len(&self) -> usize {
        self.state.lock().future_len
    }

    // ── Block events ─────────────────────────────────────────────────────────

    /// Handle a newly finalized block at `height`.
    pub fn on_new_block(&self, height: u64) {
        let total_power = self
            .chain
            .header_by_number(height)
            .map(|header| header.committee.total_power());

        let ready = {
            let mut state = self.state.lock();
            if let Some(power) = total_power {
                state.voting_power.insert(height.saturating_add(1), power);
            }
            state.head = state.head.max(height);
            let keep_from = state.head.saturating_add(2);
            let later = state.future.split_off(&keep_from);
            let ready = std::mem::replace(&mut state.future, later);
            let flushed = ready.values().map(Vec::len).sum::<usize>();
            state.future_len = state.future_len.saturating_sub(flushed);
            ready
        };

        for msg in ready.into_values().flatten() {
            let outcome = self.on_message(msg);
            trace!("flushed buffered message: {outcome:?}");
        }

        self.answer_accusations();
        self.scan(height);
        self.garbage_collect();
    }

    /// Build innocence proofs for open accusations naming this node.
    ///
    /// An accusation is answered again on every block for as long as it stays
    /// open on-chain, since an earlier submission may never have landed.
    fn answer_accusations(&self) {
        for record in self.chain.pending_accusations() {
            if record.sender != self.identity {
                continue;
            }
            if self.chain.proof_exists(&record.msg_hash, ProofKind::Innocence) {
                continue;
            }
            let accusation = match record.decode_proof() {
                Ok(accusation) => accusation,
                Err(err) => {
                    warn!("undecodable accusation {}: {err}", record.msg_hash);
                    continue;
                }
            };
            let height = accusation.message.height;
            let Some(committee) = self.chain.committee_for(height) else {
                continue;
            };
            match build_innocence(&accusation, &self.store, &committee) {
                Some(innocence) => {
                    info!("answering {} accusation on {}", accusation.rule, accusation.message);
                    self.state.lock().pending.push(innocence);
                }
                None => warn!(
                    "cannot yet answer {} accusation on {}: evidence missing",
                    accusation.rule, accusation.message
                ),
            }
        }
    }

    /// Run the rule engine over `head - delta`.
    fn scan(&self, head: u64) {
        let Some(height) = head.checked_sub(self.config.delta) else {
            return;
        };
        let Some(committee) = self.chain.committee_for(height) else {
            debug!("no committee for height {height}, skipping rule scan");
            return;
        };
        let proofs = RuleEngine::new(&committee).run(&self.store, height);
        for proof in proofs {
            self.queue(proof);
        }
    }

    fn garbage_collect(&self) {
        let cutoff = {
            let mut state = self.state.lock();
            let Some(cutoff) = state.head.checked_sub(self.config.retention()) else {
                return;
            };
            state.voting_power = state.voting_power.split_off(&cutoff);
            cutoff
        };
        self.store.delete_below(cutoff);
    }

    // ── Message events ───────────────────────────────────────────────────────

    /// Validate and store an inbound consensus message.
    pub fn on_message(&self, msg: SignedMessage) -> MessageOutcome {
        if let Some(outcome) = self.buffer_or_reject_by_height(&msg) {
            return outcome;
        }

        let Some(committee) = self.chain.committee_for(msg.height) else {
            return self.drop_message(&msg, DropReason::UnknownCommittee);
        };
        if !committee.contains(&msg.sender) {
            return self.drop_message(&msg, DropReason::NotCommitteeMember);
        }
        if !msg.is_well_formed() || (msg.is_proposal() && msg.block.is_none()) {
            return self.drop_message(&msg, DropReason::MalformedShape);
        }
        if !msg.verify_signature() {
            return self.drop_message(&msg, DropReason::InvalidSignature);
        }

        if msg.is_proposal() && !committee.is_proposer(&msg.sender, msg.height, msg.round) {
            warn!("proposal {msg} is not from the elected proposer");
            self.queue(Proof::misbehaviour(Rule::InvalidProposer, msg.to_light(), vec![]));
        }

        let light = msg.to_light();
        match self.store.save(msg) {
            SaveOutcome::Inserted => MessageOutcome::Stored,
            SaveOutcome::Duplicate => MessageOutcome::Duplicate,
            SaveOutcome::Equivocation(prior) => {
                let evidence = prior.iter().map(SignedMessage::to_light).collect();
                self.queue(Proof::misbehaviour(Rule::Equivocation, light, evidence));
                MessageOutcome::Equivocation
            }
        }
    }

    fn buffer_or_reject_by_height(&self, msg: &SignedMessage) -> Option<MessageOutcome> {
        let mut state = self.state.lock();
        let next = state.head.saturating_add(1);

        if msg.height > next {
            let limit = next.saturating_add(self.config.max_future_height);
            if msg.height > limit || state.future_len >= self.config.max_future_messages {
                drop(state);
                return Some(self.drop_message(msg, DropReason::TooFarInFuture));
            }
            state.future.entry(msg.height).or_default().push(msg.clone());
            state.future_len = state.future_len.saturating_add(1);
            trace!("buffered {msg} (head {})", state.head);
            return Some(MessageOutcome::Buffered);
        }

        if msg.height < state.head.saturating_sub(self.config.retention()) {
            drop(state);
            return Some(self.drop_message(msg, DropReason::TooOld));
        }
        None
    }

    fn drop_message(&self, msg: &SignedMessage, reason: DropReason) -> MessageOutcome {
        warn!("dropping {msg}: {reason:?}");
        MessageOutcome::Dropped(reason)
    }

    // ── Proof queue ──────────────────────────────────────────────────────────

    fn queue(&self, proof: Proof) {
        if proof.sender() == self.identity {
            debug!("not queueing {proof} against self");
            return;
        }
        debug!("queued {proof}");
        self.state.lock().pending.push(proof);
    }

    /// Take the next batch of proofs to submit.
    ///
    /// The queue is sorted and deduplicated, proofs already recorded on-chain
    /// are discarded, and at most `max_batch_size` are returned. The rest
    /// stay queued.
    pub fn take_batch(&self) -> Vec<Proof> {
        let pending = std::mem::take(&mut self.state.lock().pending);
        if pending.is_empty() {
            return pending;
        }

        let mut batch: Vec<Proof> = sort_and_dedup(pending)
            .into_iter()
            .filter(|proof| !self.chain.proof_exists(&proof.msg_hash(), proof.kind))
            .collect();
        if batch.len() > self.config.max_batch_size {
            let rest = batch.split_off(self.config.max_batch_size);
            self.state.lock().pending.extend(rest);
        }
        batch
    }
}
