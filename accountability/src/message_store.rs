//! Indexed log of signed consensus messages.
//!
//! Messages are bucketed by (height, round, type, sender). A second,
//! differently-hashed message landing in an occupied bucket is equivocation:
//! it is stored alongside the first, and the prior entries are handed back
//! as evidence. Identical re-delivery is a no-op.
//!
//! The whole store sits behind one coarse read/write lock. `save` holds the
//! write lock across the conflict check and the insert.

use {
    crate::types::{MessageType, SignedMessage},
    log::*,
    parking_lot::RwLock,
    solana_pubkey::Pubkey,
    std::collections::BTreeMap,
};

type SenderBuckets = BTreeMap<Pubkey, Vec<SignedMessage>>;
type TypeBuckets = BTreeMap<MessageType, SenderBuckets>;
type RoundBuckets = BTreeMap<u32, TypeBuckets>;

/// Result of [`MessageStore::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// First message in its bucket.
    Inserted,
    /// Byte-identical message already stored; nothing changed.
    Duplicate,
    /// The bucket already held different message(s), returned here. The new
    /// message was stored as well.
    Equivocation(Vec<SignedMessage>),
}

impl SaveOutcome {
    pub fn is_equivocation(&self) -> bool {
        matches!(self, SaveOutcome::Equivocation(_))
    }

    /// Prior messages conflicting with the saved one (empty unless equivocation).
    pub fn conflicting(&self) -> &[SignedMessage] {
        match self {
            SaveOutcome::Equivocation(prior) => prior,
            SaveOutcome::Inserted | SaveOutcome::Duplicate => &[],
        }
    }
}

#[derive(Debug, Default)]
struct Buckets {
    heights: BTreeMap<u64, RoundBuckets>,
    len: usize,
}

/// Thread-safe message log, indexed height → round → type → sender.
#[derive(Debug, Default)]
pub struct MessageStore {
    inner: RwLock<Buckets>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `msg`, detecting equivocation against its bucket.
    pub fn save(&self, msg: SignedMessage) -> SaveOutcome {
        let mut guard = self.inner.write();
        let Buckets { heights, len } = &mut *guard;

        let bucket = heights
            .entry(msg.height)
            .or_default()
            .entry(msg.round)
            .or_default()
            .entry(msg.msg_type)
            .or_default()
            .entry(msg.sender)
            .or_default();

        let hash = msg.hash();
        if bucket.iter().any(|stored| stored.hash() == hash) {
            return SaveOutcome::Duplicate;
        }

        *len = len.saturating_add(1);
        if bucket.is_empty() {
            bucket.push(msg);
            return SaveOutcome::Inserted;
        }

        warn!("equivocation detected: {msg} conflicts with {} stored message(s)", bucket.len());
        let prior = bucket.clone();
        bucket.push(msg);
        SaveOutcome::Equivocation(prior)
    }

    /// All messages at `height` matching `predicate`, in (round, type,
    /// sender, arrival) order.
    pub fn query<F>(&self, height: u64, predicate: F) -> Vec<SignedMessage>
    where
        F: Fn(&SignedMessage) -> bool,
    {
        let guard = self.inner.read();
        let Some(rounds) = guard.heights.get(&height) else {
            return Vec::new();
        };
        rounds
            .values()
            .flat_map(|types| types.values())
            .flat_map(|senders| senders.values())
            .flatten()
            .filter(|msg| predicate(msg))
            .cloned()
            .collect()
    }

    /// Every message stored at `height`, read under a single lock.
    pub fn snapshot(&self, height: u64) -> Vec<SignedMessage> {
        self.query(height, |_| true)
    }

    /// Messages in one (height, round, type, sender) bucket.
    pub fn bucket(
        &self,
        height: u64,
        round: u32,
        msg_type: MessageType,
        sender: &Pubkey,
    ) -> Vec<SignedMessage> {
        self.inner
            .read()
            .heights
            .get(&height)
            .and_then(|rounds| rounds.get(&round))
            .and_then(|types| types.get(&msg_type))
            .and_then(|senders| senders.get(sender))
            .cloned()
            .unwrap_or_default()
    }

    /// Purge all buckets at `height`. Returns the number of messages removed.
    pub fn delete_height(&self, height: u64) -> usize {
        let mut guard = self.inner.write();
        let removed = guard
            .heights
            .remove(&height)
            .map(|rounds| count_messages(&rounds))
            .unwrap_or(0);
        guard.len = guard.len.saturating_sub(removed);
        removed
    }

    /// Purge every height strictly below `height`.
    pub fn delete_below(&self, height: u64) -> usize {
        let mut guard = self.inner.write();
        let kept = guard.heights.split_off(&height);
        let dropped = std::mem::replace(&mut guard.heights, kept);
        let removed = dropped
            .values()
            .fold(0usize, |acc, rounds| acc.saturating_add(count_messages(rounds)));
        guard.len = guard.len.saturating_sub(removed);
        if removed > 0 {
            debug!("pruned {removed} messages below height {height}");
        }
        removed
    }

    /// Heights currently held, ascending.
    pub fn heights(&self) -> Vec<u64> {
        self.inner.read().heights.keys().copied().collect()
    }

    /// Total number of stored messages.
    pub fn len(&self) -> usize {
        self.inner.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn count_messages(rounds: &RoundBuckets) -> usize {
    rounds
        .values()
        .flat_map(|types| types.values())
        .flat_map(|senders| senders.values())
        .fold(0usize, |acc, bucket| acc.saturating_add(bucket.len()))
}
