//! Committee snapshots, quorum arithmetic and proposer election.
//!
//! A [`Committee`] is the weighted validator list valid at a given height.
//! Members are sorted by (voting power descending, pubkey ascending) so every
//! node iterates them in the same order, which keeps proposer election and
//! power tallies deterministic.

use {
    solana_pubkey::Pubkey,
    std::collections::{HashMap, HashSet},
};

/// Minimum voting power for a quorum: `ceil(2 * total / 3)`.
pub fn quorum_power(total_power: u64) -> u64 {
    let q = u128::from(total_power)
        .saturating_mul(2)
        .saturating_add(2)
        .checked_div(3)
        .unwrap_or(0);
    u64::try_from(q).unwrap_or(u64::MAX)
}

/// Maximum tolerated faulty power: `ceil(total / 3) - 1`.
pub fn max_faulty_power(total_power: u64) -> u64 {
    let third = u128::from(total_power)
        .saturating_add(2)
        .checked_div(3)
        .unwrap_or(0);
    u64::try_from(third).unwrap_or(u64::MAX).saturating_sub(1)
}

/// A single committee member with its voting power.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitteeMember {
    pub pubkey: Pubkey,
    pub voting_power: u64,
}

/// An ordered, weighted committee snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committee {
    members: Vec<CommitteeMember>,
    index: HashMap<Pubkey, usize>,
    total_power: u64,
}

impl Committee {
    /// Build a committee from `(pubkey, voting_power)` pairs.
    ///
    /// Zero-power entries are dropped; a repeated pubkey keeps its first entry.
    pub fn new(members: Vec<(Pubkey, u64)>) -> Self {
        let mut seen = HashSet::new();
        let mut members: Vec<CommitteeMember> = members
            .into_iter()
            .filter(|(pubkey, power)| *power > 0 && seen.insert(*pubkey))
            .map(|(pubkey, voting_power)| CommitteeMember {
                pubkey,
                voting_power,
            })
            .collect();

        members.sort_by(|a, b| {
            b.voting_power
                .cmp(&a.voting_power)
                .then_with(|| a.pubkey.cmp(&b.pubkey))
        });

        let total_power = members
            .iter()
            .fold(0u64, |acc, m| acc.saturating_add(m.voting_power));
        let index = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.pubkey, i))
            .collect();

        Self {
            members,
            index,
            total_power,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn total_power(&self) -> u64 {
        self.total_power
    }

    /// Quorum threshold for this committee.
    pub fn quorum(&self) -> u64 {
        quorum_power(self.total_power)
    }

    /// Fault threshold for this committee.
    pub fn max_faulty(&self) -> u64 {
        max_faulty_power(self.total_power)
    }

    pub fn get(&self, index: usize) -> Option<&CommitteeMember> {
        self.members.get(index)
    }

    pub fn member(&self, pubkey: &Pubkey) -> Option<&CommitteeMember> {
        self.index.get(pubkey).and_then(|&i| self.members.get(i))
    }

    /// Voting power of `pubkey`, or 0 if it is not a member.
    pub fn power_of(&self, pubkey: &Pubkey) -> u64 {
        self.member(pubkey).map(|m| m.voting_power).unwrap_or(0)
    }

    pub fn contains(&self, pubkey: &Pubkey) -> bool {
        self.index.contains_key(pubkey)
    }

    /// Total power of the given senders, counting each sender once.
    pub fn power_of_senders<'a, I>(&self, senders: I) -> u64
    where
        I: IntoIterator<Item = &'a Pubkey>,
    {
        let mut counted = HashSet::new();
        senders
            .into_iter()
            .filter(|pk| counted.insert(**pk))
            .fold(0u64, |acc, pk| acc.saturating_add(self.power_of(pk)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommitteeMember> {
        self.members.iter()
    }

    pub fn pubkeys(&self) -> Vec<Pubkey> {
        self.members.iter().map(|m| m.pubkey).collect()
    }

    /// Deterministic stake-weighted proposer for `(height, round)`.
    ///
    /// `target = (height + round) % total_power`; the first member whose
    /// cumulative power exceeds `target`, in canonical order, is elected.
    pub fn proposer_for_round(&self, height: u64, round: u32) -> Option<Pubkey> {
        let seed = height.wrapping_add(u64::from(round));
        let target = seed.checked_rem(self.total_power)?;

        let mut accumulated: u64 = 0;
        for member in &self.members {
            accumulated = accumulated.saturating_add(member.voting_power);
            if accumulated > target {
                return Some(member.pubkey);
            }
        }
        self.members.first().map(|m| m.pubkey)
    }

    pub fn is_proposer(&self, pubkey: &Pubkey, height: u64, round: u32) -> bool {
        self.proposer_for_round(height, round)
            .is_some_and(|p| p == *pubkey)
    }
}
