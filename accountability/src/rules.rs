//! Rule evaluation over a height's message log.
//!
//! The [`RuleEngine`] is a pure read pass: it takes one snapshot of a height
//! from the [`MessageStore`] and evaluates every height-scan rule against
//! every message whose shape the rule accepts. Equivocation and
//! InvalidProposer are decided on message ingress instead; InvalidProposal
//! and GarbageMessage never produce proofs.
//!
//! Vote-power tallies count each sender once and never include proposals.
//! Output is sorted by (rule id, message hash, kind) and deduplicated by
//! (message hash, kind), keeping the lowest rule id.

use {
    crate::{
        committee::Committee,
        message_store::MessageStore,
        proof::{Proof, ProofKind, Rule},
        types::SignedMessage,
    },
    log::*,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    std::collections::HashSet,
};

/// Rules evaluated by the delayed height scan.
pub const HEIGHT_SCAN_RULES: [Rule; 5] = [Rule::Pn, Rule::Po, Rule::Pvn, Rule::C, Rule::C1];

/// Evaluates the fixed rule set for one height.
pub struct RuleEngine<'a> {
    /// Committee at `height - 1`, the one that signed messages at `height`.
    committee: &'a Committee,
}

impl<'a> RuleEngine<'a> {
    pub fn new(committee: &'a Committee) -> Self {
        Self { committee }
    }

    /// Scan `height` and return the resulting proofs in canonical order.
    pub fn run(&self, store: &MessageStore, height: u64) -> Vec<Proof> {
        let view = HeightView::new(store.snapshot(height));
        let mut proofs = Vec::new();

        for msg in &view.messages {
            if !self.committee.contains(&msg.sender) {
                trace!("skipping {msg}: sender outside committee");
                continue;
            }
            let mut proven_c = false;
            for rule in HEIGHT_SCAN_RULES {
                if !rule.accepts_subject(msg) {
                    continue;
                }
                // a proven C violation supersedes the C1 accusation on the same precommit
                if rule == Rule::C1 && proven_c {
                    continue;
                }
                if let Some(proof) = self.evaluate(rule, &view, msg) {
                    proven_c |= proof.rule == Rule::C && proof.kind == ProofKind::Misbehaviour;
                    proofs.push(proof);
                }
            }
        }

        let proofs = sort_and_dedup(proofs);
        if !proofs.is_empty() {
            info!(
                "rule scan at height {height} produced {} proof(s) from {} message(s)",
                proofs.len(),
                view.messages.len()
            );
        }
        proofs
    }

    /// Evaluate a single rule against `msg`.
    pub fn evaluate(&self, rule: Rule, view: &HeightView, msg: &SignedMessage) -> Option<Proof> {
        match rule {
            Rule::Pn => self.check_pn(view, msg),
            Rule::Po => self.check_po(view, msg),
            Rule::Pvn => self.check_pvn(view, msg),
            Rule::C => self.check_c(view, msg),
            Rule::C1 => self.check_c1(view, msg),
            Rule::Equivocation
            | Rule::InvalidProposal
            | Rule::InvalidProposer
            | Rule::GarbageMessage => None,
        }
    }

    fn has_quorum(&self, voters: &[&SignedMessage]) -> bool {
        self.committee
            .power_of_senders(voters.iter().map(|m| &m.sender))
            >= self.committee.quorum()
    }

    /// A new proposal from a proposer that precommitted a value earlier.
    fn check_pn(&self, view: &HeightView, proposal: &SignedMessage) -> Option<Proof> {
        let precommit = view
            .precommits_of(&proposal.sender)
            .find(|pc| pc.round < proposal.round && pc.is_non_nil())?;
        Some(Proof::misbehaviour(
            Rule::Pn,
            proposal.to_light(),
            vec![precommit.clone()],
        ))
    }

    /// An old proposal must be backed by prevotes at its valid round and by
    /// the proposer's own precommits since then.
    fn check_po(&self, view: &HeightView, proposal: &SignedMessage) -> Option<Proof> {
        let valid_round = proposal.valid_round?;

        let conflicting = view.precommits_of(&proposal.sender).find(|pc| {
            pc.is_non_nil()
                && ((pc.round == valid_round && pc.value != proposal.value)
                    || (pc.round > valid_round && pc.round < proposal.round))
        });
        if let Some(precommit) = conflicting {
            return Some(Proof::misbehaviour(
                Rule::Po,
                proposal.to_light(),
                vec![precommit.clone()],
            ));
        }

        let prevotes = view.prevotes_for(valid_round, proposal.value);
        (!self.has_quorum(&prevotes)).then(|| Proof::accusation(Rule::Po, proposal.to_light(), vec![]))
    }

    /// A prevote for a value needs a matching proposal, and for a new
    /// proposal the voter must not be locked on something else.
    fn check_pvn(&self, view: &HeightView, prevote: &SignedMessage) -> Option<Proof> {
        let Some(proposal) = view.proposal_for(self.committee, prevote.round, prevote.value) else {
            return Some(Proof::accusation(Rule::Pvn, prevote.clone(), vec![]));
        };

        if let Some(valid_round) = proposal.valid_round {
            let prevotes = view.prevotes_for(valid_round, prevote.value);
            return (!self.has_quorum(&prevotes)).then(|| {
                Proof::accusation(Rule::Pvn, prevote.clone(), vec![proposal.to_light()])
            });
        }

        let locked = view
            .precommits_of(&prevote.sender)
            .rev()
            .find(|pc| pc.round < prevote.round && pc.is_non_nil())?;
        if locked.value == prevote.value {
            return None;
        }

        // the nil precommits in between show the lock was never released
        let mut evidence = vec![proposal.to_light(), locked.clone()];
        for round in locked.round.saturating_add(1)..prevote.round {
            let nil = view
                .precommits_of(&prevote.sender)
                .find(|pc| pc.round == round && !pc.is_non_nil());
            match nil {
                Some(nil) => evidence.push(nil.clone()),
                None => {
                    debug!("PVN on {prevote}: no nil precommit at round {round}, not raising");
                    return None;
                }
            }
        }
        Some(Proof::misbehaviour(Rule::Pvn, prevote.clone(), evidence))
    }

    /// A precommit must not contradict a prevote quorum and needs a proposal.
    fn check_c(&self, view: &HeightView, precommit: &SignedMessage) -> Option<Proof> {
        let against = view.prevotes_matching(precommit.round, |pv| pv.value != precommit.value);
        if self.has_quorum(&against) {
            let evidence = against.into_iter().cloned().collect();
            return Some(Proof::misbehaviour(Rule::C, precommit.clone(), evidence));
        }

        view.proposal_for(self.committee, precommit.round, precommit.value)
            .is_none()
            .then(|| Proof::accusation(Rule::C, precommit.clone(), vec![]))
    }

    /// A precommit needs a quorum of prevotes for its value.
    fn check_c1(&self, view: &HeightView, precommit: &SignedMessage) -> Option<Proof> {
        let prevotes = view.prevotes_for(precommit.round, precommit.value);
        (!self.has_quorum(&prevotes)).then(|| Proof::accusation(Rule::C1, precommit.clone(), vec![]))
    }
}

/// One height's messages, in store order (round, type, sender, arrival).
pub struct HeightView {
    messages: Vec<SignedMessage>,
}

impl HeightView {
    pub fn new(messages: Vec<SignedMessage>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[SignedMessage] {
        &self.messages
    }

    /// Precommits from `sender`, ascending by round.
    fn precommits_of<'v>(
        &'v self,
        sender: &'v Pubkey,
    ) -> impl DoubleEndedIterator<Item = &'v SignedMessage> + 'v {
        self.messages
            .iter()
            .filter(move |m| m.is_precommit() && m.sender == *sender)
    }

    /// First proposal for `(round, value)` from the elected proposer.
    fn proposal_for(
        &self,
        committee: &Committee,
        round: u32,
        value: Option<Hash>,
    ) -> Option<&SignedMessage> {
        self.messages.iter().find(|m| {
            m.is_proposal()
                && m.round == round
                && m.value == value
                && committee.is_proposer(&m.sender, m.height, m.round)
        })
    }

    /// Prevotes at `round` matching `predicate`, one per sender.
    fn prevotes_matching<F>(&self, round: u32, predicate: F) -> Vec<&SignedMessage>
    where
        F: Fn(&SignedMessage) -> bool,
    {
        let mut senders = HashSet::new();
        self.messages
            .iter()
            .filter(|m| m.is_prevote() && m.round == round && predicate(m))
            .filter(|m| senders.insert(m.sender))
            .collect()
    }

    fn prevotes_for(&self, round: u32, value: Option<Hash>) -> Vec<&SignedMessage> {
        self.prevotes_matching(round, |pv| pv.value == value)
    }
}

/// Canonical ordering and on-chain-compatible dedup of a proof list.
pub fn sort_and_dedup(proofs: Vec<Proof>) -> Vec<Proof> {
    let mut keyed: Vec<(Rule, Hash, ProofKind, Proof)> = proofs
        .into_iter()
        .map(|p| (p.rule, p.msg_hash(), p.kind, p))
        .collect();
    keyed.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));

    let mut seen = HashSet::new();
    keyed
        .into_iter()
        .filter(|(_, hash, kind, _)| seen.insert((*hash, *kind)))
        .map(|(_, _, _, proof)| proof)
        .collect()
}
