//! Innocence proofs answering an accusation from the local message log.

use {
    crate::{
        committee::Committee,
        message_store::MessageStore,
        proof::{Proof, ProofKind, Rule},
        types::SignedMessage,
    },
    log::*,
    solana_hash::Hash,
    std::collections::HashSet,
};

/// Build an innocence proof for `accusation` from `store`.
///
/// `committee` is the one at `height - 1` of the accused message. Returns
/// `None` when the store does not hold enough evidence yet, or when the
/// accusation's rule has no innocence form.
pub fn build_innocence(
    accusation: &Proof,
    store: &MessageStore,
    committee: &Committee,
) -> Option<Proof> {
    if accusation.kind != ProofKind::Accusation {
        return None;
    }
    let subject = &accusation.message;

    let evidence = match accusation.rule {
        Rule::Po => {
            let valid_round = subject.valid_round?;
            quorum_prevotes(store, committee, subject.height, valid_round, subject.value)?
        }
        Rule::Pvn => {
            let proposal = matching_proposal(store, committee, subject)?;
            let mut evidence = Vec::new();
            if let Some(valid_round) = proposal.valid_round {
                evidence = quorum_prevotes(
                    store,
                    committee,
                    subject.height,
                    valid_round,
                    subject.value,
                )?;
            }
            evidence.insert(0, proposal);
            evidence
        }
        Rule::C => vec![matching_proposal(store, committee, subject)?],
        Rule::C1 => quorum_prevotes(store, committee, subject.height, subject.round, subject.value)?,
        Rule::Pn
        | Rule::Equivocation
        | Rule::InvalidProposal
        | Rule::InvalidProposer
        | Rule::GarbageMessage => return None,
    };

    debug!(
        "built {} innocence for {subject} with {} evidence",
        accusation.rule,
        evidence.len()
    );
    Some(Proof::innocence(accusation.rule, subject.to_light(), evidence))
}

fn matching_proposal(
    store: &MessageStore,
    committee: &Committee,
    subject: &SignedMessage,
) -> Option<SignedMessage> {
    store
        .query(subject.height, |m| {
            m.is_proposal()
                && m.round == subject.round
                && m.value == subject.value
                && committee.is_proposer(&m.sender, m.height, m.round)
        })
        .into_iter()
        .next()
        .map(|proposal| proposal.to_light())
}

/// Prevotes for `value` at `round` from committee members, one per sender,
/// if they reach quorum.
fn quorum_prevotes(
    store: &MessageStore,
    committee: &Committee,
    height: u64,
    round: u32,
    value: Option<Hash>,
) -> Option<Vec<SignedMessage>> {
    let mut senders = HashSet::new();
    let prevotes: Vec<SignedMessage> = store
        .query(height, |m| m.is_prevote() && m.round == round && m.value == value)
        .into_iter()
        .filter(|m| committee.contains(&m.sender) && senders.insert(m.sender))
        .collect();

    let power = committee.power_of_senders(prevotes.iter().map(|m| &m.sender));
    (power >= committee.quorum()).then_some(prevotes)
}
