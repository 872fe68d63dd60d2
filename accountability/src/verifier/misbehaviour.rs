use {
    super::{
        evidence_authenticated, has_distinct_senders, is_matching_proposal, ProofVerifier,
    },
    crate::{
        chain::ChainReader,
        committee::Committee,
        proof::{Proof, ProofKind, Rule},
        types::SignedMessage,
    },
    std::sync::Arc,
};

/// Validates misbehaviour proofs by replaying the rule predicate over the
/// attached evidence only.
pub struct MisbehaviourVerifier {
    chain: Arc<dyn ChainReader>,
}

impl MisbehaviourVerifier {
    pub fn new(chain: Arc<dyn ChainReader>) -> Self {
        Self { chain }
    }
}

impl ProofVerifier for MisbehaviourVerifier {
    fn kind(&self) -> ProofKind {
        ProofKind::Misbehaviour
    }

    fn chain(&self) -> &dyn ChainReader {
        self.chain.as_ref()
    }

    fn check(&self, proof: &Proof, committee: &Committee) -> bool {
        if !evidence_authenticated(proof, committee) {
            return false;
        }
        let subject = &proof.message;
        let evidence = proof.evidence.as_slice();

        match proof.rule {
            Rule::Pn => check_pn(subject, evidence),
            Rule::Po => check_po(subject, evidence),
            Rule::Pvn => check_pvn(subject, evidence, committee),
            Rule::C => check_c(subject, evidence, committee),
            Rule::Equivocation => check_equivocation(subject, evidence),
            Rule::InvalidProposer => {
                evidence.is_empty()
                    && committee.proposer_for_round(subject.height, subject.round)
                        != Some(subject.sender)
            }
            Rule::C1 | Rule::InvalidProposal | Rule::GarbageMessage => false,
        }
    }
}

fn is_own_precommit(msg: &SignedMessage, subject: &SignedMessage) -> bool {
    msg.is_precommit() && msg.sender == subject.sender
}

fn check_pn(subject: &SignedMessage, evidence: &[SignedMessage]) -> bool {
    let [precommit] = evidence else {
        return false;
    };
    is_own_precommit(precommit, subject)
        && precommit.is_non_nil()
        && precommit.round < subject.round
}

fn check_po(subject: &SignedMessage, evidence: &[SignedMessage]) -> bool {
    let [precommit] = evidence else {
        return false;
    };
    let Some(valid_round) = subject.valid_round else {
        return false;
    };
    is_own_precommit(precommit, subject)
        && precommit.is_non_nil()
        && ((precommit.round == valid_round && precommit.value != subject.value)
            || (precommit.round > valid_round && precommit.round < subject.round))
}

/// Evidence: `[new proposal, locking precommit, nil precommit per round in between]`.
fn check_pvn(subject: &SignedMessage, evidence: &[SignedMessage], committee: &Committee) -> bool {
    let [proposal, locked, nils @ ..] = evidence else {
        return false;
    };
    if !is_matching_proposal(committee, proposal, subject) || proposal.valid_round.is_some() {
        return false;
    }
    if !is_own_precommit(locked, subject)
        || !locked.is_non_nil()
        || locked.round >= subject.round
        || locked.value == subject.value
    {
        return false;
    }

    let mut expected = locked.round;
    for nil in nils {
        let Some(next) = expected.checked_add(1) else {
            return false;
        };
        if !is_own_precommit(nil, subject) || nil.is_non_nil() || nil.round != next {
            return false;
        }
        expected = next;
    }
    expected.checked_add(1) == Some(subject.round)
}

fn check_c(subject: &SignedMessage, evidence: &[SignedMessage], committee: &Committee) -> bool {
    !evidence.is_empty()
        && evidence
            .iter()
            .all(|pv| pv.is_prevote() && pv.round == subject.round && pv.value != subject.value)
        && has_distinct_senders(evidence)
        && committee.power_of_senders(evidence.iter().map(|pv| &pv.sender)) >= committee.quorum()
}

fn check_equivocation(subject: &SignedMessage, evidence: &[SignedMessage]) -> bool {
    let hash = subject.hash();
    !evidence.is_empty()
        && evidence.iter().all(|other| {
            other.msg_type == subject.msg_type
                && other.round == subject.round
                && other.sender == subject.sender
                && other.hash() != hash
        })
}
