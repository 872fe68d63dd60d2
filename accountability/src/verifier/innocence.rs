use {
    super::{evidence_authenticated, is_matching_proposal, is_prevote_quorum, ProofVerifier},
    crate::{
        chain::ChainReader,
        committee::Committee,
        proof::{Proof, ProofKind, Rule},
    },
    std::sync::Arc,
};

/// Validates innocence proofs answering an accusation.
pub struct InnocenceVerifier {
    chain: Arc<dyn ChainReader>,
}

impl InnocenceVerifier {
    pub fn new(chain: Arc<dyn ChainReader>) -> Self {
        Self { chain }
    }
}

impl ProofVerifier for InnocenceVerifier {
    fn kind(&self) -> ProofKind {
        ProofKind::Innocence
    }

    fn chain(&self) -> &dyn ChainReader {
        self.chain.as_ref()
    }

    fn check(&self, proof: &Proof, committee: &Committee) -> bool {
        if !evidence_authenticated(proof, committee) {
            return false;
        }
        let subject = &proof.message;
        let value = subject.value;

        match (proof.rule, proof.evidence.as_slice()) {
            (Rule::Po, votes) => subject.valid_round.is_some_and(|valid_round| {
                is_prevote_quorum(committee, votes, valid_round, |v| v == value)
            }),
            (Rule::Pvn, [proposal, votes @ ..]) => {
                if !is_matching_proposal(committee, proposal, subject) {
                    return false;
                }
                match proposal.valid_round {
                    None => votes.is_empty(),
                    Some(valid_round) => {
                        is_prevote_quorum(committee, votes, valid_round, |v| v == value)
                    }
                }
            }
            (Rule::C, [proposal]) => is_matching_proposal(committee, proposal, subject),
            (Rule::C1, votes) => is_prevote_quorum(committee, votes, subject.round, |v| v == value),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::test_utils::TestCommittee};

    const H: u64 = 30;

    fn make_verifier(tc: &TestCommittee) -> InnocenceVerifier {
        InnocenceVerifier::new(Arc::new(tc.chain(H)))
    }

    fn verify(verifier: &InnocenceVerifier, proof: &Proof) -> bool {
        verifier.verify(&proof.encode().unwrap()).accepted
    }

    #[test]
    fn test_po_innocence_needs_quorum_at_valid_round() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        let proposal = tc.proposal(tc.proposer_index(H, 2), H, 2, Some(1), 1);
        let votes: Vec<_> = (0..3).map(|i| tc.prevote(i, H, 1, Some(1))).collect();

        assert!(verify(&v, &Proof::innocence(Rule::Po, proposal.clone(), votes.clone())));
        assert!(!verify(&v, &Proof::innocence(Rule::Po, proposal.clone(), votes[..2].to_vec())));

        let wrong_round: Vec<_> = (0..3).map(|i| tc.prevote(i, H, 0, Some(1))).collect();
        assert!(!verify(&v, &Proof::innocence(Rule::Po, proposal, wrong_round)));
    }

    #[test]
    fn test_duplicate_senders_rejected() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        let precommit = tc.precommit(0, H, 0, Some(1));
        let votes = vec![
            tc.prevote(0, H, 0, Some(1)),
            tc.prevote(1, H, 0, Some(1)),
            tc.prevote(1, H, 0, Some(1)),
        ];
        assert!(!verify(&v, &Proof::innocence(Rule::C1, precommit.clone(), votes)));

        let votes: Vec<_> = (0..3).map(|i| tc.prevote(i, H, 0, Some(1))).collect();
        assert!(verify(&v, &Proof::innocence(Rule::C1, precommit, votes)));
    }

    #[test]
    fn test_c_and_pvn_need_matching_proposal() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        let proposer = tc.proposer_index(H, 0);
        let proposal = tc.proposal(proposer, H, 0, None, 1);

        let precommit = tc.precommit(2, H, 0, Some(1));
        assert!(verify(&v, &Proof::innocence(Rule::C, precommit.clone(), vec![proposal.clone()])));
        let prevote = tc.prevote(2, H, 0, Some(1));
        assert!(verify(&v, &Proof::innocence(Rule::Pvn, prevote, vec![proposal])));

        let other = tc.proposal(proposer, H, 0, None, 2);
        assert!(!verify(&v, &Proof::innocence(Rule::C, precommit.clone(), vec![other])));
        assert!(!verify(&v, &Proof::innocence(Rule::C, precommit, vec![])));
    }

    #[test]
    fn test_self_signed_proposal_rejected() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        let accused = (tc.proposer_index(H, 0) + 1) % tc.len();
        let forged = tc.proposal(accused, H, 0, None, 9);

        let precommit = tc.precommit(accused, H, 0, Some(9));
        assert!(!verify(&v, &Proof::innocence(Rule::C, precommit, vec![forged.clone()])));
        let prevote = tc.prevote(accused, H, 0, Some(9));
        assert!(!verify(&v, &Proof::innocence(Rule::Pvn, prevote, vec![forged])));
    }

    #[test]
    fn test_pvn_innocence_for_old_proposal() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        let proposal = tc.proposal(tc.proposer_index(H, 3), H, 3, Some(1), 1);
        let prevote = tc.prevote(0, H, 3, Some(1));

        assert!(!verify(&v, &Proof::innocence(Rule::Pvn, prevote.clone(), vec![proposal.clone()])));

        let mut evidence = vec![proposal];
        evidence.extend((1..4).map(|i| tc.prevote(i, H, 1, Some(1))));
        assert!(verify(&v, &Proof::innocence(Rule::Pvn, prevote, evidence)));
    }

    #[test]
    fn test_rules_without_innocence_rejected() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        let proposal = tc.proposal(tc.proposer_index(H, 1), H, 1, None, 1);
        assert!(!verify(&v, &Proof::innocence(Rule::Pn, proposal.clone(), vec![])));
        assert!(!verify(&v, &Proof::innocence(Rule::InvalidProposer, proposal, vec![])));
    }

    #[test]
    fn test_verdict_is_deterministic_across_nodes() {
        let tc = TestCommittee::new(4);
        let node_a = make_verifier(&tc);
        let node_b = make_verifier(&tc);
        let votes: Vec<_> = (0..3).map(|i| tc.prevote(i, H, 0, Some(1))).collect();
        let bytes = Proof::innocence(Rule::C1, tc.precommit(3, H, 0, Some(1)), votes)
            .encode()
            .unwrap();
        assert_eq!(node_a.verify(&bytes), node_b.verify(&bytes));
        assert_eq!(node_a.verify(&bytes).to_bytes(), node_b.verify(&bytes).to_bytes());
    }
}
