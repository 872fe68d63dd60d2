use {
    super::{evidence_authenticated, is_matching_proposal, ProofVerifier},
    crate::{
        chain::ChainReader,
        committee::Committee,
        proof::{Proof, ProofKind, Rule},
    },
    std::sync::Arc,
};

/// Validates accusations before they are recorded on-chain.
///
/// Only the subject is authenticated. Missing evidence is the point of an
/// accusation, so no quorum is ever checked here.
pub struct AccusationVerifier {
    chain: Arc<dyn ChainReader>,
}

impl AccusationVerifier {
    pub fn new(chain: Arc<dyn ChainReader>) -> Self {
        Self { chain }
    }
}

impl ProofVerifier for AccusationVerifier {
    fn kind(&self) -> ProofKind {
        ProofKind::Accusation
    }

    fn chain(&self) -> &dyn ChainReader {
        self.chain.as_ref()
    }

    fn check(&self, proof: &Proof, committee: &Committee) -> bool {
        match proof.rule {
            Rule::Po | Rule::C | Rule::C1 => proof.evidence.is_empty(),
            Rule::Pvn => match proof.evidence.as_slice() {
                [] => true,
                // old-proposal form: the companion proposal must be re-proposing
                // the prevoted value at the prevote's round
                [proposal] => {
                    is_matching_proposal(committee, proposal, &proof.message)
                        && proposal.valid_round.is_some()
                        && evidence_authenticated(proof, committee)
                }
                _ => false,
            },
            Rule::Pn
            | Rule::Equivocation
            | Rule::InvalidProposal
            | Rule::InvalidProposer
            | Rule::GarbageMessage => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_utils::TestCommittee,
        solana_keypair::Keypair,
    };

    const H: u64 = 12;

    fn make_verifier(tc: &TestCommittee) -> AccusationVerifier {
        AccusationVerifier::new(Arc::new(tc.chain(H + 5)))
    }

    fn verify(verifier: &AccusationVerifier, proof: &Proof) -> bool {
        verifier.verify(&proof.encode().unwrap()).accepted
    }

    #[test]
    fn test_accepts_accusations_without_quorum_check() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        let proposal = tc.proposal(tc.proposer_index(H, 2), H, 2, Some(0), 1);

        assert!(verify(&v, &Proof::accusation(Rule::Po, proposal, vec![])));
        assert!(verify(&v, &Proof::accusation(Rule::C, tc.precommit(1, H, 0, Some(1)), vec![])));
        assert!(verify(&v, &Proof::accusation(Rule::C1, tc.precommit(1, H, 0, Some(1)), vec![])));
        assert!(verify(&v, &Proof::accusation(Rule::Pvn, tc.prevote(2, H, 0, Some(1)), vec![])));
    }

    #[test]
    fn test_output_names_sender_and_hash() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        let proof = Proof::accusation(Rule::C, tc.precommit(3, H, 0, Some(1)), vec![]);
        let out = v.verify(&proof.encode().unwrap());
        assert!(out.accepted);
        assert_eq!(out.sender, tc.pubkey(3));
        assert_eq!(out.msg_hash, proof.msg_hash());
    }

    #[test]
    fn test_rejects_rules_without_accusation_form() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        let proposal = tc.proposal(tc.proposer_index(H, 1), H, 1, None, 1);
        assert!(!verify(&v, &Proof::accusation(Rule::Pn, proposal.clone(), vec![])));
        assert!(!verify(&v, &Proof::accusation(Rule::InvalidProposer, proposal, vec![])));
        assert!(!verify(
            &v,
            &Proof::accusation(Rule::Equivocation, tc.prevote(0, H, 0, None), vec![])
        ));
    }

    #[test]
    fn test_rejects_non_member_and_unknown_height() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        let outsider = Keypair::new();
        let foreign = crate::types::SignedMessage::precommit(H, 0, Some(tc.value(H, 1)), &outsider);
        assert!(!verify(&v, &Proof::accusation(Rule::C, foreign, vec![])));

        // no header recorded for the height below
        let far = tc.precommit(0, H + 100, 0, Some(1));
        assert!(!verify(&v, &Proof::accusation(Rule::C, far, vec![])));
    }

    #[test]
    fn test_rejects_forged_signature() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        let mut precommit = tc.precommit(0, H, 0, Some(1));
        precommit.sender = tc.pubkey(1);
        assert!(!verify(&v, &Proof::accusation(Rule::C, precommit, vec![])));
    }

    #[test]
    fn test_old_proposal_companion_cross_check() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        let prevote = tc.prevote(1, H, 2, Some(1));
        let proposer = tc.proposer_index(H, 2);

        let old = tc.proposal(proposer, H, 2, Some(0), 1);
        assert!(verify(&v, &Proof::accusation(Rule::Pvn, prevote.clone(), vec![old])));

        // new proposal is not a companion
        let new = tc.proposal(proposer, H, 2, None, 1);
        assert!(!verify(&v, &Proof::accusation(Rule::Pvn, prevote.clone(), vec![new])));

        // value mismatch
        let other = tc.proposal(proposer, H, 2, Some(0), 2);
        assert!(!verify(&v, &Proof::accusation(Rule::Pvn, prevote.clone(), vec![other])));

        // round mismatch
        let late = tc.proposal(proposer, H, 3, Some(0), 1);
        assert!(!verify(&v, &Proof::accusation(Rule::Pvn, prevote.clone(), vec![late])));

        // not from the elected proposer
        let impostor = tc.proposal((proposer + 1) % tc.len(), H, 2, Some(0), 1);
        assert!(!verify(&v, &Proof::accusation(Rule::Pvn, prevote, vec![impostor])));
    }

    #[test]
    fn test_garbage_input_rejected() {
        let tc = TestCommittee::new(4);
        let v = make_verifier(&tc);
        assert!(!v.verify(&[]).accepted);
        assert!(!v.verify(&[3, 0, 0]).accepted);
    }
}
