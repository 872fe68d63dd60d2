//! Property-based tests for accountability invariants.
//!
//! Properties tested:
//! 1. Quorum intersection: two quorums share more than `f` voting power.
//! 2. Store idempotence: re-saving a message is a no-op; a second distinct
//!    message in the same slot is always reported as equivocation.
//! 3. Hostile input: proof decoding and the precompiles never panic, and
//!    garbage is never accepted.
//! 4. Codec round-trip keeps every signature byte.
//! 5. Verifier determinism: identical proofs and chain history give identical
//!    verdicts on independently built precompile sets.
//! 6. Honest rounds produce no accountability events.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        solana_pubkey::Pubkey,
        std::sync::Arc,
        trv1_accountability::{
            max_faulty_power, quorum_power, sort_and_dedup,
            test_utils::TestCommittee,
            verifier::VERIFIER_OUTPUT_LEN,
            AccountabilityPrecompiles, MessageStore, Proof, ProofKind, Rule, RuleEngine,
            SaveOutcome, ACCUSATION_VERIFIER_ADDRESS, INNOCENCE_VERIFIER_ADDRESS,
            MISBEHAVIOUR_VERIFIER_ADDRESS,
        },
    };

    const H: u64 = 10;

    // ── Quorum arithmetic ──

    proptest! {
        #[test]
        fn prop_quorums_intersect_beyond_faulty(total in 1u64..=1_000_000_000_000) {
            let q = quorum_power(total);
            let f = max_faulty_power(total);

            prop_assert!(q <= total);
            // q is the smallest power with 3q >= 2t
            prop_assert!(u128::from(q) * 3 >= u128::from(total) * 2);
            prop_assert!((u128::from(q) - 1) * 3 < u128::from(total) * 2);
            // f < t/3
            prop_assert!(u128::from(f) * 3 < u128::from(total));
            // overlap of any two quorums exceeds f
            prop_assert!(u128::from(q) * 2 - u128::from(total) > u128::from(f));
        }

        #[test]
        fn prop_committee_power_matches_members(powers in prop::collection::vec(1u64..1_000, 1..8)) {
            let tc = TestCommittee::with_powers(&powers);
            let committee = tc.committee();
            prop_assert_eq!(committee.total_power(), powers.iter().sum::<u64>());
            prop_assert_eq!(committee.quorum(), quorum_power(committee.total_power()));
            for (i, power) in powers.iter().enumerate() {
                prop_assert_eq!(committee.power_of(&tc.pubkey(i)), *power);
            }
            prop_assert_eq!(committee.power_of(&Pubkey::default()), 0);
        }
    }

    // ── Message store ──

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_resave_is_duplicate(round in 0u32..4, tag in prop::option::of(1u8..4)) {
            let tc = TestCommittee::new(4);
            let store = MessageStore::new();
            let msg = tc.prevote(1, H, round, tag);

            prop_assert_eq!(store.save(msg.clone()), SaveOutcome::Inserted);
            prop_assert_eq!(store.save(msg), SaveOutcome::Duplicate);
            prop_assert_eq!(store.len(), 1);
        }

        #[test]
        fn prop_conflicting_votes_are_equivocation(tags in prop::collection::btree_set(1u8..16, 2..6)) {
            let tc = TestCommittee::new(4);
            let store = MessageStore::new();

            for (i, tag) in tags.iter().enumerate() {
                let outcome = store.save(tc.precommit(2, H, 0, Some(*tag)));
                if i == 0 {
                    prop_assert_eq!(outcome, SaveOutcome::Inserted);
                } else {
                    prop_assert!(outcome.is_equivocation());
                    prop_assert_eq!(outcome.conflicting().len(), i);
                }
            }
            prop_assert_eq!(store.len(), tags.len());
        }

        #[test]
        fn prop_sort_and_dedup_is_idempotent(
            picks in prop::collection::vec((0usize..4, 0u32..3, 1u8..3), 0..12),
        ) {
            let tc = TestCommittee::new(4);
            let proofs: Vec<Proof> = picks
                .iter()
                .map(|(i, round, tag)| Proof::accusation(Rule::C, tc.precommit(*i, H, *round, Some(*tag)), vec![]))
                .collect();

            let once = sort_and_dedup(proofs);
            let twice = sort_and_dedup(once.clone());
            prop_assert_eq!(&once, &twice);

            let mut keys: Vec<_> = once.iter().map(|p| (p.msg_hash(), p.kind)).collect();
            let before = keys.len();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), before);
        }
    }

    // ── Hostile input ──

    fn kind_strategy() -> impl Strategy<Value = ProofKind> {
        prop_oneof![
            Just(ProofKind::Misbehaviour),
            Just(ProofKind::Accusation),
            Just(ProofKind::Innocence),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_decode_never_panics(
            kind in kind_strategy(),
            bytes in prop::collection::vec(any::<u8>(), 0..512),
        ) {
            if let Ok(proof) = Proof::decode(kind, &bytes) {
                prop_assert_eq!(proof.kind, kind);
                prop_assert!(proof.rule.accepts_subject(&proof.message));
            }
        }

        #[test]
        fn prop_precompiles_reject_garbage(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
            let tc = TestCommittee::new(4);
            let precompiles = AccountabilityPrecompiles::new(Arc::new(tc.chain(H)));

            for address in [
                ACCUSATION_VERIFIER_ADDRESS,
                MISBEHAVIOUR_VERIFIER_ADDRESS,
                INNOCENCE_VERIFIER_ADDRESS,
            ] {
                let (output, _gas) = precompiles.execute(&address, &bytes, u64::MAX).unwrap();
                prop_assert_eq!(output.len(), VERIFIER_OUTPUT_LEN);
                prop_assert_eq!(output[VERIFIER_OUTPUT_LEN - 1], 0);
            }
        }
    }

    // ── Codec and verifier determinism ──

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_codec_roundtrip_preserves_signatures(
            sender in 0usize..4,
            round in 1u32..5,
            tag in 1u8..4,
            voters in prop::collection::btree_set(0usize..4, 0..4),
        ) {
            let tc = TestCommittee::new(4);
            let evidence: Vec<_> = voters
                .iter()
                .map(|i| tc.prevote(*i, H, round, None))
                .collect();
            let proof = Proof::misbehaviour(Rule::C, tc.precommit(sender, H, round, Some(tag)), evidence);

            let decoded = Proof::decode(proof.kind, &proof.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded.rule, proof.rule);
            prop_assert_eq!(decoded.message.signature, proof.message.signature);
            prop_assert_eq!(decoded.evidence.len(), proof.evidence.len());
            for (got, want) in decoded.evidence.iter().zip(&proof.evidence) {
                prop_assert_eq!(got.signature, want.signature);
            }
        }

        #[test]
        fn prop_verifiers_are_deterministic(
            sender in 0usize..4,
            round in 0u32..5,
            tag in 1u8..4,
            extra_heads in 0u64..8,
        ) {
            let tc = TestCommittee::new(4);
            let proof = Proof::accusation(Rule::C, tc.precommit(sender, H, round, Some(tag)), vec![]);
            let input = proof.encode().unwrap();

            // two nodes with different heads but the same history at H - 1
            let a = AccountabilityPrecompiles::new(Arc::new(tc.chain(H)));
            let b = AccountabilityPrecompiles::new(Arc::new(tc.chain(H + extra_heads)));

            for address in [
                ACCUSATION_VERIFIER_ADDRESS,
                MISBEHAVIOUR_VERIFIER_ADDRESS,
                INNOCENCE_VERIFIER_ADDRESS,
            ] {
                let (out_a, gas_a) = a.execute(&address, &input, u64::MAX).unwrap();
                let (out_b, gas_b) = b.execute(&address, &input, u64::MAX).unwrap();
                prop_assert_eq!(&out_a, &out_b);
                prop_assert_eq!(gas_a, gas_b);
            }

            let (out, _) = a.execute(&ACCUSATION_VERIFIER_ADDRESS, &input, u64::MAX).unwrap();
            prop_assert_eq!(out[VERIFIER_OUTPUT_LEN - 1], 1);
        }
    }

    // ── Honest rounds ──

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_honest_round_is_clean(n in 1usize..8, tag in 1u8..4) {
            let tc = TestCommittee::new(n);
            let committee = tc.committee();
            let store = MessageStore::new();

            store.save(tc.proposal(tc.proposer_index(H, 0), H, 0, None, tag));
            for i in 0..n {
                store.save(tc.prevote(i, H, 0, Some(tag)));
                store.save(tc.precommit(i, H, 0, Some(tag)));
            }

            let proofs = RuleEngine::new(&committee).run(&store, H);
            prop_assert!(proofs.is_empty(), "unexpected proofs: {:?}", proofs);
        }
    }
}
