//! The accountability verifiers as precompiled contracts.
//!
//! [`AccountabilityPrecompiles`] is built once at startup from a
//! [`ChainReader`] and handed by reference to whatever executes contract
//! calls. Dropping it removes the verifiers; there is no global table.

use {
    crate::{
        chain::ChainReader,
        error::PrecompileError,
        verifier::{AccusationVerifier, InnocenceVerifier, MisbehaviourVerifier, ProofVerifier},
    },
    log::*,
    solana_pubkey::Pubkey,
    std::sync::Arc,
};

/// Reserved address of the accusation verifier.
pub const ACCUSATION_VERIFIER_ADDRESS: Pubkey = reserved_address(0xfc);
/// Reserved address of the misbehaviour verifier.
pub const MISBEHAVIOUR_VERIFIER_ADDRESS: Pubkey = reserved_address(0xfd);
/// Reserved address of the innocence verifier.
pub const INNOCENCE_VERIFIER_ADDRESS: Pubkey = reserved_address(0xfe);

/// Fixed cost of an accusation check: one signature and a decode.
pub const ACCUSATION_VERIFIER_GAS: u64 = 25_000;
/// Fixed cost of a misbehaviour check.
pub const MISBEHAVIOUR_VERIFIER_GAS: u64 = 500_000;
/// Fixed cost of an innocence check.
pub const INNOCENCE_VERIFIER_GAS: u64 = 500_000;

const fn reserved_address(last: u8) -> Pubkey {
    let mut bytes = [0u8; 32];
    bytes[31] = last;
    Pubkey::new_from_array(bytes)
}

/// A deterministic contract callable from on-chain code.
pub trait Precompile: Send + Sync {
    /// Gas charged for a call with `input`.
    fn required_gas(&self, input: &[u8]) -> u64;

    /// Execute with `input`. Never fails; rejections are encoded in the output.
    fn run(&self, input: &[u8]) -> Vec<u8>;
}

struct VerifierPrecompile<V> {
    verifier: V,
    gas: u64,
}

impl<V: ProofVerifier> Precompile for VerifierPrecompile<V> {
    fn required_gas(&self, _input: &[u8]) -> u64 {
        self.gas
    }

    fn run(&self, input: &[u8]) -> Vec<u8> {
        self.verifier.verify(input).to_bytes().to_vec()
    }
}

/// Capability object owning the three accountability verifiers.
pub struct AccountabilityPrecompiles {
    entries: Vec<(Pubkey, Box<dyn Precompile>)>,
}

impl AccountabilityPrecompiles {
    pub fn new(chain: Arc<dyn ChainReader>) -> Self {
        let entries: Vec<(Pubkey, Box<dyn Precompile>)> = vec![
            (
                ACCUSATION_VERIFIER_ADDRESS,
                Box::new(VerifierPrecompile {
                    verifier: AccusationVerifier::new(chain.clone()),
                    gas: ACCUSATION_VERIFIER_GAS,
                }),
            ),
            (
                MISBEHAVIOUR_VERIFIER_ADDRESS,
                Box::new(VerifierPrecompile {
                    verifier: MisbehaviourVerifier::new(chain.clone()),
                    gas: MISBEHAVIOUR_VERIFIER_GAS,
                }),
            ),
            (
                INNOCENCE_VERIFIER_ADDRESS,
                Box::new(VerifierPrecompile {
                    verifier: InnocenceVerifier::new(chain),
                    gas: INNOCENCE_VERIFIER_GAS,
                }),
            ),
        ];
        Self { entries }
    }

    pub fn get(&self, address: &Pubkey) -> Option<&dyn Precompile> {
        self.entries
            .iter()
            .find(|(addr, _)| addr == address)
            .map(|(_, precompile)| &**precompile)
    }

    pub fn contains(&self, address: &Pubkey) -> bool {
        self.get(address).is_some()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Pubkey> {
        self.entries.iter().map(|(addr, _)| addr)
    }

    /// Charge gas and run the precompile at `address`.
    ///
    /// Returns the output and the gas used.
    pub fn execute(
        &self,
        address: &Pubkey,
        input: &[u8],
        gas_limit: u64,
    ) -> Result<(Vec<u8>, u64), PrecompileError> {
        let precompile = self
            .get(address)
            .ok_or(PrecompileError::UnknownAddress(*address))?;
        let required = precompile.required_gas(input);
        if required > gas_limit {
            warn!("precompile {address}: out of gas ({required} > {gas_limit})");
            return Err(PrecompileError::OutOfGas {
                required,
                limit: gas_limit,
            });
        }
        Ok((precompile.run(input), required))
    }
}
