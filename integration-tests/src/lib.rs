//! End-to-end tests for the eERC client pipeline
//!
//! The tests drive [`eerc_prover::Session`] through registration and
//! confidential transfers against in-memory stand-ins for the three external
//! collaborators:
//!
//! - [`helpers::TestWallet`]: deterministic message signing
//! - [`ledger::InMemoryLedger`]: registrar + encrypted token contract state
//! - [`helpers::EchoProver`]: a proof generator that returns well-formed
//!   snarkjs output without running a circuit
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p integration-tests
//!
//! # With logging
//! RUST_LOG=eerc_prover=debug cargo test -p integration-tests -- --nocapture
//! ```

pub mod helpers;
pub mod ledger;

use eerc_prover::{Address, ProtocolConfig, Session};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Chain the test ledger lives on.
pub const TEST_CHAIN_ID: u64 = 43_113;

pub fn test_token() -> Address {
    Address([0xEE; 20])
}

pub fn test_config() -> ProtocolConfig {
    ProtocolConfig::new(TEST_CHAIN_ID, test_token())
}

/// Session with a seeded RNG so encryption randomness is reproducible.
pub fn test_session(seed: u8) -> Session {
    Session::with_rng(test_config(), ChaCha20Rng::from_seed([seed; 32]))
}

/// Test accounts with fixed addresses and signing secrets
pub mod test_accounts {
    use crate::helpers::TestWallet;
    use crate::TEST_CHAIN_ID;
    use eerc_prover::Address;

    pub fn alice() -> TestWallet {
        TestWallet::new(Address([0xA1; 20]), [1u8; 32], TEST_CHAIN_ID)
    }

    pub fn bob() -> TestWallet {
        TestWallet::new(Address([0xB0; 20]), [2u8; 32], TEST_CHAIN_ID)
    }

    pub fn carol() -> TestWallet {
        TestWallet::new(Address([0xCA; 20]), [3u8; 32], TEST_CHAIN_ID)
    }
}
