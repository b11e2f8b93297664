//! In-memory registrar and encrypted token.
//!
//! Credits (deposits and incoming transfers) land as an amount PCT plus a
//! pending ElGamal ciphertext; [`InMemoryLedger::settle`] folds the pending
//! ciphertext into the EGCT and clears the PCT list. Proofs are trusted; the
//! ledger only reads the public signals the echo prover lays out.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, anyhow, bail, ensure};
use ark_ff::{BigInteger, PrimeField};
use eerc_prover::session::{LedgerReader, LedgerSubmitter};
use eerc_prover::{
    Address, AmountPct, BalanceRecord, DepositInput, ElGamalCiphertext, Field, PCT_LEN, Point,
    PublicKey, RegistrationProof, TransferProof, elgamal,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::info;

fn address_from_field(f: &Field) -> Address {
    let bytes = f.into_bigint().to_bytes_be();
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes[bytes.len() - 20..]);
    Address(out)
}

fn point_at(signals: &[Field], i: usize) -> Point {
    Point::new(signals[i], signals[i + 1])
}

fn ciphertext_at(signals: &[Field], i: usize) -> ElGamalCiphertext {
    ElGamalCiphertext::new(point_at(signals, i), point_at(signals, i + 2))
}

/// Offsets into the echoed transfer signals.
mod transfer_signal {
    pub const SENDER_PK: usize = 0;
    pub const SENDER_VTT: usize = 2;
    pub const RECEIVER_PK: usize = 6;
    pub const RECEIVER_VTT: usize = 8;
    pub const SENDER_BALANCE: usize = 21;
    pub const RECEIVER_PCT: usize = 25;
}

#[derive(Default)]
struct Account {
    record: BalanceRecord,
    pending: ElGamalCiphertext,
}

#[derive(Default)]
struct State {
    users: HashMap<Address, PublicKey>,
    auditor: Option<PublicKey>,
    tokens: HashMap<Address, u64>,
    accounts: HashMap<(Address, u64), Account>,
    reject_next: Option<String>,
    receipts: usize,
}

impl State {
    fn credit(&mut self, user: Address, token_id: u64, egct: ElGamalCiphertext, pct: [Field; PCT_LEN]) {
        let account = self.accounts.entry((user, token_id)).or_default();
        account.pending = elgamal::add(&account.pending, &egct);
        let index = account.record.transaction_index;
        account.record.amount_pcts.push(AmountPct { pct, index });
        account.record.transaction_index += 1;
    }

    fn receipt(&mut self, kind: &str) -> String {
        self.receipts += 1;
        format!("0x{kind}{:04x}", self.receipts)
    }
}

pub struct InMemoryLedger {
    state: Mutex<State>,
    rng: Mutex<ChaCha20Rng>,
    balance_reads: AtomicUsize,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        InMemoryLedger {
            state: Mutex::new(State::default()),
            rng: Mutex::new(ChaCha20Rng::from_seed([0x5E; 32])),
            balance_reads: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| anyhow!("ledger state poisoned"))
    }

    pub fn add_token(&self, token: Address, token_id: u64) -> Result<()> {
        self.state()?.tokens.insert(token, token_id);
        Ok(())
    }

    pub fn set_auditor(&self, pk: PublicKey) -> Result<()> {
        self.state()?.auditor = Some(pk);
        Ok(())
    }

    /// Register a key directly, bypassing the registration proof.
    pub fn register_key(&self, user: Address, pk: PublicKey) -> Result<()> {
        self.state()?.users.insert(user, pk);
        Ok(())
    }

    pub fn is_registered(&self, user: &Address) -> Result<bool> {
        Ok(self.state()?.users.contains_key(user))
    }

    /// Deposit `amount` base units for `user`, as the public-to-private
    /// conversion does: an ElGamal credit plus the depositor's amount PCT.
    pub fn deposit(&self, user: Address, token_id: u64, amount: u64) -> Result<()> {
        let mut state = self.state()?;
        let pk = *state
            .users
            .get(&user)
            .ok_or_else(|| anyhow!("{user} is not registered"))?;
        let mut rng = self.rng.lock().map_err(|_| anyhow!("ledger rng poisoned"))?;
        let (egct, _) = elgamal::encrypt(&pk, amount, &mut *rng)?;
        let deposit = DepositInput::new(&pk, amount, &mut *rng)?;
        state.credit(user, token_id, egct, deposit.amount_pct);
        info!(%user, amount, "deposit credited");
        Ok(())
    }

    /// Fold pending credits into the EGCT and clear the amount PCTs.
    pub fn settle(&self, user: Address, token_id: u64) -> Result<()> {
        let mut state = self.state()?;
        let account = state.accounts.entry((user, token_id)).or_default();
        account.record.egct = elgamal::add(&account.record.egct, &account.pending);
        account.pending = ElGamalCiphertext::EMPTY;
        account.record.amount_pcts.clear();
        Ok(())
    }

    pub fn record(&self, user: Address, token_id: u64) -> Result<BalanceRecord> {
        Ok(self
            .state()?
            .accounts
            .get(&(user, token_id))
            .map(|a| a.record.clone())
            .unwrap_or_default())
    }

    pub fn reject_next_submission(&self, reason: &str) -> Result<()> {
        self.state()?.reject_next = Some(reason.to_string());
        Ok(())
    }

    pub fn balance_reads(&self) -> usize {
        self.balance_reads.load(Ordering::SeqCst)
    }
}

impl LedgerReader for InMemoryLedger {
    type Error = anyhow::Error;

    async fn balance_of(&self, user: Address, token_id: u64) -> Result<BalanceRecord> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        self.record(user, token_id)
    }

    async fn user_public_key(&self, user: Address) -> Result<PublicKey> {
        Ok(self
            .state()?
            .users
            .get(&user)
            .copied()
            .unwrap_or(PublicKey(Point::ZERO)))
    }

    async fn auditor_public_key(&self) -> Result<PublicKey> {
        Ok(self.state()?.auditor.unwrap_or(PublicKey(Point::ZERO)))
    }

    async fn token_id(&self, token: Address) -> Result<u64> {
        self.state()?
            .tokens
            .get(&token)
            .copied()
            .with_context(|| format!("token {token} is not registered"))
    }
}

impl LedgerSubmitter for InMemoryLedger {
    type Error = anyhow::Error;

    async fn register(&self, proof: &RegistrationProof) -> Result<String> {
        let mut state = self.state()?;
        if let Some(reason) = state.reject_next.take() {
            bail!(reason);
        }
        let signals = &proof.public_signals;
        let pk = PublicKey(point_at(signals, 0));
        let user = address_from_field(&signals[2]);
        ensure!(!state.users.contains_key(&user), "{user} is already registered");
        ensure!(pk.0.is_on_curve(), "registration key is not on the curve");

        state.users.insert(user, pk);
        info!(%user, "user registered");
        Ok(state.receipt("re"))
    }

    async fn transfer(
        &self,
        to: Address,
        token_id: u64,
        proof: &TransferProof,
        sender_balance_pct: &[Field; PCT_LEN],
    ) -> Result<String> {
        use transfer_signal::*;

        let mut state = self.state()?;
        if let Some(reason) = state.reject_next.take() {
            bail!(reason);
        }
        let signals = &proof.public_signals;

        let sender_pk = PublicKey(point_at(signals, SENDER_PK));
        let sender = *state
            .users
            .iter()
            .find(|(_, pk)| **pk == sender_pk)
            .map(|(addr, _)| addr)
            .ok_or_else(|| anyhow!("sender key is not registered"))?;
        let receiver_pk = state
            .users
            .get(&to)
            .copied()
            .ok_or_else(|| anyhow!("{to} is not registered"))?;
        ensure!(
            receiver_pk.0 == point_at(signals, RECEIVER_PK),
            "proof is addressed to another key"
        );

        let account = state.accounts.entry((sender, token_id)).or_default();
        ensure!(
            account.record.egct == ciphertext_at(signals, SENDER_BALANCE),
            "proof was made against an outdated balance"
        );
        account.record.egct = elgamal::sub(&account.record.egct, &ciphertext_at(signals, SENDER_VTT));
        account.record.balance_pct = *sender_balance_pct;
        account.record.transaction_index += 1;

        let mut receiver_pct = [Field::from(0u64); PCT_LEN];
        receiver_pct.copy_from_slice(&signals[RECEIVER_PCT..RECEIVER_PCT + PCT_LEN]);
        state.credit(to, token_id, ciphertext_at(signals, RECEIVER_VTT), receiver_pct);

        info!(%sender, %to, "confidential transfer applied");
        Ok(state.receipt("tx"))
    }
}
