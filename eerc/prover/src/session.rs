//! The client pipeline as an explicit, sequential state machine.
//!
//! ```text
//! Idle → AwaitingSignature → DerivingKey → BuildingInput → GeneratingProof → Ready
//!                                                                  ↓
//!                                               Submitting → Confirmed | Failed
//! ```
//!
//! A [`Session`] owns the derived key for its lifetime. Signing and proof
//! generation are the only suspension points; proof generation runs on the
//! blocking pool and can be abandoned through a [`CancelHandle`]. Nothing is
//! retried automatically: after `Failed` the caller either signs in again or,
//! while a key is still held, rebuilds the proof.

use core::fmt;
use std::future::Future;
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{CircuitArtifact, ProtocolConfig};
use crate::inputs::{
    self, CircuitInput, ProofMaterial, Recipient, RegistrationInput, RegistrationProof,
    TransferPlan, TransferProof,
};
use crate::keys::{KeyPair, Signature, signing_message};
use crate::{Address, BalanceRecord, BalanceReport, Field, PCT_LEN, ProverError, PublicKey};
use crate::{balance, elgamal};

// ===== Collaborators =====

/// The user's wallet.
pub trait WalletSigner: Send + Sync {
    type Error: fmt::Display;

    fn address(&self) -> Address;
    fn chain_id(&self) -> u64;
    /// Personal-sign `message`; returns the hex signature.
    fn sign_message(
        &self,
        message: &str,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
}

/// Read-only view of the registrar and encrypted-token contracts.
pub trait LedgerReader: Send + Sync {
    type Error: fmt::Display;

    fn balance_of(
        &self,
        user: Address,
        token_id: u64,
    ) -> impl Future<Output = Result<BalanceRecord, Self::Error>> + Send;
    /// `(0, 0)` for unregistered users.
    fn user_public_key(
        &self,
        user: Address,
    ) -> impl Future<Output = Result<PublicKey, Self::Error>> + Send;
    fn auditor_public_key(&self) -> impl Future<Output = Result<PublicKey, Self::Error>> + Send;
    fn token_id(&self, token: Address) -> impl Future<Output = Result<u64, Self::Error>> + Send;
}

/// Sends transactions; returns an opaque receipt (e.g. a transaction hash).
pub trait LedgerSubmitter: Send + Sync {
    type Error: fmt::Display;

    fn register(
        &self,
        proof: &RegistrationProof,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
    fn transfer(
        &self,
        to: Address,
        token_id: u64,
        proof: &TransferProof,
        sender_balance_pct: &[Field; PCT_LEN],
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
}

/// Groth16 witness and proof generation. Called on the blocking pool.
pub trait ProofGenerator: Send + Sync + 'static {
    type Error: fmt::Display;

    fn prove(
        &self,
        circuit: &CircuitArtifact,
        input: &CircuitInput,
    ) -> Result<ProofMaterial, Self::Error>;
}

// ===== Phases =====

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingSignature,
    DerivingKey,
    BuildingInput,
    GeneratingProof,
    Ready,
    Submitting,
    Confirmed,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::AwaitingSignature => "awaiting-signature",
            Phase::DerivingKey => "deriving-key",
            Phase::BuildingInput => "building-input",
            Phase::GeneratingProof => "generating-proof",
            Phase::Ready => "ready",
            Phase::Submitting => "submitting",
            Phase::Confirmed => "confirmed",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Abandons the proof a session is currently generating.
#[derive(Clone, Debug)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// A transfer proof ready for submission.
#[derive(Clone, Debug)]
pub struct PreparedTransfer {
    pub to: Address,
    pub token_id: u64,
    pub amount: u64,
    pub proof: TransferProof,
    pub sender_balance_pct: [Field; PCT_LEN],
}

// ===== Session =====

pub struct Session {
    config: ProtocolConfig,
    phase: Phase,
    address: Option<Address>,
    keys: Option<KeyPair>,
    last_error: Option<String>,
    cancel: Arc<watch::Sender<bool>>,
    rng: ChaCha20Rng,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.phase)
            .field("address", &self.address)
            .field("has_key", &self.keys.is_some())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl Session {
    pub fn new(config: ProtocolConfig) -> Self {
        Self::with_rng(config, ChaCha20Rng::from_rng(&mut rand::rng()))
    }

    /// Session with an explicit RNG, for reproducible encryption randomness.
    pub fn with_rng(config: ProtocolConfig, rng: ChaCha20Rng) -> Self {
        let (cancel, _) = watch::channel(false);
        Session {
            config,
            phase: Phase::Idle,
            address: None,
            keys: None,
            last_error: None,
            cancel: Arc::new(cancel),
            rng,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn keys(&self) -> Option<&KeyPair> {
        self.keys.as_ref()
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Drop key material and return to `Idle`.
    pub fn reset(&mut self) {
        self.keys = None;
        self.address = None;
        self.last_error = None;
        self.transition(Phase::Idle);
    }

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            info!(from = %self.phase, to = %next, "session phase");
            self.phase = next;
        }
    }

    fn fail(&mut self, err: ProverError) -> ProverError {
        warn!(phase = %self.phase, error = %err, "session step failed");
        self.last_error = Some(err.to_string());
        self.transition(Phase::Failed);
        err
    }

    fn held_keys(&self, operation: &'static str) -> Result<(&KeyPair, Address), ProverError> {
        match (&self.keys, self.address) {
            (Some(keys), Some(address)) => Ok((keys, address)),
            _ => Err(ProverError::InvalidPhase {
                operation,
                phase: self.phase,
            }),
        }
    }

    // ----- sign-in -----

    /// Ask the wallet to sign the registration message and derive the key.
    ///
    /// Always restarts the flow: any held key is dropped first.
    ///
    /// # Errors
    /// * `ProverError::WrongChain` - the wallet is connected to another chain
    /// * `ProverError::SigningFailed` - the wallet refused or failed
    /// * `ProverError::InvalidSignatureFormat` - the wallet returned garbage
    pub async fn sign_in<W: WalletSigner>(&mut self, wallet: &W) -> Result<PublicKey, ProverError> {
        self.keys = None;
        self.address = None;
        self.transition(Phase::AwaitingSignature);

        match self.sign_in_inner(wallet).await {
            Ok(pk) => Ok(pk),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn sign_in_inner<W: WalletSigner>(
        &mut self,
        wallet: &W,
    ) -> Result<PublicKey, ProverError> {
        let actual = wallet.chain_id();
        if actual != self.config.chain_id {
            return Err(ProverError::WrongChain {
                expected: self.config.chain_id,
                actual,
            });
        }

        let address = wallet.address();
        let message = signing_message(&self.config.protocol, &address);
        let raw = wallet
            .sign_message(&message)
            .await
            .map_err(|e| ProverError::SigningFailed(e.to_string()))?;

        self.transition(Phase::DerivingKey);
        let signature = Signature::from_hex(&raw)?;
        let keys = KeyPair::from_signature(&signature);
        let public = keys.public;
        debug!(%address, "encryption key derived");

        self.keys = Some(keys);
        self.address = Some(address);
        Ok(public)
    }

    // ----- balance -----

    /// Fresh ledger read, decrypted with the session key.
    pub async fn read_balance<L: LedgerReader>(
        &self,
        ledger: &L,
    ) -> Result<BalanceReport, ProverError> {
        let (keys, address) = self.held_keys("read_balance")?;
        let token_id = read(ledger.token_id(self.config.token)).await?;
        let record = read(ledger.balance_of(address, token_id)).await?;
        balance::aggregate(&keys.private, &record)
    }

    // ----- proofs -----

    fn begin_build(&mut self, operation: &'static str) -> Result<(), ProverError> {
        let allowed = matches!(
            self.phase,
            Phase::DerivingKey | Phase::Ready | Phase::Confirmed | Phase::Failed
        );
        if !allowed {
            return Err(ProverError::InvalidPhase {
                operation,
                phase: self.phase,
            });
        }
        self.held_keys(operation)?;
        self.transition(Phase::BuildingInput);
        Ok(())
    }

    async fn generate<P: ProofGenerator>(
        &mut self,
        prover: &Arc<P>,
        circuit: CircuitArtifact,
        input: CircuitInput,
    ) -> Result<ProofMaterial, ProverError> {
        self.transition(Phase::GeneratingProof);
        self.cancel.send_replace(false);
        let mut cancelled = self.cancel.subscribe();

        let prover = Arc::clone(prover);
        let task = tokio::task::spawn_blocking(move || {
            prover
                .prove(&circuit, &input)
                .map_err(|e| ProverError::ProofGenerationFailed(e.to_string()))
        });

        tokio::select! {
            joined = task => joined
                .map_err(|e| ProverError::ProofGenerationFailed(format!("prover task: {e}")))?,
            _ = cancelled.wait_for(|c| *c) => {
                debug!("proof generation abandoned");
                Err(ProverError::Cancelled)
            }
        }
    }

    /// Build and prove the registration statement for the signed-in account.
    pub async fn prove_registration<P: ProofGenerator>(
        &mut self,
        prover: &Arc<P>,
    ) -> Result<RegistrationProof, ProverError> {
        self.begin_build("prove_registration")?;
        match self.prove_registration_inner(prover).await {
            Ok(proof) => {
                self.transition(Phase::Ready);
                Ok(proof)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn prove_registration_inner<P: ProofGenerator>(
        &mut self,
        prover: &Arc<P>,
    ) -> Result<RegistrationProof, ProverError> {
        let (keys, address) = self.held_keys("prove_registration")?;
        let registration = RegistrationInput::new(keys, &address, self.config.chain_id)?;
        let circuit = self.config.registration_circuit.clone();

        let material = self.generate(prover, circuit, registration.input).await?;
        inputs::format_proof(&material)
    }

    /// Build and prove a confidential transfer of `amount` base units to `to`.
    ///
    /// The sender's EGCT is read again after the proof is generated; if it
    /// moved in the meantime the proof is discarded.
    ///
    /// # Errors
    /// * `ProverError::InsufficientBalance` - before the prover is called
    /// * `ProverError::RecipientNotRegistered` / `ProverError::AuditorNotSet`
    /// * `ProverError::StaleBalance` - the EGCT changed during proving
    /// * `ProverError::Cancelled` - the proof was abandoned
    pub async fn prove_transfer<L: LedgerReader, P: ProofGenerator>(
        &mut self,
        ledger: &L,
        prover: &Arc<P>,
        to: Address,
        amount: u64,
    ) -> Result<PreparedTransfer, ProverError> {
        self.begin_build("prove_transfer")?;
        match self.prove_transfer_inner(ledger, prover, to, amount).await {
            Ok(prepared) => {
                self.transition(Phase::Ready);
                Ok(prepared)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn prove_transfer_inner<L: LedgerReader, P: ProofGenerator>(
        &mut self,
        ledger: &L,
        prover: &Arc<P>,
        to: Address,
        amount: u64,
    ) -> Result<PreparedTransfer, ProverError> {
        let (_, sender) = self.held_keys("prove_transfer")?;
        if to.is_zero() {
            return Err(ProverError::InvalidAddress(to.to_string()));
        }

        let token_id = read(ledger.token_id(self.config.token)).await?;
        let record = read(ledger.balance_of(sender, token_id)).await?;
        let recipient = Recipient {
            address: to,
            public_key: read(ledger.user_public_key(to)).await?,
        };
        let auditor = read(ledger.auditor_public_key()).await?;

        let keys = self.keys.as_ref().ok_or(ProverError::InvalidPhase {
            operation: "prove_transfer",
            phase: self.phase,
        })?;
        let settled = elgamal::decrypt(&keys.private, &record.egct)?;
        let plan = TransferPlan::new(keys, settled, record.egct, amount, &recipient, auditor)?;
        let built = inputs::build_transfer(&plan, &mut self.rng)?;
        let observed = *plan.sender_egct();
        drop(plan);

        let circuit = self.config.transfer_circuit.clone();
        let material = self.generate(prover, circuit, built.input).await?;
        let proof = inputs::format_proof(&material)?;

        let latest = read(ledger.balance_of(sender, token_id)).await?;
        if latest.egct != observed {
            return Err(ProverError::StaleBalance);
        }

        Ok(PreparedTransfer {
            to,
            token_id,
            amount,
            proof,
            sender_balance_pct: built.sender_balance_pct,
        })
    }

    // ----- submission -----

    fn begin_submit(&mut self, operation: &'static str) -> Result<(), ProverError> {
        if self.phase != Phase::Ready {
            return Err(ProverError::InvalidPhase {
                operation,
                phase: self.phase,
            });
        }
        self.transition(Phase::Submitting);
        Ok(())
    }

    fn finish_submit<E: fmt::Display>(
        &mut self,
        res: Result<String, E>,
    ) -> Result<String, ProverError> {
        match res {
            Ok(receipt) => {
                self.transition(Phase::Confirmed);
                Ok(receipt)
            }
            Err(e) => Err(self.fail(ProverError::LedgerSubmissionFailed(e.to_string()))),
        }
    }

    pub async fn submit_registration<S: LedgerSubmitter>(
        &mut self,
        submitter: &S,
        proof: &RegistrationProof,
    ) -> Result<String, ProverError> {
        self.begin_submit("submit_registration")?;
        let res = submitter.register(proof).await;
        self.finish_submit(res)
    }

    pub async fn submit_transfer<S: LedgerSubmitter>(
        &mut self,
        submitter: &S,
        prepared: &PreparedTransfer,
    ) -> Result<String, ProverError> {
        self.begin_submit("submit_transfer")?;
        let res = submitter
            .transfer(
                prepared.to,
                prepared.token_id,
                &prepared.proof,
                &prepared.sender_balance_pct,
            )
            .await;
        self.finish_submit(res)
    }
}

async fn read<T, E: fmt::Display>(
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, ProverError> {
    fut.await
        .map_err(|e| ProverError::LedgerReadFailed(e.to_string()))
}
