//! Wallet and proof-generator doubles.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use eerc_prover::config::REGISTRATION_CIRCUIT;
use eerc_prover::inputs::TRANSFER_SIGNALS;
use eerc_prover::keys::{PROTOCOL_NAME, signing_message};
use eerc_prover::session::{ProofGenerator, WalletSigner};
use eerc_prover::{Address, CircuitArtifact, CircuitInput, KeyPair, ProofMaterial, Signature};
use serde_json::Value;
use sha3::{Digest, Keccak256};

/// Signs by hashing a per-wallet secret with the message. Not ECDSA, but
/// deterministic and 65 bytes long, which is all key derivation relies on.
pub struct TestWallet {
    address: Address,
    secret: [u8; 32],
    chain_id: u64,
    refuse_next: AtomicBool,
    signatures: AtomicUsize,
}

impl TestWallet {
    pub fn new(address: Address, secret: [u8; 32], chain_id: u64) -> Self {
        TestWallet {
            address,
            secret,
            chain_id,
            refuse_next: AtomicBool::new(false),
            signatures: AtomicUsize::new(0),
        }
    }

    pub fn on_chain(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// The next signing request is rejected, as if the user dismissed it.
    pub fn refuse_next(&self) {
        self.refuse_next.store(true, Ordering::SeqCst);
    }

    pub fn signatures(&self) -> usize {
        self.signatures.load(Ordering::SeqCst)
    }

    pub fn signature_for(&self, message: &str) -> String {
        let r = Keccak256::new()
            .chain_update(self.secret)
            .chain_update(message.as_bytes())
            .finalize();
        let s = Keccak256::digest(r);
        let mut sig = Vec::with_capacity(65);
        sig.extend_from_slice(&r);
        sig.extend_from_slice(&s);
        sig.push(0x1b);
        format!("0x{}", hex::encode(sig))
    }

    /// The key pair a session signed in with this wallet ends up holding.
    pub fn expected_keys(&self) -> Result<KeyPair> {
        let message = signing_message(PROTOCOL_NAME, &self.address);
        let sig = Signature::from_hex(&self.signature_for(&message))?;
        Ok(KeyPair::from_signature(&sig))
    }
}

impl WalletSigner for TestWallet {
    type Error = anyhow::Error;

    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn sign_message(&self, message: &str) -> Result<String> {
        if self.refuse_next.swap(false, Ordering::SeqCst) {
            bail!("user rejected the request");
        }
        self.signatures.fetch_add(1, Ordering::SeqCst);
        Ok(self.signature_for(message))
    }
}

/// Public-signal layout of the echoed transfer statement; widths in elements.
pub const TRANSFER_SIGNAL_LAYOUT: [(&str, usize); 12] = [
    ("SenderPublicKey", 2),
    ("SenderVTTC1", 2),
    ("SenderVTTC2", 2),
    ("ReceiverPublicKey", 2),
    ("ReceiverVTTC1", 2),
    ("ReceiverVTTC2", 2),
    ("AuditorPublicKey", 2),
    ("AuditorPCT", 4),
    ("AuditorPCTAuthKey", 2),
    ("AuditorPCTNonce", 1),
    ("SenderBalanceC1", 2),
    ("SenderBalanceC2", 2),
];

/// Receiver PCT appended after [`TRANSFER_SIGNAL_LAYOUT`].
pub const RECEIVER_PCT_LAYOUT: [(&str, usize); 3] = [
    ("ReceiverPCT", 4),
    ("ReceiverPCTAuthKey", 2),
    ("ReceiverPCTNonce", 1),
];

const REGISTRATION_SIGNAL_LAYOUT: [(&str, usize); 4] = [
    ("SenderPublicKey", 2),
    ("SenderAddress", 1),
    ("ChainID", 1),
    ("RegistrationHash", 1),
];

fn flatten(input: &CircuitInput, layout: &[(&str, usize)], out: &mut Vec<String>) -> Result<()> {
    for (key, width) in layout {
        let value = input
            .get(key)
            .ok_or_else(|| anyhow!("input is missing {key}"))?;
        let items: Vec<String> = match value {
            Value::String(s) => vec![s.clone()],
            Value::Array(a) => a
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<_>>()
                .ok_or_else(|| anyhow!("{key} is not a list of strings"))?,
            _ => bail!("{key} has an unexpected shape"),
        };
        if items.len() != *width {
            bail!("{key} has {} elements, expected {width}", items.len());
        }
        out.extend(items);
    }
    Ok(())
}

/// Returns snarkjs-shaped output whose public signals echo selected inputs.
/// The proof points are fixed small integers.
#[derive(Default)]
pub struct EchoProver {
    calls: AtomicUsize,
    delay: Duration,
    fail_next: Mutex<Option<String>>,
    signal_count: Option<usize>,
    hook: Option<Box<dyn Fn() + Send + Sync>>,
}

impl EchoProver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Emit exactly `n` public signals regardless of circuit.
    pub fn with_signal_count(mut self, n: usize) -> Self {
        self.signal_count = Some(n);
        self
    }

    /// Run `f` inside every proof, before returning.
    pub fn with_hook(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(f));
        self
    }

    pub fn fail_next(&self, message: &str) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(message.to_string());
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProofGenerator for EchoProver {
    type Error = anyhow::Error;

    fn prove(&self, circuit: &CircuitArtifact, input: &CircuitInput) -> Result<ProofMaterial> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(hook) = &self.hook {
            hook();
        }
        let failure = self
            .fail_next
            .lock()
            .map_err(|_| anyhow!("prover state poisoned"))?
            .take();
        if let Some(message) = failure {
            bail!(message);
        }

        let mut signals = Vec::new();
        if circuit.name == REGISTRATION_CIRCUIT {
            flatten(input, &REGISTRATION_SIGNAL_LAYOUT, &mut signals)?;
        } else {
            flatten(input, &TRANSFER_SIGNAL_LAYOUT, &mut signals)?;
            flatten(input, &RECEIVER_PCT_LAYOUT, &mut signals)?;
            debug_assert_eq!(signals.len(), TRANSFER_SIGNALS);
        }
        if let Some(n) = self.signal_count {
            signals.resize(n, "0".to_string());
        }

        let s = |v: &str| v.to_string();
        Ok(ProofMaterial {
            pi_a: vec![s("11"), s("12"), s("1")],
            pi_b: vec![vec![s("21"), s("22")], vec![s("23"), s("24")], vec![s("1"), s("0")]],
            pi_c: vec![s("31"), s("32"), s("1")],
            public_signals: signals,
        })
    }
}
