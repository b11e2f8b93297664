//! Protocol configuration.
//!
//! ```json
//! {
//!   "protocol": "eERC",
//!   "chain_id": 43113,
//!   "token": "0x…",
//!   "registration_circuit": { "name": "RegistrationCircuit", "wasm": "…", "zkey": "…" },
//!   "transfer_circuit": { "name": "TransferCircuit", "wasm": "…", "zkey": "…" }
//! }
//! ```
//!
//! Only `chain_id` and `token` are required; the rest defaults to the
//! values below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::keys::PROTOCOL_NAME;
use crate::{Address, ProverError};

pub const REGISTRATION_CIRCUIT: &str = "RegistrationCircuit";
pub const TRANSFER_CIRCUIT: &str = "TransferCircuit";
const CIRCUIT_DIR: &str = "circuits";

/// Names a compiled circuit and its proving key. The files are opaque to this
/// crate and only handed to the proof generator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitArtifact {
    pub name: String,
    pub wasm: PathBuf,
    pub zkey: PathBuf,
}

impl CircuitArtifact {
    /// `circuits/<name>.wasm` and `circuits/<name>.groth16.zkey`.
    pub fn named(name: &str) -> Self {
        let dir = Path::new(CIRCUIT_DIR);
        CircuitArtifact {
            name: name.to_string(),
            wasm: dir.join(format!("{name}.wasm")),
            zkey: dir.join(format!("{name}.groth16.zkey")),
        }
    }

    fn validate(&self) -> Result<(), ProverError> {
        if self.name.is_empty() {
            return Err(ProverError::Config("circuit name is empty".into()));
        }
        if self.wasm.as_os_str().is_empty() || self.zkey.as_os_str().is_empty() {
            return Err(ProverError::Config(format!(
                "circuit {} is missing an artifact path",
                self.name
            )));
        }
        Ok(())
    }
}

fn default_protocol() -> String {
    PROTOCOL_NAME.to_string()
}

fn default_registration() -> CircuitArtifact {
    CircuitArtifact::named(REGISTRATION_CIRCUIT)
}

fn default_transfer() -> CircuitArtifact {
    CircuitArtifact::named(TRANSFER_CIRCUIT)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolConfig {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub chain_id: u64,
    /// The public ERC-20 whose confidential counterpart this client operates on.
    pub token: Address,
    #[serde(default = "default_registration")]
    pub registration_circuit: CircuitArtifact,
    #[serde(default = "default_transfer")]
    pub transfer_circuit: CircuitArtifact,
}

impl ProtocolConfig {
    pub fn new(chain_id: u64, token: Address) -> Self {
        ProtocolConfig {
            protocol: default_protocol(),
            chain_id,
            token,
            registration_circuit: default_registration(),
            transfer_circuit: default_transfer(),
        }
    }

    pub fn from_json(s: &str) -> Result<Self, ProverError> {
        let cfg: ProtocolConfig =
            serde_json::from_str(s).map_err(|e| ProverError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProverError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ProverError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<(), ProverError> {
        if self.protocol.is_empty() {
            return Err(ProverError::Config("protocol name is empty".into()));
        }
        if self.chain_id == 0 {
            return Err(ProverError::Config("chain_id must be non-zero".into()));
        }
        if self.token.is_zero() {
            return Err(ProverError::Config("token address is zero".into()));
        }
        self.registration_circuit.validate()?;
        self.transfer_circuit.validate()
    }
}
