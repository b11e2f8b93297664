//! Balance reconstruction from the ledger's encrypted balance record.
//!
//! The EGCT holds the *settled* balance. Amount PCTs that have not been folded
//! into it are *pending* and are always reported on their own, so an amount is
//! never counted twice.

use serde::Serialize;
use tracing::{debug, warn};

use eerc_primitives::field::field_to_u64;
use eerc_primitives::types::pct_is_empty;
use eerc_primitives::units::format_units;

use crate::keys::PrivateKey;
use crate::{BalanceRecord, Field, MAX_PLAINTEXT, PCT_LEN, ProverError, elgamal, pct};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    /// Decrypted EGCT; zero when the EGCT is empty.
    pub settled: u64,
    /// Sum of decryptable amount PCTs.
    pub pending: u64,
    pub has_balance: bool,
    /// Amount PCTs skipped because they did not decrypt under this key.
    pub undecryptable: usize,
    /// The balance PCT's value, when the ledger carries one next to a non-empty EGCT.
    pub balance_pct_hint: Option<u64>,
}

impl BalanceReport {
    pub fn total(&self) -> u64 {
        self.settled.saturating_add(self.pending)
    }

    pub fn display_settled(&self) -> String {
        format_units(self.settled)
    }

    pub fn display_pending(&self) -> String {
        format_units(self.pending)
    }
}

fn decrypt_amount(sk: &PrivateKey, pct_elems: &[Field; PCT_LEN]) -> Option<u64> {
    let value = pct::decrypt_pct(sk, pct_elems).ok()?;
    field_to_u64(&value).filter(|v| *v <= MAX_PLAINTEXT)
}

/// Reconstruct `sk`'s balance from `record`.
///
/// # Errors
/// * `ProverError::DecryptionBoundExceeded` - the EGCT is non-empty and does
///   not decrypt within the plaintext bound
pub fn aggregate(sk: &PrivateKey, record: &BalanceRecord) -> Result<BalanceReport, ProverError> {
    let mut report = BalanceReport::default();

    for entry in record.amount_pcts.iter().filter(|e| !e.is_empty()) {
        match decrypt_amount(sk, &entry.pct) {
            Some(v) => report.pending = report.pending.saturating_add(v),
            None => {
                warn!(index = entry.index, "skipping amount PCT that does not decrypt");
                report.undecryptable += 1;
            }
        }
    }

    if !record.egct.is_empty() {
        report.settled = elgamal::decrypt(sk, &record.egct)?;

        if !pct_is_empty(&record.balance_pct) {
            report.balance_pct_hint = decrypt_amount(sk, &record.balance_pct);
            match report.balance_pct_hint {
                Some(hint) if hint != report.settled => {
                    warn!(hint, settled = report.settled, "balance PCT disagrees with EGCT");
                }
                None => warn!("balance PCT does not decrypt"),
                _ => {}
            }
        }
    }

    report.has_balance = report.total() > 0;
    debug!(
        pending_entries = record.amount_pcts.len(),
        undecryptable = report.undecryptable,
        "balance aggregated"
    );
    Ok(report)
}
