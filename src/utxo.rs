//! The UTXO ledger ("NBCs" in the original): which outputs each peer can
//! currently spend.
//!
//! Simplified from the teacher's `UTXOPool`/`TransactionIndex`, which index
//! outputs by `(block, txn hash, output index)` to support arbitrary locking
//! scripts. NoobCash has no scripting (non-goal), so ownership collapses to
//! "whoever `receiver` names", and a flat `PublicKey -> Vec<TransactionOutput>`
//! map is enough — matching `original_source/`'s `self.NBCs` dict of lists.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::transaction::{Sender, Transaction, TransactionOutput};
use crate::wallet::PublicKey;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtxoLedger {
    outputs: HashMap<PublicKey, Vec<TransactionOutput>>,
}

impl UtxoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outputs_of(&self, owner: &PublicKey) -> &[TransactionOutput] {
        self.outputs.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn balance_of(&self, owner: &PublicKey) -> u64 {
        self.outputs_of(owner).iter().map(|o| o.amount).sum()
    }

    /// Sum of every unspent output across every owner. Only walked under the
    /// `debug` feature (see `crate::chain_sync::accept_block`) — it's the
    /// quantified invariant from spec §8 ("sum over all pk of sum(NBCs[pk])
    /// = 100*N"), not something normal operation needs to compute.
    #[cfg(feature = "debug")]
    pub fn total_supply(&self) -> u64 {
        self.outputs.values().flatten().map(|o| o.amount).sum()
    }

    /// Credits a single output directly. Used for genesis seeding and tests;
    /// normal traffic goes through [`UtxoLedger::apply`].
    pub fn credit(&mut self, output: TransactionOutput) {
        self.outputs.entry(output.receiver.clone()).or_default().push(output);
    }

    pub fn clear(&mut self) {
        self.outputs.clear();
    }

    /// Greedily selects unspent outputs owned by `owner` that sum to at
    /// least `amount`, or `None` if the owner's total balance falls short.
    /// Used by both locally-originated transactions (`crate::mempool`) and
    /// the bootstrap's one-time peer seeding (`crate::bootstrap`).
    pub fn select_inputs(&self, owner: &PublicKey, amount: u64) -> Option<Vec<TransactionOutput>> {
        let mut have = 0u64;
        let mut chosen = Vec::new();
        for output in self.outputs_of(owner) {
            if have >= amount {
                break;
            }
            chosen.push(output.clone());
            have += output.amount;
        }
        (have >= amount).then_some(chosen)
    }

    /// Applies a transaction already known to be valid: removes its spent
    /// inputs from the sender's entry (a no-op for `Sender::Coinbase`, which
    /// has none) and credits its outputs to their respective owners.
    pub fn apply(&mut self, tx: &Transaction) {
        if let Sender::Peer(sender) = &tx.sender {
            let spent: HashSet<_> = tx.inputs.iter().map(|i| i.id).collect();
            if let Some(entry) = self.outputs.get_mut(sender) {
                entry.retain(|o| !spent.contains(&o.id));
            }
            if tx.outputs.len() == 2 {
                self.outputs.entry(sender.clone()).or_default().push(tx.outputs[0].clone());
            }
        }

        let payment = tx.outputs.last().expect("transaction always has a payment output");
        self.outputs.entry(payment.receiver.clone()).or_default().push(payment.clone());
    }
}
