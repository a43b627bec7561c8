//! Pending-transaction pool and block builder.
//!
//! Translates `original_source/Node.py`'s `add_transaction_to_block`/
//! `add_transactions_to_block` into the Rust teacher's `Mutex`-guarded
//! mutation style: validate under the lock, apply to the ledger, and either
//! keep filling the in-progress block or hand off to the miner once it's
//! full.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::TxnError;
use crate::gossip;
use crate::miner;
use crate::net::Transport;
use crate::state::PeerState;
use crate::transaction::{self, Transaction};
use crate::wallet::PublicKey;

/// Validates `tx` against the current ledger and chain, and — if valid —
/// adds it to the in-progress block, applies it to the ledger, and updates
/// the local wallet balance. Spawns the miner if this fills the block to
/// capacity and a miner isn't already running.
///
/// Returns the validation error (if any) without mutating state.
pub fn add_transaction_to_block(
    state: &Arc<PeerState>,
    transport: &Arc<dyn Transport>,
    tx: Transaction,
) -> Result<(), TxnError> {
    let self_key = state.public_key();
    let should_mine = state.lock(|inner| -> Result<bool, TxnError> {
        if inner.chain.contains_transaction(&tx.transaction_id) {
            return Err(TxnError::DuplicateTransaction);
        }

        if let Err(err) = transaction::verify(&tx, &inner.ledger, state.crypto.as_ref()) {
            // Already applied earlier, then displaced from `current_block`
            // (the miner took it for an attempt the tip has since outrun).
            // Re-verification against the now-already-debited ledger will
            // never pass for it, so just give it back its seat.
            let already_pending = inner.pending.iter().any(|p| p.transaction_id == tx.transaction_id);
            let already_queued = inner.current_block.iter().any(|q| q.transaction_id == tx.transaction_id);
            if already_pending && !already_queued && inner.current_block.len() < state.config.capacity {
                inner.current_block.push(tx);
                return Ok(inner.current_block.len() >= state.config.capacity);
            }
            return Err(err);
        }

        if tx.sender == crate::transaction::Sender::Peer(self_key.clone()) {
            inner.wallet.balance -= tx.amount as i64;
        }
        if tx.receiver == self_key {
            inner.wallet.balance += tx.amount as i64;
        }

        inner.ledger.apply(&tx);
        inner.pending.push(tx.clone());
        if inner.current_block.len() < state.config.capacity {
            inner.current_block.push(tx);
        }

        Ok(inner.current_block.len() >= state.config.capacity)
    })?;

    if should_mine {
        maybe_spawn_miner(state, transport);
    }

    Ok(())
}

/// Adds a batch of transactions one at a time, per
/// `add_transactions_to_block` in the original. Never silently strands a
/// transaction: every call goes through [`add_transaction_to_block`], so a
/// transaction that arrives exactly when the block fills still both lands
/// in `current_block`/`pending` and triggers mining.
pub fn add_transactions_to_block(state: &Arc<PeerState>, transport: &Arc<dyn Transport>, txs: Vec<Transaction>) {
    for tx in txs {
        if let Err(err) = add_transaction_to_block(state, transport, tx) {
            debug!(error = %err, "dropped invalid transaction during batch add");
        }
    }
}

fn maybe_spawn_miner(state: &Arc<PeerState>, transport: &Arc<dyn Transport>) {
    if state.mining_flag.compare_exchange(false, true, std::sync::atomic::Ordering::SeqCst, std::sync::atomic::Ordering::SeqCst).is_ok() {
        info!(peer = state.id, "block reached capacity, starting miner");
        miner::spawn_miner(state.clone(), transport.clone());
    }
}

/// `create_transaction` (§6): builds, signs, applies, and broadcasts a new
/// transaction paying `amount` to `receiver` out of this peer's own unspent
/// outputs. Returns `false` (mirroring the original's boolean return) rather
/// than the validation error, since the only client of this is the
/// external, out-of-scope CLI/HTTP shim — a thin wrapper that only needs a
/// success/failure signal.
pub fn create_transaction(
    state: &Arc<PeerState>,
    transport: &Arc<dyn Transport>,
    receiver: &PublicKey,
    amount: u64,
) -> bool {
    let self_key = state.public_key();
    let self_private = state.lock(|inner| inner.wallet.private_key.clone());

    let Some(inputs) = state.lock(|inner| inner.ledger.select_inputs(&self_key, amount)) else {
        return false;
    };

    let now = miner::now_unix_secs();
    let tx = match transaction::create(&self_key, &self_private, receiver, amount, inputs, now, state.crypto.as_ref()) {
        Ok(tx) => tx,
        Err(_) => return false,
    };

    if add_transaction_to_block(state, transport, tx.clone()).is_err() {
        return false;
    }

    gossip::broadcast_transaction(state, transport, tx);
    true
}

/// Drains and returns the transactions currently queued for the next block,
/// leaving the builder empty. Used once a block has been successfully mined
/// and accepted.
pub fn take_current_block(state: &PeerState) -> Vec<Transaction> {
    state.lock(|inner| std::mem::take(&mut inner.current_block))
}

/// Removes confirmed transactions from the pending pool once their block is
/// accepted (they may have arrived here via gossip before the block did).
pub fn remove_pending(state: &PeerState, confirmed: &[Transaction]) {
    state.lock(|inner| {
        inner.pending.retain(|p| !confirmed.iter().any(|c| c.transaction_id == p.transaction_id));
    });
}
