//! Block validation and acceptance (§4.6).
//!
//! `validate` mirrors `original_source/Node.py`'s `valid_proof`/block checks;
//! `accept_block` is `create_new_block`, translated to the Rust teacher's
//! lock-then-mutate style. Both are used by the miner (for its own freshly
//! sealed block) and by `crate::gossip` (for inbound blocks).

use std::sync::Arc;

use tracing::{debug, warn};

use crate::block::Block;
use crate::error::BlockError;
use crate::net::Transport;
use crate::state::PeerState;
use crate::transaction;

/// Checks `block`'s hash, difficulty, and linkage against the current tip,
/// and that every transaction it carries is either already-trusted pending
/// or independently verifiable. Does not mutate state.
///
/// Returns `Ok(())` if the block can be appended as-is. On a previous-hash
/// mismatch the caller is expected to schedule conflict resolution — this
/// function only reports the mismatch, since spawning a thread is a side
/// effect callers may want to control.
pub fn validate(state: &PeerState, block: &Block) -> Result<(), BlockError> {
    if block.transactions.is_empty() {
        return Err(BlockError::EmptyBlock);
    }
    if block.transactions.len() > state.config.capacity {
        return Err(BlockError::OverCapacity { max: state.config.capacity, actual: block.transactions.len() });
    }
    if !block.hash_is_valid(0, state.crypto.as_ref()) {
        return Err(BlockError::HashMismatch);
    }
    if crate::block::leading_zero_hex_digits(&block.hash) < state.config.mining_difficulty {
        return Err(BlockError::DifficultyNotMet);
    }

    state.lock(|inner| -> Result<(), BlockError> {
        if !inner.chain.links_to_tip(block) {
            return Err(BlockError::PreviousHashMismatch);
        }

        for tx in &block.transactions {
            if inner.pending.contains(tx) {
                continue;
            }
            transaction::verify(tx, &inner.ledger, state.crypto.as_ref())
                .map_err(|e| BlockError::InvalidTransaction(e, tx_uuid_seed(tx)))?;
        }
        Ok(())
    })
}

/// Placeholder identifier for `BlockError::InvalidTransaction`'s UUID slot;
/// `transaction_id` is a `Hash256`, not a `Uuid`, so we derive a stable UUID
/// from its first 16 bytes purely for diagnostic display.
fn tx_uuid_seed(tx: &crate::transaction::Transaction) -> uuid::Uuid {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&tx.transaction_id[..16]);
    uuid::Uuid::from_bytes(bytes)
}

/// `create_new_block` (§4.6): validates, then appends `block` to the chain
/// under the main lock, applies its transactions (skipping ones already
/// applied via `pending`), drops them from `pending`, bumps the mining
/// epoch, and rebuilds `current_block` from whatever remains pending.
///
/// On success, returns the block's own index for logging. On a
/// previous-hash mismatch, the caller should trigger conflict resolution.
pub fn accept_block(state: &Arc<PeerState>, block: Block) -> Result<u64, BlockError> {
    validate(state, &block)?;

    let index = state.lock(|inner| {
        for tx in &block.transactions {
            if !inner.pending.contains(tx) {
                if tx.receiver == inner.wallet.public_key {
                    inner.wallet.balance += tx.amount as i64;
                }
                if tx.sender == crate::transaction::Sender::Peer(inner.wallet.public_key.clone()) {
                    inner.wallet.balance -= tx.amount as i64;
                }
                inner.ledger.apply(tx);
            }
        }

        let confirmed_ids: std::collections::HashSet<_> =
            block.transactions.iter().map(|t| t.transaction_id).collect();
        inner.pending.retain(|p| !confirmed_ids.contains(&p.transaction_id));

        let index = block.index;
        inner.chain.push(block);

        #[cfg(feature = "debug")]
        {
            let total = inner.ledger.total_supply();
            if total != state.config.total_supply {
                tracing::error!(peer = state.id, total, expected = state.config.total_supply, "NBCs invariant violated after apply");
            }
        }

        index
    });

    state.bump_mining_epoch();

    // Drain whatever's left of `pending` into a fresh `current_block`. No
    // transport/mining is triggered here deliberately: a freshly accepted
    // block's leftovers don't need to force mining until they themselves
    // reach capacity again.
    let leftover = state.lock(|inner| std::mem::take(&mut inner.pending));
    for tx in leftover {
        state.lock(|inner| {
            inner.pending.push(tx.clone());
            if inner.current_block.len() < state.config.capacity {
                inner.current_block.push(tx);
            }
        });
    }

    debug!(peer = state.id, index, "block accepted onto chain");
    Ok(index)
}

/// Dispatches an inbound block through validation and acceptance. On a
/// previous-hash mismatch, spawns the conflict resolver asynchronously and
/// reports the rejection to the caller; other failures are just logged.
pub fn handle_incoming_block(state: &Arc<PeerState>, transport: &Arc<dyn Transport>, block: Block) -> Result<(), BlockError> {
    match accept_block(state, block) {
        Ok(_) => Ok(()),
        Err(BlockError::PreviousHashMismatch) => {
            warn!(peer = state.id, "previous-hash mismatch, scheduling conflict resolution");
            crate::conflict::spawn_resolve(state.clone(), transport.clone());
            Err(BlockError::PreviousHashMismatch)
        }
        Err(err) => {
            debug!(peer = state.id, error = %err, "rejected inbound block");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Chain;
    use crate::config::Config;
    use crate::crypto::test_support::SmallRsaProvider;
    use crate::crypto::CryptoProvider;
    use crate::net::LoopbackTransport;
    use crate::state::PeerInfo;
    use crate::wallet::Wallet;

    fn test_state(difficulty: usize) -> Arc<PeerState> {
        let crypto = SmallRsaProvider::default();
        let wallet = Wallet::generate(&crypto).unwrap();
        let chain = Chain::genesis(&wallet.public_key, 300, 0.0, &crypto);
        let ring = vec![PeerInfo { address: "127.0.0.1:9300".parse().unwrap(), public_key: wallet.public_key.clone() }];
        let config = Config::builder().mining_difficulty(difficulty).capacity(2).finish();
        Arc::new(PeerState::new(0, "127.0.0.1:9300".parse().unwrap(), config, Box::new(crypto), wallet, chain, ring))
    }

    #[test]
    fn accept_block_extends_chain_and_bumps_epoch() {
        let state = test_state(0);
        let tip = state.lock(|inner| inner.chain.tip().unwrap().clone());
        let crypto = SmallRsaProvider::default();
        let block = crate::block::Block::sealed(tip.index + 1, tip.hash, 1.0, vec![], [0u8; 4], &crypto);

        let epoch_before = state.current_mining_epoch();
        accept_block(&state, block).unwrap();
        assert_eq!(state.chain_len(), 2);
        assert!(state.current_mining_epoch() > epoch_before);
    }

    #[test]
    fn accept_block_rejects_wrong_previous_hash() {
        let state = test_state(0);
        let crypto = SmallRsaProvider::default();
        let block = crate::block::Block::sealed(2, [0xAAu8; 32], 1.0, vec![], [0u8; 4], &crypto);
        let err = accept_block(&state, block).unwrap_err();
        assert!(matches!(err, BlockError::PreviousHashMismatch));
    }

    #[test]
    fn handle_incoming_block_schedules_resolution_on_mismatch() {
        let state = test_state(0);
        let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport::new());
        let crypto = SmallRsaProvider::default();
        let block = crate::block::Block::sealed(2, [0xAAu8; 32], 1.0, vec![], [0u8; 4], &crypto);
        let err = handle_incoming_block(&state, &transport, block).unwrap_err();
        assert!(matches!(err, BlockError::PreviousHashMismatch));
    }

    #[tracing_test::traced_test]
    #[test]
    fn mismatch_logs_a_warning_before_scheduling_resolution() {
        let state = test_state(0);
        let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport::new());
        let crypto = SmallRsaProvider::default();
        let block = crate::block::Block::sealed(2, [0xAAu8; 32], 1.0, vec![], [0u8; 4], &crypto);
        let _ = handle_incoming_block(&state, &transport, block);
        assert!(tracing_test::logs_contain("previous-hash mismatch"));
    }
}
