//! Gossip handlers (§4.7): the `RequestHandler` that dispatches every
//! inbound peer-to-peer RPC into the right module, plus the broadcast fired
//! after a transaction is created locally. Block broadcast happens from
//! `crate::miner` right after a successful mine, and ring/seed broadcasts
//! happen from `crate::bootstrap` — this module is the receiving end for
//! all three, and the sending end for transactions.

use std::sync::Arc;

use tracing::debug;

use crate::bootstrap::Bootstrap;
use crate::chain_sync;
use crate::mempool;
use crate::net::{broadcast, Request, RequestHandler, Response, Transport};
use crate::state::PeerState;
use crate::transaction::Transaction;
use crate::wallet::PublicKey;

/// Broadcasts a freshly created local transaction to the rest of the ring.
/// Duplicates are harmless: every receiver's `Verify` rejects a
/// `transaction_id` it has already seen (§4.7).
pub fn broadcast_transaction(state: &PeerState, transport: &Arc<dyn Transport>, tx: Transaction) {
    let (ring, self_index) = state.ring_snapshot();
    broadcast(transport.clone(), &ring, self_index, Request::AddTransaction(tx));
}

/// One peer's inbound request dispatcher. Registered against a
/// [`crate::net::Transport`] (a [`crate::net::LoopbackTransport`] in tests
/// and the bundled demo) under this peer's address.
pub struct PeerHandler {
    pub state: Arc<PeerState>,
    pub transport: Arc<dyn Transport>,
    /// `Some` only for the bootstrap peer, which alone answers
    /// `registerNode`/`setRing`.
    pub bootstrap: Option<Arc<Bootstrap>>,
}

impl RequestHandler for PeerHandler {
    fn handle(&self, request: Request) -> Response {
        match request {
            Request::RegisterNode { public_key, address } => self.handle_register(public_key, address),
            Request::SetRing { ring } => {
                self.state.lock(|inner| inner.ring = ring);
                Response::Ok
            }
            Request::AddTransaction(tx) => self.handle_add_transaction(tx),
            Request::AddBlock(block) => self.handle_add_block(block),
            Request::GetChain => Response::Chain(self.state.chain_snapshot()),
            Request::ChainLength => Response::ChainLength(self.state.chain_len()),
        }
    }
}

impl PeerHandler {
    fn handle_register(&self, public_key: PublicKey, address: std::net::SocketAddr) -> Response {
        let Some(bootstrap) = &self.bootstrap else {
            return Response::Rejected("not the bootstrap peer".into());
        };
        let (id, chain) = bootstrap.register(&self.state, &self.transport, public_key, address);
        let ring = self.state.lock(|inner| inner.ring.clone());
        Response::Registered { id, ring, chain }
    }

    fn handle_add_transaction(&self, tx: Transaction) -> Response {
        match mempool::add_transaction_to_block(&self.state, &self.transport, tx) {
            Ok(()) => Response::Ok,
            Err(err) => {
                debug!(peer = self.state.id, error = %err, "rejected inbound transaction");
                Response::Rejected(err.to_string())
            }
        }
    }

    fn handle_add_block(&self, block: crate::block::Block) -> Response {
        match chain_sync::handle_incoming_block(&self.state, &self.transport, block) {
            Ok(()) => Response::Ok,
            Err(err) => Response::Rejected(err.to_string()),
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

    fn handler(bootstrap: bool) -> PeerHandler {
        let crypto = SmallRsaProvider::default();
        let wallet = Wallet::generate(&crypto).unwrap();
        let chain = Chain::genesis(&wallet.public_key, 300, 0.0, &crypto);
        let address: std::net::SocketAddr = "127.0.0.1:7000".parse().unwrap();
        let ring = vec![PeerInfo { address, public_key: wallet.public_key.clone() }];
        let config = Config::builder().node_count(1).finish();
        let state = Arc::new(PeerState::new(0, address, config, Box::new(crypto), wallet, chain, ring.clone()));
        let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport::new());
        let bootstrap = bootstrap.then(|| Arc::new(crate::bootstrap::Bootstrap::new(1, ring[0].clone())));
        PeerHandler { state, transport, bootstrap }
    }

    #[test]
    fn chain_length_reports_current_length() {
        let h = handler(false);
        let response = h.handle(Request::ChainLength);
        assert!(matches!(response, Response::ChainLength(1)));
    }

    #[test]
    fn register_is_rejected_on_non_bootstrap_peer() {
        let h = handler(false);
        let crypto = SmallRsaProvider::default();
        let (pk, _) = crypto.keygen().unwrap();
        let response = h.handle(Request::RegisterNode { public_key: pk, address: "127.0.0.1:7001".parse().unwrap() });
        assert!(matches!(response, Response::Rejected(_)));
    }

    #[test]
    fn get_chain_returns_current_chain() {
        let h = handler(true);
        let response = h.handle(Request::GetChain);
        assert!(matches!(response, Response::Chain(chain) if chain.len() == 1));
    }
}
