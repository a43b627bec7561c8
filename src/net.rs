//! The RPC fabric boundary. `original_source/app.py`'s Flask HTTP layer is
//! out of scope (spec.md's non-goals); this module generalizes the
//! teacher's `src/v1/request.rs`/`response.rs` enum shape behind a
//! [`Transport`] trait, so any binding (HTTP, an in-process channel, a test
//! double) can drive the same peer logic.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::block::{Block, Chain};
use crate::error::TransportError;
use crate::state::PeerInfo;
use crate::transaction::Transaction;
use crate::wallet::PublicKey;

/// A request one peer can send another. Shape mirrors the teacher's
/// `Request` enum (`src/v1/request.rs`), trimmed to NoobCash's operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Sent by a non-bootstrap peer to join the ring.
    RegisterNode { public_key: PublicKey, address: SocketAddr },
    /// Sent by the bootstrap peer once `node_count` registrations arrive.
    SetRing { ring: Vec<PeerInfo> },
    AddTransaction(Transaction),
    AddBlock(Block),
    GetChain,
    ChainLength,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Registered { id: usize, ring: Vec<PeerInfo>, chain: Chain },
    Ok,
    Rejected(String),
    Chain(Chain),
    ChainLength(usize),
}

/// A pluggable transport: sends a request to a peer and waits for its
/// response. Implementations own whatever wire format/connection handling
/// they need; the core only depends on this trait.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, peer: &PeerInfo, request: Request) -> Result<Response, TransportError>;
}

/// Fire-and-forget broadcast to every ring member but `self_index`, one
/// thread per peer — matches the teacher's `broadcast_async` in
/// `src/v1/net.rs`.
pub fn broadcast(transport: Arc<dyn Transport>, ring: &[PeerInfo], self_index: usize, request: Request) {
    for (i, peer) in ring.iter().enumerate() {
        if i == self_index {
            continue;
        }
        let transport = transport.clone();
        let peer = peer.clone();
        let request = request.clone();
        thread::spawn(move || {
            if let Err(err) = transport.send(&peer, request) {
                warn!(peer = %peer.address, error = %err, "broadcast delivery failed");
            }
        });
    }
}

/// Synchronously asks every ring member but `self_index` for something and
/// collects whatever responses arrive. Used by conflict resolution, which
/// needs every peer's answer before it can decide anything.
pub fn ask_all(transport: &Arc<dyn Transport>, ring: &[PeerInfo], self_index: usize, request: Request) -> Vec<(PeerInfo, Response)> {
    ring.iter()
        .enumerate()
        .filter(|(i, _)| *i != self_index)
        .filter_map(|(_, peer)| transport.send(peer, request.clone()).ok().map(|resp| (peer.clone(), resp)))
        .collect()
}

/// Dispatches an inbound [`Request`] to peer logic and produces a
/// [`Response`]. One implementation is registered per peer with a
/// [`LoopbackTransport`]; a real HTTP binding would implement the same
/// trait behind its handler routes.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: Request) -> Response;
}

/// An in-process transport for tests and the bundled demo: peers register a
/// [`RequestHandler`] under their address, and `send` dispatches directly
/// into it rather than going over a socket.
#[derive(Default)]
pub struct LoopbackTransport {
    handlers: Mutex<HashMap<SocketAddr, Arc<dyn RequestHandler>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: SocketAddr, handler: Arc<dyn RequestHandler>) {
        self.handlers.lock().expect("loopback registry poisoned").insert(address, handler);
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, peer: &PeerInfo, request: Request) -> Result<Response, TransportError> {
        let handler = {
            let handlers = self.handlers.lock().expect("loopback registry poisoned");
            handlers.get(&peer.address).cloned()
        };
        let handler = handler
            .ok_or_else(|| TransportError::PeerUnreachable(peer.address, "no handler registered".into()))?;
        Ok(handler.handle(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;
    impl RequestHandler for EchoHandler {
        fn handle(&self, request: Request) -> Response {
            match request {
                Request::ChainLength => Response::ChainLength(7),
                _ => Response::Rejected("unsupported in test".into()),
            }
        }
    }

    #[test]
    fn loopback_dispatches_to_registered_handler() {
        let transport = LoopbackTransport::new();
        let addr: SocketAddr = "127.0.0.1:9500".parse().unwrap();
        transport.register(addr, Arc::new(EchoHandler));

        let peer = PeerInfo { address: addr, public_key: crate::wallet::PublicKey(vec![1, 2, 3]) };
        let response = transport.send(&peer, Request::ChainLength).unwrap();
        assert!(matches!(response, Response::ChainLength(7)));
    }

    #[test]
    fn loopback_errors_on_unregistered_peer() {
        let transport = LoopbackTransport::new();
        let addr: SocketAddr = "127.0.0.1:9501".parse().unwrap();
        let peer = PeerInfo { address: addr, public_key: crate::wallet::PublicKey(vec![1]) };
        assert!(transport.send(&peer, Request::ChainLength).is_err());
    }
}
