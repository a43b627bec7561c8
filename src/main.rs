//! NoobCash peer entry point.
//!
//! Wires configuration, a wallet, the in-process [`net::LoopbackTransport`],
//! and one [`state::PeerState`] per peer together, then drives the
//! bootstrap → mining → conflict-resolution lifecycle described in
//! SPEC_FULL.md end to end. The real HTTP binding and interactive CLI are
//! external collaborators (out of scope); this binary demonstrates the core
//! with every peer running in the same process, connected by the loopback
//! transport that a real binding would otherwise replace with sockets.

pub mod block;
pub mod bootstrap;
pub mod chain_sync;
pub mod config;
pub mod conflict;
pub mod crypto;
pub mod error;
pub mod gossip;
pub mod mempool;
pub mod miner;
pub mod net;
pub mod state;
pub mod transaction;
pub mod utxo;
pub mod wallet;

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::info;

use block::Chain;
use bootstrap::Bootstrap;
use config::Config;
use crypto::RsaSha256Provider;
use gossip::PeerHandler;
use net::{LoopbackTransport, Request, Response, Transport};
use state::{PeerInfo, PeerState};
use wallet::Wallet;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let node_count = 3;
    let config = Config::builder()
        .node_count(node_count)
        .capacity(2)
        .mining_difficulty(3)
        .total_supply(100 * node_count as u64)
        .finish();
    info!(?config, "starting NoobCash demo network");

    let loopback = Arc::new(LoopbackTransport::new());
    let transport: Arc<dyn Transport> = loopback.clone();

    let peers = spin_up_ring(&transport, &loopback, &config)?;
    wait_for_ring_completion(&peers);

    let peer1 = &peers[1];
    let peer2_key = peers[2].public_key();
    let sent = mempool::create_transaction(peer1, &transport, &peer2_key, 40);
    info!(sent, "peer 1 -> peer 2 transfer of 40 coins");

    thread::sleep(Duration::from_millis(200));

    for peer in &peers {
        info!(peer = peer.id, balance = peer.balance(), chain_len = peer.chain_len(), "final state");
    }

    Ok(())
}

/// Creates the bootstrap peer plus `config.node_count - 1` ordinary peers,
/// registering each against the bootstrap over the loopback transport
/// exactly as a real peer would register over HTTP.
fn spin_up_ring(
    transport: &Arc<dyn Transport>,
    loopback: &Arc<LoopbackTransport>,
    config: &Config,
) -> Result<Vec<Arc<PeerState>>, Box<dyn Error>> {
    let crypto = RsaSha256Provider;

    let bootstrap_addr: SocketAddr = config.bootstrap_addr;
    let bootstrap_wallet = Wallet::generate(&crypto)?;
    let genesis = Chain::genesis(&bootstrap_wallet.public_key, config.total_supply, now(), &crypto);
    let bootstrap_info = PeerInfo { address: bootstrap_addr, public_key: bootstrap_wallet.public_key.clone() };

    let bootstrap_state = Arc::new(PeerState::new(
        0,
        bootstrap_addr,
        config.clone(),
        Box::new(crypto),
        bootstrap_wallet,
        genesis,
        vec![bootstrap_info.clone()],
    ));
    bootstrap::seed_genesis_ledger(&bootstrap_state);

    let registrar = Arc::new(Bootstrap::new(config.node_count, bootstrap_info.clone()));
    let bootstrap_handler = Arc::new(PeerHandler {
        state: bootstrap_state.clone(),
        transport: transport.clone(),
        bootstrap: Some(registrar),
    });
    loopback.register(bootstrap_addr, bootstrap_handler);

    let mut peers = vec![bootstrap_state];

    for id in 1..config.node_count {
        let crypto = RsaSha256Provider;
        let wallet = Wallet::generate(&crypto)?;
        let address: SocketAddr = format!("127.0.0.1:{}", bootstrap_addr.port() + id as u16).parse()?;

        let response = transport.send(
            &bootstrap_info,
            Request::RegisterNode { public_key: wallet.public_key.clone(), address },
        )?;
        let Response::Registered { id: assigned_id, ring, chain } = response else {
            return Err("bootstrap refused registration".into());
        };

        let state = Arc::new(PeerState::new(
            assigned_id,
            address,
            config.clone(),
            Box::new(crypto),
            wallet,
            chain,
            ring,
        ));
        let handler = Arc::new(PeerHandler { state: state.clone(), transport: transport.clone(), bootstrap: None });
        loopback.register(address, handler);

        peers.push(state);
    }

    Ok(peers)
}

/// Spin-waits (bounded) for the bootstrap's asynchronous ring broadcast and
/// peer-seeding transactions to land, since both happen on background
/// threads spawned from `bootstrap::Bootstrap::register`.
fn wait_for_ring_completion(peers: &[Arc<PeerState>]) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let seeded = peers.iter().skip(1).all(|p| p.balance() == 100);
        let rings_filled = peers.iter().all(|p| p.ring_snapshot().0.len() == peers.len());
        if (seeded && rings_filled) || std::time::Instant::now() > deadline {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn now() -> f64 {
    miner::now_unix_secs()
}
