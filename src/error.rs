use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the [`crate::crypto`] provider.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to generate RSA keypair: {0}")]
    KeyGen(String),
    #[error("failed to encode key material: {0}")]
    Encoding(String),
    #[error("failed to sign digest: {0}")]
    Signing(String),
}

/// Why a transaction was rejected.
#[derive(Debug, Error)]
pub enum TxnError {
    #[error("transaction has no inputs")]
    EmptyInputs,
    #[error("transaction has no outputs, or more than two")]
    BadOutputCount,
    #[error("transaction_id does not match its sender, receiver, amount, and timestamp")]
    HashMismatch,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("failed to sign transaction: {0}")]
    Signing(#[from] CryptoError),
    #[error("duplicate transaction id, already present on chain")]
    DuplicateTransaction,
    #[error("sender does not currently own input {0}")]
    UnknownInput(Uuid),
    #[error("insufficient input amount: have {have}, need {need}")]
    InsufficientInputs { have: u64, need: u64 },
    #[error("output to receiver does not equal the transferred amount")]
    BadReceiverOutput,
    #[error("change output does not equal the input surplus")]
    BadChangeOutput,
}

/// Why a block was rejected.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("block has no transactions")]
    EmptyBlock,
    #[error("block holds {actual} transactions, over capacity {max}")]
    OverCapacity { max: usize, actual: usize },
    #[error("recomputed hash does not match the block's declared hash")]
    HashMismatch,
    #[error("block hash does not satisfy the configured difficulty")]
    DifficultyNotMet,
    #[error("block's previous_hash does not match the chain tip")]
    PreviousHashMismatch,
    #[error("invalid transaction {1} in block: {0}")]
    InvalidTransaction(TxnError, Uuid),
}

/// Errors surfaced at the RPC transport boundary. The transport binding
/// itself is external; the core only needs to recognise these outcomes.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer at {0} is unreachable: {1}")]
    PeerUnreachable(std::net::SocketAddr, String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

/// Errors raised while loading [`crate::config::Config`] from the process
/// environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
