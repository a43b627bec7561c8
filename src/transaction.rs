//! Transactions: creation, canonical hashing, and verification.
//!
//! Field layout and the canonical "hash the unsigned fields, sign the hash"
//! shape follow the teacher's `UnhashedTransaction` pattern
//! (`src/v1/transaction.rs`); the change-output-first/payment-output-last
//! field ordering and the genesis coinbase shape follow
//! `original_source/Transaction.py`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::crypto::CryptoProvider;
use crate::error::TxnError;
use crate::utxo::UtxoLedger;
use crate::wallet::{Hash256, PrivateKey, PublicKey};

/// The party that created a transaction. Every transaction but the genesis
/// mint is signed by a peer; `Coinbase` is the distinguished non-key sender
/// used only for the genesis block (`sender = 0` in the original).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    Coinbase,
    Peer(PublicKey),
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::Coinbase => write!(f, "Coinbase"),
            Sender::Peer(pk) => write!(f, "Peer({pk:?})"),
        }
    }
}

/// A single spendable output, identified by a UUID rather than a
/// `(transaction_id, index)` pair — the original assigns each output its own
/// id so it can be referenced directly as a UTXO.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub id: Uuid,
    pub transaction_id: Hash256,
    pub receiver: PublicKey,
    pub amount: u64,
}

impl fmt::Debug for TransactionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionOutput")
            .field("id", &self.id)
            .field("receiver", &self.receiver)
            .field("amount", &self.amount)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Hash256,
    pub sender: Sender,
    pub receiver: PublicKey,
    pub amount: u64,
    pub timestamp: f64,
    pub inputs: Vec<TransactionOutput>,
    /// Change output (if any) comes first, payment output is always last.
    pub outputs: Vec<TransactionOutput>,
    pub signature: Vec<u8>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.transaction_id == other.transaction_id
    }
}
impl Eq for Transaction {}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("transaction_id", &hex::encode(self.transaction_id))
            .field("sender", &self.sender)
            .field("receiver", &self.receiver)
            .field("amount", &self.amount)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

/// Exactly the fields that determine a transaction's identity. Serialized
/// with `bincode` and hashed; signing then covers this same digest. Using an
/// `f64`'s bit pattern (rather than the float itself) keeps the encoding
/// byte-stable across producer and every verifier.
#[derive(Serialize)]
struct UnsignedTransactionId<'a> {
    sender: &'a Sender,
    receiver: &'a PublicKey,
    amount: u64,
    timestamp_bits: u64,
}

fn transaction_id(
    sender: &Sender,
    receiver: &PublicKey,
    amount: u64,
    timestamp: f64,
    crypto: &dyn CryptoProvider,
) -> Hash256 {
    let unsigned = UnsignedTransactionId { sender, receiver, amount, timestamp_bits: timestamp.to_bits() };
    let bytes = bincode::serialize(&unsigned).expect("transaction id fields always serialize");
    crypto.sha256(&bytes)
}

/// Builds and signs a new transaction spending `inputs` to pay `amount` to
/// `receiver`. Any surplus beyond `amount` returns to the sender as a change
/// output, placed before the payment output.
pub fn create(
    sender_public: &PublicKey,
    sender_private: &PrivateKey,
    receiver: &PublicKey,
    amount: u64,
    inputs: Vec<TransactionOutput>,
    now: f64,
    crypto: &dyn CryptoProvider,
) -> Result<Transaction, TxnError> {
    let input_sum: u64 = inputs.iter().map(|o| o.amount).sum();
    if input_sum < amount {
        return Err(TxnError::InsufficientInputs { have: input_sum, need: amount });
    }

    let sender = Sender::Peer(sender_public.clone());
    let txn_id = transaction_id(&sender, receiver, amount, now, crypto);

    let mut outputs = Vec::with_capacity(2);
    let change = input_sum - amount;
    if change > 0 {
        outputs.push(TransactionOutput {
            id: Uuid::new_v4(),
            transaction_id: txn_id,
            receiver: sender_public.clone(),
            amount: change,
        });
    }
    outputs.push(TransactionOutput {
        id: Uuid::new_v4(),
        transaction_id: txn_id,
        receiver: receiver.clone(),
        amount,
    });

    let signature = crypto.sign(sender_private, &txn_id)?;

    Ok(Transaction {
        transaction_id: txn_id,
        sender,
        receiver: receiver.clone(),
        amount,
        timestamp: now,
        inputs,
        outputs,
        signature,
    })
}

/// Builds the single genesis coinbase transaction minting `total_supply` to
/// `bootstrap`. Unsigned: `Sender::Coinbase` has no key to sign with, and
/// every peer derives the same `transaction_id` independently, so there is
/// nothing to verify against.
pub fn genesis_coinbase(bootstrap: &PublicKey, total_supply: u64, now: f64, crypto: &dyn CryptoProvider) -> Transaction {
    let sender = Sender::Coinbase;
    let txn_id = transaction_id(&sender, bootstrap, total_supply, now, crypto);
    let output = TransactionOutput {
        id: Uuid::new_v4(),
        transaction_id: txn_id,
        receiver: bootstrap.clone(),
        amount: total_supply,
    };
    Transaction {
        transaction_id: txn_id,
        sender,
        receiver: bootstrap.clone(),
        amount: total_supply,
        timestamp: now,
        inputs: vec![],
        outputs: vec![output],
        signature: vec![],
    }
}

/// Verifies a peer-submitted transaction against the sender's current
/// unspent outputs. Does not check chain duplication — callers that have a
/// full chain to hand (see `crate::block_validate`) check that separately,
/// since verification alone has no chain reference here.
pub fn verify(tx: &Transaction, ledger: &UtxoLedger, crypto: &dyn CryptoProvider) -> Result<(), TxnError> {
    if tx.inputs.is_empty() {
        return Err(TxnError::EmptyInputs);
    }
    if tx.outputs.is_empty() || tx.outputs.len() > 2 {
        return Err(TxnError::BadOutputCount);
    }

    let sender_public = match &tx.sender {
        Sender::Coinbase => return Err(TxnError::InvalidSignature),
        Sender::Peer(pk) => pk,
    };

    let expected_id = transaction_id(&tx.sender, &tx.receiver, tx.amount, tx.timestamp, crypto);
    if expected_id != tx.transaction_id {
        return Err(TxnError::HashMismatch);
    }

    if !crypto.verify(sender_public, &expected_id, &tx.signature) {
        return Err(TxnError::InvalidSignature);
    }

    let owned = ledger.outputs_of(sender_public);
    for input in &tx.inputs {
        if !owned.iter().any(|o| o.id == input.id) {
            return Err(TxnError::UnknownInput(input.id));
        }
    }

    let input_sum: u64 = tx.inputs.iter().map(|o| o.amount).sum();
    let payment = tx.outputs.last().expect("checked nonempty above");
    if payment.receiver != tx.receiver || payment.amount != tx.amount {
        return Err(TxnError::BadReceiverOutput);
    }

    if tx.outputs.len() == 2 {
        let change = &tx.outputs[0];
        if change.receiver != *sender_public || change.amount != input_sum - tx.amount {
            return Err(TxnError::BadChangeOutput);
        }
    } else if input_sum != tx.amount {
        return Err(TxnError::BadChangeOutput);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_support::SmallRsaProvider;

    fn fund(ledger: &mut UtxoLedger, owner: &PublicKey, amount: u64) -> TransactionOutput {
        let output = TransactionOutput { id: Uuid::new_v4(), transaction_id: [0u8; 32], receiver: owner.clone(), amount };
        ledger.credit(output.clone());
        output
    }

    #[test]
    fn create_then_verify_succeeds_with_change() {
        let crypto = SmallRsaProvider::default();
        let (alice_pub, alice_priv) = crypto.keygen().unwrap();
        let (bob_pub, _) = crypto.keygen().unwrap();

        let mut ledger = UtxoLedger::new();
        let input = fund(&mut ledger, &alice_pub, 100);

        let tx = create(&alice_pub, &alice_priv, &bob_pub, 30, vec![input], 1.0, &crypto).unwrap();
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].amount, 70);
        assert_eq!(tx.outputs[1].amount, 30);

        verify(&tx, &ledger, &crypto).unwrap();
    }

    #[test]
    fn create_without_change_has_single_output() {
        let crypto = SmallRsaProvider::default();
        let (alice_pub, alice_priv) = crypto.keygen().unwrap();
        let (bob_pub, _) = crypto.keygen().unwrap();

        let mut ledger = UtxoLedger::new();
        let input = fund(&mut ledger, &alice_pub, 50);

        let tx = create(&alice_pub, &alice_priv, &bob_pub, 50, vec![input], 1.0, &crypto).unwrap();
        assert_eq!(tx.outputs.len(), 1);
        verify(&tx, &ledger, &crypto).unwrap();
    }

    #[test]
    fn create_rejects_insufficient_inputs() {
        let crypto = SmallRsaProvider::default();
        let (alice_pub, alice_priv) = crypto.keygen().unwrap();
        let (bob_pub, _) = crypto.keygen().unwrap();
        let input = TransactionOutput { id: Uuid::new_v4(), transaction_id: [0u8; 32], receiver: alice_pub.clone(), amount: 10 };

        let err = create(&alice_pub, &alice_priv, &bob_pub, 50, vec![input], 1.0, &crypto).unwrap_err();
        assert!(matches!(err, TxnError::InsufficientInputs { have: 10, need: 50 }));
    }

    #[test]
    fn verify_rejects_unowned_input() {
        let crypto = SmallRsaProvider::default();
        let (alice_pub, alice_priv) = crypto.keygen().unwrap();
        let (bob_pub, _) = crypto.keygen().unwrap();

        let mut ledger = UtxoLedger::new();
        let input = fund(&mut ledger, &alice_pub, 100);
        let tx = create(&alice_pub, &alice_priv, &bob_pub, 30, vec![input], 1.0, &crypto).unwrap();

        let empty_ledger = UtxoLedger::new();
        let err = verify(&tx, &empty_ledger, &crypto).unwrap_err();
        assert!(matches!(err, TxnError::UnknownInput(_)));
    }

    #[test]
    fn verify_rejects_tampered_amount() {
        let crypto = SmallRsaProvider::default();
        let (alice_pub, alice_priv) = crypto.keygen().unwrap();
        let (bob_pub, _) = crypto.keygen().unwrap();

        let mut ledger = UtxoLedger::new();
        let input = fund(&mut ledger, &alice_pub, 100);
        let mut tx = create(&alice_pub, &alice_priv, &bob_pub, 30, vec![input], 1.0, &crypto).unwrap();
        tx.amount = 31;

        let err = verify(&tx, &ledger, &crypto).unwrap_err();
        assert!(matches!(err, TxnError::HashMismatch));
    }
}
