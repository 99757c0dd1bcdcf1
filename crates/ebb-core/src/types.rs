//! Core chain types: transactions, blocks, unspent-output records.
//!
//! All monetary values are in drops (1 EBB = 10^8 drops).
//! Script and signature semantics live outside this crate; inputs carry an
//! opaque witness blob that an external validator has already checked.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::TransactionError;

/// A 32-byte hash value.
///
/// Used for transaction IDs (BLAKE3), block header hashes (double SHA-256),
/// and transaction-set commitments (BLAKE3).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Used for coinbase previous outpoints.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a Hash256 from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TransactionError> {
        let bytes = hex::decode(s).map_err(|e| TransactionError::BadHash(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TransactionError::BadHash(format!("expected 32 bytes, got {}", s.len() / 2)))?;
        Ok(Self(arr))
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference to a specific output of a previous transaction.
///
/// This is the key of the UTXO set: globally unique once the creating
/// transaction is included in any block.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Transaction ID containing the referenced output.
    pub txid: Hash256,
    /// Index of the output within the transaction.
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint, used for coinbase transaction inputs.
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            index: u32::MAX,
        }
    }

    /// Check if this is the null outpoint (coinbase marker).
    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A transaction input, spending a previous output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    /// The outpoint being spent. Null outpoint for coinbase.
    pub previous_output: OutPoint,
    /// Opaque unlocking data checked by the external transaction validator.
    /// Coinbase inputs use it as free-form tag bytes.
    pub witness: Vec<u8>,
}

/// A transaction output, creating a new unspent record.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in drops (1 EBB = 10^8 drops).
    pub value: u64,
    /// BLAKE3 commitment to the owning script or key.
    pub commitment: Hash256,
}

/// A transaction transferring value between commitments.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Protocol version.
    pub version: u32,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
    /// Block height or timestamp before which this tx is invalid.
    pub lock_time: u64,
}

impl Transaction {
    /// Compute the transaction ID (BLAKE3 hash of the canonical encoding).
    ///
    /// Uses bincode with standard config for deterministic serialization.
    pub fn txid(&self) -> Result<Hash256, TransactionError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TransactionError::Serialization(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }

    /// Check if this is a coinbase transaction (single input with null outpoint).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Sum of all output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// The outpoints this transaction would create once included in a block.
    pub fn created_outpoints(&self) -> Result<Vec<OutPoint>, TransactionError> {
        let txid = self.txid()?;
        Ok((0..self.outputs.len() as u32)
            .map(|index| OutPoint { txid, index })
            .collect())
    }
}

/// Commitment over an ordered list of transaction IDs.
///
/// A flat BLAKE3 hash over the concatenated IDs. Inclusion proofs are not
/// needed inside the chain-state core, so no tree is built; the block source
/// is responsible for checking the commitment before a block gets here.
pub fn tx_commitment(txids: &[Hash256]) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    for txid in txids {
        hasher.update(txid.as_bytes());
    }
    Hash256(hasher.finalize().into())
}

/// Block header.
///
/// Hash is computed as double SHA-256 over a fixed byte layout so that the
/// identity of a block never depends on the encoding library.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u32,
    /// Hash of the previous block header.
    pub prev_hash: Hash256,
    /// BLAKE3 commitment over the block's transaction IDs.
    pub tx_commitment: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Free nonce. The weight function and any proof scheme live outside
    /// this crate; the nonce only feeds the identity hash.
    pub nonce: u64,
}

impl BlockHeader {
    /// Header size in bytes when serialized for hashing.
    const HASH_SIZE: usize = 4 + 2 * 32 + 2 * 8;

    /// Compute the block header hash (double SHA-256).
    ///
    /// Uses an explicit fixed byte layout: version || prev_hash ||
    /// tx_commitment || timestamp || nonce, all little-endian.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(self.tx_commitment.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        let first = Sha256::digest(&data);
        Hash256(Sha256::digest(first).into())
    }
}

/// A complete block: header plus transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Ordered list of transactions. First transaction must be coinbase.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Get the coinbase transaction, if the block is non-empty.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}

/// An entry in the unspent transaction output set.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct UtxoEntry {
    /// The unspent output.
    pub output: TxOutput,
    /// Hash of the block that created this output.
    pub created_in: Hash256,
    /// Height of the block that created this output.
    pub height: u64,
    /// Whether this output is from a coinbase transaction.
    pub is_coinbase: bool,
}

impl UtxoEntry {
    /// Check if this output has matured and can be spent at `current_height`.
    ///
    /// Coinbase outputs require `maturity` confirmations; non-coinbase
    /// outputs are always mature. A `maturity` of zero disables the rule.
    pub fn is_mature(&self, current_height: u64, maturity: u64) -> bool {
        if !self.is_coinbase || maturity == 0 {
            return true;
        }
        current_height.saturating_sub(self.height) >= maturity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;

    fn sample_commitment() -> Hash256 {
        Hash256([0xAA; 32])
    }

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint {
                    txid: Hash256([0x11; 32]),
                    index: 0,
                },
                witness: vec![0u8; 64],
            }],
            outputs: vec![TxOutput {
                value: 50 * COIN,
                commitment: sample_commitment(),
            }],
            lock_time: 0,
        }
    }

    fn sample_coinbase() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                witness: vec![],
            }],
            outputs: vec![TxOutput {
                value: 50 * COIN,
                commitment: sample_commitment(),
            }],
            lock_time: 0,
        }
    }

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            tx_commitment: Hash256::ZERO,
            timestamp: 1_700_000_000,
            nonce: 0,
        }
    }

    // --- Hash256 ---

    #[test]
    fn hash256_zero_is_zero() {
        let h = Hash256::ZERO;
        assert!(h.is_zero());
        assert_eq!(h, Hash256::default());
    }

    #[test]
    fn hash256_nonzero_is_not_zero() {
        assert!(!Hash256([1; 32]).is_zero());
    }

    #[test]
    fn hash256_display_hex() {
        let h = Hash256([0xAB; 32]);
        let s = format!("{h}");
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(&s[0..2], "ab");
    }

    #[test]
    fn hash256_hex_round_trip() {
        let h = Hash256([0x5E; 32]);
        let parsed = Hash256::from_hex(&format!("{h}")).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn hash256_from_hex_rejects_short_input() {
        assert!(Hash256::from_hex("abcd").is_err());
    }

    #[test]
    fn hash256_from_bytes() {
        let bytes = [42u8; 32];
        let h = Hash256::from_bytes(bytes);
        assert_eq!(h.as_bytes(), &bytes);
        assert_eq!(Hash256::from(bytes), h);
    }

    // --- OutPoint ---

    #[test]
    fn outpoint_null_detection() {
        assert!(OutPoint::null().is_null());
    }

    #[test]
    fn outpoint_non_null() {
        let op = OutPoint { txid: Hash256([1; 32]), index: 0 };
        assert!(!op.is_null());
    }

    #[test]
    fn outpoint_display() {
        let op = OutPoint { txid: Hash256([0xFF; 32]), index: 3 };
        let s = format!("{op}");
        assert!(s.ends_with(":3"));
    }

    // --- Transaction ---

    #[test]
    fn coinbase_detection() {
        assert!(sample_coinbase().is_coinbase());
        assert!(!sample_tx().is_coinbase());
    }

    #[test]
    fn multi_input_not_coinbase() {
        let tx = Transaction {
            version: 1,
            inputs: vec![
                TxInput {
                    previous_output: OutPoint::null(),
                    witness: vec![],
                },
                TxInput {
                    previous_output: OutPoint::null(),
                    witness: vec![],
                },
            ],
            outputs: vec![],
            lock_time: 0,
        };
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn total_output_value_sums_correctly() {
        let tx = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![
                TxOutput { value: 100, commitment: Hash256::ZERO },
                TxOutput { value: 200, commitment: Hash256::ZERO },
                TxOutput { value: 300, commitment: Hash256::ZERO },
            ],
            lock_time: 0,
        };
        assert_eq!(tx.total_output_value(), Some(600));
    }

    #[test]
    fn total_output_value_overflow_returns_none() {
        let tx = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![
                TxOutput { value: u64::MAX, commitment: Hash256::ZERO },
                TxOutput { value: 1, commitment: Hash256::ZERO },
            ],
            lock_time: 0,
        };
        assert_eq!(tx.total_output_value(), None);
    }

    #[test]
    fn txid_deterministic() {
        let tx = sample_tx();
        assert_eq!(tx.txid().unwrap(), tx.txid().unwrap());
    }

    #[test]
    fn txid_changes_with_data() {
        let tx1 = sample_tx();
        let mut tx2 = sample_tx();
        tx2.lock_time = 1;
        assert_ne!(tx1.txid().unwrap(), tx2.txid().unwrap());
    }

    #[test]
    fn created_outpoints_enumerate_outputs() {
        let mut tx = sample_tx();
        tx.outputs.push(TxOutput { value: 7, commitment: Hash256::ZERO });
        let txid = tx.txid().unwrap();
        let ops = tx.created_outpoints().unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0], OutPoint { txid, index: 0 });
        assert_eq!(ops[1], OutPoint { txid, index: 1 });
    }

    // --- tx_commitment ---

    #[test]
    fn tx_commitment_deterministic() {
        let ids = [Hash256([1; 32]), Hash256([2; 32])];
        assert_eq!(tx_commitment(&ids), tx_commitment(&ids));
    }

    #[test]
    fn tx_commitment_order_sensitive() {
        let a = [Hash256([1; 32]), Hash256([2; 32])];
        let b = [Hash256([2; 32]), Hash256([1; 32])];
        assert_ne!(tx_commitment(&a), tx_commitment(&b));
    }

    #[test]
    fn tx_commitment_empty_differs_from_single() {
        assert_ne!(tx_commitment(&[]), tx_commitment(&[Hash256::ZERO]));
    }

    // --- BlockHeader ---

    #[test]
    fn block_header_hash_deterministic() {
        let h = sample_header();
        assert_eq!(h.hash(), h.hash());
    }

    #[test]
    fn block_header_hash_changes_with_nonce() {
        let h1 = sample_header();
        let mut h2 = h1.clone();
        h2.nonce = 1;
        assert_ne!(h1.hash(), h2.hash());
    }

    #[test]
    fn block_header_hash_changes_with_parent() {
        let h1 = sample_header();
        let mut h2 = h1.clone();
        h2.prev_hash = Hash256([9; 32]);
        assert_ne!(h1.hash(), h2.hash());
    }

    #[test]
    fn block_header_hash_fixed_size_input() {
        // The hash input must always be exactly HASH_SIZE bytes.
        let h = sample_header();
        let mut data = Vec::new();
        data.extend_from_slice(&h.version.to_le_bytes());
        data.extend_from_slice(h.prev_hash.as_bytes());
        data.extend_from_slice(h.tx_commitment.as_bytes());
        data.extend_from_slice(&h.timestamp.to_le_bytes());
        data.extend_from_slice(&h.nonce.to_le_bytes());
        assert_eq!(data.len(), BlockHeader::HASH_SIZE);
    }

    // --- Block ---

    #[test]
    fn block_coinbase_accessor() {
        let block = Block {
            header: sample_header(),
            transactions: vec![sample_coinbase()],
        };
        assert!(block.coinbase().unwrap().is_coinbase());
    }

    #[test]
    fn block_empty_has_no_coinbase() {
        let block = Block {
            header: sample_header(),
            transactions: vec![],
        };
        assert!(block.coinbase().is_none());
    }

    // --- UtxoEntry ---

    #[test]
    fn utxo_coinbase_not_mature_early() {
        let entry = UtxoEntry {
            output: TxOutput { value: 50 * COIN, commitment: Hash256::ZERO },
            created_in: Hash256([7; 32]),
            height: 100,
            is_coinbase: true,
        };
        assert!(!entry.is_mature(150, 100));
    }

    #[test]
    fn utxo_coinbase_mature_at_threshold() {
        let entry = UtxoEntry {
            output: TxOutput { value: 50 * COIN, commitment: Hash256::ZERO },
            created_in: Hash256([7; 32]),
            height: 100,
            is_coinbase: true,
        };
        assert!(entry.is_mature(200, 100));
        assert!(entry.is_mature(300, 100));
    }

    #[test]
    fn utxo_non_coinbase_always_mature() {
        let entry = UtxoEntry {
            output: TxOutput { value: 100, commitment: Hash256::ZERO },
            created_in: Hash256([7; 32]),
            height: 100,
            is_coinbase: false,
        };
        assert!(entry.is_mature(100, 100));
        assert!(entry.is_mature(0, 100));
    }

    #[test]
    fn utxo_zero_maturity_disables_rule() {
        let entry = UtxoEntry {
            output: TxOutput { value: 100, commitment: Hash256::ZERO },
            created_in: Hash256([7; 32]),
            height: 100,
            is_coinbase: true,
        };
        assert!(entry.is_mature(100, 0));
    }

    // --- Bincode round-trips ---

    #[test]
    fn bincode_round_trip_transaction() {
        let tx = sample_tx();
        let encoded = bincode::encode_to_vec(&tx, bincode::config::standard()).unwrap();
        let (decoded, _): (Transaction, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(tx, decoded);
    }

    #[test]
    fn bincode_round_trip_block() {
        let block = Block {
            header: sample_header(),
            transactions: vec![sample_coinbase(), sample_tx()],
        };
        let encoded = bincode::encode_to_vec(&block, bincode::config::standard()).unwrap();
        let (decoded, _): (Block, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn bincode_round_trip_utxo_entry() {
        let entry = UtxoEntry {
            output: TxOutput { value: 50 * COIN, commitment: Hash256([0xCC; 32]) },
            created_in: Hash256([0xDD; 32]),
            height: 12345,
            is_coinbase: true,
        };
        let encoded = bincode::encode_to_vec(&entry, bincode::config::standard()).unwrap();
        let (decoded, _): (UtxoEntry, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(entry, decoded);
    }
}
