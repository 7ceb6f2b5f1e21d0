use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub mod chain;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod mine;
pub mod signing;

pub use chain::{Chain, Clock, FixedClock, SharedChain, SystemClock};
pub use config::ChainConfig;
pub use error::{ChainError, Result, SignatureError, VerifyError};
pub use mine::{Miner, PayloadSolution, Solution};

pub type Hash = [u8; 32];

const RESERVED_TX_KEYS: [&str; 3] = ["sender", "recipient", "amount"];

/// A transfer record carried by a block. The chain never interprets it; the
/// record only contributes to the block digest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    /// Free-form extension fields, encoded next to the required ones. Only
    /// reachable through [`Transaction::with_field`], so a key naming a
    /// required field can never shadow it.
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: u64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            extra: BTreeMap::new(),
        }
    }

    /// Attach an extension field. Keys naming a required field are ignored so
    /// the encoded record never carries a key twice.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let key = key.into();
        if !RESERVED_TX_KEYS.contains(&key.as_str()) {
            self.extra.insert(key, value.into());
        }
        self
    }

    pub fn extra(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.extra
    }

    /// The record as a JSON object. The required fields are written after
    /// the extension fields and take precedence over them.
    pub fn to_value(&self) -> serde_json::Value {
        let mut map: serde_json::Map<String, serde_json::Value> = self
            .extra
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        map.insert("sender".to_string(), self.sender.clone().into());
        map.insert("recipient".to_string(), self.recipient.clone().into());
        map.insert("amount".to_string(), self.amount.into());
        serde_json::Value::Object(map)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl Block {
    /// An unsolved block: `proof` starts at zero.
    pub fn new(
        index: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<String>,
    ) -> Self {
        Self {
            index,
            timestamp,
            transactions,
            proof: 0,
            previous_hash: previous_hash.into(),
        }
    }

    /// Digest of the canonical encoding of the block as it currently stands.
    pub fn hash(&self) -> Hash {
        sha256(&codec::canonical_bytes(self))
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }
}

pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Lowercase, 64-character hex rendering of `sha256(data)`.
pub fn digest_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

pub mod pow {
    use super::Hash;

    /// Number of leading `'0'` characters in the hex rendering of `hash`.
    pub fn count_leading_zero_nibbles(hash: &Hash) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += 2;
            } else {
                if *b >> 4 == 0 {
                    total += 1;
                }
                break;
            }
        }
        total
    }

    pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
        count_leading_zero_nibbles(hash) >= difficulty
    }

    /// Same predicate on an already rendered digest.
    pub fn hex_meets_difficulty(digest: &str, difficulty: u32) -> bool {
        let wanted = difficulty as usize;
        digest.len() >= wanted && digest.bytes().take(wanted).all(|c| c == b'0')
    }
}
