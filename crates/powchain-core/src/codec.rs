//! Canonical block encoding.
//!
//! A block encodes as compact JSON with every object's keys in sorted order:
//!
//! ```text
//! {"index":1,"previous_hash":"00..","proof":7,"timestamp":1600000000,"transactions":[...]}
//! ```
//!
//! Strings are written as raw UTF-8. Logically equal blocks always encode to
//! the same bytes, whatever order their records were built in.

use crate::error::Result;
use crate::{Block, Hash, Transaction};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// The encoding of a block with the decimal `proof` value cut out. The top
/// level keys sort as `index < previous_hash < proof < timestamp <
/// transactions`, so `proof` always sits between these two halves.
struct Parts {
    head: Vec<u8>,
    tail: Vec<u8>,
}

impl Parts {
    fn of(block: &Block) -> Self {
        split_encoding(block).expect("block fields always encode as JSON")
    }
}

fn split_encoding(block: &Block) -> serde_json::Result<Parts> {
    let mut head = Vec::with_capacity(128);
    head.extend_from_slice(b"{\"index\":");
    head.extend_from_slice(block.index.to_string().as_bytes());
    head.extend_from_slice(b",\"previous_hash\":");
    serde_json::to_writer(&mut head, &block.previous_hash)?;
    head.extend_from_slice(b",\"proof\":");

    let mut tail = Vec::with_capacity(64 + 64 * block.transactions.len());
    tail.extend_from_slice(b",\"timestamp\":");
    tail.extend_from_slice(block.timestamp.to_string().as_bytes());
    tail.extend_from_slice(b",\"transactions\":");
    let transactions = block.transactions.iter().map(Transaction::to_value).collect();
    write_value(&mut tail, &Value::Array(transactions))?;
    tail.push(b'}');

    Ok(Parts { head, tail })
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> serde_json::Result<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push(b'{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_value(out, val)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

/// Canonical bytes of an arbitrary JSON value: sorted keys at every depth, no
/// insignificant whitespace.
pub fn canonical_json(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value).expect("in-memory JSON values always encode");
    out
}

/// The bytes that get hashed for `block`.
pub fn canonical_bytes(block: &Block) -> Vec<u8> {
    let Parts { mut head, tail } = Parts::of(block);
    head.extend_from_slice(block.proof.to_string().as_bytes());
    head.extend_from_slice(&tail);
    head
}

pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Block> {
    Ok(serde_json::from_slice(bytes)?)
}

/// A block frozen for nonce search. The hasher has already absorbed
/// everything before the proof, so one attempt only hashes the proof digits
/// and the remainder of the encoding.
#[derive(Clone)]
pub struct MiningTemplate {
    head: Sha256,
    tail: Vec<u8>,
}

impl MiningTemplate {
    /// Captures every field of `block` except `proof`.
    pub fn new(block: &Block) -> Self {
        let Parts { head, tail } = Parts::of(block);
        let mut hasher = Sha256::new();
        hasher.update(&head);
        Self { head: hasher, tail }
    }

    /// Equal to `block.hash()` with `block.proof = proof`.
    pub fn hash_with_proof(&self, proof: u64) -> Hash {
        let mut hasher = self.head.clone();
        hasher.update(proof.to_string().as_bytes());
        hasher.update(&self.tail);
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GENESIS_PREVIOUS_HASH;
    use crate::{sha256, Transaction};
    use serde_json::json;

    fn scenario_block() -> Block {
        let mut block = Block::new(
            1,
            1_600_000_000,
            vec![Transaction::new("a", "b", 1)],
            GENESIS_PREVIOUS_HASH,
        );
        block.proof = 7;
        block
    }

    #[test]
    fn canonical_bytes_example() {
        let encoded = String::from_utf8(canonical_bytes(&scenario_block())).unwrap();
        let expected = format!(
            r#"{{"index":1,"previous_hash":"{GENESIS_PREVIOUS_HASH}","proof":7,"timestamp":1600000000,"transactions":[{{"amount":1,"recipient":"b","sender":"a"}}]}}"#
        );
        assert_eq!(encoded, expected);
    }

    #[test]
    fn canonical_bytes_match_generic_sorted_encoding() {
        let block = Block::new(
            3,
            1_700_000_000,
            vec![
                Transaction::new("alice", "bob", 5).with_field("memo", json!({"z": 1, "a": [2, {"y": null, "b": true}]})),
                Transaction::new("bob", "carol", 2).with_field("fee", 1),
            ],
            "ab".repeat(32),
        );
        let generic = canonical_json(&serde_json::to_value(&block).unwrap());
        assert_eq!(canonical_bytes(&block), generic);
    }

    #[test]
    fn no_insignificant_whitespace() {
        let encoded = canonical_bytes(&scenario_block());
        assert!(!encoded.iter().any(|b| b.is_ascii_whitespace()));
    }

    #[test]
    fn record_key_order_does_not_matter() {
        let mut first = serde_json::Map::new();
        first.insert("zeta".into(), json!(1));
        first.insert("alpha".into(), json!({"k2": 2, "k1": 1}));
        let mut second = serde_json::Map::new();
        second.insert("alpha".into(), json!({"k1": 1, "k2": 2}));
        second.insert("zeta".into(), json!(1));
        assert_eq!(
            canonical_json(&Value::Object(first)),
            canonical_json(&Value::Object(second))
        );

        let a = Transaction::new("a", "b", 1).with_field("y", 2).with_field("x", 1);
        let b = Transaction::new("a", "b", 1).with_field("x", 1).with_field("y", 2);
        let mut block_a = scenario_block();
        block_a.transactions = vec![a];
        let mut block_b = scenario_block();
        block_b.transactions = vec![b];
        assert_eq!(canonical_bytes(&block_a), canonical_bytes(&block_b));
    }

    #[test]
    fn different_values_encode_differently() {
        let mut changed = scenario_block();
        changed.transactions[0].amount = 2;
        assert_ne!(canonical_bytes(&scenario_block()), canonical_bytes(&changed));
    }

    #[test]
    fn transaction_order_matters() {
        let mut forward = scenario_block();
        forward.transactions = vec![Transaction::new("a", "b", 1), Transaction::new("c", "d", 2)];
        let mut reversed = forward.clone();
        reversed.transactions.reverse();
        assert_ne!(canonical_bytes(&forward), canonical_bytes(&reversed));
    }

    #[test]
    fn non_ascii_is_raw_utf8() {
        let mut block = scenario_block();
        block.transactions = vec![Transaction::new("zoë", "b", 1)];
        let encoded = String::from_utf8(canonical_bytes(&block)).unwrap();
        assert!(encoded.contains(r#""sender":"zoë""#));
    }

    #[test]
    fn quotes_in_previous_hash_are_escaped() {
        let mut block = scenario_block();
        block.previous_hash = r#"x","proof":0,"y"#.to_string();
        let template = MiningTemplate::new(&block);
        assert_eq!(template.hash_with_proof(block.proof), block.hash());
    }

    #[test]
    fn template_matches_full_hash() {
        let mut block = scenario_block();
        let template = MiningTemplate::new(&block);
        for proof in [0, 1, 9, 10, 255, 12_345, u64::MAX] {
            block.proof = proof;
            assert_eq!(template.hash_with_proof(proof), sha256(&canonical_bytes(&block)));
        }
    }

    #[test]
    fn template_ignores_current_proof() {
        let mut block = scenario_block();
        let before = MiningTemplate::new(&block);
        block.proof = 99;
        let after = MiningTemplate::new(&block);
        assert_eq!(before.hash_with_proof(3), after.hash_with_proof(3));
    }

    #[test]
    fn extension_field_cannot_shadow_amount() {
        let mut block = scenario_block();
        block.transactions[0]
            .extra
            .insert("amount".to_string(), json!(1));
        block.transactions[0].amount = 999;
        let encoded = String::from_utf8(canonical_bytes(&block)).unwrap();
        assert!(encoded.contains(r#"{"amount":999,"recipient":"b","sender":"a"}"#));
        assert!(!encoded.contains(r#""amount":1"#));
    }

    #[test]
    fn round_trip() {
        let block = Block {
            transactions: vec![
                Transaction::new("a", "b", 1).with_field("memo", "hi"),
                Transaction::new("b", "c", 2),
            ],
            ..scenario_block()
        };
        let decoded = from_canonical_bytes(&canonical_bytes(&block)).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.hash(), block.hash());
    }

    #[test]
    fn decoding_garbage_fails() {
        assert!(from_canonical_bytes(b"{\"index\":").is_err());
    }
}
