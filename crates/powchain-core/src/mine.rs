use crate::codec::MiningTemplate;
use crate::constants::MAX_DIFFICULTY;
use crate::error::{ChainError, Result};
use crate::pow::meets_difficulty;
use crate::{Block, Hash};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// A winning proof and the digest it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Solution {
    pub proof: u64,
    pub hash: Hash,
}

impl Solution {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Result of mining a bare payload: `payload` is the prefix followed by the
/// decimal nonce, and `hash` its hex digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadSolution {
    pub payload: String,
    pub nonce: u64,
    pub hash: String,
}

/// Brute-force nonce search against a hex-zero prefix target.
///
/// Every search starts at zero and steps by one, so the proof it reports is
/// the smallest one that satisfies the target. Without `max_attempts` the
/// search is unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Miner {
    difficulty: u32,
    max_attempts: Option<u64>,
    parallel: bool,
}

impl Miner {
    pub fn new(difficulty: u32) -> Result<Self> {
        if difficulty > MAX_DIFFICULTY {
            return Err(ChainError::InvalidDifficulty(difficulty));
        }
        Ok(Self {
            difficulty,
            max_attempts: None,
            parallel: false,
        })
    }

    /// Give up with [`ChainError::MiningTimeout`] after `max_attempts` hashes.
    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Have [`Miner::mine`] split the search across the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn max_attempts(&self) -> Option<u64> {
        self.max_attempts
    }

    /// Find the smallest proof for `candidate`. The candidate's current
    /// `proof` is ignored and the block itself is left untouched.
    pub fn solve(&self, candidate: &Block) -> Result<Solution> {
        let template = MiningTemplate::new(candidate);
        let (proof, hash) = self.search(|proof| template.hash_with_proof(proof))?;
        debug!(index = candidate.index, proof, "proof found");
        Ok(Solution { proof, hash })
    }

    /// Same result as [`Miner::solve`], with the nonce range split across the
    /// rayon pool. `find_first` keeps the answer minimal.
    pub fn solve_parallel(&self, candidate: &Block) -> Result<Solution> {
        let template = MiningTemplate::new(candidate);
        let limit = self.max_attempts.unwrap_or(u64::MAX);
        let difficulty = self.difficulty;

        let found = (0..limit)
            .into_par_iter()
            .find_first(|proof| meets_difficulty(&template.hash_with_proof(*proof), difficulty));

        match found {
            Some(proof) => {
                debug!(index = candidate.index, proof, "proof found (parallel)");
                Ok(Solution {
                    proof,
                    hash: template.hash_with_proof(proof),
                })
            }
            None => Err(ChainError::MiningTimeout { attempts: limit }),
        }
    }

    /// Solve `block` and write the winning proof into it.
    pub fn mine(&self, mut block: Block) -> Result<(Block, Solution)> {
        let solution = if self.parallel {
            self.solve_parallel(&block)?
        } else {
            self.solve(&block)?
        };
        block.proof = solution.proof;
        info!(
            "Mined block {} with proof {} and hash {}",
            block.index,
            solution.proof,
            solution.hash_hex()
        );
        Ok((block, solution))
    }

    /// Search for the smallest nonce such that `sha256(prefix + nonce)` meets
    /// the target, with the nonce written in decimal.
    pub fn solve_payload(&self, prefix: &str) -> Result<PayloadSolution> {
        let mut base = Sha256::new();
        base.update(prefix.as_bytes());
        let (nonce, hash) = self.search(|nonce| {
            let mut hasher = base.clone();
            hasher.update(nonce.to_string().as_bytes());
            hasher.finalize().into()
        })?;
        info!("payload \"{prefix}{nonce}\" found hash {}", hex::encode(hash));
        Ok(PayloadSolution {
            payload: format!("{prefix}{nonce}"),
            nonce,
            hash: hex::encode(hash),
        })
    }

    fn search(&self, hash_at: impl Fn(u64) -> Hash) -> Result<(u64, Hash)> {
        let mut nonce = 0u64;
        loop {
            if let Some(limit) = self.max_attempts {
                if nonce >= limit {
                    return Err(ChainError::MiningTimeout { attempts: limit });
                }
            }
            let hash = hash_at(nonce);
            if meets_difficulty(&hash, self.difficulty) {
                return Ok((nonce, hash));
            }
            nonce = nonce
                .checked_add(1)
                .ok_or(ChainError::MiningTimeout { attempts: u64::MAX })?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GENESIS_PREVIOUS_HASH;
    use crate::{digest_hex, pow, Transaction};

    fn candidate(index: u64) -> Block {
        Block::new(
            index,
            1_600_000_000 + index,
            vec![Transaction::new("a", "b", index)],
            GENESIS_PREVIOUS_HASH,
        )
    }

    #[test]
    fn difficulty_zero_returns_proof_zero() {
        let miner = Miner::new(0).unwrap();
        let solution = miner.solve(&candidate(1)).unwrap();
        assert_eq!(solution.proof, 0);
        assert_eq!(solution.hash, candidate(1).hash());
    }

    #[test]
    fn solved_hash_meets_difficulty() {
        let miner = Miner::new(2).unwrap();
        let solution = miner.solve(&candidate(1)).unwrap();
        assert!(solution.hash_hex().starts_with("00"));

        let mut solved = candidate(1);
        solved.proof = solution.proof;
        assert_eq!(solved.hash(), solution.hash);
    }

    #[test]
    fn solve_returns_minimal_proof() {
        let miner = Miner::new(2).unwrap();
        for index in 0..4 {
            let mut block = candidate(index);
            let solution = miner.solve(&block).unwrap();
            for smaller in 0..solution.proof {
                block.proof = smaller;
                assert!(
                    !pow::meets_difficulty(&block.hash(), 2),
                    "proof {smaller} also solves block {index}"
                );
            }
        }
    }

    #[test]
    fn solve_ignores_existing_proof() {
        let miner = Miner::new(1).unwrap();
        let fresh = candidate(2);
        let mut stale = fresh.clone();
        stale.proof = 1_000;
        assert_eq!(miner.solve(&fresh).unwrap(), miner.solve(&stale).unwrap());
    }

    #[test]
    fn mine_publishes_proof() {
        let miner = Miner::new(2).unwrap();
        let (block, solution) = miner.mine(candidate(1)).unwrap();
        assert_eq!(block.proof, solution.proof);
        assert_eq!(block.hash(), solution.hash);
        assert!(pow::meets_difficulty(&block.hash(), 2));
    }

    #[test]
    fn parallel_mine_matches_sequential() {
        let sequential = Miner::new(2).unwrap();
        let parallel = sequential.with_parallel(true);
        for index in 0..4 {
            assert_eq!(
                parallel.mine(candidate(index)).unwrap(),
                sequential.mine(candidate(index)).unwrap()
            );
        }
    }

    #[test]
    fn parallel_mine_honors_max_attempts() {
        let miner = Miner::new(64).unwrap().with_max_attempts(10).with_parallel(true);
        assert!(matches!(
            miner.mine(candidate(1)),
            Err(ChainError::MiningTimeout { attempts: 10 })
        ));
    }

    #[test]
    fn parallel_matches_sequential() {
        let miner = Miner::new(2).unwrap();
        for index in 0..4 {
            let block = candidate(index);
            assert_eq!(
                miner.solve_parallel(&block).unwrap(),
                miner.solve(&block).unwrap()
            );
        }
    }

    #[test]
    fn max_attempts_exhausted() {
        let miner = Miner::new(64).unwrap().with_max_attempts(100);
        match miner.solve(&candidate(1)) {
            Err(ChainError::MiningTimeout { attempts }) => assert_eq!(attempts, 100),
            other => panic!("expected timeout, got {other:?}"),
        }
        match miner.solve_parallel(&candidate(1)) {
            Err(ChainError::MiningTimeout { attempts }) => assert_eq!(attempts, 100),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn zero_attempts_always_times_out() {
        let miner = Miner::new(0).unwrap().with_max_attempts(0);
        assert!(matches!(
            miner.solve(&candidate(1)),
            Err(ChainError::MiningTimeout { attempts: 0 })
        ));
    }

    #[test]
    fn single_attempt_enough_at_difficulty_zero() {
        let miner = Miner::new(0).unwrap().with_max_attempts(1);
        assert_eq!(miner.solve(&candidate(1)).unwrap().proof, 0);
    }

    #[test]
    fn invalid_difficulty_rejected() {
        assert!(matches!(
            Miner::new(65),
            Err(ChainError::InvalidDifficulty(65))
        ));
        assert!(Miner::new(64).is_ok());
    }

    #[test]
    fn payload_mining_example() {
        let miner = Miner::new(2).unwrap();
        let solution = miner.solve_payload("shaoguoji").unwrap();
        assert_eq!(solution.payload, format!("shaoguoji{}", solution.nonce));
        assert_eq!(digest_hex(solution.payload.as_bytes()), solution.hash);
        assert!(solution.hash.starts_with("00"));
        for smaller in 0..solution.nonce {
            let digest = digest_hex(format!("shaoguoji{smaller}").as_bytes());
            assert!(!pow::hex_meets_difficulty(&digest, 2));
        }
    }
}
