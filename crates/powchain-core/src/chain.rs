use crate::config::ChainConfig;
use crate::constants::GENESIS_PREVIOUS_HASH;
use crate::error::{Result, VerifyError};
use crate::mine::Miner;
use crate::pow::meets_difficulty;
use crate::{Block, Transaction};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Source of block timestamps, in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Always reports the same instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

/// Append-only sequence of mined blocks, starting at a genesis block.
///
/// The chain only ever appends through [`Chain::append_block`], but stored
/// blocks stay reachable through [`Chain::blocks_mut`]; [`Chain::verify`] is
/// what catches edits made that way.
#[derive(Clone, Debug)]
pub struct Chain<C: Clock = SystemClock> {
    blocks: Vec<Block>,
    miner: Miner,
    clock: C,
}

impl Chain<SystemClock> {
    pub fn new(config: ChainConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Chain<C> {
    /// Build a chain whose genesis block is already mined.
    pub fn with_clock(config: ChainConfig, clock: C) -> Result<Self> {
        config.validate()?;
        let mut miner = Miner::new(config.difficulty)?.with_parallel(config.parallel);
        if let Some(limit) = config.max_attempts {
            miner = miner.with_max_attempts(limit);
        }
        let mut chain = Self {
            blocks: Vec::new(),
            miner,
            clock,
        };
        chain.create_genesis()?;
        Ok(chain)
    }

    fn create_genesis(&mut self) -> Result<()> {
        let candidate = Block::new(0, self.clock.now(), Vec::new(), GENESIS_PREVIOUS_HASH);
        let (genesis, _) = self.miner.mine(candidate)?;
        debug!(proof = genesis.proof, "genesis block created");
        self.blocks.push(genesis);
        Ok(())
    }

    /// Mine a block holding `transactions` on top of the current tip and
    /// append it.
    pub fn append_block(&mut self, transactions: Vec<Transaction>) -> Result<&Block> {
        let candidate = Block::new(
            self.blocks.len() as u64,
            self.clock.now(),
            transactions,
            self.tip().hash_hex(),
        );
        let (block, _) = self.miner.mine(candidate)?;
        self.blocks.push(block);
        Ok(self.tip())
    }

    /// Walk the chain from genesis and stop at the first block that fails.
    ///
    /// Per block, in order: its index matches its position, its
    /// `previous_hash` equals the recomputed digest of its predecessor (not
    /// checked for genesis), and its own digest meets the difficulty.
    pub fn verify(&self) -> std::result::Result<(), VerifyError> {
        debug!(len = self.blocks.len(), "verifying chain");
        let result = self.walk();
        if let Err(err) = &result {
            warn!(index = err.index(), "chain verification failed: {err}");
        }
        result
    }

    fn walk(&self) -> std::result::Result<(), VerifyError> {
        let difficulty = self.difficulty();
        let mut previous_hash: Option<String> = None;

        for (position, block) in self.blocks.iter().enumerate() {
            let index = position as u64;
            if block.index != index {
                return Err(VerifyError::IndexMismatch {
                    index,
                    found: block.index,
                });
            }
            if let Some(expected) = &previous_hash {
                if *expected != block.previous_hash {
                    return Err(VerifyError::Linkage { index });
                }
            }
            let hash = block.hash();
            if !meets_difficulty(&hash, difficulty) {
                return Err(VerifyError::ProofOfWork { index });
            }
            previous_hash = Some(hex::encode(hash));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Direct access to stored blocks. Edits here bypass mining and are
    /// reported by [`Chain::verify`].
    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    pub fn get(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    /// Latest block. A chain always holds at least its genesis block.
    pub fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn difficulty(&self) -> u32 {
        self.miner.difficulty()
    }
}

/// A [`Chain`] behind a read/write lock. Appending holds the write lock for
/// the whole mine-and-append, so verification never sees a block mid-search.
#[derive(Clone, Debug)]
pub struct SharedChain<C: Clock = SystemClock> {
    inner: Arc<RwLock<Chain<C>>>,
}

impl<C: Clock> SharedChain<C> {
    pub fn new(chain: Chain<C>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(chain)),
        }
    }

    pub fn append_block(&self, transactions: Vec<Transaction>) -> Result<Block> {
        self.write().append_block(transactions).cloned()
    }

    pub fn verify(&self) -> std::result::Result<(), VerifyError> {
        self.read().verify()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of the current blocks.
    pub fn snapshot(&self) -> Vec<Block> {
        self.read().blocks().to_vec()
    }

    /// Run `f` with exclusive access, e.g. to edit stored blocks.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut Chain<C>) -> R) -> R {
        let mut guard = self.write();
        f(&mut *guard)
    }

    fn read(&self) -> RwLockReadGuard<'_, Chain<C>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Chain<C>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
