#![allow(dead_code)]

use powchain_core::{Chain, ChainConfig, FixedClock, Transaction};

pub const T0: u64 = 1_700_000_000;

pub fn scenario_transactions() -> Vec<Transaction> {
    vec![Transaction::new("a", "b", 1)]
}

/// Genesis plus `appended` blocks, all stamped `T0`, so every digest is
/// reproducible.
pub fn fixed_chain(difficulty: u32, appended: usize) -> Chain<FixedClock> {
    let mut chain = Chain::with_clock(ChainConfig::with_difficulty(difficulty), FixedClock(T0))
        .expect("genesis mines at test difficulty");
    for _ in 0..appended {
        chain
            .append_block(scenario_transactions())
            .expect("block mines at test difficulty");
    }
    chain
}
