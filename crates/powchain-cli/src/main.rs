use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use powchain_core::{signing, Chain, ChainConfig, Miner, Transaction};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "powchain")]
#[command(about = "Build, tamper with and verify a small proof-of-work chain")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug)]
struct ChainArgs {
    /// TOML file with `difficulty`, `max_attempts` and `parallel`
    #[arg(long)]
    config: Option<PathBuf>,
    /// Leading hex zeros required of every block digest
    #[arg(long)]
    difficulty: Option<u32>,
    /// Give up on a block after this many attempts
    #[arg(long)]
    max_attempts: Option<u64>,
    /// Search nonces on all cores
    #[arg(long)]
    parallel: bool,
    /// Blocks to append after genesis
    #[arg(long, default_value_t = 3)]
    blocks: u64,
    /// Transaction as sender:recipient:amount, repeatable
    #[arg(long = "tx", value_parser = parse_tx)]
    txs: Vec<Transaction>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine a chain, print it and verify it
    Mine {
        #[command(flatten)]
        chain: ChainArgs,
    },
    /// Mine a chain, rewrite one transaction amount and show where verification stops
    Tamper {
        #[command(flatten)]
        chain: ChainArgs,
        /// Block whose first transaction gets rewritten
        #[arg(long, default_value_t = 1)]
        block: u64,
        /// Replacement amount
        #[arg(long, default_value_t = 999)]
        amount: u64,
    },
    /// Mine `nickname + nonce`, then sign the winning payload with a fresh key
    Payload {
        #[arg(long)]
        nickname: String,
        #[arg(long, default_value_t = powchain_core::constants::DEFAULT_DIFFICULTY)]
        difficulty: u32,
        /// Hex secret key to sign with instead of a generated one
        #[arg(long)]
        secret_key: Option<String>,
    },
    /// Check a hex signature over a payload
    VerifySignature {
        #[arg(long)]
        public_key: String,
        #[arg(long)]
        payload: String,
        #[arg(long)]
        signature: String,
    },
}

fn parse_tx(raw: &str) -> std::result::Result<Transaction, String> {
    let mut parts = raw.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(sender), Some(recipient), Some(amount)) if !sender.is_empty() && !recipient.is_empty() => {
            let amount = amount
                .parse::<u64>()
                .map_err(|e| format!("invalid amount {amount:?}: {e}"))?;
            Ok(Transaction::new(sender, recipient, amount))
        }
        _ => Err(format!("expected sender:recipient:amount, got {raw:?}")),
    }
}

fn sample_transactions() -> Vec<Transaction> {
    vec![
        Transaction::new("alice", "bob", 5),
        Transaction::new("bob", "carol", 2),
        Transaction::new("carol", "dave", 1),
    ]
}

fn load_config(args: &ChainArgs) -> Result<ChainConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ChainConfig::from_toml_str(&source)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => ChainConfig::default(),
    };
    if let Some(difficulty) = args.difficulty {
        config.difficulty = difficulty;
    }
    if args.max_attempts.is_some() {
        config.max_attempts = args.max_attempts;
    }
    config.parallel |= args.parallel;
    config.validate()?;
    Ok(config)
}

fn build_chain(args: &ChainArgs) -> Result<Chain> {
    let config = load_config(args)?;
    let txs = if args.txs.is_empty() {
        sample_transactions()
    } else {
        args.txs.clone()
    };
    info!(
        difficulty = config.difficulty,
        blocks = args.blocks,
        parallel = config.parallel,
        "building chain"
    );
    let mut chain = Chain::new(config).context("mining genesis block")?;
    for _ in 0..args.blocks {
        let index = chain.len();
        chain
            .append_block(txs.clone())
            .with_context(|| format!("mining block {index}"))?;
    }
    Ok(chain)
}

fn print_chain(chain: &Chain) -> Result<()> {
    println!("height: {}", chain.len() - 1);
    for block in chain.blocks() {
        println!("{}", serde_json::to_string_pretty(block)?);
        println!("hash: {}", block.hash_hex());
    }
    Ok(())
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Mine { chain } => {
            let chain = build_chain(&chain)?;
            print_chain(&chain)?;
            chain.verify().context("freshly mined chain failed verification")?;
            println!("chain valid");
        }
        Command::Tamper {
            chain,
            block,
            amount,
        } => {
            let mut chain = build_chain(&chain)?;
            println!("before: {}", if chain.is_valid() { "chain valid" } else { "chain invalid" });
            let Ok(position) = usize::try_from(block) else {
                bail!("block {block} is out of range");
            };
            let Some(target) = chain.blocks_mut().get_mut(position) else {
                bail!("block {block} does not exist");
            };
            let Some(tx) = target.transactions.first_mut() else {
                bail!("block {block} has no transactions to rewrite");
            };
            tx.amount = amount;
            match chain.verify() {
                Ok(()) => println!("after: chain valid (rewritten block still meets difficulty)"),
                Err(err) => println!("after: verification failed at block {}: {err}", err.index()),
            }
        }
        Command::Payload {
            nickname,
            difficulty,
            secret_key,
        } => {
            let solution = Miner::new(difficulty)?.solve_payload(&nickname)?;
            println!("payload: {}", solution.payload);
            println!("hash: {}", solution.hash);

            let keys = match secret_key {
                Some(hex) => signing::KeyPair::from_secret_hex(&hex)?,
                None => signing::KeyPair::generate(),
            };
            let signature = keys.sign(solution.payload.as_bytes());
            println!("public key: {}", keys.public_key_hex());
            println!("signature: {signature}");
            keys.verify(solution.payload.as_bytes(), &signature)?;
            println!("verify: ok");
        }
        Command::VerifySignature {
            public_key,
            payload,
            signature,
        } => {
            signing::verify(&public_key, payload.as_bytes(), &signature)?;
            println!("verify: ok");
        }
    }
    Ok(())
}
