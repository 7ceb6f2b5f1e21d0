use thiserror::Error;

/// Why a chain failed verification. Every variant carries the index of the
/// block at which the walk stopped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    #[error("linkage broken at block {index}: previous_hash does not match predecessor digest")]
    Linkage { index: u64 },

    #[error("proof-of-work invalid at block {index}")]
    ProofOfWork { index: u64 },

    #[error("block at position {index} carries index {found}")]
    IndexMismatch { index: u64, found: u64 },
}

impl VerifyError {
    /// Position of the offending block in the chain.
    pub fn index(&self) -> u64 {
        match self {
            VerifyError::Linkage { index }
            | VerifyError::ProofOfWork { index }
            | VerifyError::IndexMismatch { index, .. } => *index,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed public key: {0}")]
    MalformedPublicKey(String),

    #[error("malformed secret key: {0}")]
    MalformedSecretKey(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("signature does not match payload and public key")]
    InvalidSignature,
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("difficulty {0} exceeds the {max} hex characters of a digest", max = crate::constants::MAX_DIFFICULTY)]
    InvalidDifficulty(u32),

    #[error("no valid proof found after {attempts} attempts")]
    MiningTimeout { attempts: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Verification(#[from] VerifyError),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

pub type Result<T> = std::result::Result<T, ChainError>;
