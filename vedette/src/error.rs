use thiserror::Error;

use crate::conf::ConfError;

/// Errors from codec setup paths. The packet hot path never returns these;
/// decode and encode signal failure through their boolean results.
#[derive(Debug, Error)]
pub enum VedetteError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Conf(#[from] ConfError),

    /// Failure to compile the SYN-to-multicast address variable; terminal
    /// for module load.
    #[error("could not initialize SynToMulticastDstIp: {0}")]
    MulticastVar(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl VedetteError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Type alias for Result with VedetteError
pub type Result<T> = std::result::Result<T, VedetteError>;
