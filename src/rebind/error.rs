// Fri Jan 17 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RebindError {
    #[error("Out of memory while linking a batch of {requested} substitutions")]
    OutOfMemory { requested: usize },
    #[error("Invalid substitution: {0}")]
    InvalidSubstitution(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
