//! Error types for SerpDeck

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SharedError {
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Unknown subscription status: {0}")]
    UnknownStatus(String),
}
