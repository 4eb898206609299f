//! Arbiter error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArbiterError {
    #[error("Match error: {0}")]
    Match(#[from] chess_match::MatchError),
}
