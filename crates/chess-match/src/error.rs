//! Match error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Invalid PGN: {0}")]
    InvalidPgn(String),

    #[error("Illegal SAN move '{san}' at ply {ply}")]
    IllegalSan { san: String, ply: usize },
}
