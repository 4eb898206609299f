pub use shakmaty;

pub mod error;
pub mod game;
pub mod pgn;
pub mod types;

pub use error::MatchError;
pub use game::{Match, MoveFlags, MoveOutcome, MoveRequest};
pub use types::{Color, PieceKind};
