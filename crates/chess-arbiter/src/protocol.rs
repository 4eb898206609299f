//! Replication message catalogue.
//!
//! One tagged enum covers every topic a room exchanges. Receipt of any of
//! these must reproduce the sender's local side effects, so payloads carry
//! absolute state (squares, ids) rather than deltas where possible, and the
//! handlers on the receiving side are idempotent.

use serde::{Deserialize, Serialize};
use shakmaty::Square;

use chess_match::{Color, PieceKind};

use crate::piece::PieceId;
use crate::session::{ParticipantId, Profile};

/// How the current match was seeded. Broadcast so peers initialize identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Standard,
    Fen,
    Pgn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum NetMessage {
    /// Reset intent; every receiving peer performs the same local reset.
    ResetGame {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        fen: Option<String>,
    },
    SetGameMode {
        game_mode: GameMode,
    },
    /// Whole-history replacement with the raw PGN text.
    LoadPgn {
        pgn: String,
    },
    /// Color claim. The late-join unicast variant also lists the claimant's
    /// piece ids so the newcomer can associate existing objects.
    SetPlayer {
        color: Color,
        participant_id: ParticipantId,
        profile: Profile,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        pieces: Option<Vec<PieceId>>,
    },
    SyncMove {
        #[serde(with = "square_str")]
        from: Square,
        #[serde(with = "square_str")]
        to: Square,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        promotion: Option<PieceKind>,
    },
    UpdatePiece {
        id: PieceId,
        #[serde(with = "square_str")]
        last_square: Square,
        color: Color,
    },
    AddPiece {
        color: Color,
        id: PieceId,
        #[serde(rename = "type")]
        kind: PieceKind,
        #[serde(with = "square_str")]
        initial_square: Square,
        #[serde(with = "square_str")]
        last_square: Square,
    },
    /// Unicast to the tracked opponent only.
    CapturePiece {
        #[serde(with = "square_str")]
        square: Square,
    },
    RemovePiece {
        id: PieceId,
        color: Color,
    },
}

/// Squares travel as their algebraic names ("e4").
mod square_str {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use shakmaty::Square;

    pub fn serialize<S: Serializer>(square: &Square, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(square)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Square, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}
