//! One match's engine state and history.
//!
//! `Match` owns a single `shakmaty` position. It is created on game start,
//! replaced wholesale on reset or FEN/PGN load, and never patched
//! incrementally from a string input. Move submission returns `None` for
//! illegal requests; the caller decides what a rejection means.

use shakmaty::{
    fen::Fen,
    san::SanPlus,
    CastlingMode, CastlingSide, Chess, EnPassantMode, File, Move, Position, Role, Square,
};

use crate::error::MatchError;
use crate::pgn;
use crate::types::{Color, PieceKind};

/// A drop-derived move request: origin, destination, optional promotion role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
}

/// Engine-reported annotations for an accepted move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveFlags {
    /// Standard capture on the destination square (en passant excluded).
    pub capture: bool,
    pub en_passant: bool,
    pub kingside_castle: bool,
    pub queenside_castle: bool,
    pub promotion: bool,
}

/// An accepted move: the request as played, the mover, and the flags the
/// side-effect orchestration keys off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub color: Color,
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
    pub flags: MoveFlags,
}

#[derive(Debug, Clone)]
pub struct Match {
    pos: Chess,
    /// FEN the game was seeded from, when not the standard start.
    initial_fen: Option<String>,
    /// SAN history from the seed position.
    history: Vec<String>,
}

impl Match {
    /// Standard starting position.
    pub fn new() -> Self {
        Self {
            pos: Chess::default(),
            initial_fen: None,
            history: Vec::new(),
        }
    }

    /// Seed from a FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, MatchError> {
        let parsed: Fen = fen
            .trim()
            .parse()
            .map_err(|e| MatchError::InvalidFen(format!("{e}")))?;
        let pos: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| MatchError::InvalidFen(format!("{e}")))?;
        Ok(Self {
            pos,
            initial_fen: Some(fen.trim().to_string()),
            history: Vec::new(),
        })
    }

    pub fn turn(&self) -> Color {
        self.pos.turn().into()
    }

    /// Submit a move request. Returns `None` if no legal move matches —
    /// the silent-revert contract for physical drops.
    pub fn submit(&mut self, req: &MoveRequest) -> Option<MoveOutcome> {
        let want_promotion: Option<Role> = req.promotion.map(Role::from);
        let legals = self.pos.legal_moves();
        let matched = legals.iter().find(|m| match m {
            Move::Castle { king, rook } => {
                *king == req.from && castle_king_target(*king, *rook) == req.to
            }
            _ => m.from() == Some(req.from) && m.to() == req.to && m.promotion() == want_promotion,
        })?;
        let m = matched.clone();

        let color: Color = self.pos.turn().into();
        let en_passant = m.is_en_passant();
        let flags = MoveFlags {
            capture: m.is_capture() && !en_passant,
            en_passant,
            kingside_castle: matches!(m.castling_side(), Some(CastlingSide::KingSide)),
            queenside_castle: matches!(m.castling_side(), Some(CastlingSide::QueenSide)),
            promotion: m.is_promotion(),
        };
        let promotion = m.promotion().map(PieceKind::from);

        let san = SanPlus::from_move_and_play_unchecked(&mut self.pos, m);
        self.history.push(san.to_string());

        Some(MoveOutcome {
            color,
            from: req.from,
            to: req.to,
            promotion,
            flags,
        })
    }

    /// Legal destination squares for the occupant of `from`. Castling is
    /// reported as the king's target square.
    pub fn destinations(&self, from: Square) -> Vec<Square> {
        let mut out: Vec<Square> = Vec::new();
        for m in self.pos.legal_moves().iter() {
            let to = match m {
                Move::Castle { king, rook } if *king == from => castle_king_target(*king, *rook),
                _ if m.from() == Some(from) => m.to(),
                _ => continue,
            };
            if !out.contains(&to) {
                out.push(to);
            }
        }
        out
    }

    pub fn fen(&self) -> String {
        Fen::from_position(&self.pos, EnPassantMode::Legal).to_string()
    }

    /// PGN movetext, with `[SetUp]`/`[FEN]` headers when seeded from a
    /// non-standard position.
    pub fn pgn(&self) -> String {
        let mut out = String::new();
        let seed = self
            .initial_fen
            .as_deref()
            .filter(|fen| *fen != pgn::STANDARD_START_FEN);
        if let Some(fen) = seed {
            out.push_str("[SetUp \"1\"]\n");
            out.push_str(&format!("[FEN \"{fen}\"]\n\n"));
        }
        for (ply, san) in self.history.iter().enumerate() {
            if ply % 2 == 0 {
                if ply > 0 {
                    out.push(' ');
                }
                out.push_str(&format!("{}.", ply / 2 + 1));
            }
            out.push(' ');
            out.push_str(san);
        }
        out
    }

    /// Replace the whole game with the contents of a PGN text. On failure
    /// the current match is left untouched.
    pub fn load_pgn(&mut self, text: &str) -> Result<(), MatchError> {
        let text = pgn::normalize(text);
        let mut fresh = match pgn::extract_header(&text, "FEN") {
            Some(fen) => Match::from_fen(&fen)
                .map_err(|e| MatchError::InvalidPgn(format!("FEN header: {e}")))?,
            None => Match::new(),
        };
        for (ply, token) in pgn::extract_moves(&text).iter().enumerate() {
            let san: SanPlus = token.parse().map_err(|_| MatchError::IllegalSan {
                san: token.clone(),
                ply,
            })?;
            let m = san
                .san
                .to_move(&fresh.pos)
                .map_err(|_| MatchError::IllegalSan {
                    san: token.clone(),
                    ply,
                })?;
            let played = SanPlus::from_move_and_play_unchecked(&mut fresh.pos, m);
            fresh.history.push(played.to_string());
        }
        *self = fresh;
        Ok(())
    }
}

impl Default for Match {
    fn default() -> Self {
        Self::new()
    }
}

/// King target square for a castling move (standard chess: g- or c-file).
fn castle_king_target(king: Square, rook: Square) -> Square {
    let file = if rook.file() > king.file() {
        File::G
    } else {
        File::C
    };
    Square::from_coords(file, king.rank())
}
