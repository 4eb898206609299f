//! Piece objects — the manipulable proxies bound to logical chess pieces.
//!
//! A `PieceState` is a passive data holder: all legality and side-effect
//! logic lives in the arbiter. State is exposed through a narrow mutation
//! interface so the orchestrator and the host never alias the record
//! directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shakmaty::{File, Rank, Square};

use chess_match::{Color, PieceKind};

use crate::ports::Vec3;
use crate::session::ParticipantId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PieceId(pub String);

impl PieceId {
    /// Id of the piece that replaces this one on promotion. Derived, not
    /// minted, so every peer replaying the same promotion converges on the
    /// same id.
    pub fn promoted(&self) -> PieceId {
        PieceId(format!("{}-q", self.0))
    }
}

impl From<&str> for PieceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for PieceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct PieceState {
    id: PieceId,
    kind: PieceKind,
    color: Color,
    owner: ParticipantId,
    visual: String,
    initial_square: Square,
    last_square: Square,
    last_position: Vec3,
    current_position: Vec3,
    moves: Vec<Square>,
    was_held: bool,
    piece_y: f32,
}

impl PieceState {
    pub fn new(
        id: PieceId,
        kind: PieceKind,
        color: Color,
        owner: ParticipantId,
        visual: String,
        initial_square: Square,
        piece_y: f32,
        position: Vec3,
    ) -> Self {
        Self {
            id,
            kind,
            color,
            owner,
            visual,
            initial_square,
            last_square: initial_square,
            last_position: position,
            current_position: position,
            moves: Vec::new(),
            was_held: false,
            piece_y,
        }
    }

    pub fn id(&self) -> &PieceId {
        &self.id
    }

    pub fn kind(&self) -> PieceKind {
        self.kind
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn owner(&self) -> &ParticipantId {
        &self.owner
    }

    pub fn visual(&self) -> &str {
        &self.visual
    }

    pub fn initial_square(&self) -> Square {
        self.initial_square
    }

    pub fn last_square(&self) -> Square {
        self.last_square
    }

    pub fn last_position(&self) -> Vec3 {
        self.last_position
    }

    pub fn current_position(&self) -> Vec3 {
        self.current_position
    }

    pub fn moves(&self) -> &[Square] {
        &self.moves
    }

    pub fn was_held(&self) -> bool {
        self.was_held
    }

    pub fn piece_y(&self) -> f32 {
        self.piece_y
    }

    /// Commit a placement: square and centroid become the new last-known
    /// resting state.
    pub fn place_at(&mut self, square: Square, position: Vec3) {
        self.last_square = square;
        self.last_position = position;
        self.current_position = position;
    }

    pub fn set_current_position(&mut self, position: Vec3) {
        self.current_position = position;
    }

    pub fn set_held(&mut self, held: bool) {
        self.was_held = held;
    }

    pub fn set_moves(&mut self, moves: Vec<Square>) {
        self.moves = moves;
    }

    pub fn clear_moves(&mut self) {
        self.moves.clear();
    }

    pub fn set_owner(&mut self, owner: ParticipantId) {
        self.owner = owner;
    }

    /// Resting rotation in degrees around the vertical axis. Knights face
    /// the board center when the inversion flag is set.
    pub fn rest_rotation(&self, invert_knights: bool) -> f32 {
        if invert_knights && self.kind == PieceKind::Knight {
            180.0
        } else {
            0.0
        }
    }
}

/// Id-keyed collection of every piece object in the active game, local and
/// remote alike.
#[derive(Debug, Default)]
pub struct PieceRegistry {
    pieces: HashMap<PieceId, PieceState>,
    next_seq: u64,
}

impl PieceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint_id(&mut self, color: Color, kind: PieceKind) -> PieceId {
        self.next_seq += 1;
        PieceId(format!(
            "{}-{}-{}",
            color.as_char(),
            kind.as_char(),
            self.next_seq
        ))
    }

    /// Insert or replace; replays of the same add are idempotent.
    pub fn upsert(&mut self, piece: PieceState) {
        self.pieces.insert(piece.id().clone(), piece);
    }

    pub fn remove(&mut self, id: &PieceId) -> Option<PieceState> {
        self.pieces.remove(id)
    }

    pub fn get(&self, id: &PieceId) -> Option<&PieceState> {
        self.pieces.get(id)
    }

    pub fn get_mut(&mut self, id: &PieceId) -> Option<&mut PieceState> {
        self.pieces.get_mut(id)
    }

    /// The piece resting on a square, per its committed `last_square`.
    pub fn piece_on(&self, square: Square) -> Option<&PieceState> {
        self.pieces.values().find(|p| p.last_square() == square)
    }

    /// All ids, in a stable order for deterministic polling.
    pub fn ids(&self) -> Vec<PieceId> {
        let mut ids: Vec<PieceId> = self.pieces.keys().cloned().collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        ids
    }

    pub fn take_ownership(&mut self, id: &PieceId, owner: &ParticipantId) {
        if let Some(piece) = self.pieces.get_mut(id) {
            piece.set_owner(owner.clone());
        }
    }

    pub fn clear(&mut self) {
        self.pieces.clear();
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

/// Standard sixteen-piece layout for one color.
pub fn initial_layout(color: Color) -> Vec<(PieceKind, Square)> {
    let (back, pawns) = match color {
        Color::White => (Rank::First, Rank::Second),
        Color::Black => (Rank::Eighth, Rank::Seventh),
    };
    let back_rank = [
        PieceKind::Rook,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Queen,
        PieceKind::King,
        PieceKind::Bishop,
        PieceKind::Knight,
        PieceKind::Rook,
    ];

    let mut layout = Vec::with_capacity(16);
    for (i, kind) in back_rank.into_iter().enumerate() {
        layout.push((kind, Square::from_coords(File::new(i as u32), back)));
    }
    for i in 0..8 {
        layout.push((PieceKind::Pawn, Square::from_coords(File::new(i), pawns)));
    }
    layout
}
