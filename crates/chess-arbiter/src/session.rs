//! Player sessions — which participant occupies which color.

use serde::{Deserialize, Serialize};

use chess_match::Color;

use crate::piece::PieceId;

/// Transport-level identity of a connected participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub avatar_id: Option<String>,
}

impl Profile {
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            avatar_id: None,
        }
    }
}

/// One claimed color slot.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub participant_id: ParticipantId,
    pub profile: Profile,
    pub pieces: Vec<PieceId>,
}

/// The two color slots of a match. A color's occupant, once set, is never
/// overwritten by a later claim for the same color.
#[derive(Debug, Default)]
pub struct Players {
    white: Option<PlayerSlot>,
    black: Option<PlayerSlot>,
}

impl Players {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, color: Color) -> &Option<PlayerSlot> {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn slot_mut(&mut self, color: Color) -> &mut Option<PlayerSlot> {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    /// Claim a color. Returns false (and changes nothing) if the slot is
    /// already occupied — first successful claim wins.
    pub fn claim(&mut self, color: Color, participant_id: ParticipantId, profile: Profile) -> bool {
        let slot = self.slot_mut(color);
        if slot.is_some() {
            return false;
        }
        *slot = Some(PlayerSlot {
            participant_id,
            profile,
            pieces: Vec::new(),
        });
        true
    }

    pub fn occupant(&self, color: Color) -> Option<&PlayerSlot> {
        self.slot(color).as_ref()
    }

    /// Color occupied by a participant, if any.
    pub fn color_of(&self, participant_id: &ParticipantId) -> Option<Color> {
        for color in [Color::White, Color::Black] {
            if let Some(slot) = self.slot(color) {
                if &slot.participant_id == participant_id {
                    return Some(color);
                }
            }
        }
        None
    }

    pub fn set_pieces(&mut self, color: Color, pieces: Vec<PieceId>) {
        if let Some(slot) = self.slot_mut(color).as_mut() {
            slot.pieces = pieces;
        }
    }

    pub fn clear(&mut self) {
        self.white = None;
        self.black = None;
    }
}
