//! Host event bus payloads: inbound commands and outbound notifications.

use shakmaty::Square;
use tokio::sync::mpsc::UnboundedSender;

use chess_match::{Color, PieceKind};

use crate::piece::PieceId;
use crate::ports::{EventSink, Vec3};
use crate::protocol::GameMode;
use crate::session::{ParticipantId, Profile};

/// Commands the host feeds into the arbiter (UI buttons, chat, connection
/// lifecycle).
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    PlayAs { color: Color },
    CopyPgn,
    CopyFen,
    ResetNetworkedGame { fen: Option<String> },
    Chat { command: String, args: Vec<String> },
    /// A new participant connected; current players announce themselves.
    PeerConnected { participant_id: ParticipantId },
}

/// Notifications the arbiter emits for the host UI.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Drag cursor feedback while a piece is held.
    Cursor {
        enabled: bool,
        valid: bool,
        position: Option<Vec3>,
    },
    PieceHeld {
        id: PieceId,
    },
    PieceMoved {
        id: PieceId,
    },
    PieceDied {
        id: PieceId,
    },
    PieceAdded {
        id: PieceId,
        kind: PieceKind,
        color: Color,
        square: Square,
        /// Visual asset reference the host resolves to a model.
        visual: String,
    },
    PieceUpdated {
        id: PieceId,
        color: Color,
        square: Square,
        position: Vec3,
        rotation: f32,
    },
    PieceRemoved {
        id: PieceId,
        color: Color,
    },
    GameModeSet {
        mode: GameMode,
    },
    GameReset,
    PlayerActive {
        color: Color,
        participant_id: ParticipantId,
        profile: Profile,
    },
    /// Move the local avatar: to a color's station, or the neutral spawn.
    SpawnAt {
        color: Option<Color>,
    },
    /// Current notation, exported for the host clipboard.
    PgnReady {
        pgn: String,
    },
    FenReady {
        fen: String,
    },
}

/// `EventSink` backed by an unbounded channel; the host drains the receiver.
#[derive(Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<Notification>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, notification: Notification) {
        // A closed receiver means the host is gone; nothing to do.
        let _ = self.tx.send(notification);
    }
}
