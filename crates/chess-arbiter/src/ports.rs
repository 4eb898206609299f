//! Host-boundary ports.
//!
//! The arbiter core never talks to the scene graph, the hand-tracking input,
//! or the network directly. The host supplies these four seams; everything
//! behind them is replaceable (a real transport in production, a loopback
//! room in tests).

use shakmaty::Square;

use crate::events::Notification;
use crate::piece::PieceId;
use crate::protocol::NetMessage;
use crate::session::ParticipantId;

/// A point in scene space.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Conversions between board squares and scene positions.
pub trait GeometryMapper {
    /// Square under a scene position, if any.
    fn square_at(&self, position: Vec3) -> Option<Square>;

    /// Centroid of a square at the given resting height.
    fn position_of(&self, square: Square, height: f32) -> Vec3;

    /// Whether a position is over the board at all.
    fn is_on_board(&self, position: Vec3) -> bool;
}

/// Host-supplied interaction signals, polled every tick.
pub trait InteractionSource {
    fn is_held(&self, id: &PieceId) -> bool;

    /// Current scene position of a piece. Falls back to the last known
    /// position for pieces the host is not tracking.
    fn position(&self, id: &PieceId) -> Option<Vec3>;
}

/// Replication transport. Delivery is assumed at-least-once and unordered;
/// failures are the adapter's concern.
pub trait NetworkChannel {
    fn broadcast(&self, msg: &NetMessage);

    fn send_to(&self, peer: &ParticipantId, msg: &NetMessage);
}

/// Outbound half of the host event bus.
pub trait EventSink {
    fn emit(&self, notification: Notification);
}
