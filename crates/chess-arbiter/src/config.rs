//! Arbiter configuration from environment variables.

use std::env;
use std::time::Duration;

use chess_match::PieceKind;

#[derive(Clone, Debug)]
pub struct ArbiterConfig {
    /// Interval of the interaction poll.
    pub poll_interval: Duration,

    /// Delay before a promotion replaces the pawn object, so the drop snap
    /// finishes visually first.
    pub promotion_delay: Duration,

    /// Edge length of one board square in scene units.
    pub square_size: f32,

    /// Per-kind vertical offsets on top of the base resting height,
    /// in the order k q b n r p.
    pub y_corrections: [f32; 6],

    /// Rotate knights 180° so both sets face the board center.
    pub invert_knights: bool,

    /// Prefix for piece visual asset references.
    pub model_path_prefix: String,
}

impl ArbiterConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env::var("CHESSROOM_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            promotion_delay: env::var("CHESSROOM_PROMOTION_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.promotion_delay),
            square_size: env::var("CHESSROOM_SQUARE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.square_size),
            y_corrections: env::var("CHESSROOM_Y_CORRECTIONS")
                .ok()
                .and_then(|v| parse_corrections(&v))
                .unwrap_or(defaults.y_corrections),
            invert_knights: env::var("CHESSROOM_INVERT_KNIGHTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.invert_knights),
            model_path_prefix: env::var("CHESSROOM_MODEL_PREFIX")
                .unwrap_or(defaults.model_path_prefix),
        }
    }

    /// Resting height for a piece kind: square-size-derived base plus the
    /// kind's vertical correction.
    pub fn piece_height(&self, kind: PieceKind) -> f32 {
        let correction = match kind {
            PieceKind::King => self.y_corrections[0],
            PieceKind::Queen => self.y_corrections[1],
            PieceKind::Bishop => self.y_corrections[2],
            PieceKind::Knight => self.y_corrections[3],
            PieceKind::Rook => self.y_corrections[4],
            PieceKind::Pawn => self.y_corrections[5],
        };
        self.square_size * 2.4 + correction
    }
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            promotion_delay: Duration::from_millis(750),
            square_size: 0.25,
            y_corrections: [0.0; 6],
            invert_knights: false,
            model_path_prefix: "models".to_string(),
        }
    }
}

/// Parse a space-separated "k q b n r p" correction list.
fn parse_corrections(value: &str) -> Option<[f32; 6]> {
    let parts: Vec<f32> = value
        .split_whitespace()
        .filter_map(|v| v.parse().ok())
        .collect();
    parts.try_into().ok()
}
