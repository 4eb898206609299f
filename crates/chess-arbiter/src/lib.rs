pub mod arbiter;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod piece;
pub mod ports;
pub mod protocol;
pub mod session;
pub mod testing;

pub use arbiter::Arbiter;
pub use config::ArbiterConfig;
pub use error::ArbiterError;
pub use events::{HostCommand, Notification};
pub use piece::{PieceId, PieceRegistry, PieceState};
pub use ports::{EventSink, GeometryMapper, InteractionSource, NetworkChannel, Vec3};
pub use protocol::{GameMode, NetMessage};
pub use session::{ParticipantId, Players, Profile};
