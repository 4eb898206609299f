//! Reference geometry mapper for a flat board laid out in the x/z plane,
//! centered on an origin, white's first rank toward +z.

use shakmaty::{File, Rank, Square};

use crate::ports::{GeometryMapper, Vec3};

#[derive(Debug, Clone)]
pub struct PlanarBoard {
    pub origin: Vec3,
    pub square_size: f32,
}

impl PlanarBoard {
    pub fn new(origin: Vec3, square_size: f32) -> Self {
        Self {
            origin,
            square_size,
        }
    }

    /// Fractional file/rank coordinates of a position.
    fn board_coords(&self, position: Vec3) -> (f32, f32) {
        let file = (position.x - self.origin.x) / self.square_size + 3.5;
        let rank = 3.5 - (position.z - self.origin.z) / self.square_size;
        (file, rank)
    }
}

impl GeometryMapper for PlanarBoard {
    fn square_at(&self, position: Vec3) -> Option<Square> {
        let (file, rank) = self.board_coords(position);
        let file = file.round();
        let rank = rank.round();
        if !(0.0..=7.0).contains(&file) || !(0.0..=7.0).contains(&rank) {
            return None;
        }
        Some(Square::from_coords(
            File::new(file as u32),
            Rank::new(rank as u32),
        ))
    }

    fn position_of(&self, square: Square, height: f32) -> Vec3 {
        let file = u32::from(square.file()) as f32;
        let rank = u32::from(square.rank()) as f32;
        Vec3::new(
            self.origin.x + (file - 3.5) * self.square_size,
            self.origin.y + height,
            self.origin.z + (3.5 - rank) * self.square_size,
        )
    }

    fn is_on_board(&self, position: Vec3) -> bool {
        let (file, rank) = self.board_coords(position);
        (-0.5..=7.5).contains(&file) && (-0.5..=7.5).contains(&rank)
    }
}
