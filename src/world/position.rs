/// A point in continuous world space. `z` is height and plays no part in cell addressing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z,
        }
    }

    pub fn distance_2d(self, other: Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_ignores_height() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 100.0);
        assert!((a.distance_2d(b) - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn offset_keeps_height() {
        let origin = Position::new(10.0, -5.0, 7.0);
        let moved = origin.offset(2.5, 2.5);
        assert_eq!(moved, Position::new(12.5, -2.5, 7.0));
    }

    #[test]
    fn non_finite_positions_are_detected() {
        assert!(Position::new(1.0, 2.0, 3.0).is_finite());
        assert!(!Position::new(f32::NAN, 2.0, 3.0).is_finite());
        assert!(!Position::new(1.0, f32::INFINITY, 3.0).is_finite());
    }
}
