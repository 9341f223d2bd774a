//! Spatial math for the surveillance pipeline.
//!
//! The controlled volume uses a flat Cartesian frame in linear units, so
//! separation math is plain planar geometry rather than great-circle work.

use serde::Deserialize;

/// Default controlled-airspace bounds.
pub const AIRSPACE_X_MIN: f64 = 0.0;
pub const AIRSPACE_X_MAX: f64 = 100_000.0;
pub const AIRSPACE_Y_MIN: f64 = 0.0;
pub const AIRSPACE_Y_MAX: f64 = 100_000.0;
pub const AIRSPACE_Z_MIN: f64 = 15_000.0;
pub const AIRSPACE_Z_MAX: f64 = 25_000.0;

/// The rectangular prism in which positions are considered valid.
///
/// Bounds are closed on both ends: a position exactly on a face is
/// inside. Deserializable so a rules file can override the volume.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Airspace {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl Default for Airspace {
    fn default() -> Self {
        Self {
            x_min: AIRSPACE_X_MIN,
            x_max: AIRSPACE_X_MAX,
            y_min: AIRSPACE_Y_MIN,
            y_max: AIRSPACE_Y_MAX,
            z_min: AIRSPACE_Z_MIN,
            z_max: AIRSPACE_Z_MAX,
        }
    }
}

impl Airspace {
    pub fn contains(&self, pos: &Position) -> bool {
        pos.x >= self.x_min
            && pos.x <= self.x_max
            && pos.y >= self.y_min
            && pos.y <= self.y_max
            && pos.z >= self.z_min
            && pos.z <= self.z_max
    }

    /// Valid altitude band for altitude-change commands.
    pub fn altitude_valid(&self, z: f64) -> bool {
        z >= self.z_min && z <= self.z_max
    }
}

/// A point in the controlled volume, in linear units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_valid(&self, airspace: &Airspace) -> bool {
        airspace.contains(self)
    }

    /// Horizontal (planar) distance to another position.
    pub fn horizontal_distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Absolute altitude difference to another position.
    pub fn vertical_distance(&self, other: &Position) -> f64 {
        (self.z - other.z).abs()
    }

    /// Midpoint between two positions.
    pub fn midpoint(&self, other: &Position) -> Position {
        Position {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
            z: (self.z + other.z) / 2.0,
        }
    }
}

/// Velocity vector in linear units per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

impl Velocity {
    pub fn new(vx: f64, vy: f64, vz: f64) -> Self {
        Self { vx, vy, vz }
    }

    /// Total speed (3-D magnitude).
    pub fn speed(&self) -> f64 {
        (self.vx * self.vx + self.vy * self.vy + self.vz * self.vz).sqrt()
    }

    /// Horizontal speed (planar magnitude).
    pub fn ground_speed(&self) -> f64 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }

    /// Rewrite the horizontal components from speed and heading.
    ///
    /// The vertical component is preserved.
    pub fn set_from_speed_and_heading(&mut self, speed: f64, heading_deg: f64) {
        let heading_rad = heading_deg.to_radians();
        self.vx = speed * heading_rad.cos();
        self.vy = speed * heading_rad.sin();
    }

    /// Heading in degrees derived from the horizontal components,
    /// normalised to [0, 360).
    pub fn heading_deg(&self) -> f64 {
        let mut heading = self.vy.atan2(self.vx).to_degrees();
        if heading < 0.0 {
            heading += 360.0;
        }
        heading
    }
}

/// Straight-line dead-reckoned position after `dt_secs`.
pub fn dead_reckon(pos: &Position, vel: &Velocity, dt_secs: f64) -> Position {
    Position {
        x: pos.x + vel.vx * dt_secs,
        y: pos.y + vel.vy * dt_secs,
        z: pos.z + vel.vz * dt_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_positions_are_valid() {
        let airspace = Airspace::default();
        assert!(Position::new(0.0, 0.0, 15_000.0).is_valid(&airspace));
        assert!(Position::new(100_000.0, 100_000.0, 25_000.0).is_valid(&airspace));
    }

    #[test]
    fn one_unit_outside_is_invalid() {
        let airspace = Airspace::default();
        assert!(!Position::new(-1.0, 0.0, 20_000.0).is_valid(&airspace));
        assert!(!Position::new(100_001.0, 0.0, 20_000.0).is_valid(&airspace));
        assert!(!Position::new(0.0, 0.0, 14_999.0).is_valid(&airspace));
        assert!(!Position::new(0.0, 0.0, 25_001.0).is_valid(&airspace));
    }

    #[test]
    fn speed_and_heading_round_trip() {
        let mut vel = Velocity::new(0.0, 0.0, 12.0);
        vel.set_from_speed_and_heading(300.0, 45.0);
        assert!((vel.ground_speed() - 300.0).abs() < 1e-9);
        assert!((vel.heading_deg() - 45.0).abs() < 1e-9);
        // vz untouched
        assert!((vel.vz - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn heading_normalised_to_positive_range() {
        // Due "south" in the x/y frame: negative y component
        let vel = Velocity::new(0.0, -250.0, 0.0);
        assert!((vel.heading_deg() - 270.0).abs() < 1e-9);
    }

    #[test]
    fn dead_reckon_advances_linearly() {
        let pos = Position::new(1000.0, 2000.0, 20_000.0);
        let vel = Velocity::new(100.0, -50.0, 10.0);
        let next = dead_reckon(&pos, &vel, 2.0);
        assert!((next.x - 1200.0).abs() < 1e-9);
        assert!((next.y - 1900.0).abs() < 1e-9);
        assert!((next.z - 20_020.0).abs() < 1e-9);
    }

    #[test]
    fn horizontal_distance_ignores_altitude() {
        let a = Position::new(0.0, 0.0, 15_000.0);
        let b = Position::new(3.0, 4.0, 25_000.0);
        assert!((a.horizontal_distance(&b) - 5.0).abs() < 1e-9);
        assert!((a.vertical_distance(&b) - 10_000.0).abs() < 1e-9);
    }
}
