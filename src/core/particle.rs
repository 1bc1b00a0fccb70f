use crate::core::vec3::{norm_sq, normalized};
use crate::error::{Error, Result};

/// Fixed spatial dimension (3D).
pub const DIM: usize = 3;

/// A particle as seen by the bonding core.
///
/// Particles live in a dense arena (`Vec<Particle>`) and are addressed by index; `id`
/// equals that index. The core only mutates `r`, `v` and `orientation`.
#[derive(Debug, Clone)]
pub struct Particle {
    /// Stable particle identifier (arena index).
    pub id: u32,
    /// Position (x, y, z).
    pub r: [f64; DIM],
    /// Velocity (vx, vy, vz).
    pub v: [f64; DIM],
    /// Unit orientation vector, for oriented association sites.
    pub orientation: Option<[f64; DIM]>,
    /// Hard radius used for wall contact (>= 0).
    pub radius: f64,
    /// Mass (> 0).
    pub mass: f64,
    /// Species tag indexing the interaction table.
    pub species: u32,
    /// Collision participation counter (for event invalidation).
    pub collision_count: u64,
}

impl Particle {
    /// Create a new point particle of species 0 after validating invariants.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if `mass` is non-positive or any component is NaN/inf.
    pub fn new(id: u32, r: [f64; DIM], v: [f64; DIM], mass: f64) -> Result<Self> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(Error::InvalidParam("mass must be finite and > 0".into()));
        }
        if !r.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        if !v.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("velocity must be finite".into()));
        }
        Ok(Self {
            id,
            r,
            v,
            orientation: None,
            radius: 0.0,
            mass,
            species: 0,
            collision_count: 0,
        })
    }

    /// Set the hard radius used against walls.
    pub fn with_radius(mut self, radius: f64) -> Result<Self> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(Error::InvalidParam("radius must be finite and >= 0".into()));
        }
        self.radius = radius;
        Ok(self)
    }

    pub fn with_species(mut self, species: u32) -> Self {
        self.species = species;
        self
    }

    /// Attach an orientation; the vector is normalized.
    pub fn with_orientation(mut self, e: [f64; DIM]) -> Result<Self> {
        self.set_orientation(e)?;
        Ok(self)
    }

    /// Increment the collision counter (used for event invalidation).
    #[inline]
    pub fn bump_collision_count(&mut self) {
        self.collision_count = self.collision_count.saturating_add(1);
    }

    /// Returns the particle's kinetic energy: 1/2 m |v|^2.
    #[inline]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * norm_sq(&self.v)
    }

    /// Set position (validated as finite).
    pub fn set_position(&mut self, r: [f64; DIM]) -> Result<()> {
        if !r.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        self.r = r;
        Ok(())
    }

    /// Set velocity (validated as finite).
    pub fn set_velocity(&mut self, v: [f64; DIM]) -> Result<()> {
        if !v.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("velocity must be finite".into()));
        }
        self.v = v;
        Ok(())
    }

    /// Set orientation (normalized; zero vectors rejected).
    pub fn set_orientation(&mut self, e: [f64; DIM]) -> Result<()> {
        let unit = normalized(&e)
            .ok_or_else(|| Error::InvalidParam("orientation must be a nonzero finite vector".into()))?;
        self.orientation = Some(unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_particle_ok() -> Result<()> {
        let p = Particle::new(1, [0.0, 1.0, 2.0], [2.0, -3.0, 0.5], 2.0)?
            .with_radius(0.25)?
            .with_species(3);
        assert_eq!(p.id, 1);
        assert_eq!(p.r, [0.0, 1.0, 2.0]);
        assert_eq!(p.v, [2.0, -3.0, 0.5]);
        assert_eq!(p.radius, 0.25);
        assert_eq!(p.mass, 2.0);
        assert_eq!(p.species, 3);
        assert!(p.orientation.is_none());
        assert_eq!(p.collision_count, 0);
        Ok(())
    }

    #[test]
    fn invalid_mass_rejected() {
        let err = Particle::new(0, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 0.0).unwrap_err();
        assert!(err.to_string().contains("mass"));
    }

    #[test]
    fn orientation_is_normalized() -> Result<()> {
        let p = Particle::new(0, [0.0; DIM], [0.0; DIM], 1.0)?.with_orientation([0.0, 3.0, 4.0])?;
        let e = p.orientation.expect("orientation set");
        assert!((e[1] - 0.6).abs() < 1e-12);
        assert!((e[2] - 0.8).abs() < 1e-12);
        assert!(Particle::new(0, [0.0; DIM], [0.0; DIM], 1.0)?
            .with_orientation([0.0; DIM])
            .is_err());
        Ok(())
    }

    #[test]
    fn kinetic_energy_computed() -> Result<()> {
        // v = (3,4,0), |v|^2 = 25; KE = 0.5 * m * 25
        let p = Particle::new(7, [0.0, 0.0, 0.0], [3.0, 4.0, 0.0], 2.0)?;
        assert!((p.kinetic_energy() - 25.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn bump_collision_count() -> Result<()> {
        let mut p = Particle::new(1, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 1.0)?;
        p.bump_collision_count();
        assert_eq!(p.collision_count, 1);
        Ok(())
    }
}
