use crate::core::boundary::PeriodicBox;
use crate::core::particle::Particle;
use crate::core::vec3::Vec3;
use crate::error::{Error, Result};

/// Particles in a periodic box: the state continuum MC moves act on.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub particles: Vec<Particle>,
    pub boundary: PeriodicBox,
}

impl Configuration {
    /// Takes ownership of `particles`; ids must equal arena indices.
    pub fn new(particles: Vec<Particle>, boundary: PeriodicBox) -> Result<Self> {
        for (i, p) in particles.iter().enumerate() {
            if p.id as usize != i {
                return Err(Error::InvalidParam(format!(
                    "particle at index {i} carries id {}",
                    p.id
                )));
            }
        }
        let mut cfg = Self {
            particles,
            boundary,
        };
        for p in &mut cfg.particles {
            cfg.boundary.wrap(&mut p.r);
        }
        Ok(cfg)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Nearest-image displacement from particle `a` to particle `b`.
    #[inline]
    pub fn displacement(&self, a: usize, b: usize) -> Vec3 {
        self.boundary
            .displacement(&self.particles[a].r, &self.particles[b].r)
    }
}
