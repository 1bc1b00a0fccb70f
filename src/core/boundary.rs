use crate::core::particle::DIM;
use crate::core::vec3::Vec3;
use crate::error::{Error, Result};
use rand::Rng;

/// Rectangular periodic cell `[0, L_k)` in each dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicBox {
    lengths: [f64; DIM],
}

impl PeriodicBox {
    pub fn new(lengths: [f64; DIM]) -> Result<Self> {
        if !lengths.iter().all(|&l| l.is_finite() && l > 0.0) {
            return Err(Error::InvalidParam(
                "box lengths must be finite and > 0".into(),
            ));
        }
        Ok(Self { lengths })
    }

    pub fn cubic(length: f64) -> Result<Self> {
        Self::new([length; DIM])
    }

    #[inline]
    pub fn lengths(&self) -> [f64; DIM] {
        self.lengths
    }

    #[inline]
    pub fn volume(&self) -> f64 {
        self.lengths.iter().product()
    }

    /// Half of the shortest edge; displacements beyond it are ambiguous under nearest image.
    #[inline]
    pub fn half_min_length(&self) -> f64 {
        0.5 * self.lengths.iter().cloned().fold(f64::INFINITY, f64::min)
    }

    /// Replace `d` by its nearest periodic image.
    pub fn nearest_image(&self, d: &mut Vec3) {
        for (dk, &l) in d.iter_mut().zip(self.lengths.iter()) {
            *dk -= l * (*dk / l).round();
        }
    }

    /// Nearest-image displacement `b - a`.
    pub fn displacement(&self, a: &Vec3, b: &Vec3) -> Vec3 {
        let mut d = [0.0_f64; DIM];
        for k in 0..DIM {
            d[k] = b[k] - a[k];
        }
        self.nearest_image(&mut d);
        d
    }

    /// Fold a position back into the primary cell.
    pub fn wrap(&self, r: &mut Vec3) {
        for (rk, &l) in r.iter_mut().zip(self.lengths.iter()) {
            *rk = rk.rem_euclid(l);
            // rem_euclid can round up to exactly `l` for tiny negative inputs.
            if *rk >= l {
                *rk = 0.0;
            }
        }
    }

    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        let mut r = [0.0_f64; DIM];
        for (rk, &l) in r.iter_mut().zip(self.lengths.iter()) {
            *rk = rng.random_range(0.0..l);
        }
        r
    }
}
