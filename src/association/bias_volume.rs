//! Bias volumes: the region around an anchor particle where a partner counts as bonded.
//!
//! Each variant answers three questions that must agree exactly: how big the region is
//! (`volume`), how to draw a uniform point from it (`insert`), and whether two particles
//! currently sit in each other's region (`is_associated`). `insert` re-checks its sample
//! with `is_associated` before committing, so every inserted configuration passes the
//! predicate bit for bit.

use crate::core::boundary::PeriodicBox;
use crate::core::configuration::Configuration;
use crate::core::particle::DIM;
use crate::core::vec3::{dot, norm_sq, random_in_cone, scale, Vec3};
use crate::error::{Error, Result};
use rand::Rng;
use std::f64::consts::PI;

const MAX_INSERT_ATTEMPTS: usize = 10_000;

/// Closed set of bias-volume shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BiasVolume {
    /// Axis-aligned box centred on the anchor.
    Cube { half_widths: [f64; DIM] },
    /// Spherical shell `inner <= |r| <= outer`.
    Sphere { inner: f64, outer: f64 },
    /// Spherical shell restricted to mutually facing cones of half-angle `half_angle`
    /// (radians) around each particle's orientation.
    OrientedSphere {
        inner: f64,
        outer: f64,
        half_angle: f64,
    },
}

impl BiasVolume {
    pub fn cube(half_width: f64) -> Result<Self> {
        Self::Cube {
            half_widths: [half_width; DIM],
        }
        .validated()
    }

    pub fn sphere(inner: f64, outer: f64) -> Result<Self> {
        Self::Sphere { inner, outer }.validated()
    }

    pub fn oriented_sphere(inner: f64, outer: f64, half_angle: f64) -> Result<Self> {
        Self::OrientedSphere {
            inner,
            outer,
            half_angle,
        }
        .validated()
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Reject non-positive or inverted dimensions.
    pub fn validate(&self) -> Result<()> {
        match *self {
            BiasVolume::Cube { half_widths } => {
                if !half_widths.iter().all(|&h| h.is_finite() && h > 0.0) {
                    return Err(Error::InvalidParam(
                        "cube half-widths must be finite and > 0".into(),
                    ));
                }
            }
            BiasVolume::Sphere { inner, outer } => check_shell(inner, outer, false)?,
            BiasVolume::OrientedSphere {
                inner,
                outer,
                half_angle,
            } => {
                check_shell(inner, outer, true)?;
                if !half_angle.is_finite() || half_angle <= 0.0 || half_angle > 0.5 * PI {
                    return Err(Error::InvalidParam(
                        "cone half-angle must lie in (0, pi/2]".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Configuration-space measure of the region.
    ///
    /// For the oriented shell this is the positional volume of the anchor's cone times
    /// the fraction of orientations of the inserted particle that face back at the
    /// anchor; both fractions equal `(1 - cos(half_angle)) / 2`.
    pub fn volume(&self) -> f64 {
        match *self {
            BiasVolume::Cube { half_widths } => half_widths.iter().map(|h| 2.0 * h).product(),
            BiasVolume::Sphere { inner, outer } => shell_volume(inner, outer),
            BiasVolume::OrientedSphere {
                inner,
                outer,
                half_angle,
            } => {
                let cap = 0.5 * (1.0 - half_angle.cos());
                shell_volume(inner, outer) * cap * cap
            }
        }
    }

    /// Largest center-to-center distance inside the region (neighbor cutoff).
    pub fn range(&self) -> f64 {
        match *self {
            BiasVolume::Cube { half_widths } => norm_sq(&half_widths).sqrt(),
            BiasVolume::Sphere { outer, .. } | BiasVolume::OrientedSphere { outer, .. } => outer,
        }
    }

    /// True when the variant reads particle orientations.
    pub fn needs_orientation(&self) -> bool {
        matches!(self, BiasVolume::OrientedSphere { .. })
    }

    /// The region must fit inside half the box so nearest-image displacements are unique.
    pub fn check_box(&self, boundary: &PeriodicBox) -> Result<()> {
        let lengths = boundary.lengths();
        let fits = match *self {
            BiasVolume::Cube { half_widths } => half_widths
                .iter()
                .zip(lengths.iter())
                .all(|(&h, &l)| h < 0.5 * l),
            BiasVolume::Sphere { outer, .. } | BiasVolume::OrientedSphere { outer, .. } => {
                outer < boundary.half_min_length()
            }
        };
        if fits {
            Ok(())
        } else {
            Err(Error::InvalidParam(format!(
                "bias volume {self:?} does not fit in half of box {lengths:?}"
            )))
        }
    }

    /// Shape test on a nearest-image displacement `d = r_b - r_a` and orientations.
    pub fn contains(&self, d: &Vec3, e_a: Option<&Vec3>, e_b: Option<&Vec3>) -> bool {
        match *self {
            BiasVolume::Cube { half_widths } => d
                .iter()
                .zip(half_widths.iter())
                .all(|(dk, h)| dk.abs() <= *h),
            BiasVolume::Sphere { inner, outer } => {
                let r2 = norm_sq(d);
                r2 >= inner * inner && r2 <= outer * outer
            }
            BiasVolume::OrientedSphere {
                inner,
                outer,
                half_angle,
            } => {
                let (Some(e_a), Some(e_b)) = (e_a, e_b) else {
                    return false;
                };
                let r2 = norm_sq(d);
                if r2 < inner * inner || r2 > outer * outer || r2 == 0.0 {
                    return false;
                }
                let r = r2.sqrt();
                let cos_t = half_angle.cos();
                // a must point at b, and b must point back at a.
                dot(e_a, d) / r >= cos_t && -dot(e_b, d) / r >= cos_t
            }
        }
    }

    /// Whether `a` and `b` are associated under the nearest-image convention.
    pub fn is_associated(&self, cfg: &Configuration, a: usize, b: usize) -> bool {
        if a == b {
            return false;
        }
        let d = cfg.displacement(a, b);
        self.contains(
            &d,
            cfg.particles[a].orientation.as_ref(),
            cfg.particles[b].orientation.as_ref(),
        )
    }

    /// Place `a` uniformly inside the region anchored at `anchor`.
    ///
    /// The oriented variant also draws `a`'s orientation. On error `a` is unchanged.
    pub fn insert<R: Rng + ?Sized>(
        &self,
        cfg: &mut Configuration,
        a: usize,
        anchor: usize,
        rng: &mut R,
    ) -> Result<()> {
        if a == anchor {
            return Err(Error::InvalidParam(format!(
                "cannot insert particle {a} relative to itself"
            )));
        }
        self.check_box(&cfg.boundary)?;
        let origin = cfg.particles[anchor].r;
        let anchor_e = cfg.particles[anchor].orientation;
        if self.needs_orientation() && (anchor_e.is_none() || cfg.particles[a].orientation.is_none()) {
            return Err(Error::InvalidParam(
                "oriented bias volume requires oriented particles".into(),
            ));
        }

        for _ in 0..MAX_INSERT_ATTEMPTS {
            let (offset, e_new) = self.sample_offset(anchor_e.as_ref(), rng);
            let mut r = origin;
            for k in 0..DIM {
                r[k] += offset[k];
            }
            cfg.boundary.wrap(&mut r);

            let d = cfg.boundary.displacement(&r, &origin);
            let e_a = e_new.or(cfg.particles[a].orientation);
            if self.contains(&d, e_a.as_ref(), anchor_e.as_ref()) {
                let p = &mut cfg.particles[a];
                p.r = r;
                if e_new.is_some() {
                    p.orientation = e_new;
                }
                return Ok(());
            }
        }
        Err(Error::SamplingFailed {
            what: "bias volume insertion",
            attempts: MAX_INSERT_ATTEMPTS,
        })
    }

    /// Offset from the anchor and, for the oriented shell, a facing orientation.
    fn sample_offset<R: Rng + ?Sized>(&self, anchor_e: Option<&Vec3>, rng: &mut R) -> (Vec3, Option<Vec3>) {
        match *self {
            BiasVolume::Cube { half_widths } => {
                let mut d = [0.0_f64; DIM];
                for (dk, &h) in d.iter_mut().zip(half_widths.iter()) {
                    *dk = rng.random_range(-h..=h);
                }
                (d, None)
            }
            BiasVolume::Sphere { inner, outer } => {
                let (in2, out2) = (inner * inner, outer * outer);
                loop {
                    let mut d = [0.0_f64; DIM];
                    d.iter_mut()
                        .for_each(|x| *x = rng.random_range(-outer..=outer));
                    let r2 = norm_sq(&d);
                    if r2 >= in2 && r2 <= out2 {
                        return (d, None);
                    }
                }
            }
            BiasVolume::OrientedSphere {
                inner,
                outer,
                half_angle,
            } => {
                let cos_t = half_angle.cos();
                let axis = anchor_e.copied().unwrap_or([0.0, 0.0, 1.0]);
                let w = random_in_cone(rng, &axis, cos_t);
                let (i3, o3) = (inner.powi(3), outer.powi(3));
                let u: f64 = rng.random();
                let r = (i3 + u * (o3 - i3)).cbrt();
                let back = scale(&w, -1.0);
                let e = random_in_cone(rng, &back, cos_t);
                (scale(&w, r), Some(e))
            }
        }
    }
}

fn check_shell(inner: f64, outer: f64, strictly_positive_inner: bool) -> Result<()> {
    if !inner.is_finite() || inner < 0.0 || (strictly_positive_inner && inner == 0.0) {
        return Err(Error::InvalidParam(
            "shell inner radius must be finite and non-negative (positive when oriented)".into(),
        ));
    }
    if !outer.is_finite() || outer <= inner {
        return Err(Error::InvalidParam(format!(
            "shell outer radius ({outer}) must exceed inner radius ({inner})"
        )));
    }
    Ok(())
}

#[inline]
fn shell_volume(inner: f64, outer: f64) -> f64 {
    4.0 / 3.0 * PI * (outer.powi(3) - inner.powi(3))
}
