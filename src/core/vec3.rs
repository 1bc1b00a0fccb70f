//! Small fixed-size vector helpers over `[f64; DIM]`.

use crate::core::particle::DIM;
use rand::Rng;
use std::f64::consts::PI;

pub type Vec3 = [f64; DIM];

#[inline]
pub fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn norm_sq(a: &Vec3) -> f64 {
    dot(a, a)
}

#[inline]
pub fn sub(a: &Vec3, b: &Vec3) -> Vec3 {
    let mut out = [0.0_f64; DIM];
    for (k, o) in out.iter_mut().enumerate() {
        *o = a[k] - b[k];
    }
    out
}

#[inline]
pub fn add(a: &Vec3, b: &Vec3) -> Vec3 {
    let mut out = [0.0_f64; DIM];
    for (k, o) in out.iter_mut().enumerate() {
        *o = a[k] + b[k];
    }
    out
}

#[inline]
pub fn scale(a: &Vec3, s: f64) -> Vec3 {
    let mut out = *a;
    out.iter_mut().for_each(|x| *x *= s);
    out
}

#[inline]
pub fn cross(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Unit vector along `a`, or `None` for a (near) zero vector.
pub fn normalized(a: &Vec3) -> Option<Vec3> {
    let n = norm_sq(a).sqrt();
    if n <= f64::EPSILON || !n.is_finite() {
        return None;
    }
    Some(scale(a, 1.0 / n))
}

/// Uniformly distributed unit vector.
pub fn random_unit<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    let z: f64 = rng.random_range(-1.0..=1.0);
    let phi: f64 = rng.random_range(0.0..(2.0 * PI));
    let s = (1.0 - z * z).max(0.0).sqrt();
    [s * phi.cos(), s * phi.sin(), z]
}

/// Unit vector uniformly distributed over the cap `axis · u >= cos_theta`.
///
/// `axis` must be a unit vector. `cos(angle)` is drawn from `(cos_theta, 1]`.
pub fn random_in_cone<R: Rng + ?Sized>(rng: &mut R, axis: &Vec3, cos_theta: f64) -> Vec3 {
    let u: f64 = rng.random();
    let cos_a = 1.0 - u * (1.0 - cos_theta);
    let sin_a = (1.0 - cos_a * cos_a).max(0.0).sqrt();
    let phi: f64 = rng.random_range(0.0..(2.0 * PI));
    let (e1, e2) = orthonormal_basis(axis);
    let mut out = [0.0_f64; DIM];
    for k in 0..DIM {
        out[k] = cos_a * axis[k] + sin_a * (phi.cos() * e1[k] + phi.sin() * e2[k]);
    }
    normalized(&out).unwrap_or(*axis)
}

/// Two unit vectors completing `axis` (unit) to a right-handed orthonormal frame.
pub fn orthonormal_basis(axis: &Vec3) -> (Vec3, Vec3) {
    // Cross with the coordinate axis least aligned with `axis`.
    let helper = if axis[0].abs() < 0.9 {
        [1.0, 0.0, 0.0]
    } else {
        [0.0, 1.0, 0.0]
    };
    let e1 = normalized(&cross(axis, &helper)).unwrap_or([0.0, 0.0, 1.0]);
    let e2 = cross(axis, &e1);
    (e1, e2)
}

/// Rotate `v` about unit `axis` by `angle` (Rodrigues' formula).
pub fn rotate(v: &Vec3, axis: &Vec3, angle: f64) -> Vec3 {
    let (s, c) = angle.sin_cos();
    let kxv = cross(axis, v);
    let kdv = dot(axis, v);
    let mut out = [0.0_f64; DIM];
    for k in 0..DIM {
        out[k] = v[k] * c + kxv[k] * s + axis[k] * kdv * (1.0 - c);
    }
    out
}
