use bondsim::association::BiasVolume;
use bondsim::core::vec3::random_unit;
use bondsim::core::{Configuration, Particle, PeriodicBox};
use bondsim::error::{Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::f64::consts::PI;

fn pair(box_len: f64, oriented: bool, rng: &mut StdRng) -> Result<Configuration> {
    let mut a = Particle::new(0, [0.0; 3], [0.0; 3], 1.0)?;
    let mut b = Particle::new(1, [1.3, 0.7, 2.2], [0.0; 3], 1.0)?;
    if oriented {
        a = a.with_orientation(random_unit(rng))?;
        b = b.with_orientation(random_unit(rng))?;
    }
    Configuration::new(vec![a, b], PeriodicBox::cubic(box_len)?)
}

/// Cube of half-width 1 anchored at the origin: every insert is associated and each of
/// the eight octants holds 1/8 of the inserted points within 3 standard errors.
#[test]
fn cube_inserts_are_uniform_and_associated() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(31);
    let bias = BiasVolume::cube(1.0)?;
    let mut cfg = pair(4.0, false, &mut rng)?;
    let n = 10_000usize;
    let mut octants = [0usize; 8];
    for _ in 0..n {
        bias.insert(&mut cfg, 1, 0, &mut rng)?;
        assert!(bias.is_associated(&cfg, 1, 0));
        assert!(bias.is_associated(&cfg, 0, 1));
        let d = cfg.displacement(0, 1);
        let idx = (d[0] >= 0.0) as usize | ((d[1] >= 0.0) as usize) << 1 | ((d[2] >= 0.0) as usize) << 2;
        octants[idx] += 1;
    }
    let p: f64 = 0.125;
    let se = (p * (1.0 - p) / n as f64).sqrt();
    for (k, &c) in octants.iter().enumerate() {
        let f = c as f64 / n as f64;
        assert!((f - p).abs() < 3.0 * se, "octant {k} fraction {f}");
    }
    assert!((bias.volume() - 8.0).abs() < 1e-12);
    Ok(())
}

/// Insert followed by the association test succeeds for every variant.
#[test]
fn insert_round_trip_for_every_variant() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(77);
    let variants = [
        (BiasVolume::cube(0.7)?, false),
        (BiasVolume::sphere(0.9, 1.0)?, false),
        (BiasVolume::sphere(0.0, 1.2)?, false),
        (BiasVolume::oriented_sphere(0.8, 1.1, 0.4)?, true),
        (BiasVolume::oriented_sphere(0.5, 1.0, 0.5 * PI)?, true),
    ];
    for (bias, oriented) in variants {
        let mut cfg = pair(5.0, oriented, &mut rng)?;
        for _ in 0..2_000 {
            bias.insert(&mut cfg, 1, 0, &mut rng)?;
            assert!(bias.is_associated(&cfg, 0, 1), "{bias:?}");
        }
    }
    Ok(())
}

/// The oriented shell's volume is the fraction of random oriented placements that
/// associate, times the box volume.
#[test]
fn oriented_volume_matches_random_placement() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(5);
    let bias = BiasVolume::oriented_sphere(0.5, 1.5, 1.0)?;
    let l = 4.0;
    let mut cfg = pair(l, true, &mut rng)?;
    let n = 400_000usize;
    let mut hits = 0usize;
    for _ in 0..n {
        let r = cfg.boundary.random_position(&mut rng);
        cfg.particles[1].r = r;
        cfg.particles[1].orientation = Some(random_unit(&mut rng));
        cfg.particles[0].orientation = Some(random_unit(&mut rng));
        if bias.is_associated(&cfg, 0, 1) {
            hits += 1;
        }
    }
    let p = bias.volume() / (l * l * l);
    let f = hits as f64 / n as f64;
    let se = (p * (1.0 - p) / n as f64).sqrt();
    assert!((f - p).abs() < 4.0 * se, "sampled {f}, expected {p}");
    Ok(())
}

/// Shapes that do not fit in half the box, or lack orientations, are refused.
#[test]
fn insert_preconditions() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(1);
    let mut cfg = pair(3.0, false, &mut rng)?;
    assert!(matches!(
        BiasVolume::sphere(0.9, 1.6)?.insert(&mut cfg, 1, 0, &mut rng),
        Err(Error::InvalidParam(_))
    ));
    assert!(matches!(
        BiasVolume::oriented_sphere(0.9, 1.0, 0.3)?.insert(&mut cfg, 1, 0, &mut rng),
        Err(Error::InvalidParam(_))
    ));
    assert!(BiasVolume::cube(-1.0).is_err());
    assert!(BiasVolume::sphere(1.0, 0.5).is_err());
    assert!(BiasVolume::oriented_sphere(0.0, 1.0, 0.3).is_err());
    assert!(BiasVolume::oriented_sphere(0.5, 1.0, 2.0).is_err());
    Ok(())
}
