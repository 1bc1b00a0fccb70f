use bondsim::association::BiasVolume;
use bondsim::core::vec3::random_unit;
use bondsim::core::{Configuration, Particle, PeriodicBox};
use bondsim::error::Result;
use bondsim::mc::{AssociationPotential, BiasedBondMove, McSystem, MonteCarlo};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Probability that the two particles are associated at equilibrium:
/// `Vb e^(eps/kT) / (V - Vb + Vb e^(eps/kT))`.
fn analytic_bonded_fraction(vb: f64, v: f64, epsilon: f64, kt: f64) -> f64 {
    let boltz = (epsilon / kt).exp();
    vb * boltz / (v - vb + vb * boltz)
}

fn sampled_bonded_fraction(bias: BiasVolume, seed: u64, trials: u64) -> Result<(f64, f64)> {
    let l = 3.0;
    let (epsilon, kt) = (2.0, 1.0);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ps = vec![
        Particle::new(0, [0.5, 0.5, 0.5], [0.0; 3], 1.0)?,
        Particle::new(1, [2.0, 2.0, 2.0], [0.0; 3], 1.0)?,
    ];
    if bias.needs_orientation() {
        for p in &mut ps {
            p.set_orientation(random_unit(&mut rng))?;
        }
    }
    let cfg = Configuration::new(ps, PeriodicBox::cubic(l)?)?;
    let potential = AssociationPotential {
        epsilon,
        core: None,
        bias,
    };
    let sys = McSystem::new(cfg, potential, 1)?;
    let mut mc = MonteCarlo::new(sys, kt, Some(seed + 1))?;
    mc.add_move(Box::new(BiasedBondMove::new()), 1.0)?;

    mc.run(1_000)?;
    let mut bonded = 0u64;
    mc.run_with(trials, |sys| {
        if sys.graph.num_edges() == 1 {
            bonded += 1;
        }
    })?;
    mc.system.validate()?;
    let expected = analytic_bonded_fraction(bias.volume(), l * l * l, epsilon, kt);
    Ok((bonded as f64 / trials as f64, expected))
}

/// Two particles and a spherical shell: the sampled bonded fraction reproduces the
/// two-body equilibrium constant.
#[test]
fn two_body_equilibrium_sphere() -> Result<()> {
    let (f, expected) = sampled_bonded_fraction(BiasVolume::sphere(0.9, 1.0)?, 11, 200_000)?;
    assert!((expected - 0.2449).abs() < 1e-3, "expected {expected}");
    assert!((f - expected).abs() < 0.01, "sampled {f}, analytic {expected}");
    Ok(())
}

#[test]
fn two_body_equilibrium_cube() -> Result<()> {
    let (f, expected) = sampled_bonded_fraction(BiasVolume::cube(0.5)?, 23, 200_000)?;
    assert!((f - expected).abs() < 0.01, "sampled {f}, analytic {expected}");
    Ok(())
}

/// Same check for the oriented shell, which also pins down its volume formula.
#[test]
fn two_body_equilibrium_oriented_sphere() -> Result<()> {
    let bias = BiasVolume::oriented_sphere(0.8, 1.2, 1.2)?;
    let (f, expected) = sampled_bonded_fraction(bias, 37, 200_000)?;
    assert!((f - expected).abs() < 0.01, "sampled {f}, analytic {expected}");
    Ok(())
}
