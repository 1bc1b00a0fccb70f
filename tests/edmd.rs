use bondsim::association::SpeciesComposition;
use bondsim::config::EdmdConfig;
use bondsim::core::Simulation;
use bondsim::error::Result;
use std::io::Write;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const ONE_SPECIES: &str = r#"
box_size = [8.0, 8.0, 8.0]
seed = 12345

[[species]]
count = 64

[[interactions]]
species = [0, 0]
core = 0.5
well = 0.8
epsilon = 0.5
"#;

/// Total energy (kinetic plus bond energy) is conserved across captures and escapes.
#[test]
fn total_energy_conservation() -> Result<()> {
    init_tracing();
    let cfg = EdmdConfig::from_toml_str(ONE_SPECIES)?;
    let mut sim = Simulation::new(&cfg)?;
    let e0 = sim.total_energy();
    let scale = sim.kinetic_energy();

    let t_end = 40.0;
    let steps = 200;
    for s in 1..=steps {
        let t = t_end * (s as f64) / (steps as f64);
        sim.advance_to(t)?;
    }

    let e1 = sim.total_energy();
    let rel = ((e1 - e0) / scale).abs();
    assert!(
        rel < 1e-8,
        "relative energy drift {} too large (E0={}, E1={})",
        rel,
        e0,
        e1
    );
    let counts = sim.event_counts();
    assert!(counts.captures > 0, "no capture in {counts:?}");
    assert!(counts.escapes > 0, "no escape in {counts:?}");
    assert!(counts.core_bounces > 0);
    Ok(())
}

/// The bond table stays symmetric, bonded pairs stay inside their wells and cores never
/// overlap throughout a long run.
#[test]
fn invariants_hold_along_trajectory() -> Result<()> {
    let cfg = EdmdConfig::from_toml_str(ONE_SPECIES)?;
    let mut sim = Simulation::new(&cfg)?;
    sim.check_invariants()?;
    for s in 1..=100 {
        sim.advance_to(0.25 * s as f64)?;
        sim.check_invariants()?;
        let bonds = sim.bonds();
        for i in 0..sim.num_particles() {
            if let Some(j) = bonds.partner(i) {
                assert_eq!(bonds.partner(j), Some(i));
            }
        }
    }
    Ok(())
}

/// Rebuilding the queue mid-run re-derives bonds from geometry and keeps going.
#[test]
fn rebuild_event_queue_mid_run() -> Result<()> {
    let cfg = EdmdConfig::from_toml_str(ONE_SPECIES)?;
    let mut sim = Simulation::new(&cfg)?;
    sim.advance_to(5.0)?;
    sim.rebuild_event_queue()?;
    sim.check_invariants()?;
    let e0 = sim.total_energy();
    sim.advance_to(10.0)?;
    sim.check_invariants()?;
    assert!(((sim.total_energy() - e0) / sim.kinetic_energy()).abs() < 1e-8);
    Ok(())
}

/// Wall pressure and collision virial accumulate once time has elapsed.
#[test]
fn pressure_bookkeeping() -> Result<()> {
    let cfg = EdmdConfig::from_toml_str(ONE_SPECIES)?;
    let mut sim = Simulation::new(&cfg)?;
    sim.advance_to(20.0)?;
    let p = sim.wall_pressure()?;
    assert!(p.is_finite() && p > 0.0);
    assert!(sim.virial_sum().is_finite());
    assert!(sim.event_counts().wall_hits > 0);
    Ok(())
}

/// Two species with different AA, AB and BB wells, loaded from a file, conserve energy and
/// report species-resolved dimer fractions that add up with the monomers.
#[test]
fn two_species_from_file() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"
box_size = [9.0, 9.0, 9.0]
seed = 99
max_speed = 1.5

[[species]]
count = 30

[[species]]
count = 30
mass = 2.0

[[interactions]]
species = [0, 0]
core = 0.5
well = 0.7
epsilon = 0.3

[[interactions]]
species = [0, 1]
core = 0.5
well = 0.9
epsilon = 1.0

[[interactions]]
species = [1, 1]
core = 0.5
well = 0.7
epsilon = 0.3
"#
    )?;
    let cfg = EdmdConfig::from_path(file.path())?;
    let mut sim = Simulation::new(&cfg)?;
    let e0 = sim.total_energy();
    sim.advance_to(30.0)?;
    sim.check_invariants()?;
    assert!(((sim.total_energy() - e0) / sim.kinetic_energy()).abs() < 1e-8);

    let comp = SpeciesComposition::measure(&sim.particles, sim.bonds())?;
    let total: f64 = comp.monomer_fraction(0)
        + comp.monomer_fraction(1)
        + comp.dimer_fraction(0, 0)
        + comp.dimer_fraction(0, 1)
        + comp.dimer_fraction(1, 1);
    assert!((total - 1.0).abs() < 1e-12);
    assert_eq!(
        comp.molecules(),
        sim.num_particles() - sim.bonds().num_bonds()
    );
    Ok(())
}
