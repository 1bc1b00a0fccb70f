//! TOML configuration for the event-driven and Monte Carlo drivers.

use crate::association::BiasVolume;
use crate::bonding::{InteractionTable, SquareWell};
use crate::core::particle::DIM;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

fn default_mass() -> f64 {
    1.0
}

fn default_max_speed() -> f64 {
    1.0
}

fn default_temperature() -> f64 {
    1.0
}

fn default_max_degree() -> usize {
    1
}

fn default_step() -> f64 {
    0.5
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeciesConfig {
    pub count: usize,
    #[serde(default = "default_mass")]
    pub mass: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InteractionConfig {
    pub species: [u32; 2],
    pub core: f64,
    pub well: f64,
    pub epsilon: f64,
}

/// Event-driven square-well run in a box with specular walls.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EdmdConfig {
    pub box_size: [f64; DIM],
    #[serde(default)]
    pub seed: Option<u64>,
    pub species: Vec<SpeciesConfig>,
    pub interactions: Vec<InteractionConfig>,
    /// Initial velocity components are drawn from `[-max_speed, max_speed]`.
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
}

impl EdmdConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn num_particles(&self) -> usize {
        self.species.iter().map(|s| s.count).sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.species.is_empty() || self.num_particles() == 0 {
            return Err(Error::InvalidParam("at least one particle is required".into()));
        }
        if !self.box_size.iter().all(|&l| l.is_finite() && l > 0.0) {
            return Err(Error::InvalidParam(
                "box_size components must be finite and > 0".into(),
            ));
        }
        if self.species.iter().any(|s| !s.mass.is_finite() || s.mass <= 0.0) {
            return Err(Error::InvalidParam("species mass must be finite and > 0".into()));
        }
        if !self.max_speed.is_finite() || self.max_speed < 0.0 {
            return Err(Error::InvalidParam("max_speed must be finite and >= 0".into()));
        }
        self.interaction_table().map(|_| ())
    }

    /// Build and check the species-pair kernel table.
    pub fn interaction_table(&self) -> Result<InteractionTable> {
        let mut table = InteractionTable::new(self.species.len());
        for ic in &self.interactions {
            let well = SquareWell::new(ic.core, ic.well, ic.epsilon)?;
            table.set(ic.species[0], ic.species[1], well)?;
        }
        table.validate()?;
        Ok(table)
    }
}

/// Serialized form of a bias volume; angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum BiasVolumeConfig {
    Cube { half_width: f64 },
    Sphere { inner: f64, outer: f64 },
    OrientedSphere { inner: f64, outer: f64, half_angle_deg: f64 },
}

impl BiasVolumeConfig {
    pub fn build(&self) -> Result<BiasVolume> {
        match *self {
            BiasVolumeConfig::Cube { half_width } => BiasVolume::cube(half_width),
            BiasVolumeConfig::Sphere { inner, outer } => BiasVolume::sphere(inner, outer),
            BiasVolumeConfig::OrientedSphere {
                inner,
                outer,
                half_angle_deg,
            } => BiasVolume::oriented_sphere(inner, outer, half_angle_deg.to_radians()),
        }
    }
}

/// Relative selection weights of the MC moves.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MoveWeights {
    #[serde(default = "default_weight")]
    pub biased_bond: f64,
    #[serde(default)]
    pub displace: f64,
    #[serde(default)]
    pub rotate: f64,
    /// Rigid translation of a whole cluster, with step `displace_step`.
    #[serde(default)]
    pub smer_translate: f64,
    /// Rigid rotation of a whole cluster, with maximum angle `rotate_step`.
    #[serde(default)]
    pub smer_rotate: f64,
}

impl Default for MoveWeights {
    fn default() -> Self {
        Self {
            biased_bond: 1.0,
            displace: 0.0,
            rotate: 0.0,
            smer_translate: 0.0,
            smer_rotate: 0.0,
        }
    }
}

/// Continuum association Monte Carlo in a periodic box.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct McConfig {
    pub box_size: [f64; DIM],
    pub num_particles: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    pub epsilon: f64,
    /// Optional hard-core diameter; overlapping trials are rejected.
    #[serde(default)]
    pub core: Option<f64>,
    #[serde(default = "default_max_degree")]
    pub max_degree: usize,
    /// Largest cluster any trial may form.
    #[serde(default)]
    pub max_chain_length: Option<usize>,
    #[serde(default)]
    pub oriented: bool,
    pub bias: BiasVolumeConfig,
    #[serde(default)]
    pub moves: MoveWeights,
    #[serde(default = "default_step")]
    pub displace_step: f64,
    /// Maximum rotation angle in radians.
    #[serde(default = "default_step")]
    pub rotate_step: f64,
}

impl McConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_particles < 2 {
            return Err(Error::InvalidParam("num_particles must be >= 2".into()));
        }
        if !self.box_size.iter().all(|&l| l.is_finite() && l > 0.0) {
            return Err(Error::InvalidParam(
                "box_size components must be finite and > 0".into(),
            ));
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(Error::InvalidParam("temperature must be finite and > 0".into()));
        }
        if !self.epsilon.is_finite() {
            return Err(Error::InvalidParam("epsilon must be finite".into()));
        }
        if let Some(core) = self.core {
            if !core.is_finite() || core <= 0.0 {
                return Err(Error::InvalidParam("core must be finite and > 0".into()));
            }
        }
        if self.max_degree == 0 {
            return Err(Error::InvalidParam("max_degree must be >= 1".into()));
        }
        if self.max_chain_length.is_some_and(|m| m < 2) {
            return Err(Error::InvalidParam("max_chain_length must be >= 2".into()));
        }
        let bias = self.bias.build()?;
        if bias.needs_orientation() && !self.oriented {
            return Err(Error::InvalidParam(
                "oriented_sphere bias volume requires oriented = true".into(),
            ));
        }
        let w = self.moves;
        let all = [w.biased_bond, w.displace, w.rotate, w.smer_translate, w.smer_rotate];
        if all.iter().any(|x| !x.is_finite() || *x < 0.0) || all.iter().sum::<f64>() <= 0.0
        {
            return Err(Error::InvalidParam(
                "move weights must be non-negative with a positive sum".into(),
            ));
        }
        if w.rotate > 0.0 && !self.oriented {
            return Err(Error::InvalidParam("rotate moves need oriented particles".into()));
        }
        if !(self.displace_step > 0.0) || !(self.rotate_step > 0.0) {
            return Err(Error::InvalidParam("step sizes must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDMD: &str = r#"
box_size = [10.0, 10.0, 10.0]
seed = 7

[[species]]
count = 10

[[species]]
count = 5
mass = 2.0

[[interactions]]
species = [0, 0]
core = 0.5
well = 1.0
epsilon = 1.0

[[interactions]]
species = [0, 1]
core = 0.5
well = 1.2
epsilon = 2.0

[[interactions]]
species = [1, 1]
core = 0.5
well = 1.0
epsilon = 0.5
"#;

    #[test]
    fn parses_edmd_config() -> Result<()> {
        let cfg = EdmdConfig::from_toml_str(EDMD)?;
        assert_eq!(cfg.num_particles(), 15);
        assert_eq!(cfg.species[1].mass, 2.0);
        assert_eq!(cfg.max_speed, 1.0);
        let table = cfg.interaction_table()?;
        assert_eq!(table.get(1, 0)?.epsilon(), 2.0);
        Ok(())
    }

    #[test]
    fn missing_interaction_is_rejected() {
        let trimmed = EDMD.replace("species = [1, 1]", "species = [0, 0]");
        assert!(EdmdConfig::from_toml_str(&trimmed).is_err());
    }

    #[test]
    fn parses_tagged_bias_volume() -> Result<()> {
        let cfg = McConfig::from_toml_str(
            r#"
box_size = [8.0, 8.0, 8.0]
num_particles = 20
epsilon = 3.0
oriented = true
max_degree = 2

[bias]
shape = "oriented_sphere"
inner = 0.8
outer = 1.0
half_angle_deg = 30.0

[moves]
biased_bond = 1.0
rotate = 0.5
"#,
        )?;
        assert_eq!(cfg.temperature, 1.0);
        assert_eq!(cfg.moves.displace, 0.0);
        match cfg.bias.build()? {
            BiasVolume::OrientedSphere { half_angle, .. } => {
                assert!((half_angle - 30.0_f64.to_radians()).abs() < 1e-12)
            }
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn oriented_bias_requires_oriented_particles() {
        let res = McConfig::from_toml_str(
            r#"
box_size = [8.0, 8.0, 8.0]
num_particles = 20
epsilon = 3.0

[bias]
shape = "oriented_sphere"
inner = 0.8
outer = 1.0
half_angle_deg = 30.0
"#,
        );
        assert!(matches!(res, Err(Error::InvalidParam(_))));
    }

    #[test]
    fn chain_cap_and_cluster_moves_parse() -> Result<()> {
        let text = r#"
box_size = [8.0, 8.0, 8.0]
num_particles = 20
epsilon = 3.0
max_degree = 2
max_chain_length = 4

[bias]
shape = "sphere"
inner = 0.8
outer = 1.0

[moves]
smer_translate = 0.5
smer_rotate = 0.25
"#;
        let cfg = McConfig::from_toml_str(text)?;
        assert_eq!(cfg.max_chain_length, Some(4));
        assert_eq!(cfg.moves.biased_bond, 1.0);
        assert_eq!(cfg.moves.smer_rotate, 0.25);

        let too_short = text.replace("max_chain_length = 4", "max_chain_length = 1");
        assert!(matches!(
            McConfig::from_toml_str(&too_short),
            Err(Error::InvalidParam(_))
        ));
        Ok(())
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let res = McConfig::from_toml_str("box_size = [1.0, 2.0");
        assert!(matches!(res, Err(Error::Config(_))));
    }
}
