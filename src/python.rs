use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::association::{AssociationFractions, SpeciesComposition};
use crate::config::EdmdConfig;
use crate::core::particle::DIM;
use crate::core::Simulation;

fn py_err<E: ToString>(e: E) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn to_array(rows: &[[f64; DIM]]) -> Array2<f64> {
    let mut arr = Array2::<f64>::zeros((rows.len(), DIM));
    for (i, row) in rows.iter().enumerate() {
        for k in 0..DIM {
            arr[[i, k]] = row[k];
        }
    }
    arr
}

/// BondedGas Python-facing wrapper around the square-well Simulation.
///
/// - BondedGas.from_toml(text) / BondedGas.from_file(path)
/// - advance_to(time)
/// - get_positions(), get_velocities() -> np.ndarray, shape (N, 3)
/// - partners() -> list[int | None]
/// - energies() -> (kinetic, potential, total)
#[pyclass]
pub struct BondedGas {
    sim: Simulation,
}

#[pymethods]
impl BondedGas {
    /// Build from a TOML configuration string.
    #[staticmethod]
    fn from_toml(text: &str) -> PyResult<Self> {
        let cfg = EdmdConfig::from_toml_str(text).map_err(py_err)?;
        let sim = Simulation::new(&cfg).map_err(py_err)?;
        Ok(Self { sim })
    }

    /// Build from a TOML configuration file.
    #[staticmethod]
    fn from_file(path: &str) -> PyResult<Self> {
        let cfg = EdmdConfig::from_path(path).map_err(py_err)?;
        let sim = Simulation::new(&cfg).map_err(py_err)?;
        Ok(Self { sim })
    }

    /// Advance to an absolute time (releases the GIL during computation).
    fn advance_to(&mut self, py: Python<'_>, target_time: f64) -> PyResult<()> {
        py.detach(|| self.sim.advance_to(target_time))
            .map_err(py_err)
    }

    fn time(&self) -> f64 {
        self.sim.time()
    }

    fn get_positions(&self, py: Python<'_>) -> PyResult<Py<PyArray2<f64>>> {
        Ok(to_array(&self.sim.positions()).into_pyarray(py).to_owned().into())
    }

    fn get_velocities(&self, py: Python<'_>) -> PyResult<Py<PyArray2<f64>>> {
        Ok(to_array(&self.sim.velocities()).into_pyarray(py).to_owned().into())
    }

    /// Replace all positions, then rebuild bonds and events from the new geometry.
    fn set_positions<'py>(&mut self, positions: PyReadonlyArray2<'py, f64>) -> PyResult<()> {
        let arr = positions.as_array();
        let n = self.sim.num_particles();
        if arr.shape() != [n, DIM] {
            return Err(py_err(format!(
                "positions must have shape ({n}, {DIM}), got {:?}",
                arr.shape()
            )));
        }
        for i in 0..n {
            let mut r = [0.0; DIM];
            for k in 0..DIM {
                r[k] = arr[[i, k]];
            }
            self.sim.particles[i].set_position(r).map_err(py_err)?;
        }
        self.sim.rebuild_event_queue().map_err(py_err)
    }

    /// Replace all velocities, then rebuild bonds and events.
    fn set_velocities<'py>(&mut self, velocities: PyReadonlyArray2<'py, f64>) -> PyResult<()> {
        let arr = velocities.as_array();
        let n = self.sim.num_particles();
        if arr.shape() != [n, DIM] {
            return Err(py_err(format!(
                "velocities must have shape ({n}, {DIM}), got {:?}",
                arr.shape()
            )));
        }
        for i in 0..n {
            let mut v = [0.0; DIM];
            for k in 0..DIM {
                v[k] = arr[[i, k]];
            }
            self.sim.particles[i].set_velocity(v).map_err(py_err)?;
        }
        self.sim.rebuild_event_queue().map_err(py_err)
    }

    /// Fraction of particles currently bonded.
    fn bonded_fraction(&self) -> f64 {
        AssociationFractions::from_bonds(self.sim.bonds()).dimer
    }

    /// Bond partner of every particle.
    fn partners(&self) -> Vec<Option<usize>> {
        (0..self.sim.num_particles())
            .map(|i| self.sim.bonds().partner(i))
            .collect()
    }

    /// (kinetic, potential, total)
    fn energies(&self) -> (f64, f64, f64) {
        (
            self.sim.kinetic_energy(),
            self.sim.potential_energy(),
            self.sim.total_energy(),
        )
    }

    /// Fraction of molecules that are dimers of species pair (a, b).
    fn dimer_fraction(&self, a: u32, b: u32) -> PyResult<f64> {
        let c = SpeciesComposition::measure(&self.sim.particles, self.sim.bonds()).map_err(py_err)?;
        Ok(c.dimer_fraction(a, b))
    }

    fn virial_sum(&self) -> f64 {
        self.sim.virial_sum()
    }

    fn wall_pressure(&self) -> PyResult<f64> {
        self.sim.wall_pressure().map_err(py_err)
    }

    fn check_invariants(&self) -> PyResult<()> {
        self.sim.check_invariants().map_err(py_err)
    }
}

/// The bondsim Python module entry point.
#[pymodule]
fn bondsim(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<BondedGas>()?;
    Ok(())
}
