//! Simulation configuration.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{
    DEFAULT_MAX_COLLISION_REDOS, DEFAULT_MAX_REFLECTIONS, DEFAULT_MAX_SURFACE_CROSSINGS,
};
use crate::error::SimError;

/// All tunable knobs of a run.
///
/// Lengths are in cm, times in seconds, diffusion constants in cm²/s.
/// Validated once by [`SimConfig::validate`] before the world is built;
/// read-only afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// RNG seed. Identical seed + inputs reproduce a run bit-exactly.
    pub seed: u64,
    /// Base timestep (s). Per-species timesteps are multiples of this.
    pub base_time_step: f64,
    /// Side length of the cubic simulation box (cm).
    pub partition_edge_length: f64,
    /// Lower-left-front corner of the box.
    pub partition_origin: DVec3,
    /// Number of subpartitions along each axis.
    pub num_subpartitions_per_partition: usize,
    /// Volume-volume interaction radius sigma (cm).
    pub rx_radius_3d: f64,
    /// Inflate wall-subpartition registration by the interaction radius so
    /// that no near-wall collision candidate is ever missed.
    pub use_expanded_list: bool,
    /// Squared distance within which a surface product may be placed on a
    /// neighboring tile when its target tile is occupied.
    pub vacancy_search_dist2: f64,
    /// Place surface products uniformly within their tile instead of at the
    /// tile centroid.
    pub randomize_smol_pos: bool,
    /// Tiles per unit wall area; a wall's grid edge count is
    /// ceil(sqrt(area * density)).
    pub surface_grid_density: f64,
    /// Emit a molecule snapshot to observers every this many iterations.
    pub viz_output_period: Option<u64>,
    /// Cap on wall reflections within one diffusion step.
    pub max_reflections: usize,
    /// Cap on collision-test restarts (REDO) per diffusion step.
    pub max_collision_redos: usize,
    /// Cap on wall-to-wall traversals within one surface step.
    pub max_surface_crossings: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            base_time_step: 1e-6,
            partition_edge_length: 1.0,
            partition_origin: DVec3::ZERO,
            num_subpartitions_per_partition: 10,
            rx_radius_3d: 1e-3,
            use_expanded_list: true,
            vacancy_search_dist2: 1e-4,
            randomize_smol_pos: true,
            surface_grid_density: 1e4,
            viz_output_period: None,
            max_reflections: DEFAULT_MAX_REFLECTIONS,
            max_collision_redos: DEFAULT_MAX_COLLISION_REDOS,
            max_surface_crossings: DEFAULT_MAX_SURFACE_CROSSINGS,
        }
    }
}

impl SimConfig {
    /// Side length of one cubic subpartition.
    pub fn subpartition_edge_length(&self) -> f64 {
        self.partition_edge_length / self.num_subpartitions_per_partition as f64
    }

    /// Check internal consistency. Called once when the world is built.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.base_time_step <= 0.0 {
            return Err(SimError::config(format!(
                "base_time_step must be positive, got {}",
                self.base_time_step
            )));
        }
        if self.partition_edge_length <= 0.0 {
            return Err(SimError::config(format!(
                "partition_edge_length must be positive, got {}",
                self.partition_edge_length
            )));
        }
        if self.num_subpartitions_per_partition == 0 {
            return Err(SimError::config(
                "num_subpartitions_per_partition must be at least 1",
            ));
        }
        if self.rx_radius_3d < 0.0 {
            return Err(SimError::config(format!(
                "rx_radius_3d must be non-negative, got {}",
                self.rx_radius_3d
            )));
        }
        // Candidate gathering assumes a molecule's interaction disk never
        // spans more than one subpartition boundary per axis.
        if self.subpartition_edge_length() <= self.rx_radius_3d {
            return Err(SimError::config(format!(
                "subpartition edge {} must exceed rx_radius_3d {}",
                self.subpartition_edge_length(),
                self.rx_radius_3d
            )));
        }
        if self.vacancy_search_dist2 < 0.0 {
            return Err(SimError::config(
                "vacancy_search_dist2 must be non-negative",
            ));
        }
        if self.surface_grid_density <= 0.0 {
            return Err(SimError::config("surface_grid_density must be positive"));
        }
        Ok(())
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}
