//! Species definitions and the species table.

use serde::{Deserialize, Serialize};

use crate::error::SimError;

pub type SpeciesId = usize;

/// Matches any molecule in surface-class reactions.
pub const ALL_MOLECULES: SpeciesId = 0;
/// Matches any volume molecule in surface-class reactions.
pub const ALL_VOLUME_MOLECULES: SpeciesId = 1;
/// Matches any surface molecule in surface-class reactions.
pub const ALL_SURFACE_MOLECULES: SpeciesId = 2;

const NUM_RESERVED_SPECIES: usize = 3;

/// One molecular species.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Species {
    pub id: SpeciesId,
    pub name: String,
    /// Diffusion constant (cm²/s).
    pub d: f64,
    /// Per-species timestep (s): `time_step_factor · base_time_step`.
    pub time_step: f64,
    /// Space step sigma (cm): `sqrt(4 · D · time_step)`, chosen so that the
    /// per-component displacement `sigma · N(0,1) / sqrt(2)` reproduces
    /// ⟨r²⟩ = 6·D·t in free diffusion.
    pub space_step: f64,
    pub is_surface: bool,
    /// Multiplies the base timestep for slow observables.
    pub time_step_factor: f64,
}

impl Species {
    #[inline]
    pub fn is_volume(&self) -> bool {
        !self.is_surface
    }

    #[inline]
    pub fn can_diffuse(&self) -> bool {
        self.d > 0.0
    }
}

/// All species of a run, reserved wildcard ids included.
///
/// Read-only once the world is initialized.
#[derive(Clone, Debug, Default)]
pub struct SpeciesTable {
    species: Vec<Species>,
}

impl SpeciesTable {
    /// Create a table holding only the three reserved wildcard ids.
    pub fn new() -> Self {
        let mut table = Self {
            species: Vec::new(),
        };
        for (id, name, is_surface) in [
            (ALL_MOLECULES, "ALL_MOLECULES", false),
            (ALL_VOLUME_MOLECULES, "ALL_VOLUME_MOLECULES", false),
            (ALL_SURFACE_MOLECULES, "ALL_SURFACE_MOLECULES", true),
        ] {
            table.species.push(Species {
                id,
                name: name.to_string(),
                d: 0.0,
                time_step: 0.0,
                space_step: 0.0,
                is_surface,
                time_step_factor: 1.0,
            });
        }
        table
    }

    /// Add a species, deriving its timestep and space step.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        d: f64,
        is_surface: bool,
        time_step_factor: f64,
        base_time_step: f64,
    ) -> Result<SpeciesId, SimError> {
        if d < 0.0 {
            return Err(SimError::config(format!(
                "negative diffusion constant for species: {}",
                d
            )));
        }
        if time_step_factor <= 0.0 {
            return Err(SimError::config("time_step_factor must be positive"));
        }
        let id = self.species.len();
        let time_step = time_step_factor * base_time_step;
        self.species.push(Species {
            id,
            name: name.into(),
            d,
            time_step,
            space_step: (4.0 * d * time_step).sqrt(),
            is_surface,
            time_step_factor,
        });
        Ok(id)
    }

    #[inline]
    pub fn get(&self, id: SpeciesId) -> &Species {
        &self.species[id]
    }

    pub fn find_by_name(&self, name: &str) -> Option<SpeciesId> {
        self.species.iter().find(|s| s.name == name).map(|s| s.id)
    }

    /// Iterate over user species (skipping the reserved wildcard ids).
    pub fn user_species(&self) -> impl Iterator<Item = &Species> {
        self.species.iter().skip(NUM_RESERVED_SPECIES)
    }

    #[inline]
    pub fn is_reserved(id: SpeciesId) -> bool {
        id < NUM_RESERVED_SPECIES
    }

    /// Does `pattern` (a concrete id or a reserved wildcard) match a
    /// molecule of species `actual`?
    pub fn matches(&self, pattern: SpeciesId, actual: SpeciesId) -> bool {
        match pattern {
            ALL_MOLECULES => true,
            ALL_VOLUME_MOLECULES => self.get(actual).is_volume(),
            ALL_SURFACE_MOLECULES => self.get(actual).is_surface,
            concrete => concrete == actual,
        }
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }
}
