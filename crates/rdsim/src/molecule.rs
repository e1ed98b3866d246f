//! Molecule records.
//!
//! Molecules live in one flat table owned by the partition, indexed by a
//! stable id that is never reused. A consumed molecule stays in the table
//! as a defunct tombstone so that ids held elsewhere (tiles, reactant sets,
//! queued actions) can always be resolved.

use glam::{DVec2, DVec3};

use crate::species::SpeciesId;
use crate::wall::WallIndex;

pub type MoleculeId = usize;

pub const MOLECULE_ID_INVALID: MoleculeId = usize::MAX;

/// Spatial state: free in the volume, or bound to a wall tile.
#[derive(Clone, Copy, Debug)]
pub enum MoleculeState {
    Volume {
        pos: DVec3,
    },
    Surface {
        wall: WallIndex,
        tile: usize,
        /// Position in the wall's local frame.
        uv: DVec2,
        /// Which side of the wall the molecule faces (+1 front, -1 back).
        orientation: i8,
    },
}

/// One molecule.
#[derive(Clone, Debug)]
pub struct Molecule {
    pub id: MoleculeId,
    pub species_id: SpeciesId,
    /// Subpartition containing the molecule's 3D position.
    pub subpart_index: usize,
    /// Absolute time of the scheduled unimolecular reaction, if any.
    pub unimol_rx_time: Option<f64>,
    /// Whether the unimolecular clock has been sampled yet. Freshly created
    /// molecules have not; their first diffusion step samples it.
    pub unimol_scheduled: bool,
    /// Tombstone flag; set when a reaction consumes the molecule.
    pub defunct: bool,
    pub state: MoleculeState,
}

impl Molecule {
    pub fn new_volume(id: MoleculeId, species_id: SpeciesId, subpart_index: usize, pos: DVec3) -> Self {
        Self {
            id,
            species_id,
            subpart_index,
            unimol_rx_time: None,
            unimol_scheduled: false,
            defunct: false,
            state: MoleculeState::Volume { pos },
        }
    }

    pub fn new_surface(
        id: MoleculeId,
        species_id: SpeciesId,
        subpart_index: usize,
        wall: WallIndex,
        tile: usize,
        uv: DVec2,
        orientation: i8,
    ) -> Self {
        Self {
            id,
            species_id,
            subpart_index,
            unimol_rx_time: None,
            unimol_scheduled: false,
            defunct: false,
            state: MoleculeState::Surface {
                wall,
                tile,
                uv,
                orientation,
            },
        }
    }

    #[inline]
    pub fn is_volume(&self) -> bool {
        matches!(self.state, MoleculeState::Volume { .. })
    }

    #[inline]
    pub fn is_surface(&self) -> bool {
        matches!(self.state, MoleculeState::Surface { .. })
    }

    #[inline]
    pub fn is_defunct(&self) -> bool {
        self.defunct
    }

    /// Volume position; panics for surface molecules (callers dispatch on
    /// the state first).
    #[inline]
    pub fn pos(&self) -> DVec3 {
        match self.state {
            MoleculeState::Volume { pos } => pos,
            MoleculeState::Surface { .. } => {
                panic!("pos() called on surface molecule {}", self.id)
            }
        }
    }

    /// Surface state as a tuple; panics for volume molecules.
    #[inline]
    pub fn surface_state(&self) -> (WallIndex, usize, DVec2, i8) {
        match self.state {
            MoleculeState::Surface {
                wall,
                tile,
                uv,
                orientation,
            } => (wall, tile, uv, orientation),
            MoleculeState::Volume { .. } => {
                panic!("surface_state() called on volume molecule {}", self.id)
            }
        }
    }
}
