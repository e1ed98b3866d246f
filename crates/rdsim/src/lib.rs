//! Particle-based stochastic reaction-diffusion simulation for cellular
//! microphysiology.
//!
//! Point molecules diffuse by Brownian motion inside a 3D box containing
//! triangulated mesh objects; when molecules come within an interaction
//! radius of each other, or when a volume molecule crosses a reactive
//! surface, reactions fire stochastically. The simulator advances in
//! discrete timesteps and produces molecule trajectories and reaction
//! records through an observer interface.
//!
//! # Example
//!
//! ```
//! use rdsim::{DVec3, SimConfig, World};
//!
//! let mut world = World::new(SimConfig::default()).unwrap();
//! let a = world.add_species("A", 1e-6, false).unwrap();
//! world.add_volume_molecule(a, DVec3::splat(0.5)).unwrap();
//!
//! world.run_iterations(10).unwrap();
//! assert_eq!(world.count_species(a), 1);
//! ```

pub mod collide;
pub mod config;
pub mod constants;
pub mod containment;
mod diffuse;
pub mod error;
pub mod geom;
pub mod molecule;
pub mod object;
pub mod output;
pub mod partition;
mod react;
pub mod reaction;
pub mod release;
pub mod rng;
pub mod scheduler;
pub mod species;
pub mod stats;
mod subpart_walk;
mod surface;
pub mod wall;
pub mod world;

pub use config::SimConfig;
pub use error::SimError;
pub use glam::{DVec2, DVec3};
pub use molecule::{Molecule, MoleculeId, MoleculeState};
pub use object::{GeometryObject, MeshInput, ObjectId, Region, RegionId, RegionInput};
pub use output::{MemoryObserver, MoleculeSnapshot, ReactionKind, ReactionRecord, SimObserver};
pub use reaction::{Pathway, Product, RxnClass, RxnType};
pub use release::{ReleaseShape, ReleaseSite};
pub use species::{
    SpeciesId, ALL_MOLECULES, ALL_SURFACE_MOLECULES, ALL_VOLUME_MOLECULES,
};
pub use world::World;
