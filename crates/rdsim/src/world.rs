//! The world: configuration, catalogues, partition, RNG and the event
//! loop.
//!
//! The world owns every piece of mutable run state. Events come off a
//! bucketed calendar one at a time and run to completion; the catalogues
//! are read-only while an event runs. All stochastic decisions draw from
//! the world's single seeded RNG in a fixed order, so a seed reproduces a
//! run exactly.

use glam::{DVec2, DVec3};

use crate::config::SimConfig;
use crate::diffuse::{run_diffuse_react_event, StepCtx};
use crate::error::SimError;
use crate::molecule::{MoleculeId, MoleculeState};
use crate::object::{MeshInput, ObjectId, RegionId};
use crate::output::{MoleculeSnapshot, ReactionRecord, SimObserver};
use crate::partition::Partition;
use crate::reaction::{Pathway, ReactionTable, RxnClassId, RxnType};
use crate::release::{execute_release, ReleaseShape, ReleaseSite};
use crate::rng::SimRng;
use crate::scheduler::Calendar;
use crate::species::{SpeciesId, SpeciesTable};
use crate::stats::SimStats;
use crate::wall::WallIndex;

/// A calendar-scheduled event.
#[derive(Clone, Copy, Debug)]
enum SimEvent {
    /// Diffuse and react all molecules of one timestep class.
    DiffuseReact { ts_index: usize },
    Release { site_index: usize },
}

/// The complete simulation state.
pub struct World {
    pub config: SimConfig,
    pub species: SpeciesTable,
    pub reactions: ReactionTable,
    pub partition: Partition,
    pub stats: SimStats,
    rng: SimRng,
    calendar: Calendar<SimEvent>,
    release_sites: Vec<ReleaseSite>,
    observers: Vec<Box<dyn SimObserver>>,
    records: Vec<ReactionRecord>,
    /// Timestep classes that already have a recurring diffuse event.
    scheduled_ts_classes: usize,
    current_iteration: u64,
    initialized: bool,
}

impl World {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let partition = Partition::new(&config);
        let rng = SimRng::new(config.seed);
        let calendar = Calendar::new(config.base_time_step);
        Ok(Self {
            config,
            species: SpeciesTable::new(),
            reactions: ReactionTable::new(),
            partition,
            stats: SimStats::default(),
            rng,
            calendar,
            release_sites: Vec::new(),
            observers: Vec::new(),
            records: Vec::new(),
            scheduled_ts_classes: 0,
            current_iteration: 0,
            initialized: false,
        })
    }

    // ---------- model building ----------

    /// Add a species with the default timestep factor.
    pub fn add_species(
        &mut self,
        name: impl Into<String>,
        d: f64,
        is_surface: bool,
    ) -> Result<SpeciesId, SimError> {
        self.add_species_with_time_step(name, d, is_surface, 1.0)
    }

    pub fn add_species_with_time_step(
        &mut self,
        name: impl Into<String>,
        d: f64,
        is_surface: bool,
        time_step_factor: f64,
    ) -> Result<SpeciesId, SimError> {
        self.species
            .add(name, d, is_surface, time_step_factor, self.config.base_time_step)
    }

    pub fn add_geometry(&mut self, mesh: MeshInput) -> Result<ObjectId, SimError> {
        self.partition.add_geometry(mesh)
    }

    pub fn add_unimolecular_reaction(
        &mut self,
        species: SpeciesId,
        pathways: Vec<Pathway>,
    ) -> Result<RxnClassId, SimError> {
        self.reactions.add_unimolecular(species, pathways)
    }

    pub fn add_bimolecular_reaction(
        &mut self,
        a: SpeciesId,
        b: SpeciesId,
        rxn_type: RxnType,
        pathways: Vec<Pathway>,
    ) -> Result<RxnClassId, SimError> {
        self.reactions.add_bimolecular(a, b, rxn_type, pathways)
    }

    pub fn set_variable_rates(
        &mut self,
        class: RxnClassId,
        schedule: Vec<(f64, f64)>,
    ) -> Result<(), SimError> {
        self.reactions.set_variable_rates(class, schedule)
    }

    pub fn add_release_site(&mut self, site: ReleaseSite) -> Result<(), SimError> {
        let species = self.species.get(site.species_id);
        let surface_shape = matches!(site.shape, ReleaseShape::SurfaceRegion(_));
        if species.is_surface != surface_shape {
            return Err(SimError::config(format!(
                "release '{}': species '{}' does not match the release shape",
                site.name, species.name
            )));
        }
        if site.time < 0.0 {
            return Err(SimError::config("release time must be non-negative"));
        }
        self.release_sites.push(site);
        Ok(())
    }

    pub fn add_observer(&mut self, observer: Box<dyn SimObserver>) {
        self.observers.push(observer);
    }

    /// Place one volume molecule directly (outside any release schedule).
    pub fn add_volume_molecule(
        &mut self,
        species: SpeciesId,
        pos: DVec3,
    ) -> Result<MoleculeId, SimError> {
        let species = self.species.get(species).clone();
        let id = self.partition.add_volume_molecule(&species, pos)?;
        self.sync_ts_classes(self.time());
        Ok(id)
    }

    /// Place one surface molecule directly at a wall-frame location.
    pub fn add_surface_molecule(
        &mut self,
        species: SpeciesId,
        wall: WallIndex,
        uv: DVec2,
        orientation: i8,
    ) -> Result<MoleculeId, SimError> {
        let species = self.species.get(species).clone();
        let grid = self.partition.get_or_create_grid(wall);
        let tile = grid.uv_to_tile(uv);
        if grid.occupant(tile).is_some() {
            return Err(SimError::config(format!(
                "tile {tile} on wall {wall} is already occupied"
            )));
        }
        let id = self
            .partition
            .add_surface_molecule(&species, wall, tile, uv, orientation)?;
        self.sync_ts_classes(self.time());
        Ok(id)
    }

    // ---------- queries ----------

    /// Simulation time in seconds (completed iterations times the base
    /// timestep).
    pub fn time(&self) -> f64 {
        self.current_iteration as f64 * self.config.base_time_step
    }

    pub fn iteration(&self) -> u64 {
        self.current_iteration
    }

    /// Live molecule count of one species.
    pub fn count_species(&self, species: SpeciesId) -> usize {
        self.partition.count_species(species)
    }

    /// (species, live count) for every user species.
    pub fn molecule_counts(&self) -> Vec<(SpeciesId, usize)> {
        self.species
            .user_species()
            .map(|s| (s.id, self.partition.count_species(s.id)))
            .collect()
    }

    /// Containment query against a closed object.
    pub fn is_point_inside_object(
        &mut self,
        object: ObjectId,
        point: DVec3,
    ) -> Result<bool, SimError> {
        crate::containment::is_point_inside_object(&self.partition, object, point, &mut self.rng)
    }

    /// Containment query against a region's object.
    pub fn is_point_inside_region(
        &mut self,
        region: RegionId,
        point: DVec3,
    ) -> Result<bool, SimError> {
        crate::containment::is_point_inside_region(&self.partition, region, point, &mut self.rng)
    }

    // ---------- event loop ----------

    /// Schedule the initial events. Called automatically by the first
    /// `run_iterations`.
    pub fn initialize(&mut self) -> Result<(), SimError> {
        if self.initialized {
            return Ok(());
        }
        self.config.validate()?;

        // releases first so same-time releases precede diffusion
        for i in 0..self.release_sites.len() {
            let time = self.release_sites[i].time;
            self.calendar.insert(time, SimEvent::Release { site_index: i });
        }

        // one timestep class (and one recurring diffuse event) per
        // distinct species timestep
        let time_steps: Vec<f64> = self.species.user_species().map(|s| s.time_step).collect();
        for dt in time_steps {
            self.partition.get_or_add_time_step_index(dt);
        }
        self.initialized = true;
        self.sync_ts_classes(0.0);

        if self.config.viz_output_period.is_some() {
            self.emit_viz();
        }
        Ok(())
    }

    /// Schedule diffuse events for timestep classes that appeared since the
    /// last check (new species seen through molecule creation mid-run).
    /// Before initialization nothing is filed; `initialize` schedules the
    /// backlog after the release events so same-time releases come first.
    fn sync_ts_classes(&mut self, from_time: f64) {
        if !self.initialized {
            return;
        }
        while self.scheduled_ts_classes < self.partition.num_time_step_classes() {
            let ts_index = self.scheduled_ts_classes;
            let dt = self.partition.time_step_value(ts_index);
            // first firing at the next multiple of dt not before from_time
            let k = (from_time / dt - 1e-9).ceil().max(0.0);
            self.calendar
                .insert(k * dt, SimEvent::DiffuseReact { ts_index });
            self.scheduled_ts_classes += 1;
        }
    }

    /// Advance the simulation by `n` base timesteps.
    pub fn run_iterations(&mut self, n: u64) -> Result<(), SimError> {
        self.initialize()?;
        let dt = self.config.base_time_step;
        let end_iteration = self.current_iteration + n;

        while self.current_iteration < end_iteration {
            let iter_end = (self.current_iteration + 1) as f64 * dt;
            // everything scheduled strictly before the iteration boundary
            while let Some(t) = self.calendar.next_time() {
                if t >= iter_end - dt * 1e-9 {
                    break;
                }
                let (time, event) = self.calendar.pop_next().expect("next_time saw an item");
                self.execute_event(time, event)?;
            }
            self.current_iteration += 1;
            if let Some(period) = self.config.viz_output_period {
                if self.current_iteration % period == 0 {
                    self.emit_viz();
                }
            }
        }
        Ok(())
    }

    fn execute_event(&mut self, time: f64, event: SimEvent) -> Result<(), SimError> {
        match event {
            SimEvent::DiffuseReact { ts_index } => {
                for species in self.reactions.update_variable_rates(time) {
                    self.partition.reset_unimol_clocks(species);
                }
                let ts_value = self.partition.time_step_value(ts_index);
                let mut ctx = StepCtx {
                    partition: &mut self.partition,
                    species: &self.species,
                    reactions: &self.reactions,
                    rng: &mut self.rng,
                    stats: &mut self.stats,
                    config: &self.config,
                    records: &mut self.records,
                };
                run_diffuse_react_event(&mut ctx, time, ts_value, ts_index)?;
                self.calendar
                    .insert(time + ts_value, SimEvent::DiffuseReact { ts_index });
            }
            SimEvent::Release { site_index } => {
                let site = self.release_sites[site_index].clone();
                let mut ctx = StepCtx {
                    partition: &mut self.partition,
                    species: &self.species,
                    reactions: &self.reactions,
                    rng: &mut self.rng,
                    stats: &mut self.stats,
                    config: &self.config,
                    records: &mut self.records,
                };
                execute_release(&mut ctx, &site)?;
            }
        }
        self.sync_ts_classes(time);
        self.drain_records();
        Ok(())
    }

    fn drain_records(&mut self) {
        if self.records.is_empty() {
            return;
        }
        for record in self.records.drain(..) {
            for observer in &mut self.observers {
                observer.reaction(&record);
            }
        }
    }

    fn emit_viz(&mut self) {
        let iteration = self.current_iteration;
        let snapshots: Vec<MoleculeSnapshot> = self
            .partition
            .live_molecules()
            .map(|m| {
                let pos = match m.state {
                    MoleculeState::Volume { pos } => pos,
                    MoleculeState::Surface { wall, uv, .. } => self.partition.walls[wall]
                        .uv_to_xyz(uv, &self.partition.vertices),
                };
                MoleculeSnapshot {
                    iteration,
                    molecule_id: m.id,
                    species_id: m.species_id,
                    pos,
                }
            })
            .collect();
        for observer in &mut self.observers {
            observer.viz_snapshot(iteration, &snapshots);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_builds_and_idles() {
        let mut world = World::new(SimConfig::default()).unwrap();
        let a = world.add_species("A", 0.0, false).unwrap();
        world.add_volume_molecule(a, DVec3::splat(0.5)).unwrap();
        world.run_iterations(5).unwrap();
        assert_eq!(world.count_species(a), 1);
        assert_eq!(world.iteration(), 5);
        // an immobile molecule with no reactions stays put
        let m = world.partition.molecule(0);
        assert!((m.pos() - DVec3::splat(0.5)).length() < 1e-15);
    }

    #[test]
    fn release_event_fires_before_first_step() {
        let mut world = World::new(SimConfig::default()).unwrap();
        let a = world.add_species("A", 1e-6, false).unwrap();
        world
            .add_release_site(ReleaseSite {
                name: "r".into(),
                species_id: a,
                count: 10,
                time: 0.0,
                shape: ReleaseShape::Point(DVec3::splat(0.5)),
                orientation: 0,
            })
            .unwrap();
        world.run_iterations(1).unwrap();
        assert_eq!(world.count_species(a), 10);
    }

    #[test]
    fn mismatched_release_shape_is_rejected() {
        let mut world = World::new(SimConfig::default()).unwrap();
        let s = world.add_species("S", 1e-7, true).unwrap();
        let r = world.add_release_site(ReleaseSite {
            name: "bad".into(),
            species_id: s,
            count: 1,
            time: 0.0,
            shape: ReleaseShape::Point(DVec3::splat(0.5)),
            orientation: 1,
        });
        assert!(r.is_err());
    }

    #[test]
    fn deferred_release_fires_at_its_iteration() {
        let config = SimConfig::default();
        let dt = config.base_time_step;
        let mut world = World::new(config).unwrap();
        let a = world.add_species("A", 1e-6, false).unwrap();
        world
            .add_release_site(ReleaseSite {
                name: "late".into(),
                species_id: a,
                count: 3,
                time: 5.0 * dt,
                shape: ReleaseShape::Point(DVec3::splat(0.5)),
                orientation: 0,
            })
            .unwrap();
        world.run_iterations(5).unwrap();
        assert_eq!(world.count_species(a), 0);
        world.run_iterations(1).unwrap();
        assert_eq!(world.count_species(a), 3);
    }
}
