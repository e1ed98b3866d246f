//! The partition: the simulation box, its geometry, and its molecules.
//!
//! The box is subdivided into a uniform grid of cubic subpartitions, the
//! unit of spatial indexing. The partition owns the vertex array, the wall
//! array with per-subpartition wall id sets, the molecule table with
//! per-subpartition per-species reactant sets, and the per-timestep
//! diffusion schedules.

use glam::{DVec3, IVec3};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::SimConfig;
use crate::constants::EPS;
use crate::error::SimError;
use crate::molecule::{Molecule, MoleculeId, MoleculeState};
use crate::object::{build_object_edges, GeometryObject, MeshInput, ObjectId, Region, RegionId};
use crate::scheduler::{Calendar, MoleculeAction};
use crate::species::{Species, SpeciesId};
use crate::wall::{Edge, Wall, WallGrid, WallIndex};

/// The simulation box and everything in it.
pub struct Partition {
    origin: DVec3,
    edge_length: f64,
    /// Subpartitions along each axis.
    num_subparts: usize,
    subpart_edge: f64,
    subpart_edge_rcp: f64,
    rx_radius: f64,
    use_expanded_list: bool,
    surface_grid_density: f64,

    pub vertices: Vec<DVec3>,
    /// Back-index: walls using each vertex.
    pub vertex_walls: Vec<Vec<WallIndex>>,
    pub walls: Vec<Wall>,
    pub edges: Vec<Edge>,
    pub objects: Vec<GeometryObject>,
    pub regions: Vec<Region>,

    molecules: Vec<Molecule>,
    walls_per_subpart: Vec<Vec<WallIndex>>,
    /// Per subpartition: volume molecules present, keyed by their species.
    reactants_per_subpart: Vec<FxHashMap<SpeciesId, FxHashSet<MoleculeId>>>,

    /// Distinct per-species timestep values seen so far.
    time_steps: Vec<f64>,
    /// Molecules due for diffusion at each timestep class.
    schedules: Vec<Vec<MoleculeId>>,
    /// Unimolecular actions queued for future events of each timestep class.
    unimol_calendars: Vec<Calendar<MoleculeAction>>,
}

impl Partition {
    pub fn new(config: &SimConfig) -> Self {
        let num_subparts = config.num_subpartitions_per_partition;
        let subpart_edge = config.subpartition_edge_length();
        let total = num_subparts * num_subparts * num_subparts;
        Self {
            origin: config.partition_origin,
            edge_length: config.partition_edge_length,
            num_subparts,
            subpart_edge,
            subpart_edge_rcp: 1.0 / subpart_edge,
            rx_radius: config.rx_radius_3d,
            use_expanded_list: config.use_expanded_list,
            surface_grid_density: config.surface_grid_density,
            vertices: Vec::new(),
            vertex_walls: Vec::new(),
            walls: Vec::new(),
            edges: Vec::new(),
            objects: Vec::new(),
            regions: Vec::new(),
            molecules: Vec::new(),
            walls_per_subpart: vec![Vec::new(); total],
            reactants_per_subpart: vec![FxHashMap::default(); total],
            time_steps: Vec::new(),
            schedules: Vec::new(),
            unimol_calendars: Vec::new(),
        }
    }

    // ---------- box and subpartition indexing ----------

    #[inline]
    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    #[inline]
    pub fn edge_length(&self) -> f64 {
        self.edge_length
    }

    #[inline]
    pub fn subpart_edge(&self) -> f64 {
        self.subpart_edge
    }

    #[inline]
    pub fn num_subparts_per_dim(&self) -> usize {
        self.num_subparts
    }

    #[inline]
    pub fn rx_radius(&self) -> f64 {
        self.rx_radius
    }

    /// Is the point inside the box (boundary inclusive)?
    #[inline]
    pub fn contains(&self, pos: DVec3) -> bool {
        let rel = pos - self.origin;
        rel.min_element() >= 0.0 && rel.max_element() <= self.edge_length
    }

    /// 3D subpartition indices of a point (unclamped; may be outside).
    #[inline]
    pub fn subpart_3d_from_pos(&self, pos: DVec3) -> IVec3 {
        let rel = (pos - self.origin) * self.subpart_edge_rcp;
        IVec3::new(
            rel.x.floor() as i32,
            rel.y.floor() as i32,
            rel.z.floor() as i32,
        )
    }

    /// Are these 3D indices inside the grid?
    #[inline]
    pub fn subpart_in_bounds(&self, idx3: IVec3) -> bool {
        let n = self.num_subparts as i32;
        idx3.min_element() >= 0 && idx3.max_element() < n
    }

    /// Linear subpartition index from 3D indices.
    #[inline]
    pub fn subpart_index_from_3d(&self, idx3: IVec3) -> Option<usize> {
        if !self.subpart_in_bounds(idx3) {
            return None;
        }
        let n = self.num_subparts;
        Some((idx3.z as usize * n + idx3.y as usize) * n + idx3.x as usize)
    }

    /// Linear subpartition index of a point.
    #[inline]
    pub fn subpart_index_from_pos(&self, pos: DVec3) -> Option<usize> {
        // points exactly on the high boundary belong to the last subpart
        let mut idx3 = self.subpart_3d_from_pos(pos);
        let n = self.num_subparts as i32;
        if self.contains(pos) {
            idx3 = idx3.min(IVec3::splat(n - 1));
        }
        self.subpart_index_from_3d(idx3)
    }

    /// 3D indices from a linear subpartition index.
    #[inline]
    pub fn subpart_3d_from_index(&self, index: usize) -> IVec3 {
        let n = self.num_subparts;
        IVec3::new(
            (index % n) as i32,
            ((index / n) % n) as i32,
            (index / (n * n)) as i32,
        )
    }

    /// Lower-left-front corner of a subpartition.
    #[inline]
    pub fn subpart_llf(&self, idx3: IVec3) -> DVec3 {
        self.origin + idx3.as_dvec3() * self.subpart_edge
    }

    // ---------- geometry ----------

    /// Add one triangulated object, building and validating its shared
    /// edges and registering its walls with the subpartitions.
    pub fn add_geometry(&mut self, mesh: MeshInput) -> Result<ObjectId, SimError> {
        let object_id = self.objects.len();
        let vertex_offset = self.vertices.len();
        let num_mesh_vertices = mesh.vertices.len();

        for v in &mesh.vertices {
            self.vertices.push(*v);
            self.vertex_walls.push(Vec::new());
        }

        let mut wall_ids = Vec::with_capacity(mesh.triangles.len());
        for tri in &mesh.triangles {
            if tri.iter().any(|&vi| vi >= num_mesh_vertices) {
                return Err(SimError::geometry(format!(
                    "object '{}': triangle {tri:?} references a missing vertex",
                    mesh.name
                )));
            }
            let id = self.walls.len();
            let global = [
                tri[0] + vertex_offset,
                tri[1] + vertex_offset,
                tri[2] + vertex_offset,
            ];
            let wall = Wall::new(id, object_id, global, &self.vertices)?;
            self.walls.push(wall);
            wall_ids.push(id);
            for &vi in &global {
                self.vertex_walls[vi].push(id);
            }
        }

        let is_closed =
            build_object_edges(&wall_ids, &mut self.walls, &self.vertices, &mut self.edges)?;

        for &wi in &wall_ids {
            self.register_wall(wi);
        }

        for region_input in &mesh.regions {
            let region_id = self.regions.len();
            let mut region_walls = Vec::with_capacity(region_input.triangle_indices.len());
            for &ti in &region_input.triangle_indices {
                let wi = *wall_ids.get(ti).ok_or_else(|| {
                    SimError::geometry(format!(
                        "region '{}': triangle index {ti} out of range",
                        region_input.name
                    ))
                })?;
                region_walls.push(wi);
                self.walls[wi].regions.push(region_id);
            }
            self.regions.push(Region {
                id: region_id,
                name: region_input.name.clone(),
                object_id,
                wall_indices: region_walls,
                surface_class: region_input.surface_class,
            });
        }

        self.objects.push(GeometryObject {
            id: object_id,
            name: mesh.name,
            wall_indices: wall_ids,
            is_closed,
        });
        Ok(object_id)
    }

    /// Insert a wall into every subpartition its inflated AABB overlaps.
    ///
    /// The inflation is `EPS + max(|llf|, |urb|)·EPS` plus the interaction
    /// radius when expanded lists are on, so that every collision candidate
    /// within the interaction radius of a subpartition is found through
    /// that subpartition's wall set.
    fn register_wall(&mut self, wall_index: WallIndex) {
        let [a, b, c] = self.walls[wall_index].corners(&self.vertices);
        let mut llf = a.min(b).min(c);
        let mut urb = a.max(b).max(c);

        let scale = llf.abs().max_element().max(urb.abs().max_element());
        let mut inflation = EPS + scale * EPS;
        if self.use_expanded_list {
            inflation += self.rx_radius;
        }
        llf -= DVec3::splat(inflation);
        urb += DVec3::splat(inflation);

        let n = self.num_subparts as i32;
        let lo = self.subpart_3d_from_pos(llf).max(IVec3::ZERO);
        let hi = self
            .subpart_3d_from_pos(urb)
            .min(IVec3::splat(n - 1));

        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    if let Some(idx) = self.subpart_index_from_3d(IVec3::new(x, y, z)) {
                        self.walls_per_subpart[idx].push(wall_index);
                    }
                }
            }
        }
    }

    #[inline]
    pub fn walls_in_subpart(&self, subpart: usize) -> &[WallIndex] {
        &self.walls_per_subpart[subpart]
    }

    /// Create the wall's tile grid if it does not exist yet, and return its
    /// index-stable handle.
    pub fn get_or_create_grid(&mut self, wall_index: WallIndex) -> &mut WallGrid {
        let density = self.surface_grid_density;
        let wall = &mut self.walls[wall_index];
        if wall.grid.is_none() {
            wall.grid = Some(WallGrid::new(
                wall.uv_vert1_u,
                wall.uv_vert2,
                wall.area,
                density,
            ));
        }
        wall.grid.as_mut().unwrap()
    }

    // ---------- molecules ----------

    #[inline]
    pub fn molecule(&self, id: MoleculeId) -> &Molecule {
        &self.molecules[id]
    }

    #[inline]
    pub fn molecule_mut(&mut self, id: MoleculeId) -> &mut Molecule {
        &mut self.molecules[id]
    }

    pub fn num_molecules(&self) -> usize {
        self.molecules.len()
    }

    /// All live molecules.
    pub fn live_molecules(&self) -> impl Iterator<Item = &Molecule> {
        self.molecules.iter().filter(|m| !m.is_defunct())
    }

    /// Live molecule count for one species.
    pub fn count_species(&self, species: SpeciesId) -> usize {
        self.live_molecules()
            .filter(|m| m.species_id == species)
            .count()
    }

    /// Create a volume molecule and index it everywhere.
    pub fn add_volume_molecule(
        &mut self,
        species: &Species,
        pos: DVec3,
    ) -> Result<MoleculeId, SimError> {
        let id = self.molecules.len();
        let subpart = self
            .subpart_index_from_pos(pos)
            .ok_or(SimError::OutOfDomain {
                molecule_id: id,
                x: pos.x,
                y: pos.y,
                z: pos.z,
            })?;
        self.molecules
            .push(Molecule::new_volume(id, species.id, subpart, pos));
        self.reactants_per_subpart[subpart]
            .entry(species.id)
            .or_default()
            .insert(id);
        self.schedule_molecule(id, species.time_step);
        Ok(id)
    }

    /// Create a surface molecule on a wall tile and index it everywhere.
    /// The tile must be free.
    pub fn add_surface_molecule(
        &mut self,
        species: &Species,
        wall_index: WallIndex,
        tile: usize,
        uv: glam::DVec2,
        orientation: i8,
    ) -> Result<MoleculeId, SimError> {
        let id = self.molecules.len();
        let pos = self.walls[wall_index].uv_to_xyz(uv, &self.vertices);
        let subpart = self
            .subpart_index_from_pos(pos)
            .ok_or(SimError::OutOfDomain {
                molecule_id: id,
                x: pos.x,
                y: pos.y,
                z: pos.z,
            })?;
        self.molecules.push(Molecule::new_surface(
            id,
            species.id,
            subpart,
            wall_index,
            tile,
            uv,
            orientation,
        ));
        let grid = self.walls[wall_index]
            .grid
            .as_mut()
            .expect("surface molecule placed on a wall without a grid");
        grid.set_occupant(tile, id);
        self.schedule_molecule(id, species.time_step);
        Ok(id)
    }

    /// Tombstone a molecule: clear its reactant-set entry or tile and mark
    /// it defunct. The id stays valid forever.
    pub fn set_molecule_as_defunct(&mut self, id: MoleculeId) {
        let (species_id, state, subpart) = {
            let m = &self.molecules[id];
            (m.species_id, m.state, m.subpart_index)
        };
        match state {
            MoleculeState::Volume { .. } => {
                if let Some(set) = self.reactants_per_subpart[subpart].get_mut(&species_id) {
                    set.remove(&id);
                }
            }
            MoleculeState::Surface { wall, tile, .. } => {
                if let Some(grid) = self.walls[wall].grid.as_mut() {
                    if grid.occupant(tile) == Some(id) {
                        grid.clear_occupant(tile);
                    }
                }
            }
        }
        self.molecules[id].defunct = true;
    }

    /// Move a volume molecule between reactant sets when its subpartition
    /// changes.
    pub fn change_molecule_subpart(&mut self, id: MoleculeId, new_subpart: usize) {
        let (species_id, old_subpart) = {
            let m = &self.molecules[id];
            (m.species_id, m.subpart_index)
        };
        if old_subpart == new_subpart {
            return;
        }
        if self.molecules[id].is_volume() {
            if let Some(set) = self.reactants_per_subpart[old_subpart].get_mut(&species_id) {
                set.remove(&id);
            }
            self.reactants_per_subpart[new_subpart]
                .entry(species_id)
                .or_default()
                .insert(id);
        }
        self.molecules[id].subpart_index = new_subpart;
    }

    /// Move a volume molecule to a new position, updating its subpartition.
    pub fn move_volume_molecule(&mut self, id: MoleculeId, new_pos: DVec3) -> Result<(), SimError> {
        let subpart = self
            .subpart_index_from_pos(new_pos)
            .ok_or(SimError::OutOfDomain {
                molecule_id: id,
                x: new_pos.x,
                y: new_pos.y,
                z: new_pos.z,
            })?;
        self.change_molecule_subpart(id, subpart);
        match &mut self.molecules[id].state {
            MoleculeState::Volume { pos } => *pos = new_pos,
            MoleculeState::Surface { .. } => unreachable!("volume move on surface molecule"),
        }
        Ok(())
    }

    /// Re-anchor a surface molecule on a (possibly different) wall and tile.
    /// The destination tile must be free or held by this molecule.
    pub fn move_surface_molecule(
        &mut self,
        id: MoleculeId,
        new_wall: WallIndex,
        new_tile: usize,
        new_uv: glam::DVec2,
    ) -> Result<(), SimError> {
        let (old_wall, old_tile) = {
            let (w, t, _, _) = self.molecules[id].surface_state();
            (w, t)
        };
        if old_wall != new_wall || old_tile != new_tile {
            if let Some(grid) = self.walls[old_wall].grid.as_mut() {
                if grid.occupant(old_tile) == Some(id) {
                    grid.clear_occupant(old_tile);
                }
            }
            let grid = self.walls[new_wall]
                .grid
                .as_mut()
                .expect("surface molecule moved to a wall without a grid");
            grid.set_occupant(new_tile, id);
        }

        let pos = self.walls[new_wall].uv_to_xyz(new_uv, &self.vertices);
        let subpart = self
            .subpart_index_from_pos(pos)
            .ok_or(SimError::OutOfDomain {
                molecule_id: id,
                x: pos.x,
                y: pos.y,
                z: pos.z,
            })?;
        self.change_molecule_subpart(id, subpart);
        match &mut self.molecules[id].state {
            MoleculeState::Surface { wall, tile, uv, .. } => {
                *wall = new_wall;
                *tile = new_tile;
                *uv = new_uv;
            }
            MoleculeState::Volume { .. } => unreachable!("surface move on volume molecule"),
        }
        Ok(())
    }

    /// Volume molecules of one species in a subpartition.
    #[inline]
    pub fn volume_reactants(
        &self,
        subpart: usize,
        species: SpeciesId,
    ) -> Option<&FxHashSet<MoleculeId>> {
        self.reactants_per_subpart[subpart].get(&species)
    }

    // ---------- per-timestep scheduling ----------

    /// Index of a distinct timestep value, creating it if new.
    pub fn get_or_add_time_step_index(&mut self, time_step: f64) -> usize {
        for (i, &t) in self.time_steps.iter().enumerate() {
            if t == time_step {
                return i;
            }
        }
        self.time_steps.push(time_step);
        self.schedules.push(Vec::new());
        self.unimol_calendars.push(Calendar::new(time_step));
        self.time_steps.len() - 1
    }

    pub fn time_step_value(&self, index: usize) -> f64 {
        self.time_steps[index]
    }

    pub fn num_time_step_classes(&self) -> usize {
        self.time_steps.len()
    }

    fn schedule_molecule(&mut self, id: MoleculeId, time_step: f64) {
        let index = self.get_or_add_time_step_index(time_step);
        self.schedules[index].push(id);
    }

    /// Molecules due for diffusion in this timestep class, in insertion
    /// order.
    pub fn scheduled_molecules(&self, index: usize) -> &[MoleculeId] {
        &self.schedules[index]
    }

    /// Drop defunct molecules from a schedule, preserving order.
    pub fn compact_schedule(&mut self, index: usize) {
        let molecules = &self.molecules;
        self.schedules[index].retain(|&id| !molecules[id].is_defunct());
    }

    /// Queue a unimolecular action for a later event of this timestep class.
    pub fn add_unimol_action(&mut self, index: usize, action: MoleculeAction) {
        self.unimol_calendars[index].insert(action.time, action);
    }

    /// Take every queued unimolecular action due at this event (its bucket
    /// and any older ones), in queue order.
    pub fn take_unimol_actions_due(&mut self, index: usize, event_time: f64) -> Vec<MoleculeAction> {
        self.unimol_calendars[index]
            .drain_until(event_time)
            .into_iter()
            .map(|(_, action)| action)
            .collect()
    }

    /// Clear the unimolecular clocks of every live molecule of one species,
    /// forcing a resample on the next diffusion touch. Queued actions for
    /// the old clocks become stale and are skipped when they come up.
    pub fn reset_unimol_clocks(&mut self, species: SpeciesId) {
        for m in &mut self.molecules {
            if !m.defunct && m.species_id == species {
                m.unimol_scheduled = false;
                m.unimol_rx_time = None;
            }
        }
    }
}
