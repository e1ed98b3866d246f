//! Run statistics.
//!
//! Counters bumped by the kernel and dumped at the end of a run. Recovered
//! runtime conditions (exhausted REDO retries, full tiles) show up here
//! rather than as errors.

/// Counters for one run.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimStats {
    /// Calls into the ray-subpartition walker.
    pub ray_subpart_walks: u64,
    /// Ray-triangle intersection tests.
    pub ray_wall_tests: u64,
    /// Ray-triangle intersections.
    pub ray_wall_hits: u64,
    /// Molecule-molecule disk tests.
    pub mol_mol_tests: u64,
    /// Collision-test restarts after a REDO outcome.
    pub collision_redos: u64,
    /// Steps that exhausted their REDO retries and accepted the last
    /// displacement as a miss.
    pub ambiguous_collisions_abandoned: u64,
    /// Wall reflections applied.
    pub reflections: u64,
    /// Steps that exhausted their reflection budget.
    pub reflection_budget_exhausted: u64,
    /// Surface molecule moves across a shared wall edge.
    pub mol_moves_between_walls: u64,
    /// Surface steps abandoned because the destination tile was occupied.
    pub tile_moves_blocked: u64,
    /// Reactions rejected because no free tile was found for a product.
    pub tile_full_rejections: u64,
    /// Unimolecular reactions fired.
    pub unimol_reactions: u64,
    /// Bimolecular reactions fired.
    pub bimol_reactions: u64,
    /// Molecules absorbed by surface classes.
    pub absorptions: u64,
}

impl SimStats {
    /// Log every counter at info level.
    pub fn dump(&self) {
        log::info!("ray-subpartition walks: {}", self.ray_subpart_walks);
        log::info!("ray-wall tests: {}", self.ray_wall_tests);
        log::info!("ray-wall hits: {}", self.ray_wall_hits);
        log::info!("molecule-molecule disk tests: {}", self.mol_mol_tests);
        log::info!("collision REDO restarts: {}", self.collision_redos);
        log::info!(
            "ambiguous collisions abandoned: {}",
            self.ambiguous_collisions_abandoned
        );
        log::info!("wall reflections: {}", self.reflections);
        log::info!(
            "reflection budgets exhausted: {}",
            self.reflection_budget_exhausted
        );
        log::info!(
            "surface moves between walls: {}",
            self.mol_moves_between_walls
        );
        log::info!("blocked tile moves: {}", self.tile_moves_blocked);
        log::info!("tile-full reaction rejections: {}", self.tile_full_rejections);
        log::info!("unimolecular reactions: {}", self.unimol_reactions);
        log::info!("bimolecular reactions: {}", self.bimol_reactions);
        log::info!("surface absorptions: {}", self.absorptions);
    }
}
