//! The diffuse-and-react event: the per-timestep kernel.
//!
//! One event advances every molecule of one timestep class by one step.
//! The processing order follows the reference ordering exactly:
//!
//! 1. molecules already alive at the event start, in insertion order;
//! 2. unimolecular reactions queued by earlier events for this window;
//! 3. an in-event FIFO of freshly created products and same-window
//!    unimolecular reactions, processed in insertion order, growing as it
//!    is consumed.
//!
//! A single molecule's step is a pipeline: sample a displacement, walk the
//! subpartitions it crosses, gather wall and molecule collision candidates,
//! sort them by collision time, and apply the first outcome that fires.

use glam::DVec3;

use crate::collide::{collide_mol, collide_wall, reflect_displacement, HitSide, WallHit};
use crate::config::SimConfig;
use crate::constants::{EPS, FRAC_1_SQRT_2};
use crate::error::SimError;
use crate::molecule::MoleculeId;
use crate::output::{ReactionKind, ReactionRecord};
use crate::partition::Partition;
use crate::react;
use crate::reaction::{ReactionTable, RxnClassId, RxnType};
use crate::rng::SimRng;
use crate::scheduler::{ActionKind, MoleculeAction};
use crate::species::{SpeciesId, SpeciesTable};
use crate::stats::SimStats;
use crate::subpart_walk::collect_crossed_subparts;
use crate::surface::diffuse_surface_molecule;
use crate::wall::WallIndex;

/// Borrowed world state for one event. The catalogue tables are read-only;
/// the partition, RNG, statistics and record buffer are the only mutable
/// state, and they are mutated serially.
pub(crate) struct StepCtx<'a> {
    pub partition: &'a mut Partition,
    pub species: &'a SpeciesTable,
    pub reactions: &'a ReactionTable,
    pub rng: &'a mut SimRng,
    pub stats: &'a mut SimStats,
    pub config: &'a SimConfig,
    pub records: &'a mut Vec<ReactionRecord>,
}

/// One candidate collision along a ray.
enum Collision {
    Mol {
        target: MoleculeId,
        class_id: RxnClassId,
        time: f64,
        pos: DVec3,
    },
    Wall {
        wall: WallIndex,
        side: HitSide,
        time: f64,
        pos: DVec3,
    },
}

impl Collision {
    fn time(&self) -> f64 {
        match self {
            Collision::Mol { time, .. } | Collision::Wall { time, .. } => *time,
        }
    }
}

/// Run one diffuse-and-react event for the timestep class `ts_index`.
pub(crate) fn run_diffuse_react_event(
    ctx: &mut StepCtx,
    event_time: f64,
    time_step: f64,
    ts_index: usize,
) -> Result<(), SimError> {
    let event_end = event_time + time_step;
    let mut fifo: Vec<MoleculeAction> = Vec::new();

    // 1) diffuse molecules alive at event start, in insertion order
    let ids: Vec<MoleculeId> = ctx.partition.scheduled_molecules(ts_index).to_vec();
    for id in ids {
        diffuse_single_molecule(ctx, id, event_time, event_end, ts_index, &mut fifo)?;
    }

    // 2) unimolecular reactions queued by earlier events for this window,
    //    in queue order rather than by time
    let due = ctx.partition.take_unimol_actions_due(ts_index, event_time);
    for action in due {
        react::react_unimol_single_molecule(ctx, &action, event_time, event_end, &mut fifo)?;
    }

    // 3) the in-event FIFO: freshly created products and same-window
    //    unimolecular reactions; grows while it drains
    let mut next = 0;
    while next < fifo.len() {
        let action = fifo[next];
        next += 1;
        match action.kind {
            ActionKind::Diffuse => {
                diffuse_single_molecule(ctx, action.molecule_id, action.time, event_end, ts_index, &mut fifo)?;
            }
            ActionKind::UnimolReact(_) => {
                react::react_unimol_single_molecule(ctx, &action, event_time, event_end, &mut fifo)?;
            }
        }
    }

    ctx.partition.compact_schedule(ts_index);
    Ok(())
}

/// Advance one molecule from `start_time` to the event end (or to its
/// unimolecular reaction, whichever is earlier).
pub(crate) fn diffuse_single_molecule(
    ctx: &mut StepCtx,
    id: MoleculeId,
    start_time: f64,
    event_end: f64,
    ts_index: usize,
    fifo: &mut Vec<MoleculeAction>,
) -> Result<(), SimError> {
    if ctx.partition.molecule(id).is_defunct() {
        return Ok(());
    }

    // first touch: sample the unimolecular clock
    if !ctx.partition.molecule(id).unimol_scheduled {
        react::schedule_unimol(ctx, id, start_time, event_end, ts_index, fifo);
    }

    let species_id = ctx.partition.molecule(id).species_id;
    let species = ctx.species.get(species_id);
    if species.is_surface {
        return diffuse_surface_molecule(ctx, id, start_time, event_end, fifo);
    }

    // shorten the step to land exactly on a unimolecular reaction due in
    // this window
    let unimol_rx_time = ctx.partition.molecule(id).unimol_rx_time;
    let mut remaining = event_end - start_time;
    if let Some(t) = unimol_rx_time {
        if t < event_end {
            if t < start_time - 1e-9 * start_time.abs().max(1.0) {
                return Err(SimError::MissedUnimolecular {
                    molecule_id: id,
                    scheduled: t,
                    event_time: start_time,
                });
            }
            remaining = (t - start_time).max(0.0);
        }
    }
    if !species.can_diffuse() || remaining <= 0.0 {
        return Ok(());
    }

    // displacement: sqrt(steps)·sigma·N(0,1)/sqrt(2) per component
    let steps = (remaining / species.time_step).clamp(EPS, 1.0);
    let rate_factor = steps.sqrt();
    let r_rate_factor = 1.0 / rate_factor;
    let scale = species.space_step * rate_factor * FRAC_1_SQRT_2;
    let displacement = DVec3::new(
        scale * ctx.rng.gauss(),
        scale * ctx.rng.gauss(),
        scale * ctx.rng.gauss(),
    );

    ray_trace_and_react(
        ctx,
        id,
        species_id,
        displacement,
        remaining,
        r_rate_factor,
        start_time,
        fifo,
    )
}

/// Trace a displacement through walls and molecules, applying the first
/// outcome that fires; reflections and REDO perturbations restart the
/// trace with the leftover displacement.
#[allow(clippy::too_many_arguments)]
fn ray_trace_and_react(
    ctx: &mut StepCtx,
    id: MoleculeId,
    species_id: SpeciesId,
    displacement: DVec3,
    remaining_time: f64,
    r_rate_factor: f64,
    start_time: f64,
    fifo: &mut Vec<MoleculeAction>,
) -> Result<(), SimError> {
    let mut pos = ctx.partition.molecule(id).pos();
    let mut subpart = ctx.partition.molecule(id).subpart_index;
    let mut disp = displacement;
    let mut prev_wall: Option<WallIndex> = None;
    // fraction of the step's time already consumed by earlier legs
    let mut frac_done = 0.0;
    let mut redos = 0usize;
    let mut reflections = 0usize;

    'trace: loop {
        ctx.stats.ray_subpart_walks += 1;
        let walk = collect_crossed_subparts(ctx.partition, pos, disp, subpart);

        // wall candidates, in subpartition path order
        let mut collisions: Vec<Collision> = Vec::new();
        let mut tested: Vec<WallIndex> = Vec::new();
        'walls: for &sp in &walk.wall_subparts {
            for &wi in ctx.partition.walls_in_subpart(sp) {
                if prev_wall == Some(wi) || tested.contains(&wi) {
                    continue;
                }
                tested.push(wi);
                ctx.stats.ray_wall_tests += 1;
                let wall = &ctx.partition.walls[wi];
                match collide_wall(pos, &mut disp, wall, &ctx.partition.vertices, ctx.rng, true) {
                    WallHit::Miss => {}
                    WallHit::Redo => {
                        redos += 1;
                        ctx.stats.collision_redos += 1;
                        if redos > ctx.config.max_collision_redos {
                            // accept the perturbed displacement as a wall miss
                            ctx.stats.ambiguous_collisions_abandoned += 1;
                            collisions.clear();
                            break 'walls;
                        }
                        continue 'trace;
                    }
                    WallHit::Hit { side, time, pos: hit_pos } => {
                        ctx.stats.ray_wall_hits += 1;
                        collisions.push(Collision::Wall {
                            wall: wi,
                            side,
                            time,
                            pos: hit_pos,
                        });
                    }
                }
            }
        }

        // molecule candidates from the halo'd subpartition set
        let mut mol_subparts: Vec<usize> = walk.molecule_subparts.iter().copied().collect();
        mol_subparts.sort_unstable();
        for sp in mol_subparts {
            for &partner in ctx.reactions.volume_partners(species_id) {
                let Some(set) = ctx.partition.volume_reactants(sp, partner) else {
                    continue;
                };
                let mut targets: Vec<MoleculeId> = set.iter().copied().collect();
                targets.sort_unstable();
                for target in targets {
                    if target == id {
                        continue;
                    }
                    let t = ctx.partition.molecule(target);
                    if t.is_defunct() {
                        continue;
                    }
                    ctx.stats.mol_mol_tests += 1;
                    if let Some((time, cpos)) =
                        collide_mol(pos, disp, t.pos(), ctx.partition.rx_radius())
                    {
                        let class = ctx
                            .reactions
                            .pick_bimol(species_id, t.species_id)
                            .expect("partner species implies a reaction class");
                        collisions.push(Collision::Mol {
                            target,
                            class_id: class.id,
                            time,
                            pos: cpos,
                        });
                    }
                }
            }
        }

        // earliest collision first; FIFO among exact ties (stable sort)
        collisions.sort_by(|a, b| a.time().total_cmp(&b.time()));

        for collision in &collisions {
            // immediate self-grazing collisions are ignored
            if collision.time() < EPS {
                continue;
            }
            match *collision {
                Collision::Mol {
                    target,
                    class_id,
                    time,
                    pos: cpos,
                } => {
                    if ctx.partition.molecule(target).is_defunct() {
                        continue;
                    }
                    let class = ctx.reactions.get(class_id);
                    if let Some(pathway) =
                        react::test_bimolecular(class, r_rate_factor, 0.0, ctx.rng)
                    {
                        let abs_time =
                            start_time + (frac_done + time * (1.0 - frac_done)) * remaining_time;
                        let site = react::ReactionSite {
                            pos: cpos,
                            uv: None,
                            wall: None,
                            incoming_side: 0,
                            time: abs_time,
                        };
                        let fired = react::execute_reaction(
                            ctx,
                            class_id,
                            pathway,
                            &[id, target],
                            site,
                            ReactionKind::Bimolecular,
                            fifo,
                        )?;
                        if fired {
                            ctx.stats.bimol_reactions += 1;
                            // the diffusing molecule is gone; the rest of
                            // the displacement is discarded
                            return Ok(());
                        }
                    }
                }
                Collision::Wall {
                    wall,
                    side,
                    time,
                    pos: hit_pos,
                } => {
                    let abs_time =
                        start_time + (frac_done + time * (1.0 - frac_done)) * remaining_time;
                    match resolve_wall_hit(
                        ctx, id, species_id, wall, side, hit_pos, abs_time, r_rate_factor, fifo,
                    )? {
                        WallOutcome::PassThrough => continue,
                        WallOutcome::Consumed => return Ok(()),
                        WallOutcome::Reflect => {
                            reflections += 1;
                            ctx.stats.reflections += 1;
                            if reflections > ctx.config.max_reflections {
                                // give up and stop at the hit point
                                ctx.stats.reflection_budget_exhausted += 1;
                                ctx.partition.move_volume_molecule(id, hit_pos)?;
                                return Ok(());
                            }
                            frac_done += time * (1.0 - frac_done);
                            disp = reflect_displacement(disp, ctx.partition.walls[wall].normal, time);
                            pos = hit_pos;
                            subpart = ctx
                                .partition
                                .subpart_index_from_pos(pos)
                                .ok_or(SimError::OutOfDomain {
                                    molecule_id: id,
                                    x: pos.x,
                                    y: pos.y,
                                    z: pos.z,
                                })?;
                            prev_wall = Some(wall);
                            continue 'trace;
                        }
                    }
                }
            }
        }

        // nothing fired: complete the move
        let new_pos = pos + disp;
        ctx.partition.move_volume_molecule(id, new_pos)?;
        return Ok(());
    }
}

enum WallOutcome {
    PassThrough,
    Consumed,
    Reflect,
}

/// Decide what a wall hit does to a volume molecule.
///
/// Checked in precedence order: a transparent surface class lets the
/// molecule through; an absorptive class consumes it; a surface molecule
/// on the hit tile or a standard surface class runs the bimolecular gate;
/// anything else (including a gate miss) reflects.
#[allow(clippy::too_many_arguments)]
fn resolve_wall_hit(
    ctx: &mut StepCtx,
    id: MoleculeId,
    species_id: SpeciesId,
    wall_index: WallIndex,
    side: HitSide,
    hit_pos: DVec3,
    abs_time: f64,
    r_rate_factor: f64,
    fifo: &mut Vec<MoleculeAction>,
) -> Result<WallOutcome, SimError> {
    let incoming_side: i8 = match side {
        HitSide::Front => 1,
        HitSide::Back => -1,
    };

    // surface classes carried by the wall's regions
    let mut surface_classes: Vec<SpeciesId> = ctx.partition.walls[wall_index]
        .regions
        .iter()
        .filter_map(|&r| ctx.partition.regions[r].surface_class)
        .collect();
    surface_classes.sort_unstable();
    surface_classes.dedup();

    // transparency and absorption are properties, not probabilistic events
    let mut absorbs = false;
    for &class_species in &surface_classes {
        for rxn in ctx.reactions.matching_classes(species_id, class_species, true) {
            match rxn.rxn_type {
                RxnType::Transparent => return Ok(WallOutcome::PassThrough),
                RxnType::AbsorbRegionBorder => absorbs = true,
                _ => {}
            }
        }
    }
    if absorbs {
        react::absorb_molecule(ctx, id, hit_pos, abs_time);
        return Ok(WallOutcome::Consumed);
    }

    // a surface molecule on the tile under the hit point
    let hit_uv = ctx.partition.walls[wall_index].xyz_to_uv(hit_pos, &ctx.partition.vertices);
    let tile_mol: Option<MoleculeId> = ctx.partition.walls[wall_index]
        .grid
        .as_ref()
        .and_then(|g| g.occupant(g.uv_to_tile(hit_uv)))
        .filter(|&mid| mid != id && !ctx.partition.molecule(mid).is_defunct());

    if let Some(target) = tile_mol {
        let target_species = ctx.partition.molecule(target).species_id;
        if let Some(class) = ctx.reactions.pick_bimol(species_id, target_species) {
            if class.rxn_type == RxnType::Standard {
                let class_id = class.id;
                if let Some(pathway) =
                    react::test_bimolecular(class, r_rate_factor, 0.0, ctx.rng)
                {
                    let site = react::ReactionSite {
                        pos: hit_pos,
                        uv: Some(hit_uv),
                        wall: Some(wall_index),
                        incoming_side,
                        time: abs_time,
                    };
                    let fired = react::execute_reaction(
                        ctx,
                        class_id,
                        pathway,
                        &[id, target],
                        site,
                        ReactionKind::Bimolecular,
                        fifo,
                    )?;
                    if fired {
                        ctx.stats.bimol_reactions += 1;
                        return Ok(WallOutcome::Consumed);
                    }
                }
            }
        }
    }

    // standard surface-class reactions compete for the hit
    let mut standard: Vec<&crate::reaction::RxnClass> = Vec::new();
    for &class_species in &surface_classes {
        for rxn in ctx.reactions.matching_classes(species_id, class_species, true) {
            if rxn.rxn_type == RxnType::Standard {
                standard.push(rxn);
            }
        }
    }
    if !standard.is_empty() {
        let scalings = vec![r_rate_factor; standard.len()];
        if let Some((class_index, pathway)) =
            react::test_many_bimolecular(&standard, &scalings, 0.0, ctx.rng)
        {
            let class_id = standard[class_index].id;
            let hit_uv = ctx.partition.walls[wall_index].xyz_to_uv(hit_pos, &ctx.partition.vertices);
            let site = react::ReactionSite {
                pos: hit_pos,
                uv: Some(hit_uv),
                wall: Some(wall_index),
                incoming_side,
                time: abs_time,
            };
            let fired = react::execute_reaction(
                ctx,
                class_id,
                pathway,
                &[id],
                site,
                ReactionKind::SurfaceClass,
                fifo,
            )?;
            if fired {
                ctx.stats.bimol_reactions += 1;
                return Ok(WallOutcome::Consumed);
            }
        }
    }

    Ok(WallOutcome::Reflect)
}
