//! 2D diffusion of surface molecules on triangulated walls.
//!
//! A surface step samples a 2D Gaussian displacement in the wall's local
//! frame and walks it across the triangle. Each crossed edge is checked
//! against the surface classes of the regions on either side: a reflective
//! border folds the leftover displacement back into the triangle, an
//! absorptive border consumes the molecule, otherwise the step traverses
//! into the neighbor wall's frame and continues. The final location claims
//! its tile only if it is free; a molecule whose destination tile is taken
//! stays where it is for this step.

use glam::DVec2;

use crate::constants::EPS;
use crate::diffuse::StepCtx;
use crate::error::SimError;
use crate::geom::{find_edge_point, reflect_2d, EdgePoint};
use crate::molecule::MoleculeId;
use crate::react::absorb_molecule;
use crate::reaction::RxnType;
use crate::scheduler::MoleculeAction;
use crate::species::SpeciesId;
use crate::wall::WallIndex;

/// What a crossed edge does to the molecule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BorderBehavior {
    Pass,
    Reflect,
    Absorb,
}

/// Diffuse one surface molecule for the remainder of the event window.
pub(crate) fn diffuse_surface_molecule(
    ctx: &mut StepCtx,
    id: MoleculeId,
    start_time: f64,
    event_end: f64,
    _fifo: &mut [MoleculeAction],
) -> Result<(), SimError> {
    let (species_id, unimol_rx_time) = {
        let m = ctx.partition.molecule(id);
        (m.species_id, m.unimol_rx_time)
    };
    let species = ctx.species.get(species_id).clone();
    let (orig_wall, orig_tile, orig_loc, _orientation) =
        ctx.partition.molecule(id).surface_state();

    // land exactly on the unimolecular reaction when it falls in the window
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

    let steps = (remaining / species.time_step).clamp(EPS, 1.0);
    let scale = species.space_step * steps.sqrt();
    let mut disp = ctx.rng.polar_2d(scale);

    let mut wall_index = orig_wall;
    let mut loc = orig_loc;
    let mut crossings = 0usize;
    let mut redos = 0usize;

    loop {
        let wall = &ctx.partition.walls[wall_index];
        match find_edge_point(loc, disp, wall.uv_vert1_u, wall.uv_vert2) {
            EdgePoint::Inside => {
                loc += disp;
                break;
            }
            EdgePoint::Ambiguous => {
                redos += 1;
                ctx.stats.collision_redos += 1;
                if redos > ctx.config.max_collision_redos {
                    ctx.stats.ambiguous_collisions_abandoned += 1;
                    return Ok(()); // stay put this step
                }
                disp = ctx.rng.polar_2d(scale);
                continue;
            }
            EdgePoint::Edge(k, t) => {
                crossings += 1;
                if crossings > ctx.config.max_surface_crossings {
                    log::warn!("surface molecule {id} exceeded its edge-crossing budget");
                    return Ok(());
                }

                let hit = loc + disp * t;
                let residual = disp * (1.0 - t);
                let edge_index = wall.edges[k];
                let edge = &ctx.partition.edges[edge_index];
                let neighbor = edge.neighbor_of(wall_index);

                let behavior = match neighbor {
                    None => BorderBehavior::Reflect, // open mesh boundary
                    Some(other) => {
                        edge_border_behavior(ctx, species_id, wall_index, other)
                    }
                };

                match behavior {
                    BorderBehavior::Absorb => {
                        let pos = ctx.partition.walls[wall_index]
                            .uv_to_xyz(hit, &ctx.partition.vertices);
                        absorb_molecule(ctx, id, pos, start_time + remaining);
                        return Ok(());
                    }
                    BorderBehavior::Reflect => {
                        let corners = ctx.partition.walls[wall_index].uv_corners();
                        let edge_dir = corners[(k + 1) % 3] - corners[k];
                        // fold the leftover displacement back across the edge
                        disp = reflect_2d(residual, edge_dir);
                        loc = hit;
                        continue;
                    }
                    BorderBehavior::Pass => {
                        let edge = &ctx.partition.edges[edge_index];
                        let (next_wall, next_loc, next_disp) =
                            if edge.forward_wall == wall_index {
                                (
                                    edge.backward_wall,
                                    edge.apply_forward(hit),
                                    edge.rotate_forward(residual),
                                )
                            } else {
                                (
                                    edge.forward_wall,
                                    edge.apply_backward(hit),
                                    edge.rotate_backward(residual),
                                )
                            };
                        wall_index = next_wall;
                        loc = next_loc;
                        disp = next_disp;
                        ctx.stats.mol_moves_between_walls += 1;
                        continue;
                    }
                }
            }
        }
    }

    // claim the destination tile, or stay on the current one if taken
    ctx.partition.get_or_create_grid(wall_index);
    let grid = ctx.partition.walls[wall_index].grid.as_ref().expect("grid created");
    let new_tile = grid.uv_to_tile(loc);
    let occupant = grid.occupant(new_tile);

    if wall_index == orig_wall && new_tile == orig_tile {
        ctx.partition.move_surface_molecule(id, wall_index, new_tile, loc)?;
    } else if occupant.is_some() {
        ctx.stats.tile_moves_blocked += 1;
    } else {
        ctx.partition.move_surface_molecule(id, wall_index, new_tile, loc)?;
    }
    Ok(())
}

/// Behavior of the border between two walls for a molecule of `species_id`.
///
/// A surface class that only one of the two walls carries marks a region
/// border. The reaction class between the molecule (or a matching
/// wildcard) and that surface class decides the outcome; absorption wins
/// over reflection wins over transparency. Without any matching class the
/// border is open.
fn edge_border_behavior(
    ctx: &StepCtx,
    species_id: SpeciesId,
    from_wall: WallIndex,
    to_wall: WallIndex,
) -> BorderBehavior {
    let classes_of = |wall: WallIndex| -> Vec<SpeciesId> {
        let mut out: Vec<SpeciesId> = ctx.partition.walls[wall]
            .regions
            .iter()
            .filter_map(|&r| ctx.partition.regions[r].surface_class)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    };
    let here = classes_of(from_wall);
    let there = classes_of(to_wall);

    let mut behavior = BorderBehavior::Pass;
    for &class_species in here.iter().chain(there.iter()) {
        let is_border = here.contains(&class_species) != there.contains(&class_species);
        if !is_border {
            continue;
        }
        for rxn in ctx
            .reactions
            .matching_classes(species_id, class_species, false)
        {
            let candidate = match rxn.rxn_type {
                RxnType::AbsorbRegionBorder => BorderBehavior::Absorb,
                RxnType::Reflect => BorderBehavior::Reflect,
                RxnType::Transparent => BorderBehavior::Pass,
                RxnType::Standard => continue,
            };
            behavior = stronger(behavior, candidate);
        }
    }
    behavior
}

fn stronger(a: BorderBehavior, b: BorderBehavior) -> BorderBehavior {
    use BorderBehavior::*;
    match (a, b) {
        (Absorb, _) | (_, Absorb) => Absorb,
        (Reflect, _) | (_, Reflect) => Reflect,
        _ => Pass,
    }
}
