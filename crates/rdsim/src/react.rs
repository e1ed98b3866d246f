//! Reaction probability gates and the reaction executor.
//!
//! The gates decide whether a candidate collision fires and which pathway
//! it takes; the executor places products, tombstones the consumed
//! reactants and emits reaction records. Every gate consumes exactly one
//! uniform draw, charged to the shared RNG whether or not the reaction
//! fires, so identical seeds reproduce runs bit-exactly.

use glam::{DVec2, DVec3};

use crate::constants::{EPS, FOREVER, PRODUCT_WALL_OFFSET};
use crate::diffuse::StepCtx;
use crate::error::SimError;
use crate::geom::distinguishable;
use crate::molecule::{MoleculeId, MoleculeState};
use crate::output::{ReactionKind, ReactionRecord};
use crate::reaction::{RxnClass, RxnClassId};
use crate::rng::SimRng;
use crate::scheduler::{ActionKind, MoleculeAction};
use crate::wall::WallIndex;

// ---------------------------------------------------------------------------
// probability gates
// ---------------------------------------------------------------------------

/// Sample the lifetime of a molecule with unimolecular reaction class
/// `class`: exponential with rate `max_fixed_p`. Returns effectively
/// infinity for zero rates or a zero draw.
pub(crate) fn sample_unimol_lifetime(class: &RxnClass, rng: &mut SimRng) -> f64 {
    let k_tot = class.max_fixed_p;
    let p = rng.dbl();
    if k_tot <= 0.0 || !distinguishable(p, 0.0, EPS) {
        FOREVER
    } else {
        -p.ln() / k_tot
    }
}

/// Single-class bimolecular gate.
///
/// `scaling` compensates for a partial timestep (1/sqrt(steps));
/// `local_factor` is positive only for reactions between two surface
/// molecules and otherwise zero. Instead of scaling the cumulative
/// probability array, the random draw is scaled. Returns the chosen
/// pathway, or None when no reaction occurs. When the probabilities cannot
/// be scaled into range the reaction fires regardless and the shortfall is
/// only a matter of miss accounting.
pub(crate) fn test_bimolecular(
    class: &RxnClass,
    scaling: f64,
    local_factor: f64,
    rng: &mut SimRng,
) -> Option<usize> {
    let lf = local_factor.max(1.0);
    let p_min = class.min_noreaction_p * lf;

    if p_min < scaling {
        let p = rng.dbl() * scaling;
        if p >= p_min {
            None
        } else {
            Some(class.pick_pathway(p, lf))
        }
    } else {
        let p_max = class.max_fixed_p * lf;
        if p_max >= scaling {
            let p = rng.dbl() * p_max;
            Some(class.pick_pathway(p, lf))
        } else {
            let p = rng.dbl() * scaling;
            if p >= p_max {
                None
            } else {
                Some(class.pick_pathway(p, lf))
            }
        }
    }
}

/// Multi-class bimolecular gate: several classes compete for one collision.
///
/// Builds the cumulative `C[i] = C[i-1] + max_fixed_p_i · lf / scaling_i`,
/// draws once, binary-searches the class, then picks the pathway within it
/// from the rescaled residual.
pub(crate) fn test_many_bimolecular(
    classes: &[&RxnClass],
    scalings: &[f64],
    local_factor: f64,
    rng: &mut SimRng,
) -> Option<(usize, usize)> {
    debug_assert_eq!(classes.len(), scalings.len());
    if classes.len() == 1 {
        return test_bimolecular(classes[0], scalings[0], local_factor, rng)
            .map(|pathway| (0, pathway));
    }
    let lf = local_factor.max(1.0);

    let mut cum = Vec::with_capacity(classes.len());
    let mut total = 0.0;
    for (class, &scaling) in classes.iter().zip(scalings) {
        total += class.max_fixed_p * lf / scaling;
        cum.push(total);
    }

    let p = if total > 1.0 {
        rng.dbl() * total
    } else {
        let p = rng.dbl();
        if p > total {
            return None;
        }
        p
    };

    let class_index = cum.partition_point(|&c| c < p).min(classes.len() - 1);
    let below = if class_index > 0 { cum[class_index - 1] } else { 0.0 };
    let p_in_class = (p - below) * scalings[class_index];
    Some((class_index, classes[class_index].pick_pathway(p_in_class, lf)))
}

// ---------------------------------------------------------------------------
// unimolecular scheduling
// ---------------------------------------------------------------------------

/// First-touch unimolecular scheduling: sample the lifetime and file the
/// reaction either into this event's FIFO (due inside the window) or into
/// the partition's calendar for a later event.
pub(crate) fn schedule_unimol(
    ctx: &mut StepCtx,
    id: MoleculeId,
    current_time: f64,
    event_end: f64,
    ts_index: usize,
    fifo: &mut Vec<MoleculeAction>,
) {
    let species_id = {
        let m = ctx.partition.molecule_mut(id);
        m.unimol_scheduled = true;
        m.species_id
    };
    let Some(class) = ctx.reactions.pick_unimol(species_id) else {
        return;
    };
    let class_id = class.id;
    let lifetime = sample_unimol_lifetime(class, ctx.rng);
    if lifetime >= FOREVER {
        return;
    }
    let time = current_time + lifetime;
    ctx.partition.molecule_mut(id).unimol_rx_time = Some(time);

    let action = MoleculeAction {
        molecule_id: id,
        time,
        kind: ActionKind::UnimolReact(class_id),
    };
    if time < event_end {
        fifo.push(action);
    } else {
        ctx.partition.add_unimol_action(ts_index, action);
    }
}

/// Fire a queued unimolecular reaction.
pub(crate) fn react_unimol_single_molecule(
    ctx: &mut StepCtx,
    action: &MoleculeAction,
    event_time: f64,
    event_end: f64,
    fifo: &mut Vec<MoleculeAction>,
) -> Result<(), SimError> {
    let ActionKind::UnimolReact(class_id) = action.kind else {
        unreachable!("diffuse action routed to unimolecular handler");
    };
    let m = ctx.partition.molecule(action.molecule_id);
    if m.is_defunct() {
        return Ok(());
    }
    // a rate change since scheduling invalidates the queued action; the
    // molecule resamples its clock on its next diffusion touch
    if m.unimol_rx_time != Some(action.time) {
        return Ok(());
    }
    if action.time < event_time - 1e-9 * event_time.abs().max(1.0) || action.time > event_end {
        return Err(SimError::MissedUnimolecular {
            molecule_id: action.molecule_id,
            scheduled: action.time,
            event_time,
        });
    }

    let site = match m.state {
        MoleculeState::Volume { pos } => ReactionSite {
            pos,
            uv: None,
            wall: None,
            incoming_side: 0,
            time: action.time,
        },
        MoleculeState::Surface {
            wall,
            uv,
            orientation,
            ..
        } => ReactionSite {
            pos: ctx.partition.walls[wall].uv_to_xyz(uv, &ctx.partition.vertices),
            uv: Some(uv),
            wall: Some(wall),
            incoming_side: orientation,
            time: action.time,
        },
    };

    let class = ctx.reactions.get(class_id);
    // a unimolecular class with several pathways picks one by cumulative
    // probability on a fresh draw
    let pathway = if class.pathways.len() > 1 {
        let p = ctx.rng.dbl() * class.max_fixed_p;
        class.pick_pathway(p, 1.0)
    } else {
        0
    };

    let fired = execute_reaction(
        ctx,
        class_id,
        pathway,
        &[action.molecule_id],
        site,
        ReactionKind::Unimolecular,
        fifo,
    )?;
    if fired {
        ctx.stats.unimol_reactions += 1;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// executor
// ---------------------------------------------------------------------------

/// Where a reaction happens, with enough context to place its products.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ReactionSite {
    pub pos: DVec3,
    /// Position in the wall frame, for tile targeting.
    pub uv: Option<DVec2>,
    /// Wall context (wall hits and surface reactants).
    pub wall: Option<WallIndex>,
    /// Side the volume reactant approached from: +1 front, -1 back, 0 none.
    pub incoming_side: i8,
    /// Absolute reaction time.
    pub time: f64,
}

enum Placement {
    Volume(DVec3),
    Surface {
        wall: WallIndex,
        tile: usize,
        uv: DVec2,
        orientation: i8,
    },
}

/// Execute one pathway: place products, defunct reactants, emit the record
/// and queue residual product diffusion.
///
/// Placement is planned before anything is mutated: if a surface product
/// cannot find a free tile within the vacancy search distance the whole
/// reaction is rejected, the reactants survive, and only a counter and a
/// log line remain.
pub(crate) fn execute_reaction(
    ctx: &mut StepCtx,
    class_id: RxnClassId,
    pathway_index: usize,
    reactant_ids: &[MoleculeId],
    site: ReactionSite,
    kind: ReactionKind,
    fifo: &mut Vec<MoleculeAction>,
) -> Result<bool, SimError> {
    // tiles freed by consumed surface reactants are fair game for products
    let mut freed_tiles: Vec<(WallIndex, usize)> = Vec::new();
    for &rid in reactant_ids {
        if let MoleculeState::Surface { wall, tile, .. } = ctx.partition.molecule(rid).state {
            freed_tiles.push((wall, tile));
        }
    }

    let products = ctx.reactions.get(class_id).pathways[pathway_index]
        .products
        .clone();

    // plan placements first; nothing is mutated until every product fits
    let mut planned: Vec<(usize, Placement)> = Vec::with_capacity(products.len());
    let mut claimed: Vec<(WallIndex, usize)> = Vec::new();
    for (i, product) in products.iter().enumerate() {
        let species = ctx.species.get(product.species_id);
        if species.is_surface {
            let Some(wall) = site.wall else {
                log::warn!(
                    "surface product of species '{}' in a reaction without wall context; skipped",
                    species.name
                );
                return Ok(false);
            };
            // the grid must exist before planning against it
            ctx.partition.get_or_create_grid(wall);
            let desired_uv = site.uv.unwrap_or_else(|| {
                ctx.partition.walls[wall].xyz_to_uv(site.pos, &ctx.partition.vertices)
            });
            let Some((tile, uv)) =
                plan_surface_placement(ctx, wall, desired_uv, &freed_tiles, &mut claimed)
            else {
                ctx.stats.tile_full_rejections += 1;
                log::warn!(
                    "no free tile within the vacancy search distance for product '{}'; reaction rejected",
                    species.name
                );
                return Ok(false);
            };
            let orientation = if product.orientation != 0 {
                product.orientation
            } else {
                1
            };
            planned.push((
                i,
                Placement::Surface {
                    wall,
                    tile,
                    uv,
                    orientation,
                },
            ));
        } else {
            let pos = match site.wall {
                Some(wall) => {
                    // Nudge off the wall plane toward the product's side.
                    // The offset must exceed the immediate-collision cutoff
                    // or the product would tunnel through the wall on its
                    // first step.
                    let side = if product.orientation != 0 {
                        product.orientation
                    } else if site.incoming_side != 0 {
                        site.incoming_side
                    } else {
                        1
                    };
                    let normal = ctx.partition.walls[wall].normal;
                    let nudge = PRODUCT_WALL_OFFSET * (1.0 + site.pos.abs().max_element());
                    site.pos + normal * (nudge * side as f64)
                }
                None => site.pos,
            };
            planned.push((i, Placement::Volume(pos)));
        }
    }

    // commit: reactants out, products in
    for &rid in reactant_ids {
        ctx.partition.set_molecule_as_defunct(rid);
    }

    let mut product_ids = Vec::with_capacity(planned.len());
    for (i, placement) in planned {
        let species = ctx.species.get(products[i].species_id).clone();
        let new_id = match placement {
            Placement::Volume(pos) => ctx.partition.add_volume_molecule(&species, pos)?,
            Placement::Surface {
                wall,
                tile,
                uv,
                orientation,
            } => ctx
                .partition
                .add_surface_molecule(&species, wall, tile, uv, orientation)?,
        };
        product_ids.push(new_id);
        // residual diffusion of the new product within this event
        fifo.push(MoleculeAction {
            molecule_id: new_id,
            time: site.time,
            kind: ActionKind::Diffuse,
        });
    }

    ctx.records.push(ReactionRecord {
        time: site.time,
        kind,
        reactants: reactant_ids.to_vec(),
        products: product_ids,
        pos: site.pos,
    });
    Ok(true)
}

/// Find a tile for a surface product: the tile under the desired point if
/// available (or freed by a consumed reactant), otherwise the nearest free
/// tile by centroid distance within `vacancy_search_dist2`. Tiles already
/// claimed for earlier products of the same reaction are skipped.
fn plan_surface_placement(
    ctx: &mut StepCtx,
    wall: WallIndex,
    desired_uv: DVec2,
    freed_tiles: &[(WallIndex, usize)],
    claimed: &mut Vec<(WallIndex, usize)>,
) -> Option<(usize, DVec2)> {
    let randomize = ctx.config.randomize_smol_pos;
    let vacancy_dist2 = ctx.config.vacancy_search_dist2;

    let tile_free = |grid: &crate::wall::WallGrid, tile: usize| -> bool {
        !claimed.contains(&(wall, tile))
            && (grid.occupant(tile).is_none() || freed_tiles.contains(&(wall, tile)))
    };

    let grid = ctx.partition.walls[wall].grid.as_ref().expect("grid created");
    let desired_tile = grid.uv_to_tile(desired_uv);

    let mut chosen: Option<usize> = None;
    if tile_free(grid, desired_tile) {
        chosen = Some(desired_tile);
    } else {
        let mut best_dist2 = vacancy_dist2;
        for tile in 0..grid.num_tiles {
            if !tile_free(grid, tile) {
                continue;
            }
            let d2 = (grid.tile_to_uv(tile) - desired_uv).length_squared();
            if d2 <= best_dist2 {
                // ties resolve to the lowest tile index
                if d2 < best_dist2 || chosen.is_none() {
                    best_dist2 = d2;
                    chosen = Some(tile);
                }
            }
        }
    }

    let tile = chosen?;
    claimed.push((wall, tile));
    let uv = if randomize {
        let grid = ctx.partition.walls[wall].grid.as_ref().expect("grid created");
        grid.tile_to_uv_random(tile, ctx.rng)
    } else {
        let grid = ctx.partition.walls[wall].grid.as_ref().expect("grid created");
        grid.tile_to_uv(tile)
    };
    Some((tile, uv))
}

/// Absorb a molecule at a surface: tombstone it and record the event.
pub(crate) fn absorb_molecule(ctx: &mut StepCtx, id: MoleculeId, pos: DVec3, time: f64) {
    ctx.partition.set_molecule_as_defunct(id);
    ctx.stats.absorptions += 1;
    ctx.records.push(ReactionRecord {
        time,
        kind: ReactionKind::Absorption,
        reactants: vec![id],
        products: Vec::new(),
        pos,
    });
}
