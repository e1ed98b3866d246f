//! Release sites: scheduled creation of molecules.
//!
//! A release site places a fixed number of molecules of one species at its
//! release time: at a point, uniformly in a box, uniformly inside a closed
//! object (rejection sampling against the containment test), or uniformly
//! over a surface region (area-weighted wall choice, then a uniform point
//! in the triangle and its tile).

use glam::DVec3;

use crate::containment::is_point_inside_object;
use crate::diffuse::StepCtx;
use crate::error::SimError;
use crate::molecule::MoleculeId;
use crate::object::{ObjectId, RegionId};
use crate::species::SpeciesId;
use crate::wall::WallIndex;

/// Where a release puts its molecules.
#[derive(Clone, Debug)]
pub enum ReleaseShape {
    /// All molecules at one point.
    Point(DVec3),
    /// Uniform in an axis-aligned box.
    Box { min: DVec3, max: DVec3 },
    /// Uniform inside a closed object.
    InsideObject(ObjectId),
    /// Uniform over the walls of a region, on free tiles.
    SurfaceRegion(RegionId),
}

/// One release site.
#[derive(Clone, Debug)]
pub struct ReleaseSite {
    pub name: String,
    pub species_id: SpeciesId,
    pub count: usize,
    /// Absolute release time (s).
    pub time: f64,
    pub shape: ReleaseShape,
    /// Wall side for surface releases (+1 front, -1 back).
    pub orientation: i8,
}

/// Bound on rejection-sampling rounds per molecule.
const MAX_PLACEMENT_TRIES: usize = 10_000;

/// Execute one release, returning the created molecule ids in creation
/// order.
pub(crate) fn execute_release(
    ctx: &mut StepCtx,
    site: &ReleaseSite,
) -> Result<Vec<MoleculeId>, SimError> {
    let species = ctx.species.get(site.species_id).clone();
    let mut created = Vec::with_capacity(site.count);

    match site.shape {
        ReleaseShape::Point(pos) => {
            for _ in 0..site.count {
                created.push(ctx.partition.add_volume_molecule(&species, pos)?);
            }
        }
        ReleaseShape::Box { min, max } => {
            let extent = max - min;
            for _ in 0..site.count {
                let pos = min
                    + DVec3::new(
                        ctx.rng.dbl() * extent.x,
                        ctx.rng.dbl() * extent.y,
                        ctx.rng.dbl() * extent.z,
                    );
                created.push(ctx.partition.add_volume_molecule(&species, pos)?);
            }
        }
        ReleaseShape::InsideObject(object_id) => {
            let (min, max) = object_aabb(ctx, object_id);
            let extent = max - min;
            for _ in 0..site.count {
                let mut placed = false;
                for _ in 0..MAX_PLACEMENT_TRIES {
                    let pos = min
                        + DVec3::new(
                            ctx.rng.dbl() * extent.x,
                            ctx.rng.dbl() * extent.y,
                            ctx.rng.dbl() * extent.z,
                        );
                    if is_point_inside_object(ctx.partition, object_id, pos, ctx.rng)? {
                        created.push(ctx.partition.add_volume_molecule(&species, pos)?);
                        placed = true;
                        break;
                    }
                }
                if !placed {
                    return Err(SimError::config(format!(
                        "release '{}' could not place a molecule inside object {object_id}",
                        site.name
                    )));
                }
            }
        }
        ReleaseShape::SurfaceRegion(region_id) => {
            let walls: Vec<WallIndex> = ctx.partition.regions[region_id].wall_indices.clone();
            if walls.is_empty() {
                return Err(SimError::config(format!(
                    "release '{}' targets an empty region",
                    site.name
                )));
            }
            // cumulative wall areas for an area-weighted pick
            let mut cum_areas = Vec::with_capacity(walls.len());
            let mut total = 0.0;
            for &wi in &walls {
                total += ctx.partition.walls[wi].area;
                cum_areas.push(total);
            }
            for &wi in &walls {
                ctx.partition.get_or_create_grid(wi);
            }

            for _ in 0..site.count {
                let mut placed = false;
                for _ in 0..MAX_PLACEMENT_TRIES {
                    let r = ctx.rng.dbl() * total;
                    let pick = cum_areas.partition_point(|&c| c < r).min(walls.len() - 1);
                    let wi = walls[pick];

                    let wall = &ctx.partition.walls[wi];
                    let mut r1 = ctx.rng.dbl();
                    let mut r2 = ctx.rng.dbl();
                    if r1 + r2 > 1.0 {
                        r1 = 1.0 - r1;
                        r2 = 1.0 - r2;
                    }
                    let corners = wall.uv_corners();
                    let uv = corners[0]
                        + r1 * (corners[1] - corners[0])
                        + r2 * (corners[2] - corners[0]);

                    let grid = wall.grid.as_ref().expect("grid created above");
                    let tile = grid.uv_to_tile(uv);
                    if grid.occupant(tile).is_some() {
                        continue; // tile taken, draw again
                    }
                    created.push(ctx.partition.add_surface_molecule(
                        &species,
                        wi,
                        tile,
                        uv,
                        site.orientation,
                    )?);
                    placed = true;
                    break;
                }
                if !placed {
                    log::warn!(
                        "release '{}': no free tile found after {MAX_PLACEMENT_TRIES} tries; released {} of {}",
                        site.name,
                        created.len(),
                        site.count
                    );
                    break;
                }
            }
        }
    }

    Ok(created)
}

/// AABB over an object's wall vertices.
fn object_aabb(ctx: &StepCtx, object_id: ObjectId) -> (DVec3, DVec3) {
    let mut min = DVec3::splat(f64::INFINITY);
    let mut max = DVec3::splat(f64::NEG_INFINITY);
    for &wi in &ctx.partition.objects[object_id].wall_indices {
        for corner in ctx.partition.walls[wi].corners(&ctx.partition.vertices) {
            min = min.min(corner);
            max = max.max(corner);
        }
    }
    (min, max)
}
