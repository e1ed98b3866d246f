//! Point-in-closed-surface queries.
//!
//! A point is inside a closed object iff an axis-parallel ray from it
//! crosses the object's walls an odd number of times. Ambiguous crossings
//! (grazing an edge or corner) are excluded from the count on both walls
//! sharing the feature, which makes points on edges land on the inside.

use glam::DVec3;

use crate::collide::{collide_wall, WallHit};
use crate::error::SimError;
use crate::object::ObjectId;
use crate::partition::Partition;
use crate::rng::SimRng;

/// Odd-parity containment test against one closed object.
///
/// Casts a +x ray of the partition's edge length and counts unambiguous
/// wall hits. Fails on objects that are not closed.
pub fn is_point_inside_object(
    p: &Partition,
    object_id: ObjectId,
    point: DVec3,
    rng: &mut SimRng,
) -> Result<bool, SimError> {
    let object = &p.objects[object_id];
    if !object.is_closed {
        return Err(SimError::geometry(format!(
            "containment query against open object '{}'",
            object.name
        )));
    }

    let ray = DVec3::new(p.edge_length(), 0.0, 0.0);
    let mut hits = 0usize;
    for &wi in &object.wall_indices {
        let mut d = ray;
        match collide_wall(point, &mut d, &p.walls[wi], &p.vertices, rng, false) {
            WallHit::Hit { .. } => hits += 1,
            WallHit::Redo | WallHit::Miss => {}
        }
    }
    Ok(hits % 2 == 1)
}

/// Containment against a region: the walls of the region's object, with
/// the same parity rule. Regions inherit their object's closure.
pub fn is_point_inside_region(
    p: &Partition,
    region_id: usize,
    point: DVec3,
    rng: &mut SimRng,
) -> Result<bool, SimError> {
    let object_id = p.regions[region_id].object_id;
    is_point_inside_object(p, object_id, point, rng)
}
