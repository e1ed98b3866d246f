//! Enumerating the subpartitions crossed by a displacement.
//!
//! The walker steps a segment through the uniform grid one boundary plane
//! at a time (a slab walk): along each axis the parametric time to the next
//! subpartition plane is kept, and each step advances the axis with the
//! smallest time. Every pierced subpartition is collected in path order for
//! wall testing; a superset with a "halo" of neighbors within
//! `rx_radius·√2` of the path is collected for molecule testing, since a
//! collision partner's interaction disk can reach across a boundary the
//! path itself never crosses. The √2 inflation covers the corner-distance
//! underestimate of the per-axis margin test.

use glam::{DVec3, IVec3};
use rustc_hash::FxHashSet;

use crate::constants::{EPS, SQRT_2};
use crate::partition::Partition;

/// Output of the walk.
#[derive(Debug)]
pub struct CrossedSubparts {
    /// Subpartitions the open segment pierces, in path order, start first.
    /// Used for wall collision testing.
    pub wall_subparts: Vec<usize>,
    /// Pierced subpartitions plus the near-path halo; used for molecule
    /// collision candidate gathering.
    pub molecule_subparts: FxHashSet<usize>,
    /// Subpartition of the displaced endpoint, if it stays in the box.
    pub dest_subpart: Option<usize>,
}

/// Walk `pos → pos + displacement` through the subpartition grid.
///
/// An axis with |displacement| below EPS never advances. When two boundary
/// times coincide within EPS the tie breaks x → y → z. Leaving the grid is
/// a clean miss: the walk stops, and the destination halo is still added.
pub fn collect_crossed_subparts(
    p: &Partition,
    pos: DVec3,
    displacement: DVec3,
    start_subpart: usize,
) -> CrossedSubparts {
    let halo_r = p.rx_radius() * SQRT_2;
    let edge = p.subpart_edge();

    let mut wall_subparts = vec![start_subpart];
    let mut molecule_subparts = FxHashSet::default();
    molecule_subparts.insert(start_subpart);

    let start_idx3 = p.subpart_3d_from_index(start_subpart);
    add_halo(p, pos, start_idx3, halo_r, &mut molecule_subparts);

    let dest_pos = pos + displacement;
    let dest_subpart = p.subpart_index_from_pos(dest_pos);

    if dest_subpart != Some(start_subpart) {
        // parametric times to the next boundary plane along each axis
        let mut step = [0i32; 3];
        let mut t_next = [f64::INFINITY; 3];
        let mut t_delta = [f64::INFINITY; 3];
        let d = [displacement.x, displacement.y, displacement.z];
        let rel = pos - p.subpart_llf(start_idx3);
        let rel = [rel.x, rel.y, rel.z];
        for axis in 0..3 {
            if d[axis].abs() < EPS {
                continue;
            }
            step[axis] = if d[axis] > 0.0 { 1 } else { -1 };
            let dist_to_plane = if d[axis] > 0.0 { edge - rel[axis] } else { rel[axis] };
            t_next[axis] = dist_to_plane / d[axis].abs();
            t_delta[axis] = edge / d[axis].abs();
        }

        let mut curr = [start_idx3.x, start_idx3.y, start_idx3.z];
        loop {
            // smallest boundary time; x beats y beats z on EPS ties
            let mut axis = 0;
            for a in 1..3 {
                if t_next[a] < t_next[axis] - EPS {
                    axis = a;
                }
            }
            if !t_next[axis].is_finite() || t_next[axis] >= 1.0 {
                break; // destination lies in the current subpartition
            }

            curr[axis] += step[axis];
            let curr_idx3 = IVec3::new(curr[0], curr[1], curr[2]);
            if !p.subpart_in_bounds(curr_idx3) {
                break; // leaving the grid: clean miss
            }
            let idx = p
                .subpart_index_from_3d(curr_idx3)
                .expect("checked in bounds");
            wall_subparts.push(idx);
            molecule_subparts.insert(idx);

            let crossing = pos + displacement * t_next[axis];
            add_halo(p, crossing, curr_idx3, halo_r, &mut molecule_subparts);

            if Some(idx) == dest_subpart {
                break;
            }
            t_next[axis] += t_delta[axis];
        }
    }

    if let Some(dest) = dest_subpart {
        molecule_subparts.insert(dest);
        let mut dest_idx3 = p.subpart_3d_from_pos(dest_pos);
        let n = p.num_subparts_per_dim() as i32;
        dest_idx3 = dest_idx3.clamp(IVec3::ZERO, IVec3::splat(n - 1));
        add_halo(p, dest_pos, dest_idx3, halo_r, &mut molecule_subparts);
    }

    CrossedSubparts {
        wall_subparts,
        molecule_subparts,
        dest_subpart,
    }
}

/// Insert the neighbors of `idx3` that lie within `halo_r` of `point`:
/// per axis the face neighbor, plus the edge and corner neighbors whose
/// axis margins all triggered.
fn add_halo(
    p: &Partition,
    point: DVec3,
    idx3: IVec3,
    halo_r: f64,
    set: &mut FxHashSet<usize>,
) {
    if halo_r <= 0.0 {
        return;
    }
    let rel = point - p.subpart_llf(idx3);
    let rel = [rel.x, rel.y, rel.z];
    let edge = p.subpart_edge();

    let mut dir = [0i32; 3];
    for axis in 0..3 {
        if rel[axis] < halo_r {
            dir[axis] = -1;
        } else if edge - rel[axis] < halo_r {
            dir[axis] = 1;
        }
    }

    for mask in 1u8..8 {
        let mut offset = [0i32; 3];
        let mut applicable = true;
        for axis in 0..3 {
            if mask & (1 << axis) != 0 {
                if dir[axis] == 0 {
                    applicable = false;
                    break;
                }
                offset[axis] = dir[axis];
            }
        }
        if applicable {
            let neighbor = idx3 + IVec3::new(offset[0], offset[1], offset[2]);
            if let Some(idx) = p.subpart_index_from_3d(neighbor) {
                set.insert(idx);
            }
        }
    }
}
