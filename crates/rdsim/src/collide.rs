//! Collision detectors: molecule-molecule disk test, ray-triangle wall
//! test with grazing disambiguation, and the moving-edge test kept for
//! dynamic-geometry extensions.
//!
//! Collision outcomes are small tagged variants; no dispatch happens on hot
//! paths. Any routine returning `Redo` has perturbed the displacement (for
//! `update_move` callers) and expects the caller to clear its collision
//! list and restart tracing. Parity callers pass `update_move = false`,
//! never perturb, and treat `Redo` as "count neither way".

use glam::DVec3;

use crate::constants::EPS;
use crate::geom::{abs_max_2vec, cross2, jump_away_line};
use crate::rng::SimRng;
use crate::wall::Wall;

/// Which side of the wall a ray hit, by the wall normal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitSide {
    /// Hit from the side the normal points into (`displacement · n < 0`).
    Front,
    /// Hit from behind (`displacement · n > 0`).
    Back,
}

/// Outcome of a ray-triangle test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WallHit {
    Miss,
    /// Geometry was ambiguous under this displacement; retry.
    Redo,
    Hit {
        side: HitSide,
        /// Fraction of the displacement consumed at the hit, in [0, 1].
        time: f64,
        pos: DVec3,
    },
}

/// Interaction-disk test between a moving molecule and a stationary target.
///
/// The target collides iff it lies ahead of the motion (`r·d >= 0`), within
/// the step (`r·d <= |d|²`) and within the interaction radius of the path
/// (`|d|²|r|² − (r·d)² <= |d|²σ²`). Self and defunct targets are rejected
/// by the caller. Returns the collision fraction and point.
pub fn collide_mol(
    moving_pos: DVec3,
    displacement: DVec3,
    target_pos: DVec3,
    rx_radius: f64,
) -> Option<(f64, DVec3)> {
    let dir = target_pos - moving_pos;

    let d = dir.dot(displacement);
    if d < 0.0 {
        return None; // behind us
    }

    let movelen2 = displacement.length_squared();
    if d > movelen2 {
        return None; // beyond this step
    }

    let dirlen2 = dir.length_squared();
    let sigma2 = rx_radius * rx_radius;
    if movelen2 * dirlen2 - d * d > movelen2 * sigma2 {
        return None; // passes outside the interaction disk
    }

    let time = d / movelen2;
    Some((time, moving_pos + time * displacement))
}

/// Ray-triangle test against one wall.
///
/// When `update_move` is set, coplanar starts and edge/corner grazes
/// perturb `displacement` in place and return [`WallHit::Redo`]; the caller
/// restarts wall iteration with the new displacement. Without
/// `update_move` the displacement is never touched and `Redo` only marks
/// the test as unusable for parity counting.
pub fn collide_wall(
    pos: DVec3,
    displacement: &mut DVec3,
    wall: &Wall,
    vertices: &[DVec3],
    rng: &mut SimRng,
    update_move: bool,
) -> WallHit {
    let nrm = wall.normal;
    let dp = nrm.dot(pos);
    let dv = nrm.dot(*displacement);
    let dd = dp - wall.distance_to_origin;

    if dd > 0.0 {
        if dd + dv > 0.0 {
            return WallHit::Miss; // stays on the front side
        }
    } else if dd < 0.0 {
        if dd + dv < 0.0 {
            return WallHit::Miss; // stays on the back side
        }
    } else {
        // start exactly on the plane
        if dv.abs() < EPS {
            // coplanar path: slide the endpoint off the plane and retry
            if update_move {
                let a = rng.sign() * (abs_max_2vec(pos, *displacement) + 1.0) * EPS;
                *displacement -= a * nrm;
                return WallHit::Redo;
            }
            return WallHit::Miss;
        }
    }

    let a = -dd / dv;
    if !(0.0..=1.0).contains(&a) {
        return WallHit::Miss;
    }
    let hit = pos + a * *displacement;

    // triangle containment in the wall's local frame
    let uv = wall.xyz_to_uv(hit, vertices);
    let corners = wall.uv_corners();
    let mut signs = [0.0; 3];
    for k in 0..3 {
        let c0 = corners[k];
        let c1 = corners[(k + 1) % 3];
        signs[k] = cross2(c1 - c0, uv - c0);
    }

    let tol = EPS * (1.0 + uv.length());
    let all_nonneg = signs.iter().all(|&s| s >= -tol);
    let all_nonpos = signs.iter().all(|&s| s <= tol);
    if !(all_nonneg || all_nonpos) {
        return WallHit::Miss;
    }

    if let Some(k) = (0..3).find(|&k| signs[k].abs() <= tol) {
        // grazing an edge or corner: ambiguous
        if update_move {
            let e0 = vertices[wall.vertex_indices[k]];
            let e1 = vertices[wall.vertex_indices[(k + 1) % 3]];
            jump_away_line(pos, displacement, a, e0, e1, nrm, rng);
            return WallHit::Redo;
        }
        return WallHit::Redo;
    }

    let side = if dv > 0.0 {
        HitSide::Back
    } else {
        HitSide::Front
    };
    WallHit::Hit {
        side,
        time: a,
        pos: hit,
    }
}

/// Mirror a displacement off a wall plane.
///
/// Only the component along the normal flips; the remaining fraction
/// `1 − time` of the motion continues from the hit point.
#[inline]
pub fn reflect_displacement(displacement: DVec3, normal: DVec3, time: f64) -> DVec3 {
    (displacement - 2.0 * displacement.dot(normal) * normal) * (1.0 - time)
}

/// Candidate crossing time between a molecule segment `e → f` and a wall
/// edge moving linearly from `(k, m)` to `(l, n)` over t in [0, 1].
///
/// The four points are coplanar exactly when
/// `F(t) = ⟨(e − f) × (o(t) − f), p(t) − e⟩` vanishes, where `o(t)` and
/// `p(t)` are the moving edge endpoints. F is iterated to zero by Newton's
/// method (`|t − t_prev| < EPS` converges; a vanishing derivative with
/// nonzero F means no crossing), then the static segment-segment test runs
/// at the converged time. Kept for dynamic-geometry extensions; the kernel
/// never calls it.
pub fn collide_moving_line(
    e: DVec3,
    f: DVec3,
    k: DVec3,
    l: DVec3,
    m: DVec3,
    n: DVec3,
) -> Option<f64> {
    // F(t) = (c0 + t·c1) · ((m − e) + t·(n − m)) is quadratic in t
    let ef = e - f;
    let c0 = ef.cross(k - f);
    let c1 = ef.cross(l - k);
    let b0 = m - e;
    let b1 = n - m;

    let qa = c1.dot(b1);
    let qb = c1.dot(b0) + c0.dot(b1);
    let qc = c0.dot(b0);

    let eval = |t: f64| qa * t * t + qb * t + qc;
    let deriv = |t: f64| 2.0 * qa * t + qb;

    let mut t = 0.5;
    let mut converged = false;
    for _ in 0..64 {
        let ft = eval(t);
        let dft = deriv(t);
        if dft.abs() < EPS {
            if ft.abs() < EPS {
                converged = true;
            }
            break;
        }
        let t_next = t - ft / dft;
        if (t_next - t).abs() < EPS {
            t = t_next;
            converged = true;
            break;
        }
        t = t_next;
    }
    if !converged || !(0.0..=1.0).contains(&t) || eval(t).abs() > 1e-9 {
        return None;
    }

    // static segment-segment test in the shared plane at time t
    let o = k + t * (l - k);
    let p = m + t * (n - m);
    let u = f - e;
    let v = p - o;
    let w0 = o - e;
    let uv = u.cross(v);
    let denom = uv.length_squared();
    if denom < EPS {
        return None; // parallel
    }
    let s = w0.cross(v).dot(uv) / denom;
    let w = w0.cross(u).dot(uv) / denom;
    if (0.0..=1.0).contains(&s) && (0.0..=1.0).contains(&w) {
        Some(t)
    } else {
        None
    }
}
