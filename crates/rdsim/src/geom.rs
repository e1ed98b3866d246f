//! Planar and triangle geometry primitives.
//!
//! Everything here is pure and deterministic; the only routine that touches
//! the RNG is [`jump_away_line`], which needs one bit to pick a perturbation
//! side.

use glam::{DVec2, DVec3};

use crate::constants::EPS;
use crate::rng::SimRng;

/// 2D cross product in the (u, v) wall-frame convention:
/// `cross2(a, b) = a.v * b.u - a.u * b.v`.
#[inline]
pub fn cross2(a: DVec2, b: DVec2) -> f64 {
    a.y * b.x - a.x * b.y
}

/// Are `a` and `b` distinguishable at relative tolerance `eps`?
///
/// Magnitudes below 1 are compared on an absolute scale so that values near
/// zero do not collapse the tolerance.
#[inline]
pub fn distinguishable(a: f64, b: f64, eps: f64) -> bool {
    let c = (a - b).abs();
    let a = a.abs().max(1.0);
    let b = b.abs();
    c > if b < a { a * eps } else { b * eps }
}

/// Largest absolute component over two vectors.
#[inline]
pub fn abs_max_2vec(a: DVec3, b: DVec3) -> f64 {
    a.abs().max_element().max(b.abs().max_element())
}

/// Is `p` inside (or on the boundary of) triangle `(a, b, c)` in 2D?
///
/// The three edge cross products must agree in sign; zeros count as inside
/// so boundary points are accepted.
pub fn point_in_triangle_2d(p: DVec2, a: DVec2, b: DVec2, c: DVec2) -> bool {
    let s0 = cross2(b - a, p - a);
    let s1 = cross2(c - b, p - b);
    let s2 = cross2(a - c, p - c);
    (s0 >= 0.0 && s1 >= 0.0 && s2 >= 0.0) || (s0 <= 0.0 && s1 <= 0.0 && s2 <= 0.0)
}

/// Closest point to `p` on triangle `(a, b, c)`.
///
/// Voronoi-region case analysis after Ericson, "Real-Time Collision
/// Detection" §5.1.5: test the vertex regions, then the edge regions, then
/// project into the face.
pub fn closest_point_on_triangle(p: DVec3, a: DVec3, b: DVec3, c: DVec3) -> DVec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + v * ab;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + w * ac;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + w * (c - b);
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Outcome of [`find_edge_point`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EdgePoint {
    /// The displaced point stays inside the triangle.
    Inside,
    /// The displacement leaves through this edge first (0, 1 or 2); the
    /// payload is the fraction of the displacement consumed at the crossing.
    Edge(usize, f64),
    /// The test is ambiguous; the caller must perturb and retry.
    Ambiguous,
}

/// Which triangle edge does a 2D displacement leave through first?
///
/// The triangle is the wall's local frame: `a = (0,0)`, `b = (u1, 0)`,
/// `c = uv_vert2`. Edge k joins vertex k to vertex k+1 (mod 3). For each
/// edge, solve for the displacement fraction t at which the moving point
/// crosses the edge's supporting line, and accept the smallest t in (0, 1)
/// that also lands within the edge segment (0 < s < 1). Near-zero
/// denominators and near-coincident candidate fractions make the test
/// ambiguous.
pub fn find_edge_point(loc: DVec2, disp: DVec2, u1: f64, vert2: DVec2) -> EdgePoint {
    let verts = [DVec2::ZERO, DVec2::new(u1, 0.0), vert2];

    let mut best_edge: Option<usize> = None;
    let mut best_t = f64::INFINITY;
    let mut ambiguous = false;

    for k in 0..3 {
        let e0 = verts[k];
        let e1 = verts[(k + 1) % 3];
        let edge = e1 - e0;

        // The crossing satisfies loc + t*disp = e0 + s*edge.
        let denom = cross2(disp, edge);
        if denom.abs() < EPS {
            continue; // moving parallel to this edge
        }
        let rel = e0 - loc;
        let t = cross2(rel, edge) / denom;
        let s = cross2(rel, disp) / denom;
        // sub-EPS fractions also cover re-testing the edge a traversal
        // just came through, where rounding leaves the point a hair outside
        if t <= EPS || t >= 1.0 || s < -EPS || s > 1.0 + EPS {
            continue;
        }
        if s <= EPS || s >= 1.0 - EPS {
            // the path threads a corner: neither incident edge can claim it
            ambiguous = true;
            continue;
        }
        if t < best_t - EPS {
            best_t = t;
            best_edge = Some(k);
        } else if (t - best_t).abs() <= EPS {
            // two edges claim the same crossing fraction: a corner hit
            ambiguous = true;
        }
    }

    if ambiguous {
        return EdgePoint::Ambiguous;
    }
    match best_edge {
        Some(k) => EdgePoint::Edge(k, best_t),
        None => EdgePoint::Inside,
    }
}

/// Nudge a displacement off an edge it grazes.
///
/// `p` is the molecule position, `v` the displacement to perturb, `k` the
/// collision fraction at which the grazing was detected, `(a, b)` the edge
/// endpoints and `n` the wall normal. The perturbation is applied along
/// `f = n × (b − a)/|b − a|` (the in-plane direction perpendicular to the
/// edge), with a magnitude tiny relative to the operands and a side chosen
/// by one RNG bit. The caller restarts collision testing afterwards.
pub fn jump_away_line(p: DVec3, v: &mut DVec3, k: f64, a: DVec3, b: DVec3, n: DVec3, rng: &mut SimRng) {
    let e = (b - a).normalize();
    let f = n.cross(e);
    let f_max = f.abs().max_element();
    if f_max < EPS {
        return; // degenerate edge; nothing sensible to do
    }
    let tiny = rng.sign() * EPS * (abs_max_2vec(p, *v) + 1.0) / (k.abs().max(EPS) * f_max);
    *v += tiny * f;
}

/// Reflect a 2D vector across a line through the origin with direction `e`.
#[inline]
pub fn reflect_2d(v: DVec2, e: DVec2) -> DVec2 {
    let e = e.normalize();
    2.0 * v.dot(e) * e - v
}
