//! Triangle walls, shared-edge frame transforms, and surface tile grids.
//!
//! A wall is one triangle of the static mesh. It carries a precomputed
//! plane (unit normal and signed distance to the origin) and a 2D local
//! frame: vertex 0 maps to (0, 0), vertex 1 to (uv_vert1_u, 0) and vertex 2
//! to uv_vert2. Surface molecules live in this frame.
//!
//! Walls refer to vertices, edges and regions by dense integer index; edges
//! store wall ids rather than pointers so the whole mesh lives in flat
//! vectors with stable indices.

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::constants::EPS;
use crate::error::SimError;
use crate::molecule::MoleculeId;
use crate::object::{ObjectId, RegionId};
use crate::rng::SimRng;

pub type VertexIndex = usize;
pub type WallIndex = usize;
pub type EdgeIndex = usize;

pub const WALL_INDEX_INVALID: WallIndex = usize::MAX;
pub const TILE_INDEX_INVALID: usize = usize::MAX;

/// One triangle of the mesh.
#[derive(Clone, Debug)]
pub struct Wall {
    pub id: WallIndex,
    pub object_id: ObjectId,
    pub vertex_indices: [VertexIndex; 3],
    /// Unit normal of the wall plane.
    pub normal: DVec3,
    /// Signed distance of the plane to the origin (`normal · p = distance`
    /// for points p on the plane).
    pub distance_to_origin: f64,
    /// First local frame axis; points from vertex 0 to vertex 1.
    pub unit_u: DVec3,
    /// Second local frame axis; `normal × unit_u`.
    pub unit_v: DVec3,
    /// u-coordinate of vertex 1 (its v-coordinate is 0 by construction).
    pub uv_vert1_u: f64,
    /// Local frame coordinates of vertex 2.
    pub uv_vert2: DVec2,
    pub area: f64,
    /// Shared-edge records; edge k joins vertex k and vertex k+1 (mod 3).
    pub edges: [EdgeIndex; 3],
    /// Regions this wall belongs to.
    pub regions: Vec<RegionId>,
    /// Tile grid for surface molecule occupancy, created on demand.
    pub grid: Option<WallGrid>,
}

impl Wall {
    /// Build a wall from three vertex indices, computing plane and frame.
    ///
    /// Fails on degenerate (zero-area) triangles.
    pub fn new(
        id: WallIndex,
        object_id: ObjectId,
        vertex_indices: [VertexIndex; 3],
        vertices: &[DVec3],
    ) -> Result<Self, SimError> {
        let v0 = vertices[vertex_indices[0]];
        let v1 = vertices[vertex_indices[1]];
        let v2 = vertices[vertex_indices[2]];

        let e1 = v1 - v0;
        let e2 = v2 - v0;
        let n_raw = e1.cross(e2);
        let twice_area = n_raw.length();
        if twice_area < EPS || e1.length() < EPS {
            return Err(SimError::geometry(format!(
                "degenerate triangle with vertices {vertex_indices:?}"
            )));
        }

        let normal = n_raw / twice_area;
        let unit_u = e1.normalize();
        let unit_v = normal.cross(unit_u);

        Ok(Self {
            id,
            object_id,
            vertex_indices,
            normal,
            distance_to_origin: normal.dot(v0),
            unit_u,
            unit_v,
            uv_vert1_u: e1.length(),
            uv_vert2: DVec2::new(e2.dot(unit_u), e2.dot(unit_v)),
            area: twice_area * 0.5,
            edges: [0; 3],
            regions: Vec::new(),
            grid: None,
        })
    }

    /// Map a local frame point to 3D.
    #[inline]
    pub fn uv_to_xyz(&self, a: DVec2, vertices: &[DVec3]) -> DVec3 {
        vertices[self.vertex_indices[0]] + a.x * self.unit_u + a.y * self.unit_v
    }

    /// Project a 3D point into the local frame.
    #[inline]
    pub fn xyz_to_uv(&self, p: DVec3, vertices: &[DVec3]) -> DVec2 {
        let rel = p - vertices[self.vertex_indices[0]];
        DVec2::new(rel.dot(self.unit_u), rel.dot(self.unit_v))
    }

    /// The triangle corners in the local frame.
    #[inline]
    pub fn uv_corners(&self) -> [DVec2; 3] {
        [
            DVec2::ZERO,
            DVec2::new(self.uv_vert1_u, 0.0),
            self.uv_vert2,
        ]
    }

    /// 3D positions of the three vertices.
    #[inline]
    pub fn corners(&self, vertices: &[DVec3]) -> [DVec3; 3] {
        [
            vertices[self.vertex_indices[0]],
            vertices[self.vertex_indices[1]],
            vertices[self.vertex_indices[2]],
        ]
    }

    /// Is this wall part of the given region?
    #[inline]
    pub fn in_region(&self, region: RegionId) -> bool {
        self.regions.contains(&region)
    }
}

/// A shared edge between two walls, with the rigid 2D transform that
/// flattens one wall's local frame onto the other's across the edge.
///
/// The forward transform maps points in the forward wall's frame to the
/// backward wall's frame: `p' = R·p + translate`, where the unfolded image
/// of the forward triangle lands on the far side of the edge in the
/// backward frame. The backward transform is the exact inverse.
#[derive(Clone, Debug)]
pub struct Edge {
    pub forward_wall: WallIndex,
    pub backward_wall: WallIndex,
    /// Edge index (0..3) of this edge within the forward wall.
    pub forward_edge_index: usize,
    /// Edge index within the backward wall; unused for boundary edges.
    pub backward_edge_index: usize,
    pub cos_theta: f64,
    pub sin_theta: f64,
    pub translate: DVec2,
}

impl Edge {
    /// A boundary edge with no neighbor.
    pub fn boundary(forward_wall: WallIndex, forward_edge_index: usize) -> Self {
        Self {
            forward_wall,
            backward_wall: WALL_INDEX_INVALID,
            forward_edge_index,
            backward_edge_index: 0,
            cos_theta: 1.0,
            sin_theta: 0.0,
            translate: DVec2::ZERO,
        }
    }

    /// Compute the shared-edge transform between two walls.
    ///
    /// The edge's 3D endpoints are taken from the forward wall; their uv
    /// images in both frames determine the rotation (the proper rotation
    /// carrying the edge direction of the forward frame onto the edge
    /// direction of the backward frame) and the translation.
    pub fn shared(
        forward_wall: WallIndex,
        backward_wall: WallIndex,
        forward_edge_index: usize,
        backward_edge_index: usize,
        walls: &[Wall],
        vertices: &[DVec3],
    ) -> Result<Self, SimError> {
        let wf = &walls[forward_wall];
        let wb = &walls[backward_wall];

        let x0 = vertices[wf.vertex_indices[forward_edge_index]];
        let x1 = vertices[wf.vertex_indices[(forward_edge_index + 1) % 3]];

        let a0 = wf.xyz_to_uv(x0, vertices);
        let a1 = wf.xyz_to_uv(x1, vertices);
        let b0 = wb.xyz_to_uv(x0, vertices);
        let b1 = wb.xyz_to_uv(x1, vertices);

        let ef = a1 - a0;
        let eb = b1 - b0;
        if ef.length() < EPS || eb.length() < EPS {
            return Err(SimError::geometry(format!(
                "zero-length shared edge between walls {forward_wall} and {backward_wall}"
            )));
        }
        let ef = ef.normalize();
        let eb = eb.normalize();

        // Proper rotation with R·ef = eb (counter-clockwise convention:
        // R·x = (c·x.u − s·x.v, s·x.u + c·x.v)).
        let cos_theta = ef.dot(eb);
        let sin_theta = ef.x * eb.y - ef.y * eb.x;
        let rotated_a0 = DVec2::new(
            cos_theta * a0.x - sin_theta * a0.y,
            sin_theta * a0.x + cos_theta * a0.y,
        );
        let translate = b0 - rotated_a0;

        Ok(Self {
            forward_wall,
            backward_wall,
            forward_edge_index,
            backward_edge_index,
            cos_theta,
            sin_theta,
            translate,
        })
    }

    /// Does this edge have a wall on both sides?
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.backward_wall != WALL_INDEX_INVALID
    }

    /// The wall on the other side of `wall`, if any.
    #[inline]
    pub fn neighbor_of(&self, wall: WallIndex) -> Option<WallIndex> {
        if !self.is_shared() {
            return None;
        }
        if wall == self.forward_wall {
            Some(self.backward_wall)
        } else {
            Some(self.forward_wall)
        }
    }

    /// Map a point from the forward wall's frame to the backward wall's.
    #[inline]
    pub fn apply_forward(&self, p: DVec2) -> DVec2 {
        DVec2::new(
            self.cos_theta * p.x - self.sin_theta * p.y + self.translate.x,
            self.sin_theta * p.x + self.cos_theta * p.y + self.translate.y,
        )
    }

    /// Map a point from the backward wall's frame to the forward wall's.
    #[inline]
    pub fn apply_backward(&self, p: DVec2) -> DVec2 {
        let q = p - self.translate;
        DVec2::new(
            self.cos_theta * q.x + self.sin_theta * q.y,
            -self.sin_theta * q.x + self.cos_theta * q.y,
        )
    }

    /// Rotate a direction vector from the forward frame to the backward
    /// frame (no translation).
    #[inline]
    pub fn rotate_forward(&self, v: DVec2) -> DVec2 {
        DVec2::new(
            self.cos_theta * v.x - self.sin_theta * v.y,
            self.sin_theta * v.x + self.cos_theta * v.y,
        )
    }

    /// Rotate a direction vector from the backward frame to the forward
    /// frame.
    #[inline]
    pub fn rotate_backward(&self, v: DVec2) -> DVec2 {
        DVec2::new(
            self.cos_theta * v.x + self.sin_theta * v.y,
            -self.sin_theta * v.x + self.cos_theta * v.y,
        )
    }
}

/// Serializable summary of grid occupancy, for diagnostics.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GridOccupancy {
    pub num_tiles: usize,
    pub num_occupied: usize,
}

/// An n×n triangular tile decomposition of one wall.
///
/// The triangle is cut into n horizontal strips of equal v-height; strip s
/// (counted from the apex) holds s+1 upright and s inverted tiles, n² tiles
/// in total, all of equal area. A tile holds at most one surface molecule.
#[derive(Clone, Debug)]
pub struct WallGrid {
    /// Strips per triangle (and upright tiles in the bottom strip).
    pub n: usize,
    /// n².
    pub num_tiles: usize,
    /// n / uv_vert2.v — reciprocal of the strip height.
    pub strip_width_rcp: f64,
    /// Slope of the left edge: uv_vert2.u / uv_vert2.v.
    pub vert2_slope: f64,
    /// (uv_vert1_u − uv_vert2.u) / uv_vert2.v; together with vert2_slope
    /// this gives the triangle width at any height.
    pub full_slope: f64,
    /// Copies of the owning wall's frame constants.
    pub uv_vert1_u: f64,
    pub uv_vert2: DVec2,
    /// Occupancy: at most one molecule per tile.
    pub tiles: Vec<Option<MoleculeId>>,
    pub num_occupied: usize,
}

impl WallGrid {
    /// Create an empty grid sized for `grid_density` tiles per unit area.
    pub fn new(uv_vert1_u: f64, uv_vert2: DVec2, area: f64, grid_density: f64) -> Self {
        let n = ((area * grid_density).sqrt().ceil() as usize).max(1);
        let num_tiles = n * n;
        Self {
            n,
            num_tiles,
            strip_width_rcp: n as f64 / uv_vert2.y,
            vert2_slope: uv_vert2.x / uv_vert2.y,
            full_slope: (uv_vert1_u - uv_vert2.x) / uv_vert2.y,
            uv_vert1_u,
            uv_vert2,
            tiles: vec![None; num_tiles],
            num_occupied: 0,
        }
    }

    /// Map a local frame point to its tile index.
    ///
    /// Points at the three triangle corners map to the three corner tiles;
    /// out-of-triangle inputs are clamped to the nearest strip/stripe.
    pub fn uv_to_tile(&self, loc: DVec2) -> usize {
        let n = self.n as i64;

        let striploc = loc.y * self.strip_width_rcp;
        let fs = (striploc.floor() as i64).clamp(0, n - 1);
        let striprem = (striploc - fs as f64).clamp(0.0, 1.0);
        let strip = (n - 1 - fs) as usize;

        let u_left = loc.y * self.vert2_slope;
        let width = self.uv_vert1_u - loc.y * self.full_slope - u_left;

        let (stripe, flip) = if width.abs() < EPS {
            // apex-degenerate cross-section
            (0, 0)
        } else {
            let stripeloc = ((loc.x - u_left) / width) * (strip as f64 + 1.0 - striprem);
            let s = (stripeloc.floor() as i64).clamp(0, strip as i64);
            let striperem = (stripeloc - s as f64).clamp(0.0, 1.0);
            let mut flip = if striperem < 1.0 - striprem { 0 } else { 1 };
            if s == strip as i64 {
                // last position in the strip is always an upright tile
                flip = 0;
            }
            (s as usize, flip)
        };

        (strip * strip + 2 * stripe + flip).min(self.num_tiles - 1)
    }

    /// Decompose a tile index into (strip-from-apex, stripe, flip).
    #[inline]
    fn tile_parts(&self, idx: usize) -> (usize, usize, usize) {
        let mut root = (idx as f64).sqrt() as usize;
        while (root + 1) * (root + 1) <= idx {
            root += 1;
        }
        while root * root > idx {
            root -= 1;
        }
        let k = idx - root * root;
        (root, k / 2, k % 2)
    }

    /// Subdivision lattice vertex (band g from the base, lateral index i).
    #[inline]
    fn lattice_vertex(&self, g: usize, i: usize) -> DVec2 {
        let inv_n = 1.0 / self.n as f64;
        DVec2::new(
            (i as f64 * self.uv_vert1_u + g as f64 * self.uv_vert2.x) * inv_n,
            g as f64 * self.uv_vert2.y * inv_n,
        )
    }

    /// The three corners of a tile in the wall frame.
    pub fn tile_corners(&self, idx: usize) -> [DVec2; 3] {
        let (strip, stripe, flip) = self.tile_parts(idx);
        let g = self.n - 1 - strip;
        if flip == 0 {
            [
                self.lattice_vertex(g, stripe),
                self.lattice_vertex(g, stripe + 1),
                self.lattice_vertex(g + 1, stripe),
            ]
        } else {
            [
                self.lattice_vertex(g, stripe + 1),
                self.lattice_vertex(g + 1, stripe),
                self.lattice_vertex(g + 1, stripe + 1),
            ]
        }
    }

    /// Centroid of a tile in the wall frame.
    pub fn tile_to_uv(&self, idx: usize) -> DVec2 {
        let [a, b, c] = self.tile_corners(idx);
        (a + b + c) / 3.0
    }

    /// Uniform random point within a tile. Consumes two RNG draws.
    pub fn tile_to_uv_random(&self, idx: usize, rng: &mut SimRng) -> DVec2 {
        let [a, b, c] = self.tile_corners(idx);
        let mut r1 = rng.dbl();
        let mut r2 = rng.dbl();
        if r1 + r2 > 1.0 {
            r1 = 1.0 - r1;
            r2 = 1.0 - r2;
        }
        a + r1 * (b - a) + r2 * (c - a)
    }

    #[inline]
    pub fn occupant(&self, idx: usize) -> Option<MoleculeId> {
        self.tiles[idx]
    }

    /// Claim a tile for a molecule. Panics if the tile is already taken;
    /// callers check occupancy first.
    pub fn set_occupant(&mut self, idx: usize, molecule: MoleculeId) {
        debug_assert!(self.tiles[idx].is_none(), "tile {idx} already occupied");
        self.tiles[idx] = Some(molecule);
        self.num_occupied += 1;
    }

    pub fn clear_occupant(&mut self, idx: usize) {
        if self.tiles[idx].take().is_some() {
            self.num_occupied -= 1;
        }
    }

    pub fn occupancy(&self) -> GridOccupancy {
        GridOccupancy {
            num_tiles: self.num_tiles,
            num_occupied: self.num_occupied,
        }
    }
}
