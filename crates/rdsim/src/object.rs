//! Geometry objects, regions, and mesh assembly.
//!
//! A geometry object is one named triangulated surface. During assembly the
//! shared edges between its walls are discovered, validated (manifold, with
//! consistent winding) and given their frame-flattening transforms.

use glam::DVec3;
use rustc_hash::FxHashMap;

use crate::error::SimError;
use crate::species::SpeciesId;
use crate::wall::{Edge, EdgeIndex, Wall, WallIndex};

pub type ObjectId = usize;
pub type RegionId = usize;

/// A named triangulated surface.
#[derive(Clone, Debug)]
pub struct GeometryObject {
    pub id: ObjectId,
    pub name: String,
    pub wall_indices: Vec<WallIndex>,
    /// True when every edge has a wall on both sides. Containment queries
    /// require a closed object.
    pub is_closed: bool,
}

/// A named subset of an object's walls.
#[derive(Clone, Debug)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub object_id: ObjectId,
    pub wall_indices: Vec<WallIndex>,
    /// Species giving this region its reactive surface behavior, if any.
    pub surface_class: Option<SpeciesId>,
}

/// Geometry input for one object: a vertex list and triangles as 0-based
/// vertex index triples, plus optional regions.
#[derive(Clone, Debug)]
pub struct MeshInput {
    pub name: String,
    pub vertices: Vec<DVec3>,
    pub triangles: Vec<[usize; 3]>,
    pub regions: Vec<RegionInput>,
}

impl MeshInput {
    pub fn new(name: impl Into<String>, vertices: Vec<DVec3>, triangles: Vec<[usize; 3]>) -> Self {
        Self {
            name: name.into(),
            vertices,
            triangles,
            regions: Vec::new(),
        }
    }

    /// Attach a region given by triangle indices into `self.triangles`.
    pub fn with_region(
        mut self,
        name: impl Into<String>,
        triangle_indices: Vec<usize>,
        surface_class: Option<SpeciesId>,
    ) -> Self {
        self.regions.push(RegionInput {
            name: name.into(),
            triangle_indices,
            surface_class,
        });
        self
    }

    /// Two triangles forming an axis-aligned rectangle at constant z.
    pub fn rectangle_z(name: impl Into<String>, x0: f64, x1: f64, y0: f64, y1: f64, z: f64) -> Self {
        Self::new(
            name,
            vec![
                DVec3::new(x0, y0, z),
                DVec3::new(x1, y0, z),
                DVec3::new(x1, y1, z),
                DVec3::new(x0, y1, z),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    /// A closed tetrahedron with outward-facing walls.
    pub fn tetrahedron(name: impl Into<String>, a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> Self {
        // winding chosen so all normals point away from the centroid
        Self::new(
            name,
            vec![a, b, c, d],
            vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]],
        )
    }

    /// A closed axis-aligned box with outward-facing walls, two triangles
    /// per face.
    pub fn box_mesh(name: impl Into<String>, min: DVec3, max: DVec3) -> Self {
        let (x0, y0, z0) = (min.x, min.y, min.z);
        let (x1, y1, z1) = (max.x, max.y, max.z);
        Self::new(
            name,
            vec![
                DVec3::new(x0, y0, z0),
                DVec3::new(x1, y0, z0),
                DVec3::new(x1, y1, z0),
                DVec3::new(x0, y1, z0),
                DVec3::new(x0, y0, z1),
                DVec3::new(x1, y0, z1),
                DVec3::new(x1, y1, z1),
                DVec3::new(x0, y1, z1),
            ],
            vec![
                [0, 3, 2], [0, 2, 1], // bottom (-z)
                [4, 5, 6], [4, 6, 7], // top (+z)
                [0, 1, 5], [0, 5, 4], // front (-y)
                [2, 3, 7], [2, 7, 6], // back (+y)
                [0, 4, 7], [0, 7, 3], // left (-x)
                [1, 2, 6], [1, 6, 5], // right (+x)
            ],
        )
    }
}

#[derive(Clone, Debug)]
pub struct RegionInput {
    pub name: String,
    pub triangle_indices: Vec<usize>,
    pub surface_class: Option<SpeciesId>,
}

/// Discover the shared edges among one object's walls, validate the mesh and
/// append the edge records.
///
/// Each wall edge k joins wall vertices k and k+1 (mod 3). An undirected
/// vertex pair with more than two incident walls is non-manifold; a pair
/// traversed twice in the same direction means inconsistent winding. Both
/// are fatal. Returns whether the surface is closed.
pub fn build_object_edges(
    wall_ids: &[WallIndex],
    walls: &mut [Wall],
    vertices: &[DVec3],
    edges: &mut Vec<Edge>,
) -> Result<bool, SimError> {
    // (lo, hi) vertex pair -> incident (wall, edge index, reversed) list
    let mut by_pair: FxHashMap<(usize, usize), Vec<(WallIndex, usize, bool)>> =
        FxHashMap::default();

    for &wi in wall_ids {
        let vi = walls[wi].vertex_indices;
        for k in 0..3 {
            let a = vi[k];
            let b = vi[(k + 1) % 3];
            let (lo, hi, reversed) = if a < b { (a, b, false) } else { (b, a, true) };
            by_pair.entry((lo, hi)).or_default().push((wi, k, reversed));
        }
    }

    let mut is_closed = true;
    for ((lo, hi), incident) in by_pair {
        match incident.as_slice() {
            [(w, k, _)] => {
                let edge_index: EdgeIndex = edges.len();
                edges.push(Edge::boundary(*w, *k));
                walls[*w].edges[*k] = edge_index;
                is_closed = false;
            }
            [(w0, k0, r0), (w1, k1, r1)] => {
                if r0 == r1 {
                    return Err(SimError::geometry(format!(
                        "inconsistent winding across edge ({lo}, {hi}) between walls {w0} and {w1}"
                    )));
                }
                let edge_index: EdgeIndex = edges.len();
                let edge = Edge::shared(*w0, *w1, *k0, *k1, walls, vertices)?;
                edges.push(edge);
                walls[*w0].edges[*k0] = edge_index;
                walls[*w1].edges[*k1] = edge_index;
            }
            more => {
                return Err(SimError::geometry(format!(
                    "non-manifold edge ({lo}, {hi}) shared by {} walls",
                    more.len()
                )));
            }
        }
    }

    Ok(is_closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    fn build_two_triangle_strip() -> (Vec<Wall>, Vec<Edge>, Vec<DVec3>) {
        // two coplanar triangles sharing the diagonal of a unit square
        let vertices = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        ];
        let mut walls = vec![
            Wall::new(0, 0, [0, 1, 2], &vertices).unwrap(),
            Wall::new(1, 0, [0, 2, 3], &vertices).unwrap(),
        ];
        let mut edges = Vec::new();
        let closed = build_object_edges(&[0, 1], &mut walls, &vertices, &mut edges).unwrap();
        assert!(!closed);
        (walls, edges, vertices)
    }

    #[test]
    fn strip_has_one_shared_edge() {
        let (walls, edges, _) = build_two_triangle_strip();
        let shared_index = edges.iter().position(|e| e.is_shared()).unwrap();
        assert_eq!(edges.iter().filter(|e| e.is_shared()).count(), 1);
        assert_eq!(edges.len(), 5);
        let e = &edges[shared_index];
        assert_eq!(e.neighbor_of(0), Some(1));
        assert_eq!(e.neighbor_of(1), Some(0));
        // both walls' edge slots point back at the shared record
        assert_eq!(walls[e.forward_wall].edges[e.forward_edge_index], shared_index);
        assert_eq!(
            walls[e.backward_wall].edges[e.backward_edge_index],
            shared_index
        );
    }

    #[test]
    fn shared_edge_transform_round_trips() {
        let (_, edges, _) = build_two_triangle_strip();
        let e = edges.iter().find(|e| e.is_shared()).unwrap();
        for &(u, v) in &[(0.1, 0.05), (0.7, 0.2), (0.33, 0.33)] {
            let p = DVec2::new(u, v);
            let back = e.apply_backward(e.apply_forward(p));
            assert!((back - p).length() < 1e-12, "({u}, {v})");
        }
    }

    #[test]
    fn coplanar_strip_transform_preserves_3d_points(){
        // for coplanar neighbors, mapping a shared-edge point through the
        // transform must land on the same 3D location
        let (walls, edges, vertices) = build_two_triangle_strip();
        let e = edges.iter().find(|e| e.is_shared()).unwrap();
        let wf = &walls[e.forward_wall];
        let wb = &walls[e.backward_wall];
        // midpoint of the shared diagonal
        let mid = DVec3::new(0.5, 0.5, 0.0);
        let uv_f = wf.xyz_to_uv(mid, &vertices);
        let uv_b = e.apply_forward(uv_f);
        let back_3d = wb.uv_to_xyz(uv_b, &vertices);
        assert!((back_3d - mid).length() < 1e-12);
    }

    #[test]
    fn box_mesh_is_closed_and_consistent() {
        let mesh = MeshInput::box_mesh("box", DVec3::splat(0.1), DVec3::splat(0.9));
        let mut walls: Vec<Wall> = mesh
            .triangles
            .iter()
            .enumerate()
            .map(|(i, t)| Wall::new(i, 0, *t, &mesh.vertices).unwrap())
            .collect();
        let ids: Vec<WallIndex> = (0..walls.len()).collect();
        let mut edges = Vec::new();
        let closed =
            build_object_edges(&ids, &mut walls, &mesh.vertices, &mut edges).unwrap();
        assert!(closed);
        // 12 triangles, 18 undirected edges, all shared
        assert_eq!(edges.len(), 18);
        assert!(edges.iter().all(|e| e.is_shared()));
        // outward normals: each face normal points away from the center
        let center = DVec3::splat(0.5);
        for w in &walls {
            let centroid = (mesh.vertices[w.vertex_indices[0]]
                + mesh.vertices[w.vertex_indices[1]]
                + mesh.vertices[w.vertex_indices[2]])
                / 3.0;
            assert!(w.normal.dot(centroid - center) > 0.0, "wall {} inward", w.id);
        }
    }

    #[test]
    fn tetrahedron_is_closed_and_consistent() {
        let mesh = MeshInput::tetrahedron(
            "tet",
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
        );
        let mut walls: Vec<Wall> = mesh
            .triangles
            .iter()
            .enumerate()
            .map(|(i, t)| Wall::new(i, 0, *t, &mesh.vertices).unwrap())
            .collect();
        let ids: Vec<WallIndex> = (0..walls.len()).collect();
        let mut edges = Vec::new();
        let closed =
            build_object_edges(&ids, &mut walls, &mesh.vertices, &mut edges).unwrap();
        assert!(closed);
        assert_eq!(edges.len(), 6);
        assert!(edges.iter().all(|e| e.is_shared()));
    }

    #[test]
    fn inconsistent_winding_is_fatal() {
        let vertices = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        ];
        // second triangle wound the same way around the shared diagonal
        let mut walls = vec![
            Wall::new(0, 0, [0, 1, 2], &vertices).unwrap(),
            Wall::new(1, 0, [2, 0, 3], &vertices).unwrap(),
        ];
        let mut edges = Vec::new();
        let r = build_object_edges(&[0, 1], &mut walls, &vertices, &mut edges);
        assert!(matches!(r, Err(SimError::InvalidGeometry(_))));
    }

    #[test]
    fn nonmanifold_edge_is_fatal() {
        let vertices = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.5, 1.0, 0.0),
            DVec3::new(0.5, -1.0, 0.0),
            DVec3::new(0.5, 0.0, 1.0),
        ];
        let mut walls = vec![
            Wall::new(0, 0, [0, 1, 2], &vertices).unwrap(),
            Wall::new(1, 0, [1, 0, 3], &vertices).unwrap(),
            Wall::new(2, 0, [1, 0, 4], &vertices).unwrap(),
        ];
        let mut edges = Vec::new();
        let r = build_object_edges(&[0, 1, 2], &mut walls, &vertices, &mut edges);
        assert!(matches!(r, Err(SimError::InvalidGeometry(_))));
    }
}
