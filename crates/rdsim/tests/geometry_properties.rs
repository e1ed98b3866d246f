//! Property tests for the geometry layer: frame round trips, edge
//! transforms and tile mappings over randomized triangles.

use glam::{DVec2, DVec3};
use proptest::prelude::*;
use rdsim::object::build_object_edges;
use rdsim::wall::{Wall, WallGrid};

/// A non-degenerate triangle from 9 raw coordinates.
fn triangle_strategy() -> impl Strategy<Value = [DVec3; 3]> {
    let coord = -10.0..10.0f64;
    [
        [coord.clone(), coord.clone(), coord.clone()],
        [coord.clone(), coord.clone(), coord.clone()],
        [coord.clone(), coord.clone(), coord.clone()],
    ]
    .prop_map(|[a, b, c]| {
        [
            DVec3::new(a[0], a[1], a[2]),
            DVec3::new(b[0], b[1], b[2]),
            DVec3::new(c[0], c[1], c[2]),
        ]
    })
    .prop_filter("degenerate", |[a, b, c]| {
        (*b - *a).cross(*c - *a).length() > 1e-3
    })
}

/// Barycentric weights strictly inside the triangle (s + t < 0.98).
fn bary_strategy() -> impl Strategy<Value = (f64, f64)> {
    (0.01..0.95f64, 0.01..0.95f64).prop_map(|(s, u)| (s, u * (0.98 - s)))
}

proptest! {
    #[test]
    fn xyz_uv_round_trip(tri in triangle_strategy(), (s, t) in bary_strategy()) {
        let vertices = tri.to_vec();
        let wall = Wall::new(0, 0, [0, 1, 2], &vertices).unwrap();
        let p = tri[0] + s * (tri[1] - tri[0]) + t * (tri[2] - tri[0]);
        let uv = wall.xyz_to_uv(p, &vertices);
        let back = wall.uv_to_xyz(uv, &vertices);
        prop_assert!((back - p).length() < 1e-10 * (1.0 + p.length()));
    }

    #[test]
    fn shared_edge_transform_is_reversible(
        tri in triangle_strategy(),
        apex in prop::array::uniform3(-10.0..10.0f64),
        (s, t) in bary_strategy(),
    ) {
        // a second triangle over the same edge (tri[0], tri[2]), wound the
        // opposite way around it
        let apex = DVec3::new(apex[0], apex[1], apex[2]);
        prop_assume!((tri[2] - tri[0]).cross(apex - tri[0]).length() > 1e-3);

        let vertices = vec![tri[0], tri[1], tri[2], apex];
        let mut walls = vec![
            Wall::new(0, 0, [0, 1, 2], &vertices).unwrap(),
            Wall::new(1, 0, [0, 2, 3], &vertices).unwrap(),
        ];
        let mut edges = Vec::new();
        build_object_edges(&[0, 1], &mut walls, &vertices, &mut edges).unwrap();
        let edge = edges.iter().find(|e| e.is_shared()).unwrap();

        let p = DVec2::new(s, t);
        let round = edge.apply_backward(edge.apply_forward(p));
        prop_assert!((round - p).length() < 1e-12 * (1.0 + p.length()));

        // vectors rotate without stretching
        let v = DVec2::new(t, -s);
        let rv = edge.rotate_forward(v);
        prop_assert!((rv.length() - v.length()).abs() < 1e-12 * (1.0 + v.length()));
    }

    #[test]
    fn tile_centroids_invert_the_tile_map(
        tri in triangle_strategy(),
        density in 1.0..200.0f64,
    ) {
        let vertices = tri.to_vec();
        let wall = Wall::new(0, 0, [0, 1, 2], &vertices).unwrap();
        let grid = WallGrid::new(wall.uv_vert1_u, wall.uv_vert2, wall.area, density);
        for idx in 0..grid.num_tiles {
            prop_assert_eq!(grid.uv_to_tile(grid.tile_to_uv(idx)), idx);
        }
    }

    #[test]
    fn in_triangle_points_map_to_valid_tiles(
        tri in triangle_strategy(),
        (s, t) in bary_strategy(),
        density in 1.0..200.0f64,
    ) {
        let vertices = tri.to_vec();
        let wall = Wall::new(0, 0, [0, 1, 2], &vertices).unwrap();
        let grid = WallGrid::new(wall.uv_vert1_u, wall.uv_vert2, wall.area, density);
        let p = tri[0] + s * (tri[1] - tri[0]) + t * (tri[2] - tri[0]);
        let uv = wall.xyz_to_uv(p, &vertices);
        let tile = grid.uv_to_tile(uv);
        prop_assert!(tile < grid.num_tiles);
    }
}
