//! Surface molecules: tile occupancy, shared-edge traversal, and region
//! border behavior.

use glam::DVec2;
use rdsim::object::MeshInput;
use rdsim::reaction::{Pathway, RxnType};
use rdsim::{SimConfig, World};

/// Two coplanar triangles (a unit square split on its diagonal) at z = 0.5.
fn strip_world(seed: u64, grid_density: f64) -> World {
    let config = SimConfig {
        seed,
        base_time_step: 1e-3,
        partition_edge_length: 1.0,
        num_subpartitions_per_partition: 4,
        rx_radius_3d: 1e-3,
        surface_grid_density: grid_density,
        ..Default::default()
    };
    let mut world = World::new(config).unwrap();
    world
        .add_geometry(MeshInput::rectangle_z("sheet", 0.1, 0.9, 0.1, 0.9, 0.5))
        .unwrap();
    world
}

#[test]
fn surface_molecule_stays_on_the_sheet() {
    let mut world = strip_world(1, 500.0);
    // sigma per step ~ 0.02: many edge interactions over the run
    let s = world.add_species("S", 1e-1, true).unwrap();
    let id = world
        .add_surface_molecule(s, 0, DVec2::new(0.2, 0.1), 1)
        .unwrap();

    world.run_iterations(500).unwrap();

    let m = world.partition.molecule(id);
    assert!(!m.is_defunct());
    let (wall, tile, uv, _) = m.surface_state();
    assert!(wall < 2, "molecule left the sheet");

    // the occupancy maps back to the molecule
    let grid = world.partition.walls[wall].grid.as_ref().unwrap();
    assert_eq!(grid.occupant(tile), Some(id));
    assert_eq!(grid.uv_to_tile(uv), tile);

    // the location is inside the triangle
    let w = &world.partition.walls[wall];
    assert!(rdsim::geom::point_in_triangle_2d(
        uv,
        DVec2::ZERO,
        DVec2::new(w.uv_vert1_u, 0.0),
        w.uv_vert2
    ));

    // subpartition coherent with the 3D position
    let pos = w.uv_to_xyz(uv, &world.partition.vertices);
    assert_eq!(
        world.partition.subpart_index_from_pos(pos),
        Some(m.subpart_index)
    );
}

#[test]
fn tiles_hold_at_most_one_molecule() {
    // a very coarse grid forces collisions over tiles
    let mut world = strip_world(2, 20.0);
    let s = world.add_species("S", 5e-2, true).unwrap();
    let mut ids = Vec::new();
    for uv in [
        DVec2::new(0.15, 0.1),
        DVec2::new(0.45, 0.2),
        DVec2::new(0.7, 0.05),
        DVec2::new(0.5, 0.4),
    ] {
        ids.push(world.add_surface_molecule(s, 0, uv, 1).unwrap());
    }

    for _ in 0..50 {
        world.run_iterations(10).unwrap();
        // occupancy is an injection: every live molecule holds its own tile
        let mut seen = std::collections::HashSet::new();
        for &id in &ids {
            let m = world.partition.molecule(id);
            let (wall, tile, _, _) = m.surface_state();
            assert!(seen.insert((wall, tile)), "two molecules on one tile");
            let grid = world.partition.walls[wall].grid.as_ref().unwrap();
            assert_eq!(grid.occupant(tile), Some(id));
        }
    }
}

#[test]
fn occupied_tile_rejects_direct_placement() {
    let mut world = strip_world(3, 20.0);
    let s = world.add_species("S", 0.0, true).unwrap();
    let uv = DVec2::new(0.2, 0.1);
    world.add_surface_molecule(s, 0, uv, 1).unwrap();
    // the same tile again
    assert!(world.add_surface_molecule(s, 0, uv, 1).is_err());
}

#[test]
fn absorbing_region_border_consumes_the_crosser() {
    let config = SimConfig {
        seed: 5,
        base_time_step: 1e-3,
        partition_edge_length: 1.0,
        num_subpartitions_per_partition: 4,
        rx_radius_3d: 1e-3,
        surface_grid_density: 500.0,
        ..Default::default()
    };
    let mut world = World::new(config).unwrap();
    let border_class = world.add_species("edge_sink", 0.0, true).unwrap();
    let s = world.add_species("S", 1e-1, true).unwrap();

    // wall 1 (the second triangle) is a region with an absorptive class
    let sheet = MeshInput::rectangle_z("sheet", 0.1, 0.9, 0.1, 0.9, 0.5).with_region(
        "sink",
        vec![1],
        Some(border_class),
    );
    world.add_geometry(sheet).unwrap();
    world
        .add_bimolecular_reaction(
            s,
            border_class,
            RxnType::AbsorbRegionBorder,
            vec![Pathway {
                products: Vec::new(),
                probability: 1.0,
            }],
        )
        .unwrap();

    let id = world
        .add_surface_molecule(s, 0, DVec2::new(0.2, 0.1), 1)
        .unwrap();

    // sigma per step ~0.02 against a triangle of size ~0.8: the molecule
    // reaches the diagonal border quickly
    world.run_iterations(2000).unwrap();

    assert!(
        world.partition.molecule(id).is_defunct(),
        "molecule never crossed the absorbing border"
    );
    assert_eq!(world.stats.absorptions, 1);
    assert_eq!(world.count_species(s), 0);
}

#[test]
fn reflecting_region_border_keeps_molecule_on_its_wall() {
    let config = SimConfig {
        seed: 6,
        base_time_step: 1e-3,
        partition_edge_length: 1.0,
        num_subpartitions_per_partition: 4,
        rx_radius_3d: 1e-3,
        surface_grid_density: 500.0,
        ..Default::default()
    };
    let mut world = World::new(config).unwrap();
    let border_class = world.add_species("fence", 0.0, true).unwrap();
    let s = world.add_species("S", 1e-1, true).unwrap();

    let sheet = MeshInput::rectangle_z("sheet", 0.1, 0.9, 0.1, 0.9, 0.5).with_region(
        "fenced",
        vec![1],
        Some(border_class),
    );
    world.add_geometry(sheet).unwrap();
    world
        .add_bimolecular_reaction(
            s,
            border_class,
            RxnType::Reflect,
            vec![Pathway {
                products: Vec::new(),
                probability: 1.0,
            }],
        )
        .unwrap();

    let id = world
        .add_surface_molecule(s, 0, DVec2::new(0.2, 0.1), 1)
        .unwrap();

    world.run_iterations(1000).unwrap();

    let m = world.partition.molecule(id);
    assert!(!m.is_defunct());
    let (wall, _, _, _) = m.surface_state();
    assert_eq!(wall, 0, "molecule crossed a reflective region border");
    assert_eq!(world.stats.mol_moves_between_walls, 0);
}

#[test]
fn surface_motion_is_reproducible_per_seed() {
    let run = |seed: u64| -> (usize, usize, DVec2) {
        let mut world = strip_world(seed, 500.0);
        let s = world.add_species("S", 1e-1, true).unwrap();
        let id = world
            .add_surface_molecule(s, 0, DVec2::new(0.2, 0.1), 1)
            .unwrap();
        world.run_iterations(300).unwrap();
        let (wall, tile, uv, _) = world.partition.molecule(id).surface_state();
        (wall, tile, uv)
    };
    let (w1, t1, uv1) = run(42);
    let (w2, t2, uv2) = run(42);
    assert_eq!(w1, w2);
    assert_eq!(t1, t2);
    assert_eq!(uv1.x.to_bits(), uv2.x.to_bits());
    assert_eq!(uv1.y.to_bits(), uv2.y.to_bits());
}
