//! Standard surface-class reactions at walls: volume molecules adsorbing
//! onto a membrane as surface molecules, and reacting with molecules
//! already bound there.

use glam::DVec3;
use rdsim::molecule::MoleculeState;
use rdsim::object::MeshInput;
use rdsim::reaction::{Pathway, Product, RxnType};
use rdsim::release::{ReleaseShape, ReleaseSite};
use rdsim::{SimConfig, World};

fn membrane_world(seed: u64) -> World {
    let config = SimConfig {
        seed,
        base_time_step: 1e-3,
        partition_edge_length: 1.0,
        num_subpartitions_per_partition: 4,
        rx_radius_3d: 1e-3,
        surface_grid_density: 2000.0,
        ..Default::default()
    };
    let mut world = World::new(config).unwrap();
    world
        .add_geometry(MeshInput::box_mesh(
            "cage",
            DVec3::splat(0.1),
            DVec3::splat(0.9),
        ))
        .unwrap();
    world
}

#[test]
fn volume_molecules_adsorb_as_surface_molecules() {
    let mut world = membrane_world(1);
    let membrane = world.add_species("membrane", 0.0, true).unwrap();
    let a = world.add_species("A", 1e-2, false).unwrap();
    let bound = world.add_species("A_bound", 0.0, true).unwrap();

    let plane = MeshInput::rectangle_z("plane", 0.1, 0.9, 0.1, 0.9, 0.5).with_region(
        "sticky",
        vec![0, 1],
        Some(membrane),
    );
    world.add_geometry(plane).unwrap();

    // A + membrane -> A_bound (on the membrane)
    world
        .add_bimolecular_reaction(
            a,
            membrane,
            RxnType::Standard,
            vec![Pathway {
                products: vec![Product {
                    species_id: bound,
                    orientation: 1,
                }],
                probability: 0.8,
            }],
        )
        .unwrap();

    world
        .add_release_site(ReleaseSite {
            name: "above".into(),
            species_id: a,
            count: 80,
            time: 0.0,
            shape: ReleaseShape::Box {
                min: DVec3::new(0.3, 0.3, 0.55),
                max: DVec3::new(0.7, 0.7, 0.7),
            },
            orientation: 0,
        })
        .unwrap();

    world.run_iterations(500).unwrap();

    let free = world.count_species(a);
    let adsorbed = world.count_species(bound);
    assert_eq!(free + adsorbed, 80, "molecules lost or duplicated");
    assert!(adsorbed > 0, "nothing adsorbed");

    // every bound molecule sits on a wall of the plane, holding its tile
    for m in world.partition.live_molecules() {
        if m.species_id != bound {
            continue;
        }
        let (wall, tile, uv, orientation) = m.surface_state();
        assert_eq!(orientation, 1);
        let w = &world.partition.walls[wall];
        assert_eq!(w.object_id, 1, "bound molecule on the wrong object");
        let grid = w.grid.as_ref().unwrap();
        assert_eq!(grid.occupant(tile), Some(m.id));
        assert_eq!(grid.uv_to_tile(uv), tile);
    }
}

#[test]
fn bound_molecules_react_with_incoming_volume_molecules() {
    let mut world = membrane_world(2);
    let a = world.add_species("A", 1e-2, false).unwrap();
    let receptor = world.add_species("R", 0.0, true).unwrap();
    let complex = world.add_species("C", 0.0, true).unwrap();

    let plane = MeshInput::rectangle_z("plane", 0.1, 0.9, 0.1, 0.9, 0.5).with_region(
        "all",
        vec![0, 1],
        None,
    );
    world.add_geometry(plane).unwrap();

    // A (volume) + R (bound) -> C (bound)
    world
        .add_bimolecular_reaction(
            a,
            receptor,
            RxnType::Standard,
            vec![Pathway {
                products: vec![Product {
                    species_id: complex,
                    orientation: 1,
                }],
                probability: 0.9,
            }],
        )
        .unwrap();

    // receptors coat the plane region
    world
        .add_release_site(ReleaseSite {
            name: "receptors".into(),
            species_id: receptor,
            count: 200,
            time: 0.0,
            shape: ReleaseShape::SurfaceRegion(0),
            orientation: 1,
        })
        .unwrap();
    world
        .add_release_site(ReleaseSite {
            name: "ligand".into(),
            species_id: a,
            count: 60,
            time: 0.0,
            shape: ReleaseShape::Box {
                min: DVec3::new(0.3, 0.3, 0.52),
                max: DVec3::new(0.7, 0.7, 0.65),
            },
            orientation: 0,
        })
        .unwrap();

    world.run_iterations(800).unwrap();

    let complexes = world.count_species(complex);
    assert!(complexes > 0, "no binding happened");
    // every complex consumed one A and one R
    assert_eq!(world.count_species(a), 60 - complexes);
    assert_eq!(world.count_species(receptor), 200 - complexes);
}
