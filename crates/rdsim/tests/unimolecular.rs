//! Unimolecular decay: exponential lifetimes, the empirical half-life, and
//! decay products entering the simulation mid-step.

use glam::DVec3;
use rdsim::reaction::{Pathway, Product, RxnType};
use rdsim::release::{ReleaseShape, ReleaseSite};
use rdsim::{MemoryObserver, ReactionKind, SimConfig, World};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn half_life_matches_rate() {
    // X -> nothing with total rate ln 2 per second: mean lifetime 1/ln2,
    // half-life exactly 1 s
    let config = SimConfig {
        seed: 1,
        base_time_step: 0.1,
        partition_edge_length: 1.0,
        num_subpartitions_per_partition: 4,
        rx_radius_3d: 0.0,
        ..Default::default()
    };
    let mut world = World::new(config).unwrap();
    let x = world.add_species("X", 0.0, false).unwrap();
    world
        .add_unimolecular_reaction(
            x,
            vec![Pathway {
                products: Vec::new(),
                probability: 2.0_f64.ln(),
            }],
        )
        .unwrap();
    world
        .add_release_site(ReleaseSite {
            name: "x0".into(),
            species_id: x,
            count: 10_000,
            time: 0.0,
            shape: ReleaseShape::Point(DVec3::splat(0.5)),
            orientation: 0,
        })
        .unwrap();

    world.run_iterations(10).unwrap(); // t = 1.0 s

    let survivors = world.count_species(x);
    // expectation 5000; the band is 5 sigma of the binomial
    assert!(
        (survivors as i64 - 5000).abs() < 250,
        "survivors = {survivors}"
    );
    assert_eq!(
        world.stats.unimol_reactions as usize,
        10_000 - survivors
    );
}

#[test]
fn decay_records_are_ordered_in_time_within_each_window() {
    let config = SimConfig {
        seed: 7,
        base_time_step: 0.1,
        rx_radius_3d: 0.0,
        ..Default::default()
    };
    let mut world = World::new(config).unwrap();
    let x = world.add_species("X", 0.0, false).unwrap();
    world
        .add_unimolecular_reaction(
            x,
            vec![Pathway {
                products: Vec::new(),
                probability: 1.0,
            }],
        )
        .unwrap();
    world
        .add_release_site(ReleaseSite {
            name: "x0".into(),
            species_id: x,
            count: 1000,
            time: 0.0,
            shape: ReleaseShape::Point(DVec3::splat(0.5)),
            orientation: 0,
        })
        .unwrap();
    let observer = Rc::new(RefCell::new(MemoryObserver::new()));
    world.add_observer(Box::new(observer.clone()));

    world.run_iterations(30).unwrap();

    let obs = observer.borrow();
    assert!(!obs.reactions.is_empty());
    for r in &obs.reactions {
        assert_eq!(r.kind, ReactionKind::Unimolecular);
        assert_eq!(r.reactants.len(), 1);
        // every reaction fires at a non-negative time within the run
        assert!(r.time >= 0.0 && r.time <= 3.0 + 1e-9);
    }
}

#[test]
fn decay_chain_produces_and_consumes() {
    // X -> Y -> nothing; Y picks up its own clock when created
    let config = SimConfig {
        seed: 3,
        base_time_step: 0.1,
        rx_radius_3d: 0.0,
        ..Default::default()
    };
    let mut world = World::new(config).unwrap();
    let x = world.add_species("X", 0.0, false).unwrap();
    let y = world.add_species("Y", 0.0, false).unwrap();
    world
        .add_unimolecular_reaction(
            x,
            vec![Pathway {
                products: vec![Product {
                    species_id: y,
                    orientation: 0,
                }],
                probability: 5.0,
            }],
        )
        .unwrap();
    world
        .add_unimolecular_reaction(
            y,
            vec![Pathway {
                products: Vec::new(),
                probability: 5.0,
            }],
        )
        .unwrap();
    world
        .add_release_site(ReleaseSite {
            name: "x0".into(),
            species_id: x,
            count: 2000,
            time: 0.0,
            shape: ReleaseShape::Point(DVec3::splat(0.5)),
            orientation: 0,
        })
        .unwrap();

    // rate 5/s: after 3 s essentially everything has decayed twice
    world.run_iterations(30).unwrap();
    let x_left = world.count_species(x);
    let y_left = world.count_species(y);
    assert!(x_left < 5, "x survivors {x_left}");
    assert!(y_left < 10, "y survivors {y_left}");
    // every X decay produced one Y; every Y decay consumed one
    let x_decays = 2000 - x_left;
    let y_decays = x_decays - y_left;
    assert_eq!(
        world.stats.unimol_reactions as usize,
        x_decays + y_decays
    );
}

#[test]
fn multi_pathway_unimolecular_splits_by_probability() {
    // X -> Y (0.75) | Z (0.25), total rate 8/s so everything fires fast
    let config = SimConfig {
        seed: 11,
        base_time_step: 0.1,
        rx_radius_3d: 0.0,
        ..Default::default()
    };
    let mut world = World::new(config).unwrap();
    let x = world.add_species("X", 0.0, false).unwrap();
    let y = world.add_species("Y", 0.0, false).unwrap();
    let z = world.add_species("Z", 0.0, false).unwrap();
    world
        .add_unimolecular_reaction(
            x,
            vec![
                Pathway {
                    products: vec![Product {
                        species_id: y,
                        orientation: 0,
                    }],
                    probability: 6.0,
                },
                Pathway {
                    products: vec![Product {
                        species_id: z,
                        orientation: 0,
                    }],
                    probability: 2.0,
                },
            ],
        )
        .unwrap();
    world
        .add_release_site(ReleaseSite {
            name: "x0".into(),
            species_id: x,
            count: 4000,
            time: 0.0,
            shape: ReleaseShape::Point(DVec3::splat(0.5)),
            orientation: 0,
        })
        .unwrap();

    world.run_iterations(50).unwrap(); // 5 s at rate 8/s: all decayed

    let ny = world.count_species(y) as f64;
    let nz = world.count_species(z) as f64;
    assert!(world.count_species(x) < 5);
    let frac_y = ny / (ny + nz);
    // 0.75 split, 5-sigma band for 4000 draws
    assert!(
        (frac_y - 0.75).abs() < 0.04,
        "pathway split {frac_y} should be near 0.75"
    );
}
