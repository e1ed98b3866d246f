//! Free diffusion with no geometry: mean squared displacement follows
//! ⟨r²⟩ = 6·D·t, and every molecule's subpartition stays coherent with its
//! position.

use glam::DVec3;
use rdsim::molecule::MoleculeState;
use rdsim::release::{ReleaseShape, ReleaseSite};
use rdsim::{SimConfig, World};

fn msd_world(seed: u64) -> World {
    let config = SimConfig {
        seed,
        base_time_step: 1e-6,
        partition_edge_length: 1.0,
        num_subpartitions_per_partition: 4,
        rx_radius_3d: 0.0,
        ..Default::default()
    };
    let mut world = World::new(config).unwrap();
    let a = world.add_species("A", 1e-6, false).unwrap();
    world
        .add_release_site(ReleaseSite {
            name: "center".into(),
            species_id: a,
            count: 1000,
            time: 0.0,
            shape: ReleaseShape::Point(DVec3::splat(0.5)),
            orientation: 0,
        })
        .unwrap();
    world
}

#[test]
fn msd_matches_six_d_t() {
    let mut world = msd_world(1);
    world.run_iterations(100).unwrap();

    let origin = DVec3::splat(0.5);
    let mut sum_r2 = 0.0;
    let mut count = 0usize;
    for m in world.partition.live_molecules() {
        let MoleculeState::Volume { pos } = m.state else {
            panic!("unexpected surface molecule");
        };
        sum_r2 += (pos - origin).length_squared();
        count += 1;
    }
    assert_eq!(count, 1000);

    let msd = sum_r2 / count as f64;
    let expected = 6.0 * 1e-6 * 100.0 * 1e-6; // 6 D t
    let rel = (msd - expected).abs() / expected;
    assert!(
        rel < 0.10,
        "msd {msd:.3e} deviates from {expected:.3e} by {:.1}%",
        rel * 100.0
    );
}

#[test]
fn subpartition_coherence_after_many_steps() {
    let mut world = msd_world(3);
    world.run_iterations(50).unwrap();
    for m in world.partition.live_molecules() {
        let MoleculeState::Volume { pos } = m.state else {
            continue;
        };
        assert_eq!(
            world.partition.subpart_index_from_pos(pos),
            Some(m.subpart_index),
            "molecule {} subpartition out of sync",
            m.id
        );
    }
}

#[test]
fn per_axis_spread_is_isotropic() {
    let mut world = msd_world(5);
    world.run_iterations(100).unwrap();

    let origin = DVec3::splat(0.5);
    let mut var = DVec3::ZERO;
    for m in world.partition.live_molecules() {
        let MoleculeState::Volume { pos } = m.state else {
            continue;
        };
        let d = pos - origin;
        var += d * d;
    }
    var /= 1000.0;
    let expected = 2.0 * 1e-6 * 1e-4; // 2 D t per axis
    for v in [var.x, var.y, var.z] {
        assert!(
            (v - expected).abs() / expected < 0.15,
            "axis variance {v:.3e} vs {expected:.3e}"
        );
    }
}
