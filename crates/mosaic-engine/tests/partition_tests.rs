//! Partition invariance and oracle comparisons: however the graph is
//! split, the checker must compute exactly the sequential fixpoint.

mod common;

use common::*;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use mosaic_graph::{Edge, IdColors, IdNode};
use mosaic_logic::Formula;

fn formula_battery() -> Vec<Formula> {
    let p = Formula::prop("p");
    let q = Formula::prop("q");
    vec![
        Formula::exists_next(&p),
        Formula::exists_until(&p, &q),
        Formula::all_until(&p, &q),
        Formula::negation(&Formula::exists_until(&Formula::tt(), &Formula::negation(&q))),
        Formula::all_until(&Formula::or(&p, &q), &Formula::exists_next(&q)),
    ]
}

/// The same 6-node model split across 1, 2, 3 and 6 partitions must give
/// identical results for the whole battery.
#[test]
fn six_node_partition_invariance() {
    let model = GlobalModel {
        memberships: (0..6).map(|id| (IdNode(id), colors(&[0, 1, 2, 3]))).collect(),
        edges: vec![
            Edge::new(IdNode(0), IdNode(1), colors(&[0, 1, 2])),
            Edge::new(IdNode(1), IdNode(2), colors(&[1, 2])),
            Edge::new(IdNode(2), IdNode(3), colors(&[0, 1, 2, 3])),
            Edge::new(IdNode(3), IdNode(0), colors(&[2])),
            Edge::new(IdNode(3), IdNode(4), colors(&[0, 1])),
            Edge::new(IdNode(4), IdNode(5), colors(&[0, 1, 3])),
            Edge::new(IdNode(5), IdNode(5), colors(&[0, 1, 2, 3])),
            Edge::new(IdNode(1), IdNode(4), colors(&[3])),
            Edge::new(IdNode(0), IdNode(0), colors(&[3])),
        ],
        validity: vec![
            (
                prop("p"),
                vec![
                    (IdNode(0), colors(&[0, 1, 2])),
                    (IdNode(1), colors(&[0, 1, 2, 3])),
                    (IdNode(2), colors(&[1, 2])),
                    (IdNode(4), colors(&[0, 1, 3])),
                ],
            ),
            (
                prop("q"),
                vec![(IdNode(5), colors(&[0, 1, 3])), (IdNode(3), colors(&[2]))],
            ),
        ],
    };

    let battery = formula_battery();
    let oracle: Vec<IdNodeSet> = battery
        .iter()
        .map(|formula| brute_force(&model, formula))
        .collect();

    for ranks in [1, 2, 3, 6] {
        let assignment = round_robin_assignment(&model, ranks);
        let results = verify_distributed(&model, &assignment, ranks, &battery);
        for (index, (result, expected)) in results.iter().zip(&oracle).enumerate() {
            assert_eq!(
                result, expected,
                "formula #{index} ({}) differs on {ranks} ranks",
                battery[index]
            );
        }
    }
}

fn random_model(rng: &mut StdRng) -> GlobalModel {
    let node_count = rng.random_range(4..=8u64);
    let universe = [0u32, 1, 2, 3];

    let random_colors = |rng: &mut StdRng| -> IdColors {
        loop {
            let picked: Vec<u32> = universe
                .iter()
                .copied()
                .filter(|_| rng.random_bool(0.5))
                .collect();
            if !picked.is_empty() {
                return IdColors::of(picked);
            }
        }
    };

    let memberships: Vec<_> = (0..node_count)
        .map(|id| (IdNode(id), colors(&universe)))
        .collect();

    let mut edges = Vec::new();
    for source in 0..node_count {
        let out_degree = rng.random_range(1..=3);
        for _ in 0..out_degree {
            let target = rng.random_range(0..node_count);
            edges.push(Edge::new(
                IdNode(source),
                IdNode(target),
                random_colors(rng),
            ));
        }
    }

    let mut validity = Vec::new();
    for name in ["p", "q"] {
        let mut valid = Vec::new();
        for id in 0..node_count {
            if rng.random_bool(0.6) {
                valid.push((IdNode(id), random_colors(rng)));
            }
        }
        validity.push((prop(name), valid));
    }

    GlobalModel {
        memberships,
        edges,
        validity,
    }
}

/// Randomized cross-check of EU/AU (and friends) against the sequential
/// brute-force fixpoint, over 1, 2 and 3 partitions.
#[test]
fn random_models_match_the_oracle() {
    let battery = formula_battery();
    for seed in 0..8u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let model = random_model(&mut rng);
        let oracle: Vec<IdNodeSet> = battery
            .iter()
            .map(|formula| brute_force(&model, formula))
            .collect();

        for ranks in [1, 2, 3] {
            let assignment = round_robin_assignment(&model, ranks);
            let results = verify_distributed(&model, &assignment, ranks, &battery);
            for (index, (result, expected)) in results.iter().zip(&oracle).enumerate() {
                assert_eq!(
                    result, expected,
                    "seed {seed}, formula #{index} ({}) differs on {ranks} ranks",
                    battery[index]
                );
            }
        }
    }
}
