use std::collections::HashMap;
use std::sync::Arc;

use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use regression_circuit::circuit::Circuit;
use regression_circuit::dataset::DataSet;
use regression_circuit::error::CircuitError;
use regression_circuit::node::Node;
use regression_circuit::reference::{ElementId, NodeId};
use regression_circuit::solver::{SolverConfig, SolverKind};
use regression_circuit::split::SplitConfig;
use regression_circuit::train::{learn_regression_circuit, TrainConfig};
use regression_circuit::vtree::Vtree;
use test_log::test;

fn build(vtree: Vtree, seed: u64) -> Circuit {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Circuit::new(Arc::new(vtree), &mut rng).unwrap()
}

/// Random binary rows with `y = 3·x1 + 2·x2·x4 - x3`.
fn data(num_vars: usize, rows: usize, seed: u64) -> DataSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let images = Array2::from_shape_fn((rows, num_vars), |_| if rng.random::<bool>() { 1.0 } else { 0.0 });
    let labels: Array1<f64> = images
        .rows()
        .into_iter()
        .map(|x| 3.0 * x[0] + 2.0 * x[1] * x[3] - x[2])
        .collect();
    DataSet::new(images, labels)
}

fn permissive_splits() -> SplitConfig {
    SplitConfig {
        num_splits: 4,
        min_support: 1.0,
        ..SplitConfig::default()
    }
}

/// Sum of decision node parent counts and the number of element edges
/// that point at decision nodes.
fn decision_references(circuit: &Circuit) -> (usize, usize) {
    let counted = circuit
        .decision_nodes()
        .iter()
        .map(|&id| circuit.node(id).unwrap().num_parents())
        .sum();
    let mut edges = 0;
    for &e in circuit.elements() {
        for child in circuit.element(e).unwrap().children() {
            if matches!(circuit.node(child), Some(Node::Decision(_))) {
                edges += 1;
            }
        }
    }
    (counted, edges)
}

fn assert_partition_identity(circuit: &Circuit, images: &Array2<f64>) {
    let probabilities = circuit.probabilities(images);
    for &id in circuit.decision_nodes() {
        let gate = circuit.node(id).unwrap().as_decision().unwrap();
        let mut total = Array1::<f64>::zeros(images.nrows());
        for &e in &gate.elements {
            let element = circuit.element(e).unwrap();
            total += &(probabilities.get(element.prime).unwrap() * probabilities.get(element.sub).unwrap());
        }
        for (a, b) in total.iter().zip(probabilities.get(id).unwrap()) {
            assert!((a - b).abs() < 1e-9, "gate {}: {} != {}", id, a, b);
        }
    }
}

#[test]
fn test_two_variable_circuit_has_one_gate() {
    let circuit = build(Vtree::balanced(2), 0);
    assert_eq!(circuit.decision_nodes().len(), 1);
    assert_eq!(circuit.num_elements(), 4);
    assert_eq!(circuit.num_parameters(), 9);
    assert_eq!(circuit.parameters().len(), 9);
}

#[test]
fn test_load_hand_written_circuit() {
    let vtree = Arc::new(Vtree::from_vtree_string("vtree 3\nL 0 1\nL 1 2\nI 2 0 1\n").unwrap());
    let content = "\
c a hand-written circuit
Regression Circuit
T 0 0 1 0.5
T 3 1 2 0.25
F 1 0 1 -0.5
F 4 1 2 -0.25
D 2 2 1 (0 1 0.3)
B 0.1
";
    let circuit = Circuit::from_circuit_string(vtree, content).unwrap();
    assert_eq!(circuit.bias(), 0.1);
    assert_eq!(circuit.parameters()[0], 0.1);

    let root = circuit.node(circuit.root()).unwrap().as_decision().unwrap();
    assert_eq!(root.elements.len(), 1);
    let element = circuit.element(root.elements[0]).unwrap();
    assert_eq!(circuit.node(element.prime).unwrap().index(), 0);
    assert_eq!(circuit.node(element.sub).unwrap().index(), 1);
    assert_eq!(element.parameter, 0.3);
}

#[test]
fn test_zero_splits_selects_nothing() {
    let mut circuit = build(Vtree::balanced(5), 1);
    let mut train = data(5, 64, 2);
    train.refresh_features(&circuit);
    let config = SplitConfig {
        num_splits: 0,
        ..permissive_splits()
    };
    assert!(circuit.select_splits(&train, &config).unwrap().is_empty());

    let before = circuit.to_circuit_string();
    assert!(circuit.change_structure(&train, &config).unwrap().is_empty());
    assert_eq!(circuit.to_circuit_string(), before);
}

#[test]
fn test_split_outside_splittable_set_is_rejected() {
    let mut circuit = build(Vtree::right_linear(4), 3);
    // The deepest gate is over {3, 4}; its elements pair two literals.
    let leaf_element = *circuit.elements().last().unwrap();
    assert!(circuit.element(leaf_element).unwrap().splittable_variables.is_empty());

    let before = circuit.to_circuit_string();
    let result = circuit.split(leaf_element, 1, 20);
    assert!(matches!(result, Err(CircuitError::NotSplittable { var: 1, .. })));
    assert_eq!(circuit.to_circuit_string(), before);
}

#[test]
fn test_roundtrip_after_training() {
    let train = data(4, 80, 4);
    let config = TrainConfig {
        solver: SolverConfig {
            kind: SolverKind::BayesianRidge,
            ..SolverConfig::default()
        },
        split: permissive_splits(),
        max_iter_sl: 3,
        ..TrainConfig::default()
    };
    let circuit = learn_regression_circuit(Arc::new(Vtree::balanced(4)), train, None, config)
        .unwrap()
        .circuit;

    let path = std::env::temp_dir().join(format!("regression-circuit-{}.psdd", std::process::id()));
    circuit.save_file(&path).unwrap();
    let loaded = Circuit::load_file(Arc::clone(circuit.vtree()), &path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded.terminals().count(), circuit.terminals().count());
    assert_eq!(loaded.bias(), circuit.bias());
    assert_eq!(loaded.num_elements(), circuit.num_elements());
    for (a, b) in loaded.parameters().iter().zip(circuit.parameters()) {
        assert!((a - b).abs() < 1e-9);
    }
    assert_eq!(loaded.covariances().len(), 1);
}

#[test]
fn test_feature_width_across_vtrees() {
    for (i, vtree) in [Vtree::balanced(6), Vtree::right_linear(6), Vtree::left_linear(6)]
        .into_iter()
        .enumerate()
    {
        let mut circuit = build(vtree, i as u64);
        let mut train = data(6, 100, 10 + i as u64);
        for _ in 0..3 {
            train.refresh_features(&circuit);
            assert_eq!(train.features.ncols(), 1 + 2 * 6 + circuit.num_elements());
            assert_eq!(train.features.ncols(), circuit.num_parameters());
            circuit.change_structure(&train, &permissive_splits()).unwrap();
        }
    }
}

#[test]
fn test_partition_identity_after_splits() {
    let mut circuit = build(Vtree::balanced(5), 5);
    let mut train = data(5, 64, 6);
    train.refresh_features(&circuit);
    circuit.change_structure(&train, &permissive_splits()).unwrap();

    let mut images = train.images.clone();
    images[[0, 2]] = -1.0;
    images[[1, 0]] = 0.3;
    images[[2, 4]] = 0.8;
    assert_partition_identity(&circuit, &images);
}

#[test]
fn test_split_variable_leaves_derived_elements() {
    let mut circuit = build(Vtree::balanced(4), 7);
    let root = circuit.node(circuit.root()).unwrap().as_decision().unwrap();
    let element = root.elements[0];
    let sibling = circuit.split(element, 3, 20).unwrap();

    let derived = |e: ElementId| {
        let element = circuit.element(e).unwrap();
        let mut all = vec![e];
        all.extend(circuit.descendant_elements(element.prime));
        all.extend(circuit.descendant_elements(element.sub));
        all
    };
    for e in derived(element).into_iter().chain(derived(sibling)) {
        assert!(!circuit.element(e).unwrap().splittable_variables.contains(&3));
    }
}

#[test]
fn test_parent_counts_are_conserved() {
    let mut circuit = build(Vtree::balanced(6), 8);
    let mut train = data(6, 128, 9);
    let (counted, edges) = decision_references(&circuit);
    assert_eq!(counted, edges);

    for _ in 0..3 {
        train.refresh_features(&circuit);
        circuit.change_structure(&train, &permissive_splits()).unwrap();
        let (counted, edges) = decision_references(&circuit);
        assert_eq!(counted, edges);
    }
}

#[test]
fn test_change_structure_grows_circuit() {
    let mut circuit = build(Vtree::balanced(4), 12);
    let mut train = data(4, 64, 13);
    train.refresh_features(&circuit);
    let before = circuit.num_elements();

    let applied = circuit.change_structure(&train, &permissive_splits()).unwrap();
    assert!(!applied.is_empty());
    assert!(applied.len() <= 4);
    assert!(circuit.num_elements() > before);

    // Every gate still lists live elements that point back at it.
    let mut owners: HashMap<ElementId, NodeId> = HashMap::new();
    for &id in circuit.decision_nodes() {
        for &e in &circuit.node(id).unwrap().as_decision().unwrap().elements {
            owners.insert(e, id);
        }
    }
    for &e in circuit.elements() {
        assert_eq!(owners.get(&e), Some(&circuit.element(e).unwrap().parent));
    }
}
