//! Structural splits.
//!
//! Splitting element `(p, s)` on variable `v` turns it into two elements: the
//! original keeps the part of its subcircuit where `v` is true, a new sibling
//! in the same gate takes the part where `v` is false. The literal constraint
//! is pushed down the subcircuit by copying and editing the nodes on the way:
//!
//! - a terminal of `v` survives on the side matching its polarity only;
//! - a decision node still referenced by other elements is deep-copied first
//!   and the copy is edited, so the other parents never observe the change;
//! - a decision node referenced only through the edited edge is edited in place;
//! - elements (and nodes) left without any consistent content are removed.
//!
//! Below `depth` levels only the child whose vtree contains `v` is walked;
//! the other child is shared by both sides unchanged.
//!
//! During a walk, every node handed back by [`Circuit::split_node`] is
//! *unattached*: the edge that led to it has been released, and the caller
//! attaches whatever it keeps. Nodes nobody re-attaches are discarded.

use log::{debug, info, warn};

use crate::circuit::Circuit;
use crate::dataset::DataSet;
use crate::error::{CircuitError, Result};
use crate::node::{Element, Node};
use crate::reference::{ElementId, NodeId};
use crate::split::{Split, SplitConfig};
use crate::types::Polarity;

type Pair<T> = (Option<T>, Option<T>);

impl Circuit {
    /// Splits `element` on `var` and rebuilds the circuit.
    ///
    /// Returns the new sibling element, which holds the `var = false` part.
    /// On error the circuit is left exactly as it was.
    pub fn split(&mut self, element: ElementId, var: u32, depth: usize) -> Result<ElementId> {
        let sibling = self.apply_split(element, var, depth)?;
        self.rebuild();
        Ok(sibling)
    }

    /// Runs one round of structure learning: selects splits on `data` and
    /// applies them, then rebuilds once.
    ///
    /// Elements already touched by an earlier split of the same round are
    /// skipped. Splits rejected for structural reasons are logged and skipped;
    /// fatal errors abort the round.
    pub fn change_structure(&mut self, data: &DataSet, config: &SplitConfig) -> Result<Vec<Split>> {
        let splits = self.select_splits(data, config)?;
        self.apply_splits(splits, config.depth)
    }

    /// Applies `splits` in order, skipping elements flagged by an earlier
    /// split of the same batch, then rebuilds once.
    pub(crate) fn apply_splits(&mut self, splits: Vec<Split>, depth: usize) -> Result<Vec<Split>> {
        let mut applied = Vec::with_capacity(splits.len());
        for split in splits {
            match self.elements.get(split.element) {
                Some(element) if !element.flag => {}
                _ => {
                    debug!("change_structure: {} already modified in this round", split.element);
                    continue;
                }
            }
            match self.apply_split(split.element, split.var, depth) {
                Ok(_) => applied.push(split),
                Err(e) if !e.is_fatal() => warn!("skipping split of {} on x{}: {}", split.element, split.var, e),
                Err(e) => {
                    self.rebuild();
                    return Err(e);
                }
            }
        }
        self.rebuild();
        info!(
            "applied {} splits, circuit has {} elements",
            applied.len(),
            self.num_elements()
        );
        Ok(applied)
    }

    /// Applies a split without rebuilding. The split is atomic: on error the
    /// circuit is restored to its state before the call.
    pub(crate) fn apply_split(&mut self, element: ElementId, var: u32, depth: usize) -> Result<ElementId> {
        let target = self.elements.get(element).ok_or(CircuitError::DeadElement { element })?;
        if !target.splittable_variables.contains(&var) {
            return Err(CircuitError::NotSplittable { element, var });
        }
        let gate = target.parent;
        debug!("split({}, x{}, depth = {})", element, var, depth);

        let snapshot = self.clone();
        match self.split_element(element, var, 0, depth) {
            Ok((Some(_), Some(sibling))) => {
                self.adopt(gate, sibling);
                // The width changed, so earlier covariances no longer line up.
                if !self.covariances.is_empty() {
                    debug!("split: discarding {} covariance matrices", self.covariances.len());
                    self.covariances.clear();
                }
                Ok(sibling)
            }
            Ok(_) => {
                *self = snapshot;
                Err(CircuitError::StructuralInvariantViolation { element, var })
            }
            Err(e) => {
                *self = snapshot;
                Err(e)
            }
        }
    }

    fn split_element(&mut self, id: ElementId, var: u32, depth: usize, max_depth: usize) -> Result<Pair<ElementId>> {
        let (prime, sub) = {
            let element = self.element_mut(id);
            element.flag = true;
            element.splittable_variables.remove(&var);
            (element.prime, element.sub)
        };

        let ((prime_orig, prime_copy), (sub_orig, sub_copy)) = if depth >= max_depth {
            if self.covers(prime, var) {
                (self.split_node(prime, var, depth, max_depth)?, self.share(sub)?)
            } else if self.covers(sub, var) {
                (self.share(prime)?, self.split_node(sub, var, depth, max_depth)?)
            } else {
                (self.share(prime)?, self.share(sub)?)
            }
        } else {
            (
                self.split_node(prime, var, depth, max_depth)?,
                self.split_node(sub, var, depth, max_depth)?,
            )
        };

        let copy = match (prime_copy, sub_copy) {
            (Some(p), Some(s)) => {
                let original = self.elements.get(id).expect("element under split is live");
                let mut element = Element::new(p, s, original.parameter, original.parent);
                element.splittable_variables = original.splittable_variables.clone();
                Some(self.add_detached_element(element))
            }
            _ => None,
        };

        let original = match (prime_orig, sub_orig) {
            (Some(p), Some(s)) => {
                self.attach(p);
                self.attach(s);
                let element = self.element_mut(id);
                element.prime = p;
                element.sub = s;
                Some(id)
            }
            _ => None,
        };

        for node in [prime_orig, sub_orig, prime_copy, sub_copy].into_iter().flatten() {
            self.discard_if_orphan(node);
        }
        Ok((original, copy))
    }

    fn split_node(&mut self, id: NodeId, var: u32, depth: usize, max_depth: usize) -> Result<Pair<NodeId>> {
        self.release(id)?;
        let (num_parents, vtree) = match self.nodes.get(id) {
            Some(Node::Terminal(t)) => {
                return Ok(if t.var != var {
                    (Some(id), Some(id))
                } else {
                    match t.polarity {
                        Polarity::Positive => (Some(id), None),
                        Polarity::Negative => (None, Some(id)),
                    }
                });
            }
            Some(Node::Decision(d)) => (d.num_parents, d.vtree),
            None => return Err(CircuitError::OrphanNode { index: id.raw() }),
        };

        let target = if num_parents > 0 {
            debug!("split_node: {} is shared by {} other parents, copying", id, num_parents);
            self.deep_copy_node(id, var, depth, max_depth)
        } else {
            id
        };

        let mut kept = Vec::new();
        let mut copies = Vec::new();
        for e in self.decision_mut(target).elements.clone() {
            let (original, copy) = self.split_element(e, var, depth + 1, max_depth)?;
            match original {
                Some(e) => kept.push(e),
                None => {
                    self.elements.drop(e);
                }
            }
            copies.extend(copy);
        }
        let is_empty = kept.is_empty();
        self.decision_mut(target).elements = kept;

        let copy = if copies.is_empty() {
            None
        } else {
            let index = self.fresh_index();
            let gate = self.add_decision(index, vtree);
            for e in copies {
                self.adopt(gate, e);
            }
            Some(gate)
        };
        let original = if is_empty { None } else { Some(target) };
        Ok((original, copy))
    }

    /// Releases the edge to `id` and hands the node back unchanged for both sides.
    fn share(&mut self, id: NodeId) -> Result<Pair<NodeId>> {
        self.release(id)?;
        Ok((Some(id), Some(id)))
    }

    /// Whether the vtree of node `id` contains `var`.
    fn covers(&self, id: NodeId, var: u32) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|node| self.vtree.variables(node.vtree()).contains(&var))
    }

    fn deep_copy_node(&mut self, id: NodeId, var: u32, depth: usize, max_depth: usize) -> NodeId {
        let (vtree, elements) = match self.nodes.get(id) {
            Some(Node::Decision(d)) => (d.vtree, d.elements.clone()),
            _ => return id,
        };
        let copies: Vec<ElementId> = elements
            .into_iter()
            .map(|e| self.deep_copy_element(e, var, depth + 1, max_depth))
            .collect();
        let index = self.fresh_index();
        let gate = self.add_decision(index, vtree);
        for e in copies {
            self.adopt(gate, e);
        }
        gate
    }

    fn deep_copy_element(&mut self, id: ElementId, var: u32, depth: usize, max_depth: usize) -> ElementId {
        let original = self.elements.get(id).expect("element under copy is live").clone();
        let (prime, sub) = if depth >= max_depth {
            if self.covers(original.prime, var) {
                (self.deep_copy_node(original.prime, var, depth, max_depth), original.sub)
            } else if self.covers(original.sub, var) {
                (original.prime, self.deep_copy_node(original.sub, var, depth, max_depth))
            } else {
                (original.prime, original.sub)
            }
        } else {
            (
                self.deep_copy_node(original.prime, var, depth, max_depth),
                self.deep_copy_node(original.sub, var, depth, max_depth),
            )
        };
        let mut element = Element::new(prime, sub, original.parameter, original.parent);
        element.splittable_variables = original.splittable_variables;
        self.add_detached_element(element)
    }

    /// Stores an element that no gate owns yet, registering it with its children.
    fn add_detached_element(&mut self, element: Element) -> ElementId {
        self.attach(element.prime);
        self.attach(element.sub);
        self.elements.add(element)
    }

    /// Makes `gate` the owner of a detached element.
    fn adopt(&mut self, gate: NodeId, element: ElementId) {
        self.element_mut(element).parent = gate;
        self.decision_mut(gate).elements.push(element);
    }

    /// Frees a decision node nobody refers to, together with everything only
    /// it referred to. Terminals are never freed.
    fn discard_if_orphan(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            match self.nodes.get(id) {
                Some(Node::Decision(d)) if d.num_parents == 0 && id != self.root => {}
                _ => continue,
            }
            if let Some(Node::Decision(d)) = self.nodes.drop(id) {
                for e in d.elements {
                    if let Some(element) = self.elements.drop(e) {
                        for child in element.children() {
                            if self.release(child).is_ok() {
                                stack.push(child);
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Arc;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use test_log::test;

    use super::*;
    use crate::vtree::Vtree;

    fn build(vtree: Vtree) -> Circuit {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        Circuit::new(Arc::new(vtree), &mut rng).unwrap()
    }

    fn root_elements(circuit: &Circuit) -> Vec<ElementId> {
        circuit.node(circuit.root()).unwrap().as_decision().unwrap().elements.clone()
    }

    /// Every reachable node's parent count equals the number of reachable
    /// element edges pointing at it.
    fn assert_parent_counts(circuit: &Circuit) {
        let mut references: HashMap<NodeId, usize> = HashMap::new();
        for &e in circuit.elements() {
            for child in circuit.element(e).unwrap().children() {
                *references.entry(child).or_default() += 1;
            }
        }
        for &id in circuit.decision_nodes() {
            let expected = references.get(&id).copied().unwrap_or(0);
            assert_eq!(circuit.node(id).unwrap().num_parents(), expected, "parent count of {}", id);
        }
        for var in 1..=circuit.num_variables() {
            for polarity in [Polarity::Positive, Polarity::Negative] {
                let id = circuit.terminal(var, polarity);
                let expected = references.get(&id).copied().unwrap_or(0);
                assert_eq!(circuit.node(id).unwrap().num_parents(), expected, "parent count of {}", id);
            }
        }
    }

    #[test]
    fn test_split_root_element() {
        let mut circuit = build(Vtree::balanced(4));
        let before = circuit.num_elements();
        let element = root_elements(&circuit)[0];

        let sibling = circuit.split(element, 1, 20).unwrap();

        assert_eq!(root_elements(&circuit), vec![element, sibling]);
        assert!(circuit.num_elements() > before);
        assert_eq!(circuit.num_parameters(), 1 + 8 + circuit.num_elements());
        for id in [element, sibling] {
            let e = circuit.element(id).unwrap();
            assert_eq!(e.splittable_variables, BTreeSet::from([2, 3, 4]));
            assert_eq!(e.parent, circuit.root());
        }
        assert_parent_counts(&circuit);
    }

    #[test]
    fn test_split_fixes_literal_on_each_side() {
        let mut circuit = build(Vtree::balanced(4));
        let element = root_elements(&circuit)[0];
        let sibling = circuit.split(element, 1, 20).unwrap();

        let x1 = circuit.terminal(1, Polarity::Positive);
        let not_x1 = circuit.terminal(1, Polarity::Negative);
        let reaches = |e: ElementId, target: NodeId| {
            let element = circuit.element(e).unwrap();
            circuit
                .descendant_elements(element.prime)
                .into_iter()
                .chain(circuit.descendant_elements(element.sub))
                .any(|d| circuit.element(d).unwrap().children().contains(&target))
        };
        assert!(reaches(element, x1));
        assert!(!reaches(element, not_x1));
        assert!(reaches(sibling, not_x1));
        assert!(!reaches(sibling, x1));
    }

    #[test]
    fn test_split_removes_variable_from_derived_elements() {
        let mut circuit = build(Vtree::right_linear(5));
        let element = root_elements(&circuit)[0];
        let var = 3;
        let sibling = circuit.split(element, var, 2).unwrap();

        for id in [element, sibling] {
            assert!(!circuit.element(id).unwrap().splittable_variables.contains(&var));
            let e = circuit.element(id).unwrap();
            for node in e.children() {
                for d in circuit.descendant_elements(node) {
                    assert!(!circuit.element(d).unwrap().splittable_variables.contains(&var));
                }
            }
        }
        assert_parent_counts(&circuit);
    }

    #[test]
    fn test_not_splittable_is_rejected() {
        let mut circuit = build(Vtree::right_linear(3));
        let element = root_elements(&circuit)[0];
        // x1 is the root element's own literal, never splittable there.
        let before = circuit.num_elements();
        let result = circuit.split(element, 1, 20);
        assert!(matches!(result, Err(CircuitError::NotSplittable { var: 1, .. })));
        assert_eq!(circuit.num_elements(), before);
        assert!(!circuit.element(element).unwrap().flag);
    }

    #[test]
    fn test_dead_element_is_rejected() {
        let mut circuit = build(Vtree::balanced(2));
        let result = circuit.split(ElementId::new(999), 1, 20);
        assert!(matches!(result, Err(CircuitError::DeadElement { .. })));
    }

    #[test]
    fn test_shared_node_is_copied_not_mutated() {
        let mut circuit = build(Vtree::balanced(4));
        let element = root_elements(&circuit)[0];

        // With no depth budget the sub (over x3, x4) is shared by both sides.
        let sibling = circuit.split(element, 1, 0).unwrap();
        let shared = circuit.element(element).unwrap().sub;
        assert_eq!(circuit.element(sibling).unwrap().sub, shared);
        assert_eq!(circuit.node(shared).unwrap().num_parents(), 2);
        let shared_elements = circuit.node(shared).unwrap().as_decision().unwrap().elements.clone();
        assert_parent_counts(&circuit);

        // Splitting the original on x3 must leave the sibling's view intact.
        circuit.split(element, 3, 0).unwrap();
        assert_eq!(circuit.element(sibling).unwrap().sub, shared);
        assert_eq!(circuit.node(shared).unwrap().num_parents(), 1);
        assert_eq!(
            circuit.node(shared).unwrap().as_decision().unwrap().elements,
            shared_elements
        );
        assert_ne!(circuit.element(element).unwrap().sub, shared);
        assert_parent_counts(&circuit);
    }

    #[test]
    fn test_parent_count_conservation() {
        let mut circuit = build(Vtree::balanced(8));
        assert_parent_counts(&circuit);
        let element = root_elements(&circuit)[0];
        let sibling = circuit.split(element, 2, 1).unwrap();
        assert_parent_counts(&circuit);
        circuit.split(sibling, 7, 3).unwrap();
        assert_parent_counts(&circuit);

        let total: usize = circuit
            .decision_nodes()
            .iter()
            .map(|&id| circuit.node(id).unwrap().num_parents())
            .sum();
        let edges: usize = circuit
            .elements()
            .iter()
            .flat_map(|&e| circuit.element(e).unwrap().children())
            .filter(|&child| !circuit.node(child).unwrap().is_terminal())
            .count();
        assert_eq!(total, edges);
    }

    #[test]
    fn test_split_keeps_partition_identity() {
        use ndarray::array;

        let mut circuit = build(Vtree::balanced(4));
        let element = root_elements(&circuit)[0];
        circuit.split(element, 4, 1).unwrap();

        let images = array![[1.0, 0.0, 1.0, 1.0], [0.0, 0.0, 1.0, 0.0], [0.3, 0.9, 0.1, 0.6]];
        let features = circuit.calculate_features(&images);
        assert_eq!(features.ncols(), circuit.num_parameters());

        // The root still covers every assignment exactly once.
        let probabilities = circuit.probabilities(&images);
        for row in 0..2 {
            assert!((probabilities.get(circuit.root()).unwrap()[row] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_flagged_element_is_skipped_in_the_same_round() {
        let mut circuit = build(Vtree::balanced(4));
        let element = root_elements(&circuit)[0];
        let splits = vec![
            Split {
                element,
                var: 1,
                improvement: -2.0,
            },
            Split {
                element,
                var: 2,
                improvement: -1.0,
            },
        ];

        let applied = circuit.apply_splits(splits, 20).unwrap();

        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].var, 1);
        assert_eq!(root_elements(&circuit).len(), 2);
        let e = circuit.element(element).unwrap();
        assert!(e.splittable_variables.contains(&2));
        assert!(!e.flag);
        assert_parent_counts(&circuit);
    }

    #[test]
    fn test_split_discards_stale_covariances() {
        use ndarray::{Array1, Array2};

        use crate::solver::{SolverConfig, SolverKind};

        let mut circuit = build(Vtree::balanced(4));
        let images = Array2::from_shape_fn((16, 4), |(row, var)| ((row >> var) & 1) as f64);
        let labels: Array1<f64> = images.rows().into_iter().map(|x| 2.0 * x[0] * x[2] + x[1]).collect();
        let mut data = DataSet::new(images, labels);
        data.refresh_features(&circuit);
        let config = SolverConfig {
            kind: SolverKind::BayesianRidge,
            ..SolverConfig::default()
        };
        circuit.learn_parameters(&data, &config).unwrap();
        let width = circuit.num_parameters();
        assert_eq!(circuit.covariances()[0].dim(), (width, width));

        // A rejected split leaves the covariance in place.
        let element = root_elements(&circuit)[0];
        let leaf_element = *circuit.elements().last().unwrap();
        assert!(circuit.split(leaf_element, 1, 20).is_err());
        assert_eq!(circuit.covariances().len(), 1);

        circuit.split(element, 1, 20).unwrap();
        assert_ne!(circuit.num_parameters(), width);
        let width = circuit.num_parameters();
        assert!(circuit.covariances().iter().all(|m| m.dim() == (width, width)));
        assert!(!circuit.to_circuit_string().lines().any(|line| line.starts_with("V ")));
    }
}
