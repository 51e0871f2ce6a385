//! The regression circuit: a DAG of OR-gates and AND-elements over a vtree.
//!
//! All nodes and elements live in two arenas owned by [`Circuit`] and are
//! addressed by [`NodeId`] / [`ElementId`] handles. Nodes may be shared by
//! several elements, so every node carries an explicit parent count; edits
//! that must not leak into other parents copy the node into a fresh slot and
//! rewire only the edge being edited (see [`crate::mutate`]).
//!
//! Terminals occupy the first `2 · num_variables` node slots: the positive
//! literal of `x_v` at slot `v - 1`, the negative one at slot `n + v - 1`.
//! This is also their column order in the parameter vector.

use std::collections::{BTreeSet, HashSet};
use std::fmt::{self, Debug};
use std::sync::Arc;

use log::debug;
use ndarray::{Array1, Array2};
use rand::Rng;

use crate::dataset::DataSet;
use crate::error::{CircuitError, Result};
use crate::node::{Decision, Element, Node, Terminal};
use crate::reference::{ElementId, NodeId};
use crate::storage::Arena;
use crate::types::Polarity;
use crate::vtree::{Vtree, VtreeId, VtreeNode};

#[derive(Clone)]
pub struct Circuit {
    pub(crate) vtree: Arc<Vtree>,
    pub(crate) num_variables: u32,
    /// Next unused node index.
    pub(crate) next_index: u32,
    pub(crate) nodes: Arena<NodeId, Node>,
    pub(crate) elements: Arena<ElementId, Element>,
    pub(crate) root: NodeId,
    /// Reachable decision nodes, parents before children.
    decision_order: Vec<NodeId>,
    /// Reachable elements in parameter column order.
    element_order: Vec<ElementId>,
    pub(crate) parameters: Array1<f64>,
    pub(crate) covariances: Vec<Array2<f64>>,
    pub(crate) bias: f64,
}

impl Circuit {
    /// Builds the full expansion of `vtree` with random initial parameters.
    ///
    /// Every terminal, element and the bias receive a parameter drawn
    /// uniformly from `[0, 1)`.
    pub fn new<R: Rng>(vtree: Arc<Vtree>, rng: &mut R) -> Result<Self> {
        if vtree.is_leaf(vtree.root()) {
            return Err(CircuitError::DegenerateVtree);
        }
        // Leaves must carry the variables 1..=n, each exactly once.
        let leaves = vtree.leaves();
        let vars: BTreeSet<u32> = leaves.iter().map(|&leaf| vtree.var(leaf)).collect();
        let n = vtree.num_vars();
        if vars.len() != leaves.len() || vars.len() != n as usize || vars.contains(&0) {
            return Err(CircuitError::DegenerateVtree);
        }

        let mut circuit = Self::empty(vtree.clone());
        circuit.bias = rng.random();

        // Indices and parameters are handed out in vtree leaf order,
        // while slots follow variable order.
        let mut slots: Vec<Option<Terminal>> = vec![None; 2 * n as usize];
        for &leaf in &leaves {
            let var = vtree.var(leaf);
            for polarity in [Polarity::Positive, Polarity::Negative] {
                let index = circuit.fresh_index();
                slots[terminal_slot(n, var, polarity)] = Some(Terminal {
                    index,
                    vtree: leaf,
                    var,
                    polarity,
                    parameter: rng.random(),
                    num_parents: 0,
                });
            }
        }
        for terminal in slots.into_iter().flatten() {
            circuit.nodes.add(Node::Terminal(terminal));
        }

        circuit.root = circuit.build_gate(vtree.root(), rng);
        circuit.rebuild();
        debug!(
            "built circuit: {} decision nodes, {} elements",
            circuit.decision_order.len(),
            circuit.element_order.len()
        );
        Ok(circuit)
    }

    /// A circuit with no nodes, used by the builder and the file reader.
    pub(crate) fn empty(vtree: Arc<Vtree>) -> Self {
        let num_variables = vtree.num_vars();
        Self {
            vtree,
            num_variables,
            next_index: 0,
            nodes: Arena::new(),
            elements: Arena::new(),
            root: NodeId::new(0),
            decision_order: Vec::new(),
            element_order: Vec::new(),
            parameters: Array1::zeros(0),
            covariances: Vec::new(),
            bias: 0.0,
        }
    }

    fn build_gate<R: Rng>(&mut self, v: VtreeId, rng: &mut R) -> NodeId {
        let vtree = Arc::clone(&self.vtree);
        let (left, right) = vtree.node(v).children().expect("gates are built on internal vtree nodes");

        let mut parts: Vec<(NodeId, NodeId, f64, BTreeSet<u32>)> = Vec::new();
        match (vtree.node(left), vtree.node(right)) {
            (&VtreeNode::Leaf { var: p }, &VtreeNode::Leaf { var: s }) => {
                for prime in [Polarity::Positive, Polarity::Negative] {
                    for sub in [Polarity::Positive, Polarity::Negative] {
                        let prime = self.terminal(p, prime);
                        let sub = self.terminal(s, sub);
                        parts.push((prime, sub, rng.random(), BTreeSet::new()));
                    }
                }
            }
            (&VtreeNode::Leaf { var: p }, _) => {
                for polarity in [Polarity::Positive, Polarity::Negative] {
                    let sub = self.build_gate(right, rng);
                    let prime = self.terminal(p, polarity);
                    parts.push((prime, sub, rng.random(), vtree.variables(right).clone()));
                }
            }
            (_, &VtreeNode::Leaf { var: s }) => {
                for polarity in [Polarity::Positive, Polarity::Negative] {
                    let prime = self.build_gate(left, rng);
                    let sub = self.terminal(s, polarity);
                    parts.push((prime, sub, rng.random(), vtree.variables(left).clone()));
                }
            }
            _ => {
                let prime = self.build_gate(left, rng);
                let sub = self.build_gate(right, rng);
                parts.push((prime, sub, rng.random(), vtree.variables(v).clone()));
            }
        }

        let index = self.fresh_index();
        let gate = self.add_decision(index, v);
        for (prime, sub, parameter, splittable) in parts {
            let mut element = Element::new(prime, sub, parameter, gate);
            element.splittable_variables = splittable;
            self.push_element(gate, element);
        }
        gate
    }

    pub(crate) fn fresh_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// Adds a decision node with no elements and no parents.
    pub(crate) fn add_decision(&mut self, index: u32, vtree: VtreeId) -> NodeId {
        self.nodes.add(Node::Decision(Decision {
            index,
            vtree,
            elements: Vec::new(),
            num_parents: 0,
        }))
    }

    /// Appends `element` to `gate`, registering it as a parent of its children.
    pub(crate) fn push_element(&mut self, gate: NodeId, mut element: Element) -> ElementId {
        self.attach(element.prime);
        self.attach(element.sub);
        element.parent = gate;
        let id = self.elements.add(element);
        self.decision_mut(gate).elements.push(id);
        id
    }

    pub(crate) fn attach(&mut self, node: NodeId) {
        if let Some(node) = self.nodes.get_mut(node) {
            *node.num_parents_mut() += 1;
        }
    }

    /// Drops one parent reference from `node`.
    pub(crate) fn release(&mut self, node: NodeId) -> Result<()> {
        let entry = self.nodes.get_mut(node).ok_or(CircuitError::OrphanNode { index: node.raw() })?;
        let index = entry.index();
        let count = entry.num_parents_mut();
        if *count == 0 {
            return Err(CircuitError::OrphanNode { index });
        }
        *count -= 1;
        Ok(())
    }

    pub(crate) fn decision_mut(&mut self, id: NodeId) -> &mut Decision {
        self.nodes
            .get_mut(id)
            .and_then(Node::as_decision_mut)
            .expect("handle refers to a live decision node")
    }

    pub(crate) fn element_mut(&mut self, id: ElementId) -> &mut Element {
        self.elements.get_mut(id).expect("handle refers to a live element")
    }

    /// Recomputes the traversal orders from the root, frees everything that
    /// is no longer reachable, clears split flags and rebuilds the parameter
    /// vector to the current width.
    pub fn rebuild(&mut self) {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut postorder: Vec<NodeId> = Vec::new();
        let mut stack = vec![(self.root, false)];
        while let Some((id, finished)) = stack.pop() {
            if finished {
                postorder.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            if let Some(Node::Decision(d)) = self.nodes.get(id) {
                for &e in d.elements.iter().rev() {
                    let element = self.elements.get(e).expect("decision elements are live");
                    for child in [element.sub, element.prime] {
                        if !visited.contains(&child) && matches!(self.nodes.get(child), Some(Node::Decision(_))) {
                            stack.push((child, false));
                        }
                    }
                }
            }
        }
        postorder.reverse();
        self.decision_order = postorder;
        self.element_order = self
            .decision_order
            .iter()
            .flat_map(|&id| self.nodes.get(id).and_then(Node::as_decision).map(|d| d.elements.clone()).unwrap_or_default())
            .collect();
        for &e in &self.element_order {
            if let Some(element) = self.elements.get_mut(e) {
                element.flag = false;
            }
        }
        self.sweep(&visited);
        self.parameters = self.collect_parameters();
    }

    /// Frees unreachable decision nodes and elements, releasing their edges.
    fn sweep(&mut self, reachable: &HashSet<NodeId>) {
        let live: HashSet<ElementId> = self.element_order.iter().copied().collect();
        for id in self.elements.keys() {
            if live.contains(&id) {
                continue;
            }
            if let Some(element) = self.elements.drop(id) {
                for child in element.children() {
                    if let Some(node) = self.nodes.get_mut(child) {
                        let count = node.num_parents_mut();
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }
        let dead: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(id, node)| !node.is_terminal() && !reachable.contains(id))
            .map(|(id, _)| id)
            .collect();
        if !dead.is_empty() {
            debug!("sweep: freeing {} unreachable decision nodes", dead.len());
        }
        for id in dead {
            self.nodes.drop(id);
        }
    }

    fn collect_parameters(&self) -> Array1<f64> {
        let mut parameters = Vec::with_capacity(self.width());
        parameters.push(self.bias);
        parameters.extend(self.terminals().map(|t| t.parameter));
        parameters.extend(self.element_order.iter().map(|&e| self.elements.get(e).map_or(0.0, |el| el.parameter)));
        Array1::from(parameters)
    }

    /// Expected feature width: `1 + 2 · num_variables + |elements|`.
    fn width(&self) -> usize {
        1 + 2 * self.num_variables as usize + self.element_order.len()
    }

    /// Writes a learned coefficient vector back onto the bias, terminals and
    /// elements, in column order.
    pub fn record_learned_parameters(&mut self, coefficients: &Array1<f64>) -> Result<()> {
        if coefficients.len() != self.width() {
            return Err(CircuitError::FeatureWidth {
                expected: self.width(),
                found: coefficients.len(),
            });
        }
        let n = 2 * self.num_variables as usize;
        self.bias = coefficients[0];
        for i in 0..n {
            if let Some(Node::Terminal(t)) = self.nodes.get_mut(NodeId::from(i)) {
                t.parameter = coefficients[i + 1];
            }
        }
        for (j, &e) in self.element_order.iter().enumerate() {
            if let Some(element) = self.elements.get_mut(e) {
                element.parameter = coefficients[j + 1 + n];
            }
        }
        self.parameters = coefficients.clone();
        Ok(())
    }

    /// Linear prediction `features · parameters`.
    ///
    /// # Panics
    ///
    /// Panics if the feature width does not match [`Circuit::num_parameters`].
    pub fn predict(&self, features: &Array2<f64>) -> Array1<f64> {
        features.dot(&self.parameters)
    }

    /// Mean squared error of the prediction on `data.features`.
    pub fn calculate_error(&self, data: &DataSet) -> f64 {
        let residual = &data.labels - &self.predict(&data.features);
        residual.mapv(|r| r * r).mean().unwrap_or(0.0)
    }
}

// Accessors
impl Circuit {
    pub fn vtree(&self) -> &Arc<Vtree> {
        &self.vtree
    }

    pub fn num_variables(&self) -> u32 {
        self.num_variables
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Largest node index handed out so far.
    pub fn largest_index(&self) -> u32 {
        self.next_index.saturating_sub(1)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id)
    }

    /// Handle of the terminal for literal `var` / `polarity`.
    pub fn terminal(&self, var: u32, polarity: Polarity) -> NodeId {
        NodeId::from(terminal_slot(self.num_variables, var, polarity))
    }

    /// Terminals in column order: positive literals by ascending variable,
    /// then negative literals by ascending variable.
    pub fn terminals(&self) -> impl Iterator<Item = &Terminal> {
        (0..2 * self.num_variables as usize).filter_map(|i| self.nodes.get(NodeId::from(i)).and_then(Node::as_terminal))
    }

    /// Reachable decision nodes, parents before children.
    pub fn decision_nodes(&self) -> &[NodeId] {
        &self.decision_order
    }

    /// Reachable elements in parameter column order.
    pub fn elements(&self) -> &[ElementId] {
        &self.element_order
    }

    pub fn num_elements(&self) -> usize {
        self.element_order.len()
    }

    /// Width of the parameter vector.
    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    /// `[bias, terminals..., elements...]`.
    pub fn parameters(&self) -> &Array1<f64> {
        &self.parameters
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Coefficient covariance matrices from the last Bayesian fit.
    pub fn covariances(&self) -> &[Array2<f64>] {
        &self.covariances
    }

    /// Elements reachable from `node`, including those of `node` itself.
    pub fn descendant_elements(&self, node: NodeId) -> Vec<ElementId> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(Node::Decision(d)) = self.nodes.get(id) {
                for &e in &d.elements {
                    result.push(e);
                    if let Some(element) = self.elements.get(e) {
                        stack.extend(element.children());
                    }
                }
            }
        }
        result
    }
}

impl Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Circuit")
            .field("num_variables", &self.num_variables)
            .field("decision_nodes", &self.decision_order.len())
            .field("elements", &self.element_order.len())
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

pub(crate) fn terminal_slot(num_variables: u32, var: u32, polarity: Polarity) -> usize {
    assert!(var >= 1 && var <= num_variables, "Variable x{} out of range", var);
    match polarity {
        Polarity::Positive => (var - 1) as usize,
        Polarity::Negative => (num_variables + var - 1) as usize,
    }
}
