//! Feature extraction.
//!
//! Probabilities flow bottom-up: a terminal evaluates its literal on the input
//! column, an element multiplies the probabilities of its prime and sub, and a
//! gate sums its elements. Features then flow top-down from a root feature of
//! 1: every element receives its gate's feature scaled by its share of the
//! gate probability, and passes it on to both of its children.
//!
//! The resulting matrix has one column per parameter, in parameter order:
//! bias, terminals, elements.

use ndarray::{Array1, Array2, Zip};

use crate::circuit::Circuit;
use crate::node::Node;
use crate::reference::NodeId;

/// Sentinel for a missing observation. Any negative value is treated as missing.
pub const MISSING: f64 = -1.0;

#[inline]
pub fn is_missing(value: f64) -> bool {
    value < 0.0
}

/// Per-row probabilities of every reachable node.
#[derive(Debug, Clone)]
pub struct Probabilities {
    nodes: Vec<Option<Array1<f64>>>,
}

impl Probabilities {
    pub fn get(&self, id: NodeId) -> Option<&Array1<f64>> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }
}

impl Circuit {
    /// Computes the probability of every terminal and decision node on each row.
    ///
    /// Missing values are marginalized: both literals of a missing variable
    /// evaluate to 1.
    ///
    /// # Panics
    ///
    /// Panics if `images` has fewer columns than the circuit has variables.
    pub fn probabilities(&self, images: &Array2<f64>) -> Probabilities {
        assert!(
            images.ncols() >= self.num_variables as usize,
            "Expected {} variable columns, got {}",
            self.num_variables,
            images.ncols()
        );
        let rows = images.nrows();
        let mut nodes: Vec<Option<Array1<f64>>> = vec![None; self.nodes.size()];

        for (i, terminal) in self.terminals().enumerate() {
            let column = images.column(terminal.var as usize - 1);
            let polarity = terminal.polarity;
            nodes[i] = Some(column.mapv(|x| if is_missing(x) { 1.0 } else { polarity.indicator(x) }));
        }

        for &id in self.decision_nodes().iter().rev() {
            let mut total = Array1::<f64>::zeros(rows);
            if let Some(Node::Decision(gate)) = self.nodes.get(id) {
                for &e in &gate.elements {
                    let element = self.elements.get(e).expect("decision elements are live");
                    let prime = nodes[element.prime.index()].as_ref().expect("children are evaluated first");
                    let sub = nodes[element.sub.index()].as_ref().expect("children are evaluated first");
                    Zip::from(&mut total).and(prime).and(sub).for_each(|t, &p, &s| *t += p * s);
                }
            }
            nodes[id.index()] = Some(total);
        }

        Probabilities { nodes }
    }

    /// Computes the feature matrix `[rows, 1 + 2·num_variables + |elements|]`.
    pub fn calculate_features(&self, images: &Array2<f64>) -> Array2<f64> {
        let rows = images.nrows();
        let probabilities = self.probabilities(images);
        let num_terminals = 2 * self.num_variables as usize;

        let mut features = Array2::<f64>::zeros((rows, 1 + num_terminals + self.num_elements()));
        features.column_mut(0).fill(1.0);

        let mut flow: Vec<Option<Array1<f64>>> = vec![None; self.nodes.size()];
        flow[self.root.index()] = Some(Array1::ones(rows));

        let mut column = 1 + num_terminals;
        for &id in self.decision_nodes() {
            let Some(Node::Decision(gate)) = self.nodes.get(id) else {
                continue;
            };
            let gate_feature = flow[id.index()].take().unwrap_or_else(|| Array1::zeros(rows));
            let gate_prob = probabilities.get(id).expect("reachable gates have probabilities");

            for &e in &gate.elements {
                let element = self.elements.get(e).expect("decision elements are live");
                let prime = probabilities.get(element.prime).expect("reachable nodes have probabilities");
                let sub = probabilities.get(element.sub).expect("reachable nodes have probabilities");

                let mut feature = Array1::<f64>::zeros(rows);
                Zip::from(&mut feature)
                    .and(&gate_feature)
                    .and(gate_prob)
                    .and(prime)
                    .and(sub)
                    .for_each(|f, &g, &total, &p, &s| {
                        if total > 0.0 {
                            *f = g * p * s / total;
                        }
                    });

                for child in element.children() {
                    match &mut flow[child.index()] {
                        Some(acc) => *acc += &feature,
                        slot => *slot = Some(feature.clone()),
                    }
                }
                features.column_mut(column).assign(&feature);
                column += 1;
            }
        }

        for i in 0..num_terminals {
            if let Some(feature) = &flow[i] {
                features.column_mut(1 + i).assign(feature);
            }
        }

        features
    }
}
