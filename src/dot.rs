//! Graphviz DOT export for regression circuits.
//!
//! The output can be rendered using `dot -Tpdf file.dot -o file.pdf`.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//! use regression_circuit::circuit::Circuit;
//! use regression_circuit::vtree::Vtree;
//!
//! let mut rng = ChaCha8Rng::seed_from_u64(0);
//! let circuit = Circuit::new(Arc::new(Vtree::balanced(3)), &mut rng).unwrap();
//! let dot = circuit.to_dot();
//! assert!(dot.contains("digraph Circuit"));
//! ```
//!
//! For custom configuration, use [`Circuit::to_dot_with_config`] with [`DotConfig`].

use std::fmt::Write;

use crate::circuit::Circuit;
use crate::node::Node;
use crate::reference::NodeId;
use crate::vtree::{Vtree, VtreeId, VtreeNode};

/// Configuration for DOT export.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Use horizontal layout (rankdir=LR).
    pub horizontal: bool,
    /// Font size for labels.
    pub font_size: u32,
    /// Node width.
    pub node_width: f32,
    /// Show the vtree node index of every OR-gate.
    pub show_vtree: bool,
    /// Label elements with their learned parameter.
    pub show_parameters: bool,
    /// Use HTML tables for elements (two-cell rectangles with prime/sub).
    /// When true (default): literals are inlined in the cells.
    /// When false: elements are point nodes with edges to shared literal nodes.
    pub use_html_tables: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            horizontal: false,
            font_size: 12,
            node_width: 0.5,
            show_vtree: false,
            show_parameters: false,
            use_html_tables: true,
        }
    }
}

impl DotConfig {
    /// Create a config with basic mode (no HTML tables, reused nodes).
    pub fn basic() -> Self {
        Self {
            use_html_tables: false,
            ..Default::default()
        }
    }
}

impl Circuit {
    /// Exports the circuit to Graphviz DOT format.
    pub fn to_dot(&self) -> String {
        self.to_dot_with_config(&DotConfig::default())
    }

    /// Exports the circuit to Graphviz DOT format with custom configuration.
    pub fn to_dot_with_config(&self, config: &DotConfig) -> String {
        let mut dot = String::new();

        writeln!(dot, "digraph Circuit {{").unwrap();
        if config.horizontal {
            writeln!(dot, "  rankdir=LR;").unwrap();
        }
        writeln!(dot, "  node [fontsize={}, width={}];", config.font_size, config.node_width).unwrap();

        if !config.use_html_tables {
            for terminal in self.terminals() {
                let id = self.terminal(terminal.var, terminal.polarity);
                writeln!(dot, "  n{} [label=\"{}\", shape=ellipse];", id.raw(), terminal.literal()).unwrap();
            }
        }

        for &id in self.decision_nodes() {
            let Some(Node::Decision(gate)) = self.node(id) else {
                continue;
            };
            let vtree_label = if config.show_vtree {
                format!("\\n[v{}]", self.vtree().index(gate.vtree))
            } else {
                String::new()
            };
            writeln!(dot, "  n{} [label=\"{}{}\", shape=circle];", id.raw(), gate.index, vtree_label).unwrap();

            for (i, &e) in gate.elements.iter().enumerate() {
                let Some(element) = self.element(e) else {
                    continue;
                };
                let elem_id = format!("n{}_e{}", id.raw(), i);
                let edge_label = if config.show_parameters {
                    format!(" [label=\"{:.3}\"]", element.parameter)
                } else {
                    String::new()
                };

                if config.use_html_tables {
                    writeln!(
                        dot,
                        "  {} [label=<<TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"0\"><TR><TD PORT=\"p\">{}</TD><TD PORT=\"s\">{}</TD></TR></TABLE>>, shape=none];",
                        elem_id,
                        self.cell_content(element.prime),
                        self.cell_content(element.sub)
                    )
                    .unwrap();
                    writeln!(dot, "  n{} -> {}{};", id.raw(), elem_id, edge_label).unwrap();
                    if self.is_decision(element.prime) {
                        writeln!(dot, "  {}:p -> n{} [style=solid];", elem_id, element.prime.raw()).unwrap();
                    }
                    if self.is_decision(element.sub) {
                        writeln!(dot, "  {}:s -> n{} [style=dashed];", elem_id, element.sub.raw()).unwrap();
                    }
                } else {
                    writeln!(dot, "  {} [label=\"\", shape=point, width=0.1];", elem_id).unwrap();
                    writeln!(dot, "  n{} -> {}{};", id.raw(), elem_id, edge_label).unwrap();
                    writeln!(dot, "  {} -> n{} [label=\"p\", style=solid];", elem_id, element.prime.raw()).unwrap();
                    writeln!(dot, "  {} -> n{} [label=\"s\", style=dashed];", elem_id, element.sub.raw()).unwrap();
                }
            }
        }

        writeln!(dot, "}}").unwrap();
        dot
    }

    /// Literals are inlined; OR-gates show their index and get an edge.
    fn cell_content(&self, id: NodeId) -> String {
        match self.node(id) {
            Some(Node::Terminal(t)) => t.literal().to_string(),
            Some(Node::Decision(d)) => format!("○{}", d.index),
            None => "?".to_string(),
        }
    }

    fn is_decision(&self, id: NodeId) -> bool {
        matches!(self.node(id), Some(Node::Decision(_)))
    }
}

impl Vtree {
    /// Exports the vtree to Graphviz DOT format, labelling internal nodes with
    /// their file index.
    pub fn to_dot(&self) -> String {
        let mut dot = String::new();

        writeln!(dot, "digraph Vtree {{").unwrap();
        writeln!(dot, "  node [fontsize=12];").unwrap();

        for i in 0..self.num_nodes() {
            let id = VtreeId::new(i as u32);
            match *self.node(id) {
                VtreeNode::Leaf { var } => {
                    writeln!(dot, "  v{} [label=\"x{}\", shape=ellipse];", id.raw(), var).unwrap();
                }
                VtreeNode::Internal { left, right } => {
                    writeln!(dot, "  v{} [label=\"{}\", shape=circle];", id.raw(), self.index(id)).unwrap();
                    writeln!(dot, "  v{} -> v{} [label=\"L\"];", id.raw(), left.raw()).unwrap();
                    writeln!(dot, "  v{} -> v{} [label=\"R\"];", id.raw(), right.raw()).unwrap();
                }
            }
        }

        writeln!(dot, "}}").unwrap();
        dot
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use test_log::test;

    use super::*;

    fn build(num_vars: u32) -> Circuit {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        Circuit::new(Arc::new(Vtree::balanced(num_vars)), &mut rng).unwrap()
    }

    #[test]
    fn test_one_circle_per_decision() {
        let circuit = build(5);
        let dot = circuit.to_dot();
        assert!(dot.starts_with("digraph Circuit"));
        assert_eq!(dot.matches("shape=circle").count(), circuit.decision_nodes().len());
        assert!(dot.contains("TABLE"));
        assert!(dot.contains("¬x1"));
    }

    #[test]
    fn test_basic_mode() {
        let circuit = build(3);
        let config = DotConfig {
            show_parameters: true,
            horizontal: true,
            ..DotConfig::basic()
        };
        let dot = circuit.to_dot_with_config(&config);
        assert!(!dot.contains("TABLE"));
        assert!(dot.contains("rankdir=LR"));
        assert_eq!(dot.matches("shape=point").count(), circuit.num_elements());
        assert_eq!(dot.matches("shape=ellipse").count(), 6);
        assert!(dot.contains("style=dashed"));
    }

    #[test]
    fn test_vtree_to_dot() {
        let dot = Vtree::balanced(4).to_dot();
        assert!(dot.contains("digraph Vtree"));
        assert!(dot.contains("x1"));
        assert!(dot.contains("x4"));
        assert_eq!(dot.matches("shape=circle").count(), 3);
    }
}
