//! File I/O for regression circuits and vtrees.
//!
//! # Vtree File Format (.vtree)
//!
//! ```text
//! vtree <node_count>
//! L <id> <var>           # leaf node with variable
//! I <id> <left> <right>  # internal node with children
//! ```
//!
//! Nodes appear bottom-up (children before parents). The ids of the file are
//! kept as the vtree's node indices, so circuit files written against the
//! vtree refer to the same numbers.
//!
//! # Circuit File Format (.circuit)
//!
//! ```text
//! Regression Circuit
//! T <id> <vtree_id> <var> <param>                         # positive literal
//! F <id> <vtree_id> <var> <param>                         # negative literal
//! D <id> <vtree_id> <size> (<prime> <sub> <param>)*       # OR-gate
//! B <bias>
//! V <cov_00> <cov_01> ... <cov_nn>                        # optional, row-major
//! ```
//!
//! Terminals come first (all positive literals by ascending variable, then
//! all negative ones), then OR-gates children-before-parents; the last gate is
//! the root. Lines starting with `c` are comments.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Write as FmtWrite};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use ndarray::Array2;

use crate::circuit::{terminal_slot, Circuit};
use crate::error::{FormatError, Result};
use crate::node::{Element, Node, Terminal};
use crate::reference::NodeId;
use crate::types::Polarity;
use crate::vtree::{Vtree, VtreeId, VtreeNode};

const CIRCUIT_HEADER: &str = "Regression Circuit";

fn malformed(line: usize, message: impl Into<String>) -> FormatError {
    FormatError::Malformed {
        line,
        message: message.into(),
    }
}

fn parse_token<T: std::str::FromStr>(token: Option<&str>, line: usize, what: &str) -> Result<T, FormatError> {
    let token = token.ok_or_else(|| malformed(line, format!("missing {}", what)))?;
    token
        .parse()
        .map_err(|_| malformed(line, format!("invalid {} {:?}", what, token)))
}

// ─── Vtree I/O ───

impl Vtree {
    /// Saves the vtree to a file in libsdd format.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_vtree_string())?;
        Ok(())
    }

    /// Converts the vtree to libsdd format string.
    pub fn to_vtree_string(&self) -> String {
        let mut output = String::new();
        self.write_vtree(&mut output).expect("writing to a String cannot fail");
        output
    }

    fn write_vtree<W: FmtWrite>(&self, output: &mut W) -> fmt::Result {
        writeln!(output, "c ids of vtree nodes start at 0")?;
        writeln!(output, "c ids of variables start at 1")?;
        writeln!(output, "c vtree nodes appear bottom-up, children before parents")?;
        writeln!(output, "c")?;
        writeln!(output, "c file syntax:")?;
        writeln!(output, "c vtree number-of-nodes-in-vtree")?;
        writeln!(output, "c L id-of-leaf-vtree-node id-of-variable")?;
        writeln!(output, "c I id-of-internal-vtree-node id-of-left-child id-of-right-child")?;
        writeln!(output, "c")?;
        writeln!(output, "vtree {}", self.num_nodes())?;

        // Post-order, children before parents.
        let mut stack = vec![(self.root(), false)];
        while let Some((id, expanded)) = stack.pop() {
            match *self.node(id) {
                VtreeNode::Leaf { var } => writeln!(output, "L {} {}", self.index(id), var)?,
                VtreeNode::Internal { left, right } if expanded => {
                    writeln!(output, "I {} {} {}", self.index(id), self.index(left), self.index(right))?
                }
                VtreeNode::Internal { left, right } => {
                    stack.push((id, true));
                    stack.push((right, false));
                    stack.push((left, false));
                }
            }
        }
        Ok(())
    }

    /// Reads a vtree from a file in libsdd format.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_vtree_string(&content)
    }

    /// Parses a vtree from libsdd format string.
    pub fn from_vtree_string(content: &str) -> Result<Self> {
        let mut lines = content
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.starts_with('c') && !line.is_empty());

        let (header_line, header) = lines.next().ok_or_else(|| malformed(1, "missing vtree header"))?;
        let mut parts = header.split_whitespace();
        if parts.next() != Some("vtree") {
            return Err(malformed(header_line, format!("invalid header {:?}", header)).into());
        }
        let node_count: usize = parse_token(parts.next(), header_line, "node count")?;

        let mut nodes: Vec<VtreeNode> = Vec::with_capacity(node_count);
        let mut indices: Vec<u32> = Vec::with_capacity(node_count);
        let mut by_index: HashMap<u32, VtreeId> = HashMap::new();

        for (number, line) in lines {
            let mut parts = line.split_whitespace();
            let kind = parts.next().unwrap_or_default();
            let index: u32 = parse_token(parts.next(), number, "node id")?;
            let node = match kind {
                "L" => VtreeNode::Leaf {
                    var: parse_token(parts.next(), number, "variable")?,
                },
                "I" => {
                    let mut child = |what: &str| -> Result<VtreeId> {
                        let index: u32 = parse_token(parts.next(), number, what)?;
                        by_index
                            .get(&index)
                            .copied()
                            .ok_or_else(|| FormatError::UnknownVtree { index }.into())
                    };
                    let left = child("left child")?;
                    let right = child("right child")?;
                    VtreeNode::Internal { left, right }
                }
                _ => return Err(FormatError::UnexpectedLine { line: number }.into()),
            };
            let id = VtreeId::new(nodes.len() as u32);
            if by_index.insert(index, id).is_some() {
                return Err(malformed(number, format!("duplicate vtree node id {}", index)).into());
            }
            nodes.push(node);
            indices.push(index);
        }

        if nodes.is_empty() {
            return Err(malformed(header_line, "vtree has no nodes").into());
        }
        if nodes.len() != node_count {
            return Err(malformed(
                header_line,
                format!("header announces {} nodes, file has {}", node_count, nodes.len()),
            )
            .into());
        }

        check_vtree_shape(&nodes, header_line)?;
        let root = VtreeId::new(nodes.len() as u32 - 1);
        Ok(Vtree::from_parts(nodes, root, indices))
    }
}

/// Nodes must form a single tree rooted at the last node, with leaves over
/// the variables `1..=n`, each exactly once.
fn check_vtree_shape(nodes: &[VtreeNode], line: usize) -> Result<(), FormatError> {
    let mut parents = vec![0usize; nodes.len()];
    let mut vars = BTreeSet::new();
    for node in nodes {
        match *node {
            VtreeNode::Leaf { var } => {
                if var == 0 {
                    return Err(malformed(line, "variable 0 is not allowed, variables start at 1"));
                }
                if !vars.insert(var) {
                    return Err(malformed(line, format!("variable {} appears in more than one leaf", var)));
                }
            }
            VtreeNode::Internal { left, right } => {
                parents[left.index()] += 1;
                parents[right.index()] += 1;
            }
        }
    }
    let root = nodes.len() - 1;
    for (i, &count) in parents.iter().enumerate() {
        if count > 1 {
            return Err(malformed(line, format!("vtree node {} has more than one parent", i)));
        }
        if count == 0 && i != root {
            return Err(malformed(line, format!("vtree node {} is not reachable from the root", i)));
        }
    }
    let num_vars = vars.len() as u32;
    if vars.last() != Some(&num_vars) {
        return Err(malformed(line, format!("leaf variables are not 1..={}", num_vars)));
    }
    Ok(())
}

// ─── Circuit I/O ───

impl Circuit {
    /// Writes the circuit in text format.
    pub fn save<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(self.to_circuit_string().as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_circuit_string())?;
        Ok(())
    }

    /// Converts the circuit to its text format.
    pub fn to_circuit_string(&self) -> String {
        let mut output = String::new();
        self.write_circuit(&mut output).expect("writing to a String cannot fail");
        output
    }

    fn write_circuit<W: FmtWrite>(&self, output: &mut W) -> fmt::Result {
        writeln!(output, "c ids of circuit nodes start at 0")?;
        writeln!(output, "c ids of variables start at 1")?;
        writeln!(output, "c terminals appear first, then OR-gates bottom-up, children before parents")?;
        writeln!(output, "c the last OR-gate is the root")?;
        writeln!(output, "c")?;
        writeln!(output, "c file syntax:")?;
        writeln!(output, "c {}", CIRCUIT_HEADER)?;
        writeln!(output, "c T id-of-true-literal-node id-of-vtree variable parameter")?;
        writeln!(output, "c F id-of-false-literal-node id-of-vtree variable parameter")?;
        writeln!(
            output,
            "c D id-of-or-gate id-of-vtree number-of-elements (id-of-prime id-of-sub parameter)*"
        )?;
        writeln!(output, "c B bias-parameter")?;
        writeln!(output, "c V covariance-matrix-in-row-major-order")?;
        writeln!(output, "c")?;
        writeln!(output, "{}", CIRCUIT_HEADER)?;

        for terminal in self.terminals() {
            let tag = if terminal.polarity.is_positive() { 'T' } else { 'F' };
            writeln!(
                output,
                "{} {} {} {} {}",
                tag,
                terminal.index,
                self.vtree.index(terminal.vtree),
                terminal.var,
                terminal.parameter
            )?;
        }

        for &id in self.decision_nodes().iter().rev() {
            let Some(Node::Decision(gate)) = self.nodes.get(id) else {
                continue;
            };
            write!(output, "D {} {} {}", gate.index, self.vtree.index(gate.vtree), gate.elements.len())?;
            for &e in &gate.elements {
                let Some(element) = self.elements.get(e) else {
                    continue;
                };
                let prime = self.nodes.get(element.prime).map_or(0, Node::index);
                let sub = self.nodes.get(element.sub).map_or(0, Node::index);
                write!(output, " ({} {} {})", prime, sub, element.parameter)?;
            }
            writeln!(output)?;
        }

        writeln!(output, "B {}", self.bias)?;
        for covariance in &self.covariances {
            write!(output, "V")?;
            for value in covariance.iter() {
                write!(output, " {}", value)?;
            }
            writeln!(output)?;
        }
        Ok(())
    }

    /// Reads a circuit bound to `vtree` from a reader.
    pub fn load<R: Read>(vtree: Arc<Vtree>, mut reader: R) -> Result<Self> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        Self::from_circuit_string(vtree, &content)
    }

    pub fn load_file<P: AsRef<Path>>(vtree: Arc<Vtree>, path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_circuit_string(vtree, &content)
    }

    /// Parses a circuit bound to `vtree` from its text format.
    pub fn from_circuit_string(vtree: Arc<Vtree>, content: &str) -> Result<Self> {
        CircuitReader::new(vtree).read(content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Terminals,
    Decisions,
    Covariances,
}

struct CircuitReader {
    circuit: Circuit,
    section: Section,
    terminals: Vec<Option<Terminal>>,
    num_terminal_lines: usize,
    terminals_done: bool,
    /// File id to node handle, with the signed literals below each node.
    nodes: HashMap<u32, (NodeId, BTreeSet<i64>)>,
    root: Option<NodeId>,
    largest_index: u32,
    seen_record: bool,
}

impl CircuitReader {
    fn new(vtree: Arc<Vtree>) -> Self {
        let n = vtree.num_vars() as usize;
        Self {
            circuit: Circuit::empty(vtree),
            section: Section::Terminals,
            terminals: vec![None; 2 * n],
            num_terminal_lines: 0,
            terminals_done: false,
            nodes: HashMap::new(),
            root: None,
            largest_index: 0,
            seen_record: false,
        }
    }

    fn read(mut self, content: &str) -> Result<Circuit> {
        let mut bias = None;
        for (i, line) in content.lines().enumerate() {
            let number = i + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('c') {
                continue;
            }
            if line == CIRCUIT_HEADER && !self.seen_record {
                continue;
            }
            self.seen_record = true;
            match line.split_whitespace().next().unwrap_or_default() {
                "T" | "F" if self.section == Section::Terminals => self.read_terminal(line, number)?,
                "D" if self.section <= Section::Decisions => {
                    self.finish_terminals()?;
                    self.section = Section::Decisions;
                    self.read_decision(line, number)?;
                }
                "B" if bias.is_none() => {
                    self.finish_terminals()?;
                    if self.root.is_none() {
                        return Err(FormatError::MissingRoot.into());
                    }
                    let mut parts = line.split_whitespace().skip(1);
                    bias = Some(parse_token::<f64>(parts.next(), number, "bias")?);
                    if parts.next().is_some() {
                        return Err(malformed(number, "expected a single bias value").into());
                    }
                    self.section = Section::Covariances;
                }
                "V" if self.section == Section::Covariances => self.read_covariance(line, number),
                _ => return Err(FormatError::UnexpectedLine { line: number }.into()),
            }
        }

        self.finish_terminals()?;
        let root = self.root.ok_or(FormatError::MissingRoot)?;
        let bias = bias.ok_or(FormatError::MissingBias)?;

        let mut circuit = self.circuit;
        circuit.root = root;
        circuit.bias = bias;
        circuit.next_index = self.largest_index + 1;
        circuit.rebuild();
        debug!(
            "loaded circuit: {} decision nodes, {} elements",
            circuit.decision_nodes().len(),
            circuit.num_elements()
        );
        Ok(circuit)
    }

    fn read_terminal(&mut self, line: &str, number: usize) -> Result<()> {
        let mut parts = line.split_whitespace();
        let polarity = match parts.next() {
            Some("T") => Polarity::Positive,
            _ => Polarity::Negative,
        };
        let index: u32 = parse_token(parts.next(), number, "node id")?;
        let vtree_index: u32 = parse_token(parts.next(), number, "vtree id")?;
        let var: u32 = parse_token(parts.next(), number, "variable")?;
        let parameter: f64 = parse_token(parts.next(), number, "parameter")?;

        let vtree = &self.circuit.vtree;
        let n = vtree.num_vars();
        if var == 0 || var > n {
            return Err(malformed(number, format!("variable {} out of range 1..={}", var, n)).into());
        }
        let leaf = vtree
            .by_index(vtree_index)
            .ok_or(FormatError::UnknownVtree { index: vtree_index })?;
        if vtree.node(leaf).var() != Some(var) {
            return Err(malformed(number, format!("vtree node {} is not the leaf of x{}", vtree_index, var)).into());
        }

        let slot = terminal_slot(n, var, polarity);
        if self.terminals[slot].is_some() {
            return Err(malformed(number, format!("duplicate terminal for x{}", var)).into());
        }
        self.terminals[slot] = Some(Terminal {
            index,
            vtree: leaf,
            var,
            polarity,
            parameter,
            num_parents: 0,
        });
        self.num_terminal_lines += 1;
        self.largest_index = self.largest_index.max(index);
        Ok(())
    }

    /// Moves the collected terminals into their arena slots, once.
    fn finish_terminals(&mut self) -> Result<()> {
        if self.terminals_done {
            return Ok(());
        }
        self.terminals_done = true;
        let expected = self.terminals.len();
        if self.num_terminal_lines != expected {
            return Err(FormatError::MismatchedTerminalCount {
                expected,
                found: self.num_terminal_lines,
            }
            .into());
        }
        for terminal in std::mem::take(&mut self.terminals).into_iter().flatten() {
            let literal = i64::from(terminal.literal().get());
            let index = terminal.index;
            let id = self.circuit.nodes.add(Node::Terminal(terminal));
            self.nodes.insert(index, (id, BTreeSet::from([literal])));
        }
        Ok(())
    }

    fn read_decision(&mut self, line: &str, number: usize) -> Result<()> {
        let line = line.replace(['(', ')'], " ");
        let mut parts = line.split_whitespace().skip(1);
        let index: u32 = parse_token(parts.next(), number, "node id")?;
        let vtree_index: u32 = parse_token(parts.next(), number, "vtree id")?;
        let size: usize = parse_token(parts.next(), number, "element count")?;

        let vtree = self
            .circuit
            .vtree
            .by_index(vtree_index)
            .ok_or(FormatError::UnknownVtree { index: vtree_index })?;
        if self.circuit.vtree.is_leaf(vtree) {
            return Err(malformed(number, format!("OR-gate on leaf vtree node {}", vtree_index)).into());
        }
        if self.nodes.contains_key(&index) {
            return Err(malformed(number, format!("duplicate node id {}", index)).into());
        }

        let mut parts_elements = Vec::with_capacity(size);
        let mut literals: BTreeSet<i64> = BTreeSet::new();
        for _ in 0..size {
            let prime_index: u32 = parse_token(parts.next(), number, "prime id")?;
            let sub_index: u32 = parse_token(parts.next(), number, "sub id")?;
            let parameter: f64 = parse_token(parts.next(), number, "element parameter")?;
            let (prime, prime_literals) = self
                .nodes
                .get(&prime_index)
                .ok_or(FormatError::UnknownNode { index: prime_index })?;
            let (sub, sub_literals) = self
                .nodes
                .get(&sub_index)
                .ok_or(FormatError::UnknownNode { index: sub_index })?;

            let element_literals: BTreeSet<i64> = prime_literals.union(sub_literals).copied().collect();
            let splittable: BTreeSet<u32> = element_literals
                .iter()
                .filter(|&&l| l > 0 && element_literals.contains(&-l))
                .map(|&l| l as u32)
                .collect();
            literals.extend(&element_literals);
            parts_elements.push((*prime, *sub, parameter, splittable));
        }
        if parts.next().is_some() {
            return Err(malformed(number, format!("more than {} elements", size)).into());
        }

        let gate = self.circuit.add_decision(index, vtree);
        for (prime, sub, parameter, splittable) in parts_elements {
            let mut element = Element::new(prime, sub, parameter, gate);
            element.splittable_variables = splittable;
            self.circuit.push_element(gate, element);
        }
        self.nodes.insert(index, (gate, literals));
        self.root = Some(gate);
        self.largest_index = self.largest_index.max(index);
        Ok(())
    }

    fn read_covariance(&mut self, line: &str, number: usize) {
        let values: std::result::Result<Vec<f64>, _> = line.split_whitespace().skip(1).map(str::parse::<f64>).collect();
        let values = match values {
            Ok(values) => values,
            Err(e) => {
                warn!("line {}: skipping unreadable covariance: {}", number, e);
                return;
            }
        };
        let size = (values.len() as f64).sqrt().round() as usize;
        if size * size != values.len() {
            warn!(
                "line {}: skipping covariance with {} entries, not a square matrix",
                number,
                values.len()
            );
            return;
        }
        match Array2::from_shape_vec((size, size), values) {
            Ok(matrix) => self.circuit.covariances.push(matrix),
            Err(e) => warn!("line {}: skipping covariance: {}", number, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CircuitError;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use test_log::test;

    const VTREE: &str = "vtree 3\nL 0 1\nL 1 2\nI 2 0 1\n";

    fn vtree() -> Arc<Vtree> {
        Arc::new(Vtree::from_vtree_string(VTREE).unwrap())
    }

    #[test]
    fn test_vtree_roundtrip() {
        let vtree = Vtree::balanced(5);
        let s = vtree.to_vtree_string();
        let vtree2 = Vtree::from_vtree_string(&s).unwrap();

        assert_eq!(vtree.num_vars(), vtree2.num_vars());
        assert_eq!(vtree.num_nodes(), vtree2.num_nodes());
        assert_eq!(vtree.index(vtree.root()), vtree2.index(vtree2.root()));
        for var in 1..=5 {
            assert_eq!(vtree.index(vtree.var_vtree(var)), vtree2.index(vtree2.var_vtree(var)));
        }
    }

    #[test]
    fn test_vtree_keeps_file_ids() {
        let vtree = Vtree::from_vtree_string("c comment\nvtree 5\nL 10 1\nL 11 2\nI 7 10 11\nL 3 3\nI 4 7 3\n").unwrap();
        assert_eq!(vtree.num_vars(), 3);
        assert_eq!(vtree.index(vtree.root()), 4);
        assert_eq!(vtree.index(vtree.var_vtree(2)), 11);
        assert_eq!(vtree.variables(vtree.by_index(7).unwrap()), &BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_vtree_errors() {
        assert!(matches!(
            Vtree::from_vtree_string("sdd 3\n"),
            Err(CircuitError::Format(FormatError::Malformed { .. }))
        ));
        assert!(matches!(
            Vtree::from_vtree_string("vtree 2\nL 0 1\nI 1 0 5\n"),
            Err(CircuitError::Format(FormatError::UnknownVtree { index: 5 }))
        ));
    }

    #[test]
    fn test_vtree_leaf_variables_are_checked() {
        let malformed_with = |content: &str, needle: &str| match Vtree::from_vtree_string(content) {
            Err(CircuitError::Format(FormatError::Malformed { message, .. })) => {
                assert!(message.contains(needle), "{:?} does not mention {:?}", message, needle)
            }
            other => panic!("expected a malformed vtree, got {:?}", other.map(|v| v.num_vars())),
        };
        malformed_with("vtree 3\nL 0 0\nL 1 2\nI 2 0 1\n", "variable 0");
        malformed_with("vtree 3\nL 0 2\nL 1 2\nI 2 0 1\n", "more than one leaf");
        malformed_with("vtree 3\nL 0 1\nL 1 3\nI 2 0 1\n", "not 1..=2");
        malformed_with("vtree 4\nL 0 1\nL 1 2\nL 5 3\nI 2 0 1\n", "not reachable");
        malformed_with("vtree 4\nL 0 1\nL 1 2\nI 2 0 1\nI 3 2 2\n", "more than one parent");
    }

    #[test]
    fn test_load_hand_written_circuit() {
        let content = "\
Regression Circuit
T 0 0 1 0.5
T 3 1 2 0.25
F 1 0 1 -0.5
F 4 1 2 -0.25
D 2 2 1 (0 1 0.3)
B 0.1
";
        let circuit = Circuit::from_circuit_string(vtree(), content).unwrap();
        assert_eq!(circuit.bias(), 0.1);
        let root = circuit.node(circuit.root()).unwrap().as_decision().unwrap();
        assert_eq!(root.elements.len(), 1);
        let element = circuit.element(root.elements[0]).unwrap();
        assert_eq!(circuit.node(element.prime).unwrap().index(), 0);
        assert_eq!(circuit.node(element.sub).unwrap().index(), 1);
        assert_eq!(element.parameter, 0.3);
        assert_eq!(element.splittable_variables, BTreeSet::from([1]));
        assert_eq!(circuit.parameters().to_vec(), vec![0.1, 0.5, 0.25, -0.5, -0.25, 0.3]);
        assert_eq!(circuit.largest_index(), 4);
    }

    #[test]
    fn test_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut circuit = Circuit::new(Arc::new(Vtree::balanced(4)), &mut rng).unwrap();
        let root_element = circuit.elements()[0];
        circuit.split(root_element, 2, 20).unwrap();
        circuit.covariances = vec![array![[1.0, 0.25], [0.25, 2.0]]];

        let text = circuit.to_circuit_string();
        let loaded = Circuit::from_circuit_string(Arc::clone(circuit.vtree()), &text).unwrap();

        assert_eq!(loaded.bias(), circuit.bias());
        assert_eq!(loaded.num_elements(), circuit.num_elements());
        assert_eq!(loaded.parameters(), circuit.parameters());
        assert_eq!(loaded.covariances(), circuit.covariances());
        assert_eq!(loaded.to_circuit_string(), text);
    }

    #[test]
    fn test_mismatched_terminal_count() {
        let content = "T 0 0 1 0.5\nF 1 0 1 -0.5\nT 3 1 2 0.25\nD 2 2 1 (0 1 0.3)\nB 0.1\n";
        assert!(matches!(
            Circuit::from_circuit_string(vtree(), content),
            Err(CircuitError::Format(FormatError::MismatchedTerminalCount { expected: 4, found: 3 }))
        ));
    }

    #[test]
    fn test_missing_root() {
        let content = "T 0 0 1 0.5\nT 3 1 2 0.25\nF 1 0 1 -0.5\nF 4 1 2 -0.25\nB 0.1\n";
        assert!(matches!(
            Circuit::from_circuit_string(vtree(), content),
            Err(CircuitError::Format(FormatError::MissingRoot))
        ));
    }

    #[test]
    fn test_missing_bias() {
        let content = "T 0 0 1 0.5\nT 3 1 2 0.25\nF 1 0 1 -0.5\nF 4 1 2 -0.25\nD 2 2 1 (0 1 0.3)\n";
        assert!(matches!(
            Circuit::from_circuit_string(vtree(), content),
            Err(CircuitError::Format(FormatError::MissingBias))
        ));
    }

    #[test]
    fn test_unknown_node() {
        let content = "T 0 0 1 0.5\nT 3 1 2 0.25\nF 1 0 1 -0.5\nF 4 1 2 -0.25\nD 2 2 1 (0 9 0.3)\nB 0.1\n";
        assert!(matches!(
            Circuit::from_circuit_string(vtree(), content),
            Err(CircuitError::Format(FormatError::UnknownNode { index: 9 }))
        ));
    }

    #[test]
    fn test_malformed_covariance_is_skipped() {
        let content = "\
T 0 0 1 0.5
T 3 1 2 0.25
F 1 0 1 -0.5
F 4 1 2 -0.25
D 2 2 1 (0 1 0.3)
B 0.1
V 1 2 3
V 1 0 0 1
";
        let circuit = Circuit::from_circuit_string(vtree(), content).unwrap();
        assert_eq!(circuit.covariances().len(), 1);
        assert_eq!(circuit.covariances()[0], array![[1.0, 0.0], [0.0, 1.0]]);
    }
}
