//! Circuit node representation.
//!
//! # Node Types
//!
//! A circuit node is one of:
//! - **Terminal**: a positive or negative literal of one variable. Exactly two
//!   terminals exist per variable and they are never destroyed.
//! - **Decision**: an OR-gate over an internal vtree node, holding a list of
//!   AND-elements whose primes partition the gate's domain.
//!
//! Elements live in their own arena and are addressed by [`ElementId`].

use std::collections::BTreeSet;

use crate::reference::{ElementId, NodeId};
use crate::types::{Literal, Polarity};
use crate::vtree::VtreeId;

#[derive(Debug, Clone)]
pub struct Terminal {
    /// Circuit-wide index, as written in circuit files.
    pub index: u32,
    /// The leaf vtree node of `var`.
    pub vtree: VtreeId,
    pub var: u32,
    pub polarity: Polarity,
    pub parameter: f64,
    pub num_parents: usize,
}

impl Terminal {
    pub fn literal(&self) -> Literal {
        Literal::new(self.var, self.polarity)
    }
}

/// An OR-gate.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Circuit-wide index, as written in circuit files.
    pub index: u32,
    /// The internal vtree node this gate implements.
    pub vtree: VtreeId,
    /// Elements in serialization order.
    pub elements: Vec<ElementId>,
    pub num_parents: usize,
}

/// An AND-element: `prime ∧ sub` with a learned weight.
#[derive(Debug, Clone)]
pub struct Element {
    pub prime: NodeId,
    pub sub: NodeId,
    pub parameter: f64,
    /// Variables `v` such that both `+v` and `-v` occur below this element.
    pub splittable_variables: BTreeSet<u32>,
    /// Set once the element took part in a split during the current round.
    pub flag: bool,
    /// The decision node owning this element.
    pub parent: NodeId,
}

impl Element {
    pub fn new(prime: NodeId, sub: NodeId, parameter: f64, parent: NodeId) -> Self {
        Self {
            prime,
            sub,
            parameter,
            splittable_variables: BTreeSet::new(),
            flag: false,
            parent,
        }
    }

    pub fn children(&self) -> [NodeId; 2] {
        [self.prime, self.sub]
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Terminal(Terminal),
    Decision(Decision),
}

impl Node {
    pub fn index(&self) -> u32 {
        match self {
            Node::Terminal(t) => t.index,
            Node::Decision(d) => d.index,
        }
    }

    pub fn vtree(&self) -> VtreeId {
        match self {
            Node::Terminal(t) => t.vtree,
            Node::Decision(d) => d.vtree,
        }
    }

    pub fn num_parents(&self) -> usize {
        match self {
            Node::Terminal(t) => t.num_parents,
            Node::Decision(d) => d.num_parents,
        }
    }

    pub fn num_parents_mut(&mut self) -> &mut usize {
        match self {
            Node::Terminal(t) => &mut t.num_parents,
            Node::Decision(d) => &mut d.num_parents,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::Terminal(_))
    }

    pub fn as_terminal(&self) -> Option<&Terminal> {
        match self {
            Node::Terminal(t) => Some(t),
            Node::Decision(_) => None,
        }
    }

    pub fn as_decision(&self) -> Option<&Decision> {
        match self {
            Node::Decision(d) => Some(d),
            Node::Terminal(_) => None,
        }
    }

    pub fn as_decision_mut(&mut self) -> Option<&mut Decision> {
        match self {
            Node::Decision(d) => Some(d),
            Node::Terminal(_) => None,
        }
    }
}
