//! Literal polarity and signed literals.
//!
//! Variables are 1-indexed, as in the vtree. A [`Literal`] packs a variable
//! and its polarity into a signed integer: `+v` for the positive literal and
//! `-v` for the negative one.

use std::fmt;
use std::ops::Neg;

/// Polarity of a terminal literal.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    /// Returns `true` for [`Polarity::Positive`].
    pub fn is_positive(self) -> bool {
        self == Polarity::Positive
    }

    /// Evaluates the literal indicator for an observed variable value in `[0, 1]`.
    pub fn indicator(self, value: f64) -> f64 {
        match self {
            Polarity::Positive => value,
            Polarity::Negative => 1.0 - value,
        }
    }
}

impl Neg for Polarity {
    type Output = Self;

    fn neg(self) -> Self::Output {
        match self {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
        }
    }
}

/// A signed literal: `+v` or `-v` for variable `v >= 1`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Literal(i32);

impl Literal {
    /// Creates a literal for `var` with the given polarity.
    ///
    /// # Panics
    ///
    /// Panics if `var == 0`. Variables must be 1-indexed.
    pub fn new(var: u32, polarity: Polarity) -> Self {
        assert_ne!(var, 0, "Variable IDs must be >= 1");
        let v = var as i32;
        match polarity {
            Polarity::Positive => Literal(v),
            Polarity::Negative => Literal(-v),
        }
    }

    pub fn positive(var: u32) -> Self {
        Self::new(var, Polarity::Positive)
    }

    pub fn negative(var: u32) -> Self {
        Self::new(var, Polarity::Negative)
    }

    pub fn var(self) -> u32 {
        self.0.unsigned_abs()
    }

    pub fn polarity(self) -> Polarity {
        if self.0 > 0 {
            Polarity::Positive
        } else {
            Polarity::Negative
        }
    }

    /// Returns the raw signed representation.
    pub fn get(self) -> i32 {
        self.0
    }
}

impl Neg for Literal {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Literal(-self.0)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.polarity() {
            Polarity::Positive => write!(f, "x{}", self.var()),
            Polarity::Negative => write!(f, "¬x{}", self.var()),
        }
    }
}
