//! Types module: value-level helpers the optimizer folds with.
//!
//! This module provides the Vertex vector type, comparison operators and rounding modes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A constant 3-component vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vertex {
    pub const ZERO: Vertex = Vertex::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn dot(&self, other: &Vertex) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vertex) -> Vertex {
        Vertex::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn distance(&self, other: &Vertex) -> f64 {
        self.vector_towards(other).length()
    }

    pub fn normalize(&self) -> Vertex {
        let length = self.length();
        self.map(|c| c / length)
    }

    pub fn vector_towards(&self, other: &Vertex) -> Vertex {
        self.zip(other, |a, b| b - a)
    }

    pub fn direction_towards(&self, other: &Vertex) -> Vertex {
        self.vector_towards(other).normalize()
    }

    /// Angle between two vectors, in degrees.
    pub fn angle_between(&self, other: &Vertex) -> f64 {
        (self.dot(other) / (self.length() * other.length())).acos().to_degrees()
    }

    /// Replaces NaN components with 0.
    pub fn remove_nans(&self) -> Vertex {
        self.map(|c| if c.is_nan() { 0.0 } else { c })
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Vertex {
        Vertex::new(f(self.x), f(self.y), f(self.z))
    }

    pub fn zip(&self, other: &Vertex, f: impl Fn(f64, f64) -> f64) -> Vertex {
        Vertex::new(f(self.x, other.x), f(self.y, other.y), f(self.z, other.z))
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Comparison operators, named by the members of the target's operator family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ComparisonOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl ComparisonOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(ComparisonOp::Eq),
            "!=" => Some(ComparisonOp::Neq),
            "<" => Some(ComparisonOp::Lt),
            "<=" => Some(ComparisonOp::Lte),
            ">" => Some(ComparisonOp::Gt),
            ">=" => Some(ComparisonOp::Gte),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Neq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
        }
    }

    /// The operator that holds exactly when this one does not.
    pub fn inverse(self) -> Self {
        match self {
            ComparisonOp::Eq => ComparisonOp::Neq,
            ComparisonOp::Neq => ComparisonOp::Eq,
            ComparisonOp::Lt => ComparisonOp::Gte,
            ComparisonOp::Lte => ComparisonOp::Gt,
            ComparisonOp::Gt => ComparisonOp::Lte,
            ComparisonOp::Gte => ComparisonOp::Lt,
        }
    }

    /// Result of comparing a value with itself.
    pub fn reflexive(self) -> bool {
        matches!(self, ComparisonOp::Eq | ComparisonOp::Lte | ComparisonOp::Gte)
    }

    pub fn evaluate(self, a: f64, b: f64) -> bool {
        match self {
            ComparisonOp::Eq => a == b,
            ComparisonOp::Neq => a != b,
            ComparisonOp::Lt => a < b,
            ComparisonOp::Lte => a <= b,
            ComparisonOp::Gt => a > b,
            ComparisonOp::Gte => a >= b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundingMode {
    Up,
    Down,
    Nearest,
}

impl RoundingMode {
    /// Maps the target's rounding member names.
    pub fn from_member(name: &str) -> Option<Self> {
        match name {
            "Up" => Some(RoundingMode::Up),
            "Down" => Some(RoundingMode::Down),
            "To Nearest" => Some(RoundingMode::Nearest),
            _ => None,
        }
    }

    pub fn apply(self, value: f64) -> f64 {
        match self {
            RoundingMode::Up => value.ceil(),
            RoundingMode::Down => value.floor(),
            // Midpoints go to the even neighbour, as the target does.
            RoundingMode::Nearest => value.round_ties_even(),
        }
    }
}

/// Formats a number the way the script text expects: no trailing `.0`, never `-0`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{value}")
}
