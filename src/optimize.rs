//! Optimize module: the rewrite engine that makes emitted scripts small enough for the target.
//!
//! Rewriting is bottom-up. Children are optimized first, then the rule registered for the
//! node's operation name (if any) may replace the node with a cheaper equivalent. Rules
//! never fail: a rule that cannot simplify returns `None` and the node is kept.

use crate::ir::{Node, OperationNode};
use crate::registry::Registry;
use crate::types::{ComparisonOp, RoundingMode, Vertex};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::trace;

pub trait RewriteRule: Send + Sync {
    /// `node`'s arguments are already optimized. Returns the replacement, if cheaper.
    fn rewrite(&self, rw: &Optimizer<'_>, node: &OperationNode) -> Option<Node>;
}

#[derive(Clone, Default)]
pub struct RewriteTable {
    rules: HashMap<String, Arc<dyn RewriteRule>>,
}

impl RewriteTable {
    pub fn new() -> Self {
        Self { rules: HashMap::new() }
    }

    /// The built-in rule set, created on first use.
    pub fn standard() -> &'static RewriteTable {
        static STANDARD: OnceLock<RewriteTable> = OnceLock::new();
        STANDARD.get_or_init(|| {
            let mut table = RewriteTable::new();
            register_standard_rules(&mut table);
            table
        })
    }

    pub fn register<R>(&mut self, operation: impl Into<String>, rule: R)
    where
        R: RewriteRule + 'static,
    {
        self.rules.insert(operation.into(), Arc::new(rule));
    }

    pub fn get(&self, operation: &str) -> Option<&Arc<dyn RewriteRule>> {
        self.rules.get(operation)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

pub struct Optimizer<'r> {
    registry: &'r Registry,
    rules: &'r RewriteTable,
}

impl<'r> Optimizer<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self::with_rules(registry, RewriteTable::standard())
    }

    pub fn with_rules(registry: &'r Registry, rules: &'r RewriteTable) -> Self {
        Self { registry, rules }
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn optimize(&self, node: Node) -> Node {
        match node {
            Node::Operation(op) => self.optimize_operation(op),
            leaf => leaf,
        }
    }

    pub fn optimize_operation(&self, op: OperationNode) -> Node {
        if !op.is_optimizable() {
            return Node::Operation(op);
        }
        let op = op.map_params(|param| self.optimize(param));
        match self.rules.get(op.name()).and_then(|rule| rule.rewrite(self, &op)) {
            Some(rewritten) => {
                trace!(operation = op.name(), "rewrote");
                rewritten
            }
            None => Node::Operation(op),
        }
    }

    /// A number leaf; non-finite results are not folded.
    pub fn number(&self, value: f64) -> Option<Node> {
        value.is_finite().then_some(Node::Number(value))
    }

    pub fn boolean(&self, value: bool) -> Option<Node> {
        self.registry.boolean(value).ok()
    }

    /// The cheapest node for a constant vector, NaN components zeroed.
    pub fn vector(&self, vertex: Vertex) -> Option<Node> {
        let v = vertex.remove_nans();
        self.build("Vector", [Node::Number(v.x), Node::Number(v.y), Node::Number(v.z)])
            .map(|node| self.optimize(node))
    }

    pub fn build<const N: usize>(&self, name: &str, args: [Node; N]) -> Option<Node> {
        self.registry.build(name, args).ok().map(Node::from)
    }

    fn is_vector_valued(&self, node: &Node) -> bool {
        node.as_operation()
            .is_some_and(|op| op.definition().return_type.as_deref() == Some("vector"))
    }
}

impl Node {
    /// Optimizes with the standard rule set.
    pub fn optimize(self, registry: &Registry) -> Node {
        Optimizer::new(registry).optimize(self)
    }
}

impl OperationNode {
    /// A folded operation may come back as a literal, hence `Node`.
    pub fn optimize(self, registry: &Registry) -> Node {
        Optimizer::new(registry).optimize_operation(self)
    }
}

fn operands(node: &OperationNode) -> Option<(&Node, &Node)> {
    Some((node.param(0)?, node.param(1)?))
}

fn safe_div(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        0.0
    } else {
        a / b
    }
}

fn safe_mod(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        0.0
    } else {
        a % b
    }
}

fn fold_unary(rw: &Optimizer<'_>, node: &OperationNode, f: impl Fn(f64) -> f64) -> Option<Node> {
    rw.number(f(node.param(0)?.as_number()?))
}

fn fold_binary(rw: &Optimizer<'_>, node: &OperationNode, f: impl Fn(f64, f64) -> f64) -> Option<Node> {
    let (a, b) = operands(node)?;
    rw.number(f(a.as_number()?, b.as_number()?))
}

fn vertices(node: &OperationNode) -> Option<(Vertex, Vertex)> {
    let (a, b) = operands(node)?;
    Some((a.as_vertex()?, b.as_vertex()?))
}

// Component-wise folding of vector/vector, vector/scalar and scalar/vector pairs.
fn fold_vector_arithmetic(rw: &Optimizer<'_>, a: &Node, b: &Node, op: fn(f64, f64) -> f64) -> Option<Node> {
    match (a.as_vertex(), b.as_vertex(), a.as_number(), b.as_number()) {
        (Some(u), Some(v), _, _) => rw.vector(u.zip(&v, op)),
        (Some(u), None, _, Some(y)) => rw.vector(u.map(|c| op(c, y))),
        (None, Some(v), Some(x), _) => rw.vector(v.map(|c| op(x, c))),
        _ => None,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Additive {
    Add,
    Subtract,
}

fn fold_additive(rw: &Optimizer<'_>, node: &OperationNode, kind: Additive) -> Option<Node> {
    let op: fn(f64, f64) -> f64 = match kind {
        Additive::Add => |a, b| a + b,
        Additive::Subtract => |a, b| a - b,
    };
    let (a, b) = operands(node)?;
    let (an, bn) = (a.as_number(), b.as_number());

    if let (Some(x), Some(y)) = (an, bn) {
        return rw.number(op(x, y));
    }
    // Only addition returns the right operand for a zero left operand.
    if kind == Additive::Add && an == Some(0.0) {
        return Some(b.clone());
    }
    if bn == Some(0.0) {
        return Some(a.clone());
    }
    // `Left - Left` is the canonical zero vector; keep it as is.
    if kind == Additive::Subtract && a.is_operation("Left") && b.is_operation("Left") {
        return None;
    }
    if let Some(folded) = fold_vector_arithmetic(rw, a, b, op) {
        return Some(folded);
    }
    if a.structurally_equals(b) {
        // Constant operands were folded above, so `Multiply(a, 2)` has nothing left to fold.
        return match kind {
            Additive::Add => rw.build("Multiply", [a.clone(), Node::Number(2.0)]),
            Additive::Subtract if rw.is_vector_valued(a) => rw.vector(Vertex::ZERO),
            Additive::Subtract => rw.number(0.0),
        };
    }
    None
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Multiplicative {
    Multiply,
    Divide,
}

fn fold_multiplicative(rw: &Optimizer<'_>, node: &OperationNode, kind: Multiplicative) -> Option<Node> {
    let op: fn(f64, f64) -> f64 = match kind {
        Multiplicative::Multiply => |a, b| a * b,
        Multiplicative::Divide => safe_div,
    };
    let (a, b) = operands(node)?;
    let (an, bn) = (a.as_number(), b.as_number());

    if let (Some(x), Some(y)) = (an, bn) {
        return rw.number(op(x, y));
    }
    if let Some(folded) = fold_vector_arithmetic(rw, a, b, op) {
        return Some(folded);
    }
    if let Some(x) = an {
        if x == 1.0 && kind == Multiplicative::Multiply {
            return Some(b.clone());
        }
        if x == 0.0 {
            return rw.number(0.0);
        }
    }
    if let Some(y) = bn {
        if y == 1.0 {
            return Some(a.clone());
        }
        // Division by zero evaluates to 0 on the target.
        if y == 0.0 {
            return rw.number(0.0);
        }
    }
    if a.structurally_equals(b) {
        // Non-constant `a`: `Raise To Power(a, 2)` has nothing left to fold.
        return match kind {
            Multiplicative::Multiply => rw.build("Raise To Power", [a.clone(), Node::Number(2.0)]),
            Multiplicative::Divide => rw.number(1.0),
        };
    }
    None
}

fn fold_logical(rw: &Optimizer<'_>, node: &OperationNode, absorbing: bool) -> Option<Node> {
    let (a, b) = operands(node)?;
    let (ab, bb) = (a.as_bool(), b.as_bool());

    if let (Some(x), Some(y)) = (ab, bb) {
        return rw.boolean(if absorbing { x || y } else { x && y });
    }
    // `absorbing` is the value that decides the result alone: false for And, true for Or.
    if ab == Some(absorbing) || bb == Some(absorbing) {
        return rw.boolean(absorbing);
    }
    if ab == Some(!absorbing) {
        return Some(b.clone());
    }
    if bb == Some(!absorbing) {
        return Some(a.clone());
    }
    if a.structurally_equals(b) {
        return Some(a.clone());
    }
    let negates = |x: &Node, y: &Node| {
        x.as_operation()
            .filter(|op| op.name() == "Not")
            .and_then(|op| op.param(0))
            .is_some_and(|inner| inner.structurally_equals(y))
    };
    if negates(a, b) || negates(b, a) {
        return rw.boolean(absorbing);
    }
    None
}

fn comparison_op(node: &Node) -> Option<ComparisonOp> {
    ComparisonOp::from_symbol(node.as_member()?.name())
}

fn vector_component(rw: &Optimizer<'_>, node: &OperationNode, index: usize) -> Option<Node> {
    let vector = node.param(0)?;
    if let Some(v) = vector.as_vertex() {
        return rw.number([v.x, v.y, v.z][index]);
    }
    let component = vector
        .as_operation()
        .filter(|op| op.name() == "Vector")
        .and_then(|op| op.param(index))?;
    match component.as_component() {
        Some(value) => rw.number(value),
        None => Some(component.clone()),
    }
}

macro_rules! rewrite_rules {
    ($( $rule:ident: $op_name:expr, ($rw:ident, $node:ident) => $body:block ),* $(,)?) => {
        $(
            pub struct $rule;
            impl RewriteRule for $rule {
                fn rewrite(&self, $rw: &Optimizer<'_>, $node: &OperationNode) -> Option<Node> $body
            }
        )*
        pub fn register_standard_rules(table: &mut RewriteTable) {
            $(table.register($op_name, $rule);)*
        }
    };
}

rewrite_rules! {
    AddRule: "Add", (rw, node) => { fold_additive(rw, node, Additive::Add) },
    SubtractRule: "Subtract", (rw, node) => { fold_additive(rw, node, Additive::Subtract) },
    MultiplyRule: "Multiply", (rw, node) => { fold_multiplicative(rw, node, Multiplicative::Multiply) },
    DivideRule: "Divide", (rw, node) => { fold_multiplicative(rw, node, Multiplicative::Divide) },
    ModuloRule: "Modulo", (rw, node) => {
        let (a, b) = operands(node)?;
        let (an, bn) = (a.as_number(), b.as_number());
        if let (Some(x), Some(y)) = (an, bn) {
            return rw.number(safe_mod(x, y));
        }
        if an == Some(0.0) || bn == Some(0.0) || bn == Some(1.0) || a.structurally_equals(b) {
            return rw.number(0.0);
        }
        None
    },
    RaiseToPowerRule: "Raise To Power", (rw, node) => {
        let (a, b) = operands(node)?;
        // The target evaluates any power of a negative base to 0.
        if a.as_number().is_some_and(|x| x < 0.0) {
            return rw.number(0.0);
        }
        // Two literals fold first, so `0 ^ 0` is 1.
        if let Some(folded) = fold_binary(rw, node, f64::powf) {
            return Some(folded);
        }
        match a.as_number() {
            Some(x) if x == 0.0 => return rw.number(0.0),
            Some(x) if x == 1.0 => return rw.number(1.0),
            _ => {}
        }
        match b.as_number() {
            Some(y) if y == 0.0 => rw.number(1.0),
            Some(y) if y == 1.0 => Some(a.clone()),
            _ => None,
        }
    },
    AndRule: "And", (rw, node) => { fold_logical(rw, node, false) },
    OrRule: "Or", (rw, node) => { fold_logical(rw, node, true) },
    NotRule: "Not", (rw, node) => {
        let a = node.param(0)?;
        if let Some(x) = a.as_bool() {
            return rw.boolean(!x);
        }
        let inner = a.as_operation()?;
        match inner.name() {
            "Not" => inner.param(0).cloned(),
            "Compare" => {
                let member = inner.param(1)?.as_member()?;
                let inverted = member.sibling(comparison_op(inner.param(1)?)?.inverse().symbol())?;
                rw.build("Compare", [inner.param(0)?.clone(), Node::Member(inverted), inner.param(2)?.clone()])
            }
            _ => None,
        }
    },
    CompareRule: "Compare", (rw, node) => {
        let (left, right) = (node.param(0)?, node.param(2)?);
        let op = comparison_op(node.param(1)?)?;
        if let (Some(x), Some(y)) = (left.as_number(), right.as_number()) {
            return rw.boolean(op.evaluate(x, y));
        }
        if left.structurally_equals(right) {
            return rw.boolean(op.reflexive());
        }
        None
    },
    AbsoluteValueRule: "Absolute Value", (rw, node) => { fold_unary(rw, node, f64::abs) },
    SquareRootRule: "Square Root", (rw, node) => { fold_unary(rw, node, f64::sqrt) },
    MinRule: "Min", (rw, node) => { fold_binary(rw, node, f64::min) },
    MaxRule: "Max", (rw, node) => { fold_binary(rw, node, f64::max) },
    SineFromDegreesRule: "Sine From Degrees", (rw, node) => { fold_unary(rw, node, |x| x.to_radians().sin()) },
    SineFromRadiansRule: "Sine From Radians", (rw, node) => { fold_unary(rw, node, f64::sin) },
    CosineFromDegreesRule: "Cosine From Degrees", (rw, node) => { fold_unary(rw, node, |x| x.to_radians().cos()) },
    CosineFromRadiansRule: "Cosine From Radians", (rw, node) => { fold_unary(rw, node, f64::cos) },
    TangentFromDegreesRule: "Tangent From Degrees", (rw, node) => { fold_unary(rw, node, |x| x.to_radians().tan()) },
    TangentFromRadiansRule: "Tangent From Radians", (rw, node) => { fold_unary(rw, node, f64::tan) },
    ArcsineInDegreesRule: "Arcsine In Degrees", (rw, node) => { fold_unary(rw, node, |x| x.asin().to_degrees()) },
    ArcsineInRadiansRule: "Arcsine In Radians", (rw, node) => { fold_unary(rw, node, f64::asin) },
    ArccosineInDegreesRule: "Arccosine In Degrees", (rw, node) => { fold_unary(rw, node, |x| x.acos().to_degrees()) },
    ArccosineInRadiansRule: "Arccosine In Radians", (rw, node) => { fold_unary(rw, node, f64::acos) },
    ArctangentInDegreesRule: "Arctangent In Degrees", (rw, node) => { fold_binary(rw, node, |a, b| a.atan2(b).to_degrees()) },
    ArctangentInRadiansRule: "Arctangent In Radians", (rw, node) => { fold_binary(rw, node, f64::atan2) },
    AngleDifferenceRule: "Angle Difference", (rw, node) => {
        fold_binary(rw, node, |a, b| {
            let diff = (a - b).abs() % 360.0;
            if diff > 180.0 { 360.0 - diff } else { diff }
        })
    },
    AngleBetweenVectorsRule: "Angle Between Vectors", (rw, node) => {
        let (a, b) = vertices(node)?;
        rw.number(a.angle_between(&b))
    },
    CrossProductRule: "Cross Product", (rw, node) => {
        let (a, b) = vertices(node)?;
        rw.vector(a.cross(&b))
    },
    DotProductRule: "Dot Product", (rw, node) => {
        let (a, b) = vertices(node)?;
        rw.number(a.dot(&b))
    },
    DistanceBetweenRule: "Distance Between", (rw, node) => {
        let (a, b) = vertices(node)?;
        rw.number(a.distance(&b))
    },
    NormalizeRule: "Normalize", (rw, node) => { rw.vector(node.param(0)?.as_vertex()?.normalize()) },
    DirectionTowardsRule: "Direction Towards", (rw, node) => {
        let (a, b) = vertices(node)?;
        rw.vector(a.direction_towards(&b))
    },
    VectorTowardsRule: "Vector Towards", (rw, node) => {
        let (a, b) = vertices(node)?;
        rw.vector(a.vector_towards(&b))
    },
    DirectionFromAnglesRule: "Direction From Angles", (rw, node) => {
        let (h, v) = operands(node)?;
        let (h, v) = (h.as_number()?.to_radians(), v.as_number()?.to_radians());
        // `+ 0.0` folds negative zeros.
        rw.vector(Vertex::new(h.sin() * v.cos(), -v.sin(), h.cos() * v.cos()).map(|c| c + 0.0))
    },
    XComponentOfRule: "X Component Of", (rw, node) => { vector_component(rw, node, 0) },
    YComponentOfRule: "Y Component Of", (rw, node) => { vector_component(rw, node, 1) },
    ZComponentOfRule: "Z Component Of", (rw, node) => { vector_component(rw, node, 2) },
    ValueInArrayRule: "Value In Array", (rw, node) => {
        let (array, index) = operands(node)?;
        if index.as_number() == Some(0.0) {
            return rw.build("First Of", [array.clone()]);
        }
        None
    },
    IfThenElseRule: "If-Then-Else", (_rw, node) => {
        let condition = node.param(0)?.as_bool()?;
        node.param(if condition { 1 } else { 2 }).cloned()
    },
    RoundToIntegerRule: "Round To Integer", (rw, node) => {
        let value = node.param(0)?.as_number()?;
        let mode = RoundingMode::from_member(node.param(1)?.as_member()?.name())?;
        rw.number(mode.apply(value))
    },
    HorizontalAngleFromDirectionRule: "Horizontal Angle From Direction", (rw, node) => {
        let v = node.param(0)?.as_vertex()?;
        let gradient = v.x / v.z;
        let angle = if gradient.is_nan() { 0.0 } else { gradient.atan().to_degrees() };
        // Straight backward gives `atan(-0)`.
        if angle == 0.0 && angle.is_sign_negative() {
            return rw.number(180.0);
        }
        rw.number(angle)
    },
    VerticalAngleFromDirectionRule: "Vertical Angle From Direction", (rw, node) => {
        let v = node.param(0)?.as_vertex()?;
        rw.number(-v.y.asin().to_degrees() + 0.0)
    },
    VectorRule: "Vector", (rw, node) => {
        let components = [node.param(0)?, node.param(1)?, node.param(2)?];
        if let [Some(x), Some(y), Some(z)] = components.map(Node::as_component) {
            let v = Vertex::new(x, y, z);
            if v == Vertex::ZERO {
                let left = || rw.build("Left", []);
                return rw.build("Subtract", [left()?, left()?]);
            }
            if let Some((axis, _)) = crate::ir::AXIS_OPERATIONS.iter().find(|(_, axis)| *axis == v) {
                return rw.build(axis, []);
            }
        }
        // A literal 0 component is written as `Empty Array`, which the target reads as 0.
        if !components.iter().any(|c| c.as_number() == Some(0.0)) {
            return None;
        }
        let [x, y, z] = components.map(|c| match c.as_number() {
            Some(n) if n == 0.0 => rw.build("Empty Array", []),
            _ => Some(c.clone()),
        });
        rw.build("Vector", [x?, y?, z?])
    },
}
