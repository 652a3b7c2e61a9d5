//! Intermediate Representation (IR): the operation tree every language feature lowers into.
//!
//! A [`Node`] is either an [`OperationNode`] (a schema operation plus its arguments) or one of
//! the literal leaves. Construction goes through the [`Registry`] so that every node's
//! argument list is complete: missing slots are filled with the parameter defaults.

use crate::registry::{Registry, NULL_OPERATION};
use crate::schema::{EnumMemberRef, OperationDefinition};
use crate::types::Vertex;
use crate::Result;
use std::sync::Arc;

/// Operations whose every evaluation yields a fresh value. Two instances are never equal.
pub const NON_DETERMINISTIC_OPERATIONS: &[&str] = &[
    "Random Integer",
    "Random Real",
    "Randomized Array",
    "Random Value In Array",
];

/// Direction primitives and the constant vector each one stands for.
pub const AXIS_OPERATIONS: &[(&str, Vertex)] = &[
    ("Up", Vertex::new(0.0, 1.0, 0.0)),
    ("Down", Vertex::new(0.0, -1.0, 0.0)),
    ("Left", Vertex::new(1.0, 0.0, 0.0)),
    ("Right", Vertex::new(-1.0, 0.0, 0.0)),
    ("Forward", Vertex::new(0.0, 0.0, 1.0)),
    ("Backward", Vertex::new(0.0, 0.0, -1.0)),
];

#[derive(Debug, Clone)]
pub enum Node {
    Operation(OperationNode),
    Number(f64),
    /// The text of a string template.
    Text(String),
    Member(EnumMemberRef),
}

impl Node {
    pub fn number(value: f64) -> Self {
        Node::Number(value)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(value.into())
    }

    pub fn as_operation(&self) -> Option<&OperationNode> {
        match self {
            Node::Operation(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_member(&self) -> Option<&EnumMemberRef> {
        match self {
            Node::Member(member) => Some(member),
            _ => None,
        }
    }

    /// True if this node invokes the operation with the given display name.
    pub fn is_operation(&self, name: &str) -> bool {
        self.as_operation().is_some_and(|op| op.name() == name)
    }

    pub fn is_null(&self) -> bool {
        self.is_operation(NULL_OPERATION)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Node::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// A constant vector component. `Empty Array` stands for 0 in vector slots.
    pub fn as_component(&self) -> Option<f64> {
        match self {
            Node::Number(n) => Some(*n),
            node if node.is_operation("Empty Array") => Some(0.0),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.as_operation()?.name() {
            "True" => Some(true),
            "False" => Some(false),
            _ => None,
        }
    }

    /// The constant vector this node always evaluates to, if any.
    pub fn as_vertex(&self) -> Option<Vertex> {
        let op = self.as_operation()?;
        match op.name() {
            "Vector" => {
                let [x, y, z] = [op.param(0)?, op.param(1)?, op.param(2)?].map(Node::as_component);
                Some(Vertex::new(x?, y?, z?))
            }
            "Subtract" if op.params().len() == 2 && op.params().iter().all(|p| p.is_operation("Left")) => {
                Some(Vertex::ZERO)
            }
            name => AXIS_OPERATIONS
                .iter()
                .find(|(axis, _)| *axis == name)
                .map(|(_, vertex)| *vertex),
        }
    }

    /// Recursive equality on definitions and arguments. Non-deterministic operations never
    /// compare equal, so two random draws are never merged.
    pub fn structurally_equals(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Operation(a), Node::Operation(b)) => a.structurally_equals(b),
            (Node::Number(a), Node::Number(b)) => a == b,
            (Node::Text(a), Node::Text(b)) => a == b,
            (Node::Member(a), Node::Member(b)) => a.same_member(b),
            _ => false,
        }
    }

    /// Instruction weight used for rule budgets. Literal leaves weigh 1.
    pub fn weight(&self) -> usize {
        match self {
            Node::Operation(op) => op.weight(),
            Node::Number(_) | Node::Text(_) | Node::Member(_) => 1,
        }
    }
}

impl From<OperationNode> for Node {
    fn from(op: OperationNode) -> Self {
        Node::Operation(op)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::Number(value)
    }
}

impl From<i32> for Node {
    fn from(value: i32) -> Self {
        Node::Number(f64::from(value))
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Text(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Text(value)
    }
}

impl From<EnumMemberRef> for Node {
    fn from(member: EnumMemberRef) -> Self {
        Node::Member(member)
    }
}

/// One operation invocation. The argument list always covers every declared parameter.
#[derive(Debug, Clone)]
pub struct OperationNode {
    definition: Arc<OperationDefinition>,
    params: Vec<Node>,
    disabled: bool,
    comment: Option<String>,
    optimizable: bool,
}

impl OperationNode {
    /// Builds a node by operation name.
    ///
    /// `None` (or absent trailing) arguments within the declared parameters take the
    /// parameter's default; `None` arguments beyond them become the null leaf.
    pub fn build<A>(registry: &Registry, name: &str, args: impl IntoIterator<Item = A>) -> Result<Self>
    where
        A: Into<Option<Node>>,
    {
        let definition = registry.get_operation(name)?;
        Self::from_definition(registry, definition, args)
    }

    pub fn from_definition<A>(
        registry: &Registry,
        definition: Arc<OperationDefinition>,
        args: impl IntoIterator<Item = A>,
    ) -> Result<Self>
    where
        A: Into<Option<Node>>,
    {
        let args: Vec<Option<Node>> = args.into_iter().map(Into::into).collect();
        let declared = definition.parameter_count();
        let len = args.len().max(declared);

        let mut params = Vec::with_capacity(len);
        let mut args = args.into_iter();
        for index in 0..len {
            let node = match args.next().flatten() {
                Some(node) => node,
                None if index < declared => registry.default_value(&definition, index)?,
                None => registry.null_node()?,
            };
            params.push(node);
        }
        Ok(Self::from_parts(definition, params))
    }

    pub(crate) fn from_parts(definition: Arc<OperationDefinition>, params: Vec<Node>) -> Self {
        Self {
            definition,
            params,
            disabled: false,
            comment: None,
            optimizable: true,
        }
    }

    /// Same operation and flags, each argument passed through `f`.
    pub(crate) fn map_params(mut self, f: impl FnMut(Node) -> Node) -> Self {
        self.params = std::mem::take(&mut self.params).into_iter().map(f).collect();
        self
    }

    pub fn definition(&self) -> &Arc<OperationDefinition> {
        &self.definition
    }

    /// Display name of the operation.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn is_action(&self) -> bool {
        self.definition.is_action()
    }

    pub fn params(&self) -> &[Node] {
        &self.params
    }

    pub fn param(&self, index: usize) -> Option<&Node> {
        self.params.get(index)
    }

    pub fn into_params(self) -> Vec<Node> {
        self.params
    }

    /// Replaces one argument. Only meaningful before the node is shared downstream.
    pub fn set_param(&mut self, index: usize, node: Node) -> Option<Node> {
        self.params.get_mut(index).map(|slot| std::mem::replace(slot, node))
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn is_optimizable(&self) -> bool {
        self.optimizable
    }

    /// Excludes this node and its subtree from rewriting.
    pub fn non_optimizable(mut self) -> Self {
        self.optimizable = false;
        self
    }

    pub fn is_non_deterministic(&self) -> bool {
        NON_DETERMINISTIC_OPERATIONS.contains(&self.name())
    }

    pub fn structurally_equals(&self, other: &OperationNode) -> bool {
        if self.name() != other.name() || self.is_non_deterministic() {
            return false;
        }
        self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.structurally_equals(b))
    }

    /// `1 + extra weight + Σ child weights`, where each child of an action costs one less.
    pub fn weight(&self) -> usize {
        let action = self.is_action();
        let children: usize = self
            .params
            .iter()
            .map(|p| if action { p.weight() - 1 } else { p.weight() })
            .sum();
        1 + self.definition.weight + children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleforgeError;

    const FIXTURE: &str = include_str!("../tests/fixtures/elements.json");

    fn registry() -> Registry {
        Registry::from_json(FIXTURE).unwrap()
    }

    #[test]
    fn test_short_argument_list_is_padded_with_defaults() {
        let reg = registry();
        let node = reg.build("String", [Node::text("hi")]).unwrap();
        assert_eq!(node.params().len(), 4);
        assert!(node.params()[1..].iter().all(Node::is_null));
    }

    #[test]
    fn test_interior_none_takes_default() {
        let reg = registry();
        let node = reg
            .build("Round To Integer", [Some(Node::from(2.5)), None])
            .unwrap();
        assert_eq!(node.param(1).and_then(Node::as_member).map(|m| m.name()), Some("Up"));
    }

    #[test]
    fn test_extra_none_becomes_null_leaf() {
        let reg = registry();
        let node = reg
            .build("Absolute Value", [Some(Node::from(1)), None, Some(Node::from(2))])
            .unwrap();
        assert_eq!(node.params().len(), 3);
        assert!(node.params()[1].is_null());
        assert_eq!(node.params()[2].as_number(), Some(2.0));
    }

    #[test]
    fn test_missing_required_argument() {
        let reg = registry();
        let err = reg.build("Add", [Node::from(1)]).unwrap_err();
        assert!(matches!(
            err,
            RuleforgeError::MissingDefault { index: 1, ref parameter, .. } if parameter == "Right"
        ));
    }

    #[test]
    fn test_unknown_operation() {
        let reg = registry();
        assert!(matches!(
            reg.build("Summon Dragon", Vec::<Node>::new()),
            Err(RuleforgeError::UnknownOperation(_))
        ));
    }

    #[test]
    fn test_structural_equality() {
        let reg = registry();
        let a = Node::from(reg.build("Add", [Node::from(1), Node::from(2)]).unwrap());
        let b = Node::from(reg.build("Add", [Node::from(1), Node::from(2)]).unwrap());
        let c = Node::from(reg.build("Add", [Node::from(2), Node::from(1)]).unwrap());
        assert!(a.structurally_equals(&b));
        assert!(b.structurally_equals(&a));
        assert!(!a.structurally_equals(&c));
        assert!(!a.structurally_equals(&Node::from(3)));
    }

    #[test]
    fn test_random_operations_are_never_equal() {
        let reg = registry();
        let a = Node::from(reg.build("RandomInteger", [Node::from(1), Node::from(10)]).unwrap());
        let b = Node::from(reg.build("RandomInteger", [Node::from(1), Node::from(10)]).unwrap());
        assert!(!a.structurally_equals(&b));
        assert!(!a.structurally_equals(&a.clone()));

        // A random draw anywhere in the tree poisons equality of the parent too.
        let x = Node::from(reg.build("Add", [a.clone(), Node::from(1)]).unwrap());
        let y = Node::from(reg.build("Add", [a, Node::from(1)]).unwrap());
        assert!(!x.structurally_equals(&y));
    }

    #[test]
    fn test_enum_members_compare_by_family_and_value() {
        let reg = registry();
        let up = Node::from(reg.get_enum_member("Rounding", "Up").unwrap());
        let up_again = Node::from(reg.get_enum_member("Rounding", "Up").unwrap());
        let down = Node::from(reg.get_enum_member("Rounding", "Down").unwrap());
        assert!(up.structurally_equals(&up_again));
        assert!(!up.structurally_equals(&down));
    }

    #[test]
    fn test_constant_extraction() {
        let reg = registry();
        let t = Node::from(reg.build("True", Vec::<Node>::new()).unwrap());
        assert_eq!(t.as_bool(), Some(true));
        assert_eq!(Node::from(4).as_number(), Some(4.0));

        let v = Node::from(reg.build("Vector", [Node::from(1), Node::from(2), Node::from(3)]).unwrap());
        assert_eq!(v.as_vertex(), Some(Vertex::new(1.0, 2.0, 3.0)));

        let up = Node::from(reg.build("Up", Vec::<Node>::new()).unwrap());
        assert_eq!(up.as_vertex(), Some(Vertex::new(0.0, 1.0, 0.0)));

        let left = || Node::from(reg.build("Left", Vec::<Node>::new()).unwrap());
        let zero = Node::from(reg.build("Subtract", [left(), left()]).unwrap());
        assert_eq!(zero.as_vertex(), Some(Vertex::ZERO));

        let event_player = Node::from(reg.build("Event Player", Vec::<Node>::new()).unwrap());
        let partial = Node::from(reg.build("Vector", [Node::from(1), event_player, Node::from(3)]).unwrap());
        assert_eq!(partial.as_vertex(), None);

        let empty = || Node::from(reg.build("Empty Array", Vec::<Node>::new()).unwrap());
        assert_eq!(empty().as_component(), Some(0.0));
        assert_eq!(empty().as_number(), None);
        let sparse = Node::from(reg.build("Vector", [empty(), Node::from(5), empty()]).unwrap());
        assert_eq!(sparse.as_vertex(), Some(Vertex::new(0.0, 5.0, 0.0)));
    }

    #[test]
    fn test_weight_of_value_and_action_forms() {
        let reg = registry();
        let value = reg.build("Add", [Node::from(1), Node::from(2)]).unwrap();
        assert_eq!(value.weight(), 3);

        let variable = Node::from(reg.get_enum_member("Variable", "A").unwrap());
        let action = reg.build("Set Global Variable", [variable, Node::from(5)]).unwrap();
        assert_eq!(action.weight(), 1);
    }

    #[test]
    fn test_extra_weight_is_added() {
        let reg = registry();
        let node = reg.build("Random Integer", [Node::from(0), Node::from(1)]).unwrap();
        assert_eq!(node.weight(), 1 + node.definition().weight + 2);
    }

    #[test]
    fn test_flags_and_slot_replacement() {
        let reg = registry();
        let mut node = reg
            .build("Wait", Vec::<Node>::new())
            .unwrap()
            .with_comment("let things settle")
            .disabled(true)
            .non_optimizable();
        assert_eq!(node.comment(), Some("let things settle"));
        assert!(node.is_disabled());
        assert!(!node.is_optimizable());
        let previous = node.set_param(0, Node::from(1));
        assert_eq!(previous.and_then(|p| p.as_number()), Some(0.016));
        assert_eq!(node.param(0).and_then(Node::as_number), Some(1.0));
        assert!(node.set_param(9, Node::from(1)).is_none());
    }
}
