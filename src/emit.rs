//! Emit module: renders finalized trees as workshop script text.
//!
//! Value-form operations render as `Name(arg, arg)`; action-form operations render as one
//! statement per line with block indentation taken from the operation's definition.

use crate::config::{Config, IndentStyle};
use crate::cost::{rule_cost, CostReport};
use crate::ir::{Node, OperationNode};
use crate::optimize::Optimizer;
use crate::registry::Registry;
use crate::schema::Indentation;
use crate::types::format_number;
use std::fmt;

/// Text accumulator with block indentation.
#[derive(Debug, Clone)]
pub struct WorkshopWriter {
    buffer: String,
    unit: String,
    level: usize,
    // outdent never goes below this level
    floor: usize,
    at_line_start: bool,
}

impl WorkshopWriter {
    pub fn new(indent: IndentStyle) -> Self {
        Self {
            buffer: String::new(),
            unit: indent.unit(),
            level: 0,
            floor: 0,
            at_line_start: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.indent)
    }

    pub fn append(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        if self.at_line_start {
            for _ in 0..self.level {
                self.buffer.push_str(&self.unit);
            }
            self.at_line_start = false;
        }
        self.buffer.push_str(text);
        self
    }

    pub fn append_line(&mut self, text: &str) -> &mut Self {
        self.append(text);
        self.buffer.push('\n');
        self.at_line_start = true;
        self
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    pub fn outdent(&mut self) {
        if self.level > self.floor {
            self.level -= 1;
        }
    }

    /// Pins the current level as the lowest one `outdent` reaches.
    pub fn hold_level(&mut self) {
        self.floor = self.level;
    }

    pub fn release_level(&mut self) {
        self.floor = 0;
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_string(self) -> String {
        self.buffer
    }
}

impl Default for WorkshopWriter {
    fn default() -> Self {
        Self::new(IndentStyle::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// A statement in an `actions` block.
    Action,
    /// A top-level expression in a `conditions` block.
    Condition,
    Value,
    /// An argument of another call.
    NestedValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitContext {
    pub kind: ContextKind,
    pub omit_trailing_nulls: bool,
}

impl EmitContext {
    pub fn action() -> Self {
        Self::of(ContextKind::Action)
    }

    pub fn condition() -> Self {
        Self::of(ContextKind::Condition)
    }

    pub fn value() -> Self {
        Self::of(ContextKind::Value)
    }

    pub fn nested() -> Self {
        Self::of(ContextKind::NestedValue)
    }

    fn of(kind: ContextKind) -> Self {
        Self {
            kind,
            omit_trailing_nulls: true,
        }
    }

    pub fn omitting(mut self, omit: bool) -> Self {
        self.omit_trailing_nulls = omit;
        self
    }

    /// The context arguments are rendered in.
    pub fn nested_in(self) -> Self {
        Self {
            kind: ContextKind::NestedValue,
            ..self
        }
    }
}

impl Node {
    pub fn emit(&self, writer: &mut WorkshopWriter, ctx: EmitContext) {
        match self {
            Node::Operation(op) => op.emit(writer, ctx),
            Node::Number(n) => {
                writer.append(&format_number(*n));
            }
            Node::Text(text) => {
                writer.append(&quote(text));
            }
            Node::Member(member) => {
                writer.append(member.member().display_text());
            }
        }
    }
}

impl OperationNode {
    pub fn emit(&self, writer: &mut WorkshopWriter, ctx: EmitContext) {
        let args = ctx.nested_in();
        if ctx.kind == ContextKind::Condition && self.name() == "Compare" && self.params().len() == 3 {
            for (i, param) in self.params().iter().enumerate() {
                if i > 0 {
                    writer.append(" ");
                }
                param.emit(writer, args);
            }
            return;
        }

        let statement = ctx.kind == ContextKind::Action && self.is_action();
        let indentation = self.definition().indentation;
        if statement {
            if matches!(indentation, Some(Indentation::Outdent | Indentation::Drop)) {
                writer.outdent();
            }
            if let Some(comment) = self.comment() {
                writer.append_line(&quote(comment));
            }
            if self.is_disabled() {
                writer.append("disabled ");
            }
        }

        writer.append(self.name());
        let count = if ctx.omit_trailing_nulls {
            self.params().iter().rposition(|p| !p.is_null()).map_or(0, |last| last + 1)
        } else {
            self.params().len()
        };
        if count > 0 {
            writer.append("(");
            for (i, param) in self.params()[..count].iter().enumerate() {
                if i > 0 {
                    writer.append(", ");
                }
                param.emit(writer, args);
            }
            writer.append(")");
        }

        if statement {
            writer.append_line(";");
            if matches!(indentation, Some(Indentation::Indent | Indentation::Drop)) {
                writer.indent();
            }
        }
    }
}

fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = WorkshopWriter::default();
        self.emit(&mut writer, EmitContext::value());
        f.write_str(writer.as_str())
    }
}

impl fmt::Display for OperationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = WorkshopWriter::default();
        self.emit(&mut writer, EmitContext::value());
        f.write_str(writer.as_str())
    }
}

/// The `conditions` and `actions` sections of one rule, with the rule's cost.
#[derive(Debug, Clone)]
pub struct RuleBody {
    pub text: String,
    pub cost: CostReport,
}

/// Renders the condition and action sections of a rule. Empty sections are left out.
///
/// When `config.optimize` is set every statement is optimized first; the cost is computed
/// on the statements as written.
pub fn emit_rule_body(registry: &Registry, conditions: &[Node], actions: &[Node], config: &Config) -> RuleBody {
    let prepare = |nodes: &[Node]| -> Vec<Node> {
        if config.optimize {
            let optimizer = Optimizer::new(registry);
            nodes.iter().cloned().map(|node| optimizer.optimize(node)).collect()
        } else {
            nodes.to_vec()
        }
    };
    let conditions = prepare(conditions);
    let actions = prepare(actions);

    let mut writer = WorkshopWriter::from_config(config);
    if !conditions.is_empty() {
        open_section(&mut writer, "conditions");
        let ctx = EmitContext::condition().omitting(config.omit_trailing_nulls);
        for condition in &conditions {
            condition.emit(&mut writer, ctx);
            writer.append_line(";");
        }
        close_section(&mut writer);
    }
    if !actions.is_empty() {
        if !conditions.is_empty() {
            writer.append_line("");
        }
        open_section(&mut writer, "actions");
        let base = writer.level();
        let ctx = EmitContext::action().omitting(config.omit_trailing_nulls);
        for action in &actions {
            action.emit(&mut writer, ctx);
        }
        while writer.level() > base {
            writer.outdent();
        }
        close_section(&mut writer);
    }

    RuleBody {
        text: writer.into_string(),
        cost: rule_cost(&conditions, &actions, config),
    }
}

fn open_section(writer: &mut WorkshopWriter, name: &str) {
    writer.append_line(name);
    writer.append_line("{");
    writer.indent();
    writer.hold_level();
}

fn close_section(writer: &mut WorkshopWriter) {
    writer.release_level();
    writer.outdent();
    writer.append_line("}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FIXTURE: &str = include_str!("../tests/fixtures/elements.json");

    fn registry() -> Registry {
        Registry::from_json(FIXTURE).unwrap()
    }

    fn op(reg: &Registry, name: &str, args: impl IntoIterator<Item = Node>) -> Node {
        Node::from(reg.build(name, args).unwrap())
    }

    fn leaf(reg: &Registry, name: &str) -> Node {
        op(reg, name, Vec::new())
    }

    fn render(node: &Node, ctx: EmitContext) -> String {
        let mut writer = WorkshopWriter::default();
        node.emit(&mut writer, ctx);
        writer.into_string()
    }

    #[test]
    fn test_trailing_nulls_are_omitted() {
        let reg = registry();
        let node = op(&reg, "String", [Node::text("hi")]);
        assert_eq!(render(&node, EmitContext::value()), r#"String("hi")"#);
        assert_eq!(
            render(&node, EmitContext::value().omitting(false)),
            r#"String("hi", Null, Null, Null)"#
        );
    }

    #[test]
    fn test_interior_nulls_are_kept() {
        let reg = registry();
        let node = op(&reg, "String", [Node::text("{0} and {1}"), leaf(&reg, "Null"), Node::from(2)]);
        assert_eq!(render(&node, EmitContext::value()), r#"String("{0} and {1}", Null, 2)"#);
    }

    #[test]
    fn test_leaves() {
        let reg = registry();
        assert_eq!(render(&Node::from(0.5), EmitContext::value()), "0.5");
        assert_eq!(render(&Node::from(-0.0), EmitContext::value()), "0");
        assert_eq!(render(&Node::text(r#"say "hi" \o/"#), EmitContext::value()), r#""say \"hi\" \\o/""#);
        let team = Node::from(reg.get_enum_member("Team", "Team1").unwrap());
        assert_eq!(render(&team, EmitContext::value()), "Team 1");
        assert_eq!(leaf(&reg, "Event Player").to_string(), "Event Player");
    }

    #[test]
    fn test_compare_is_infix_only_in_conditions() {
        let reg = registry();
        let operator = Node::from(reg.get_enum_member("Operator", "<=").unwrap());
        let health = op(&reg, "Health", [leaf(&reg, "Event Player")]);
        let node = op(&reg, "Compare", [health, operator, Node::from(50)]);
        assert_eq!(render(&node, EmitContext::condition()), "Health(Event Player) <= 50");
        assert_eq!(render(&node, EmitContext::value()), "Compare(Health(Event Player), <=, 50)");
    }

    #[test]
    fn test_action_statement_with_comment_and_disabled() {
        let reg = registry();
        let wait = reg
            .build("Wait", Vec::<Node>::new())
            .unwrap()
            .with_comment("settle")
            .disabled(true);
        let text = render(&Node::from(wait), EmitContext::action());
        assert_eq!(text, "\"settle\"\ndisabled Wait(0.016, Ignore Condition);\n");
    }

    #[test]
    fn test_action_in_value_context_has_no_terminator() {
        let reg = registry();
        let wait = leaf(&reg, "Wait");
        assert_eq!(render(&wait, EmitContext::value()), "Wait(0.016, Ignore Condition)");
    }

    #[test]
    fn test_rule_body_layout_and_blocks() {
        let reg = registry();
        let operator = Node::from(reg.get_enum_member("Operator", "==").unwrap());
        let condition = op(&reg, "Compare", [leaf(&reg, "Is Alive"), operator, leaf(&reg, "True")]);
        let actions = [
            op(&reg, "If", [leaf(&reg, "Is Alive")]),
            op(&reg, "Wait", [Node::from(1)]),
            leaf(&reg, "Else"),
            op(&reg, "Small Message", [leaf(&reg, "Event Player"), Node::text("Bye")]),
            leaf(&reg, "End"),
        ];
        let config = Config::default().with_optimize(false);
        let body = emit_rule_body(&reg, &[condition], &actions, &config);
        let expected = "\
conditions
{
    Is Alive(Event Player) == True;
}

actions
{
    If(Is Alive(Event Player));
        Wait(1, Ignore Condition);
    Else;
        Small Message(Event Player, \"Bye\");
    End;
}
";
        assert_eq!(body.text, expected);
        assert_eq!(body.cost.total, body.cost.conditions + body.cost.actions + 1);
    }

    #[test]
    fn test_rule_body_optimizes_before_writing() {
        let reg = registry();
        let variable = Node::from(reg.get_enum_member("Variable", "A").unwrap());
        let sum = op(&reg, "Add", [Node::from(2), Node::from(3)]);
        let action = op(&reg, "Set Global Variable", [variable, sum]);
        let config = Config::default().with_indent(IndentStyle::Tabs);

        let body = emit_rule_body(&reg, &[], &[action.clone()], &config);
        assert_eq!(body.text, "actions\n{\n\tSet Global Variable(A, 5);\n}\n");
        assert_eq!(body.cost.actions, 1);

        let body = emit_rule_body(&reg, &[], &[action], &config.with_optimize(false));
        assert_eq!(body.text, "actions\n{\n\tSet Global Variable(A, Add(2, 3));\n}\n");
        assert_eq!(body.cost.actions, 3);
    }

    #[test]
    fn test_unbalanced_blocks_stay_inside_section() {
        let reg = registry();
        let body = emit_rule_body(&reg, &[], &[leaf(&reg, "End"), op(&reg, "If", [leaf(&reg, "True")])], &Config::default());
        assert_eq!(body.text, "actions\n{\n    End;\n    If(True);\n}\n");
    }
}
