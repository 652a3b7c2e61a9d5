//! Registry module: the read-only catalog of operations and enum families.
//!
//! A [`Registry`] is built once from a [`SchemaDocument`] and then only read. Lowering code
//! receives it explicitly; [`init_global`] additionally offers one process-wide instance.

use crate::ir::{Node, OperationNode};
use crate::schema::{
    DefaultValue, EnumEntry, EnumFamily, EnumMember, EnumMemberRef, MemberEntry, MemberValue,
    OperationDefinition, OperationEntry, OperationKind, ParameterDefinition, ParameterEntry,
    SchemaDocument, VariableScope,
};
use crate::{Result, RuleforgeError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Display name of the designated null leaf.
pub const NULL_OPERATION: &str = "Null";

/// Reserved default meaning "the localized default string" (index 0 of the string table).
pub const LOCALIZED_DEFAULT_TOKEN: &str = "__localized__";

const BUILTIN_STRINGS: &[&str] = &["Hello", "Goodbye", "Ready", "Waiting", "Score"];

// Defaults naming operations whose own defaults name operations; guards against cycles.
const MAX_DEFAULT_DEPTH: usize = 16;

#[derive(Debug, Clone)]
pub struct Registry {
    operations: HashMap<String, Arc<OperationDefinition>>,
    // code name or alias -> display name
    names: HashMap<String, String>,
    enums: HashMap<String, Arc<EnumFamily>>,
    strings: Vec<String>,
}

impl Registry {
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_document(SchemaDocument::from_json(json)?)
    }

    /// Builds the registry and validates that every declared default can be instantiated.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn from_document(document: SchemaDocument) -> Result<Self> {
        let enums = document
            .enumerators
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::new(enum_family(name, entry))))
            .collect::<HashMap<_, _>>();

        let mut names = HashMap::new();
        let mut known = HashSet::new();
        for (display, entry) in document.values.iter().chain(document.actions.iter()) {
            if !known.insert(display.clone()) {
                return Err(RuleforgeError::Schema(format!(
                    "operation '{display}' is declared more than once"
                )));
            }
            names.entry(code_name(display, entry)).or_insert_with(|| display.clone());
            if let Some(alias) = &entry.alias {
                names.entry(alias.clone()).or_insert_with(|| display.clone());
            }
        }

        let mut registry = Registry {
            operations: HashMap::new(),
            names,
            enums,
            strings: document
                .strings
                .unwrap_or_else(|| BUILTIN_STRINGS.iter().map(|s| s.to_string()).collect()),
        };

        let entries = document
            .values
            .iter()
            .map(|(n, e)| (n, e, OperationKind::Value))
            .chain(document.actions.iter().map(|(n, e)| (n, e, OperationKind::Action)));
        for (display, entry, kind) in entries {
            let definition = registry.definition(display, entry, kind, &known)?;
            registry.operations.insert(display.clone(), Arc::new(definition));
        }

        registry.validate_defaults()?;
        debug!(
            values = document.values.len(),
            actions = document.actions.len(),
            enumerators = registry.enums.len(),
            "loaded schema"
        );
        Ok(registry)
    }

    fn definition(
        &self,
        display: &str,
        entry: &OperationEntry,
        kind: OperationKind,
        known: &HashSet<String>,
    ) -> Result<OperationDefinition> {
        let parameters = entry
            .parameters
            .iter()
            .map(|(name, parameter)| {
                Ok(ParameterDefinition {
                    name: name.clone(),
                    type_name: parameter.type_name.clone(),
                    default: self.classify_default(display, name, parameter, known)?,
                    variable: parameter.var_ref_global.map(|global| {
                        if global {
                            VariableScope::Global
                        } else {
                            VariableScope::Player
                        }
                    }),
                    documentation: parameter.documentation.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(OperationDefinition {
            name: display.to_string(),
            code_name: code_name(display, entry),
            kind,
            return_type: entry.return_type.clone(),
            parameters,
            restricted: entry.restricted.clone(),
            hidden: entry.hidden,
            alias: entry.alias.clone(),
            documentation: entry.documentation.clone(),
            weight: entry.weight,
            indentation: entry.indentation,
        })
    }

    // Enum-typed parameters first, then the literal shapes, then operation names.
    fn classify_default(
        &self,
        operation: &str,
        parameter: &str,
        entry: &ParameterEntry,
        known: &HashSet<String>,
    ) -> Result<DefaultValue> {
        use serde_json::Value;

        let invalid = |raw: &Value| RuleforgeError::InvalidDefault {
            operation: operation.to_string(),
            parameter: parameter.to_string(),
            raw: raw.to_string(),
        };

        if let Some(family) = entry.type_name.as_deref().and_then(|t| self.enums.get(t)) {
            if family.members.is_empty() {
                return Err(RuleforgeError::Schema(format!(
                    "enum family '{}' used by '{operation}' has no members",
                    family.name
                )));
            }
            let index = match &entry.default_value {
                None | Some(Value::Null) => 0,
                Some(Value::String(member)) => {
                    family
                        .position(member)
                        .ok_or_else(|| RuleforgeError::UnknownEnumMember {
                            family: family.name.clone(),
                            member: member.clone(),
                        })?
                }
                Some(raw) => return Err(invalid(raw)),
            };
            return Ok(DefaultValue::Member {
                family: family.name.clone(),
                index,
            });
        }

        let Some(raw) = &entry.default_value else {
            return Ok(DefaultValue::None);
        };
        match raw {
            Value::Null => Ok(DefaultValue::Null),
            Value::Bool(b) => Ok(DefaultValue::Boolean(*b)),
            Value::Number(n) => n.as_f64().map(DefaultValue::Number).ok_or_else(|| invalid(raw)),
            Value::String(s) if s == LOCALIZED_DEFAULT_TOKEN => Ok(DefaultValue::Localized),
            Value::String(s) => {
                if known.contains(s) {
                    Ok(DefaultValue::Operation(s.clone()))
                } else if let Some(display) = self.names.get(s) {
                    Ok(DefaultValue::Operation(display.clone()))
                } else {
                    Ok(DefaultValue::Text(s.clone()))
                }
            }
            Value::Array(_) | Value::Object(_) => Err(invalid(raw)),
        }
    }

    fn validate_defaults(&self) -> Result<()> {
        for definition in self.operations.values() {
            for (index, parameter) in definition.parameters.iter().enumerate() {
                if parameter.has_default() {
                    self.instantiate_default(definition, index, 0)?;
                }
            }
        }
        Ok(())
    }

    /// Looks up an operation by display name, code name or alias.
    pub fn get_operation(&self, name: &str) -> Result<Arc<OperationDefinition>> {
        self.try_get_operation(name)
            .cloned()
            .ok_or_else(|| RuleforgeError::UnknownOperation(name.to_string()))
    }

    pub fn try_get_operation(&self, name: &str) -> Option<&Arc<OperationDefinition>> {
        self.operations
            .get(name)
            .or_else(|| self.names.get(name).and_then(|display| self.operations.get(display)))
    }

    pub fn try_get_enum_family(&self, name: &str) -> Option<&Arc<EnumFamily>> {
        self.enums.get(name)
    }

    pub fn get_enum_family(&self, name: &str) -> Result<&Arc<EnumFamily>> {
        self.try_get_enum_family(name)
            .ok_or_else(|| RuleforgeError::UnknownEnumFamily(name.to_string()))
    }

    /// Looks up a member by name, alias or display text.
    pub fn get_enum_member(&self, family: &str, member: &str) -> Result<EnumMemberRef> {
        let enum_family = self.get_enum_family(family)?;
        enum_family
            .position(member)
            .map(|index| EnumMemberRef::new(Arc::clone(enum_family), index))
            .ok_or_else(|| RuleforgeError::UnknownEnumMember {
                family: family.to_string(),
                member: member.to_string(),
            })
    }

    pub fn operations(&self) -> impl Iterator<Item = &Arc<OperationDefinition>> {
        self.operations.values()
    }

    pub fn enum_families(&self) -> impl Iterator<Item = &Arc<EnumFamily>> {
        self.enums.values()
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// The value a missing argument at `index` takes.
    pub fn default_value(&self, definition: &OperationDefinition, index: usize) -> Result<Node> {
        self.instantiate_default(definition, index, 0)
    }

    fn instantiate_default(&self, definition: &OperationDefinition, index: usize, depth: usize) -> Result<Node> {
        let missing = || RuleforgeError::MissingDefault {
            operation: definition.name.clone(),
            parameter: definition
                .parameter(index)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            index,
        };
        let parameter = definition.parameter(index).ok_or_else(missing)?;

        match &parameter.default {
            DefaultValue::None => Err(missing()),
            DefaultValue::Null => self.null_node(),
            DefaultValue::Boolean(b) => self.boolean(*b),
            DefaultValue::Number(n) => Ok(Node::Number(*n)),
            DefaultValue::Text(s) => Ok(Node::Text(s.clone())),
            DefaultValue::Localized => Ok(Node::Text(self.strings.first().cloned().unwrap_or_default())),
            DefaultValue::Member { family, index } => {
                let family = self.get_enum_family(family)?;
                Ok(Node::Member(EnumMemberRef::new(Arc::clone(family), *index)))
            }
            DefaultValue::Operation(name) => {
                if depth >= MAX_DEFAULT_DEPTH {
                    return Err(RuleforgeError::Schema(format!(
                        "default value of '{}' in '{}' does not terminate",
                        parameter.name, definition.name
                    )));
                }
                let target = self.get_operation(name)?;
                let mut params = Vec::with_capacity(target.parameter_count());
                for i in 0..target.parameter_count() {
                    params.push(self.instantiate_default(&target, i, depth + 1)?);
                }
                Ok(Node::Operation(OperationNode::from_parts(target, params)))
            }
        }
    }

    /// The designated null leaf.
    pub fn null_node(&self) -> Result<Node> {
        Ok(Node::Operation(OperationNode::from_parts(
            self.get_operation(NULL_OPERATION)?,
            Vec::new(),
        )))
    }

    /// The `True` or `False` constant.
    pub fn boolean(&self, value: bool) -> Result<Node> {
        let definition = self.get_operation(if value { "True" } else { "False" })?;
        Ok(Node::Operation(OperationNode::from_parts(definition, Vec::new())))
    }

    /// Builds a node; see [`OperationNode::build`].
    pub fn build<A>(&self, name: &str, args: impl IntoIterator<Item = A>) -> Result<OperationNode>
    where
        A: Into<Option<Node>>,
    {
        OperationNode::build(self, name, args)
    }
}

fn code_name(display: &str, entry: &OperationEntry) -> String {
    entry.name.clone().unwrap_or_else(|| display.replace(' ', ""))
}

fn enum_family(name: &str, entry: &EnumEntry) -> EnumFamily {
    let (hidden, members) = match entry {
        EnumEntry::Members(members) => (false, members),
        EnumEntry::Detailed { hidden, members } => (*hidden, members),
    };
    let members = members
        .iter()
        .map(|member| match member {
            MemberEntry::Name(name) => EnumMember {
                name: name.clone(),
                alias: None,
                i18n: None,
                value: MemberValue::Text(name.clone()),
            },
            MemberEntry::Detailed {
                name,
                alias,
                i18n,
                value,
            } => EnumMember {
                name: name.clone(),
                alias: alias.clone(),
                i18n: i18n.clone(),
                value: value.clone().unwrap_or_else(|| MemberValue::Text(name.clone())),
            },
        })
        .collect();
    EnumFamily {
        name: name.to_string(),
        hidden,
        members,
    }
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Initializes the process-wide registry on first call; later calls return the same instance.
pub fn init_global(schema_json: &str) -> Result<Arc<Registry>> {
    if let Some(registry) = GLOBAL.get() {
        return Ok(Arc::clone(registry));
    }
    let registry = Arc::new(Registry::from_json(schema_json)?);
    Ok(Arc::clone(GLOBAL.get_or_init(|| registry)))
}

/// The process-wide registry, if [`init_global`] has run.
pub fn global() -> Option<Arc<Registry>> {
    GLOBAL.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;
    use serde_json::json;

    const FIXTURE: &str = include_str!("../tests/fixtures/elements.json");

    fn registry() -> Registry {
        Registry::from_json(FIXTURE).unwrap()
    }

    #[test]
    fn test_lookup_by_display_and_code_name() {
        let reg = registry();
        let by_display = reg.get_operation("Raise To Power").unwrap();
        let by_code = reg.get_operation("RaiseToPower").unwrap();
        assert!(Arc::ptr_eq(&by_display, &by_code));
        assert_eq!(by_display.parameter_count(), 2);
        assert!(by_display.is_value());
    }

    #[test]
    fn test_unknown_operation() {
        let reg = registry();
        assert!(matches!(
            reg.get_operation("Teleport Everyone"),
            Err(RuleforgeError::UnknownOperation(name)) if name == "Teleport Everyone"
        ));
        assert!(reg.try_get_operation("Teleport Everyone").is_none());
    }

    #[test]
    fn test_enum_member_lookup() {
        let reg = registry();
        let member = reg.get_enum_member("Rounding", "Nearest").unwrap();
        assert_eq!(member.name(), "To Nearest");
        let team = reg.get_enum_member("Team", "Team 1").unwrap();
        assert_eq!(team.name(), "Team1");
        assert!(matches!(
            reg.get_enum_member("Rounding", "Sideways"),
            Err(RuleforgeError::UnknownEnumMember { .. })
        ));
        assert!(matches!(
            reg.get_enum_member("Weather", "Rain"),
            Err(RuleforgeError::UnknownEnumFamily(_))
        ));
    }

    #[test]
    fn test_default_shapes() {
        let reg = registry();
        let round = reg.get_operation("Round To Integer").unwrap();
        match reg.default_value(&round, 1).unwrap() {
            Node::Member(m) => assert_eq!(m.name(), "Up"),
            other => panic!("expected enum member, got {other:?}"),
        }

        let string = reg.get_operation("String").unwrap();
        assert!(reg.default_value(&string, 1).unwrap().is_null());

        let message = reg.get_operation("Small Message").unwrap();
        match reg.default_value(&message, 0).unwrap() {
            Node::Operation(op) => assert_eq!(op.name(), "All Players"),
            other => panic!("expected operation, got {other:?}"),
        }
        match reg.default_value(&message, 1).unwrap() {
            Node::Text(text) => assert_eq!(text, reg.strings()[0]),
            other => panic!("expected localized text, got {other:?}"),
        }

        let wait = reg.get_operation("Wait").unwrap();
        assert_eq!(reg.default_value(&wait, 0).unwrap().as_number(), Some(0.016));
        match reg.default_value(&wait, 1).unwrap() {
            Node::Member(m) => assert_eq!(m.name(), "Ignore Condition"),
            other => panic!("expected enum member, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_default() {
        let reg = registry();
        let add = reg.get_operation("Add").unwrap();
        assert!(matches!(
            reg.default_value(&add, 0),
            Err(RuleforgeError::MissingDefault { index: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_default_is_load_time_error() {
        let err = SchemaBuilder::new()
            .value("Broken", "number", [("Value", ParameterEntry::default().with_default(json!([1, 2])))])
            .build()
            .unwrap_err();
        match err {
            RuleforgeError::InvalidDefault { operation, parameter, raw } => {
                assert_eq!(operation, "Broken");
                assert_eq!(parameter, "Value");
                assert_eq!(raw, "[1,2]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_enum_member_default_is_load_time_error() {
        let err = SchemaBuilder::new()
            .enumerator("Rounding", ["Up", "Down"])
            .value("Round", "number", [("Mode", ParameterEntry::typed("Rounding").with_default(json!("Sideways")))])
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleforgeError::UnknownEnumMember { member, .. } if member == "Sideways"));
    }

    #[test]
    fn test_null_default_without_null_operation_fails_to_load() {
        let err = SchemaBuilder::new()
            .value("Custom String", "string", [
                ("Text", ParameterEntry::typed("string")),
                ("{0}", ParameterEntry::default().with_default(json!(null))),
            ])
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleforgeError::UnknownOperation(name) if name == NULL_OPERATION));
    }

    #[test]
    fn test_cyclic_operation_defaults_fail_to_load() {
        let err = SchemaBuilder::new()
            .value("Ping", "number", [("Value", ParameterEntry::default().with_default(json!("Pong")))])
            .value("Pong", "number", [("Value", ParameterEntry::default().with_default(json!("Ping")))])
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleforgeError::Schema(_)));
    }

    #[test]
    fn test_duplicate_operation_rejected() {
        let doc = SchemaDocument::from_json(
            r#"{ "values": { "Wait": {} }, "actions": { "Wait": {} } }"#,
        )
        .unwrap();
        assert!(matches!(Registry::from_document(doc), Err(RuleforgeError::Schema(_))));
    }

    #[test]
    fn test_custom_string_table() {
        let reg = SchemaBuilder::new()
            .strings(["Bonjour"])
            .value("Greeting", "string", [("Text", ParameterEntry::typed("string").with_default(json!(LOCALIZED_DEFAULT_TOKEN)))])
            .build()
            .unwrap();
        let greeting = reg.get_operation("Greeting").unwrap();
        assert!(matches!(reg.default_value(&greeting, 0).unwrap(), Node::Text(t) if t == "Bonjour"));
    }

    #[test]
    fn test_init_global_is_idempotent() {
        let first = init_global(FIXTURE).unwrap();
        let second = init_global("this is not json").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(global().is_some_and(|g| Arc::ptr_eq(&g, &first)));
    }
}
