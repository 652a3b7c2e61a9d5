//! Schema module: the data description of every operation and enum family the target supports.
//!
//! [`SchemaDocument`] mirrors the external schema file one-to-one. The registry turns it into
//! the immutable [`OperationDefinition`] and [`EnumFamily`] values the IR references.

use crate::registry::Registry;
use crate::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;

/// The raw schema document: three collections keyed by display name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub values: IndexMap<String, OperationEntry>,
    #[serde(default)]
    pub actions: IndexMap<String, OperationEntry>,
    #[serde(default)]
    pub enumerators: IndexMap<String, EnumEntry>,
    /// Localized string table. Index 0 backs the localized default token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strings: Option<Vec<String>>,
}

impl SchemaDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationEntry {
    /// Code name. Defaults to the display name with spaces removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default)]
    pub parameters: IndexMap<String, ParameterEntry>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted: Option<String>,
    #[serde(default)]
    pub weight: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indentation: Option<Indentation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntry {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// `None` when the key is absent; `Some(Value::Null)` is the null sentinel.
    #[serde(
        default,
        rename = "defaultValue",
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default, rename = "var-ref-global", skip_serializing_if = "Option::is_none")]
    pub var_ref_global: Option<bool>,
}

impl ParameterEntry {
    pub fn typed(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn variable(global: bool) -> Self {
        Self {
            var_ref_global: Some(global),
            ..Self::default()
        }
    }
}

// A present key always yields `Some`, even for JSON `null`.
fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumEntry {
    Members(Vec<MemberEntry>),
    Detailed {
        #[serde(default)]
        hidden: bool,
        members: Vec<MemberEntry>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemberEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        i18n: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<MemberValue>,
    },
}

/// Block structure an action opens or closes in the emitted script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indentation {
    Indent,
    Outdent,
    /// Closes the current block and opens a new one (`Else`).
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Value,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableScope {
    Global,
    Player,
}

/// Default-value descriptor, classified once at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// No default: the slot must be supplied.
    None,
    /// The designated null leaf.
    Null,
    Boolean(bool),
    Number(f64),
    Text(String),
    /// Index 0 of the localized string table.
    Localized,
    /// A member of the parameter's enum family, by index.
    Member { family: String, index: usize },
    /// Another operation invoked with no arguments.
    Operation(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDefinition {
    pub name: String,
    pub type_name: Option<String>,
    pub default: DefaultValue,
    pub variable: Option<VariableScope>,
    pub documentation: Option<String>,
}

impl ParameterDefinition {
    pub fn has_default(&self) -> bool {
        self.default != DefaultValue::None
    }
}

/// One primitive of the target. Immutable once loaded; shared through `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    pub name: String,
    pub code_name: String,
    pub kind: OperationKind,
    pub return_type: Option<String>,
    pub parameters: Vec<ParameterDefinition>,
    /// Call-site restriction tag, checked outside this crate.
    pub restricted: Option<String>,
    pub hidden: bool,
    pub alias: Option<String>,
    pub documentation: Option<String>,
    /// Weight on top of the base unit every node costs.
    pub weight: usize,
    pub indentation: Option<Indentation>,
}

impl OperationDefinition {
    pub fn is_value(&self) -> bool {
        self.kind == OperationKind::Value
    }

    pub fn is_action(&self) -> bool {
        self.kind == OperationKind::Action
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameter(&self, index: usize) -> Option<&ParameterDefinition> {
        self.parameters.get(index)
    }
}

/// Underlying value of an enum member, used for equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemberValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    pub alias: Option<String>,
    pub i18n: Option<String>,
    pub value: MemberValue,
}

impl EnumMember {
    /// The text written to the script.
    pub fn display_text(&self) -> &str {
        self.i18n.as_deref().unwrap_or(&self.name)
    }

    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.alias.as_deref() == Some(name) || self.i18n.as_deref() == Some(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumFamily {
    pub name: String,
    pub hidden: bool,
    pub members: Vec<EnumMember>,
}

impl EnumFamily {
    pub fn position(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.answers_to(name))
    }
}

/// A reference to one member of a loaded family. This is the enum leaf of the IR.
#[derive(Debug, Clone)]
pub struct EnumMemberRef {
    family: Arc<EnumFamily>,
    index: usize,
}

impl EnumMemberRef {
    pub(crate) fn new(family: Arc<EnumFamily>, index: usize) -> Self {
        debug_assert!(index < family.members.len());
        Self { family, index }
    }

    pub fn family(&self) -> &EnumFamily {
        &self.family
    }

    pub fn member(&self) -> &EnumMember {
        &self.family.members[self.index]
    }

    pub fn name(&self) -> &str {
        &self.member().name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Another member of the same family, looked up by name, alias or display text.
    pub fn sibling(&self, name: &str) -> Option<EnumMemberRef> {
        self.family
            .position(name)
            .map(|index| EnumMemberRef::new(Arc::clone(&self.family), index))
    }

    pub fn same_member(&self, other: &EnumMemberRef) -> bool {
        self.family.name == other.family.name && self.member().value == other.member().value
    }
}

impl fmt::Display for EnumMemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.family.name, self.name())
    }
}

/// Programmatic construction of a schema, for embedding and tests.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    document: SchemaDocument,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value<'a>(
        mut self,
        name: impl Into<String>,
        return_type: impl Into<String>,
        parameters: impl IntoIterator<Item = (&'a str, ParameterEntry)>,
    ) -> Self {
        let entry = OperationEntry {
            return_type: Some(return_type.into()),
            parameters: parameters.into_iter().map(|(n, p)| (n.to_string(), p)).collect(),
            ..OperationEntry::default()
        };
        self.document.values.insert(name.into(), entry);
        self
    }

    pub fn action<'a>(
        mut self,
        name: impl Into<String>,
        parameters: impl IntoIterator<Item = (&'a str, ParameterEntry)>,
    ) -> Self {
        let entry = OperationEntry {
            parameters: parameters.into_iter().map(|(n, p)| (n.to_string(), p)).collect(),
            ..OperationEntry::default()
        };
        self.document.actions.insert(name.into(), entry);
        self
    }

    /// Insert a fully specified entry, for the rarer fields.
    pub fn entry(mut self, name: impl Into<String>, kind: OperationKind, entry: OperationEntry) -> Self {
        match kind {
            OperationKind::Value => self.document.values.insert(name.into(), entry),
            OperationKind::Action => self.document.actions.insert(name.into(), entry),
        };
        self
    }

    pub fn enumerator<'a>(mut self, name: impl Into<String>, members: impl IntoIterator<Item = &'a str>) -> Self {
        let members = members.into_iter().map(|m| MemberEntry::Name(m.to_string())).collect();
        self.document.enumerators.insert(name.into(), EnumEntry::Members(members));
        self
    }

    pub fn strings(mut self, strings: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.document.strings = Some(strings.into_iter().map(Into::into).collect());
        self
    }

    pub fn document(&self) -> &SchemaDocument {
        &self.document
    }

    pub fn build(self) -> Result<Registry> {
        Registry::from_document(self.document)
    }
}
