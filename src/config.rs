//! Config module: knobs for the emission pipeline.

use crate::Result;
use serde::{Deserialize, Serialize};

/// Per-rule instruction ceiling of the target.
pub const DEFAULT_RULE_ELEMENT_LIMIT: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndentStyle {
    Tabs,
    Spaces(usize),
}

impl IndentStyle {
    /// The text of one indentation level.
    pub fn unit(&self) -> String {
        match self {
            IndentStyle::Tabs => "\t".to_string(),
            IndentStyle::Spaces(n) => " ".repeat(*n),
        }
    }
}

impl Default for IndentStyle {
    fn default() -> Self {
        IndentStyle::Spaces(4)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub indent: IndentStyle,
    /// Drop trailing `Null` arguments of value-form calls.
    pub omit_trailing_nulls: bool,
    /// Run the rewrite engine before writing.
    pub optimize: bool,
    pub rule_element_limit: usize,
    /// Fixed weight every rule costs on top of its statements.
    pub rule_overhead: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indent: IndentStyle::default(),
            omit_trailing_nulls: true,
            optimize: true,
            rule_element_limit: DEFAULT_RULE_ELEMENT_LIMIT,
            rule_overhead: 1,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a config document; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_indent(mut self, indent: IndentStyle) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_omit_trailing_nulls(mut self, omit: bool) -> Self {
        self.omit_trailing_nulls = omit;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_rule_element_limit(mut self, limit: usize) -> Self {
        self.rule_element_limit = limit;
        self
    }

    pub fn with_rule_overhead(mut self, overhead: usize) -> Self {
        self.rule_overhead = overhead;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleforgeError;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.indent, IndentStyle::Spaces(4));
        assert!(config.omit_trailing_nulls);
        assert!(config.optimize);
        assert_eq!(config.rule_element_limit, 1024);
        assert_eq!(config.rule_overhead, 1);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = Config::from_json(r#"{ "indent": "tabs", "optimize": false }"#).unwrap();
        assert_eq!(config.indent, IndentStyle::Tabs);
        assert!(!config.optimize);
        assert!(config.omit_trailing_nulls);
        assert_eq!(config.rule_element_limit, 1024);

        let config = Config::from_json(r#"{ "indent": { "spaces": 2 } }"#).unwrap();
        assert_eq!(config.indent.unit(), "  ");
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            Config::from_json(r#"{ "indent": 7 }"#),
            Err(RuleforgeError::Json(_))
        ));
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .with_indent(IndentStyle::Tabs)
            .with_omit_trailing_nulls(false)
            .with_rule_element_limit(10)
            .with_rule_overhead(0);
        assert_eq!(config.indent.unit(), "\t");
        assert!(!config.omit_trailing_nulls);
        assert_eq!(config.rule_element_limit, 10);
        assert_eq!(config.rule_overhead, 0);
    }
}
