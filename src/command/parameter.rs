//! Command parameters
//!
//! Parameters are kept in insertion order and looked up by name. A leading
//! `@`, `:` or `$` sigil is not part of the name for lookups, and names
//! compare ASCII case-insensitively, so `@Id` and `id` are the same parameter.

use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};
use crate::util::NamedEnum;
use crate::value::Value;

/// Longest string value written in full to a parameter dump
pub const DUMP_VALUE_LIMIT: usize = 50;

/// Declared parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Int,
    BigInt,
    Bit,
    Float,
    Decimal,
    Char,
    VarChar,
    NChar,
    NVarChar,
    Text,
    Xml,
    DateTime,
    UniqueIdentifier,
    VarBinary,
}

impl SqlType {
    /// Character types, whose values are truncated in diagnostics
    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(
            self,
            Self::Char | Self::VarChar | Self::NChar | Self::NVarChar | Self::Text | Self::Xml
        )
    }

    /// Type assumed for a value added without an explicit type
    #[must_use]
    pub const fn infer(value: &Value) -> Self {
        match value {
            Value::Integer(_) => Self::BigInt,
            Value::Real(_) => Self::Float,
            Value::Blob(_) => Self::VarBinary,
            Value::Null | Value::Text(_) => Self::NVarChar,
        }
    }
}

impl NamedEnum for SqlType {
    const VARIANTS: &'static [Self] = &[
        Self::Int,
        Self::BigInt,
        Self::Bit,
        Self::Float,
        Self::Decimal,
        Self::Char,
        Self::VarChar,
        Self::NChar,
        Self::NVarChar,
        Self::Text,
        Self::Xml,
        Self::DateTime,
        Self::UniqueIdentifier,
        Self::VarBinary,
    ];

    fn name(&self) -> &'static str {
        match self {
            Self::Int => "Int",
            Self::BigInt => "BigInt",
            Self::Bit => "Bit",
            Self::Float => "Float",
            Self::Decimal => "Decimal",
            Self::Char => "Char",
            Self::VarChar => "VarChar",
            Self::NChar => "NChar",
            Self::NVarChar => "NVarChar",
            Self::Text => "Text",
            Self::Xml => "Xml",
            Self::DateTime => "DateTime",
            Self::UniqueIdentifier => "UniqueIdentifier",
            Self::VarBinary => "VarBinary",
        }
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a parameter relative to the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// Whether the value is sent to the database
    #[must_use]
    pub const fn is_input(&self) -> bool {
        matches!(self, Self::Input | Self::InputOutput)
    }

    /// Whether the database writes the value back
    #[must_use]
    pub const fn is_output(&self) -> bool {
        matches!(self, Self::Output | Self::InputOutput)
    }
}

impl NamedEnum for ParameterDirection {
    const VARIANTS: &'static [Self] =
        &[Self::Input, Self::Output, Self::InputOutput, Self::ReturnValue];

    fn name(&self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Output => "Output",
            Self::InputOutput => "InputOutput",
            Self::ReturnValue => "ReturnValue",
        }
    }
}

impl std::fmt::Display for ParameterDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Strip the placeholder sigil from a parameter name
#[must_use]
pub fn base_name(name: &str) -> &str {
    name.trim().trim_start_matches(['@', ':', '$'])
}

fn same_name(a: &str, b: &str) -> bool {
    base_name(a).eq_ignore_ascii_case(base_name(b))
}

/// A named command parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub sql_type: SqlType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(default)]
    pub direction: ParameterDirection,
    #[serde(default)]
    pub value: Value,
}

impl Parameter {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            size: None,
            direction: ParameterDirection::Input,
            value: Value::Null,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    #[must_use]
    pub const fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub const fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Value as written to diagnostics
    fn dump_value(&self) -> String {
        let rendered = self.value.to_string();
        let truncate = self.sql_type.is_string() || matches!(self.value, Value::Blob(_));
        if truncate && rendered.chars().count() > DUMP_VALUE_LIMIT {
            let head: String = rendered.chars().take(DUMP_VALUE_LIMIT).collect();
            format!("{head}...")
        } else {
            rendered
        }
    }
}

/// Ordered parameters with unique names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterCollection {
    items: Vec<Parameter>,
}

impl ParameterCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter; names must be unique
    pub fn push(&mut self, parameter: Parameter) -> Result<&mut Parameter> {
        if self.contains(&parameter.name) {
            return Err(DataError::invalid_operation(format!(
                "A parameter named '{}' already exists on this command",
                parameter.name
            )));
        }
        self.items.push(parameter);
        let last = self.items.len() - 1;
        Ok(&mut self.items[last])
    }

    /// Append a typed parameter with a null value
    pub fn add(&mut self, name: impl Into<String>, sql_type: SqlType) -> Result<&mut Parameter> {
        self.push(Parameter::new(name, sql_type))
    }

    /// Append an input parameter, inferring its type from the value
    pub fn add_with_value(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<&mut Parameter> {
        let value = value.into();
        self.push(Parameter::new(name, SqlType::infer(&value)).with_value(value))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.items.iter().find(|p| same_name(&p.name, name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.items.iter_mut().find(|p| same_name(&p.name, name))
    }

    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Parameter> {
        self.items.get(index)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        let index = self.items.iter().position(|p| same_name(&p.name, name))?;
        Some(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Parameter> {
        self.items.iter_mut()
    }

    /// Human-readable listing for error diagnostics; empty when there are no
    /// parameters
    #[must_use]
    pub fn dump(&self) -> String {
        if self.items.is_empty() {
            return String::new();
        }
        let mut out = format!("Number of parameters: {}:\n", self.items.len());
        for (i, parameter) in self.items.iter().enumerate() {
            out.push_str(&format!("\tParameter #{i}\n"));
            out.push_str(&format!("\tName: {}\n", parameter.name));
            out.push_str(&format!("\tValue: {}\n", parameter.dump_value()));
            out.push_str(&format!("\tType: {}\n", parameter.sql_type));
            out.push_str(&format!("\tDirection: {}\n", parameter.direction));
            out.push('\n');
        }
        out
    }
}

impl From<Vec<Parameter>> for ParameterCollection {
    fn from(items: Vec<Parameter>) -> Self {
        Self { items }
    }
}

impl<'a> IntoIterator for &'a ParameterCollection {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_names_ignore_sigil_and_case() {
        let mut params = ParameterCollection::new();
        params.add("@Id", SqlType::Int).unwrap();
        assert!(params.contains("id"));
        assert!(params.contains(":ID"));
        assert!(params.get_mut("$id").is_some());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut params = ParameterCollection::new();
        params.add("id", SqlType::Int).unwrap();
        let err = params.add("@ID", SqlType::BigInt).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPERATION");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_order_preserved() {
        let mut params = ParameterCollection::new();
        params.add_with_value("b", 2).unwrap();
        params.add_with_value("a", "x").unwrap();
        let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(params.at(1).unwrap().sql_type, SqlType::NVarChar);
        assert_eq!(params.remove("B").unwrap().value, Value::Integer(2));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_dump_empty() {
        assert_eq!(ParameterCollection::new().dump(), "");
    }

    #[test]
    fn test_dump_layout() {
        let mut params = ParameterCollection::new();
        params.add("id", SqlType::Int).unwrap().direction = ParameterDirection::Output;
        params.add("LastUpdatedBY", SqlType::VarChar).unwrap().value = Value::from("admin");
        assert_eq!(
            params.dump(),
            "Number of parameters: 2:\n\
             \tParameter #0\n\tName: id\n\tValue: \n\tType: Int\n\tDirection: Output\n\n\
             \tParameter #1\n\tName: LastUpdatedBY\n\tValue: admin\n\
             \tType: VarChar\n\tDirection: Input\n\n"
        );
    }

    #[test]
    fn test_dump_truncates_long_strings() {
        let mut params = ParameterCollection::new();
        params.add_with_value("note", "A".repeat(60)).unwrap();
        let expected = format!("\tValue: {}...\n", "A".repeat(50));
        assert!(params.dump().contains(&expected));
    }

    #[test]
    fn test_dump_keeps_exactly_fifty_chars() {
        let mut params = ParameterCollection::new();
        params.add_with_value("note", "é".repeat(50)).unwrap();
        let expected = format!("\tValue: {}\n", "é".repeat(50));
        assert!(params.dump().contains(&expected));
    }

    #[test]
    fn test_dump_does_not_truncate_numbers() {
        let mut params = ParameterCollection::new();
        params.add("n", SqlType::Decimal).unwrap().value = Value::Real(1.0e60);
        assert!(!params.dump().contains("..."));
    }

    #[test]
    fn test_direction_flags() {
        assert!(ParameterDirection::InputOutput.is_input());
        assert!(ParameterDirection::InputOutput.is_output());
        assert!(!ParameterDirection::ReturnValue.is_output());
        assert!(!ParameterDirection::Output.is_input());
    }
}
