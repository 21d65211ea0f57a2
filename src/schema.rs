//! Declarative record schemas.
//!
//! A schema is written as JSON. Each node is one of:
//!
//! - a type name: `"string"`, `"number"`, `"int"`, `"bool"`, `"null"`,
//!   `"array"`, `"object"` or `"any"`;
//! - an array of nodes, matching if any alternative matches;
//! - an object, constraining fields of a record. Keys ending in `?` are
//!   optional, all others are required. Fields not named are allowed;
//! - `{"$const": v}`, matching exactly `v`. Number, bool and null literals
//!   may be written bare; string literals need the `$const` form since bare
//!   strings name types.
//!
//! ```json
//! { "id": "int", "name": "string", "email?": ["string", "null"], "kind": {"$const": "user"} }
//! ```

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::message::{Message, Record};

const CONST_KEY: &str = "$const";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid schema at '{path}': {reason}")]
    Invalid { path: String, reason: String },
}

/// Why a value failed a schema check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{}: {}", self.path, self.reason)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Kind {
    String,
    Number,
    Int,
    Bool,
    Null,
    Array,
    Object,
    Any,
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Number => "number",
            Kind::Int => "int",
            Kind::Bool => "bool",
            Kind::Null => "null",
            Kind::Array => "array",
            Kind::Object => "object",
            Kind::Any => "any",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Kind::String => value.is_string(),
            Kind::Number => value.is_number(),
            Kind::Int => value.is_i64() || value.is_u64(),
            Kind::Bool => value.is_boolean(),
            Kind::Null => value.is_null(),
            Kind::Array => value.is_array(),
            Kind::Object => value.is_object(),
            Kind::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Field {
    name: String,
    optional: bool,
    node: Node,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Type(Kind),
    AnyOf(Vec<Node>),
    Struct(Vec<Field>),
    Const(Value),
}

/// A compiled schema. Immutable and safe to share between tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    root: Node,
}

impl Schema {
    /// Compiles a schema from its JSON source.
    pub fn compile(source: &str) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_str(source)?;
        Ok(Schema {
            root: compile_node(&value, "")?,
        })
    }

    /// Checks a JSON value against the schema.
    pub fn check(&self, value: &Value) -> Result<(), Mismatch> {
        self.root.check(value, "")
    }

    pub fn check_record(&self, record: &Record) -> Result<(), Mismatch> {
        match &self.root {
            Node::Struct(fields) => check_fields(fields, record, ""),
            other => other.check(&Value::Object(record.clone()), ""),
        }
    }

    /// Checks a message. Byte messages are parsed as JSON first.
    pub fn check_message(&self, message: &Message) -> Result<(), Mismatch> {
        match message {
            Message::Record(record) => self.check_record(record),
            Message::Bytes(bytes) => {
                let value: Value = serde_json::from_slice(bytes).map_err(|e| Mismatch {
                    path: String::new(),
                    reason: format!("not valid JSON: {e}"),
                })?;
                self.check(&value)
            }
        }
    }
}

fn compile_node(value: &Value, path: &str) -> Result<Node, SchemaError> {
    match value {
        Value::String(name) => serde_json::from_value::<Kind>(Value::String(name.clone()))
            .map(Node::Type)
            .map_err(|_| SchemaError::Invalid {
                path: display_path(path),
                reason: format!("unknown type '{name}'"),
            }),
        Value::Array(alternatives) => {
            if alternatives.is_empty() {
                return Err(SchemaError::Invalid {
                    path: display_path(path),
                    reason: "empty list of alternatives".to_string(),
                });
            }
            alternatives
                .iter()
                .map(|alt| compile_node(alt, path))
                .collect::<Result<Vec<_>, _>>()
                .map(Node::AnyOf)
        }
        Value::Object(map) => {
            if let Some(constant) = map.get(CONST_KEY) {
                if map.len() != 1 {
                    return Err(SchemaError::Invalid {
                        path: display_path(path),
                        reason: format!("'{CONST_KEY}' cannot be combined with other keys"),
                    });
                }
                return Ok(Node::Const(constant.clone()));
            }
            compile_struct(map, path)
        }
        literal => Ok(Node::Const(literal.clone())),
    }
}

fn compile_struct(map: &Map<String, Value>, path: &str) -> Result<Node, SchemaError> {
    let mut fields = Vec::with_capacity(map.len());
    for (key, value) in map {
        let (name, optional) = match key.strip_suffix('?') {
            Some(name) => (name, true),
            None => (key.as_str(), false),
        };
        if name.is_empty() {
            return Err(SchemaError::Invalid {
                path: display_path(path),
                reason: "empty field name".to_string(),
            });
        }
        let field_path = join(path, name);
        fields.push(Field {
            name: name.to_string(),
            optional,
            node: compile_node(value, &field_path)?,
        });
    }
    Ok(Node::Struct(fields))
}

impl Node {
    fn check(&self, value: &Value, path: &str) -> Result<(), Mismatch> {
        match self {
            Node::Type(kind) if kind.accepts(value) => Ok(()),
            Node::Const(expected) if expected == value => Ok(()),
            Node::AnyOf(alternatives) if alternatives.iter().any(|n| n.check(value, path).is_ok()) => {
                Ok(())
            }
            Node::Struct(fields) => match value {
                Value::Object(map) => check_fields(fields, map, path),
                other => Err(mismatch(path, self, other)),
            },
            _ => Err(mismatch(path, self, value)),
        }
    }

    fn describe(&self) -> String {
        match self {
            Node::Type(kind) => kind.name().to_string(),
            Node::Const(value) => value.to_string(),
            Node::Struct(_) => "struct".to_string(),
            Node::AnyOf(alternatives) => alternatives
                .iter()
                .map(Node::describe)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

fn check_fields(fields: &[Field], map: &Map<String, Value>, path: &str) -> Result<(), Mismatch> {
    for field in fields {
        let field_path = join(path, &field.name);
        match map.get(&field.name) {
            Some(value) => field.node.check(value, &field_path)?,
            None if field.optional => {}
            None => {
                return Err(Mismatch {
                    path: field_path,
                    reason: "required field is missing".to_string(),
                })
            }
        }
    }
    Ok(())
}

fn mismatch(path: &str, node: &Node, found: &Value) -> Mismatch {
    let found = match found {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) if n.is_i64() || n.is_u64() => "int".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) if matches!(node, Node::Const(_)) => found.to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    };
    Mismatch {
        path: path.to_string(),
        reason: format!("expected {}, found {}", node.describe(), found),
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn user_schema() -> Schema {
        Schema::compile(
            r#"{
                "id": "int",
                "name": "string",
                "email?": ["string", "null"],
                "kind": {"$const": "user"},
                "address?": { "city": "string" }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_accepts_matching_record() {
        let schema = user_schema();
        let ok = record(json!({"id": 1, "name": "ann", "kind": "user", "extra": true}));
        assert!(schema.check_record(&ok).is_ok());

        let with_optional = record(json!({
            "id": 2, "name": "bo", "kind": "user", "email": null, "address": {"city": "Oslo"}
        }));
        assert!(schema.check_record(&with_optional).is_ok());
    }

    #[test]
    fn test_reports_wrong_type_with_path() {
        let schema = user_schema();
        let bad = record(json!({"id": "1", "name": "ann", "kind": "user"}));

        let err = schema.check_record(&bad).unwrap_err();

        assert_eq!(err.path, "id");
        assert_eq!(err.to_string(), "id: expected int, found string");
    }

    #[test]
    fn test_reports_missing_required_field() {
        let schema = user_schema();
        let err = schema
            .check_record(&record(json!({"id": 1, "kind": "user"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "name: required field is missing");
    }

    #[test]
    fn test_nested_struct_and_literal() {
        let schema = user_schema();

        let err = schema
            .check_record(&record(json!({
                "id": 1, "name": "a", "kind": "user", "address": {"city": 7}
            })))
            .unwrap_err();
        assert_eq!(err.path, "address.city");

        let err = schema
            .check_record(&record(json!({"id": 1, "name": "a", "kind": "admin"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "kind: expected \"user\", found \"admin\"");
    }

    #[test]
    fn test_alternatives_describe_all_options() {
        let schema = user_schema();
        let err = schema
            .check_record(&record(json!({"id": 1, "name": "a", "kind": "user", "email": 3})))
            .unwrap_err();
        assert_eq!(err.to_string(), "email: expected string | null, found int");
    }

    #[test]
    fn test_check_message_parses_bytes() {
        let schema = user_schema();
        let ok = Message::from(r#"{"id": 1, "name": "a", "kind": "user"}"#);
        assert!(schema.check_message(&ok).is_ok());

        let garbage = Message::from("{nope");
        let err = schema.check_message(&garbage).unwrap_err();
        assert!(err.reason.starts_with("not valid JSON"));
    }

    #[test]
    fn test_const_form_and_scalar_root() {
        let schema = Schema::compile(r#"{"$const": {"a": 1}}"#).unwrap();
        assert!(schema.check(&json!({"a": 1})).is_ok());
        assert!(schema.check(&json!({"a": 2})).is_err());

        let schema = Schema::compile(r#""number""#).unwrap();
        assert!(schema.check(&json!(1.5)).is_ok());
        assert!(schema.check_record(&record(json!({}))).is_err());
    }

    #[test]
    fn test_compile_errors() {
        assert!(matches!(
            Schema::compile("{"),
            Err(SchemaError::Parse(_))
        ));

        let err = Schema::compile(r#"{"age": "integer"}"#).unwrap_err();
        assert_eq!(err.to_string(), "invalid schema at 'age': unknown type 'integer'");

        assert!(Schema::compile(r#"{"tags": []}"#).is_err());
        assert!(Schema::compile(r#"{"?": "int"}"#).is_err());
        assert!(Schema::compile(r#"{"$const": 1, "x": "int"}"#).is_err());
    }
}
