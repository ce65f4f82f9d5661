//! Request payload validation.
//!
//! # Data Flow
//! ```text
//! raw JSON
//!     → sanitize.rs (every string leaf)
//!     → Field tree walk (types, bounds, formats, transforms)
//!     → object refinements (cross-field rules)
//!     → Ok(cleaned JSON) | Err(every "<path>: <message>")
//! ```
//!
//! # Design Decisions
//! - Schemas are plain data (a tagged tree), not reflection
//! - All violations are collected; a failing field does not stop its siblings
//! - Unknown object keys are dropped from the output
//! - Coercion happens only where a rule asks for it (trim, lowercase,
//!   numeric strings)

use std::fmt;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use crate::security::sanitize::sanitize_value;

/// Path label used for errors about the payload as a whole.
pub const ROOT_PATH: &str = "body";

/// Largest integer an `f64` holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Boolean predicate over a string, paired with its failure message.
pub type StringCheck = fn(&str) -> bool;

/// Cross-field predicate over an object's (sanitized) input.
pub type ObjectCheck = fn(&Map<String, Value>) -> bool;

/// Well-known string formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Email,
    Phone,
    Uuid,
    /// RFC 3339 timestamp.
    DateTime,
    /// `YYYY-MM-DD`.
    Date,
}

impl Format {
    fn accepts(&self, s: &str) -> bool {
        match self {
            Format::Email => crate::security::schemas::EMAIL_RE.is_match(s),
            Format::Phone => crate::security::schemas::PHONE_RE.is_match(s),
            Format::Uuid => uuid::Uuid::parse_str(s).is_ok(),
            Format::DateTime => DateTime::parse_from_rfc3339(s).is_ok(),
            Format::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Format::Email => "Invalid email address",
            Format::Phone => "Invalid phone number",
            Format::Uuid => "Invalid uuid",
            Format::DateTime => "Invalid datetime",
            Format::Date => "Invalid date, expected YYYY-MM-DD",
        }
    }
}

#[derive(Clone, Default)]
pub struct StringRules {
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub format: Option<Format>,
    pub patterns: Vec<(Regex, &'static str)>,
    pub checks: Vec<(StringCheck, &'static str)>,
    /// Trim before checking (coercion).
    pub trim: bool,
    /// Lowercase before checking (coercion).
    pub lowercase: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NumberRules {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub integer: bool,
    /// Accept numeric strings such as `"12.50"`.
    pub coerce_from_string: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ArrayRules {
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

/// A cross-field rule reported against one field path.
#[derive(Clone)]
pub struct Refinement {
    pub path: &'static str,
    pub message: &'static str,
    pub check: ObjectCheck,
}

#[derive(Clone, Default)]
pub struct ObjectSchema {
    pub fields: Vec<(&'static str, Field)>,
    pub refinements: Vec<Refinement>,
}

#[derive(Clone)]
pub enum FieldKind {
    String(StringRules),
    Number(NumberRules),
    Boolean,
    Enum(Vec<&'static str>),
    Array(Box<Field>, ArrayRules),
    Object(ObjectSchema),
}

/// One node of a validation schema.
#[derive(Clone)]
pub struct Field {
    pub kind: FieldKind,
    pub optional: bool,
}

impl Field {
    pub fn string(rules: StringRules) -> Self {
        Self::required(FieldKind::String(rules))
    }

    pub fn number(rules: NumberRules) -> Self {
        Self::required(FieldKind::Number(rules))
    }

    pub fn integer(min: Option<i64>, max: Option<i64>) -> Self {
        Self::number(NumberRules {
            min: min.map(|v| v as f64),
            max: max.map(|v| v as f64),
            integer: true,
            coerce_from_string: false,
        })
    }

    pub fn boolean() -> Self {
        Self::required(FieldKind::Boolean)
    }

    pub fn one_of(values: &[&'static str]) -> Self {
        Self::required(FieldKind::Enum(values.to_vec()))
    }

    pub fn array(item: Field, rules: ArrayRules) -> Self {
        Self::required(FieldKind::Array(Box::new(item), rules))
    }

    pub fn object(fields: Vec<(&'static str, Field)>) -> Self {
        Self::required(FieldKind::Object(ObjectSchema {
            fields,
            refinements: Vec::new(),
        }))
    }

    /// Attach a cross-field rule. Only meaningful on object fields.
    pub fn refine(mut self, path: &'static str, message: &'static str, check: ObjectCheck) -> Self {
        if let FieldKind::Object(schema) = &mut self.kind {
            schema.refinements.push(Refinement {
                path,
                message,
                check,
            });
        }
        self
    }

    /// Allow the field to be absent (or null).
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn required(kind: FieldKind) -> Self {
        Self {
            kind,
            optional: false,
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            FieldKind::String(_) => "string",
            FieldKind::Number(_) => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Enum(_) => "enum",
            FieldKind::Array(..) => "array",
            FieldKind::Object(_) => "object",
        };
        f.debug_struct("Field")
            .field("kind", &kind)
            .field("optional", &self.optional)
            .finish()
    }
}

/// Sanitize then validate `input` against `schema`.
///
/// Returns the cleaned document, or every violation as `"<path>: <message>"`.
pub fn validate(schema: &Field, input: Value) -> Result<Value, Vec<String>> {
    let sanitized = sanitize_value(input);
    let mut errors = Vec::new();
    let out = check(schema, Some(&sanitized), &Path::root(), &mut errors);
    if errors.is_empty() {
        Ok(out.unwrap_or(Value::Null))
    } else {
        Err(errors)
    }
}

/// [`validate`], then deserialize the cleaned document into `T`.
pub fn validate_as<T: DeserializeOwned>(schema: &Field, input: Value) -> Result<T, Vec<String>> {
    let value = validate(schema, input)?;
    serde_json::from_value(value).map_err(|e| vec![format!("{ROOT_PATH}: {e}")])
}

#[derive(Clone)]
struct Path(Vec<String>);

impl Path {
    fn root() -> Self {
        Self(Vec::new())
    }

    fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str(ROOT_PATH)
        } else {
            f.write_str(&self.0.join("."))
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check(field: &Field, value: Option<&Value>, path: &Path, errors: &mut Vec<String>) -> Option<Value> {
    let value = match value {
        None | Some(Value::Null) => {
            if !field.optional {
                errors.push(format!("{path}: Required"));
            }
            return None;
        }
        Some(v) => v,
    };

    match &field.kind {
        FieldKind::String(rules) => check_string(rules, value, path, errors),
        FieldKind::Number(rules) => check_number(rules, value, path, errors),
        FieldKind::Boolean => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            other => {
                errors.push(format!("{path}: Expected boolean, received {}", type_name(other)));
                None
            }
        },
        FieldKind::Enum(allowed) => check_enum(allowed, value, path, errors),
        FieldKind::Array(item, rules) => check_array(item, rules, value, path, errors),
        FieldKind::Object(schema) => check_object(schema, value, path, errors),
    }
}

fn check_string(rules: &StringRules, value: &Value, path: &Path, errors: &mut Vec<String>) -> Option<Value> {
    let Value::String(raw) = value else {
        errors.push(format!("{path}: Expected string, received {}", type_name(value)));
        return None;
    };

    let mut s = if rules.trim { raw.trim().to_string() } else { raw.clone() };
    if rules.lowercase {
        s = s.to_lowercase();
    }

    let before = errors.len();
    let len = s.chars().count();
    if let Some(min) = rules.min_len {
        if len < min {
            errors.push(format!("{path}: String must contain at least {min} character(s)"));
        }
    }
    if let Some(max) = rules.max_len {
        if len > max {
            errors.push(format!("{path}: String must contain at most {max} character(s)"));
        }
    }
    if let Some(format) = rules.format {
        if !format.accepts(&s) {
            errors.push(format!("{path}: {}", format.message()));
        }
    }
    for (re, message) in &rules.patterns {
        if !re.is_match(&s) {
            errors.push(format!("{path}: {message}"));
        }
    }
    for (predicate, message) in &rules.checks {
        if !predicate(&s) {
            errors.push(format!("{path}: {message}"));
        }
    }

    (errors.len() == before).then_some(Value::String(s))
}

fn check_number(
    rules: &NumberRules,
    value: &Value,
    path: &Path,
    errors: &mut Vec<String>,
) -> Option<Value> {
    let number = match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) if rules.coerce_from_string => parse_number(s.trim()),
        other => {
            errors.push(format!("{path}: Expected number, received {}", type_name(other)));
            return None;
        }
    };
    let Some((n, number)) = number.and_then(|num| Some((num.as_f64()?, num))) else {
        errors.push(format!("{path}: Expected number, received {}", type_name(value)));
        return None;
    };

    let before = errors.len();
    let out = if rules.integer {
        match exact_integer(number, n) {
            Ok(out) => Some(out),
            Err(message) => {
                errors.push(format!("{path}: {message}"));
                None
            }
        }
    } else {
        Some(number)
    };
    if let Some(min) = rules.min {
        if n < min {
            errors.push(format!("{path}: Number must be greater than or equal to {min}"));
        }
    }
    if let Some(max) = rules.max {
        if n > max {
            errors.push(format!("{path}: Number must be less than or equal to {max}"));
        }
    }
    if errors.len() != before {
        return None;
    }
    out.map(Value::Number)
}

fn parse_number(s: &str) -> Option<Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = s.parse::<u64>() {
        return Some(Number::from(u));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Integral JSON numbers pass through untouched. A float is accepted only
/// when it is whole and within the range an `f64` represents exactly.
fn exact_integer(number: Number, n: f64) -> Result<Number, &'static str> {
    if number.is_i64() || number.is_u64() {
        return Ok(number);
    }
    if n.fract() != 0.0 {
        return Err("Expected integer, received float");
    }
    if n.abs() > MAX_SAFE_INTEGER {
        return Err("Number must be a safe integer");
    }
    Ok(Number::from(n as i64))
}

fn check_enum(allowed: &[&'static str], value: &Value, path: &Path, errors: &mut Vec<String>) -> Option<Value> {
    match value {
        Value::String(s) if allowed.contains(&s.as_str()) => Some(value.clone()),
        Value::String(s) => {
            let expected = allowed
                .iter()
                .map(|a| format!("'{a}'"))
                .collect::<Vec<_>>()
                .join(" | ");
            errors.push(format!("{path}: Invalid enum value. Expected {expected}, received '{s}'"));
            None
        }
        other => {
            errors.push(format!("{path}: Expected string, received {}", type_name(other)));
            None
        }
    }
}

fn check_array(
    item: &Field,
    rules: &ArrayRules,
    value: &Value,
    path: &Path,
    errors: &mut Vec<String>,
) -> Option<Value> {
    let Value::Array(items) = value else {
        errors.push(format!("{path}: Expected array, received {}", type_name(value)));
        return None;
    };

    let before = errors.len();
    if let Some(min) = rules.min_items {
        if items.len() < min {
            errors.push(format!("{path}: Array must contain at least {min} element(s)"));
        }
    }
    if let Some(max) = rules.max_items {
        if items.len() > max {
            errors.push(format!("{path}: Array must contain at most {max} element(s)"));
        }
    }

    let out: Vec<Value> = items
        .iter()
        .enumerate()
        .filter_map(|(i, v)| check(item, Some(v), &path.child(i.to_string()), errors))
        .collect();

    (errors.len() == before).then_some(Value::Array(out))
}

fn check_object(
    schema: &ObjectSchema,
    value: &Value,
    path: &Path,
    errors: &mut Vec<String>,
) -> Option<Value> {
    let Value::Object(input) = value else {
        errors.push(format!("{path}: Expected object, received {}", type_name(value)));
        return None;
    };

    let before = errors.len();
    let mut out = Map::new();
    for (name, field) in &schema.fields {
        if let Some(v) = check(field, input.get(*name), &path.child(*name), errors) {
            out.insert((*name).to_string(), v);
        }
    }

    for rule in &schema.refinements {
        if !(rule.check)(input) {
            errors.push(format!("{}: {}", path.child(rule.path), rule.message));
        }
    }

    (errors.len() == before).then_some(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn bounded_name() -> Field {
        Field::string(StringRules {
            min_len: Some(2),
            max_len: Some(5),
            ..Default::default()
        })
    }

    #[test]
    fn test_collects_every_violation() {
        let schema = Field::object(vec![
            ("name", bounded_name()),
            ("age", Field::integer(Some(0), Some(120))),
            ("active", Field::boolean()),
        ]);
        let errors = validate(&schema, json!({"name": "x", "age": 130, "active": "yes"})).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "name: String must contain at least 2 character(s)",
                "age: Number must be less than or equal to 120",
                "active: Expected boolean, received string",
            ]
        );
    }

    #[test]
    fn test_required_and_optional() {
        let schema = Field::object(vec![
            ("name", bounded_name()),
            ("nickname", bounded_name().optional()),
        ]);
        assert_eq!(validate(&schema, json!({})).unwrap_err(), vec!["name: Required"]);
        assert_eq!(
            validate(&schema, json!({"name": "Ana", "nickname": null})).unwrap(),
            json!({"name": "Ana"})
        );
    }

    #[test]
    fn test_sanitizes_before_validating() {
        let schema = Field::object(vec![("name", bounded_name())]);
        let out = validate(&schema, json!({"name": "  Ana\0  "})).unwrap();
        assert_eq!(out, json!({"name": "Ana"}));
    }

    #[test]
    fn test_unknown_keys_dropped() {
        let schema = Field::object(vec![("name", bounded_name())]);
        let out = validate(&schema, json!({"name": "Ana", "isAdmin": true})).unwrap();
        assert_eq!(out, json!({"name": "Ana"}));
    }

    #[test]
    fn test_nested_paths() {
        let line = Field::object(vec![("qty", Field::integer(Some(1), None))]);
        let schema = Field::object(vec![(
            "items",
            Field::array(line, ArrayRules { min_items: Some(1), max_items: None }),
        )]);
        let errors = validate(&schema, json!({"items": [{"qty": 2}, {"qty": 0}, {}]})).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "items.1.qty: Number must be greater than or equal to 1",
                "items.2.qty: Required",
            ]
        );
        assert_eq!(
            validate(&schema, json!({"items": []})).unwrap_err(),
            vec!["items: Array must contain at least 1 element(s)"]
        );
    }

    #[test]
    fn test_root_type_mismatch() {
        let schema = Field::object(vec![("name", bounded_name())]);
        assert_eq!(
            validate(&schema, json!([1, 2])).unwrap_err(),
            vec!["body: Expected object, received array"]
        );
    }

    #[test]
    fn test_number_coercion_only_when_allowed() {
        let strict = Field::object(vec![("price", Field::number(NumberRules::default()))]);
        assert_eq!(
            validate(&strict, json!({"price": "12.5"})).unwrap_err(),
            vec!["price: Expected number, received string"]
        );

        let lenient = Field::object(vec![(
            "price",
            Field::number(NumberRules { coerce_from_string: true, ..Default::default() }),
        )]);
        assert_eq!(validate(&lenient, json!({"price": " 12.5 "})).unwrap(), json!({"price": 12.5}));
    }

    #[test]
    fn test_integer_rejects_fraction() {
        let schema = Field::object(vec![("qty", Field::integer(None, None))]);
        assert_eq!(
            validate(&schema, json!({"qty": 1.5})).unwrap_err(),
            vec!["qty: Expected integer, received float"]
        );
        assert_eq!(validate(&schema, json!({"qty": 3.0})).unwrap(), json!({"qty": 3}));
    }

    #[test]
    fn test_integer_passes_through_exactly() {
        let schema = Field::object(vec![("n", Field::integer(Some(0), None))]);
        assert_eq!(
            validate(&schema, json!({"n": 9007199254740993u64})).unwrap(),
            json!({"n": 9007199254740993u64})
        );
        assert_eq!(
            validate(&schema, json!({"n": u64::MAX})).unwrap(),
            json!({"n": u64::MAX})
        );
        assert_eq!(
            validate(&schema, json!({"n": 1e20})).unwrap_err(),
            vec!["n: Number must be a safe integer"]
        );
        assert_eq!(
            validate(&schema, json!({"n": -1})).unwrap_err(),
            vec!["n: Number must be greater than or equal to 0"]
        );
    }

    #[test]
    fn test_coerced_integer_string_is_exact() {
        let schema = Field::object(vec![(
            "n",
            Field::number(NumberRules {
                integer: true,
                coerce_from_string: true,
                ..Default::default()
            }),
        )]);
        assert_eq!(
            validate(&schema, json!({"n": "9007199254740993"})).unwrap(),
            json!({"n": 9007199254740993i64})
        );
    }

    #[test]
    fn test_enum() {
        let schema = Field::object(vec![("method", Field::one_of(&["cash", "card"]))]);
        assert_eq!(
            validate(&schema, json!({"method": "iou"})).unwrap_err(),
            vec!["method: Invalid enum value. Expected 'cash' | 'card', received 'iou'"]
        );
    }

    #[test]
    fn test_refinement_runs_alongside_field_errors() {
        let schema = Field::object(vec![("a", bounded_name()), ("b", bounded_name())]).refine(
            "b",
            "Must match a",
            |m| m.get("a") == m.get("b"),
        );
        let errors = validate(&schema, json!({"a": "x", "b": "xyz"})).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "a: String must contain at least 2 character(s)",
                "b: Must match a",
            ]
        );
    }

    #[test]
    fn test_formats() {
        let schema = Field::object(vec![
            ("id", Field::string(StringRules { format: Some(Format::Uuid), ..Default::default() })),
            ("at", Field::string(StringRules { format: Some(Format::DateTime), ..Default::default() })),
            ("on", Field::string(StringRules { format: Some(Format::Date), ..Default::default() })),
        ]);
        assert!(validate(
            &schema,
            json!({
                "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
                "at": "2026-03-01T10:30:00Z",
                "on": "1990-07-15",
            })
        )
        .is_ok());
        assert_eq!(
            validate(&schema, json!({"id": "nope", "at": "tomorrow", "on": "15/07/1990"}))
                .unwrap_err()
                .len(),
            3
        );
    }

    #[test]
    fn test_validate_as_typed() {
        #[derive(Deserialize)]
        struct Line {
            name: String,
            qty: i64,
        }
        let schema = Field::object(vec![("name", bounded_name()), ("qty", Field::integer(Some(1), None))]);
        let line: Line = validate_as(&schema, json!({"name": " Gel ", "qty": 2})).unwrap();
        assert_eq!(line.name, "Gel");
        assert_eq!(line.qty, 2);
    }
}
