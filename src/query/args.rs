//! Raw query arguments
//!
//! Callers hand the engine loosely-typed values; the validator in
//! [`super::params`] turns them into normalized [`super::ParamValue`]s.

use serde_json::Value;

use super::errors::{QueryError, QueryResult};
use crate::schema::ModelKind;

/// One caller-supplied parameter value, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A symbol such as `:yes`; compares equal to the same string for enums
    Sym(String),
    /// A reference to a domain entity
    Entity { model: ModelKind, id: i64 },
    List(Vec<RawParam>),
    /// Structured value, only meaningful for join trees
    Json(Value),
}

impl RawParam {
    pub fn sym(name: impl Into<String>) -> Self {
        RawParam::Sym(name.into())
    }

    pub fn entity(model: ModelKind, id: i64) -> Self {
        RawParam::Entity { model, id }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawParam::Null)
    }

    /// Short type label for error messages.
    pub fn describe(&self) -> String {
        match self {
            RawParam::Null => "nil".to_string(),
            RawParam::Bool(b) => b.to_string(),
            RawParam::Int(i) => i.to_string(),
            RawParam::Float(f) => f.to_string(),
            RawParam::Str(s) => format!("{:?}", s),
            RawParam::Sym(s) => format!(":{}", s),
            RawParam::Entity { model, id } => format!("{} #{}", model, id),
            RawParam::List(items) => format!(
                "[{}]",
                items.iter().map(RawParam::describe).collect::<Vec<_>>().join(", ")
            ),
            RawParam::Json(v) => v.to_string(),
        }
    }

    /// Plain JSON form. Entities collapse to their id and symbols to strings.
    pub fn to_json(&self) -> Value {
        match self {
            RawParam::Null => Value::Null,
            RawParam::Bool(b) => Value::Bool(*b),
            RawParam::Int(i) => Value::from(*i),
            RawParam::Float(f) => Value::from(*f),
            RawParam::Str(s) | RawParam::Sym(s) => Value::String(s.clone()),
            RawParam::Entity { id, .. } => Value::from(*id),
            RawParam::List(items) => Value::Array(items.iter().map(RawParam::to_json).collect()),
            RawParam::Json(v) => v.clone(),
        }
    }
}

impl From<Value> for RawParam {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawParam::Null,
            Value::Bool(b) => RawParam::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => RawParam::Int(i),
                None => RawParam::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => RawParam::Str(s),
            Value::Array(items) => RawParam::List(items.into_iter().map(RawParam::from).collect()),
            obj @ Value::Object(_) => RawParam::Json(obj),
        }
    }
}

impl From<&str> for RawParam {
    fn from(s: &str) -> Self {
        RawParam::Str(s.to_string())
    }
}

impl From<String> for RawParam {
    fn from(s: String) -> Self {
        RawParam::Str(s)
    }
}

impl From<bool> for RawParam {
    fn from(b: bool) -> Self {
        RawParam::Bool(b)
    }
}

impl From<i64> for RawParam {
    fn from(i: i64) -> Self {
        RawParam::Int(i)
    }
}

impl From<i32> for RawParam {
    fn from(i: i32) -> Self {
        RawParam::Int(i as i64)
    }
}

impl From<u64> for RawParam {
    fn from(i: u64) -> Self {
        RawParam::Int(i as i64)
    }
}

impl From<f64> for RawParam {
    fn from(f: f64) -> Self {
        RawParam::Float(f)
    }
}

impl<T: Into<RawParam>> From<Vec<T>> for RawParam {
    fn from(items: Vec<T>) -> Self {
        RawParam::List(items.into_iter().map(Into::into).collect())
    }
}

/// Ordered argument list for a lookup. Later duplicates win.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryArgs {
    entries: Vec<(String, RawParam)>,
}

impl QueryArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<RawParam>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<RawParam>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<RawParam> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn get(&self, key: &str) -> Option<&RawParam> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawParam)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Arguments from a JSON object, as given on the command line.
    pub fn from_json(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self {
                entries: map
                    .iter()
                    .map(|(k, v)| (k.clone(), RawParam::from(v.clone())))
                    .collect(),
            }),
            other => Err(QueryError::bad_declaration(format!(
                "Query arguments must be a JSON object, got: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_value() {
        assert_eq!(RawParam::from(json!(3)), RawParam::Int(3));
        assert_eq!(RawParam::from(json!(0.5)), RawParam::Float(0.5));
        assert_eq!(
            RawParam::from(json!(["a", 1])),
            RawParam::List(vec![RawParam::Str("a".into()), RawParam::Int(1)])
        );
        assert!(matches!(RawParam::from(json!({"observations": "names"})), RawParam::Json(_)));
    }

    #[test]
    fn test_insert_replaces() {
        let args = QueryArgs::new().with("user", 1).with("by", "name").with("user", 2);
        assert_eq!(args.len(), 2);
        assert_eq!(args.get("user"), Some(&RawParam::Int(2)));
    }

    #[test]
    fn test_args_from_json() {
        let args = QueryArgs::from_json(&json!({"user": "7", "by": "date"})).unwrap();
        assert_eq!(args.get("user"), Some(&RawParam::Str("7".into())));
        assert!(QueryArgs::from_json(&json!([1, 2])).is_err());
        assert!(QueryArgs::from_json(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_to_json_collapses_entities() {
        let raw = RawParam::List(vec![RawParam::entity(ModelKind::User, 4), RawParam::sym("yes")]);
        assert_eq!(raw.to_json(), json!([4, "yes"]));
    }
}
