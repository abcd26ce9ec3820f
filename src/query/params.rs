//! Parameter validation
//!
//! Every accepted parameter has a [`ParamSpec`]. Validation is pure: it
//! never touches the backend, and a failure aborts construction of the
//! whole query.

use serde::Serialize;
use serde_json::Value;

use super::args::RawParam;
use super::errors::{QueryError, QueryResult};
use crate::schema::{JoinTree, ModelKind};

/// What a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Id of one row of the given model
    Id(ModelKind),
    /// Id of a row of whatever model another parameter names
    AnyId,
    /// One or more ids; order and duplicates are kept
    IdSet(Option<ModelKind>),
    Int,
    IntRange,
    Float,
    FloatRange,
    Str,
    StrList,
    Bool,
    Enum(&'static [&'static str]),
    /// `[min, max]` of `YYYY[-MM[-DD]]` or `MM[-DD]`
    Date,
    /// `[min, max]` of `YYYY[-MM[-DD[-HH[-MM[-SS]]]]]`
    Time,
    JoinTree,
    /// Raw SQL text, one or many
    Text,
    /// Raw SQL text, exactly one
    Clause,
    /// Token of another persisted query
    QueryRef,
}

/// Declared default, compared against normalized values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Bool(bool),
    Str(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<DefaultValue>,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
        }
    }

    pub const fn with_default(name: &'static str, kind: ParamKind, default: DefaultValue) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: Some(default),
        }
    }

    /// Whether `value` is the declared default, and so may be dropped.
    pub fn is_default(&self, value: &ParamValue) -> bool {
        match (self.default, value) {
            (Some(DefaultValue::Bool(d)), ParamValue::Bool(v)) => d == *v,
            (Some(DefaultValue::Str(d)), ParamValue::Str(v)) => d == v,
            _ => false,
        }
    }
}

/// A validated, normalized parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    StrList(Vec<String>),
    Json(Value),
}

impl ParamValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            ParamValue::IntList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_list(&self) -> Option<&[f64]> {
        match self {
            ParamValue::FloatList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str_list(&self) -> Option<&[String]> {
        match self {
            ParamValue::StrList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ParamValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Back to a raw argument, for rebuilding a descriptor.
    pub fn to_raw(&self) -> RawParam {
        match self {
            ParamValue::Bool(b) => RawParam::Bool(*b),
            ParamValue::Int(i) => RawParam::Int(*i),
            ParamValue::Float(f) => RawParam::Float(*f),
            ParamValue::Str(s) => RawParam::Str(s.clone()),
            ParamValue::IntList(v) => RawParam::List(v.iter().map(|i| RawParam::Int(*i)).collect()),
            ParamValue::FloatList(v) => {
                RawParam::List(v.iter().map(|f| RawParam::Float(*f)).collect())
            }
            ParamValue::StrList(v) => {
                RawParam::List(v.iter().map(|s| RawParam::Str(s.clone())).collect())
            }
            ParamValue::Json(v) => RawParam::Json(v.clone()),
        }
    }
}

static_regex!(positive_int_re, r"^[1-9]\d*$");
static_regex!(int_re, r"^-?\d+$");
static_regex!(float_re, r"^-?(\d+(\.\d+)?|\.\d+)$");
static_regex!(date_ymd_re, r"^\d\d\d\d(-\d\d?){0,2}$");
static_regex!(date_md_re, r"^\d\d?(-\d\d?)?$");
static_regex!(time_re, r"^\d\d\d\d(-\d\d?){0,5}$");

/// Validate one raw value. `Ok(None)` means the value is blank and the
/// parameter should be treated as absent.
pub fn validate(spec: &ParamSpec, raw: &RawParam) -> QueryResult<Option<ParamValue>> {
    if raw.is_null() {
        return Ok(None);
    }
    let name = spec.name;
    let value = match spec.kind {
        ParamKind::Id(_) | ParamKind::AnyId | ParamKind::QueryRef => ParamValue::Int(validate_id(name, raw)?),
        ParamKind::IdSet(_) => ParamValue::IntList(
            as_list(raw)
                .iter()
                .map(|item| validate_id(name, item))
                .collect::<QueryResult<Vec<_>>>()?,
        ),
        ParamKind::Int => ParamValue::Int(validate_int(name, raw)?),
        ParamKind::IntRange => ParamValue::IntList(range_of(name, raw, validate_int)?),
        ParamKind::Float => ParamValue::Float(validate_float(name, raw)?),
        ParamKind::FloatRange => ParamValue::FloatList(range_of(name, raw, validate_float)?),
        ParamKind::Str => ParamValue::Str(validate_string(name, raw)?),
        ParamKind::StrList | ParamKind::Text => ParamValue::StrList(
            as_list(raw)
                .iter()
                .map(|item| validate_string(name, item))
                .collect::<QueryResult<Vec<_>>>()?,
        ),
        ParamKind::Bool => ParamValue::Bool(validate_bool(name, raw)?),
        ParamKind::Enum(allowed) => ParamValue::Str(validate_enum(name, raw, allowed)?),
        ParamKind::Date => ParamValue::StrList(range_of(name, raw, validate_date)?),
        ParamKind::Time => ParamValue::StrList(range_of(name, raw, validate_time)?),
        ParamKind::JoinTree => ParamValue::Json(validate_join(name, raw)?),
        ParamKind::Clause => ParamValue::Str(validate_clause(name, raw)?),
    };
    Ok(Some(value))
}

fn as_list(raw: &RawParam) -> Vec<RawParam> {
    match raw {
        RawParam::List(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn range_of<T>(
    name: &str,
    raw: &RawParam,
    item: fn(&str, &RawParam) -> QueryResult<T>,
) -> QueryResult<Vec<T>> {
    let items = as_list(raw);
    if items.len() > 2 {
        return Err(QueryError::bad_value(
            name,
            format!("should be a range of at most two values, got: {}", raw.describe()),
        ));
    }
    items.iter().map(|v| item(name, v)).collect()
}

fn validate_id(name: &str, raw: &RawParam) -> QueryResult<i64> {
    match raw {
        RawParam::Entity { id, .. } if *id > 0 => Ok(*id),
        RawParam::Int(i) if *i > 0 => Ok(*i),
        RawParam::Str(s) | RawParam::Sym(s) if positive_int_re().is_match(s) => s
            .parse()
            .map_err(|_| QueryError::bad_value(name, format!("should be an id, got: {:?}", s))),
        other => Err(QueryError::bad_value(
            name,
            format!("should be an id or object, got: {}", other.describe()),
        )),
    }
}

fn validate_int(name: &str, raw: &RawParam) -> QueryResult<i64> {
    match raw {
        RawParam::Int(i) => Ok(*i),
        RawParam::Str(s) if int_re().is_match(s) => s
            .parse()
            .map_err(|_| QueryError::bad_value(name, format!("should be an integer, got: {:?}", s))),
        other => Err(QueryError::bad_value(
            name,
            format!("should be an integer, got: {}", other.describe()),
        )),
    }
}

fn validate_float(name: &str, raw: &RawParam) -> QueryResult<f64> {
    match raw {
        RawParam::Int(i) => Ok(*i as f64),
        RawParam::Float(f) => Ok(*f),
        RawParam::Str(s) if float_re().is_match(s) => s
            .parse()
            .map_err(|_| QueryError::bad_value(name, format!("should be a number, got: {:?}", s))),
        other => Err(QueryError::bad_value(
            name,
            format!("should be a number, got: {}", other.describe()),
        )),
    }
}

fn validate_string(name: &str, raw: &RawParam) -> QueryResult<String> {
    match raw {
        RawParam::Str(s) | RawParam::Sym(s) => Ok(s.clone()),
        RawParam::Int(i) => Ok(i.to_string()),
        RawParam::Float(f) => Ok(f.to_string()),
        other => Err(QueryError::bad_value(
            name,
            format!("should be a string, got: {}", other.describe()),
        )),
    }
}

fn validate_bool(name: &str, raw: &RawParam) -> QueryResult<bool> {
    let parsed = match raw {
        RawParam::Bool(b) => Some(*b),
        RawParam::Int(0) => Some(false),
        RawParam::Int(1) => Some(true),
        RawParam::Sym(s) => match s.as_str() {
            "yes" | "true" => Some(true),
            "no" | "false" => Some(false),
            _ => None,
        },
        RawParam::Str(s) => match s.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.ok_or_else(|| {
        QueryError::bad_value(name, format!("should be boolean, got: {}", raw.describe()))
    })
}

fn validate_enum(name: &str, raw: &RawParam, allowed: &[&str]) -> QueryResult<String> {
    let value = match raw {
        RawParam::Str(s) | RawParam::Sym(s) => s.as_str(),
        other => return Err(QueryError::not_in_allowed_set(name, other.describe(), allowed)),
    };
    if allowed.contains(&value) {
        Ok(value.to_string())
    } else {
        Err(QueryError::not_in_allowed_set(name, value, allowed))
    }
}

fn validate_date(name: &str, raw: &RawParam) -> QueryResult<String> {
    let text = match raw {
        RawParam::Null => return Ok(String::new()),
        RawParam::Int(i) => i.to_string(),
        RawParam::Str(s) | RawParam::Sym(s) => s.trim().to_string(),
        other => {
            return Err(QueryError::bad_value(
                name,
                format!("should be a date (YYYY-MM-DD or MM-DD), got: {}", other.describe()),
            ))
        }
    };
    if text.is_empty() || text == "0" {
        Ok(String::new())
    } else if date_ymd_re().is_match(&text) || date_md_re().is_match(&text) {
        Ok(text)
    } else {
        Err(QueryError::bad_value(
            name,
            format!("should be a date (YYYY-MM-DD or MM-DD), got: {:?}", text),
        ))
    }
}

fn validate_time(name: &str, raw: &RawParam) -> QueryResult<String> {
    let text = match raw {
        RawParam::Null => return Ok(String::new()),
        RawParam::Int(i) => i.to_string(),
        RawParam::Str(s) | RawParam::Sym(s) => s.trim().to_string(),
        other => {
            return Err(QueryError::bad_value(
                name,
                format!("should be a time (YYYY-MM-DD-HH-MM-SS), got: {}", other.describe()),
            ))
        }
    };
    if text.is_empty() || text == "0" {
        Ok(String::new())
    } else if time_re().is_match(&text) {
        Ok(text)
    } else {
        Err(QueryError::bad_value(
            name,
            format!("should be a time (YYYY-MM-DD-HH-MM-SS), got: {:?}", text),
        ))
    }
}

fn validate_join(name: &str, raw: &RawParam) -> QueryResult<Value> {
    let json = raw.to_json();
    let trees = JoinTree::from_json(&json).map_err(|e| QueryError::bad_value(name, e.to_string()))?;
    Ok(Value::Array(trees.iter().map(JoinTree::to_json).collect()))
}

fn validate_clause(name: &str, raw: &RawParam) -> QueryResult<String> {
    match raw {
        RawParam::Str(s) | RawParam::Sym(s) => Ok(s.clone()),
        other => Err(QueryError::bad_value(
            name,
            format!("should be a single string, got: {}", other.describe()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryErrorCode;
    use serde_json::json;

    fn check(kind: ParamKind, raw: RawParam) -> QueryResult<Option<ParamValue>> {
        validate(&ParamSpec::optional("p", kind), &raw)
    }

    #[test]
    fn test_id_accepts_entities_ints_and_numeric_strings() {
        let kind = ParamKind::Id(ModelKind::User);
        assert_eq!(check(kind, RawParam::Int(3)).unwrap(), Some(ParamValue::Int(3)));
        assert_eq!(check(kind, "12".into()).unwrap(), Some(ParamValue::Int(12)));
        assert_eq!(
            check(kind, RawParam::entity(ModelKind::User, 5)).unwrap(),
            Some(ParamValue::Int(5))
        );
        for bad in [RawParam::from("012"), RawParam::from("abc"), RawParam::Int(0), RawParam::Bool(true)] {
            let err = check(kind, bad).unwrap_err();
            assert_eq!(err.code(), QueryErrorCode::BadValue);
            assert_eq!(err.param(), Some("p"));
        }
    }

    #[test]
    fn test_id_set_keeps_order_and_duplicates() {
        let raw = RawParam::List(vec![
            RawParam::Int(3),
            RawParam::from("1"),
            RawParam::entity(ModelKind::Name, 3),
        ]);
        assert_eq!(
            check(ParamKind::IdSet(None), raw).unwrap(),
            Some(ParamValue::IntList(vec![3, 1, 3]))
        );
        assert_eq!(
            check(ParamKind::IdSet(None), RawParam::Int(9)).unwrap(),
            Some(ParamValue::IntList(vec![9]))
        );
    }

    #[test]
    fn test_boolean_forms() {
        for yes in [
            RawParam::Bool(true),
            RawParam::from("TRUE"),
            RawParam::from("Yes"),
            RawParam::from("on"),
            RawParam::Int(1),
            RawParam::from("1"),
            RawParam::sym("yes"),
        ] {
            assert_eq!(check(ParamKind::Bool, yes).unwrap(), Some(ParamValue::Bool(true)));
        }
        for no in [RawParam::from("false"), RawParam::from("NO"), RawParam::Int(0), RawParam::sym("no")] {
            assert_eq!(check(ParamKind::Bool, no).unwrap(), Some(ParamValue::Bool(false)));
        }
        assert!(check(ParamKind::Bool, RawParam::from("maybe")).is_err());
        assert!(check(ParamKind::Bool, RawParam::Int(2)).is_err());
    }

    #[test]
    fn test_enum_rejection_is_its_own_code() {
        let kind = ParamKind::Enum(&["no", "all", "exclusive"]);
        assert_eq!(check(kind, RawParam::sym("all")).unwrap(), Some(ParamValue::Str("all".into())));
        assert_eq!(check(kind, "exclusive".into()).unwrap(), Some(ParamValue::Str("exclusive".into())));
        let err = check(kind, "some".into()).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::NotInAllowedSet);
        assert_eq!(err.allowed().len(), 3);
    }

    #[test]
    fn test_text_and_join_become_lists() {
        assert_eq!(
            check(ParamKind::Text, "names.id > 3".into()).unwrap(),
            Some(ParamValue::StrList(vec!["names.id > 3".into()]))
        );
        assert_eq!(
            check(ParamKind::JoinTree, "names".into()).unwrap(),
            Some(ParamValue::Json(json!(["names"])))
        );
        assert_eq!(
            check(ParamKind::JoinTree, RawParam::Json(json!({"observations": "names"}))).unwrap(),
            Some(ParamValue::Json(json!([{"observations": "names"}])))
        );
    }

    #[test]
    fn test_clause_rejects_lists() {
        assert!(check(ParamKind::Clause, "names.id ASC".into()).is_ok());
        let err = check(ParamKind::Clause, RawParam::from(vec!["a", "b"])).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::BadValue);
        assert!(check(ParamKind::Clause, RawParam::Bool(true)).is_err());
    }

    #[test]
    fn test_dates_and_times() {
        assert_eq!(
            check(ParamKind::Date, RawParam::from(vec!["2006-05", "0"])).unwrap(),
            Some(ParamValue::StrList(vec!["2006-05".into(), "".into()]))
        );
        assert!(check(ParamKind::Date, RawParam::from(vec!["3-12"])).is_ok());
        assert!(check(ParamKind::Date, RawParam::from("2006/05")).is_err());
        assert!(check(ParamKind::Date, RawParam::from(vec!["2001", "2002", "2003"])).is_err());
        assert!(check(ParamKind::Time, RawParam::from(vec!["2006-05-01-12-30"])).is_ok());
        assert!(check(ParamKind::Time, RawParam::from(vec!["05-01"])).is_err());
    }

    #[test]
    fn test_null_is_absent() {
        assert_eq!(check(ParamKind::Str, RawParam::Null).unwrap(), None);
    }

    #[test]
    fn test_default_comparison() {
        let spec = ParamSpec::with_default("all", ParamKind::Bool, DefaultValue::Bool(false));
        assert!(spec.is_default(&ParamValue::Bool(false)));
        assert!(!spec.is_default(&ParamValue::Bool(true)));
    }
}
