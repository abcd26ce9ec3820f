//! Query descriptors
//!
//! A descriptor is the validated `(model, flavor, params)` triple. Its
//! serialized form is canonical (sorted keys, defaults dropped), which is
//! what makes it usable as the dedup key of the persisted store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::args::{QueryArgs, RawParam};
use super::errors::{QueryError, QueryResult};
use super::params::{self, ParamValue};
use super::registry::{self, Flavor};
use crate::schema::ModelKind;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    model: ModelKind,
    flavor: Flavor,
    params: BTreeMap<String, ParamValue>,
}

#[derive(Serialize)]
struct BlobRef<'a> {
    model: ModelKind,
    flavor: &'a str,
    params: &'a BTreeMap<String, ParamValue>,
}

#[derive(Deserialize)]
struct Blob {
    model: ModelKind,
    flavor: String,
    #[serde(default)]
    params: serde_json::Map<String, Value>,
}

impl QueryDescriptor {
    /// Validate and normalize caller arguments.
    ///
    /// `default` (or an empty string) picks the model's default flavor.
    /// Optional params equal to their declared default are dropped, so
    /// spelling a default out does not create a distinct query.
    pub fn build(model: ModelKind, flavor: &str, args: &QueryArgs) -> QueryResult<Self> {
        let flavor = resolve_flavor(model, flavor)?;
        let context = format!("{} :{}", model, flavor);
        let specs = registry::param_specs(model, flavor);

        let mut normalized = BTreeMap::new();
        for (name, raw) in args.iter() {
            let spec = specs
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| QueryError::unknown_param(&context, name))?;
            let value = match params::validate(spec, raw)? {
                Some(value) => value,
                None => continue,
            };
            if spec.is_default(&value) {
                continue;
            }
            normalized.insert(name.to_string(), value);
        }

        if let Some(missing) = specs
            .iter()
            .find(|s| s.required && !normalized.contains_key(s.name))
        {
            return Err(QueryError::missing_param(&context, missing.name));
        }

        Ok(Self {
            model,
            flavor,
            params: normalized,
        })
    }

    /// Rebuild a descriptor from its serialized form.
    pub fn from_blob(blob: &str) -> QueryResult<Self> {
        let parsed: Blob = serde_json::from_str(blob).map_err(|e| {
            QueryError::bad_declaration(format!("Unreadable query descriptor: {}", e))
        })?;
        let mut args = QueryArgs::new();
        for (name, value) in parsed.params {
            args.insert(name, RawParam::from(value));
        }
        Self::build(parsed.model, &parsed.flavor, &args)
    }

    /// Canonical serialized form; the store's dedup key.
    pub fn serialize(&self) -> QueryResult<String> {
        serde_json::to_string(&BlobRef {
            model: self.model,
            flavor: self.flavor.as_str(),
            params: &self.params,
        })
        .map_err(|e| QueryError::bad_declaration(format!("Unserializable query descriptor: {}", e)))
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    /// Params as raw arguments, for deriving a related query.
    pub fn to_args(&self) -> QueryArgs {
        let mut args = QueryArgs::new();
        for (name, value) in &self.params {
            args.insert(name.clone(), value.to_raw());
        }
        args
    }

    pub fn has(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_int)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParamValue::as_bool)
    }

    pub fn get_int_list(&self, name: &str) -> Option<&[i64]> {
        self.get(name).and_then(ParamValue::as_int_list)
    }

    pub fn get_float_list(&self, name: &str) -> Option<&[f64]> {
        self.get(name).and_then(ParamValue::as_float_list)
    }

    pub fn get_str_list(&self, name: &str) -> Option<&[String]> {
        self.get(name).and_then(ParamValue::as_str_list)
    }

    pub fn get_json(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(ParamValue::as_json)
    }

    /// Required id param. Validation guarantees presence for declared
    /// required params, so a miss here means a flavor read the wrong name.
    pub fn require_int(&self, name: &str) -> QueryResult<i64> {
        self.get_int(name)
            .ok_or_else(|| QueryError::missing_param(format!("{} :{}", self.model, self.flavor), name))
    }

    pub fn require_str(&self, name: &str) -> QueryResult<&str> {
        self.get_str(name)
            .ok_or_else(|| QueryError::missing_param(format!("{} :{}", self.model, self.flavor), name))
    }

    /// Whether any param injects raw SQL.
    pub fn has_raw_sql(&self) -> bool {
        registry::RAW_SQL_PARAMS.iter().any(|p| self.has(p))
    }
}

fn resolve_flavor(model: ModelKind, flavor: &str) -> QueryResult<Flavor> {
    let flavor = flavor.strip_prefix(':').unwrap_or(flavor);
    let resolved = if flavor.is_empty() || flavor == "default" {
        registry::default_flavor(model)
    } else {
        flavor
            .parse::<Flavor>()
            .map_err(|_| QueryError::unknown_flavor(model, flavor))?
    };
    if !registry::is_allowed(model, resolved) {
        return Err(QueryError::unknown_flavor(model, resolved.as_str()));
    }
    Ok(resolved)
}
