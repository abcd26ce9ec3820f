//! Domain lookups
//!
//! The query engine does not own the domain models. Whenever it needs to
//! resolve a display string to an id or walk the taxonomy, it asks a
//! [`Directory`]. [`SqlDirectory`] answers over any [`SqlBackend`];
//! [`MemDirectory`] keeps a handful of rows in memory for tests and
//! offline tools.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::backend::{value_as_i64, BackendResult, SqlBackend};

use super::models::ModelKind;

/// Text name of the placeholder name used for unidentified observations.
pub const UNKNOWN_NAME: &str = "Fungi";

const RANKS_ABOVE_GENUS: &[&str] = &["Family", "Order", "Class", "Phylum", "Kingdom", "Domain", "Group"];

/// The columns of a name the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    pub id: i64,
    pub text_name: String,
    pub rank: String,
    pub synonym_id: Option<i64>,
    pub correct_spelling_id: Option<i64>,
}

impl NameRecord {
    pub fn is_above_genus(&self) -> bool {
        RANKS_ABOVE_GENUS.contains(&self.rank.as_str())
    }

    pub fn is_genus(&self) -> bool {
        self.rank == "Genus"
    }

    /// Proper ancestors implied by the binomial syntax, nearest first:
    /// `Agaricus campestris var. foo` -> `Agaricus campestris`, `Agaricus`.
    fn syntactic_parents(&self) -> Vec<String> {
        let words: Vec<&str> = self
            .text_name
            .split_whitespace()
            .filter(|w| !w.ends_with('.'))
            .collect();
        let mut parents = Vec::new();
        for len in (1..words.len()).rev() {
            parents.push(words[..len].join(" "));
        }
        parents
    }
}

/// Entity lookups the engine delegates to the domain.
pub trait Directory: Send + Sync {
    /// Whether a row with this id exists.
    fn exists(&self, model: ModelKind, id: i64) -> BackendResult<bool>;

    /// Ids of every row whose `column` equals `value`, ignoring case.
    fn find_ids_by(&self, model: ModelKind, column: &str, value: &str) -> BackendResult<Vec<i64>>;

    /// First id whose `column` equals `value`, ignoring case.
    fn find_id_by(&self, model: ModelKind, column: &str, value: &str) -> BackendResult<Option<i64>> {
        Ok(self.find_ids_by(model, column, value)?.into_iter().next())
    }

    fn name_record(&self, id: i64) -> BackendResult<Option<NameRecord>>;

    /// Ids of all names sharing this name's synonym group, itself included.
    fn name_synonym_ids(&self, id: i64) -> BackendResult<Vec<i64>>;

    /// Ids of names recorded as misspellings of this name.
    fn name_misspelling_ids(&self, id: i64) -> BackendResult<Vec<i64>>;

    /// Immediate children, or every descendant when `all` is set.
    fn name_children(&self, id: i64, all: bool) -> BackendResult<Vec<i64>>;

    /// Immediate parent, or every ancestor when `all` is set.
    fn name_parents(&self, id: i64, all: bool) -> BackendResult<Vec<i64>>;

    /// Id of the placeholder name, if the table has one.
    fn unknown_name_id(&self) -> BackendResult<Option<i64>> {
        self.find_id_by(ModelKind::Name, "text_name", UNKNOWN_NAME)
    }
}

fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Directory backed by plain SELECT statements.
pub struct SqlDirectory {
    backend: Arc<dyn SqlBackend>,
}

impl SqlDirectory {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }

    fn ids_where(&self, table: &str, condition: &str) -> BackendResult<Vec<i64>> {
        self.backend
            .select_ids(&format!("SELECT {table}.id FROM `{table}` WHERE {condition}"))
    }
}

impl Directory for SqlDirectory {
    fn exists(&self, model: ModelKind, id: i64) -> BackendResult<bool> {
        let table = model.table_name();
        let sql = format!("SELECT {table}.id FROM `{table}` WHERE {table}.id = {id} LIMIT 1");
        Ok(self.backend.select_value(&sql)?.is_some())
    }

    fn find_ids_by(&self, model: ModelKind, column: &str, value: &str) -> BackendResult<Vec<i64>> {
        let table = model.table_name();
        self.ids_where(
            table,
            &format!("LOWER({table}.{column}) = LOWER({})", quote_literal(value)),
        )
    }

    fn name_record(&self, id: i64) -> BackendResult<Option<NameRecord>> {
        let sql = format!(
            "SELECT names.id, names.text_name, names.rank, names.synonym_id, \
             names.correct_spelling_id FROM `names` WHERE names.id = {id} LIMIT 1"
        );
        let row = match self.backend.select_one(&sql)? {
            Some(row) => row,
            None => return Ok(None),
        };
        let text = |col: &str| {
            row.get(col)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(Some(NameRecord {
            id: row.id().unwrap_or(id),
            text_name: text("text_name"),
            rank: text("rank"),
            synonym_id: row.get("synonym_id").and_then(value_as_i64),
            correct_spelling_id: row.get("correct_spelling_id").and_then(value_as_i64),
        }))
    }

    fn name_synonym_ids(&self, id: i64) -> BackendResult<Vec<i64>> {
        match self.name_record(id)? {
            Some(NameRecord {
                synonym_id: Some(synonym_id),
                ..
            }) => self.ids_where("names", &format!("names.synonym_id = {synonym_id}")),
            Some(_) => Ok(vec![id]),
            None => Ok(Vec::new()),
        }
    }

    fn name_misspelling_ids(&self, id: i64) -> BackendResult<Vec<i64>> {
        self.ids_where("names", &format!("names.correct_spelling_id = {id}"))
    }

    fn name_children(&self, id: i64, all: bool) -> BackendResult<Vec<i64>> {
        let name = match self.name_record(id)? {
            Some(name) => name,
            None => return Ok(Vec::new()),
        };
        let pattern = quote_literal(&format!("%{}%", name.text_name));
        if name.is_above_genus() {
            let mut condition = format!("names.classification LIKE {pattern}");
            if !all {
                condition.push_str(" AND names.rank = 'Genus'");
            }
            return self.ids_where("names", &condition);
        }
        let mut condition = format!(
            "names.text_name LIKE {}",
            quote_literal(&format!("{} %", name.text_name))
        );
        if !all {
            let depth = if name.is_genus() { "% %" } else { "% % %" };
            condition.push_str(&format!(
                " AND names.text_name NOT LIKE {}",
                quote_literal(&format!("{} {}", name.text_name, depth))
            ));
        }
        self.ids_where("names", &condition)
    }

    fn name_parents(&self, id: i64, all: bool) -> BackendResult<Vec<i64>> {
        let name = match self.name_record(id)? {
            Some(name) => name,
            None => return Ok(Vec::new()),
        };
        let mut parents = name.syntactic_parents();
        if !all {
            parents.truncate(1);
        }
        let mut ids = Vec::new();
        for parent in parents {
            ids.extend(self.find_ids_by(ModelKind::Name, "text_name", &parent)?);
        }
        Ok(ids)
    }
}

/// Directory over rows held in memory.
#[derive(Debug, Default)]
pub struct MemDirectory {
    rows: BTreeMap<ModelKind, BTreeMap<i64, BTreeMap<String, Value>>>,
}

impl MemDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) one row.
    pub fn insert(&mut self, model: ModelKind, id: i64, columns: &[(&str, Value)]) {
        let row = columns
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.rows.entry(model).or_default().insert(id, row);
    }

    /// Builder-style [`MemDirectory::insert`].
    pub fn with(mut self, model: ModelKind, id: i64, columns: &[(&str, Value)]) -> Self {
        self.insert(model, id, columns);
        self
    }

    /// Convenience for a name row.
    pub fn with_name(
        self,
        id: i64,
        text_name: &str,
        rank: &str,
        synonym_id: Option<i64>,
        correct_spelling_id: Option<i64>,
    ) -> Self {
        let opt = |v: Option<i64>| v.map(Value::from).unwrap_or(Value::Null);
        self.with(
            ModelKind::Name,
            id,
            &[
                ("text_name", Value::from(text_name)),
                ("search_name", Value::from(text_name)),
                ("rank", Value::from(rank)),
                ("synonym_id", opt(synonym_id)),
                ("correct_spelling_id", opt(correct_spelling_id)),
            ],
        )
    }

    fn names(&self) -> impl Iterator<Item = NameRecord> + '_ {
        self.rows
            .get(&ModelKind::Name)
            .into_iter()
            .flat_map(|rows| rows.iter())
            .map(|(id, row)| {
                let text = |col: &str| {
                    row.get(col)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                NameRecord {
                    id: *id,
                    text_name: text("text_name"),
                    rank: text("rank"),
                    synonym_id: row.get("synonym_id").and_then(value_as_i64),
                    correct_spelling_id: row.get("correct_spelling_id").and_then(value_as_i64),
                }
            })
    }

    fn classification(&self, id: i64) -> String {
        self.rows
            .get(&ModelKind::Name)
            .and_then(|rows| rows.get(&id))
            .and_then(|row| row.get("classification"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

impl Directory for MemDirectory {
    fn exists(&self, model: ModelKind, id: i64) -> BackendResult<bool> {
        Ok(self.rows.get(&model).map_or(false, |rows| rows.contains_key(&id)))
    }

    fn find_ids_by(&self, model: ModelKind, column: &str, value: &str) -> BackendResult<Vec<i64>> {
        let wanted = value.to_lowercase();
        Ok(self
            .rows
            .get(&model)
            .into_iter()
            .flat_map(|rows| rows.iter())
            .filter(|(_, row)| {
                row.get(column)
                    .and_then(Value::as_str)
                    .map_or(false, |v| v.to_lowercase() == wanted)
            })
            .map(|(id, _)| *id)
            .collect())
    }

    fn name_record(&self, id: i64) -> BackendResult<Option<NameRecord>> {
        Ok(self.names().find(|n| n.id == id))
    }

    fn name_synonym_ids(&self, id: i64) -> BackendResult<Vec<i64>> {
        match self.name_record(id)? {
            Some(NameRecord {
                synonym_id: Some(synonym_id),
                ..
            }) => Ok(self
                .names()
                .filter(|n| n.synonym_id == Some(synonym_id))
                .map(|n| n.id)
                .collect()),
            Some(_) => Ok(vec![id]),
            None => Ok(Vec::new()),
        }
    }

    fn name_misspelling_ids(&self, id: i64) -> BackendResult<Vec<i64>> {
        Ok(self
            .names()
            .filter(|n| n.correct_spelling_id == Some(id))
            .map(|n| n.id)
            .collect())
    }

    fn name_children(&self, id: i64, all: bool) -> BackendResult<Vec<i64>> {
        let name = match self.name_record(id)? {
            Some(name) => name,
            None => return Ok(Vec::new()),
        };
        if name.is_above_genus() {
            return Ok(self
                .names()
                .filter(|n| n.id != id && self.classification(n.id).contains(&name.text_name))
                .filter(|n| all || n.is_genus())
                .map(|n| n.id)
                .collect());
        }
        let prefix = format!("{} ", name.text_name);
        let max_words = if name.is_genus() { 2 } else { 3 };
        Ok(self
            .names()
            .filter(|n| n.text_name.starts_with(&prefix))
            .filter(|n| all || n.text_name.split_whitespace().count() <= max_words)
            .map(|n| n.id)
            .collect())
    }

    fn name_parents(&self, id: i64, all: bool) -> BackendResult<Vec<i64>> {
        let name = match self.name_record(id)? {
            Some(name) => name,
            None => return Ok(Vec::new()),
        };
        let mut parents = name.syntactic_parents();
        if !all {
            parents.truncate(1);
        }
        let mut ids = Vec::new();
        for parent in parents {
            ids.extend(self.find_ids_by(ModelKind::Name, "text_name", &parent)?);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Row, ScriptedBackend};
    use serde_json::json;

    fn taxonomy() -> MemDirectory {
        MemDirectory::new()
            .with_name(1, "Fungi", "Kingdom", None, None)
            .with_name(2, "Agaricus", "Genus", None, None)
            .with_name(3, "Agaricus campestris", "Species", Some(10), None)
            .with_name(4, "Agaricus campestras", "Species", None, Some(3))
            .with_name(5, "Psalliota campestris", "Species", Some(10), None)
            .with_name(6, "Agaricus campestris var. foo", "Variety", None, None)
            .with(ModelKind::User, 7, &[("login", json!("dick")), ("name", json!("Dick"))])
    }

    #[test]
    fn test_mem_find_is_case_insensitive() {
        let dir = taxonomy();
        assert_eq!(dir.find_id_by(ModelKind::User, "login", "DICK").unwrap(), Some(7));
        assert_eq!(dir.find_id_by(ModelKind::User, "login", "rolf").unwrap(), None);
        assert!(dir.exists(ModelKind::User, 7).unwrap());
        assert!(!dir.exists(ModelKind::Name, 7).unwrap());
    }

    #[test]
    fn test_mem_synonyms_and_misspellings() {
        let dir = taxonomy();
        assert_eq!(dir.name_synonym_ids(3).unwrap(), vec![3, 5]);
        assert_eq!(dir.name_synonym_ids(2).unwrap(), vec![2]);
        assert_eq!(dir.name_misspelling_ids(3).unwrap(), vec![4]);
    }

    #[test]
    fn test_mem_children_and_parents() {
        let dir = taxonomy();
        assert_eq!(dir.name_children(2, false).unwrap(), vec![3, 4]);
        assert_eq!(dir.name_children(2, true).unwrap(), vec![3, 4, 6]);
        assert_eq!(dir.name_parents(6, false).unwrap(), vec![3]);
        assert_eq!(dir.name_parents(6, true).unwrap(), vec![3, 2]);
        assert_eq!(dir.unknown_name_id().unwrap(), Some(1));
    }

    #[test]
    fn test_sql_directory_statements() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .rule(
                    &["FROM `names` WHERE names.id = 3"],
                    vec![Row::new()
                        .with("id", 3)
                        .with("text_name", "Agaricus campestris")
                        .with("rank", "Species")
                        .with("synonym_id", 10)
                        .with("correct_spelling_id", Value::Null)],
                )
                .ids(&["names.synonym_id = 10"], &[3, 5])
                .ids(&["LOWER(users.login) = LOWER('dick')"], &[7]),
        );
        let dir = SqlDirectory::new(backend.clone());

        assert_eq!(dir.find_id_by(ModelKind::User, "login", "dick").unwrap(), Some(7));
        assert_eq!(dir.name_synonym_ids(3).unwrap(), vec![3, 5]);
        let name = dir.name_record(3).unwrap().unwrap();
        assert_eq!(name.rank, "Species");
        assert!(!name.is_above_genus());
        assert!(backend.executed().iter().all(|sql| sql.starts_with("SELECT")));
    }

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal("it's"), "'it\\'s'");
    }
}
