//! Directed join graph
//!
//! Each registered edge `(from, to)` names the column on `from` that points
//! at `to.id`. Lookups try the forward edge first and then the reverse one,
//! so the same table pair yields a different condition depending on which
//! side initiates the join.
//!
//! A target may carry an alias (`users.reviewer`) when one table references
//! another through more than one column. A trailing `!` on a join node asks
//! for a LEFT OUTER JOIN.

use serde_json::Value;
use thiserror::Error;

use super::models::ModelKind;

/// How two tables are linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinColumn {
    /// `<from>.<column> = <to>.id`
    Key(&'static str),
    /// `<from>.<prefix>_id = <to>.id AND <from>.<prefix>_type = '<Model>'`
    Polymorphic(&'static str),
}

const EDGES: &[(&str, &str, JoinColumn)] = &[
    ("comments", "location_descriptions", JoinColumn::Polymorphic("target")),
    ("comments", "locations", JoinColumn::Polymorphic("target")),
    ("comments", "name_descriptions", JoinColumn::Polymorphic("target")),
    ("comments", "names", JoinColumn::Polymorphic("target")),
    ("comments", "observations", JoinColumn::Polymorphic("target")),
    ("comments", "projects", JoinColumn::Polymorphic("target")),
    ("comments", "users", JoinColumn::Key("user_id")),
    ("images", "users", JoinColumn::Key("user_id")),
    ("images", "licenses", JoinColumn::Key("license_id")),
    ("images_observations", "images", JoinColumn::Key("image_id")),
    ("images_observations", "observations", JoinColumn::Key("observation_id")),
    ("interests", "locations", JoinColumn::Polymorphic("target")),
    ("interests", "names", JoinColumn::Polymorphic("target")),
    ("interests", "observations", JoinColumn::Polymorphic("target")),
    ("interests", "users", JoinColumn::Key("user_id")),
    ("location_descriptions", "locations", JoinColumn::Key("location_id")),
    ("location_descriptions", "users", JoinColumn::Key("user_id")),
    ("location_descriptions_admins", "location_descriptions", JoinColumn::Key("location_description_id")),
    ("location_descriptions_admins", "user_groups", JoinColumn::Key("user_group_id")),
    ("location_descriptions_authors", "location_descriptions", JoinColumn::Key("location_description_id")),
    ("location_descriptions_authors", "users", JoinColumn::Key("user_id")),
    ("location_descriptions_editors", "location_descriptions", JoinColumn::Key("location_description_id")),
    ("location_descriptions_editors", "users", JoinColumn::Key("user_id")),
    ("location_descriptions_readers", "location_descriptions", JoinColumn::Key("location_description_id")),
    ("location_descriptions_readers", "user_groups", JoinColumn::Key("user_group_id")),
    ("location_descriptions_versions", "location_descriptions", JoinColumn::Key("location_description_id")),
    ("location_descriptions_writers", "location_descriptions", JoinColumn::Key("location_description_id")),
    ("location_descriptions_writers", "user_groups", JoinColumn::Key("user_group_id")),
    ("locations", "licenses", JoinColumn::Key("license_id")),
    ("locations", "location_descriptions.default", JoinColumn::Key("description_id")),
    ("locations", "rss_logs", JoinColumn::Key("rss_log_id")),
    ("locations", "users", JoinColumn::Key("user_id")),
    ("locations_versions", "locations", JoinColumn::Key("location_id")),
    ("name_descriptions", "names", JoinColumn::Key("name_id")),
    ("name_descriptions", "users", JoinColumn::Key("user_id")),
    ("name_descriptions_admins", "name_descriptions", JoinColumn::Key("name_description_id")),
    ("name_descriptions_admins", "user_groups", JoinColumn::Key("user_group_id")),
    ("name_descriptions_authors", "name_descriptions", JoinColumn::Key("name_description_id")),
    ("name_descriptions_authors", "users", JoinColumn::Key("user_id")),
    ("name_descriptions_editors", "name_descriptions", JoinColumn::Key("name_description_id")),
    ("name_descriptions_editors", "users", JoinColumn::Key("user_id")),
    ("name_descriptions_readers", "name_descriptions", JoinColumn::Key("name_description_id")),
    ("name_descriptions_readers", "user_groups", JoinColumn::Key("user_group_id")),
    ("name_descriptions_versions", "name_descriptions", JoinColumn::Key("name_description_id")),
    ("name_descriptions_writers", "name_descriptions", JoinColumn::Key("name_description_id")),
    ("name_descriptions_writers", "user_groups", JoinColumn::Key("user_group_id")),
    ("names", "licenses", JoinColumn::Key("license_id")),
    ("names", "name_descriptions.default", JoinColumn::Key("description_id")),
    ("names", "rss_logs", JoinColumn::Key("rss_log_id")),
    ("names", "users", JoinColumn::Key("user_id")),
    ("names", "users.reviewer", JoinColumn::Key("reviewer_id")),
    ("names_versions", "names", JoinColumn::Key("name_id")),
    ("namings", "names", JoinColumn::Key("name_id")),
    ("namings", "observations", JoinColumn::Key("observation_id")),
    ("namings", "users", JoinColumn::Key("user_id")),
    ("notifications", "names", JoinColumn::Polymorphic("target")),
    ("notifications", "users", JoinColumn::Key("user_id")),
    ("observations", "locations", JoinColumn::Key("location_id")),
    ("observations", "names", JoinColumn::Key("name_id")),
    ("observations", "rss_logs", JoinColumn::Key("rss_log_id")),
    ("observations", "users", JoinColumn::Key("user_id")),
    ("observations", "images.thumb_image", JoinColumn::Key("thumb_image_id")),
    ("observations_species_lists", "observations", JoinColumn::Key("observation_id")),
    ("observations_species_lists", "species_lists", JoinColumn::Key("species_list_id")),
    ("projects", "rss_logs", JoinColumn::Key("rss_log_id")),
    ("projects_observations", "observations", JoinColumn::Key("observation_id")),
    ("projects_observations", "projects", JoinColumn::Key("project_id")),
    ("projects", "users", JoinColumn::Key("user_id")),
    ("projects", "user_groups", JoinColumn::Key("user_group_id")),
    ("projects", "user_groups.admin_group", JoinColumn::Key("admin_group_id")),
    ("rss_logs", "locations", JoinColumn::Key("location_id")),
    ("rss_logs", "names", JoinColumn::Key("name_id")),
    ("rss_logs", "observations", JoinColumn::Key("observation_id")),
    ("rss_logs", "species_lists", JoinColumn::Key("species_list_id")),
    ("species_lists", "locations", JoinColumn::Key("location_id")),
    ("species_lists", "rss_logs", JoinColumn::Key("rss_log_id")),
    ("species_lists", "users", JoinColumn::Key("user_id")),
    ("user_groups_users", "user_groups", JoinColumn::Key("user_group_id")),
    ("user_groups_users", "users", JoinColumn::Key("user_id")),
    ("users", "images", JoinColumn::Key("image_id")),
    ("users", "licenses", JoinColumn::Key("license_id")),
    ("users", "locations", JoinColumn::Key("location_id")),
    ("votes", "namings", JoinColumn::Key("naming_id")),
    ("votes", "observations", JoinColumn::Key("observation_id")),
    ("votes", "users", JoinColumn::Key("user_id")),
];

/// Join resolution failures. All of them are programming errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("Don't know how to join from {from} to {to}")]
    UnknownEdge { from: String, to: String },

    #[error("Don't know the table '{0}'")]
    UnknownTable(String),

    #[error("Malformed join tree: {0}")]
    Malformed(String),
}

/// A node of a join tree, parsed from the `join` parameter.
///
/// The JSON form mirrors how callers write association paths:
/// `"names"`, `["locations!", "names"]` or
/// `{"images_observations": {"observations": "names"}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinTree {
    Leaf(String),
    Branch(String, Vec<JoinTree>),
}

impl JoinTree {
    pub fn leaf(name: impl Into<String>) -> Self {
        JoinTree::Leaf(name.into())
    }

    pub fn branch(name: impl Into<String>, children: Vec<JoinTree>) -> Self {
        JoinTree::Branch(name.into(), children)
    }

    /// `a -> b -> c` as nested single-child branches.
    pub fn path(names: &[&str]) -> Self {
        match names {
            [] => JoinTree::Leaf(String::new()),
            [last] => JoinTree::leaf(*last),
            [first, rest @ ..] => JoinTree::branch(*first, vec![JoinTree::path(rest)]),
        }
    }

    /// Parse one JSON value into a list of sibling nodes.
    pub fn from_json(value: &Value) -> Result<Vec<JoinTree>, JoinError> {
        match value {
            Value::String(s) if !s.is_empty() => Ok(vec![JoinTree::Leaf(s.clone())]),
            Value::Array(items) => {
                let mut nodes = Vec::new();
                for item in items {
                    nodes.extend(JoinTree::from_json(item)?);
                }
                Ok(nodes)
            }
            Value::Object(map) => {
                let mut nodes = Vec::new();
                for (key, child) in map {
                    nodes.push(JoinTree::Branch(key.clone(), JoinTree::from_json(child)?));
                }
                Ok(nodes)
            }
            other => Err(JoinError::Malformed(other.to_string())),
        }
    }

    /// Inverse of [`JoinTree::from_json`] for a single node.
    pub fn to_json(&self) -> Value {
        match self {
            JoinTree::Leaf(name) => Value::String(name.clone()),
            JoinTree::Branch(name, children) => {
                let child = if children.len() == 1 {
                    children[0].to_json()
                } else {
                    Value::Array(children.iter().map(JoinTree::to_json).collect())
                };
                let mut map = serde_json::Map::new();
                map.insert(name.clone(), child);
                Value::Object(map)
            }
        }
    }

    fn name(&self) -> &str {
        match self {
            JoinTree::Leaf(name) | JoinTree::Branch(name, _) => name,
        }
    }
}

/// One resolved `JOIN` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJoin {
    pub table: String,
    pub outer: bool,
    pub conditions: Vec<String>,
}

impl ResolvedJoin {
    pub fn to_sql(&self) -> String {
        let kind = if self.outer { "LEFT OUTER JOIN" } else { "JOIN" };
        format!("{} `{}` ON {}", kind, self.table, self.conditions.join(" AND "))
    }
}

/// The static join graph.
pub struct JoinGraph;

impl JoinGraph {
    /// Column linking `from` to `to`, in the registered direction only.
    pub fn edge(from: &str, to: &str) -> Option<JoinColumn> {
        EDGES
            .iter()
            .find(|(f, t, _)| *f == from && *t == to)
            .map(|(_, _, col)| *col)
    }

    /// Whether `table` appears anywhere in the graph.
    pub fn is_known_table(table: &str) -> bool {
        EDGES
            .iter()
            .any(|(f, t, _)| *f == table || strip_alias(t) == table)
    }

    /// Conditions joining `from` to `to`. `to` may carry an alias.
    pub fn condition(from: &str, to: &str) -> Result<Vec<String>, JoinError> {
        let (owner, target, col) = if let Some(col) = Self::edge(from, to) {
            (from, strip_alias(to), col)
        } else if let Some(col) = Self::edge(to, from) {
            (strip_alias(to), from, col)
        } else {
            return Err(JoinError::UnknownEdge {
                from: from.to_string(),
                to: to.to_string(),
            });
        };

        Ok(match col {
            JoinColumn::Key(column) => vec![format!("{}.{} = {}.id", owner, column, target)],
            JoinColumn::Polymorphic(prefix) => {
                let type_name = ModelKind::from_table(target)
                    .map(|m| m.as_str().to_string())
                    .ok_or_else(|| JoinError::UnknownTable(target.to_string()))?;
                vec![
                    format!("{}.{}_id = {}.id", owner, prefix, target),
                    format!("{}.{}_type = '{}'", owner, prefix, type_name),
                ]
            }
        })
    }

    /// Walk join trees depth-first starting from `base`, producing one JOIN
    /// per distinct table in first-seen order. A table reached twice keeps
    /// its first position and gains any new conditions.
    pub fn resolve(base: &str, trees: &[JoinTree]) -> Result<Vec<ResolvedJoin>, JoinError> {
        let mut joins: Vec<ResolvedJoin> = Vec::new();
        for tree in trees {
            Self::walk(base, tree, &mut joins)?;
        }
        joins.retain(|j| j.table != base);
        Ok(joins)
    }

    fn walk(from: &str, node: &JoinTree, joins: &mut Vec<ResolvedJoin>) -> Result<(), JoinError> {
        let raw = node.name();
        let (name, outer) = match raw.strip_suffix('!') {
            Some(stripped) => (stripped, true),
            None => (raw, false),
        };
        if name.is_empty() {
            return Err(JoinError::Malformed(raw.to_string()));
        }
        let table = strip_alias(name);
        let conditions = Self::condition(from, name)?;

        match joins.iter_mut().find(|j| j.table == table) {
            Some(existing) => {
                for cond in conditions {
                    if !existing.conditions.contains(&cond) {
                        existing.conditions.push(cond);
                    }
                }
            }
            None => joins.push(ResolvedJoin {
                table: table.to_string(),
                outer,
                conditions,
            }),
        }

        if let JoinTree::Branch(_, children) = node {
            for child in children {
                Self::walk(table, child, joins)?;
            }
        }
        Ok(())
    }
}

/// `users.reviewer` -> `users`
pub fn strip_alias(name: &str) -> &str {
    match name.find('.') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_forward_and_reverse_edges_differ() {
        assert_eq!(
            JoinGraph::condition("observations", "names").unwrap(),
            vec!["observations.name_id = names.id"]
        );
        assert_eq!(
            JoinGraph::condition("names", "observations").unwrap(),
            vec!["observations.name_id = names.id"]
        );
        assert_eq!(
            JoinGraph::condition("observations", "rss_logs").unwrap(),
            vec!["observations.rss_log_id = rss_logs.id"]
        );
        assert_eq!(
            JoinGraph::condition("rss_logs", "observations").unwrap(),
            vec!["rss_logs.observation_id = observations.id"]
        );
    }

    #[test]
    fn test_alias_edge() {
        assert_eq!(
            JoinGraph::condition("names", "users.reviewer").unwrap(),
            vec!["names.reviewer_id = users.id"]
        );
    }

    #[test]
    fn test_polymorphic_edge() {
        assert_eq!(
            JoinGraph::condition("observations", "comments").unwrap(),
            vec![
                "comments.target_id = observations.id".to_string(),
                "comments.target_type = 'Observation'".to_string(),
            ]
        );
    }

    #[test]
    fn test_unknown_edge() {
        let err = JoinGraph::condition("names", "votes").unwrap_err();
        assert!(matches!(err, JoinError::UnknownEdge { .. }));
    }

    #[test]
    fn test_resolve_nested_tree() {
        let trees =
            JoinTree::from_json(&json!({"images_observations": {"observations": ["locations!", "names"]}}))
                .unwrap();
        let joins = JoinGraph::resolve("images", &trees).unwrap();
        let sql: Vec<String> = joins.iter().map(ResolvedJoin::to_sql).collect();
        assert_eq!(
            sql,
            vec![
                "JOIN `images_observations` ON images_observations.image_id = images.id",
                "JOIN `observations` ON images_observations.observation_id = observations.id",
                "LEFT OUTER JOIN `locations` ON observations.location_id = locations.id",
                "JOIN `names` ON observations.name_id = names.id",
            ]
        );
    }

    #[test]
    fn test_resolve_dedups_tables() {
        let trees = JoinTree::from_json(&json!([
            {"images_observations": "observations"},
            {"images_observations": {"observations": "names"}}
        ]))
        .unwrap();
        let joins = JoinGraph::resolve("images", &trees).unwrap();
        let tables: Vec<&str> = joins.iter().map(|j| j.table.as_str()).collect();
        assert_eq!(tables, vec!["images_observations", "observations", "names"]);
    }

    #[test]
    fn test_tree_json_round_trip() {
        let value = json!({"observations": ["locations!", "names"]});
        let trees = JoinTree::from_json(&value).unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].to_json(), value);
    }

    #[test]
    fn test_malformed_tree() {
        assert!(JoinTree::from_json(&json!(42)).is_err());
        assert!(JoinTree::from_json(&json!("")).is_err());
    }

    #[test]
    fn test_path_builder() {
        assert_eq!(
            JoinTree::path(&["images_observations", "observations", "names"]).to_json(),
            json!({"images_observations": {"observations": "names"}})
        );
        assert_eq!(
            JoinGraph::condition("observations", "projects_observations").unwrap(),
            vec!["projects_observations.observation_id = observations.id"]
        );
    }

    #[test]
    fn test_known_tables() {
        assert!(JoinGraph::is_known_table("observations_species_lists"));
        assert!(JoinGraph::is_known_table("users"));
        assert!(!JoinGraph::is_known_table("bogus"));
    }
}
