//! Clause set and SQL rendering
//!
//! A [`ClauseSet`] is what a flavor initializer produces. Rendering merges
//! per-call [`SqlOverrides`] on top of it and never mutates the set.

use serde_json::Value;

use super::errors::{QueryError, QueryResult};
use crate::schema::{JoinGraph, JoinTree, ModelKind, ResolvedJoin};

/// Per-call replacement for the ORDER BY clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOverride {
    /// Use this order instead; an empty string drops ORDER BY
    Set(String),
    /// Flip every direction of the query's own order
    Reverse,
}

/// Per-call tweaks applied on top of a query's clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlOverrides {
    pub select: Option<String>,
    pub join: Vec<JoinTree>,
    pub tables: Vec<String>,
    pub where_: Vec<String>,
    pub group: Option<String>,
    pub order: Option<OrderOverride>,
    pub limit: Option<String>,
}

impl SqlOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn join(mut self, tree: JoinTree) -> Self {
        self.join.push(tree);
        self
    }

    pub fn where_(mut self, condition: impl Into<String>) -> Self {
        self.where_.push(condition.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(OrderOverride::Set(order.into()));
        self
    }

    pub fn reverse(mut self) -> Self {
        self.order = Some(OrderOverride::Reverse);
        self
    }

    pub fn limit(mut self, limit: impl Into<String>) -> Self {
        self.limit = Some(limit.into());
        self
    }
}

/// The SQL pieces of one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClauseSet {
    pub select: Option<String>,
    pub join: Vec<JoinTree>,
    pub tables: Vec<String>,
    pub where_: Vec<String>,
    pub group: Option<String>,
    pub order: String,
    pub limit: Option<String>,
}

impl ClauseSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_join(&mut self, tree: JoinTree) {
        self.join.push(tree);
    }

    /// Add joins given in the JSON tree notation.
    pub fn add_join_json(&mut self, value: &Value) -> QueryResult<()> {
        self.join.extend(JoinTree::from_json(value)?);
        Ok(())
    }

    pub fn add_where(&mut self, condition: impl Into<String>) {
        self.where_.push(condition.into());
    }

    /// Render a SELECT for `model` with `overrides` merged on top.
    pub fn to_sql(&self, model: ModelKind, overrides: &SqlOverrides) -> QueryResult<String> {
        let table = model.table_name();

        let select = overrides
            .select
            .clone()
            .or_else(|| self.select.clone())
            .unwrap_or_else(|| format!("DISTINCT {}.id", table));

        let mut from = vec![format!("`{}`", table)];
        for extra in self.tables.iter().chain(overrides.tables.iter()) {
            if !JoinGraph::is_known_table(extra) {
                return Err(QueryError::unknown_table(extra.clone()));
            }
            let quoted = format!("`{}`", extra);
            if !from.contains(&quoted) {
                from.push(quoted);
            }
        }

        let joins = self.resolve_joins(table, &overrides.join)?;

        let mut conditions: Vec<String> = Vec::new();
        for cond in self.where_.iter().chain(overrides.where_.iter()) {
            let cond = cond.trim();
            if cond.is_empty() {
                continue;
            }
            let cond = wrap_or(cond);
            if !conditions.contains(&cond) {
                conditions.push(cond);
            }
        }

        let group = overrides.group.clone().or_else(|| self.group.clone());

        let order = match &overrides.order {
            Some(OrderOverride::Set(order)) => order.clone(),
            Some(OrderOverride::Reverse) => reverse_order(&self.full_order(model)),
            None => self.full_order(model),
        };

        let limit = overrides.limit.clone().or_else(|| self.limit.clone());

        let mut sql = format!("SELECT {} FROM {}", select, from.join(", "));
        for join in &joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        if let Some(group) = group.filter(|g| !g.is_empty()) {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group);
        }
        if !order.trim().is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }
        if let Some(limit) = limit.filter(|l| !l.is_empty()) {
            sql.push_str(" LIMIT ");
            sql.push_str(&limit);
        }
        Ok(sql)
    }

    fn resolve_joins(&self, table: &str, extra: &[JoinTree]) -> QueryResult<Vec<ResolvedJoin>> {
        let trees: Vec<JoinTree> = self.join.iter().chain(extra.iter()).cloned().collect();
        Ok(JoinGraph::resolve(table, &trees)?)
    }

    /// The order with the id tiebreak appended, so results are
    /// deterministic. Empty orders stay empty.
    pub fn full_order(&self, model: ModelKind) -> String {
        let order = self.order.trim();
        if order.is_empty() {
            return String::new();
        }
        let last = split_top_level(order).pop().unwrap_or_default();
        if sorts_by_id(&last, model.table_name()) {
            order.to_string()
        } else {
            format!("{}, {}.id DESC", order, model.table_name())
        }
    }

    /// Sorted, distinct tables referenced by FROM and JOIN.
    pub fn tables_used(&self, model: ModelKind) -> QueryResult<Vec<String>> {
        let table = model.table_name();
        let mut tables: Vec<String> = vec![table.to_string()];
        tables.extend(self.tables.iter().cloned());
        tables.extend(self.resolve_joins(table, &[])?.into_iter().map(|j| j.table));
        tables.sort();
        tables.dedup();
        Ok(tables)
    }
}

/// Only the model's own id is unique; a joined table's id can repeat.
fn sorts_by_id(item: &str, table: &str) -> bool {
    let column = strip_direction(item).0;
    match column.strip_suffix(".id") {
        Some(prefix) => prefix == table || prefix == format!("`{}`", table),
        None => column == "id",
    }
}

/// `"names.text_name ASC"` -> `("names.text_name", Some("ASC"))`
fn strip_direction(item: &str) -> (&str, Option<&str>) {
    let item = item.trim();
    for dir in ["ASC", "DESC"] {
        if item.len() <= dir.len() {
            continue;
        }
        let split = item.len() - dir.len();
        if let (Some(head), Some(tail)) = (item.get(..split), item.get(split..)) {
            if tail.eq_ignore_ascii_case(dir) && head.ends_with(char::is_whitespace) {
                return (head.trim_end(), Some(dir));
            }
        }
    }
    (item, None)
}

/// Split on commas outside parentheses and quotes.
pub fn split_top_level(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => {
                escaped = true;
                current.push(c);
            }
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '\'') | (None, '"') | (None, '`') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '(') => {
                depth += 1;
                current.push(c);
            }
            (None, ')') => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (None, ',') if depth == 0 => {
                items.push(current.trim().to_string());
                current.clear();
            }
            (None, c) => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }
    items
}

/// Whether `cond` has an `OR` outside parentheses and quotes.
fn has_top_level_or(cond: &str) -> bool {
    let bytes = cond.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b' ' if depth == 0 => {
                    let rest = &bytes[i + 1..];
                    if rest.len() > 3
                        && rest[..2].eq_ignore_ascii_case(b"OR")
                        && rest[2] == b' '
                    {
                        return true;
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    false
}

/// Parenthesize a condition whose OR would otherwise bind across the
/// surrounding ANDs.
fn wrap_or(cond: &str) -> String {
    if has_top_level_or(cond) {
        format!("({})", cond)
    } else {
        cond.to_string()
    }
}

/// Flip ASC and DESC on every top-level item of an ORDER BY. An item with
/// no direction sorts ASC, so it becomes DESC.
pub fn reverse_order(order: &str) -> String {
    split_top_level(order)
        .iter()
        .map(|item| match strip_direction(item) {
            (column, Some(dir)) if dir == "ASC" => format!("{} DESC", column),
            (column, Some(_)) => format!("{} ASC", column),
            (column, None) => format!("{} DESC", column),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Comma-joined ids for an `IN (...)` list. Duplicates are dropped keeping
/// the first occurrence; an empty set yields `-1`, which matches nothing.
pub fn clean_id_set(ids: &[i64]) -> String {
    let mut seen: Vec<i64> = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(id) {
            seen.push(*id);
        }
    }
    if seen.is_empty() {
        return "-1".to_string();
    }
    seen.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
}

/// Escape a user string for a `LIKE '%...%'` pattern. `*` is a wildcard.
pub fn clean_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '%' | '\'' | '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '*' => out.push('%'),
            c => out.push(c),
        }
    }
    out
}

pub fn and_clause(parts: &[String]) -> String {
    match parts {
        [] => String::new(),
        [one] => one.clone(),
        many => format!("({})", many.join(" AND ")),
    }
}

pub fn or_clause(parts: &[String]) -> String {
    match parts {
        [] => String::new(),
        [one] => one.clone(),
        many => format!("({})", many.join(" OR ")),
    }
}
