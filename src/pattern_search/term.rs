//! Search terms and their value parsers
//!
//! A [`Term`] is one `var:value[,value...]` chunk of a search string, or the
//! implicit `pattern` term that collects the bare words. Values are stored
//! dequoted; the `parse_*` methods check arity and turn them into the shape
//! the matching query param wants.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use super::errors::{PatternSearchError, PatternSearchResult};
use crate::query::QueryError;
use crate::schema::{Directory, ModelKind};

static_regex!(
    value_re,
    r#"^("([^"\\]+|\\.)*"|'([^"\\]+|\\.)*'|[^"',]*)(\s*,\s*|$)"#
);
static_regex!(outer_quotes_re, r#"^['"](.*)['"]$"#);
static_regex!(escape_re, r"\\(.)");
static_regex!(needs_quote_re, r#"['" \\]"#);
static_regex!(quotable_re, r#"(['"\\])"#);
static_regex!(true_re, r"(?i)^(1|yes|true)$");
static_regex!(false_re, r"(?i)^(0|no|false)$");
static_regex!(include_re, r"(?i)^(include|both|either)$");
static_regex!(number_re, r"^-?(\d+(\.\d+)?|\.\d+)$");
static_regex!(
    number_range_re,
    r"^(-?\d+(\.\d+)?|-?\.\d+)-(-?\d+(\.\d+)?|-?\.\d+)$"
);
static_regex!(id_re, r"^\d+$");

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Term {
    pub var: String,
    pub vals: Vec<String>,
}

impl Term {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            vals: Vec::new(),
        }
    }

    /// Append the comma-separated values in `val`. Quoted pieces may hold
    /// commas; each piece is dequoted.
    pub fn push(&mut self, val: impl ToString) {
        let text = val.to_string();
        let mut rest = text.as_str();
        while let Some(caps) = value_re().captures(rest) {
            let piece = caps.get(1).map_or("", |m| m.as_str());
            self.vals.push(dequote(piece));
            let consumed = caps.get(0).map_or(0, |m| m.end());
            rest = &rest[consumed..];
            if rest.trim().is_empty() {
                break;
            }
        }
    }

    /// Append one raw token value exactly as the tokenizer produced it.
    pub(crate) fn push_raw(&mut self, raw: &str) {
        self.vals.push(dequote(raw));
    }

    fn missing(&self) -> PatternSearchError {
        PatternSearchError::Missing { var: self.var.clone() }
    }

    fn single(&self) -> PatternSearchResult<&str> {
        match self.vals.as_slice() {
            [] => Err(self.missing()),
            [val] => Ok(val),
            _ => Err(PatternSearchError::TooMany { var: self.var.clone() }),
        }
    }

    /// Values re-quoted where needed and joined with spaces.
    pub fn parse_pattern(&self) -> PatternSearchResult<String> {
        if self.vals.is_empty() {
            return Err(self.missing());
        }
        Ok(self.vals.iter().map(|v| quote(v)).collect::<Vec<_>>().join(" "))
    }

    pub fn parse_string(&self) -> PatternSearchResult<String> {
        self.single().map(str::to_string)
    }

    /// `yes`/`true`/`1` or `no`/`false`/`0`, any case. With `only_yes`
    /// the negative forms are rejected too.
    pub fn parse_boolean(&self, only_yes: bool) -> PatternSearchResult<bool> {
        let val = self.single()?;
        if true_re().is_match(val) {
            return Ok(true);
        }
        if false_re().is_match(val) && !only_yes {
            return Ok(false);
        }
        let (var, val) = (self.var.clone(), val.to_string());
        if only_yes {
            Err(PatternSearchError::BadYes { var, val })
        } else {
            Err(PatternSearchError::BadBoolean { var, val })
        }
    }

    /// `"no"`, `"include"` or `"only"`.
    pub fn parse_no_include_only(&self) -> PatternSearchResult<&'static str> {
        let val = self.single()?;
        if true_re().is_match(val) {
            Ok("only")
        } else if false_re().is_match(val) {
            Ok("no")
        } else if include_re().is_match(val) {
            Ok("include")
        } else {
            Err(PatternSearchError::BadYesNoBoth {
                var: self.var.clone(),
                val: val.to_string(),
            })
        }
    }

    pub fn parse_float(&self, min: f64, max: f64) -> PatternSearchResult<f64> {
        let val = self.single()?;
        let bad = || PatternSearchError::BadFloat {
            var: self.var.clone(),
            val: val.to_string(),
            min,
            max,
        };
        if !number_re().is_match(val) {
            return Err(bad());
        }
        let number: f64 = val.parse().map_err(|_| bad())?;
        if number < min || number > max {
            return Err(bad());
        }
        Ok(number)
    }

    /// Percentages in `[-100, 100]` mapped onto the `[-3, 3]` vote scale.
    /// A single value is a lower bound; `a-b` is an explicit range.
    pub fn parse_confidence(&self) -> PatternSearchResult<[f64; 2]> {
        let val = self.single()?;
        let in_range = |x: f64| (-100.0..=100.0).contains(&x);
        if number_re().is_match(val) {
            if let Ok(x) = val.parse::<f64>() {
                if in_range(x) {
                    return Ok([x * 3.0 / 100.0, 3.0]);
                }
            }
        } else if let Some(caps) = number_range_re().captures(val) {
            let low = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
            let high = caps.get(3).and_then(|m| m.as_str().parse::<f64>().ok());
            if let (Some(low), Some(high)) = (low, high) {
                if in_range(low) && in_range(high) && low <= high {
                    return Ok([low * 3.0 / 100.0, high * 3.0 / 100.0]);
                }
            }
        }
        Err(PatternSearchError::BadConfidence {
            var: self.var.clone(),
            val: val.to_string(),
        })
    }

    /// `[min, max]` for the date param. Dates with a year come back as
    /// `YYYY-MM-DD`; month/day wildcards as `MM-DD`.
    pub fn parse_date_range(&self) -> PatternSearchResult<[String; 2]> {
        let val = self.single()?;
        date_range(val).ok_or_else(|| PatternSearchError::BadDateRange {
            var: self.var.clone(),
            val: val.to_string(),
        })
    }

    pub fn parse_list_of_names(&self, directory: &dyn Directory) -> PatternSearchResult<Vec<i64>> {
        self.parse_list_of(directory, ModelKind::Name, &["text_name", "search_name"], |var, val| {
            PatternSearchError::BadName { var, val }
        })
    }

    pub fn parse_list_of_locations(&self, directory: &dyn Directory) -> PatternSearchResult<Vec<i64>> {
        self.parse_list_of(directory, ModelKind::Location, &["name", "scientific_name"], |var, val| {
            PatternSearchError::BadLocation { var, val }
        })
    }

    pub fn parse_list_of_projects(&self, directory: &dyn Directory) -> PatternSearchResult<Vec<i64>> {
        self.parse_list_of(directory, ModelKind::Project, &["title"], |var, val| {
            PatternSearchError::BadProject { var, val }
        })
    }

    pub fn parse_list_of_species_lists(&self, directory: &dyn Directory) -> PatternSearchResult<Vec<i64>> {
        self.parse_list_of(directory, ModelKind::SpeciesList, &["title"], |var, val| {
            PatternSearchError::BadSpeciesList { var, val }
        })
    }

    pub fn parse_list_of_users(&self, directory: &dyn Directory) -> PatternSearchResult<Vec<i64>> {
        self.parse_list_of(directory, ModelKind::User, &["login", "name"], |var, val| {
            PatternSearchError::BadUser { var, val }
        })
    }

    fn parse_list_of(
        &self,
        directory: &dyn Directory,
        model: ModelKind,
        columns: &[&str],
        bad: fn(String, String) -> PatternSearchError,
    ) -> PatternSearchResult<Vec<i64>> {
        if self.vals.is_empty() {
            return Err(self.missing());
        }
        let mut ids = Vec::with_capacity(self.vals.len());
        for val in &self.vals {
            let found = if id_re().is_match(val) {
                match val.parse::<i64>() {
                    Ok(id) if directory.exists(model, id).map_err(QueryError::from)? => Some(id),
                    _ => None,
                }
            } else {
                let mut found = None;
                for column in columns {
                    found = directory
                        .find_id_by(model, column, val)
                        .map_err(QueryError::from)?;
                    if found.is_some() {
                        break;
                    }
                }
                found
            };
            match found {
                Some(id) => ids.push(id),
                None => return Err(bad(self.var.clone(), val.clone())),
            }
        }
        Ok(ids)
    }
}

/// Wrap in double quotes when the value holds a quote, space or backslash.
pub fn quote(value: &str) -> String {
    if needs_quote_re().is_match(value) {
        format!("\"{}\"", quotable_re().replace_all(value, r"\$1"))
    } else {
        value.to_string()
    }
}

/// Strip one pair of outer quotes, then unescape backslash escapes.
pub fn dequote(value: &str) -> String {
    let stripped = outer_quotes_re().replace(value, "${1}");
    escape_re().replace_all(&stripped, "${1}").into_owned()
}

/// One side of a date range, split into numeric components.
fn date_components(val: &str) -> Option<Vec<String>> {
    let mut out = Vec::new();
    for part in val.split('-') {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        match part.len() {
            1 | 2 | 4 => out.push(part.to_string()),
            6 => {
                out.push(part[..4].to_string());
                out.push(part[4..].to_string());
            }
            8 => {
                out.push(part[..4].to_string());
                out.push(part[4..6].to_string());
                out.push(part[6..].to_string());
            }
            _ => return None,
        }
    }
    Some(out)
}

fn date_range(val: &str) -> Option<[String; 2]> {
    let parts = date_components(val)?;
    if parts.first()?.len() == 4 {
        let split = parts
            .iter()
            .skip(1)
            .position(|p| p.len() == 4)
            .map_or(parts.len(), |i| i + 1);
        let (left, right) = parts.split_at(split);
        let right = if right.is_empty() { left } else { right };
        Some([ymd(left, true)?, ymd(right, false)?])
    } else {
        let nums: Vec<u32> = parts.iter().map(|p| p.parse().ok()).collect::<Option<_>>()?;
        if nums.iter().any(|n| *n == 0) {
            return None;
        }
        let (from, to) = match nums.as_slice() {
            [m] => ((*m, 1), (*m, 31)),
            [m1, m2] => ((*m1, 1), (*m2, 31)),
            [m1, d1, m2, d2] => ((*m1, *d1), (*m2, *d2)),
            _ => return None,
        };
        if from.0 > 12 || to.0 > 12 || from.1 > 31 || to.1 > 31 {
            return None;
        }
        Some([
            format!("{:02}-{:02}", from.0, from.1),
            format!("{:02}-{:02}", to.0, to.1),
        ])
    }
}

/// `YYYY[-M[-D]]` as a full date, filling the missing parts with the first
/// or last valid value.
fn ymd(parts: &[String], start: bool) -> Option<String> {
    if parts.is_empty() || parts.len() > 3 || parts[0].len() != 4 {
        return None;
    }
    if parts[1..].iter().any(|p| p.len() > 2) {
        return None;
    }
    let year: i32 = parts[0].parse().ok()?;
    let month: u32 = match parts.get(1) {
        Some(m) => m.parse().ok()?,
        None if start => 1,
        None => 12,
    };
    let last = month_end(year, month)?;
    let day: u32 = match parts.get(2) {
        Some(d) => d.parse().ok()?,
        None if start => 1,
        None => last,
    };
    if day == 0 || day > last {
        return None;
    }
    Some(format!("{:04}-{:02}-{:02}", year, month, day))
}

fn month_end(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(next.pred_opt().unwrap_or(first).day())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MemDirectory;
    use serde_json::Value;

    fn term(vals: &[&str]) -> Term {
        Term {
            var: "xxx".into(),
            vals: vals.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn test_push_splits_and_dequotes() {
        let mut x = Term::new("xxx");
        x.push(2);
        x.push("one,\"a b c\",two");
        x.push("\"1,2,3\"");
        x.push(true);
        assert_eq!(x.vals, vec!["2", "one", "a b c", "two", "1,2,3", "true"]);
    }

    #[test]
    fn test_quote_and_dequote() {
        assert_eq!(quote("1"), "1");
        assert_eq!(quote("a b c"), "\"a b c\"");
        assert_eq!(quote("'"), "\"\\'\"");
        assert_eq!(quote(" "), "\" \"");
        assert_eq!(quote("a b'c\"d\\e"), "\"a b\\'c\\\"d\\\\e\"");

        assert_eq!(dequote("\"a b c\""), "a b c");
        assert_eq!(dequote("\"\\'\""), "'");
        assert_eq!(dequote("\"'\""), "'");
        assert_eq!(dequote("'''"), "'");
        assert_eq!(dequote("\\'"), "'");
        assert_eq!(dequote("'"), "'");
        assert_eq!(dequote("' '"), " ");
        assert_eq!(dequote("\\ "), " ");
        assert_eq!(dequote("\"a b\\'c\\\"d\\\\e\""), "a b'c\"d\\e");
    }

    #[test]
    fn test_parse_pattern() {
        let mut x = Term::new("pattern");
        assert!(matches!(x.parse_pattern(), Err(PatternSearchError::Missing { .. })));
        x.push("one");
        x.push("\"two three\"");
        assert_eq!(x.parse_pattern().unwrap(), "one \"two three\"");
    }

    #[test]
    fn test_parse_string() {
        assert!(matches!(term(&[]).parse_string(), Err(PatternSearchError::Missing { .. })));
        assert!(matches!(term(&["1", "2"]).parse_string(), Err(PatternSearchError::TooMany { .. })));
        assert_eq!(term(&["blah"]).parse_string().unwrap(), "blah");
    }

    #[test]
    fn test_parse_boolean() {
        for (val, expected) in [
            ("0", false),
            ("1", true),
            ("no", false),
            ("yes", true),
            ("FALSE", false),
            ("TRUE", true),
        ] {
            assert_eq!(term(&[val]).parse_boolean(false).unwrap(), expected, "{}", val);
        }
        assert!(matches!(
            term(&["xxx"]).parse_boolean(false),
            Err(PatternSearchError::BadBoolean { .. })
        ));
        assert!(matches!(
            term(&["no"]).parse_boolean(true),
            Err(PatternSearchError::BadYes { .. })
        ));
        assert!(matches!(term(&["1", "2"]).parse_boolean(false), Err(PatternSearchError::TooMany { .. })));
    }

    #[test]
    fn test_parse_no_include_only() {
        for (val, expected) in [
            ("yes", "only"),
            ("TRUE", "only"),
            ("1", "only"),
            ("NO", "no"),
            ("false", "no"),
            ("0", "no"),
            ("include", "include"),
            ("both", "include"),
            ("EITHER", "include"),
        ] {
            assert_eq!(term(&[val]).parse_no_include_only().unwrap(), expected);
        }
        assert!(matches!(
            term(&["blah"]).parse_no_include_only(),
            Err(PatternSearchError::BadYesNoBoth { .. })
        ));
    }

    #[test]
    fn test_parse_float() {
        for bad in ["xxx", "-10.1", "10.1", "1e3"] {
            assert!(matches!(
                term(&[bad]).parse_float(-10.0, 10.0),
                Err(PatternSearchError::BadFloat { .. })
            ));
        }
        assert_eq!(term(&["-10"]).parse_float(-10.0, 10.0).unwrap(), -10.0);
        assert_eq!(term(&["10"]).parse_float(-10.0, 10.0).unwrap(), 10.0);
        assert_eq!(term(&[".123"]).parse_float(-10.0, 10.0).unwrap(), 0.123);
        assert_eq!(term(&["-1.234"]).parse_float(-10.0, 10.0).unwrap(), -1.234);
    }

    #[test]
    fn test_parse_confidence() {
        let scaled = |vals: &[&str]| -> Vec<i64> {
            term(vals)
                .parse_confidence()
                .unwrap()
                .iter()
                .map(|c| (c * 100_000.0).round() as i64)
                .collect()
        };
        assert_eq!(term(&["-100"]).parse_confidence().unwrap(), [-3.0, 3.0]);
        assert_eq!(term(&["100"]).parse_confidence().unwrap(), [3.0, 3.0]);
        assert_eq!(scaled(&["90"]), vec![270_000, 300_000]);
        assert_eq!(scaled(&["-.123-.123"]), vec![-369, 369]);
        assert_eq!(scaled(&["1.234-2.345"]), vec![3702, 7035]);
        for bad in ["xxx", "-100.1", "100.1", "50-10"] {
            assert!(matches!(
                term(&[bad]).parse_confidence(),
                Err(PatternSearchError::BadConfidence { .. })
            ));
        }
    }

    #[test]
    fn test_parse_date_range() {
        let range = |val: &str| term(&[val]).parse_date_range().unwrap();
        assert_eq!(range("2010"), ["2010-01-01", "2010-12-31"]);
        assert_eq!(range("2010-9"), ["2010-09-01", "2010-09-30"]);
        assert_eq!(range("2012-2"), ["2012-02-01", "2012-02-29"]);
        assert_eq!(range("2010-10"), ["2010-10-01", "2010-10-31"]);
        assert_eq!(range("2010-9-5"), ["2010-09-05", "2010-09-05"]);
        assert_eq!(range("2010-09-05"), ["2010-09-05", "2010-09-05"]);
        assert_eq!(range("2010-2012"), ["2010-01-01", "2012-12-31"]);
        assert_eq!(range("2010-3-2010-5"), ["2010-03-01", "2010-05-31"]);
        assert_eq!(range("2010-3-2010-6"), ["2010-03-01", "2010-06-30"]);
        assert_eq!(range("2010-3-12-2010-5-1"), ["2010-03-12", "2010-05-01"]);
        assert_eq!(range("201105-201206"), ["2011-05-01", "2012-06-30"]);
        assert_eq!(range("20110503"), ["2011-05-03", "2011-05-03"]);
        assert_eq!(range("6"), ["06-01", "06-31"]);
        assert_eq!(range("3-5"), ["03-01", "05-31"]);
        assert_eq!(range("3-12-5-1"), ["03-12", "05-01"]);
        for bad in ["1-2-3-4-5-6", "2010-13", "2010-2-30", "abc", "3-4-5", "12345"] {
            assert!(
                matches!(term(&[bad]).parse_date_range(), Err(PatternSearchError::BadDateRange { .. })),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_parse_lists_through_directory() {
        let directory = MemDirectory::new()
            .with(
                ModelKind::User,
                2,
                &[("login", Value::from("dick")), ("name", Value::from("Tricky Dick"))],
            )
            .with(ModelKind::User, 3, &[("login", Value::from("mary"))])
            .with(ModelKind::Project, 4, &[("title", Value::from("Bolete Project"))])
            .with_name(5, "Coprinus comatus", "Species", None, None);

        assert_eq!(term(&["dick"]).parse_list_of_users(&directory).unwrap(), vec![2]);
        assert_eq!(term(&["Tricky Dick"]).parse_list_of_users(&directory).unwrap(), vec![2]);
        assert_eq!(term(&["3", "2"]).parse_list_of_users(&directory).unwrap(), vec![3, 2]);
        assert!(matches!(
            term(&["99"]).parse_list_of_users(&directory),
            Err(PatternSearchError::BadUser { .. })
        ));
        assert_eq!(
            term(&["bolete project"]).parse_list_of_projects(&directory).unwrap(),
            vec![4]
        );
        assert_eq!(
            term(&["Coprinus comatus"]).parse_list_of_names(&directory).unwrap(),
            vec![5]
        );
        assert!(matches!(
            term(&["Nowhere"]).parse_list_of_locations(&directory),
            Err(PatternSearchError::BadLocation { .. })
        ));
        assert!(matches!(
            term(&[]).parse_list_of_species_lists(&directory),
            Err(PatternSearchError::Missing { .. })
        ));
    }
}
