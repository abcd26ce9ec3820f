//! Search string tokenizer
//!
//! A search string is a run of whitespace-separated tokens. A token is
//! either `var:value[,value...]` or a bare value. Values may be quoted with
//! `"` or `'`, and a backslash escapes the next character anywhere. Bare
//! values, wherever they appear, all go into the `pattern` term.

use super::errors::{PatternSearchError, PatternSearchResult};
use super::term::Term;

/// One value: quoted runs, escapes and plain characters, glued together.
macro_rules! value_pattern {
    () => {
        r#"(?:"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|\\.|[^\s,"'\\])+"#
    };
}

static_regex!(
    term_re,
    concat!(r"^(?:(\w+):)?(", value_pattern!(), "(?:,", value_pattern!(), r")*)(?:\s+|$)")
);
static_regex!(value_re, value_pattern!());

pub const PATTERN_VAR: &str = "pattern";

#[derive(Debug, Clone)]
pub struct Parser {
    incoming_string: String,
    terms: Vec<Term>,
}

impl Parser {
    pub fn new(incoming_string: impl Into<String>) -> PatternSearchResult<Self> {
        let mut parser = Self {
            incoming_string: incoming_string.into(),
            terms: Vec::new(),
        };
        parser.terms = parser.parse_terms()?;
        Ok(parser)
    }

    pub fn incoming_string(&self) -> &str {
        &self.incoming_string
    }

    /// Trimmed, with every run of whitespace squeezed to one space.
    pub fn clean_incoming_string(&self) -> String {
        self.incoming_string.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Terms in order of first appearance, `pattern` first when present.
    /// A var that appears twice gets one term with both sets of values.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn into_terms(self) -> Vec<Term> {
        self.terms
    }

    fn parse_terms(&self) -> PatternSearchResult<Vec<Term>> {
        let clean = self.clean_incoming_string();
        let mut rest = clean.as_str();
        let mut pattern: Option<Term> = None;
        let mut terms: Vec<Term> = Vec::new();

        while let Some((var, vals)) = parse_next_term(&mut rest)? {
            let term = if var == PATTERN_VAR {
                pattern.get_or_insert_with(|| Term::new(PATTERN_VAR))
            } else {
                match terms.iter().position(|t| t.var == var) {
                    Some(i) => &mut terms[i],
                    None => {
                        terms.push(Term::new(var));
                        let last = terms.len() - 1;
                        &mut terms[last]
                    }
                }
            };
            for val in &vals {
                term.push_raw(val);
            }
        }

        Ok(pattern.into_iter().chain(terms).collect())
    }
}

/// Split the next token off the front of `input`. Values come back raw,
/// quotes and escapes intact. Returns `None` once only whitespace is left.
pub fn parse_next_term(input: &mut &str) -> PatternSearchResult<Option<(String, Vec<String>)>> {
    let rest = input.trim_start();
    if rest.is_empty() {
        *input = rest;
        return Ok(None);
    }
    let caps = term_re().captures(rest).ok_or_else(|| PatternSearchError::BadTerm {
        term: rest.to_string(),
    })?;
    let var = caps
        .get(1)
        .map_or_else(|| PATTERN_VAR.to_string(), |m| m.as_str().to_lowercase());
    let vals = caps
        .get(2)
        .map(|m| value_re().find_iter(m.as_str()).map(|v| v.as_str().to_string()).collect())
        .unwrap_or_default();
    let consumed = caps.get(0).map_or(rest.len(), |m| m.end());
    *input = &rest[consumed..];
    Ok(Some((var, vals)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next(input: &mut &str) -> (String, Vec<String>) {
        parse_next_term(input).unwrap().unwrap()
    }

    fn pair(var: &str, vals: &[&str]) -> (String, Vec<String>) {
        (var.to_string(), vals.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn test_parse_next_term() {
        let text = r#"test name:blah two:1,2,3 foo:"quote" bar:'a',"b" slash:\,,"\"""#;
        let mut input = text;
        assert_eq!(next(&mut input), pair("pattern", &["test"]));
        assert_eq!(next(&mut input), pair("name", &["blah"]));
        assert_eq!(next(&mut input), pair("two", &["1", "2", "3"]));
        assert_eq!(next(&mut input), pair("foo", &[r#""quote""#]));
        assert_eq!(next(&mut input), pair("bar", &["'a'", r#""b""#]));
        assert_eq!(next(&mut input), pair("slash", &[r"\,", r#""\"""#]));
        assert!(parse_next_term(&mut input).unwrap().is_none());
    }

    #[test]
    fn test_unbalanced_quote_is_a_bad_term() {
        let mut input = r#"abc "open"#;
        next(&mut input);
        let err = parse_next_term(&mut input).unwrap_err();
        assert!(matches!(err, PatternSearchError::BadTerm { ref term } if term == "\"open"));
    }

    #[test]
    fn test_clean_incoming_string() {
        let parser = Parser::new(" abc ").unwrap();
        assert_eq!(parser.incoming_string(), " abc ");
        assert_eq!(parser.clean_incoming_string(), "abc");
        assert_eq!(parser.terms().len(), 1);
        assert_eq!(parser.terms()[0].var, "pattern");
        assert_eq!(parser.terms()[0].parse_pattern().unwrap(), "abc");
    }

    #[test]
    fn test_bare_words_gather_into_pattern() {
        let parser = Parser::new(r#" abc  user:dick   "tack  this  on"  "#).unwrap();
        assert_eq!(parser.clean_incoming_string(), r#"abc user:dick "tack this on""#);

        let terms = parser.terms();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].var, "pattern");
        assert_eq!(terms[0].parse_pattern().unwrap(), r#"abc "tack this on""#);
        assert_eq!(terms[1].var, "user");
        assert_eq!(terms[1].vals, vec!["dick"]);
    }

    #[test]
    fn test_repeated_vars_merge() {
        let parser = Parser::new("User:mary date:2010 user:rolf,dick").unwrap();
        let terms = parser.into_terms();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].var, "user");
        assert_eq!(terms[0].vals, vec!["mary", "rolf", "dick"]);
        assert_eq!(terms[1].var, "date");
    }

    #[test]
    fn test_empty_string_has_no_terms() {
        assert!(Parser::new("   ").unwrap().terms().is_empty());
    }
}
