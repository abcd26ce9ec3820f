//! Pagination
//!
//! Pages are 1-based. A letter pager additionally narrows the results to
//! rows whose `letter_field` starts with the chosen letter, and reports
//! which letters are in use so a caller can render the alphabet.

use serde::Serialize;

use super::clauses::{clean_pattern, SqlOverrides};
use super::errors::QueryResult;
use super::query::Query;
use super::results::Record;
use crate::schema::{strip_alias, JoinTree};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paginator {
    /// Current page, starting at 1
    number: usize,
    num_per_page: usize,
    /// Chosen first letter, uppercase
    pub letter: Option<char>,
    /// Matches across all pages, set by `paginate_ids`
    pub num_total: usize,
    /// Letters that start at least one match, set when a letter field is used
    pub used_letters: Option<Vec<char>>,
}

impl Paginator {
    pub fn new(number: usize, num_per_page: usize) -> Self {
        Self {
            number: number.max(1),
            num_per_page: num_per_page.max(1),
            letter: None,
            num_total: 0,
            used_letters: None,
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn num_per_page(&self) -> usize {
        self.num_per_page
    }

    pub fn with_letter(mut self, letter: char) -> Self {
        self.letter = Some(letter.to_ascii_uppercase());
        self
    }

    /// Index of the first item on the page.
    pub fn from(&self) -> usize {
        (self.number - 1) * self.num_per_page
    }

    /// Index of the last item on the page (inclusive).
    pub fn to(&self) -> usize {
        self.from() + self.num_per_page - 1
    }

    pub fn num_pages(&self) -> usize {
        (self.num_total + self.num_per_page - 1) / self.num_per_page
    }

    fn slice(&self, ids: &[i64]) -> Vec<i64> {
        let from = self.from().min(ids.len());
        let to = (self.to() + 1).min(ids.len());
        ids[from..to].to_vec()
    }
}

impl Query {
    /// Ids on the pager's page. Sets `num_total`, and `used_letters` when a
    /// letter field is given. A letter not in use is dropped.
    pub fn paginate_ids(&mut self, pager: &mut Paginator, letter_field: Option<&str>) -> QueryResult<Vec<i64>> {
        if let Some(field) = letter_field {
            let mut base = SqlOverrides::new();
            if let Some((table, _)) = field.split_once('.') {
                let table = strip_alias(table);
                if !self.uses_table(table)? {
                    base = base.join(JoinTree::leaf(table));
                }
            }

            let firsts = self.select_values(
                &base
                    .clone()
                    .select(format!("DISTINCT LEFT({},1)", field))
                    .order(""),
            )?;
            let mut letters: Vec<char> = firsts
                .iter()
                .filter_map(|v| v.as_str().and_then(|s| s.chars().next()))
                .filter(|c| c.is_alphabetic())
                .map(|c| c.to_ascii_uppercase())
                .collect();
            letters.sort_unstable();
            letters.dedup();

            if pager.letter.map_or(false, |l| !letters.contains(&l)) {
                pager.letter = None;
            }
            pager.used_letters = Some(letters);

            if let Some(letter) = pager.letter {
                let pattern = clean_pattern(&letter.to_string());
                let ids = self.select_ids(&base.where_(format!("{} LIKE '{}%'", field, pattern)))?;
                pager.num_total = ids.len();
                return Ok(pager.slice(&ids));
            }
        }

        let ids = self.result_ids()?;
        pager.num_total = ids.len();
        Ok(pager.slice(&ids))
    }

    /// Hydrated records on the pager's page.
    pub fn paginate(
        &mut self,
        pager: &mut Paginator,
        letter_field: Option<&str>,
        include: &[&str],
    ) -> QueryResult<Vec<Record>> {
        let ids = self.paginate_ids(pager, letter_field)?;
        self.instantiate(&ids, include)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Row, ScriptedBackend};
    use crate::query::{QueryArgs, QueryEngine};
    use crate::schema::ModelKind;
    use std::sync::Arc;

    #[test]
    fn test_page_bounds() {
        let mut pager = Paginator::new(2, 10);
        pager.num_total = 25;
        assert_eq!(pager.from(), 10);
        assert_eq!(pager.to(), 19);
        assert_eq!(pager.num_pages(), 3);
        let clamped = Paginator::new(0, 0);
        assert_eq!((clamped.number(), clamped.num_per_page()), (1, 1));
        assert_eq!(clamped.from(), 0);
        assert_eq!(clamped.to(), 0);
    }

    #[test]
    fn test_pages_cover_everything_once() {
        let ids: Vec<i64> = (1..=23).collect();
        let backend = Arc::new(ScriptedBackend::new().ids(&["FROM `names`"], &ids));
        let mut query = QueryEngine::for_tests_with(backend)
            .lookup(ModelKind::Name, "all", QueryArgs::new())
            .unwrap();

        let mut seen = Vec::new();
        let mut number = 1;
        loop {
            let mut pager = Paginator::new(number, 5);
            let page = query.paginate_ids(&mut pager, None).unwrap();
            assert_eq!(pager.num_total, 23);
            if page.is_empty() {
                break;
            }
            seen.extend(page);
            number += 1;
        }
        assert_eq!(seen, ids);
        assert_eq!(number, 6);
    }

    #[test]
    fn test_letter_pagination() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .rule(
                    &["LEFT(names.text_name,1)"],
                    vec![
                        Row::new().with("l", "b"),
                        Row::new().with("l", "A"),
                        Row::new().with("l", "×"),
                        Row::new().with("l", "1"),
                    ],
                )
                .ids(&["names.text_name LIKE 'A%'"], &[4, 5]),
        );
        let mut query = QueryEngine::for_tests_with(backend.clone())
            .lookup(ModelKind::Name, "all", QueryArgs::new())
            .unwrap();

        let mut pager = Paginator::new(1, 10).with_letter('a');
        let ids = query.paginate_ids(&mut pager, Some("names.text_name")).unwrap();
        assert_eq!(ids, vec![4, 5]);
        assert_eq!(pager.used_letters, Some(vec!['A', 'B']));
        assert_eq!(pager.num_total, 2);
        assert!(!backend.executed()[0].contains("ORDER BY"));
    }

    #[test]
    fn test_unused_letter_is_dropped() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .rule(&["LEFT("], vec![Row::new().with("l", "A")])
                .ids(&["FROM `observations`"], &[1, 2, 3]),
        );
        let mut query = QueryEngine::for_tests_with(backend.clone())
            .lookup(ModelKind::Observation, "all", QueryArgs::new())
            .unwrap();
        let mut pager = Paginator::new(1, 2).with_letter('Q');
        let ids = query.paginate_ids(&mut pager, Some("names.text_name")).unwrap();
        assert_eq!(pager.letter, None);
        assert_eq!(ids, vec![1, 2]);
        assert!(backend.executed()[0].contains("JOIN `names`"));
    }
}
