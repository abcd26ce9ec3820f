//! Searches: parsed terms mapped onto query params
//!
//! A search parses its string once, maps every term onto a param of the
//! model's `pattern_search` flavor, and keeps the resulting args. Without
//! bare words there is no `pattern`, and the search falls back to `all`
//! with the same filters.

use std::fmt;
use std::marker::PhantomData;

use super::errors::{PatternSearchError, PatternSearchResult};
use super::parser::{Parser, PATTERN_VAR};
use super::term::Term;
use crate::observability::{log_event_with_fields, Event};
use crate::query::{Flavor, Query, QueryArgs, QueryEngine};
use crate::schema::{Directory, ModelKind};

/// How one model turns terms into query args.
pub trait SearchModel {
    const MODEL: ModelKind;

    /// Map one non-pattern term onto `args`. Unknown vars are rejected.
    fn apply(term: &Term, directory: &dyn Directory, args: &mut QueryArgs) -> PatternSearchResult<()>;
}

pub struct PatternSearch<M: SearchModel> {
    engine: QueryEngine,
    parser: Parser,
    args: QueryArgs,
    model: PhantomData<M>,
}

pub type ObservationSearch = PatternSearch<ObservationTerms>;
pub type NameSearch = PatternSearch<NameTerms>;

impl<M: SearchModel> PatternSearch<M> {
    pub fn new(engine: &QueryEngine, pattern: &str) -> PatternSearchResult<Self> {
        match Self::parse(engine, pattern) {
            Ok(search) => {
                engine.metrics().increment_patterns_parsed();
                log_event_with_fields(
                    Event::PatternParsed,
                    &[
                        ("model", M::MODEL.as_str()),
                        ("terms", &search.parser.terms().len().to_string()),
                    ],
                );
                Ok(search)
            }
            Err(e) => {
                engine.metrics().increment_patterns_rejected();
                log_event_with_fields(
                    Event::PatternRejected,
                    &[
                        ("model", M::MODEL.as_str()),
                        ("code", e.code()),
                        ("var", e.var().unwrap_or("")),
                        ("message", &e.to_string()),
                    ],
                );
                Err(e)
            }
        }
    }

    fn parse(engine: &QueryEngine, pattern: &str) -> PatternSearchResult<Self> {
        let parser = Parser::new(pattern)?;
        let directory = engine.directory().as_ref();
        let mut args = QueryArgs::new();
        for term in parser.terms() {
            if term.var == PATTERN_VAR {
                args.insert("pattern", term.parse_pattern()?);
            } else {
                M::apply(term, directory, &mut args)?;
            }
        }
        Ok(Self {
            engine: engine.clone(),
            parser,
            args,
            model: PhantomData,
        })
    }

    pub fn model(&self) -> ModelKind {
        M::MODEL
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn args(&self) -> &QueryArgs {
        &self.args
    }

    pub fn flavor(&self) -> Flavor {
        if self.args.contains("pattern") {
            Flavor::PatternSearch
        } else {
            Flavor::All
        }
    }

    /// Look up (without saving) the query the terms describe.
    pub fn query(&self) -> PatternSearchResult<Query> {
        Ok(self
            .engine
            .lookup(M::MODEL, self.flavor().as_str(), self.args.clone())?)
    }

    /// Run the query and return the matching ids, in query order.
    pub fn results(&self) -> PatternSearchResult<Vec<i64>> {
        Ok(self.query()?.result_ids()?)
    }
}

impl<M: SearchModel> fmt::Debug for PatternSearch<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternSearch")
            .field("model", &M::MODEL)
            .field("terms", &self.parser.terms())
            .field("args", &self.args)
            .finish()
    }
}

fn unknown_term(term: &Term) -> PatternSearchError {
    PatternSearchError::BadTerm {
        term: format!("{}:{}", term.var, term.vals.join(",")),
    }
}

/// `no` / `include` / `only` as the Name query spells it.
fn name_mode(term: &Term) -> PatternSearchResult<&'static str> {
    Ok(match term.parse_no_include_only()? {
        "include" => "either",
        other => other,
    })
}

pub struct ObservationTerms;

impl SearchModel for ObservationTerms {
    const MODEL: ModelKind = ModelKind::Observation;

    fn apply(term: &Term, directory: &dyn Directory, args: &mut QueryArgs) -> PatternSearchResult<()> {
        match term.var.as_str() {
            "date" | "created" | "modified" => {
                args.insert(term.var.as_str(), term.parse_date_range()?.to_vec())
            }
            "name" => args.insert("names", term.parse_list_of_names(directory)?),
            "synonym_of" => args.insert("synonym_names", term.parse_list_of_names(directory)?),
            "user" => args.insert("users", term.parse_list_of_users(directory)?),
            "location" => args.insert("locations", term.parse_list_of_locations(directory)?),
            "species_list" => {
                args.insert("species_lists", term.parse_list_of_species_lists(directory)?)
            }
            "project" => args.insert("projects", term.parse_list_of_projects(directory)?),
            "confidence" => args.insert("confidence", term.parse_confidence()?.to_vec()),
            "specimen" | "has_specimen" => args.insert("has_specimen", term.parse_boolean(false)?),
            "images" | "has_images" => args.insert("has_images", term.parse_boolean(false)?),
            "notes" | "has_notes" => args.insert("has_notes", term.parse_boolean(false)?),
            "location_known" | "has_location" => {
                args.insert("has_location", term.parse_boolean(false)?)
            }
            "has_name" => args.insert("has_name", term.parse_boolean(false)?),
            "comments" | "has_comments" => {
                term.parse_boolean(true)?;
                args.insert("has_comments", "yes")
            }
            "notes_has" => args.insert("notes_has", term.parse_string()?),
            "comments_has" => args.insert("comments_has", term.parse_string()?),
            _ => return Err(unknown_term(term)),
        }
        Ok(())
    }
}

pub struct NameTerms;

impl SearchModel for NameTerms {
    const MODEL: ModelKind = ModelKind::Name;

    fn apply(term: &Term, directory: &dyn Directory, args: &mut QueryArgs) -> PatternSearchResult<()> {
        match term.var.as_str() {
            "created" | "modified" => {
                args.insert(term.var.as_str(), term.parse_date_range()?.to_vec())
            }
            "user" => args.insert("users", term.parse_list_of_users(directory)?),
            "synonym_of" => args.insert("synonym_names", term.parse_list_of_names(directory)?),
            "deprecated" => args.insert("deprecated", name_mode(term)?),
            "misspellings" => args.insert("misspellings", name_mode(term)?),
            _ => return Err(unknown_term(term)),
        }
        Ok(())
    }
}
